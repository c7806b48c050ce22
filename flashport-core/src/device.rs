//! Flash-backed block device
//!
//! Implements the four block-device operations on top of a
//! [`FlashController`]:
//!
//! - **read**: mapped memory copy, no controller command
//! - **prog**: page-by-page programming inside an unlock/lock bracket
//! - **erase**: erase of the block's sectors inside the same bracket
//! - **sync**: nothing to flush
//!
//! Every request is checked against the configuration before the flash is
//! touched. The device performs no internal locking; `&mut self` keeps a
//! single caller on the controller.

use core::ops::{Deref, DerefMut};

use flashport_hal::FlashController;

use crate::config::{BlockDeviceConfig, ConfigError, FlashGeometry};
use crate::error::{BlockDeviceError, InvalidArgument};

/// Block device contract expected by a littlefs-style filesystem
pub trait BlockDevice {
    /// Geometry and sizing the filesystem mounts with
    fn config(&self) -> &BlockDeviceConfig;

    /// Read `buffer.len()` bytes from `offset` within `block`
    fn read(&mut self, block: u32, offset: u32, buffer: &mut [u8]) -> Result<(), BlockDeviceError>;

    /// Program `data` at `offset` within `block`
    ///
    /// The region must have been erased since it was last programmed; this
    /// is not verified.
    fn prog(&mut self, block: u32, offset: u32, data: &[u8]) -> Result<(), BlockDeviceError>;

    /// Erase `block`, leaving every byte at `0xFF`
    fn erase(&mut self, block: u32) -> Result<(), BlockDeviceError>;

    /// Flush pending writes
    fn sync(&mut self) -> Result<(), BlockDeviceError>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn config(&self) -> &BlockDeviceConfig {
        (**self).config()
    }

    fn read(&mut self, block: u32, offset: u32, buffer: &mut [u8]) -> Result<(), BlockDeviceError> {
        (**self).read(block, offset, buffer)
    }

    fn prog(&mut self, block: u32, offset: u32, data: &[u8]) -> Result<(), BlockDeviceError> {
        (**self).prog(block, offset, data)
    }

    fn erase(&mut self, block: u32) -> Result<(), BlockDeviceError> {
        (**self).erase(block)
    }

    fn sync(&mut self) -> Result<(), BlockDeviceError> {
        (**self).sync()
    }
}

/// Unlocked flash controller
///
/// Unlocks on creation and locks again when dropped, so the controller is
/// locked on every exit path of a program or erase.
struct Unlocked<'a, C: FlashController> {
    controller: &'a mut C,
}

impl<'a, C: FlashController> Unlocked<'a, C> {
    fn new(controller: &'a mut C) -> Self {
        controller.unlock();
        Self { controller }
    }
}

impl<C: FlashController> Deref for Unlocked<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.controller
    }
}

impl<C: FlashController> DerefMut for Unlocked<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.controller
    }
}

impl<C: FlashController> Drop for Unlocked<'_, C> {
    fn drop(&mut self) {
        self.controller.lock();
    }
}

/// Block device over on-chip NOR flash
///
/// One block is normally one flash sector; a block that spans several
/// sectors is erased sector by sector. Owns the controller for the
/// lifetime of the mount.
pub struct FlashBlockDevice<C> {
    controller: C,
    config: BlockDeviceConfig,
}

impl<C: FlashController> FlashBlockDevice<C> {
    /// Bind a controller to a flash region
    ///
    /// The program size is the controller's page size. Always succeeds;
    /// use [`bind_checked`](Self::bind_checked) to reject geometries the
    /// controller cannot serve.
    pub fn bind(controller: C, geometry: &FlashGeometry) -> Self {
        let config = BlockDeviceConfig::from_geometry(geometry, controller.page_size() as u32);
        Self { controller, config }
    }

    /// Bind a controller and validate the resulting configuration
    pub fn bind_checked(controller: C, geometry: &FlashGeometry) -> Result<Self, ConfigError> {
        let config = BlockDeviceConfig::from_geometry(geometry, controller.page_size() as u32);
        Self::with_config(controller, config)
    }

    /// Bind a controller with explicit sizing
    ///
    /// Checks the configuration and that it matches the controller: the
    /// block size must equal the sector size and the program size must be
    /// a whole number of pages.
    pub fn with_config(controller: C, config: BlockDeviceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.block_size as usize != controller.sector_size() {
            return Err(ConfigError::SectorSizeMismatch);
        }
        let page_size = controller.page_size() as u32;
        if page_size == 0 || config.prog_size % page_size != 0 {
            return Err(ConfigError::PageSizeMismatch);
        }
        Ok(Self { controller, config })
    }

    /// Get the controller
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Get the controller for low-level access
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// Unmount, returning the controller
    pub fn release(self) -> C {
        self.controller
    }

    /// Check a transfer and translate it to a physical address
    fn locate(
        &self,
        block: u32,
        offset: u32,
        len: usize,
        granularity: u32,
    ) -> Result<u32, InvalidArgument> {
        if block >= self.config.block_count {
            return Err(InvalidArgument::BlockOutOfRange);
        }
        if granularity == 0 || offset % granularity != 0 || len % granularity as usize != 0 {
            return Err(InvalidArgument::Misaligned);
        }
        let end = offset as u64 + len as u64;
        if end > self.config.block_size as u64 {
            return Err(InvalidArgument::OutOfBlockBounds);
        }
        self.config
            .address(block, offset)
            .ok_or(InvalidArgument::AddressOverflow)
    }
}

impl<C: FlashController> BlockDevice for FlashBlockDevice<C> {
    fn config(&self) -> &BlockDeviceConfig {
        &self.config
    }

    fn read(&mut self, block: u32, offset: u32, buffer: &mut [u8]) -> Result<(), BlockDeviceError> {
        let address = self.locate(block, offset, buffer.len(), self.config.read_size)?;
        self.controller.read(address, buffer)?;
        Ok(())
    }

    fn prog(&mut self, block: u32, offset: u32, data: &[u8]) -> Result<(), BlockDeviceError> {
        let address = self.locate(block, offset, data.len(), self.config.prog_size)?;
        let page_size = self.controller.page_size();
        if page_size == 0 || data.len() % page_size != 0 {
            return Err(InvalidArgument::Misaligned.into());
        }
        if data.is_empty() {
            return Ok(());
        }

        #[cfg(feature = "defmt")]
        defmt::trace!(
            "prog block {} offset {} len {} at {=u32:#x}",
            block,
            offset,
            data.len(),
            address
        );

        let mut flash = Unlocked::new(&mut self.controller);
        for (i, page) in data.chunks_exact(page_size).enumerate() {
            // Within the block, so no overflow for a validated region
            let destination = address + (i * page_size) as u32;
            if let Err(e) = flash.program_page(destination, page) {
                #[cfg(feature = "defmt")]
                defmt::warn!("Flash program failed at {=u32:#x}: {}", destination, e);
                return Err(e.into());
            }
        }

        Ok(())
    }

    fn erase(&mut self, block: u32) -> Result<(), BlockDeviceError> {
        let address = self.locate(block, 0, 0, 1)?;

        #[cfg(feature = "defmt")]
        defmt::trace!("erase block {} at {=u32:#x}", block, address);

        // A block spans every controller sector it covers
        let sector_size = self.controller.sector_size().max(1) as u32;
        let sectors = self.config.block_size.div_ceil(sector_size).max(1);

        let mut flash = Unlocked::new(&mut self.controller);
        for i in 0..sectors {
            let sector = address + i * sector_size;
            if let Err(e) = flash.erase_sector(sector) {
                #[cfg(feature = "defmt")]
                defmt::warn!("Flash erase failed at {=u32:#x}: {}", sector, e);
                return Err(e.into());
            }
        }

        Ok(())
    }

    fn sync(&mut self) -> Result<(), BlockDeviceError> {
        // Writes go straight to the array; there is no cache to flush
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::status;
    use flashport_hal::sim::SimStats;
    use flashport_hal::{FlashError, SimFlash, ERASED_BYTE};
    use proptest::prelude::*;
    use std::vec::Vec;

    const BASE: u32 = 0x0800_0000;
    const BLOCK_SIZE: u32 = 4096;
    const BLOCK_COUNT: u32 = 15;
    const PAGE_SIZE: usize = 16;
    const SIZE: usize = (BLOCK_SIZE * BLOCK_COUNT) as usize;
    const GEOMETRY: FlashGeometry = FlashGeometry::new(BASE, BLOCK_SIZE, BLOCK_COUNT);

    type Device = FlashBlockDevice<SimFlash<SIZE>>;

    fn device() -> Device {
        FlashBlockDevice::bind(SimFlash::new(BASE, PAGE_SIZE, BLOCK_SIZE as usize), &GEOMETRY)
    }

    fn block_bytes(device: &Device, block: u32) -> &[u8] {
        device
            .controller()
            .bytes(BASE + block * BLOCK_SIZE, BLOCK_SIZE as usize)
            .unwrap()
    }

    #[test]
    fn test_bind_populates_config() {
        let device = device();
        let config = device.config();

        assert_eq!(config.block_size, 4096);
        assert_eq!(config.block_count, 15);
        assert_eq!(config.read_size, 16);
        assert_eq!(config.prog_size, 16);
        assert_eq!(config.validate(), Ok(()));
        assert!(device.controller().is_locked());
    }

    #[test]
    fn test_bind_checked_accepts_matching_geometry() {
        let sim = SimFlash::<SIZE>::new(BASE, 128, BLOCK_SIZE as usize);
        let device = FlashBlockDevice::bind_checked(sim, &GEOMETRY).unwrap();
        assert_eq!(device.config().prog_size, 128);
        assert_eq!(device.config().cache_size, 128);
    }

    #[test]
    fn test_bind_checked_rejects_sector_mismatch() {
        let sim = SimFlash::<SIZE>::new(BASE, PAGE_SIZE, 2048);
        let result = FlashBlockDevice::bind_checked(sim, &GEOMETRY);
        assert_eq!(result.err(), Some(ConfigError::SectorSizeMismatch));
    }

    #[test]
    fn test_with_config_rejects_partial_pages() {
        let sim = SimFlash::<SIZE>::new(BASE, 32, BLOCK_SIZE as usize);
        let config = BlockDeviceConfig::from_geometry(&GEOMETRY, 16);
        let result = FlashBlockDevice::with_config(sim, config);
        assert_eq!(result.err(), Some(ConfigError::PageSizeMismatch));
    }

    #[test]
    fn test_bind_borrowed_controller() {
        let mut sim = SimFlash::<SIZE>::new(BASE, PAGE_SIZE, BLOCK_SIZE as usize);
        {
            let mut device = FlashBlockDevice::bind(&mut sim, &GEOMETRY);
            device.erase(1).unwrap();
            device.prog(1, 0, &[0u8; 16]).unwrap();
        }
        assert_eq!(sim.bytes(BASE + BLOCK_SIZE, 16).unwrap(), &[0u8; 16]);
        assert!(sim.is_locked());
    }

    #[test]
    fn test_prog_last_page_at_top_of_address_space() {
        let geometry = FlashGeometry::new(0xFFFF_0000, BLOCK_SIZE, 16);
        let sim = SimFlash::<65536>::new(0xFFFF_0000, PAGE_SIZE, BLOCK_SIZE as usize);
        let mut device = FlashBlockDevice::bind(sim, &geometry);
        assert_eq!(device.config().validate(), Ok(()));

        device.prog(15, BLOCK_SIZE - 32, &[0u8; 32]).unwrap();

        let mut buf = [0xAAu8; 32];
        device.read(15, BLOCK_SIZE - 32, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 32]);
        assert_eq!(device.controller().bytes(0xFFFF_FFF0, 16).unwrap(), &[0u8; 16]);
        assert!(device.controller().is_locked());
    }

    #[test]
    fn test_erase_clears_every_sector_of_a_large_block() {
        let sim = SimFlash::<16384>::new(0, PAGE_SIZE, 1024);
        let mut device = FlashBlockDevice::bind(sim, &FlashGeometry::new(0, 4096, 4));

        device.erase(0).unwrap();
        device.prog(0, 2048, &[0u8; 16]).unwrap();
        device.prog(0, 4080, &[0u8; 16]).unwrap();
        device.prog(1, 0, &[0u8; 16]).unwrap();
        device.erase(0).unwrap();

        let mut buf = [0u8; 4096];
        device.read(0, 0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == ERASED_BYTE));

        let mut next = [0xFFu8; 16];
        device.read(1, 0, &mut next).unwrap();
        assert_eq!(next, [0u8; 16]);
        assert_eq!(device.controller().stats().sectors_erased, 8);
        assert!(device.controller().is_locked());
    }

    #[test]
    fn test_hello_littlefs() {
        let mut device = device();
        let message = b"Hello littlefs!\0";
        assert_eq!(message.len(), 16);

        device.erase(0).unwrap();
        device.prog(0, 0, message).unwrap();

        let mut buf = [0u8; 16];
        device.read(0, 0, &mut buf).unwrap();
        assert_eq!(&buf, message);
    }

    #[test]
    fn test_read_erased_block() {
        let mut device = device();
        let mut buf = [0u8; 64];
        device.read(5, 128, &mut buf).unwrap();
        assert_eq!(buf, [ERASED_BYTE; 64]);
    }

    #[test]
    fn test_prog_without_erase_ands_bits() {
        let mut device = device();
        device.erase(0).unwrap();
        device.prog(0, 0, &[0b1100_1100; 16]).unwrap();
        device.prog(0, 0, &[0b1010_1010; 16]).unwrap();

        let mut buf = [0u8; 16];
        device.read(0, 0, &mut buf).unwrap();
        assert_eq!(buf, [0b1000_1000; 16]);
    }

    #[test]
    fn test_writes_land_on_requested_block() {
        let mut device = device();
        device.prog(3, 32, &[0u8; 32]).unwrap();

        for block in 0..BLOCK_COUNT {
            let bytes = block_bytes(&device, block);
            if block == 3 {
                assert!(bytes[..32].iter().all(|&b| b == ERASED_BYTE));
                assert!(bytes[32..64].iter().all(|&b| b == 0));
                assert!(bytes[64..].iter().all(|&b| b == ERASED_BYTE));
            } else {
                assert!(bytes.iter().all(|&b| b == ERASED_BYTE), "block {} touched", block);
            }
        }

        device.prog(7, 0, &[0u8; 16]).unwrap();
        device.erase(7).unwrap();
        assert!(block_bytes(&device, 7).iter().all(|&b| b == ERASED_BYTE));
        assert!(block_bytes(&device, 3)[32..64].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_prog_programs_one_page_per_chunk() {
        let mut device = device();
        let data: Vec<u8> = (0..64u8).collect();
        device.prog(1, 0, &data).unwrap();

        assert_eq!(device.controller().stats().pages_programmed, 4);
        assert_eq!(&block_bytes(&device, 1)[..64], &data[..]);
    }

    #[test]
    fn test_controller_locked_after_operations() {
        let mut device = device();
        device.erase(2).unwrap();
        device.prog(2, 0, &[0u8; 16]).unwrap();

        let stats = device.controller().stats();
        assert!(device.controller().is_locked());
        assert_eq!(stats.unlocks, 2);
        assert_eq!(stats.locks, 2);
    }

    #[test]
    fn test_prog_failure_aborts_and_locks() {
        let mut device = device();
        device
            .controller_mut()
            .fail_program_at(BASE + BLOCK_SIZE + 2 * PAGE_SIZE as u32);

        let result = device.prog(1, 0, &[0u8; 64]);
        assert_eq!(result, Err(BlockDeviceError::Device(FlashError::Program)));

        let bytes = block_bytes(&device, 1);
        assert!(bytes[..32].iter().all(|&b| b == 0));
        assert!(bytes[32..].iter().all(|&b| b == ERASED_BYTE));
        assert!(device.controller().is_locked());
        assert_eq!(device.controller().stats().pages_programmed, 2);
    }

    #[test]
    fn test_erase_failure_reported_and_locks() {
        let mut device = device();
        device.controller_mut().fail_erase_at(BASE + 4 * BLOCK_SIZE);

        let result = device.erase(4);
        assert_eq!(result, Err(BlockDeviceError::Device(FlashError::Erase)));
        assert_eq!(status(result), -5);
        assert!(device.controller().is_locked());
    }

    #[test]
    fn test_block_out_of_range_rejected() {
        let mut device = device();
        let mut buf = [0u8; 16];
        let out_of_range = Err(BlockDeviceError::InvalidArgument(
            InvalidArgument::BlockOutOfRange,
        ));

        assert_eq!(device.read(BLOCK_COUNT, 0, &mut buf), out_of_range);
        assert_eq!(device.prog(BLOCK_COUNT, 0, &buf), out_of_range);
        assert_eq!(device.erase(BLOCK_COUNT), out_of_range);
        assert_eq!(device.controller().stats().unlocks, 0);
    }

    #[test]
    fn test_misaligned_rejected() {
        let mut device = device();
        let mut buf = [0u8; 16];
        let misaligned = Err(BlockDeviceError::InvalidArgument(InvalidArgument::Misaligned));

        assert_eq!(device.read(0, 8, &mut buf), misaligned);
        assert_eq!(device.read(0, 0, &mut buf[..12]), misaligned);
        assert_eq!(device.prog(0, 4, &buf), misaligned);
        assert_eq!(device.prog(0, 0, &buf[..10]), misaligned);
    }

    #[test]
    fn test_transfer_past_block_end_rejected() {
        let mut device = device();
        let mut buf = [0u8; 32];
        let result = device.read(0, BLOCK_SIZE - 16, &mut buf);
        assert_eq!(
            result,
            Err(BlockDeviceError::InvalidArgument(
                InvalidArgument::OutOfBlockBounds
            ))
        );
        assert_eq!(status(result), -22);
    }

    #[test]
    fn test_empty_prog_does_not_unlock() {
        let mut device = device();
        device.prog(0, 0, &[]).unwrap();
        assert_eq!(device.controller().stats().unlocks, 0);
    }

    #[test]
    fn test_sync_is_noop() {
        let mut device = device();
        assert_eq!(device.sync(), Ok(()));
        assert_eq!(device.controller().stats(), SimStats::default());
    }

    fn stamp<D: BlockDevice>(mut device: D) -> Result<u32, BlockDeviceError> {
        device.erase(0)?;
        device.prog(0, 0, &[0x5A; 16])?;
        device.sync()?;
        Ok(device.config().block_count)
    }

    #[test]
    fn test_through_mutable_reference() {
        let mut device = device();
        assert_eq!(stamp(&mut device), Ok(BLOCK_COUNT));
        assert_eq!(&block_bytes(&device, 0)[..16], &[0x5A; 16]);
    }

    /// Aligned `(block, offset, data)` transfers within one block
    fn transfer() -> impl Strategy<Value = (u32, u32, Vec<u8>)> {
        let pages = BLOCK_SIZE / PAGE_SIZE as u32;
        (0..BLOCK_COUNT, 0..pages).prop_flat_map(move |(block, start)| {
            let max_pages = (pages - start).min(16) as usize;
            (1..=max_pages).prop_flat_map(move |len| {
                proptest::collection::vec(any::<u8>(), len * PAGE_SIZE)
                    .prop_map(move |data| (block, start * PAGE_SIZE as u32, data))
            })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_erase_prog_read_round_trip((block, offset, data) in transfer()) {
            let mut device = device();
            device.erase(block).unwrap();
            device.prog(block, offset, &data).unwrap();

            let mut buf = vec![0u8; data.len()];
            device.read(block, offset, &mut buf).unwrap();
            prop_assert_eq!(buf, data);
        }

        #[test]
        fn test_read_matches_physical_bytes((block, offset, data) in transfer()) {
            let mut device = device();
            device.prog(block, offset, &data).unwrap();

            let mut buf = vec![0u8; data.len()];
            device.read(block, offset, &mut buf).unwrap();

            let address = BASE + block * BLOCK_SIZE + offset;
            let physical = device.controller().bytes(address, data.len()).unwrap();
            prop_assert_eq!(&buf[..], physical);
        }

        #[test]
        fn test_prog_is_monotonic(
            (block, offset, first) in transfer(),
            seed in any::<u8>(),
        ) {
            let second: Vec<u8> = first
                .iter()
                .enumerate()
                .map(|(i, b)| b.rotate_left(3) ^ seed.wrapping_add(i as u8))
                .collect();

            let mut device = device();
            device.prog(block, offset, &first).unwrap();
            device.prog(block, offset, &second).unwrap();

            let mut buf = vec![0u8; first.len()];
            device.read(block, offset, &mut buf).unwrap();
            for i in 0..buf.len() {
                prop_assert_eq!(buf[i], first[i] & second[i]);
            }
        }

        #[test]
        fn test_double_erase_stays_erased(block in 0..BLOCK_COUNT) {
            let mut device = device();
            device.erase(block).unwrap();
            device.erase(block).unwrap();
            prop_assert!(block_bytes(&device, block).iter().all(|&b| b == ERASED_BYTE));
        }

        #[test]
        fn test_out_of_range_never_aliases(block in BLOCK_COUNT..u32::MAX) {
            let mut device = device();
            let mut buf = [0u8; 16];
            prop_assert!(device.read(block, 0, &mut buf).is_err());
            prop_assert!(device.prog(block, 0, &[0u8; 16]).is_err());
            prop_assert!(device.erase(block).is_err());
            prop_assert!(device.controller().memory().iter().all(|&b| b == ERASED_BYTE));
        }
    }
}
