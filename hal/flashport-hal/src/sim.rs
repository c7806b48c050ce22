//! Simulated NOR flash
//!
//! RAM-backed model of an on-chip NOR flash controller for host-side
//! testing. It enforces the same rules as the hardware:
//!
//! - program and erase only between `unlock` and `lock`
//! - programming ANDs the new data into the cell (bits only go 1 -> 0)
//! - erase resets a whole sector to `0xFF`
//! - page and sector alignment, region bounds
//!
//! Program and erase failures can be injected per address.

use heapless::Vec;

use crate::flash::{FlashController, FlashError, ERASED_BYTE};

/// Maximum number of injected faults per operation kind
pub const MAX_FAULTS: usize = 8;

/// Operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Number of `unlock` calls
    pub unlocks: u32,
    /// Number of `lock` calls
    pub locks: u32,
    /// Successful page programs
    pub pages_programmed: u32,
    /// Successful sector erases
    pub sectors_erased: u32,
    /// Program/erase attempts rejected by an injected fault
    pub faults_hit: u32,
}

/// In-RAM NOR flash of `SIZE` bytes mapped at a base address
pub struct SimFlash<const SIZE: usize> {
    memory: [u8; SIZE],
    base_address: u32,
    page_size: usize,
    sector_size: usize,
    unlocked: bool,
    program_faults: Vec<u32, MAX_FAULTS>,
    erase_faults: Vec<u32, MAX_FAULTS>,
    stats: SimStats,
}

impl<const SIZE: usize> SimFlash<SIZE> {
    /// Create an erased flash region
    ///
    /// # Panics
    /// If `sector_size` is not a multiple of `page_size` or `SIZE` is not a
    /// multiple of `sector_size`.
    pub fn new(base_address: u32, page_size: usize, sector_size: usize) -> Self {
        assert!(page_size > 0 && sector_size % page_size == 0);
        assert!(SIZE % sector_size == 0);
        Self {
            memory: [ERASED_BYTE; SIZE],
            base_address,
            page_size,
            sector_size,
            unlocked: false,
            program_faults: Vec::new(),
            erase_faults: Vec::new(),
            stats: SimStats::default(),
        }
    }

    /// Mapped address of the first byte
    pub fn base_address(&self) -> u32 {
        self.base_address
    }

    /// Region size in bytes
    pub const fn capacity(&self) -> usize {
        SIZE
    }

    /// Number of sectors in the region
    pub fn sector_count(&self) -> usize {
        SIZE / self.sector_size
    }

    /// Whole backing memory
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Bytes at a mapped address, or `None` if the range is outside the region
    pub fn bytes(&self, address: u32, len: usize) -> Option<&[u8]> {
        let start = self.index(address, len).ok()?;
        Some(&self.memory[start..start + len])
    }

    /// Check whether the control interface is currently locked
    pub fn is_locked(&self) -> bool {
        !self.unlocked
    }

    /// Get operation counters
    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Make every program of the page at `address` fail
    ///
    /// Returns false if the fault table is full.
    pub fn fail_program_at(&mut self, address: u32) -> bool {
        self.program_faults.push(address).is_ok()
    }

    /// Make every erase of the sector at `address` fail
    ///
    /// Returns false if the fault table is full.
    pub fn fail_erase_at(&mut self, address: u32) -> bool {
        self.erase_faults.push(address).is_ok()
    }

    /// Remove all injected faults
    pub fn clear_faults(&mut self) {
        self.program_faults.clear();
        self.erase_faults.clear();
    }

    /// Translate a mapped address range to a memory index
    fn index(&self, address: u32, len: usize) -> Result<usize, FlashError> {
        let start = address
            .checked_sub(self.base_address)
            .ok_or(FlashError::OutOfBounds)? as usize;
        match start.checked_add(len) {
            Some(end) if end <= SIZE => Ok(start),
            _ => Err(FlashError::OutOfBounds),
        }
    }
}

impl<const SIZE: usize> FlashController for SimFlash<SIZE> {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn unlock(&mut self) {
        self.stats.unlocks += 1;
        self.unlocked = true;
    }

    fn lock(&mut self) {
        self.stats.locks += 1;
        self.unlocked = false;
    }

    fn program_page(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        if !self.unlocked {
            return Err(FlashError::Locked);
        }
        if data.len() != self.page_size {
            return Err(FlashError::NotAligned);
        }
        let start = self.index(address, data.len())?;
        if start % self.page_size != 0 {
            return Err(FlashError::NotAligned);
        }
        if self.program_faults.contains(&address) {
            self.stats.faults_hit += 1;
            return Err(FlashError::Program);
        }

        for (cell, byte) in self.memory[start..start + data.len()].iter_mut().zip(data) {
            *cell &= *byte;
        }
        self.stats.pages_programmed += 1;
        Ok(())
    }

    fn erase_sector(&mut self, address: u32) -> Result<(), FlashError> {
        if !self.unlocked {
            return Err(FlashError::Locked);
        }
        let start = self.index(address, self.sector_size)?;
        if start % self.sector_size != 0 {
            return Err(FlashError::NotAligned);
        }
        if self.erase_faults.contains(&address) {
            self.stats.faults_hit += 1;
            return Err(FlashError::Erase);
        }

        self.memory[start..start + self.sector_size].fill(ERASED_BYTE);
        self.stats.sectors_erased += 1;
        Ok(())
    }

    fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), FlashError> {
        let start = self.index(address, buffer.len())?;
        buffer.copy_from_slice(&self.memory[start..start + buffer.len()]);
        Ok(())
    }
}
