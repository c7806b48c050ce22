//! Flash controller abstractions
//!
//! Provides the primitive operations of an on-chip NOR flash controller.
//! Addresses are absolute: the value the CPU sees when the flash is mapped
//! into its address space.

/// Value of every byte in an erased sector
pub const ERASED_BYTE: u8 = 0xFF;

/// Errors reported by the flash controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Program or erase issued while the control interface is locked
    Locked,
    /// Address or length not aligned to the page/sector granularity
    NotAligned,
    /// Address range outside the flash region
    OutOfBounds,
    /// Hardware reported a program failure
    Program,
    /// Hardware reported an erase failure
    Erase,
    /// Mapped read failed
    Read,
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            FlashError::Locked => "flash control interface is locked",
            FlashError::NotAligned => "flash access not aligned",
            FlashError::OutOfBounds => "flash access out of bounds",
            FlashError::Program => "flash program failed",
            FlashError::Erase => "flash erase failed",
            FlashError::Read => "flash read failed",
        };
        f.write_str(msg)
    }
}

/// Flash controller trait
///
/// The controller is a singleton shared resource. Callers bracket program
/// and erase with [`unlock`](FlashController::unlock) and
/// [`lock`](FlashController::lock) and must not interleave any other
/// controller access in between, including from interrupt context.
pub trait FlashController {
    /// Programming granularity in bytes
    ///
    /// Each [`program_page`](FlashController::program_page) call consumes
    /// exactly this many bytes.
    fn page_size(&self) -> usize;

    /// Erase granularity in bytes
    fn sector_size(&self) -> usize;

    /// Unlock the control interface for program/erase
    fn unlock(&mut self);

    /// Lock the control interface again
    fn lock(&mut self);

    /// Program one page at `address`
    ///
    /// # Arguments
    /// * `address` - Page-aligned absolute address
    /// * `data` - Exactly [`page_size`](FlashController::page_size) bytes
    ///
    /// Programming can only clear bits; the caller is responsible for the
    /// target having been erased.
    fn program_page(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Erase the sector starting at `address`
    ///
    /// On success every byte of the sector reads back as [`ERASED_BYTE`].
    fn erase_sector(&mut self, address: u32) -> Result<(), FlashError>;

    /// Copy mapped flash contents starting at `address` into `buffer`
    ///
    /// Reads are plain memory loads and need no unlock.
    fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), FlashError>;
}

impl<T: FlashController + ?Sized> FlashController for &mut T {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn sector_size(&self) -> usize {
        (**self).sector_size()
    }

    fn unlock(&mut self) {
        (**self).unlock()
    }

    fn lock(&mut self) {
        (**self).lock()
    }

    fn program_page(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        (**self).program_page(address, data)
    }

    fn erase_sector(&mut self, address: u32) -> Result<(), FlashError> {
        (**self).erase_sector(address)
    }

    fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), FlashError> {
        (**self).read(address, buffer)
    }
}
