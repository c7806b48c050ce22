//! `embedded-storage` NOR flash adapter
//!
//! Chip HALs (embassy-stm32, embassy-rp, esp-storage, ...) expose their
//! internal flash through the `embedded-storage` [`NorFlash`] trait. This
//! adapter turns such a driver into a [`FlashController`] by translating
//! mapped addresses into flash offsets.
//!
//! `NorFlash` drivers run the controller key sequence around every call,
//! so [`unlock`](FlashController::unlock) and
//! [`lock`](FlashController::lock) only track the bracket here. Program and
//! erase outside the bracket are still rejected with
//! [`FlashError::Locked`].

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};

use crate::flash::{FlashController, FlashError};

/// [`FlashController`] over any `embedded-storage` NOR flash driver
pub struct NorFlashController<F> {
    flash: F,
    /// Mapped address of flash offset 0
    base_address: u32,
    page_size: usize,
    unlocked: bool,
}

impl<F: NorFlash> NorFlashController<F> {
    /// Wrap a driver whose offset 0 is mapped at `base_address`
    ///
    /// The programming granularity is the driver's `WRITE_SIZE`.
    pub fn new(flash: F, base_address: u32) -> Self {
        Self::with_page_size(flash, base_address, F::WRITE_SIZE)
    }

    /// Wrap a driver with a programming granularity larger than `WRITE_SIZE`
    ///
    /// `page_size` is rounded up to a multiple of `WRITE_SIZE`.
    pub fn with_page_size(flash: F, base_address: u32, page_size: usize) -> Self {
        let page_size = page_size.max(1).div_ceil(F::WRITE_SIZE) * F::WRITE_SIZE;
        Self {
            flash,
            base_address,
            page_size,
            unlocked: false,
        }
    }

    /// Mapped address of flash offset 0
    pub fn base_address(&self) -> u32 {
        self.base_address
    }

    /// Get the wrapped driver for low-level access
    pub fn flash(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Release the wrapped driver
    pub fn release(self) -> F {
        self.flash
    }

    /// Translate a mapped address range into a driver offset
    fn offset(&self, address: u32, len: usize) -> Result<u32, FlashError> {
        let offset = address
            .checked_sub(self.base_address)
            .ok_or(FlashError::OutOfBounds)?;
        let end = (offset as usize)
            .checked_add(len)
            .ok_or(FlashError::OutOfBounds)?;
        if end > self.flash.capacity() {
            return Err(FlashError::OutOfBounds);
        }
        Ok(offset)
    }

    fn ensure_unlocked(&self) -> Result<(), FlashError> {
        if self.unlocked {
            Ok(())
        } else {
            Err(FlashError::Locked)
        }
    }
}

/// Map a driver error onto the HAL error, using `other` for hardware failures
fn map_error<E: NorFlashError>(error: E, other: FlashError) -> FlashError {
    match error.kind() {
        NorFlashErrorKind::NotAligned => FlashError::NotAligned,
        NorFlashErrorKind::OutOfBounds => FlashError::OutOfBounds,
        _ => other,
    }
}

impl<F: NorFlash> FlashController for NorFlashController<F> {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn sector_size(&self) -> usize {
        F::ERASE_SIZE
    }

    fn unlock(&mut self) {
        self.unlocked = true;
    }

    fn lock(&mut self) {
        self.unlocked = false;
    }

    fn program_page(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        self.ensure_unlocked()?;
        if data.len() != self.page_size {
            return Err(FlashError::NotAligned);
        }
        let offset = self.offset(address, data.len())?;
        self.flash
            .write(offset, data)
            .map_err(|e| map_error(e, FlashError::Program))
    }

    fn erase_sector(&mut self, address: u32) -> Result<(), FlashError> {
        self.ensure_unlocked()?;
        let offset = self.offset(address, F::ERASE_SIZE)?;
        if offset as usize % F::ERASE_SIZE != 0 {
            return Err(FlashError::NotAligned);
        }
        self.flash
            .erase(offset, offset + F::ERASE_SIZE as u32)
            .map_err(|e| map_error(e, FlashError::Erase))
    }

    fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), FlashError> {
        let offset = self.offset(address, buffer.len())?;
        self.flash
            .read(offset, buffer)
            .map_err(|e| map_error(e, FlashError::Read))
    }
}
