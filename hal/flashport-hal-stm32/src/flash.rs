//! Internal flash controller for STM32F0
//!
//! STM32F042 has 32KB flash with 1KB pages (the erase unit). The top 8KB
//! hold the filesystem partition; the firmware image lives below it.
//!
//! embassy-stm32's blocking `Flash` writes the unlock keys and sets the
//! lock bit around every write/erase call, and implements the
//! `embedded-storage` `NorFlash` trait. The controller here is that driver
//! behind [`NorFlashController`].

use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::peripherals::FLASH;
use embassy_stm32::Peri;

// Re-export shared types from flashport-hal
pub use flashport_hal::{FlashError, NorFlashController};

/// Address where flash offset 0 is mapped
pub const FLASH_BASE: u32 = 0x0800_0000;

/// Flash size of STM32F042x6
#[cfg(any(feature = "stm32f042f6", feature = "stm32f042k6"))]
pub const FLASH_SIZE: u32 = 32 * 1024; // 32KB
#[cfg(any(feature = "stm32f042f6", feature = "stm32f042k6"))]
pub const STORAGE_PARTITION_SIZE: u32 = 8 * 1024; // 8KB (8 pages)

#[cfg(not(any(feature = "stm32f042f6", feature = "stm32f042k6")))]
pub const FLASH_SIZE: u32 = 32 * 1024; // Default
#[cfg(not(any(feature = "stm32f042f6", feature = "stm32f042k6")))]
pub const STORAGE_PARTITION_SIZE: u32 = 8 * 1024;

/// Erase unit; one filesystem block
pub const FLASH_PAGE_SIZE: u32 = 1024; // 1KB pages

/// Bytes handed to the driver per program call
///
/// The hardware programs half-words; 16 bytes keeps the filesystem's
/// program size at the usual minimum.
pub const PROGRAM_SIZE: usize = 16;

/// Mapped address of the first storage block
pub const STORAGE_BASE: u32 = FLASH_BASE + FLASH_SIZE - STORAGE_PARTITION_SIZE;

/// Number of blocks in the storage partition
pub const STORAGE_BLOCK_COUNT: u32 = STORAGE_PARTITION_SIZE / FLASH_PAGE_SIZE;

/// Mapped address range of the storage partition
pub const STORAGE_RANGE: core::ops::Range<u32> = STORAGE_BASE..(FLASH_BASE + FLASH_SIZE);

/// STM32 internal flash controller
pub type InternalFlash<'d> = NorFlashController<Flash<'d, Blocking>>;

/// Take the flash peripheral and wrap it as a flash controller
pub fn internal_flash(flash: Peri<'_, FLASH>) -> InternalFlash<'_> {
    NorFlashController::with_page_size(Flash::new_blocking(flash), FLASH_BASE, PROGRAM_SIZE)
}
