//! Block device adapter for on-chip NOR flash
//!
//! This crate lets a littlefs-style filesystem run directly on a
//! microcontroller's internal flash:
//!
//! - Configuration binding (block geometry and filesystem sizing hints)
//! - Logical block/offset to physical address translation
//! - Read, program, erase and sync paths over a `FlashController`
//! - littlefs status codes for every result
//! - Optional fatal escalation of erase failures
//!
//! ```text
//! ┌──────────────┐  read/prog/erase/sync  ┌──────────────────┐
//! │  filesystem  │ ─────────────────────▶ │ FlashBlockDevice │
//! └──────────────┘                        └──────────────────┘
//!                                                  │ unlock / program_page
//!                                                  │ erase_sector / lock
//!                                                  ▼
//!                                         ┌──────────────────┐
//!                                         │ FlashController  │
//!                                         └──────────────────┘
//! ```

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod address;
pub mod config;
pub mod device;
pub mod error;
pub mod policy;

pub use address::{address, checked_address};
pub use config::{BlockDeviceConfig, ConfigError, FlashGeometry};
pub use device::{BlockDevice, FlashBlockDevice};
pub use error::{status, BlockDeviceError, InvalidArgument};
pub use policy::{EscalateOnEraseFailure, FatalHandler, PanicOnFatal};

// Re-export the HAL so boards only depend on this crate
pub use flashport_hal as hal;
