//! Flashport Hardware Abstraction Layer
//!
//! This crate defines the flash controller capability that the block
//! device adapter in `flashport-core` drives. Chip-specific crates
//! implement it for their on-chip flash; tests implement it with the
//! simulated NOR flash in [`sim`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Filesystem library (littlefs-style)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  flashport-core (block device adapter)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  flashport-hal (this crate - traits)    │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ flashport-hal-│       │   SimFlash    │
//! │     stm32     │       │ (host tests)  │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`flash::FlashController`] - Unlock / program / erase / lock primitives
//! - [`nor::NorFlashController`] - Adapter from `embedded-storage` NOR flash

#![no_std]
#![deny(unsafe_code)]

pub mod flash;
pub mod nor;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

// Re-export key traits at crate root for convenience
pub use flash::{FlashController, FlashError, ERASED_BYTE};
pub use nor::NorFlashController;
#[cfg(any(test, feature = "sim"))]
pub use sim::SimFlash;
