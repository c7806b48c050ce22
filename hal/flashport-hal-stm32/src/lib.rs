//! STM32-specific flash binding for flashport
//!
//! This crate provides the storage partition layout and the internal
//! flash controller for STM32 chips, built on embassy-stm32's blocking
//! flash driver. Supported chips:
//!
//! - STM32F042F6 / STM32F042K6 (32KB flash, 1KB pages)
//!
//! # Features
//!
//! - `stm32f042f6` / `stm32f042k6` - Select the chip
//! - `defmt` - Enable debug formatting support

#![no_std]

pub mod flash;

// Re-export shared types from flashport-hal
pub use flashport_hal::{FlashController, FlashError};
