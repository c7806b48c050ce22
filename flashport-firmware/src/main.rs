//! Flashport bring-up firmware
//!
//! Mounts the internal flash storage partition of an STM32F042K6 as a
//! block device, validates its configuration and runs the read/program/
//! erase self test on block 0.
//!
//! The self test erases block 0 of the partition on every boot. Flash a
//! real application before storing data there.

#![no_std]
#![no_main]

mod selftest;

use defmt::*;
use embassy_executor::Spawner;
use embassy_time::Timer;
use {defmt_rtt as _, panic_probe as _};

use flashport_core::{BlockDevice, EscalateOnEraseFailure, FlashBlockDevice, FlashGeometry};
use flashport_hal_stm32::flash::{
    internal_flash, FLASH_PAGE_SIZE, STORAGE_BASE, STORAGE_BLOCK_COUNT,
};

/// Storage partition geometry (top of flash, one block per page)
const STORAGE_GEOMETRY: FlashGeometry =
    FlashGeometry::new(STORAGE_BASE, FLASH_PAGE_SIZE, STORAGE_BLOCK_COUNT);

/// Idle heartbeat interval
const HEARTBEAT_SECS: u64 = 5;

/// Main entry point
#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("Flashport firmware starting...");

    let p = embassy_stm32::init(Default::default());

    let controller = internal_flash(p.FLASH);
    let device = match FlashBlockDevice::bind_checked(controller, &STORAGE_GEOMETRY) {
        Ok(device) => device,
        Err(e) => defmt::panic!("Invalid storage geometry: {}", e),
    };

    // A failed erase leaves the partition in an unknown state; stop there
    let mut device = EscalateOnEraseFailure::new(device);

    let config = device.config();
    info!(
        "Storage mounted at {=u32:#x}: {} blocks x {} bytes (read {}, prog {}, cache {}, lookahead {}, cycles {})",
        config.base_address,
        config.block_count,
        config.block_size,
        config.read_size,
        config.prog_size,
        config.cache_size,
        config.lookahead_size,
        config.block_cycles,
    );

    match selftest::run(&mut device) {
        Ok(()) => info!("Storage self test passed"),
        Err(e) => error!("Storage self test failed: {} (status {})", e, e.code()),
    }

    loop {
        Timer::after_secs(HEARTBEAT_SECS).await;
        debug!("Idle");
    }
}
