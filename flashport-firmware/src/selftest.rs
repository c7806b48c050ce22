//! Storage self test
//!
//! Exercises erase, program, read and sync on block 0 and checks the NOR
//! flash semantics the filesystem relies on. Leaves block 0 erased.

use defmt::*;

use flashport_core::hal::ERASED_BYTE;
use flashport_core::{BlockDevice, BlockDeviceError};

/// Pattern written at offset 0
const MESSAGE: &[u8; 16] = b"Hello littlefs!\0";

/// Self test failures
#[derive(Debug, Clone, Copy, defmt::Format)]
pub enum SelfTestError {
    /// Block device operation failed
    Device(BlockDeviceError),
    /// Erased block did not read back as all ones
    NotErased,
    /// Programmed data did not read back
    Mismatch,
    /// Reprogramming set bits instead of clearing them
    NotMonotonic,
}

impl SelfTestError {
    /// littlefs-style status code for logging
    pub fn code(&self) -> i32 {
        match self {
            SelfTestError::Device(e) => e.code(),
            _ => flashport_core::error::LFS_ERR_IO,
        }
    }
}

impl From<BlockDeviceError> for SelfTestError {
    fn from(e: BlockDeviceError) -> Self {
        SelfTestError::Device(e)
    }
}

/// Run the self test on block 0
pub fn run<D: BlockDevice>(device: &mut D) -> Result<(), SelfTestError> {
    let mut buffer = [0u8; 16];

    device.erase(0)?;
    device.read(0, 0, &mut buffer)?;
    if buffer.iter().any(|&b| b != ERASED_BYTE) {
        return Err(SelfTestError::NotErased);
    }
    debug!("Block 0 erased");

    device.prog(0, 0, MESSAGE)?;
    device.read(0, 0, &mut buffer)?;
    if &buffer != MESSAGE {
        return Err(SelfTestError::Mismatch);
    }
    debug!("Read back {=[u8]:a}", &buffer[..MESSAGE.len() - 1]);

    // Programming over programmed cells can only clear bits
    device.prog(0, 16, &[0xF0; 16])?;
    device.prog(0, 16, &[0x3C; 16])?;
    device.read(0, 16, &mut buffer)?;
    if buffer != [0x30; 16] {
        return Err(SelfTestError::NotMonotonic);
    }

    device.sync()?;
    device.erase(0)?;
    Ok(())
}
