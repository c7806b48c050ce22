//! Failure escalation policy
//!
//! The block device reports every failure as a [`BlockDeviceError`]. Boards
//! that treat a failed erase as unrecoverable wrap the device in
//! [`EscalateOnEraseFailure`], which hands the error to a
//! [`FatalHandler`] instead of returning it. Control never comes back from
//! the handler.

use crate::config::BlockDeviceConfig;
use crate::device::BlockDevice;
use crate::error::BlockDeviceError;

/// Non-resumable failure handler
pub trait FatalHandler {
    /// Handle an unrecoverable device failure
    fn fatal(&mut self, error: BlockDeviceError) -> !;
}

/// Fatal handler that panics
///
/// On target the panic lands in the firmware's panic handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicOnFatal;

impl FatalHandler for PanicOnFatal {
    fn fatal(&mut self, error: BlockDeviceError) -> ! {
        panic!("unrecoverable flash failure: {}", error)
    }
}

/// Block device decorator that escalates erase failures
///
/// Hardware erase failures go to the fatal handler. Invalid arguments and
/// every other operation's result pass through unchanged.
pub struct EscalateOnEraseFailure<D, H = PanicOnFatal> {
    device: D,
    handler: H,
}

impl<D: BlockDevice> EscalateOnEraseFailure<D> {
    /// Wrap a device, panicking on erase failure
    pub fn new(device: D) -> Self {
        Self::with_handler(device, PanicOnFatal)
    }
}

impl<D: BlockDevice, H: FatalHandler> EscalateOnEraseFailure<D, H> {
    /// Wrap a device with a custom fatal handler
    pub fn with_handler(device: D, handler: H) -> Self {
        Self { device, handler }
    }

    /// Get the wrapped device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Get the wrapped device for low-level access
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Remove the policy, returning the device
    pub fn into_inner(self) -> D {
        self.device
    }
}

impl<D: BlockDevice, H: FatalHandler> BlockDevice for EscalateOnEraseFailure<D, H> {
    fn config(&self) -> &BlockDeviceConfig {
        self.device.config()
    }

    fn read(&mut self, block: u32, offset: u32, buffer: &mut [u8]) -> Result<(), BlockDeviceError> {
        self.device.read(block, offset, buffer)
    }

    fn prog(&mut self, block: u32, offset: u32, data: &[u8]) -> Result<(), BlockDeviceError> {
        self.device.prog(block, offset, data)
    }

    fn erase(&mut self, block: u32) -> Result<(), BlockDeviceError> {
        match self.device.erase(block) {
            Err(e) if e.is_device_error() => {
                #[cfg(feature = "defmt")]
                defmt::error!("Erase of block {} failed: {}", block, e);
                self.handler.fatal(e)
            }
            result => result,
        }
    }

    fn sync(&mut self) -> Result<(), BlockDeviceError> {
        self.device.sync()
    }
}
