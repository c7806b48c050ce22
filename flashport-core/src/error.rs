//! Block device errors and littlefs status codes

use flashport_hal::FlashError;

/// Success status code
pub const LFS_ERR_OK: i32 = 0;
/// Device I/O error status code
pub const LFS_ERR_IO: i32 = -5;
/// Invalid argument status code
pub const LFS_ERR_INVAL: i32 = -22;

/// Why a request was rejected before touching the flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InvalidArgument {
    /// Block index is not below the block count
    BlockOutOfRange,
    /// Offset or length is not a multiple of the read/program size
    Misaligned,
    /// Transfer runs past the end of the block
    OutOfBlockBounds,
    /// Physical address does not fit in 32 bits
    AddressOverflow,
}

/// Errors returned by every block device operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockDeviceError {
    /// Request violated the block device contract
    InvalidArgument(InvalidArgument),
    /// Flash controller reported a failure
    Device(FlashError),
}

impl BlockDeviceError {
    /// littlefs status code for this error
    pub const fn code(&self) -> i32 {
        match self {
            BlockDeviceError::InvalidArgument(_) => LFS_ERR_INVAL,
            BlockDeviceError::Device(_) => LFS_ERR_IO,
        }
    }

    /// Check if the flash hardware reported the failure
    pub const fn is_device_error(&self) -> bool {
        matches!(self, BlockDeviceError::Device(_))
    }
}

impl From<FlashError> for BlockDeviceError {
    fn from(e: FlashError) -> Self {
        BlockDeviceError::Device(e)
    }
}

impl From<InvalidArgument> for BlockDeviceError {
    fn from(e: InvalidArgument) -> Self {
        BlockDeviceError::InvalidArgument(e)
    }
}

impl core::fmt::Display for BlockDeviceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BlockDeviceError::InvalidArgument(InvalidArgument::BlockOutOfRange) => {
                f.write_str("block index out of range")
            }
            BlockDeviceError::InvalidArgument(InvalidArgument::Misaligned) => {
                f.write_str("offset or size not aligned")
            }
            BlockDeviceError::InvalidArgument(InvalidArgument::OutOfBlockBounds) => {
                f.write_str("transfer crosses the end of the block")
            }
            BlockDeviceError::InvalidArgument(InvalidArgument::AddressOverflow) => {
                f.write_str("physical address overflow")
            }
            BlockDeviceError::Device(e) => write!(f, "device error: {}", e),
        }
    }
}

/// Collapse an operation result into a littlefs status code
pub fn status(result: Result<(), BlockDeviceError>) -> i32 {
    match result {
        Ok(()) => LFS_ERR_OK,
        Err(e) => e.code(),
    }
}
