//! Block device geometry and configuration
//!
//! The geometry of the flash region is fixed at build time by the board
//! crate. [`BlockDeviceConfig::from_geometry`] turns it into the record a
//! littlefs-style filesystem expects at mount time.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::address::checked_address;

/// Minimum read granularity in bytes
pub const DEFAULT_READ_SIZE: u32 = 16;

/// Expected erase cycles before the filesystem relocates a metadata block
pub const DEFAULT_BLOCK_CYCLES: i32 = 500;

/// Filesystem cache size in bytes (raised to the program size if larger)
pub const DEFAULT_CACHE_SIZE: u32 = 16;

/// Lookahead buffer size in bytes
pub const DEFAULT_LOOKAHEAD_SIZE: u32 = 16;

/// Physical layout of the flash region backing the block device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlashGeometry {
    /// Mapped address of the first sector
    pub base_address: u32,
    /// Erase granularity in bytes
    pub sector_size: u32,
    /// Number of sectors in the region
    pub sector_count: u32,
}

impl FlashGeometry {
    /// Create a new geometry description
    pub const fn new(base_address: u32, sector_size: u32, sector_count: u32) -> Self {
        Self {
            base_address,
            sector_size,
            sector_count,
        }
    }

    /// Region size in bytes
    pub const fn size(&self) -> u64 {
        self.sector_size as u64 * self.sector_count as u64
    }
}

/// Errors from configuration validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A size or count field is zero
    ZeroSize,
    /// Block size is not a multiple of the read size
    ReadSizeMismatch,
    /// Block size is not a multiple of the program size
    ProgSizeMismatch,
    /// Cache size is not a multiple of read/program size or does not divide the block size
    CacheSizeMismatch,
    /// Lookahead size is not a multiple of 8
    LookaheadSizeMismatch,
    /// Region extends past the end of the 32-bit address space
    AddressOverflow,
    /// Block size differs from the controller's sector size
    SectorSizeMismatch,
    /// Program size is not a multiple of the controller's page size
    PageSizeMismatch,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            ConfigError::ZeroSize => "size or count is zero",
            ConfigError::ReadSizeMismatch => "block size is not a multiple of read size",
            ConfigError::ProgSizeMismatch => "block size is not a multiple of program size",
            ConfigError::CacheSizeMismatch => "cache size does not fit read/program/block sizes",
            ConfigError::LookaheadSizeMismatch => "lookahead size is not a multiple of 8",
            ConfigError::AddressOverflow => "region overflows the address space",
            ConfigError::SectorSizeMismatch => "block size differs from sector size",
            ConfigError::PageSizeMismatch => "program size is not a multiple of page size",
        };
        f.write_str(msg)
    }
}

/// Block device configuration handed to the filesystem at mount time
///
/// Constructed once and immutable afterwards. Field names and meaning
/// follow the littlefs `lfs_config` geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockDeviceConfig {
    /// Mapped address of block 0
    pub base_address: u32,
    /// Minimum read size; read offsets and lengths are multiples of this
    pub read_size: u32,
    /// Minimum program size; program offsets and lengths are multiples of this
    pub prog_size: u32,
    /// Logical erase unit, equal to one flash sector
    pub block_size: u32,
    /// Number of logical blocks
    pub block_count: u32,
    /// Erase-cycle endurance hint (informational)
    pub block_cycles: i32,
    /// Filesystem cache size hint
    pub cache_size: u32,
    /// Filesystem lookahead buffer size hint
    pub lookahead_size: u32,
}

impl BlockDeviceConfig {
    /// Populate the configuration from the region geometry
    ///
    /// `page_size` is the controller's programming granularity and becomes
    /// the program size. Always succeeds; see [`validate`](Self::validate).
    pub const fn from_geometry(geometry: &FlashGeometry, page_size: u32) -> Self {
        let cache_size = if page_size > DEFAULT_CACHE_SIZE {
            page_size
        } else {
            DEFAULT_CACHE_SIZE
        };
        Self {
            base_address: geometry.base_address,
            read_size: DEFAULT_READ_SIZE,
            prog_size: page_size,
            block_size: geometry.sector_size,
            block_count: geometry.sector_count,
            block_cycles: DEFAULT_BLOCK_CYCLES,
            cache_size,
            lookahead_size: DEFAULT_LOOKAHEAD_SIZE,
        }
    }

    /// Geometry of the region this configuration covers
    pub const fn geometry(&self) -> FlashGeometry {
        FlashGeometry::new(self.base_address, self.block_size, self.block_count)
    }

    /// Total size in bytes
    pub const fn capacity(&self) -> u64 {
        self.block_size as u64 * self.block_count as u64
    }

    /// Physical address of `offset` within `block`
    ///
    /// Returns `None` on address overflow. Does not check the block range.
    pub const fn address(&self, block: u32, offset: u32) -> Option<u32> {
        checked_address(self.base_address, self.block_size, block, offset)
    }

    /// Check the configuration the way the filesystem does at mount
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_size == 0
            || self.prog_size == 0
            || self.block_size == 0
            || self.block_count == 0
            || self.cache_size == 0
            || self.lookahead_size == 0
        {
            return Err(ConfigError::ZeroSize);
        }
        if self.block_size % self.read_size != 0 {
            return Err(ConfigError::ReadSizeMismatch);
        }
        if self.block_size % self.prog_size != 0 {
            return Err(ConfigError::ProgSizeMismatch);
        }
        if self.cache_size % self.read_size != 0
            || self.cache_size % self.prog_size != 0
            || self.block_size % self.cache_size != 0
        {
            return Err(ConfigError::CacheSizeMismatch);
        }
        if self.lookahead_size % 8 != 0 {
            return Err(ConfigError::LookaheadSizeMismatch);
        }

        // The last byte of the region must still be addressable
        let end = self.base_address as u64 + self.capacity();
        if end > u32::MAX as u64 + 1 {
            return Err(ConfigError::AddressOverflow);
        }

        Ok(())
    }
}
