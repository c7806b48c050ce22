//! Logical to physical address translation
//!
//! Block `n` of the device starts at `base + n * block_size`; there is no
//! header or superblock in front of block 0.

/// Physical address of `offset` within `block`
///
/// The caller guarantees `block < block_count` and `offset < block_size`.
pub const fn address(base: u32, block_size: u32, block: u32, offset: u32) -> u32 {
    base + block * block_size + offset
}

/// Physical address of `offset` within `block`, or `None` on overflow
pub const fn checked_address(base: u32, block_size: u32, block: u32, offset: u32) -> Option<u32> {
    let Some(block_start) = block.checked_mul(block_size) else {
        return None;
    };
    let Some(within) = block_start.checked_add(offset) else {
        return None;
    };
    base.checked_add(within)
}
