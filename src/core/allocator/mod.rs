//! Block allocation for the RAM disk
//!
//! Blocks are tracked by a bitmap; file content does not need to be
//! contiguous, so a single strategy covers every file size.

pub mod bitmap;

pub use bitmap::BitmapAllocator;

use crate::error::Result;

/// Block allocator trait
///
/// Defines the interface for allocating and freeing blocks on a device.
pub trait BlockAllocator {
    /// Allocate `count` blocks
    ///
    /// Returns the block IDs that have been allocated. Either all of them are
    /// allocated or none are.
    fn allocate(&mut self, count: usize) -> Result<Vec<u64>>;

    /// Free previously allocated blocks
    fn free(&mut self, blocks: &[u64]) -> Result<()>;

    /// Get total number of blocks managed
    fn total_blocks(&self) -> usize;

    /// Get number of free blocks available
    fn free_blocks(&self) -> usize;
}
