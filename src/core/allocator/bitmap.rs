//! Bitmap allocator for RAM disk blocks
//!
//! One bit per device block, 64 blocks per word. A set bit means the block
//! holds file content.

use super::BlockAllocator;
use crate::error::{Result, StorageError};

/// Word index and bit mask of a block
fn locate(block_id: u64) -> (usize, u64) {
    ((block_id / 64) as usize, 1u64 << (block_id % 64))
}

/// Bitmap over a fixed number of device blocks
#[derive(Debug, Clone)]
pub struct BitmapAllocator {
    words: Vec<u64>,
    total_blocks: usize,
    free_blocks: usize,
}

impl BitmapAllocator {
    pub fn new(total_blocks: usize) -> Self {
        BitmapAllocator {
            words: vec![0u64; (total_blocks + 63) / 64],
            total_blocks,
            free_blocks: total_blocks,
        }
    }

    /// Whether `block_id` currently holds content
    pub fn is_allocated(&self, block_id: u64) -> bool {
        if block_id >= self.total_blocks as u64 {
            return false;
        }
        let (word, mask) = locate(block_id);
        self.words[word] & mask != 0
    }

    /// Lowest clear bits, at most `count` of them
    ///
    /// Padding bits past `total_blocks` in the last word are never returned.
    fn scan_free(&self, count: usize) -> Vec<u64> {
        let mut found = Vec::with_capacity(count);

        for (idx, &word) in self.words.iter().enumerate() {
            let mut clear = !word;
            while clear != 0 && found.len() < count {
                let block_id = (idx * 64) as u64 + clear.trailing_zeros() as u64;
                if block_id >= self.total_blocks as u64 {
                    return found;
                }
                found.push(block_id);
                clear &= clear - 1;
            }
            if found.len() == count {
                break;
            }
        }

        found
    }
}

impl BlockAllocator for BitmapAllocator {
    fn allocate(&mut self, count: usize) -> Result<Vec<u64>> {
        if count > self.free_blocks {
            return Err(StorageError::OutOfSpace {
                requested: count,
                free: self.free_blocks,
            });
        }

        let blocks = self.scan_free(count);
        if blocks.len() < count {
            // Counter and bitmap disagree; nothing has been marked yet
            return Err(StorageError::OutOfSpace {
                requested: count,
                free: blocks.len(),
            });
        }

        for &block_id in &blocks {
            let (word, mask) = locate(block_id);
            self.words[word] |= mask;
        }
        self.free_blocks -= count;

        Ok(blocks)
    }

    fn free(&mut self, blocks: &[u64]) -> Result<()> {
        if let Some(&bad) = blocks.iter().find(|&&id| id >= self.total_blocks as u64) {
            return Err(StorageError::InvalidBlockId(bad));
        }

        for &block_id in blocks {
            let (word, mask) = locate(block_id);
            if self.words[word] & mask == 0 {
                tracing::warn!("Block {} freed twice", block_id);
                continue;
            }
            self.words[word] &= !mask;
            self.free_blocks += 1;
        }

        Ok(())
    }

    fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    fn free_blocks(&self) -> usize {
        self.free_blocks
    }
}
