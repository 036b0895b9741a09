//! RAM-backed block device

use crate::allocator::{BitmapAllocator, BlockAllocator};
use crate::device::RamDiskConfig;
use crate::error::{Result, StorageError};
use std::collections::HashMap;

/// Block device whose blocks live in memory
///
/// Blocks are materialized on first write; an unwritten block reads as zeros.
/// Capacity is enforced by the allocator, not by the backing map.
pub struct RamDisk {
    config: RamDiskConfig,
    allocator: BitmapAllocator,
    blocks: HashMap<u64, Box<[u8]>>,
}

impl RamDisk {
    /// Create a device from a validated configuration record
    pub fn new(config: RamDiskConfig) -> Result<Self> {
        config.validate()?;

        Ok(RamDisk {
            config,
            allocator: BitmapAllocator::new(config.block_num as usize),
            blocks: HashMap::new(),
        })
    }

    pub fn config(&self) -> RamDiskConfig {
        self.config
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size as usize
    }

    pub fn free_blocks(&self) -> usize {
        self.allocator.free_blocks()
    }

    pub fn total_blocks(&self) -> usize {
        self.allocator.total_blocks()
    }

    fn check_block_id(&self, block_id: u64) -> Result<()> {
        if block_id >= self.config.block_num {
            return Err(StorageError::InvalidBlockId(block_id));
        }
        Ok(())
    }

    /// Read one block
    pub fn read_block(&self, block_id: u64) -> Result<Vec<u8>> {
        self.check_block_id(block_id)?;

        Ok(match self.blocks.get(&block_id) {
            Some(data) => data.to_vec(),
            None => vec![0u8; self.block_size()],
        })
    }

    /// Write one block (data must be exactly one block long)
    pub fn write_block(&mut self, block_id: u64, data: &[u8]) -> Result<()> {
        self.check_block_id(block_id)?;

        if data.len() != self.block_size() {
            return Err(StorageError::BlockSizeMismatch {
                expected: self.block_size(),
                actual: data.len(),
            });
        }

        self.blocks.insert(block_id, data.into());
        Ok(())
    }

    /// Allocate enough blocks for `content` and write it, zero-padding the tail
    pub fn write_extent(&mut self, content: &[u8]) -> Result<Vec<u64>> {
        let count = self.config.blocks_for(content.len() as u64);
        let block_ids = self.allocator.allocate(count)?;
        let block_size = self.block_size();

        for (chunk, &block_id) in content.chunks(block_size).zip(&block_ids) {
            let mut block = vec![0u8; block_size];
            block[..chunk.len()].copy_from_slice(chunk);
            self.write_block(block_id, &block)?;
        }

        Ok(block_ids)
    }

    /// Read `len` bytes spread over `block_ids`
    pub fn read_extent(&self, block_ids: &[u64], len: u64) -> Result<Vec<u8>> {
        let mut content = Vec::with_capacity(len as usize);

        for &block_id in block_ids {
            content.extend_from_slice(&self.read_block(block_id)?);
        }

        content.truncate(len as usize);
        Ok(content)
    }

    /// Release blocks back to the allocator
    pub fn release(&mut self, block_ids: &[u64]) -> Result<()> {
        self.allocator.free(block_ids)?;
        for block_id in block_ids {
            self.blocks.remove(block_id);
        }
        Ok(())
    }
}
