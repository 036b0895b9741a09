//! Property-based tests for allocator correctness
//!
//! Uses proptest to verify bitmap allocator invariants across random
//! allocate/free sequences

use ivm_harness::allocator::{BitmapAllocator, BlockAllocator};
use proptest::prelude::*;
use std::collections::HashSet;

proptest! {
    #[test]
    fn prop_no_double_allocation(
        total in 1usize..300,
        requests in prop::collection::vec(0usize..40, 1..30),
    ) {
        let mut alloc = BitmapAllocator::new(total);
        let mut seen = HashSet::new();

        for count in requests {
            match alloc.allocate(count) {
                Ok(blocks) => {
                    prop_assert_eq!(blocks.len(), count);
                    for block in blocks {
                        prop_assert!((block as usize) < total, "block {} out of range", block);
                        prop_assert!(seen.insert(block), "Block {} allocated twice!", block);
                    }
                }
                Err(_) => prop_assert!(count > alloc.free_blocks()),
            }
            prop_assert_eq!(alloc.free_blocks() + seen.len(), total);
        }
    }

    #[test]
    fn prop_free_restores_capacity(
        total in 8usize..200,
        batches in prop::collection::vec(1usize..8, 1..20),
    ) {
        let mut alloc = BitmapAllocator::new(total);
        let mut held = Vec::new();

        for count in batches {
            if let Ok(blocks) = alloc.allocate(count) {
                held.push(blocks);
            }
        }

        for blocks in held.iter().rev() {
            alloc.free(blocks).unwrap();
        }

        prop_assert_eq!(alloc.free_blocks(), total);
        prop_assert_eq!(alloc.total_blocks(), total);
        prop_assert_eq!(alloc.allocate(total).unwrap().len(), total);
    }
}
