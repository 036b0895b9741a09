//! Storage layer: RAM disk, filesystem and archive extraction

pub mod allocator;
pub mod catalog;
pub mod device;
pub mod error;
pub mod fs;
pub mod ramdisk;
pub mod storage;
pub mod untar;
