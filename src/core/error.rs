use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid block size: {0} (must be a non-zero power of two)")]
    InvalidBlockSize(u32),

    #[error("Invalid block count: {0}")]
    InvalidBlockCount(u64),

    #[error("Out of space: {requested} blocks requested, {free} free")]
    OutOfSpace { requested: usize, free: usize },

    #[error("Invalid block ID: {0}")]
    InvalidBlockId(u64),

    #[error("Block data must be exactly {expected} bytes, got {actual}")]
    BlockSizeMismatch { expected: usize, actual: usize },

    #[error("No device configured")]
    NoDevice,

    #[error("Device already configured")]
    AlreadyConfigured,

    #[error("Unsupported device table: expected exactly one record, got {0}")]
    DeviceCount(usize),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Archive extraction failure
///
/// Each variant maps onto the integer status reported by the storage
/// service; see [`crate::untar::ExtractStatus`].
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid header checksum: {0}")]
    InvalidChecksum(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported path in archive: {0}")]
    UnsupportedPath(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
