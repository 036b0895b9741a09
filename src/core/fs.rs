//! Filesystems visible to the query program
//!
//! [`FileSystem`] is the read-side interface a program sees once storage is
//! online. Two implementations exist:
//!
//! - [`RamFs`] - catalog plus RAM disk, populated at boot from the archive
//! - [`HostFs`] - a directory on a conventional OS
//!
//! The trait is object safe so the harness can pass `Arc<dyn FileSystem>`
//! around without caring which deployment it runs in.

use crate::catalog::{self, Catalog, FileMetadata, FileType};
use crate::device::RamDiskConfig;
use crate::error::{Result, StorageError};
use crate::ramdisk::RamDisk;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Maximum symlink hops before a lookup is treated as a loop
const MAX_SYMLINK_DEPTH: usize = 8;

/// Read-side filesystem interface
pub trait FileSystem: Send + Sync {
    /// Read the full contents of a file
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Check whether a path exists
    fn exists(&self, path: &str) -> bool;

    /// List the immediate children of a directory (names only, sorted)
    fn list(&self, dir: &str) -> Result<Vec<String>>;

    /// Read a file as UTF-8
    fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| {
            StorageError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }
}

/// Shared handle to a mounted filesystem
pub type SharedFs = Arc<dyn FileSystem>;

struct RamFsInner {
    disk: RamDisk,
    catalog: Catalog,
}

impl RamFsInner {
    /// Resolve symlinks until a non-link entry is reached
    fn resolve(&self, path: &str) -> Result<(String, &FileMetadata)> {
        let mut current = catalog::normalize(path)?;

        for _ in 0..=MAX_SYMLINK_DEPTH {
            let metadata = self
                .catalog
                .get(&current)
                .ok_or_else(|| StorageError::NotFound(current.clone()))?;

            match (&metadata.file_type, &metadata.link_target) {
                (FileType::Symlink, Some(target)) => {
                    let base = catalog::parent(&current).unwrap_or("/");
                    current = catalog::resolve_link(base, target)?;
                }
                _ => return Ok((current, metadata)),
            }
        }

        Err(StorageError::InvalidPath(format!(
            "{}: too many levels of symbolic links",
            path
        )))
    }

    fn mkdir_all(&mut self, path: &str, permissions: u32) -> Result<()> {
        if path == "/" {
            return Ok(());
        }

        if let Some(existing) = self.catalog.get(path) {
            return if existing.is_directory() {
                Ok(())
            } else {
                Err(StorageError::NotADirectory(path.to_string()))
            };
        }

        if let Some(parent) = catalog::parent(path) {
            self.mkdir_all(parent, 0o755)?;
        }

        self.catalog.insert(
            path.to_string(),
            FileMetadata::directory(permissions),
        );
        Ok(())
    }

    fn prepare_entry(&mut self, path: &str) -> Result<()> {
        if path == "/" {
            return Err(StorageError::IsADirectory(path.to_string()));
        }
        if let Some(parent) = catalog::parent(path) {
            self.mkdir_all(parent, 0o755)?;
        }
        if let Some(existing) = self.catalog.get(path) {
            if existing.is_directory() {
                return Err(StorageError::IsADirectory(path.to_string()));
            }
        }
        Ok(())
    }

    fn replace(&mut self, path: &str, metadata: FileMetadata) -> Result<()> {
        if let Some(previous) = self.catalog.insert(path.to_string(), metadata) {
            if !previous.blocks.is_empty() {
                self.disk.release(&previous.blocks)?;
            }
        }
        Ok(())
    }
}

/// Filesystem backed by a [`RamDisk`]
///
/// Safe to share between threads; writers take an exclusive lock, readers a
/// shared one.
pub struct RamFs {
    inner: RwLock<RamFsInner>,
}

impl RamFs {
    /// Format a new, empty filesystem on a fresh RAM disk
    pub fn new(config: RamDiskConfig) -> Result<Self> {
        let disk = RamDisk::new(config)?;
        debug!(
            "Formatted RAM disk: {} blocks of {} bytes",
            config.block_num, config.block_size
        );

        Ok(RamFs {
            inner: RwLock::new(RamFsInner {
                disk,
                catalog: Catalog::new(),
            }),
        })
    }

    /// Create a directory and any missing parents
    pub fn mkdir_all(&self, path: &str, permissions: u32) -> Result<()> {
        let path = catalog::normalize(path)?;
        self.inner.write().mkdir_all(&path, permissions)
    }

    /// Create or replace a regular file, creating parent directories
    ///
    /// Blocks are allocated before anything is added to the catalog, so a
    /// write that runs out of space leaves the tree unchanged.
    pub fn write(&self, path: &str, content: &[u8], permissions: u32) -> Result<()> {
        let path = catalog::normalize(path)?;
        let mut inner = self.inner.write();

        let blocks = inner.disk.write_extent(content)?;
        if let Err(e) = inner.prepare_entry(&path) {
            inner.disk.release(&blocks)?;
            return Err(e);
        }

        let metadata = FileMetadata::file(content.len() as u64, blocks, permissions);
        inner.replace(&path, metadata)
    }

    /// Block size of the underlying device
    pub fn block_size(&self) -> u64 {
        self.inner.read().disk.block_size() as u64
    }

    /// Create or replace a symbolic link
    pub fn symlink(&self, path: &str, target: &str) -> Result<()> {
        let path = catalog::normalize(path)?;
        let mut inner = self.inner.write();

        inner.prepare_entry(&path)?;
        inner.replace(&path, FileMetadata::symlink(target))
    }

    /// Metadata of an entry (symlinks are not followed)
    pub fn metadata(&self, path: &str) -> Result<FileMetadata> {
        let path = catalog::normalize(path)?;
        let inner = self.inner.read();

        if path == "/" {
            return Ok(FileMetadata::directory(0o755));
        }

        inner
            .catalog
            .get(&path)
            .cloned()
            .ok_or(StorageError::NotFound(path))
    }

    /// Number of catalog entries (files, directories and links)
    pub fn entry_count(&self) -> usize {
        self.inner.read().catalog.len()
    }

    /// Device capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.inner.read().disk.config().capacity()
    }

    /// Free space in bytes
    pub fn free_bytes(&self) -> u64 {
        let inner = self.inner.read();
        inner.disk.free_blocks() as u64 * inner.disk.block_size() as u64
    }

    /// Every path on the filesystem, sorted
    pub fn walk(&self) -> Vec<String> {
        self.inner
            .read()
            .catalog
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl FileSystem for RamFs {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let inner = self.inner.read();
        let (resolved, metadata) = inner.resolve(path)?;

        if metadata.is_directory() {
            return Err(StorageError::IsADirectory(resolved));
        }

        inner.disk.read_extent(&metadata.blocks, metadata.size)
    }

    fn exists(&self, path: &str) -> bool {
        match catalog::normalize(path) {
            Ok(path) => path == "/" || self.inner.read().catalog.get(&path).is_some(),
            Err(_) => false,
        }
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let normalized = catalog::normalize(dir)?;
        let resolved = if normalized == "/" {
            normalized
        } else {
            inner.resolve(&normalized)?.0
        };

        if !inner.catalog.is_directory(&resolved) {
            return Err(StorageError::NotADirectory(resolved));
        }

        Ok(inner
            .catalog
            .children(&resolved)
            .into_iter()
            .filter_map(|path| path.rsplit('/').next().map(str::to_string))
            .collect())
    }
}

/// Filesystem rooted at a host directory
pub struct HostFs {
    root: PathBuf,
}

impl HostFs {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        HostFs {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> Result<PathBuf> {
        let normalized = catalog::normalize(path)?;
        Ok(self.root.join(normalized.trim_start_matches('/')))
    }
}

impl FileSystem for HostFs {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let host_path = self.host_path(path)?;
        std::fs::read(&host_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::Io(e),
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.host_path(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let host_path = self.host_path(dir)?;
        if !host_path.is_dir() {
            return Err(StorageError::NotADirectory(dir.to_string()));
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&host_path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
