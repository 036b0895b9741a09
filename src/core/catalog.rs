//! Path catalog for the RAM filesystem
//!
//! The catalog maps normalized absolute paths (`/data/orders.csv`) to file
//! metadata and block locations. The root directory is implicit.

use crate::error::{Result, StorageError};
use std::collections::BTreeMap;

/// File type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
}

/// File metadata stored in the catalog
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// File type
    pub file_type: FileType,

    /// File size in bytes
    pub size: u64,

    /// Block IDs where content is stored
    pub blocks: Vec<u64>,

    /// Unix permissions (e.g., 0o755)
    pub permissions: u32,

    /// Link target for symlinks
    pub link_target: Option<String>,
}

impl FileMetadata {
    pub fn file(size: u64, blocks: Vec<u64>, permissions: u32) -> Self {
        FileMetadata {
            file_type: FileType::File,
            size,
            blocks,
            permissions,
            link_target: None,
        }
    }

    pub fn directory(permissions: u32) -> Self {
        FileMetadata {
            file_type: FileType::Directory,
            size: 0,
            blocks: Vec::new(),
            permissions,
            link_target: None,
        }
    }

    pub fn symlink(target: impl Into<String>) -> Self {
        FileMetadata {
            file_type: FileType::Symlink,
            size: 0,
            blocks: Vec::new(),
            permissions: 0o777,
            link_target: Some(target.into()),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// Normalize a path to `/a/b` form
///
/// Empty and `.` components are dropped. `..` is rejected: the catalog never
/// resolves upward, so an archive cannot address anything outside its root.
pub fn normalize(path: &str) -> Result<String> {
    let mut normalized = String::with_capacity(path.len() + 1);

    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(StorageError::InvalidPath(path.to_string())),
            name => {
                normalized.push('/');
                normalized.push_str(name);
            }
        }
    }

    if normalized.is_empty() {
        normalized.push('/');
    }

    Ok(normalized)
}

/// Resolve a symlink `target` found in directory `base`
///
/// Unlike [`normalize`], `..` is collapsed against the path built so far.
/// A target that climbs above the root is rejected.
pub fn resolve_link(base: &str, target: &str) -> Result<String> {
    let mut components: Vec<&str> = Vec::new();
    if !target.starts_with('/') {
        components.extend(base.split('/').filter(|c| !c.is_empty()));
    }

    for component in target.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                if components.pop().is_none() {
                    return Err(StorageError::InvalidPath(format!(
                        "{}: link target escapes the root",
                        target
                    )));
                }
            }
            name => components.push(name),
        }
    }

    Ok(format!("/{}", components.join("/")))
}

/// Parent of a normalized path (`None` for the root)
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Catalog of every entry on the filesystem
#[derive(Debug, Default)]
pub struct Catalog {
    entries: BTreeMap<String, FileMetadata>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Insert or replace metadata; returns the previous entry
    pub fn insert(&mut self, path: String, metadata: FileMetadata) -> Option<FileMetadata> {
        self.entries.insert(path, metadata)
    }

    pub fn get(&self, path: &str) -> Option<&FileMetadata> {
        self.entries.get(path)
    }

    /// Whether `path` names a directory (the root always does)
    pub fn is_directory(&self, path: &str) -> bool {
        path == "/" || self.entries.get(path).is_some_and(|m| m.is_directory())
    }

    /// Immediate children of a directory, as full paths
    pub fn children(&self, dir: &str) -> Vec<String> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };

        self.entries
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileMetadata)> {
        self.entries.iter()
    }
}
