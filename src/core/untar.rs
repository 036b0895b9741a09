//! Tar extraction from memory onto a [`RamFs`]
//!
//! Mirrors the RTOS "untar from memory" service: the whole archive image is
//! walked once, every entry is materialized on the filesystem, and progress
//! is printed one line per entry to a caller-supplied sink. The outcome is an
//! [`ExtractStatus`] code; `0` is the only success.

use crate::catalog;
use crate::error::{ExtractError, StorageError};
use crate::fs::{FileSystem, RamFs};
use std::io::{Read, Write};
use tar::{Archive, EntryType};
use tracing::{debug, info, warn};

/// Integer status of an extraction run
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStatus {
    Successful = 0,
    Fail = 1,
    InvalidChecksum = 2,
    InvalidHeader = 3,
}

impl ExtractStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExtractStatus::Successful
    }
}

impl ExtractError {
    /// Status code reported for this failure
    pub fn status(&self) -> ExtractStatus {
        match self {
            ExtractError::InvalidChecksum(_) => ExtractStatus::InvalidChecksum,
            ExtractError::InvalidHeader(_) => ExtractStatus::InvalidHeader,
            ExtractError::UnsupportedPath(_)
            | ExtractError::Storage(_)
            | ExtractError::Io(_) => ExtractStatus::Fail,
        }
    }
}

/// What an extraction run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub files: usize,
    pub directories: usize,
    pub links: usize,
    pub skipped: usize,
    /// Unpacked content bytes
    pub bytes: u64,
}

/// The tar crate reports header problems as plain I/O errors
fn classify_header_error(err: std::io::Error) -> ExtractError {
    let message = err.to_string();
    if message.contains("checksum") {
        ExtractError::InvalidChecksum(message)
    } else {
        ExtractError::InvalidHeader(message)
    }
}

/// Validate an archive member name and normalize it
fn member_path(raw: &str) -> Result<String, ExtractError> {
    if raw.starts_with('/') {
        return Err(ExtractError::UnsupportedPath(raw.to_string()));
    }
    catalog::normalize(raw).map_err(|_| ExtractError::UnsupportedPath(raw.to_string()))
}

/// Reject an entry whose declared size cannot fit on the device
fn ensure_fits(fs: &RamFs, size: u64) -> Result<(), ExtractError> {
    let block_size = fs.block_size();
    let free = fs.free_bytes();
    if size > free {
        return Err(ExtractError::Storage(StorageError::OutOfSpace {
            requested: usize::try_from(size.div_ceil(block_size)).unwrap_or(usize::MAX),
            free: (free / block_size) as usize,
        }));
    }
    Ok(())
}

/// Extract `image` onto `fs`, printing one progress line per entry
pub fn untar_from_memory(
    image: &[u8],
    fs: &RamFs,
    printer: &mut dyn Write,
) -> Result<ExtractReport, ExtractError> {
    let mut archive = Archive::new(image);
    let mut report = ExtractReport::default();

    info!("Extracting {} byte archive image", image.len());

    for entry in archive.entries()? {
        let mut entry = entry.map_err(classify_header_error)?;

        let raw = entry
            .path()
            .map_err(classify_header_error)?
            .to_string_lossy()
            .into_owned();
        let path = member_path(&raw)?;
        let mode = entry.header().mode().unwrap_or(0o644) & 0o7777;
        let entry_type = entry.header().entry_type();

        match entry_type {
            EntryType::Regular | EntryType::Continuous => {
                let size = entry.size();
                ensure_fits(fs, size)?;
                let mut content = Vec::new();
                entry.by_ref().take(size).read_to_end(&mut content)?;
                fs.write(&path, &content, mode)?;
                report.files += 1;
                report.bytes += content.len() as u64;
            }
            EntryType::Directory => {
                fs.mkdir_all(&path, mode)?;
                report.directories += 1;
            }
            EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .map_err(classify_header_error)?
                    .ok_or_else(|| ExtractError::InvalidHeader(format!("{}: missing link target", raw)))?
                    .to_string_lossy()
                    .into_owned();
                fs.symlink(&path, &target)?;
                report.links += 1;
            }
            EntryType::Link => {
                // Hard links are materialized as copies of their target
                let target = entry
                    .link_name()
                    .map_err(classify_header_error)?
                    .ok_or_else(|| ExtractError::InvalidHeader(format!("{}: missing link target", raw)))?
                    .to_string_lossy()
                    .into_owned();
                let target = member_path(&target)?;
                let content = fs.read(&target).map_err(|e| match e {
                    StorageError::NotFound(_) => ExtractError::UnsupportedPath(format!(
                        "{}: hard link to missing {}",
                        raw, target
                    )),
                    other => ExtractError::Storage(other),
                })?;
                report.bytes += content.len() as u64;
                fs.write(&path, &content, mode)?;
                report.links += 1;
            }
            EntryType::XGlobalHeader | EntryType::XHeader => {
                debug!("Skipping pax header {}", raw);
                continue;
            }
            other => {
                warn!("Skipping unsupported entry {} ({:?})", raw, other);
                writeln!(printer, "untar: skipping {} ({:?})", path, other)?;
                report.skipped += 1;
                continue;
            }
        }

        writeln!(printer, "untar: {}", path)?;
    }

    info!(
        "Extracted {} files, {} directories, {} links ({} bytes)",
        report.files, report.directories, report.links, report.bytes
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RamDiskConfig;
    use tar::{Builder, Header};

    fn append_file(builder: &mut Builder<Vec<u8>>, path: &str, content: &[u8]) {
        let mut header = Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, content).unwrap();
    }

    fn archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for (path, content) in files {
            append_file(&mut builder, path, content);
        }
        builder.into_inner().unwrap()
    }

    fn fs(block_num: u64) -> RamFs {
        RamFs::new(RamDiskConfig::new(512, block_num)).unwrap()
    }

    #[test]
    fn test_extracts_files_and_prints_progress() {
        let image = archive(&[
            ("data/orders.csv", b"alice,10\nbob,5\n"),
            ("README", b"fixture"),
        ]);
        let fs = fs(64);
        let mut progress = Vec::new();

        let report = untar_from_memory(&image, &fs, &mut progress).unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.bytes, 22);
        assert_eq!(fs.read("/data/orders.csv").unwrap(), b"alice,10\nbob,5\n");
        assert_eq!(fs.read("/README").unwrap(), b"fixture");

        let progress = String::from_utf8(progress).unwrap();
        assert_eq!(progress, "untar: /data/orders.csv\nuntar: /README\n");
    }

    #[test]
    fn test_directories_and_symlinks() {
        let mut builder = Builder::new(Vec::new());

        let mut dir = Header::new_gnu();
        dir.set_path("data/").unwrap();
        dir.set_entry_type(EntryType::Directory);
        dir.set_mode(0o750);
        dir.set_size(0);
        dir.set_cksum();
        builder.append(&dir, std::io::empty()).unwrap();

        append_file(&mut builder, "data/orders.csv", b"carol,7\n");

        let mut link = Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        builder
            .append_link(&mut link, "data/latest.csv", "orders.csv")
            .unwrap();

        let mut hard = Header::new_gnu();
        hard.set_entry_type(EntryType::Link);
        hard.set_size(0);
        builder
            .append_link(&mut hard, "copy.csv", "data/orders.csv")
            .unwrap();

        let image = builder.into_inner().unwrap();
        let fs = fs(64);
        let report = untar_from_memory(&image, &fs, &mut std::io::sink()).unwrap();

        assert_eq!(report.directories, 1);
        assert_eq!(report.files, 1);
        assert_eq!(report.links, 2);
        assert_eq!(fs.metadata("/data").unwrap().permissions, 0o750);
        assert_eq!(fs.read("/data/latest.csv").unwrap(), b"carol,7\n");
        assert_eq!(fs.read("/copy.csv").unwrap(), b"carol,7\n");
    }

    #[test]
    fn test_archive_larger_than_device() {
        let big = vec![0x5Au8; 512 * 9];
        let image = archive(&[("big.bin", &big)]);
        let fs = fs(8);

        let err = untar_from_memory(&image, &fs, &mut std::io::sink()).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Storage(StorageError::OutOfSpace { .. })
        ));
        assert_eq!(err.status(), ExtractStatus::Fail);
        assert_eq!(err.status().code(), 1);
    }

    #[test]
    fn test_declared_size_beyond_device() {
        let mut header = Header::new_gnu();
        header.set_path("huge.bin").unwrap();
        header.set_size(1 << 60);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();

        let mut image = header.as_bytes().to_vec();
        image.extend_from_slice(&[0u8; 1024]);

        let fs = fs(64);
        let err = untar_from_memory(&image, &fs, &mut std::io::sink()).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Storage(StorageError::OutOfSpace { free: 64, .. })
        ));
        assert_eq!(err.status(), ExtractStatus::Fail);
        assert_eq!(fs.entry_count(), 0);
    }

    #[test]
    fn test_symlink_climbing_into_sibling_directory() {
        let mut builder = Builder::new(Vec::new());
        append_file(&mut builder, "data/orders.csv", b"erin,2\n");

        let mut link = Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        builder
            .append_link(&mut link, "current/orders.csv", "../data/orders.csv")
            .unwrap();

        let image = builder.into_inner().unwrap();
        let fs = fs(64);
        untar_from_memory(&image, &fs, &mut std::io::sink()).unwrap();

        assert_eq!(fs.read("/current/orders.csv").unwrap(), b"erin,2\n");
    }

    #[test]
    fn test_corrupt_checksum() {
        let mut image = archive(&[("orders.csv", b"dave,1\n")]);
        // Flip a name byte without updating the checksum
        image[0] = b'X';

        let err = untar_from_memory(&image, &fs(64), &mut std::io::sink()).unwrap_err();
        assert_eq!(err.status(), ExtractStatus::InvalidChecksum);
        assert_eq!(err.status().code(), 2);
    }

    #[test]
    fn test_invalid_size_field() {
        let mut header = Header::new_gnu();
        header.set_path("orders.csv").unwrap();
        header.set_mode(0o644);
        header.as_old_mut().size = *b"zzzzzzzzzzz\0";
        header.set_cksum();

        let mut image = header.as_bytes().to_vec();
        image.extend_from_slice(&[0u8; 1024]);

        let err = untar_from_memory(&image, &fs(64), &mut std::io::sink()).unwrap_err();
        assert_eq!(err.status(), ExtractStatus::InvalidHeader);
        assert_eq!(err.status().code(), 3);
    }

    #[test]
    fn test_rejects_parent_traversal() {
        let mut header = Header::new_gnu();
        let name = b"../escape.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(1);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();

        let mut image = header.as_bytes().to_vec();
        let mut block = [0u8; 512];
        block[0] = b'x';
        image.extend_from_slice(&block);
        image.extend_from_slice(&[0u8; 1024]);

        let fs = fs(64);
        let err = untar_from_memory(&image, &fs, &mut std::io::sink()).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedPath(_)));
        assert_eq!(err.status(), ExtractStatus::Fail);
        assert_eq!(fs.entry_count(), 0);
    }

    #[test]
    fn test_empty_image_extracts_nothing() {
        let fs = fs(8);
        let report = untar_from_memory(&[], &fs, &mut std::io::sink()).unwrap();
        assert_eq!(report, ExtractReport::default());
    }
}
