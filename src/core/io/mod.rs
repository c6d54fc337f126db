//! Archive backing files
//!
//! A backing file provides byte-range reads and writes to the engine. The set
//! of backends is closed:
//!
//! - [`SingleFile`]: one packed archive file on disk
//! - [`DirEmulation`]: a real directory presented as an archive, where every
//!   regular file is one resource backed by its own per-entry file
//!
//! Items refer to their backing storage through a [`FileRef`]: the archive's
//! [`FileId`] plus, for emulated directories, the entry index.
//!
//! Every OS call goes through [`retry`], which consults the installed
//! [`DiskErrorHandler`] on failure.

pub mod emulation;
pub mod single;

pub use emulation::DirEmulation;
pub use single::SingleFile;

use crate::core::config::DiskErrorHandler;
use crate::core::error::{RezError, Result};
use std::io;
use std::path::Path;
use tracing::warn;

/// Position of a backing file in the archive handle's file list; `FileId(0)`
/// is the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub(crate) usize);

impl FileId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Where an item's bytes live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRef {
    pub file: FileId,
    /// Per-entry file of an emulated directory
    pub entry: Option<usize>,
}

#[derive(Debug)]
pub enum BackingFile {
    Single(SingleFile),
    DirEmulation(DirEmulation),
}

impl BackingFile {
    pub fn name(&self) -> &Path {
        match self {
            BackingFile::Single(file) => file.path(),
            BackingFile::DirEmulation(dir) => dir.root(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        match self {
            BackingFile::Single(file) => file.is_read_only(),
            BackingFile::DirEmulation(_) => true,
        }
    }

    pub fn is_emulated(&self) -> bool {
        matches!(self, BackingFile::DirEmulation(_))
    }

    /// Read into `buf` from `pos + offset`; returns the bytes read, which is
    /// short only at end of file
    pub fn read(
        &mut self,
        entry: Option<usize>,
        pos: u32,
        offset: u32,
        buf: &mut [u8],
        handler: &mut dyn DiskErrorHandler,
    ) -> Result<usize> {
        let at = u64::from(pos) + u64::from(offset);
        match (self, entry) {
            (BackingFile::Single(file), None) => file.read(at, buf, handler),
            (BackingFile::DirEmulation(dir), Some(entry)) => dir.read(entry, at, buf, handler),
            _ => Err(RezError::InvalidHandle),
        }
    }

    pub fn write(
        &mut self,
        entry: Option<usize>,
        pos: u32,
        offset: u32,
        buf: &[u8],
        handler: &mut dyn DiskErrorHandler,
    ) -> Result<usize> {
        let at = u64::from(pos) + u64::from(offset);
        match (self, entry) {
            (BackingFile::Single(file), None) => file.write(at, buf, handler),
            (BackingFile::DirEmulation(_), _) => Err(RezError::EmulatedDirWrite),
            _ => Err(RezError::InvalidHandle),
        }
    }

    pub fn flush(&mut self, handler: &mut dyn DiskErrorHandler) -> Result<()> {
        match self {
            BackingFile::Single(file) => file.flush(handler),
            BackingFile::DirEmulation(_) => Ok(()),
        }
    }

    pub fn close(&mut self) {
        match self {
            BackingFile::Single(file) => file.close(),
            BackingFile::DirEmulation(dir) => dir.close_all(),
        }
    }

    /// Check the backing storage is still usable, re-opening it if needed
    pub fn verify_open(&mut self, handler: &mut dyn DiskErrorHandler) -> Result<()> {
        match self {
            BackingFile::Single(file) => file.verify_open(handler),
            BackingFile::DirEmulation(dir) => dir.verify_open(),
        }
    }
}

/// Run an OS call until it succeeds or the disk-error hook gives up
pub(crate) fn retry<T, F>(
    handler: &mut dyn DiskErrorHandler,
    what: &str,
    path: &Path,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("{} failed on {}: {}", what, path.display(), e);
                if !handler.disk_error(&e) {
                    return Err(RezError::Io(e));
                }
            }
        }
    }
}

/// Fill `buf` from `reader`, stopping early only at end of file
pub(crate) fn read_fully<R: io::Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
