//! Single packed archive file

use super::{read_fully, retry};
use crate::core::config::DiskErrorHandler;
use crate::core::error::{RezError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// One archive file on disk
///
/// Remembers where the OS file position was left so contiguous reads and
/// writes skip the seek call.
#[derive(Debug)]
pub struct SingleFile {
    path: PathBuf,
    file: Option<File>,
    read_only: bool,
    /// OS file position after the last operation, `None` when unknown
    position: Option<u64>,
    seeks: u64,
}

impl SingleFile {
    /// Open (or with `create_new`, create or truncate) an archive file
    pub fn open<P: AsRef<Path>>(
        path: P,
        read_only: bool,
        create_new: bool,
        handler: &mut dyn DiskErrorHandler,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if read_only && create_new {
            return Err(RezError::ReadOnly);
        }

        let file = Self::open_os_file(&path, read_only, create_new, handler)?;
        debug!(
            "Opened archive file {} ({})",
            path.display(),
            if read_only { "read-only" } else { "read-write" }
        );

        Ok(SingleFile {
            path,
            file: Some(file),
            read_only,
            position: Some(0),
            seeks: 0,
        })
    }

    fn open_os_file(
        path: &Path,
        read_only: bool,
        create_new: bool,
        handler: &mut dyn DiskErrorHandler,
    ) -> Result<File> {
        retry(handler, "open", path, || {
            OpenOptions::new()
                .read(true)
                .write(!read_only)
                .create(create_new)
                .truncate(create_new)
                .open(path)
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Seek calls actually issued to the OS
    pub fn seek_count(&self) -> u64 {
        self.seeks
    }

    pub fn len(&self) -> Result<u64> {
        let file = self.file.as_ref().ok_or(RezError::NotOpen)?;
        Ok(file.metadata()?.len())
    }

    fn seek_to(&mut self, pos: u64, handler: &mut dyn DiskErrorHandler) -> Result<()> {
        if self.position == Some(pos) {
            trace!("Seek to {} skipped", pos);
            return Ok(());
        }

        let file = self.file.as_mut().ok_or(RezError::NotOpen)?;
        self.position = None;
        retry(handler, "seek", &self.path, || file.seek(SeekFrom::Start(pos)))?;
        self.position = Some(pos);
        self.seeks += 1;
        Ok(())
    }

    pub fn read(
        &mut self,
        pos: u64,
        buf: &mut [u8],
        handler: &mut dyn DiskErrorHandler,
    ) -> Result<usize> {
        self.seek_to(pos, handler)?;

        let file = self.file.as_mut().ok_or(RezError::NotOpen)?;
        self.position = None;
        let n = retry(handler, "read", &self.path, || read_fully(file, buf))?;
        self.position = Some(pos + n as u64);
        Ok(n)
    }

    pub fn write(
        &mut self,
        pos: u64,
        buf: &[u8],
        handler: &mut dyn DiskErrorHandler,
    ) -> Result<usize> {
        if self.read_only {
            return Err(RezError::ReadOnly);
        }
        self.seek_to(pos, handler)?;

        let file = self.file.as_mut().ok_or(RezError::NotOpen)?;
        self.position = None;
        retry(handler, "write", &self.path, || file.write_all(buf))?;
        self.position = Some(pos + buf.len() as u64);
        Ok(buf.len())
    }

    pub fn flush(&mut self, handler: &mut dyn DiskErrorHandler) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let file = self.file.as_mut().ok_or(RezError::NotOpen)?;
        retry(handler, "flush", &self.path, || file.sync_data())
    }

    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closed archive file {}", self.path.display());
        }
        self.position = None;
    }

    /// Re-open the file if its handle is gone or no longer answers
    pub fn verify_open(&mut self, handler: &mut dyn DiskErrorHandler) -> Result<()> {
        let usable = self
            .file
            .as_ref()
            .is_some_and(|file| file.metadata().is_ok());
        if usable {
            return Ok(());
        }

        debug!("Re-opening stale archive file {}", self.path.display());
        self.file = Some(Self::open_os_file(&self.path, self.read_only, false, handler)?);
        self.position = Some(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::NoRetry;
    use tempfile::TempDir;

    fn create(dir: &TempDir) -> SingleFile {
        SingleFile::open(dir.path().join("a.rez"), false, true, &mut NoRetry).unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let mut file = create(&temp);

        file.write(10, b"hello", &mut NoRetry).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(file.read(10, &mut buf, &mut NoRetry).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(file.len().unwrap(), 15);
    }

    #[test]
    fn test_contiguous_access_skips_seek() {
        let temp = TempDir::new().unwrap();
        let mut file = create(&temp);

        file.write(0, b"abcd", &mut NoRetry).unwrap();
        file.write(4, b"efgh", &mut NoRetry).unwrap();
        file.write(8, b"ijkl", &mut NoRetry).unwrap();
        assert_eq!(file.seek_count(), 0);

        let mut buf = [0u8; 4];
        file.read(2, &mut buf, &mut NoRetry).unwrap();
        assert_eq!(file.seek_count(), 1);
        file.read(6, &mut buf, &mut NoRetry).unwrap();
        assert_eq!(file.seek_count(), 1);
        assert_eq!(&buf, b"ghij");
    }

    #[test]
    fn test_short_read_at_eof() {
        let temp = TempDir::new().unwrap();
        let mut file = create(&temp);
        file.write(0, b"xyz", &mut NoRetry).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(file.read(1, &mut buf, &mut NoRetry).unwrap(), 2);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let temp = TempDir::new().unwrap();
        create(&temp);

        let mut file =
            SingleFile::open(temp.path().join("a.rez"), true, false, &mut NoRetry).unwrap();
        assert!(matches!(
            file.write(0, b"x", &mut NoRetry),
            Err(RezError::ReadOnly)
        ));
        assert!(matches!(
            SingleFile::open(temp.path().join("b.rez"), true, true, &mut NoRetry),
            Err(RezError::ReadOnly)
        ));
    }

    #[test]
    fn test_missing_file_fails_open() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            SingleFile::open(temp.path().join("none.rez"), true, false, &mut NoRetry),
            Err(RezError::Io(_))
        ));
    }

    #[test]
    fn test_verify_reopens_closed_file() {
        let temp = TempDir::new().unwrap();
        let mut file = create(&temp);
        file.write(0, b"data", &mut NoRetry).unwrap();
        file.close();
        assert!(!file.is_open());

        file.verify_open(&mut NoRetry).unwrap();
        let mut buf = [0u8; 4];
        file.read(0, &mut buf, &mut NoRetry).unwrap();
        assert_eq!(&buf, b"data");
    }
}
