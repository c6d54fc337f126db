//! Directory emulation backend
//!
//! Presents a real directory tree as a read-only archive. Every regular file
//! becomes one per-entry file; the OS handle of an entry is opened lazily on
//! first access and kept until evicted.
//!
//! Entries sit on one of two intrusive lists: "open" (front = most recently
//! opened) or "closed". At most `max_open` handles exist at once. Opening one
//! more first closes the tail of "open", the least recently opened handle.
//! Accessing an already open entry does not reorder the list.

use super::{read_fully, retry};
use crate::core::config::DiskErrorHandler;
use crate::core::error::{RezError, Result};
use crate::core::list::{Link, Linked, List};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// One real file standing in for a resource
#[derive(Debug)]
pub struct EntryFile {
    path: PathBuf,
    file: Option<File>,
    link: Link,
}

impl EntryFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl Linked for EntryFile {
    fn link(&self) -> &Link {
        &self.link
    }

    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

#[derive(Debug)]
pub struct DirEmulation {
    root: PathBuf,
    entries: Vec<EntryFile>,
    open: List,
    closed: List,
    max_open: usize,
    open_count: usize,
    opens: u64,
}

impl DirEmulation {
    pub fn new<P: AsRef<Path>>(root: P, max_open: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(RezError::NotFound(root.display().to_string()));
        }
        if max_open == 0 {
            return Err(RezError::Config(
                "max_open_files must be non-zero".to_string(),
            ));
        }

        Ok(DirEmulation {
            root,
            entries: Vec::new(),
            open: List::new(),
            closed: List::new(),
            max_open,
            open_count: 0,
            opens: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register a file; it starts out closed
    pub fn add_entry(&mut self, path: PathBuf) -> usize {
        self.entries.push(EntryFile {
            path,
            file: None,
            link: Link::default(),
        });
        let index = self.entries.len() - 1;
        self.closed.insert_first(&mut self.entries, index);
        index
    }

    pub fn entry(&self, index: usize) -> Option<&EntryFile> {
        self.entries.get(index)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn open_count(&self) -> usize {
        self.open_count
    }

    /// OS open calls issued so far
    pub fn open_calls(&self) -> u64 {
        self.opens
    }

    /// Open entries, most recently opened first
    pub fn open_entries(&self) -> Vec<usize> {
        self.open.iter(&self.entries).collect()
    }

    fn ensure_open(&mut self, index: usize, handler: &mut dyn DiskErrorHandler) -> Result<()> {
        let entry = self.entries.get(index).ok_or(RezError::InvalidHandle)?;
        if entry.is_open() {
            return Ok(());
        }

        while self.open_count >= self.max_open {
            let Some(victim) = self.open.pop_last(&mut self.entries) else {
                debug_assert!(false, "open count {} with empty open list", self.open_count);
                self.open_count = 0;
                break;
            };
            self.entries[victim].file = None;
            self.closed.insert_first(&mut self.entries, victim);
            self.open_count = self.open_count.saturating_sub(1);
            trace!("Evicted handle of {}", self.entries[victim].path.display());
        }

        let path = self.entries[index].path.clone();
        let file = retry(handler, "open", &path, || File::open(&path))?;
        self.opens += 1;

        self.closed.delete(&mut self.entries, index);
        self.entries[index].file = Some(file);
        self.open.insert_first(&mut self.entries, index);
        self.open_count += 1;
        trace!("Opened handle of {}", path.display());
        Ok(())
    }

    pub fn read(
        &mut self,
        index: usize,
        pos: u64,
        buf: &mut [u8],
        handler: &mut dyn DiskErrorHandler,
    ) -> Result<usize> {
        self.ensure_open(index, handler)?;

        let entry = &mut self.entries[index];
        let file = entry.file.as_mut().ok_or(RezError::NotOpen)?;
        retry(handler, "seek", &entry.path, || file.seek(SeekFrom::Start(pos)))?;
        retry(handler, "read", &entry.path, || read_fully(file, buf))
    }

    /// Close every open handle
    pub fn close_all(&mut self) {
        while let Some(index) = self.open.pop_first(&mut self.entries) {
            self.entries[index].file = None;
            self.closed.insert_first(&mut self.entries, index);
        }
        if self.open_count > 0 {
            debug!("Closed {} handles under {}", self.open_count, self.root.display());
        }
        self.open_count = 0;
    }

    pub fn verify_open(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(RezError::NotFound(self.root.display().to_string()))
        }
    }
}
