//! Item payload access
//!
//! Payload bytes come from, in order of preference: the directory's bulk
//! memory block, the item's own buffer, or a read through the item's backing
//! file. Only [`RezMgr::load`] caches a disk read in the item.

use crate::core::dir::DirId;
use crate::core::error::{RezError, Result};
use crate::core::mgr::{now, RezMgr};
use crate::core::pool::ItemId;
use tracing::{debug, trace};

/// Where an item's bytes currently live
enum Source {
    DirBlock { dir: DirId, offset: usize },
    Buffer,
    Disk,
}

impl RezMgr {
    fn source(&self, item: ItemId) -> Result<Source> {
        let it = self.item_ref(item)?;
        let dir = it.dir.ok_or(RezError::InvalidHandle)?;
        let d = self.dir_ref(dir)?;

        if let Some(block) = &d.mem_block {
            let offset = it.file_pos.checked_sub(d.items_pos).map(|o| o as usize);
            return match offset {
                Some(offset) if offset + it.size as usize <= block.len() => {
                    Ok(Source::DirBlock { dir, offset })
                }
                _ => Err(RezError::OutOfRange {
                    offset: it.file_pos,
                    len: it.size as usize,
                    size: d.items_size,
                }),
            };
        }
        if it.data.is_some() {
            return Ok(Source::Buffer);
        }
        Ok(Source::Disk)
    }

    /// Read `buf.len()` bytes at `offset` within the item straight from its
    /// backing file
    fn read_from_disk(&mut self, item: ItemId, offset: u32, buf: &mut [u8]) -> Result<()> {
        let it = self.items.get(item).ok_or(RezError::InvalidHandle)?;
        let file_ref = it.file.ok_or(RezError::NotLoaded)?;
        let pos = it.file_pos;
        // Archive items at position 0 have never been saved
        if pos == 0 && file_ref.entry.is_none() {
            return Err(RezError::NotLoaded);
        }

        let backing = self
            .files
            .get_mut(file_ref.file.index())
            .ok_or(RezError::InvalidHandle)?;
        let n = backing.read(file_ref.entry, pos, offset, buf, self.handler.as_mut())?;
        if n != buf.len() {
            return Err(RezError::Truncated);
        }
        Ok(())
    }

    /// Bytes of `item`, reading and caching them in the item if needed
    pub fn load(&mut self, item: ItemId) -> Result<&[u8]> {
        if let Source::Disk = self.source(item)? {
            let size = self.item_ref(item)?.size as usize;
            let mut data = vec![0u8; size];
            if size > 0 {
                self.read_from_disk(item, 0, &mut data)?;
            }
            trace!("Loaded {} bytes of item {:?}", size, item);
            self.item_mut(item)?.data = Some(data);
        }
        self.payload(item)
    }

    /// Bytes already in memory, from the directory block or the item buffer
    pub fn payload(&self, item: ItemId) -> Result<&[u8]> {
        let it = self.item_ref(item)?;
        match self.source(item)? {
            Source::DirBlock { dir, offset } => {
                let block = self
                    .dir_ref(dir)?
                    .mem_block
                    .as_deref()
                    .ok_or(RezError::NotLoaded)?;
                Ok(&block[offset..offset + it.size as usize])
            }
            Source::Buffer => it.data.as_deref().ok_or(RezError::NotLoaded),
            Source::Disk => Err(RezError::NotLoaded),
        }
    }

    /// Whether the bytes are in memory, privately or through a bulk load
    pub fn is_loaded(&self, item: ItemId) -> bool {
        matches!(self.source(item), Ok(Source::DirBlock { .. } | Source::Buffer))
    }

    /// Copy `buf.len()` bytes starting at `offset` without caching
    pub fn get(&mut self, item: ItemId, offset: u32, buf: &mut [u8]) -> Result<()> {
        let size = self.item_ref(item)?.size;
        if u64::from(offset) + buf.len() as u64 > u64::from(size) {
            return Err(RezError::OutOfRange {
                offset,
                len: buf.len(),
                size,
            });
        }
        if buf.is_empty() {
            return Ok(());
        }

        match self.source(item)? {
            Source::Disk => self.read_from_disk(item, offset, buf),
            _ => {
                let start = offset as usize;
                buf.copy_from_slice(&self.payload(item)?[start..start + buf.len()]);
                Ok(())
            }
        }
    }

    /// Move the read cursor
    pub fn seek(&mut self, item: ItemId, offset: u32) -> Result<()> {
        self.item_mut(item)?.cur_pos = offset;
        Ok(())
    }

    /// Read from the cursor, clamped to the end of the item; returns the byte
    /// count and advances the cursor
    pub fn read(&mut self, item: ItemId, buf: &mut [u8]) -> Result<usize> {
        let it = self.item_ref(item)?;
        let (cur, size) = (it.cur_pos, it.size);
        if cur >= size {
            return Ok(0);
        }

        let len = buf.len().min((size - cur) as usize);
        if len == 0 {
            return Ok(0);
        }
        self.get(item, cur, &mut buf[..len])?;
        self.item_mut(item)?.cur_pos = cur + len as u32;
        Ok(len)
    }

    /// Next byte at the cursor, `None` at the end of the item
    pub fn read_byte(&mut self, item: ItemId) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        Ok((self.read(item, &mut byte)? == 1).then_some(byte[0]))
    }

    /// Drop the item's private buffer; bulk-loaded bytes stay
    pub fn unload(&mut self, item: ItemId) -> Result<()> {
        self.item_mut(item)?.data = None;
        Ok(())
    }

    /// Give the item a fresh zeroed buffer of `size` bytes to fill and
    /// `save`. The item counts as unwritten until then.
    pub fn create(&mut self, item: ItemId, size: u32) -> Result<&mut [u8]> {
        self.ensure_writable()?;
        let it = self.item_ref(item)?;
        let dir = it.dir.ok_or(RezError::InvalidHandle)?;
        let old_size = it.size;

        if self.dir_ref(dir)?.mem_block.is_some() {
            self.unload_dir(dir, false)?;
        }

        {
            let d = self.dir_mut(dir)?;
            d.items_size = d.items_size.saturating_sub(old_size).saturating_add(size);
        }
        self.header.is_sorted = false;
        self.mark_time(item)?;

        let it = self.item_mut(item)?;
        it.size = size;
        it.file_pos = 0;
        it.cur_pos = 0;
        Ok(it.data.insert(vec![0u8; size as usize]).as_mut_slice())
    }

    /// Mutable view of the item's private buffer
    pub fn data_mut(&mut self, item: ItemId) -> Result<&mut [u8]> {
        self.item_mut(item)?
            .data
            .as_deref_mut()
            .ok_or(RezError::NotLoaded)
    }

    /// Write the item's buffer: appended at the cursor the first time,
    /// in place afterwards
    pub fn save(&mut self, item: ItemId) -> Result<()> {
        self.ensure_writable()?;
        let it = self.items.get(item).ok_or(RezError::InvalidHandle)?;
        let data = it.data.as_deref().ok_or(RezError::NotLoaded)?;
        if it.size == 0 {
            return Ok(());
        }
        let file_ref = it.file.ok_or(RezError::InvalidHandle)?;
        let first_save = it.file_pos == 0;
        let pos = if first_save {
            self.next_write_pos
        } else {
            it.file_pos
        };
        let end = pos.checked_add(it.size).ok_or(RezError::ArchiveFull)?;

        let backing = self
            .files
            .get_mut(file_ref.file.index())
            .ok_or(RezError::InvalidHandle)?;
        backing.write(file_ref.entry, pos, 0, data, self.handler.as_mut())?;

        if first_save {
            self.header.is_sorted = false;
            self.next_write_pos = end;
            self.item_mut(item)?.file_pos = pos;
        }
        self.mark_time(item)?;
        debug!("Saved item {:?} at {}", item, pos);
        Ok(())
    }

    /// Stamp the current time on the item, its directory and the archive
    fn mark_time(&mut self, item: ItemId) -> Result<()> {
        let time = now();
        let it = self.item_mut(item)?;
        it.time = time;
        let dir = it.dir.ok_or(RezError::InvalidHandle)?;
        self.dir_mut(dir)?.time = time;
        self.header.time = time;
        Ok(())
    }

    /// Read every payload of `dir` in one block
    ///
    /// Needs a sorted archive with a single backing file; returns `false`
    /// without loading otherwise.
    pub fn load_dir(&mut self, dir: DirId, recursive: bool) -> Result<bool> {
        let d = self.dir_ref(dir)?;
        if d.mem_block.is_some() {
            return Ok(true);
        }
        if !self.header.is_sorted || self.files.len() > 1 {
            return Ok(false);
        }

        let (pos, size) = (d.items_pos, d.items_size);
        if size > 0 {
            let mut block = vec![0u8; size as usize];
            let primary = self.files.first_mut().ok_or(RezError::NotOpen)?;
            let n = primary.read(None, pos, 0, &mut block, self.handler.as_mut())?;
            if n != block.len() {
                return Err(RezError::Truncated);
            }
            self.dir_mut(dir)?.mem_block = Some(block);
            debug!("Bulk loaded {} bytes at {}", size, pos);
        }

        if recursive {
            for child in self.dirs.subdirs(dir) {
                self.load_dir(child, true)?;
            }
        }
        Ok(true)
    }

    /// Free a bulk block, or else every item buffer of the directory
    pub fn unload_dir(&mut self, dir: DirId, recursive: bool) -> Result<()> {
        if self.dir_mut(dir)?.mem_block.take().is_none() {
            for item in self.dir_items(dir) {
                self.unload(item)?;
            }
        }

        if recursive {
            for child in self.dirs.subdirs(dir) {
                self.unload_dir(child, true)?;
            }
        }
        Ok(())
    }
}
