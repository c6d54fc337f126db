//! Archive handle
//!
//! [`RezMgr`] owns everything belonging to an open archive: the backing files
//! (the first is the primary, later ones are read-only overlays), the
//! directory arena rooted at [`RezMgr::root_dir`], the item pool and the
//! header metadata including the append cursor.
//!
//! Directories, types and items are addressed by handle ([`DirId`],
//! [`TypeTag`] within a directory, [`ItemId`]). Lookups that miss return
//! `None`; operations that can fail return [`Result`] and leave the archive
//! unchanged on logical errors.

use crate::core::codec::StagedDir;
use crate::core::config::{DiskErrorHandler, NoRetry, RezConfig};
use crate::core::dir::{DirArena, DirId, RezDir, RezType};
use crate::core::error::{RezError, Result};
use crate::core::hash::LinkedHashTable;
use crate::core::header::{Header, HEADER_SIZE};
use crate::core::io::{BackingFile, DirEmulation, FileId, FileRef, SingleFile};
use crate::core::item::RezItem;
use crate::core::path::{split_dos_name, Separators};
use crate::core::pool::{ItemId, ItemPool};
use crate::core::types::TypeTag;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Seconds since the Unix epoch
pub(crate) fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as u32)
}

fn modified_time(meta: &std::fs::Metadata) -> u32 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as u32)
}

/// Size hints are stored as name length plus terminator
fn grow_hint(hint: &mut u32, len: usize) {
    let needed = len as u32 + 1;
    if *hint < needed {
        *hint = needed;
    }
}

pub struct RezMgr {
    pub(crate) config: RezConfig,
    pub(crate) separators: Separators,
    pub(crate) handler: Box<dyn DiskErrorHandler>,
    pub(crate) files: Vec<BackingFile>,
    pub(crate) dirs: DirArena,
    pub(crate) root: Option<DirId>,
    pub(crate) items: ItemPool,
    pub(crate) header: Header,
    pub(crate) next_write_pos: u32,
    pub(crate) next_id: u32,
    pub(crate) read_only: bool,
    primary_path: Option<PathBuf>,
}

impl fmt::Debug for RezMgr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RezMgr")
            .field("primary_path", &self.primary_path)
            .field("files", &self.files.len())
            .field("dirs", &self.dirs.len())
            .field("items", &self.items.live())
            .field("read_only", &self.read_only)
            .field("next_write_pos", &self.next_write_pos)
            .finish()
    }
}

impl Default for RezMgr {
    fn default() -> Self {
        Self::new()
    }
}

impl RezMgr {
    /// Archive handle with the default configuration
    pub fn new() -> Self {
        let config = RezConfig::default();
        RezMgr {
            separators: Separators::new(config.dir_separators.as_deref()),
            next_id: config.first_generated_id,
            config,
            handler: Box::new(NoRetry),
            files: Vec::new(),
            dirs: DirArena::new(),
            root: None,
            items: ItemPool::with_default_chunks(),
            header: Header::new(),
            next_write_pos: HEADER_SIZE as u32,
            read_only: true,
            primary_path: None,
        }
    }

    pub fn with_config(config: RezConfig) -> Result<Self> {
        config.validate()?;

        let mut mgr = Self::new();
        mgr.separators = Separators::new(config.dir_separators.as_deref());
        mgr.items = ItemPool::new(config.item_chunk_size)?;
        mgr.next_id = config.first_generated_id;
        mgr.config = config;
        Ok(mgr)
    }

    pub fn config(&self) -> &RezConfig {
        &self.config
    }

    /// Install the hook consulted when an OS call fails
    pub fn set_disk_error_handler<H>(&mut self, handler: H)
    where
        H: DiskErrorHandler + 'static,
    {
        self.handler = Box::new(handler);
    }

    // ---- open / close -------------------------------------------------------

    pub fn is_open(&self) -> bool {
        self.root.is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Open an archive file or, read-only, a directory to emulate as one
    ///
    /// `create_new` creates (or truncates) the file and starts an empty tree.
    pub fn open<P: AsRef<Path>>(&mut self, path: P, read_only: bool, create_new: bool) -> Result<()> {
        if self.is_open() {
            return Err(RezError::AlreadyOpen);
        }
        let path = path.as_ref();
        if read_only && create_new {
            return Err(RezError::ReadOnly);
        }

        let result = if path.is_dir() {
            self.open_emulated(path, read_only)
        } else {
            self.open_single(path, read_only, create_new)
        };

        match result {
            Ok(()) => {
                self.primary_path = Some(path.to_path_buf());
                info!(
                    "Opened {} ({} items, {})",
                    path.display(),
                    self.items.live(),
                    if self.read_only { "read-only" } else { "read-write" }
                );
                Ok(())
            }
            Err(e) => {
                self.teardown();
                Err(e)
            }
        }
    }

    fn open_single(&mut self, path: &Path, read_only: bool, create_new: bool) -> Result<()> {
        let file = SingleFile::open(path, read_only, create_new, self.handler.as_mut())?;
        self.files.push(BackingFile::Single(file));
        self.read_only = read_only;

        if create_new {
            self.header = Header::new();
            self.header.set_title(&self.config.user_title);
            self.header.time = now();
            self.next_write_pos = HEADER_SIZE as u32;
            self.next_id = self.config.first_generated_id;
            self.root = Some(self.dirs.insert(self.new_dir("", None, 0, 0, now())?));
            return Ok(());
        }

        self.header = self.read_header(FileId(0))?;
        self.next_write_pos = self.header.next_write_pos;
        self.next_id = self.config.first_generated_id;

        let (pos, size, time) = (
            self.header.root_dir_pos,
            self.header.root_dir_size,
            self.header.root_dir_time,
        );
        let root = self.dirs.insert(self.new_dir("", None, pos, size, time)?);
        self.root = Some(root);
        self.read_all_dirs(root, FileId(0), pos, size, false)
    }

    fn open_emulated(&mut self, path: &Path, read_only: bool) -> Result<()> {
        if !read_only {
            return Err(RezError::EmulatedDirWrite);
        }

        self.files.push(BackingFile::DirEmulation(DirEmulation::new(
            path,
            self.config.max_open_files,
        )?));
        self.read_only = true;
        self.header = Header::new();
        self.header.time = now();
        self.next_id = self.config.first_generated_id;

        let root = self.dirs.insert(self.new_dir("", None, 0, 0, now())?);
        self.root = Some(root);
        let scanned = scan_emulated_dir(path)?;
        self.merge_emulated_dir(FileId(0), root, scanned, false)
    }

    /// Layer a read-only archive or directory over the open tree
    ///
    /// With `overwrite_items` the overlay's items replace same-named ones;
    /// otherwise the first-seen item wins and the overlay only adds.
    pub fn open_additional<P: AsRef<Path>>(&mut self, path: P, overwrite_items: bool) -> Result<()> {
        let root = self.root.ok_or(RezError::NotOpen)?;
        if !self.read_only {
            return Err(RezError::OverlayOnWritable);
        }
        let path = path.as_ref();
        let file = FileId(self.files.len());

        // Nothing is merged until the whole overlay has been read
        if path.is_dir() {
            let emulation = DirEmulation::new(path, self.config.max_open_files)?;
            let scanned = scan_emulated_dir(path)?;
            self.files.push(BackingFile::DirEmulation(emulation));
            self.header.is_sorted = false;
            self.merge_emulated_dir(file, root, scanned, overwrite_items)?;
        } else {
            let single = SingleFile::open(path, true, false, self.handler.as_mut())?;
            self.files.push(BackingFile::Single(single));

            let (header, staged) = match self.stage_overlay(file) {
                Ok(staged) => staged,
                Err(e) => {
                    self.files.pop();
                    return Err(e);
                }
            };

            // Several backing files can never form one contiguous region
            self.header.is_sorted = false;
            self.header.largest_key_ary = self.header.largest_key_ary.max(header.largest_key_ary);
            self.header.largest_dir_name_size =
                self.header.largest_dir_name_size.max(header.largest_dir_name_size);
            self.header.largest_rez_name_size =
                self.header.largest_rez_name_size.max(header.largest_rez_name_size);
            self.header.largest_comment_size =
                self.header.largest_comment_size.max(header.largest_comment_size);

            self.merge_dir_tree(root, file, staged, overwrite_items)?;
        }

        info!(
            "Added overlay {} ({}overwriting)",
            path.display(),
            if overwrite_items { "" } else { "not " }
        );
        Ok(())
    }

    fn stage_overlay(&mut self, file: FileId) -> Result<(Header, StagedDir)> {
        let header = self.read_header(file)?;
        let staged = self.stage_dir_tree(file, header.root_dir_pos, header.root_dir_size)?;
        Ok((header, staged))
    }

    fn read_header(&mut self, file: FileId) -> Result<Header> {
        let mut buf = [0u8; HEADER_SIZE];
        let n = self.files[file.0].read(None, 0, 0, &mut buf, self.handler.as_mut())?;
        Header::from_bytes(&buf[..n])
    }

    /// Write the directory tree, then the header pointing at it
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let root = self.root.ok_or(RezError::NotOpen)?;

        let cursor = self.next_write_pos;
        let (pos, size) = self.write_all_dirs(root)?;

        self.header.root_dir_pos = pos;
        self.header.root_dir_size = size;
        self.header.root_dir_time = self.dir_ref(root)?.time;
        self.header.next_write_pos = cursor;

        let bytes = self.header.to_bytes();
        let primary = &mut self.files[0];
        primary.write(None, 0, 0, &bytes, self.handler.as_mut())?;
        primary.flush(self.handler.as_mut())?;

        debug!("Flushed directory tree at {} ({} bytes)", pos, size);
        Ok(())
    }

    /// Flush when writable, then release every backing file and the tree.
    /// The item pool keeps its chunks for the next archive.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }

        let flushed = if self.read_only { Ok(()) } else { self.flush() };
        if let Some(path) = &self.primary_path {
            info!("Closed {}", path.display());
        }
        self.teardown();
        flushed
    }

    fn teardown(&mut self) {
        for file in &mut self.files {
            file.close();
        }
        self.files.clear();

        for dir in self.all_dirs() {
            for item in self.dir_items(dir) {
                if let Err(e) = self.items.free(item) {
                    warn!("Item {:?} already released: {}", item, e);
                }
            }
        }
        self.dirs.clear();
        self.root = None;
        self.primary_path = None;
        self.read_only = true;
    }

    /// Close and re-open the primary archive with its original access mode
    pub fn reset(&mut self) -> Result<()> {
        let path = self.primary_path.clone().ok_or(RezError::NotOpen)?;
        let read_only = self.read_only;

        self.close()?;
        self.open(path, read_only, false)
    }

    /// Make sure every backing file is still usable
    pub fn verify_open(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(RezError::NotOpen);
        }
        for file in &mut self.files {
            file.verify_open(self.handler.as_mut())?;
        }
        Ok(())
    }

    pub fn primary_path(&self) -> Option<&Path> {
        self.primary_path.as_deref()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn backing_file(&self, file: FileId) -> Option<&BackingFile> {
        self.files.get(file.0)
    }

    pub fn item_pool(&self) -> &ItemPool {
        &self.items
    }

    // ---- header metadata ----------------------------------------------------

    pub fn is_sorted(&self) -> bool {
        self.header.is_sorted
    }

    /// Declare the archive's payloads grouped contiguously per directory
    pub fn force_sorted(&mut self, sorted: bool) {
        self.header.is_sorted = sorted;
    }

    pub fn user_title(&self) -> String {
        self.header.title()
    }

    pub fn set_user_title(&mut self, title: &str) -> Result<()> {
        self.ensure_writable()?;
        self.header.set_title(title);
        Ok(())
    }

    /// Next ID the counter will hand out
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn set_next_id(&mut self, id: u32) {
        self.next_id = id;
    }

    /// Last modification time of the archive
    pub fn time(&self) -> u32 {
        self.header.time
    }

    pub fn next_write_pos(&self) -> u32 {
        self.next_write_pos
    }

    pub fn largest_key_array(&self) -> u32 {
        self.header.largest_key_ary
    }

    pub fn largest_dir_name_size(&self) -> u32 {
        self.header.largest_dir_name_size
    }

    pub fn largest_rez_name_size(&self) -> u32 {
        self.header.largest_rez_name_size
    }

    pub fn largest_comment_size(&self) -> u32 {
        self.header.largest_comment_size
    }

    // ---- internal accessors -------------------------------------------------

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if !self.is_open() {
            return Err(RezError::NotOpen);
        }
        if self.read_only {
            return Err(RezError::ReadOnly);
        }
        Ok(())
    }

    /// New names must be non-empty and free of configured separators
    fn check_new_name(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.chars().any(|c| self.separators.is_configured_separator(c)) {
            return Err(RezError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn dir_ref(&self, dir: DirId) -> Result<&RezDir> {
        self.dirs.get(dir).ok_or(RezError::InvalidHandle)
    }

    pub(crate) fn dir_mut(&mut self, dir: DirId) -> Result<&mut RezDir> {
        self.dirs.get_mut(dir).ok_or(RezError::InvalidHandle)
    }

    pub(crate) fn item_ref(&self, item: ItemId) -> Result<&RezItem> {
        self.items.get(item).ok_or(RezError::InvalidHandle)
    }

    pub(crate) fn item_mut(&mut self, item: ItemId) -> Result<&mut RezItem> {
        self.items.get_mut(item).ok_or(RezError::InvalidHandle)
    }

    fn new_dir(
        &self,
        name: &str,
        parent: Option<DirId>,
        dir_pos: u32,
        dir_size: u32,
        time: u32,
    ) -> Result<RezDir> {
        Ok(RezDir {
            name: name.to_string(),
            parent,
            dir_pos,
            dir_size,
            time,
            items_pos: 0,
            items_size: 0,
            subdirs: LinkedHashTable::new(self.config.dir_bins)?,
            types: LinkedHashTable::new(self.config.type_bins)?,
            mem_block: None,
            slot: None,
        })
    }

    /// Add a child directory under `parent`
    pub(crate) fn attach_dir(
        &mut self,
        parent: DirId,
        name: &str,
        dir_pos: u32,
        dir_size: u32,
        time: u32,
    ) -> Result<DirId> {
        let dir = self.new_dir(name, Some(parent), dir_pos, dir_size, time)?;
        self.dir_ref(parent)?;

        let child = self.dirs.insert(dir);
        let slot = self.dir_mut(parent)?.subdirs.insert(name, child);
        self.dir_mut(child)?.slot = Some(slot);
        grow_hint(&mut self.header.largest_dir_name_size, name.len());
        Ok(child)
    }

    pub(crate) fn get_or_make_type(&mut self, dir: DirId, tag: TypeTag) -> Result<()> {
        if self.dir_ref(dir)?.type_slot(tag).is_some() {
            return Ok(());
        }

        let by_id = if self.config.item_by_id {
            Some(LinkedHashTable::new(self.config.by_id_bins)?)
        } else {
            None
        };
        let rez_type = RezType {
            tag,
            dir,
            by_name: LinkedHashTable::new(self.config.by_name_bins)?,
            by_id,
        };
        self.dir_mut(dir)?.types.insert(&tag.0, rez_type);
        Ok(())
    }

    /// Allocate an item and link it into its type bucket, skipping the
    /// duplicate-name check
    pub(crate) fn create_rez_internal(
        &mut self,
        dir: DirId,
        tag: TypeTag,
        name: &str,
        id: u32,
        file: Option<FileRef>,
    ) -> Result<ItemId> {
        self.get_or_make_type(dir, tag)?;

        let mut id = id;
        if self.config.item_by_id && self.config.renumber_id_collisions {
            let collides = self
                .dirs
                .get(dir)
                .and_then(|d| d.rez_type(tag))
                .and_then(|t| t.find_by_id(&self.items, id))
                .is_some();
            if collides {
                debug!("ID {} of {} collides, renumbered to {}", id, name, self.next_id);
                id = self.next_id;
                self.next_id = self.next_id.wrapping_add(1);
            }
        }

        let item = self.items.alloc();
        {
            let rec = self.item_mut(item)?;
            rec.name = name.to_string();
            rec.id = id;
            rec.type_tag = tag;
            rec.time = now();
            rec.dir = Some(dir);
            rec.file = file;
        }

        let rez_type = self
            .dirs
            .get_mut(dir)
            .and_then(|d| d.rez_type_mut(tag))
            .ok_or(RezError::InvalidHandle)?;
        let name_slot = rez_type.by_name.insert(name, item);
        let id_slot = rez_type.by_id.as_mut().map(|table| table.insert(&id, item));

        let rec = self.item_mut(item)?;
        rec.name_slot = Some(name_slot);
        rec.id_slot = id_slot;

        grow_hint(&mut self.header.largest_rez_name_size, name.len());
        Ok(item)
    }

    /// Unlink an item from its bucket, terminate it and return it to the pool
    pub(crate) fn remove_rez_internal(&mut self, item: ItemId) -> Result<()> {
        let rec = self.item_ref(item)?;
        let (dir, tag, size) = (rec.dir.ok_or(RezError::InvalidHandle)?, rec.type_tag, rec.size);
        let (name_slot, id_slot) = (rec.name_slot, rec.id_slot);

        let d = self.dir_mut(dir)?;
        d.items_size = d.items_size.saturating_sub(size);
        if let Some(rez_type) = d.rez_type_mut(tag) {
            if let Some(slot) = name_slot {
                rez_type.by_name.delete(slot);
            }
            if let (Some(table), Some(slot)) = (rez_type.by_id.as_mut(), id_slot) {
                table.delete(slot);
            }
        }

        self.items.free(item)?;
        self.header.is_sorted = false;
        Ok(())
    }

    // ---- directories --------------------------------------------------------

    /// Root directory of the open archive
    pub fn root_dir(&self) -> Option<DirId> {
        self.root
    }

    pub fn dir(&self, dir: DirId) -> Option<&RezDir> {
        self.dirs.get(dir)
    }

    pub fn get_dir(&self, parent: DirId, name: &str) -> Option<DirId> {
        self.dirs.find_subdir(parent, name, self.config.case_sensitive)
    }

    pub fn create_dir(&mut self, parent: DirId, name: &str) -> Result<DirId> {
        self.ensure_writable()?;
        self.dir_ref(parent)?;
        self.check_new_name(name)?;
        if self.get_dir(parent, name).is_some() {
            return Err(RezError::DuplicateName(name.to_string()));
        }

        let dir = self.attach_dir(parent, name, 0, 0, now())?;
        debug!("Created directory {}", name);
        Ok(dir)
    }

    pub fn first_sub_dir(&self, dir: DirId) -> Option<DirId> {
        let subdirs = &self.dirs.get(dir)?.subdirs;
        subdirs.get(subdirs.first()?).copied()
    }

    /// Sibling after `dir` in its parent's table walk
    pub fn next_sub_dir(&self, dir: DirId) -> Option<DirId> {
        let d = self.dirs.get(dir)?;
        let siblings = &self.dirs.get(d.parent?)?.subdirs;
        siblings.get(siblings.next(d.slot?)?).copied()
    }

    pub fn sub_dirs(&self, dir: DirId) -> Vec<DirId> {
        self.dirs.subdirs(dir)
    }

    fn all_dirs(&self) -> Vec<DirId> {
        let mut out = Vec::new();
        let mut stack: Vec<DirId> = self.root.into_iter().collect();
        while let Some(dir) = stack.pop() {
            out.push(dir);
            stack.extend(self.dirs.subdirs(dir));
        }
        out
    }

    // ---- types and items ----------------------------------------------------

    pub fn rez_type(&self, dir: DirId, tag: TypeTag) -> Option<&RezType> {
        self.dirs.get(dir)?.rez_type(tag)
    }

    pub fn first_type(&self, dir: DirId) -> Option<TypeTag> {
        let types = &self.dirs.get(dir)?.types;
        types.get(types.first()?).map(RezType::tag)
    }

    pub fn next_type(&self, dir: DirId, tag: TypeTag) -> Option<TypeTag> {
        let d = self.dirs.get(dir)?;
        let next = d.types.next(d.type_slot(tag)?)?;
        d.types.get(next).map(RezType::tag)
    }

    pub fn item(&self, item: ItemId) -> Option<&RezItem> {
        self.items.get(item)
    }

    pub fn get_rez(&self, dir: DirId, name: &str, tag: TypeTag) -> Option<ItemId> {
        self.rez_type(dir, tag)?
            .find_by_name(&self.items, name, self.config.case_sensitive)
    }

    /// Look an item up by ID; needs `item_by_id`
    pub fn get_rez_by_id(&self, dir: DirId, id: u32, tag: TypeTag) -> Option<ItemId> {
        self.rez_type(dir, tag)?.find_by_id(&self.items, id)
    }

    pub fn first_item(&self, dir: DirId, tag: TypeTag) -> Option<ItemId> {
        let by_name = &self.rez_type(dir, tag)?.by_name;
        by_name.get(by_name.first()?).copied()
    }

    /// Item after `item` in its type bucket's walk
    pub fn next_item(&self, item: ItemId) -> Option<ItemId> {
        let rec = self.items.get(item)?;
        let by_name = &self.rez_type(rec.dir?, rec.type_tag)?.by_name;
        by_name.get(by_name.next(rec.name_slot?)?).copied()
    }

    /// Every item of a directory, type by type
    pub fn dir_items(&self, dir: DirId) -> Vec<ItemId> {
        self.dirs
            .get(dir)
            .map(|d| d.types.iter().flat_map(|(_, t)| t.items()).collect())
            .unwrap_or_default()
    }

    /// Create an item with an ID drawn from the counter
    pub fn create_rez(&mut self, dir: DirId, name: &str, tag: TypeTag) -> Result<ItemId> {
        self.ensure_writable()?;
        let id = self.next_id;
        let item = self.create_rez_with_id(dir, id, name, tag)?;
        self.next_id = self.next_id.wrapping_add(1);
        Ok(item)
    }

    pub fn create_rez_with_id(
        &mut self,
        dir: DirId,
        id: u32,
        name: &str,
        tag: TypeTag,
    ) -> Result<ItemId> {
        self.ensure_writable()?;
        self.dir_ref(dir)?;
        self.check_new_name(name)?;
        if self.get_rez(dir, name, tag).is_some() {
            return Err(RezError::DuplicateName(name.to_string()));
        }

        let file = FileRef {
            file: FileId(0),
            entry: None,
        };
        let item = self.create_rez_internal(dir, tag, name, id, Some(file))?;
        debug!("Created resource {} ({})", name, tag);
        Ok(item)
    }

    pub fn remove_rez(&mut self, item: ItemId) -> Result<()> {
        self.ensure_writable()?;
        self.remove_rez_internal(item)
    }

    pub fn set_rez_time(&mut self, item: ItemId, time: u32) -> Result<()> {
        self.item_mut(item)?.time = time;
        Ok(())
    }

    pub fn set_rez_comment(&mut self, item: ItemId, comment: &str) -> Result<()> {
        self.ensure_writable()?;
        self.item_mut(item)?.comment = comment.to_string();
        grow_hint(&mut self.header.largest_comment_size, comment.len());
        Ok(())
    }

    pub fn set_rez_keys(&mut self, item: ItemId, keys: Vec<u32>) -> Result<()> {
        self.ensure_writable()?;
        self.header.largest_key_ary = self.header.largest_key_ary.max(keys.len() as u32);
        self.item_mut(item)?.keys = keys;
        Ok(())
    }

    // ---- paths --------------------------------------------------------------

    pub fn get_dir_from_path(&self, path: &str) -> Option<DirId> {
        self.get_dir_from_path_in(self.root?, path)
    }

    /// Walk `path` down from `start`; an empty path names `start` itself
    pub fn get_dir_from_path_in(&self, start: DirId, path: &str) -> Option<DirId> {
        self.separators
            .components(path)
            .into_iter()
            .try_fold(start, |dir, name| self.get_dir(dir, name))
    }

    fn split_rez_path<'a>(&self, path: &'a str) -> Option<(DirId, &'a str)> {
        let (dir_part, name) = self.separators.split_last(path);
        if name.is_empty() {
            return None;
        }
        let dir = match dir_part {
            Some(dir_part) => self.get_dir_from_path(dir_part)?,
            None => self.root?,
        };
        Some((dir, name))
    }

    pub fn get_rez_from_path(&self, path: &str, tag: TypeTag) -> Option<ItemId> {
        let (dir, name) = self.split_rez_path(path)?;
        self.get_rez(dir, name, tag)
    }

    /// Look up `dir\name.ext`, taking the type from the extension
    pub fn get_rez_from_dos_path(&self, path: &str) -> Option<ItemId> {
        let (dir, name) = self.split_rez_path(path)?;
        self.get_rez_from_dos_name(dir, name)
    }

    pub fn get_rez_from_dos_name(&self, dir: DirId, file_name: &str) -> Option<ItemId> {
        let (name, tag) = split_dos_name(file_name);
        self.get_rez(dir, name, tag)
    }

    fn path_separator(&self) -> char {
        self.config
            .dir_separators
            .as_deref()
            .and_then(|set| set.chars().next())
            .unwrap_or('\\')
    }

    /// Path of a directory from the root, e.g. `\SPRITES\ENEMY`; the root is `\`
    pub fn dir_path(&self, dir: DirId) -> Option<String> {
        let sep = self.path_separator();
        let mut names = Vec::new();
        let mut cur = self.dirs.get(dir)?;
        while let Some(parent) = cur.parent {
            names.push(cur.name.as_str());
            cur = self.dirs.get(parent)?;
        }

        if names.is_empty() {
            return Some(sep.to_string());
        }
        Some(names.iter().rev().fold(String::new(), |mut path, name| {
            path.push(sep);
            path.push_str(name);
            path
        }))
    }

    /// Full path of an item including its name
    pub fn item_path(&self, item: ItemId) -> Option<String> {
        let rec = self.items.get(item)?;
        let mut path = self.dir_path(rec.dir?)?;
        if !path.ends_with(self.path_separator()) {
            path.push(self.path_separator());
        }
        path.push_str(&rec.name);
        Some(path)
    }

    // ---- directory emulation ------------------------------------------------

    /// Mirror a scanned directory into `dir`, recursing into subdirectories
    pub(crate) fn merge_emulated_dir(
        &mut self,
        file: FileId,
        dir: DirId,
        scanned: ScannedDir,
        overwrite_items: bool,
    ) -> Result<()> {
        for entry in scanned.entries {
            let (path, file_name, size, time) = match entry {
                ScannedEntry::Dir { name, contents } => {
                    let name = if self.config.case_sensitive {
                        name
                    } else {
                        name.to_ascii_uppercase()
                    };
                    let child = match self.get_dir(dir, &name) {
                        Some(child) => child,
                        None => self.attach_dir(dir, &name, 0, 0, now())?,
                    };
                    self.merge_emulated_dir(file, child, contents, overwrite_items)?;
                    continue;
                }
                ScannedEntry::File {
                    path,
                    name,
                    size,
                    time,
                } => (path, name, size, time),
            };

            let (name, numeric_id, tag) = emulated_item_name(&file_name);
            let id = numeric_id.unwrap_or_else(|| {
                let id = self.next_id;
                self.next_id = self.next_id.wrapping_add(1);
                id
            });

            if let Some(existing) = self.get_rez(dir, &name, tag) {
                if !overwrite_items {
                    debug!("Keeping existing {} over {}", name, path.display());
                    continue;
                }
                self.remove_rez_internal(existing)?;
            }

            let entry_index = match self.files.get_mut(file.0) {
                Some(BackingFile::DirEmulation(emu)) => emu.add_entry(path),
                _ => return Err(RezError::InvalidHandle),
            };
            let file_ref = FileRef {
                file,
                entry: Some(entry_index),
            };
            let item = self.create_rez_internal(dir, tag, &name, id, Some(file_ref))?;

            let rec = self.item_mut(item)?;
            rec.size = size;
            rec.time = time;
            let d = self.dir_mut(dir)?;
            d.items_size = d.items_size.saturating_add(size);
        }

        Ok(())
    }
}

/// A real directory listed for emulation, entries in file-name order
#[derive(Debug, Default)]
pub(crate) struct ScannedDir {
    entries: Vec<ScannedEntry>,
}

#[derive(Debug)]
enum ScannedEntry {
    Dir {
        name: String,
        contents: ScannedDir,
    },
    File {
        path: PathBuf,
        name: String,
        size: u32,
        time: u32,
    },
}

/// List `path` and everything below it without touching the tree
pub(crate) fn scan_emulated_dir(path: &Path) -> Result<ScannedDir> {
    let mut listing = std::fs::read_dir(path)?.collect::<std::io::Result<Vec<_>>>()?;
    listing.sort_by_key(|entry| entry.file_name());

    let mut entries = Vec::with_capacity(listing.len());
    for entry in listing {
        let entry_path = entry.path();
        let meta = std::fs::metadata(&entry_path)?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if meta.is_dir() {
            let contents = scan_emulated_dir(&entry_path)?;
            entries.push(ScannedEntry::Dir { name, contents });
        } else if meta.is_file() {
            let size = u32::try_from(meta.len()).map_err(|_| RezError::ArchiveFull)?;
            entries.push(ScannedEntry::File {
                path: entry_path,
                name,
                size,
                time: modified_time(&meta),
            });
        }
    }
    Ok(ScannedDir { entries })
}

/// Item name, numeric ID and type of an emulated file
///
/// The name is the upper-cased stem, with an extension too long to be a type
/// appended unchanged. A stem of digits only is the item's ID.
pub(crate) fn emulated_item_name(file_name: &str) -> (String, Option<u32>, TypeTag) {
    let (base, tag) = split_dos_name(file_name);
    let stem = file_name.rfind('.').map_or(file_name, |dot| &file_name[..dot]);

    let numeric = !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit());
    let id = if numeric { stem.parse().ok() } else { None };

    let mut name = stem.to_ascii_uppercase();
    name.push_str(&base[stem.len()..]);
    (name, id, tag)
}

impl Drop for RezMgr {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close archive on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tag(s: &str) -> TypeTag {
        TypeTag::from(s)
    }

    fn new_archive(temp: &TempDir) -> RezMgr {
        let mut mgr = RezMgr::new();
        mgr.open(temp.path().join("test.rez"), false, true).unwrap();
        mgr
    }

    #[test]
    fn test_open_twice_rejected() {
        let temp = TempDir::new().unwrap();
        let mut mgr = new_archive(&temp);
        assert!(matches!(
            mgr.open(temp.path().join("other.rez"), false, true),
            Err(RezError::AlreadyOpen)
        ));
    }

    #[test]
    fn test_create_new_read_only_rejected() {
        let temp = TempDir::new().unwrap();
        let mut mgr = RezMgr::new();
        assert!(matches!(
            mgr.open(temp.path().join("x.rez"), true, true),
            Err(RezError::ReadOnly)
        ));
        assert!(!mgr.is_open());
    }

    #[test]
    fn test_create_dir_rules() {
        let temp = TempDir::new().unwrap();
        let mut mgr = new_archive(&temp);
        let root = mgr.root_dir().unwrap();

        let sprites = mgr.create_dir(root, "SPRITES").unwrap();
        assert_eq!(mgr.get_dir(root, "sprites"), Some(sprites));
        assert!(matches!(
            mgr.create_dir(root, "Sprites"),
            Err(RezError::DuplicateName(_))
        ));
        assert!(matches!(mgr.create_dir(root, ""), Err(RezError::InvalidName(_))));
        assert_eq!(mgr.largest_dir_name_size(), 8);
    }

    #[test]
    fn test_names_outside_lookup_classes_accepted() {
        let temp = TempDir::new().unwrap();
        let mut mgr = new_archive(&temp);
        let root = mgr.root_dir().unwrap();

        let ui = mgr.create_dir(root, "ui_art").unwrap();
        let save = mgr.create_rez(ui, "player_01", tag("SAV")).unwrap();
        let song = mgr.create_rez_with_id(root, 9, "caf\u{e9}", tag("WAV")).unwrap();

        assert_eq!(mgr.get_dir(root, "ui_art"), Some(ui));
        assert_eq!(mgr.get_rez(ui, "player_01", tag("SAV")), Some(save));
        assert_eq!(mgr.get_rez(root, "caf\u{e9}", tag("WAV")), Some(song));
        assert!(matches!(
            mgr.create_rez(root, "", tag("WAV")),
            Err(RezError::InvalidName(_))
        ));
    }

    #[test]
    fn test_configured_separators_rejected_in_names() {
        let temp = TempDir::new().unwrap();
        let config = RezConfig {
            dir_separators: Some("|".to_string()),
            ..RezConfig::default()
        };
        let mut mgr = RezMgr::with_config(config).unwrap();
        mgr.open(temp.path().join("sep.rez"), false, true).unwrap();
        let root = mgr.root_dir().unwrap();

        assert!(matches!(mgr.create_dir(root, "A|B"), Err(RezError::InvalidName(_))));
        assert!(matches!(
            mgr.create_rez(root, "X|Y", tag("DAT")),
            Err(RezError::InvalidName(_))
        ));
        assert!(mgr.create_dir(root, "A\\B").is_ok());
    }

    #[test]
    fn test_emulated_item_names() {
        assert_eq!(emulated_item_name("Rock.pcx"), ("ROCK".to_string(), None, tag("PCX")));
        assert_eq!(emulated_item_name("123.pcx"), ("123".to_string(), Some(123), tag("PCX")));
        assert_eq!(
            emulated_item_name("123.longext"),
            ("123.longext".to_string(), Some(123), TypeTag::NONE)
        );
        assert_eq!(
            emulated_item_name("Notes.longext"),
            ("NOTES.longext".to_string(), None, TypeTag::NONE)
        );
        assert_eq!(emulated_item_name("readme"), ("README".to_string(), None, TypeTag::NONE));
        assert_eq!(emulated_item_name("99999999999.dat").1, None);
    }

    #[test]
    fn test_create_rez_rules() {
        let temp = TempDir::new().unwrap();
        let mut mgr = new_archive(&temp);
        let root = mgr.root_dir().unwrap();

        let first_id = mgr.next_id();
        let rock = mgr.create_rez(root, "ROCK", tag("PCX")).unwrap();
        assert_eq!(mgr.item(rock).unwrap().id(), first_id);
        assert_eq!(mgr.next_id(), first_id + 1);

        assert!(matches!(
            mgr.create_rez(root, "rock", tag("PCX")),
            Err(RezError::DuplicateName(_))
        ));
        // Same name under another type is a different item
        assert!(mgr.create_rez(root, "ROCK", tag("WAV")).is_ok());
        assert_eq!(mgr.next_id(), first_id + 2);
    }

    #[test]
    fn test_sub_dir_walk() {
        let temp = TempDir::new().unwrap();
        let mut mgr = new_archive(&temp);
        let root = mgr.root_dir().unwrap();
        for name in ["A", "BB", "CCC", "DD"] {
            mgr.create_dir(root, name).unwrap();
        }

        let mut walked = Vec::new();
        let mut cur = mgr.first_sub_dir(root);
        while let Some(dir) = cur {
            walked.push(mgr.dir(dir).unwrap().name().to_string());
            cur = mgr.next_sub_dir(dir);
        }

        // 5 bins by name length: A(1), DD and BB (2, newest first), CCC(3)
        assert_eq!(walked, vec!["A", "DD", "BB", "CCC"]);
    }

    #[test]
    fn test_type_and_item_walk() {
        let temp = TempDir::new().unwrap();
        let mut mgr = new_archive(&temp);
        let root = mgr.root_dir().unwrap();
        mgr.create_rez(root, "ONE", tag("PCX")).unwrap();
        mgr.create_rez(root, "TWO", tag("PCX")).unwrap();
        mgr.create_rez(root, "THREE", tag("WAV")).unwrap();

        let mut tags = Vec::new();
        let mut cur = mgr.first_type(root);
        while let Some(t) = cur {
            tags.push(t);
            cur = mgr.next_type(root, t);
        }
        assert_eq!(tags.len(), 2);

        let first = mgr.first_item(root, tag("PCX")).unwrap();
        let second = mgr.next_item(first).unwrap();
        assert_eq!(mgr.item(first).unwrap().name(), "TWO");
        assert_eq!(mgr.item(second).unwrap().name(), "ONE");
        assert!(mgr.next_item(second).is_none());
        assert_eq!(mgr.dir_items(root).len(), 3);
    }

    #[test]
    fn test_remove_rez_returns_slot() {
        let temp = TempDir::new().unwrap();
        let mut mgr = new_archive(&temp);
        let root = mgr.root_dir().unwrap();
        let rock = mgr.create_rez(root, "ROCK", tag("PCX")).unwrap();

        mgr.remove_rez(rock).unwrap();
        assert!(mgr.item(rock).is_none());
        assert!(mgr.get_rez(root, "ROCK", tag("PCX")).is_none());
        assert_eq!(mgr.item_pool().live(), 0);

        let again = mgr.create_rez(root, "STONE", tag("PCX")).unwrap();
        assert_eq!(again, rock);
    }

    #[test]
    fn test_paths() {
        let temp = TempDir::new().unwrap();
        let mut mgr = new_archive(&temp);
        let root = mgr.root_dir().unwrap();
        let sprites = mgr.create_dir(root, "SPRITES").unwrap();
        let enemy = mgr.create_dir(sprites, "ENEMY").unwrap();
        let ogre = mgr.create_rez(enemy, "OGRE", tag("PCX")).unwrap();
        let top = mgr.create_rez(root, "TOP", tag("TXT")).unwrap();

        assert_eq!(mgr.get_dir_from_path("\\SPRITES\\ENEMY"), Some(enemy));
        assert_eq!(mgr.get_dir_from_path("sprites/enemy/"), Some(enemy));
        assert_eq!(mgr.get_dir_from_path(""), Some(root));
        assert_eq!(mgr.get_dir_from_path("\\NOPE"), None);

        assert_eq!(mgr.get_rez_from_path("\\SPRITES\\ENEMY\\OGRE", tag("PCX")), Some(ogre));
        assert_eq!(mgr.get_rez_from_path("TOP", tag("TXT")), Some(top));
        assert_eq!(mgr.get_rez_from_path("\\TOP", tag("TXT")), Some(top));
        assert_eq!(mgr.get_rez_from_dos_path("sprites\\enemy\\ogre.pcx"), Some(ogre));
        assert_eq!(mgr.get_rez_from_path("\\SPRITES\\", tag("PCX")), None);

        assert_eq!(mgr.dir_path(root).unwrap(), "\\");
        assert_eq!(mgr.dir_path(enemy).unwrap(), "\\SPRITES\\ENEMY");
        assert_eq!(mgr.item_path(ogre).unwrap(), "\\SPRITES\\ENEMY\\OGRE");
        assert_eq!(mgr.item_path(top).unwrap(), "\\TOP");
    }

    #[test]
    fn test_ids_and_renumbering() {
        let temp = TempDir::new().unwrap();
        let config = RezConfig {
            item_by_id: true,
            ..RezConfig::default()
        };
        let mut mgr = RezMgr::with_config(config).unwrap();
        mgr.open(temp.path().join("ids.rez"), false, true).unwrap();
        let root = mgr.root_dir().unwrap();

        let a = mgr.create_rez_with_id(root, 7, "A", tag("DAT")).unwrap();
        let b = mgr.create_rez_with_id(root, 7, "B", tag("DAT")).unwrap();

        assert_eq!(mgr.get_rez_by_id(root, 7, tag("DAT")), Some(a));
        let renumbered = mgr.item(b).unwrap().id();
        assert_ne!(renumbered, 7);
        assert_eq!(mgr.get_rez_by_id(root, renumbered, tag("DAT")), Some(b));
    }

    #[test]
    fn test_read_only_guards() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ro.rez");
        {
            let mut mgr = RezMgr::new();
            mgr.open(&path, false, true).unwrap();
            mgr.close().unwrap();
        }

        let mut mgr = RezMgr::new();
        mgr.open(&path, true, false).unwrap();
        let root = mgr.root_dir().unwrap();
        assert!(matches!(mgr.create_dir(root, "X"), Err(RezError::ReadOnly)));
        assert!(matches!(mgr.flush(), Err(RezError::ReadOnly)));
        assert!(mgr.close().is_ok());
    }

    #[test]
    fn test_overlay_needs_read_only_primary() {
        let temp = TempDir::new().unwrap();
        let mut mgr = new_archive(&temp);
        assert!(matches!(
            mgr.open_additional(temp.path().join("more.rez"), false),
            Err(RezError::OverlayOnWritable)
        ));
    }
}
