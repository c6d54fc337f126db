//! Directory tree and type buckets
//!
//! Directories live in a [`DirArena`] and refer to each other by [`DirId`].
//! Each directory owns a table of child directory ids (hashed by name length)
//! and a table of [`RezType`] buckets (hashed by tag value). A bucket owns the
//! ids of its items, hashed by name length and optionally by ID.

use crate::core::hash::LinkedHashTable;
use crate::core::pool::{ItemId, ItemPool};
use crate::core::types::TypeTag;

/// Stable handle of a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(pub(crate) usize);

impl DirId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Name comparison honouring the archive's case setting
pub fn names_match(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

/// Items of one type within one directory
#[derive(Debug)]
pub struct RezType {
    pub(crate) tag: TypeTag,
    pub(crate) dir: DirId,
    pub(crate) by_name: LinkedHashTable<ItemId>,
    pub(crate) by_id: Option<LinkedHashTable<ItemId>>,
}

impl RezType {
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn dir(&self) -> DirId {
        self.dir
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn find_by_name(&self, pool: &ItemPool, name: &str, case_sensitive: bool) -> Option<ItemId> {
        let slot = self.by_name.find(name, |&id| {
            pool.get(id)
                .is_some_and(|item| names_match(&item.name, name, case_sensitive))
        })?;
        self.by_name.get(slot).copied()
    }

    pub fn find_by_id(&self, pool: &ItemPool, id: u32) -> Option<ItemId> {
        let table = self.by_id.as_ref()?;
        let slot = table.find(&id, |&item| pool.get(item).is_some_and(|it| it.id == id))?;
        table.get(slot).copied()
    }

    /// Items in by-name table walk order
    pub fn items(&self) -> Vec<ItemId> {
        self.by_name.iter().map(|(_, &id)| id).collect()
    }
}

#[derive(Debug)]
pub struct RezDir {
    pub(crate) name: String,
    pub(crate) parent: Option<DirId>,
    /// Position, size and time of this directory's own serialized block
    pub(crate) dir_pos: u32,
    pub(crate) dir_size: u32,
    pub(crate) time: u32,
    /// Contiguous region holding every item payload, valid when sorted
    pub(crate) items_pos: u32,
    pub(crate) items_size: u32,
    pub(crate) subdirs: LinkedHashTable<DirId>,
    pub(crate) types: LinkedHashTable<RezType>,
    /// Bulk-loaded payloads of every item, starting at `items_pos`
    pub(crate) mem_block: Option<Vec<u8>>,
    /// Slot in the parent's subdirectory table
    pub(crate) slot: Option<usize>,
}

impl RezDir {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn dir_pos(&self) -> u32 {
        self.dir_pos
    }

    pub fn dir_size(&self) -> u32 {
        self.dir_size
    }

    pub fn items_pos(&self) -> u32 {
        self.items_pos
    }

    pub fn items_size(&self) -> u32 {
        self.items_size
    }

    pub fn is_bulk_loaded(&self) -> bool {
        self.mem_block.is_some()
    }

    pub fn subdir_count(&self) -> usize {
        self.subdirs.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Slot of the bucket for `tag`
    pub(crate) fn type_slot(&self, tag: TypeTag) -> Option<usize> {
        self.types.find(&tag.0, |t| t.tag == tag)
    }

    pub fn rez_type(&self, tag: TypeTag) -> Option<&RezType> {
        self.types.get(self.type_slot(tag)?)
    }

    pub(crate) fn rez_type_mut(&mut self, tag: TypeTag) -> Option<&mut RezType> {
        let slot = self.type_slot(tag)?;
        self.types.get_mut(slot)
    }

    /// Type tags in table walk order
    pub fn type_tags(&self) -> Vec<TypeTag> {
        self.types.iter().map(|(_, t)| t.tag).collect()
    }
}

/// Owner of every directory of an archive
#[derive(Debug, Default)]
pub struct DirArena {
    dirs: Vec<Option<RezDir>>,
    vacant: Vec<usize>,
}

impl DirArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dir: RezDir) -> DirId {
        match self.vacant.pop() {
            Some(index) => {
                self.dirs[index] = Some(dir);
                DirId(index)
            }
            None => {
                self.dirs.push(Some(dir));
                DirId(self.dirs.len() - 1)
            }
        }
    }

    pub fn remove(&mut self, id: DirId) -> Option<RezDir> {
        let dir = self.dirs.get_mut(id.0)?.take()?;
        self.vacant.push(id.0);
        Some(dir)
    }

    pub fn get(&self, id: DirId) -> Option<&RezDir> {
        self.dirs.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: DirId) -> Option<&mut RezDir> {
        self.dirs.get_mut(id.0)?.as_mut()
    }

    pub fn len(&self) -> usize {
        self.dirs.len() - self.vacant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.dirs.clear();
        self.vacant.clear();
    }

    pub fn find_subdir(&self, parent: DirId, name: &str, case_sensitive: bool) -> Option<DirId> {
        let dir = self.get(parent)?;
        let slot = dir.subdirs.find(name, |&child| {
            self.get(child)
                .is_some_and(|d| names_match(&d.name, name, case_sensitive))
        })?;
        dir.subdirs.get(slot).copied()
    }

    /// Child directories in table walk order
    pub fn subdirs(&self, parent: DirId) -> Vec<DirId> {
        self.get(parent)
            .map(|dir| dir.subdirs.iter().map(|(_, &id)| id).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(name: &str, parent: Option<DirId>) -> RezDir {
        RezDir {
            name: name.to_string(),
            parent,
            dir_pos: 0,
            dir_size: 0,
            time: 0,
            items_pos: 0,
            items_size: 0,
            subdirs: LinkedHashTable::new(5).unwrap(),
            types: LinkedHashTable::new(9).unwrap(),
            mem_block: None,
            slot: None,
        }
    }

    fn attach(arena: &mut DirArena, parent: DirId, name: &str) -> DirId {
        let child = arena.insert(dir(name, Some(parent)));
        let slot = arena.get_mut(parent).unwrap().subdirs.insert(name, child);
        arena.get_mut(child).unwrap().slot = Some(slot);
        child
    }

    #[test]
    fn test_names_match() {
        assert!(names_match("Foo", "foo", false));
        assert!(!names_match("Foo", "foo", true));
        assert!(names_match("foo", "foo", true));
    }

    #[test]
    fn test_find_subdir_case() {
        let mut arena = DirArena::new();
        let root = arena.insert(dir("", None));
        let sprites = attach(&mut arena, root, "Sprites");
        attach(&mut arena, root, "Sounds");

        assert_eq!(arena.find_subdir(root, "sprites", false), Some(sprites));
        assert_eq!(arena.find_subdir(root, "sprites", true), None);
        assert_eq!(arena.find_subdir(root, "Sprites", true), Some(sprites));
        assert_eq!(arena.subdirs(root).len(), 2);
    }

    #[test]
    fn test_arena_reuses_slots() {
        let mut arena = DirArena::new();
        let a = arena.insert(dir("a", None));
        arena.insert(dir("b", None));
        assert!(arena.remove(a).is_some());
        assert!(arena.get(a).is_none());
        assert_eq!(arena.len(), 1);

        let c = arena.insert(dir("c", None));
        assert_eq!(c, a);
        assert_eq!(arena.get(c).unwrap().name(), "c");
    }

    #[test]
    fn test_type_bucket_lookup() {
        let mut d = dir("root", None);
        let tag = TypeTag::from("PCX");
        d.types.insert(
            &tag.0,
            RezType {
                tag,
                dir: DirId(0),
                by_name: LinkedHashTable::new(19).unwrap(),
                by_id: None,
            },
        );

        assert_eq!(d.rez_type(tag).map(RezType::tag), Some(tag));
        assert!(d.rez_type(TypeTag::from("WAV")).is_none());
        assert_eq!(d.type_tags(), vec![tag]);
    }
}
