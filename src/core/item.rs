use crate::core::dir::DirId;
use crate::core::io::FileRef;
use crate::core::list::{Link, Linked};
use crate::core::types::TypeTag;

/// A resource record
///
/// Records live in the [`ItemPool`](crate::core::pool::ItemPool) and are
/// addressed by [`ItemId`](crate::core::pool::ItemId). `file_pos == 0` means
/// the payload has not been written to the archive yet.
#[derive(Debug, Default)]
pub struct RezItem {
    pub(crate) name: String,
    pub(crate) id: u32,
    pub(crate) type_tag: TypeTag,
    pub(crate) size: u32,
    pub(crate) file_pos: u32,
    pub(crate) time: u32,
    pub(crate) cur_pos: u32,
    pub(crate) data: Option<Vec<u8>>,
    pub(crate) comment: String,
    pub(crate) keys: Vec<u32>,
    pub(crate) dir: Option<DirId>,
    pub(crate) file: Option<FileRef>,
    /// Slot in the type bucket's by-name table
    pub(crate) name_slot: Option<usize>,
    /// Slot in the type bucket's by-ID table
    pub(crate) id_slot: Option<usize>,
    pub(crate) free_link: Link,
    pub(crate) live: bool,
}

impl RezItem {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn file_pos(&self) -> u32 {
        self.file_pos
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn keys(&self) -> &[u32] {
        &self.keys
    }

    pub fn dir(&self) -> Option<DirId> {
        self.dir
    }

    pub fn file(&self) -> Option<FileRef> {
        self.file
    }

    /// Read cursor used by `read`/`seek`
    pub fn tell(&self) -> u32 {
        self.cur_pos
    }

    pub fn end_of_rez(&self) -> bool {
        self.cur_pos >= self.size
    }

    /// Whether the item holds a private payload buffer
    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Reset every field, releasing the payload buffer. The pool link is kept.
    pub(crate) fn terminate(&mut self) {
        let free_link = self.free_link;
        *self = RezItem {
            free_link,
            ..RezItem::default()
        };
    }
}

impl Linked for RezItem {
    fn link(&self) -> &Link {
        &self.free_link
    }

    fn link_mut(&mut self) -> &mut Link {
        &mut self.free_link
    }
}
