//! Chunked item pool
//!
//! Item records are allocated a chunk at a time and recycled through a free
//! list threaded through the records' own links. A freed record is terminated
//! before it goes back on the list, so no two live items share a slot. Chunks
//! are only released when the pool is dropped.

use crate::core::config::DEFAULT_ITEM_CHUNK_SIZE;
use crate::core::error::{RezError, Result};
use crate::core::item::RezItem;
use crate::core::list::{Link, Linked, Links, List};
use tracing::debug;

/// Stable handle of an item record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) usize);

impl ItemId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Chunks {
    chunks: Vec<Box<[RezItem]>>,
    chunk_size: usize,
}

impl Chunks {
    fn slot(&self, index: usize) -> Option<&RezItem> {
        self.chunks
            .get(index / self.chunk_size)
            .and_then(|chunk| chunk.get(index % self.chunk_size))
    }

    fn slot_mut(&mut self, index: usize) -> Option<&mut RezItem> {
        let chunk_size = self.chunk_size;
        self.chunks
            .get_mut(index / chunk_size)
            .and_then(|chunk| chunk.get_mut(index % chunk_size))
    }
}

impl Links for Chunks {
    fn link(&self, index: usize) -> &Link {
        self.chunks[index / self.chunk_size][index % self.chunk_size].link()
    }

    fn link_mut(&mut self, index: usize) -> &mut Link {
        let chunk_size = self.chunk_size;
        self.chunks[index / chunk_size][index % chunk_size].link_mut()
    }
}

#[derive(Debug)]
pub struct ItemPool {
    slots: Chunks,
    free: List,
    live: usize,
}

impl ItemPool {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RezError::Config(
                "item_chunk_size must be non-zero".to_string(),
            ));
        }

        Ok(ItemPool {
            slots: Chunks {
                chunks: Vec::new(),
                chunk_size,
            },
            free: List::new(),
            live: 0,
        })
    }

    pub fn with_default_chunks() -> Self {
        ItemPool {
            slots: Chunks {
                chunks: Vec::new(),
                chunk_size: DEFAULT_ITEM_CHUNK_SIZE,
            },
            free: List::new(),
            live: 0,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.slots.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.slots.chunks.len()
    }

    pub fn capacity(&self) -> usize {
        self.chunk_count() * self.chunk_size()
    }

    /// Records currently handed out
    pub fn live(&self) -> usize {
        self.live
    }

    fn grow(&mut self) {
        let base = self.capacity();
        let chunk: Box<[RezItem]> = (0..self.chunk_size())
            .map(|_| RezItem::default())
            .collect();
        self.slots.chunks.push(chunk);

        for index in base..base + self.chunk_size() {
            self.free.insert_last(&mut self.slots, index);
        }
        debug!("Item pool grew to {} records", self.capacity());
    }

    /// Take a blank record
    pub fn alloc(&mut self) -> ItemId {
        if self.free.is_empty() {
            self.grow();
        }

        // grow() leaves at least one free slot
        let index = self.free.pop_first(&mut self.slots).unwrap_or_default();
        if let Some(item) = self.slots.slot_mut(index) {
            item.live = true;
        }
        self.live += 1;
        ItemId(index)
    }

    /// Terminate a record and put it at the front of the free list
    pub fn free(&mut self, id: ItemId) -> Result<()> {
        let item = self
            .slots
            .slot_mut(id.0)
            .filter(|item| item.live)
            .ok_or(RezError::InvalidHandle)?;
        item.terminate();

        self.free.insert_first(&mut self.slots, id.0);
        self.live -= 1;
        Ok(())
    }

    pub fn get(&self, id: ItemId) -> Option<&RezItem> {
        self.slots.slot(id.0).filter(|item| item.live)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut RezItem> {
        self.slots.slot_mut(id.0).filter(|item| item.live)
    }
}
