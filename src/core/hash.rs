//! Linked hash table
//!
//! A fixed array of bins, each an intrusive [`List`] threaded through the
//! table's node slab. The bin count is set at construction and never changes.
//! Each element's bin is chosen by the [`BinHash`] strategy of its key and
//! cached on the node, so removal is O(1).
//!
//! Whole-table traversal visits bins in ascending index order and each bin in
//! list order. Inserts always go to the front of their bin, so within one bin
//! the walk yields elements newest first.
//!
//! Element handles are slot indices. A slot stays valid until the element is
//! deleted; traversal from a live slot is unaffected by inserting or deleting
//! other elements.

use crate::core::error::{RezError, Result};
use crate::core::list::{Link, Linked, List};

/// Bin selection strategy for a key
///
/// The table reduces the returned value modulo its bin count. The archive
/// format fixes these hashes, so they must not be "improved".
pub trait BinHash {
    fn bin_hash(&self) -> usize;
}

/// Names hash by their length in bytes
impl BinHash for str {
    fn bin_hash(&self) -> usize {
        self.len()
    }
}

impl BinHash for String {
    fn bin_hash(&self) -> usize {
        self.as_str().bin_hash()
    }
}

/// Numeric keys (type tags, IDs) hash by value
impl BinHash for u32 {
    fn bin_hash(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug)]
struct Node<T> {
    value: Option<T>,
    link: Link,
    bin: usize,
}

impl<T> Linked for Node<T> {
    fn link(&self) -> &Link {
        &self.link
    }

    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

#[derive(Debug)]
pub struct LinkedHashTable<T> {
    nodes: Vec<Node<T>>,
    bins: Vec<List>,
    /// Free node slots, threaded through the same embedded links
    vacant: List,
    len: usize,
}

impl<T> LinkedHashTable<T> {
    /// Create a table with a fixed number of bins
    pub fn new(num_bins: usize) -> Result<Self> {
        if num_bins == 0 {
            return Err(RezError::Config(
                "hash table needs at least one bin".to_string(),
            ));
        }

        Ok(LinkedHashTable {
            nodes: Vec::new(),
            bins: vec![List::new(); num_bins],
            vacant: List::new(),
            len: 0,
        })
    }

    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bin a key hashes to
    pub fn bin_for<K: BinHash + ?Sized>(&self, key: &K) -> usize {
        key.bin_hash() % self.bins.len()
    }

    /// Insert `value` at the front of the bin selected by `key`
    pub fn insert<K: BinHash + ?Sized>(&mut self, key: &K, value: T) -> usize {
        let bin = self.bin_for(key);
        self.link_into_bin(bin, value)
    }

    /// Insert `value` at the front of an explicit bin
    pub fn insert_in_bin(&mut self, bin: usize, value: T) -> Result<usize> {
        self.check_bin(bin)?;
        Ok(self.link_into_bin(bin, value))
    }

    fn link_into_bin(&mut self, bin: usize, value: T) -> usize {
        let slot = match self.vacant.pop_first(&mut self.nodes) {
            Some(slot) => {
                let node = &mut self.nodes[slot];
                node.value = Some(value);
                node.bin = bin;
                slot
            }
            None => {
                self.nodes.push(Node {
                    value: Some(value),
                    link: Link::default(),
                    bin,
                });
                self.nodes.len() - 1
            }
        };

        self.bins[bin].insert_first(&mut self.nodes, slot);
        self.len += 1;
        slot
    }

    /// Remove the element in `slot`, using its cached bin
    pub fn delete(&mut self, slot: usize) -> Option<T> {
        let node = self.nodes.get_mut(slot)?;
        let value = node.value.take()?;
        let bin = node.bin;

        self.bins[bin].delete(&mut self.nodes, slot);
        self.vacant.insert_first(&mut self.nodes, slot);
        self.len -= 1;
        Some(value)
    }

    /// Remove every element, keeping the bin count
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.bins.iter_mut().for_each(|bin| *bin = List::new());
        self.vacant = List::new();
        self.len = 0;
    }

    pub fn get(&self, slot: usize) -> Option<&T> {
        self.nodes.get(slot)?.value.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.nodes.get_mut(slot)?.value.as_mut()
    }

    /// Cached bin of a live element
    pub fn bin_of(&self, slot: usize) -> Option<usize> {
        let node = self.nodes.get(slot)?;
        node.value.as_ref().map(|_| node.bin)
    }

    fn check_bin(&self, bin: usize) -> Result<()> {
        if bin >= self.bins.len() {
            return Err(RezError::BinOutOfRange {
                bin,
                num_bins: self.bins.len(),
            });
        }
        Ok(())
    }

    pub fn first_in_bin(&self, bin: usize) -> Result<Option<usize>> {
        self.check_bin(bin)?;
        Ok(self.bins[bin].first())
    }

    pub fn next_in_bin(&self, slot: usize) -> Option<usize> {
        self.live(slot)?.link.next()
    }

    pub fn prev_in_bin(&self, slot: usize) -> Option<usize> {
        self.live(slot)?.link.prev()
    }

    fn live(&self, slot: usize) -> Option<&Node<T>> {
        self.nodes.get(slot).filter(|node| node.value.is_some())
    }

    /// First element of the whole-table walk
    pub fn first(&self) -> Option<usize> {
        self.bins.iter().find_map(List::first)
    }

    /// Last element of the whole-table walk
    pub fn last(&self) -> Option<usize> {
        self.bins.iter().rev().find_map(List::last)
    }

    /// Successor of `slot`, crossing to the next non-empty bin when its own
    /// chain is exhausted
    pub fn next(&self, slot: usize) -> Option<usize> {
        let node = self.live(slot)?;
        node.link
            .next()
            .or_else(|| self.bins[node.bin + 1..].iter().find_map(List::first))
    }

    /// Predecessor of `slot`, crossing to the previous non-empty bin
    pub fn prev(&self, slot: usize) -> Option<usize> {
        let node = self.live(slot)?;
        node.link
            .prev()
            .or_else(|| self.bins[..node.bin].iter().rev().find_map(List::last))
    }

    /// Walk one bin's chain looking for an element accepted by `matches`
    pub fn find<K, F>(&self, key: &K, mut matches: F) -> Option<usize>
    where
        K: BinHash + ?Sized,
        F: FnMut(&T) -> bool,
    {
        let bin = self.bin_for(key);
        self.bins[bin]
            .iter(&self.nodes)
            .find(|&slot| self.nodes[slot].value.as_ref().is_some_and(&mut matches))
    }

    /// Whole-table walk yielding `(slot, value)`
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            table: self,
            cur: self.first(),
        }
    }

    /// Slots of the whole-table walk, collected so the table can be mutated
    /// while they are visited
    pub fn slots(&self) -> Vec<usize> {
        self.iter().map(|(slot, _)| slot).collect()
    }
}

pub struct Iter<'a, T> {
    table: &'a LinkedHashTable<T>,
    cur: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cur?;
        self.cur = self.table.next(slot);
        self.table.get(slot).map(|value| (slot, value))
    }
}
