//! Property-based tests for linked hash table traversal
//!
//! Checks the walk order against a simple model: bins ascending, each bin
//! newest first, with deletions removing exactly one element.

use proptest::prelude::*;
use rezmgr::core::hash::LinkedHashTable;

/// Expected walk of `names` inserted in order into `bins` bins
fn model(names: &[(String, bool)], bins: usize) -> Vec<String> {
    let mut by_bin: Vec<Vec<String>> = vec![Vec::new(); bins];
    for (name, deleted) in names {
        if !deleted {
            by_bin[name.len() % bins].insert(0, name.clone());
        }
    }
    by_bin.into_iter().flatten().collect()
}

fn walk(table: &LinkedHashTable<String>) -> Vec<String> {
    let mut out = Vec::new();
    let mut slot = table.first();
    while let Some(s) = slot {
        out.push(table.get(s).unwrap().clone());
        slot = table.next(s);
    }
    out
}

proptest! {
    #[test]
    fn prop_walk_matches_model(
        bins in 1usize..12,
        names in prop::collection::vec(("[A-Z]{1,10}", any::<bool>()), 0..40)
    ) {
        let mut table = LinkedHashTable::new(bins).unwrap();
        let slots: Vec<usize> = names
            .iter()
            .map(|(name, _)| table.insert(name.as_str(), name.clone()))
            .collect();
        for ((_, deleted), slot) in names.iter().zip(&slots) {
            if *deleted {
                prop_assert!(table.delete(*slot).is_some());
            }
        }

        let expected = model(&names, bins);
        prop_assert_eq!(table.len(), expected.len());
        prop_assert_eq!(walk(&table), expected);
    }

    #[test]
    fn prop_reverse_walk_mirrors_forward(
        bins in 1usize..8,
        names in prop::collection::vec("[a-z]{0,6}", 0..30)
    ) {
        let mut table = LinkedHashTable::new(bins).unwrap();
        for name in &names {
            table.insert(name.as_str(), name.clone());
        }

        let mut backward = Vec::new();
        let mut slot = table.last();
        while let Some(s) = slot {
            backward.push(table.get(s).unwrap().clone());
            slot = table.prev(s);
        }
        backward.reverse();
        prop_assert_eq!(backward, walk(&table));
    }

    #[test]
    fn prop_deleted_slots_are_reused(
        count in 1usize..25,
    ) {
        let mut table = LinkedHashTable::new(5).unwrap();
        let slots: Vec<usize> = (0..count as u32).map(|i| table.insert(&i, i)).collect();
        for &slot in &slots {
            table.delete(slot);
        }
        prop_assert!(table.is_empty());

        let reused: Vec<usize> = (0..count as u32).map(|i| table.insert(&i, i)).collect();
        let mut sorted_old = slots.clone();
        let mut sorted_new = reused.clone();
        sorted_old.sort_unstable();
        sorted_new.sort_unstable();
        prop_assert_eq!(sorted_old, sorted_new);
    }
}
