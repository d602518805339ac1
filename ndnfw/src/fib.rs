use std::collections::HashMap;

use log::{debug, info};
use ndnfw_core::{FaceId, Name};

use crate::name_tree::NameTree;

/// A single next hop: the face to forward on and its routing cost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextHop {
    pub face: FaceId,
    pub cost: u32,
}

/// FIB entry: a name prefix and its next-hop list, sorted by ascending cost
/// with no duplicate faces.
#[derive(Debug, Clone)]
pub struct Entry {
    prefix: Name,
    next_hops: Vec<NextHop>,
}

impl Entry {
    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    pub fn next_hops(&self) -> &[NextHop] {
        &self.next_hops
    }

    pub fn has_next_hops(&self) -> bool {
        !self.next_hops.is_empty()
    }
}

/// Forwarding Information Base: name prefix to next-hop faces with costs
#[derive(Debug, Default)]
pub struct Fib {
    entries: HashMap<Name, Entry>,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Longest-prefix match for `name`
    pub fn find_longest_prefix_match(&self, name: &Name) -> Option<&Entry> {
        for depth in (0..=name.len()).rev() {
            let prefix = name.get_prefix(depth);
            if let Some(entry) = self.entries.get(&prefix) {
                return Some(entry);
            }
        }
        None
    }

    /// Exact-prefix lookup
    pub fn find_exact(&self, prefix: &Name) -> Option<&Entry> {
        self.entries.get(prefix)
    }

    /// Add a next hop to the entry for `prefix`, creating the entry if
    /// needed. Updates the cost if the face is already listed. Returns true
    /// when a new next hop was added (the caller propagates
    /// `after_new_next_hop`).
    pub fn add_or_update_next_hop(
        &mut self,
        tree: &mut NameTree,
        prefix: &Name,
        face: FaceId,
        cost: u32,
    ) -> bool {
        let entry = self.entries.entry(prefix.clone()).or_insert_with(|| {
            tree.set_fib_entry(prefix, true);
            info!("fib insert {}", prefix);
            Entry {
                prefix: prefix.clone(),
                next_hops: Vec::new(),
            }
        });

        let is_new = match entry.next_hops.iter_mut().find(|nh| nh.face == face) {
            Some(existing) => {
                existing.cost = cost;
                false
            }
            None => {
                entry.next_hops.push(NextHop { face, cost });
                true
            }
        };
        entry.next_hops.sort_by_key(|nh| nh.cost);
        debug!(
            "fib {} nexthop face={} cost={} {}",
            prefix,
            face,
            cost,
            if is_new { "added" } else { "updated" }
        );
        is_new
    }

    /// Remove `face` from the entry for `prefix`; erases the entry when its
    /// next-hop list becomes empty. Returns true if the entry was erased.
    pub fn remove_next_hop(&mut self, tree: &mut NameTree, prefix: &Name, face: FaceId) -> bool {
        let erase = match self.entries.get_mut(prefix) {
            Some(entry) => {
                entry.next_hops.retain(|nh| nh.face != face);
                entry.next_hops.is_empty()
            }
            None => false,
        };
        if erase {
            self.erase(tree, prefix);
        }
        erase
    }

    /// Erase the entry for `prefix`
    pub fn erase(&mut self, tree: &mut NameTree, prefix: &Name) {
        if self.entries.remove(prefix).is_some() {
            info!("fib erase {}", prefix);
            tree.set_fib_entry(prefix, false);
            tree.cleanup(prefix);
        }
    }

    /// Drop `face` from every entry, erasing entries left empty. Returns the
    /// prefixes of erased entries. Runs when a face is removed.
    pub fn remove_face_everywhere(&mut self, tree: &mut NameTree, face: FaceId) -> Vec<Name> {
        let mut erased = Vec::new();
        for (prefix, entry) in self.entries.iter_mut() {
            entry.next_hops.retain(|nh| nh.face != face);
            if entry.next_hops.is_empty() {
                erased.push(prefix.clone());
            }
        }
        for prefix in &erased {
            self.erase(tree, prefix);
        }
        erased
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F1: FaceId = FaceId(300);
    const F2: FaceId = FaceId(301);

    #[test]
    fn test_longest_prefix_match() {
        let mut tree = NameTree::new();
        let mut fib = Fib::new();

        fib.add_or_update_next_hop(&mut tree, &Name::from_uri("/a"), F1, 10);
        fib.add_or_update_next_hop(&mut tree, &Name::from_uri("/a/b"), F2, 10);

        let hit = fib
            .find_longest_prefix_match(&Name::from_uri("/a/b/c"))
            .unwrap();
        assert_eq!(hit.prefix(), &Name::from_uri("/a/b"));

        let hit = fib.find_longest_prefix_match(&Name::from_uri("/a/x")).unwrap();
        assert_eq!(hit.prefix(), &Name::from_uri("/a"));

        assert!(fib.find_longest_prefix_match(&Name::from_uri("/z")).is_none());
    }

    #[test]
    fn test_next_hops_sorted_and_deduplicated() {
        let mut tree = NameTree::new();
        let mut fib = Fib::new();
        let prefix = Name::from_uri("/a");

        assert!(fib.add_or_update_next_hop(&mut tree, &prefix, F1, 20));
        assert!(fib.add_or_update_next_hop(&mut tree, &prefix, F2, 10));
        // cost update, not a new next hop
        assert!(!fib.add_or_update_next_hop(&mut tree, &prefix, F1, 5));

        let entry = fib.find_exact(&prefix).unwrap();
        assert_eq!(entry.next_hops().len(), 2);
        assert_eq!(entry.next_hops()[0], NextHop { face: F1, cost: 5 });
        assert_eq!(entry.next_hops()[1], NextHop { face: F2, cost: 10 });
    }

    #[test]
    fn test_remove_next_hop_erases_empty_entry() {
        let mut tree = NameTree::new();
        let mut fib = Fib::new();
        let prefix = Name::from_uri("/a/b");

        fib.add_or_update_next_hop(&mut tree, &prefix, F1, 1);
        assert!(tree.get(&prefix).unwrap().has_fib_entry());

        assert!(fib.remove_next_hop(&mut tree, &prefix, F1));
        assert!(fib.find_exact(&prefix).is_none());
        assert!(tree.get(&prefix).is_none());
    }

    #[test]
    fn test_remove_face_everywhere() {
        let mut tree = NameTree::new();
        let mut fib = Fib::new();

        fib.add_or_update_next_hop(&mut tree, &Name::from_uri("/a"), F1, 1);
        fib.add_or_update_next_hop(&mut tree, &Name::from_uri("/a"), F2, 2);
        fib.add_or_update_next_hop(&mut tree, &Name::from_uri("/b"), F1, 1);

        let erased = fib.remove_face_everywhere(&mut tree, F1);
        assert_eq!(erased, vec![Name::from_uri("/b")]);
        assert_eq!(fib.len(), 1);
        let entry = fib.find_exact(&Name::from_uri("/a")).unwrap();
        assert_eq!(entry.next_hops(), &[NextHop { face: F2, cost: 2 }]);
    }
}
