//! Entry storage: ordered, reference-indexed collection of entries.
//!
//! A doubly linked list whose links are references rather than pointers, with
//! the nodes themselves living in a hash map keyed by the same references.
//! Every positional operation (insert before/after an anchor, remove, lookup)
//! is O(1); iteration walks the links from the head.
//!
//! # Ordering
//!
//! Containers keep two regions: foreign mirrors first, grouped into one
//! contiguous run per owner, then native entries in their original relative
//! order. Storage itself does not enforce this; [`EntryStorage::bounds_for_owner`]
//! and [`EntryStorage::first_native`] give callers the anchors they need to
//! keep it.

use std::collections::HashMap;

use chartstate_types::{ContainerId, Entry, Reference};

use crate::{EngineError, Result};

#[derive(Debug, Clone)]
struct Node {
    entry: Entry,
    prev: Option<Reference>,
    next: Option<Reference>,
}

/// An entry detached from storage, with the neighbours it had.
///
/// The neighbours let a reversible remove put the entry back exactly where it
/// was.
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    pub entry: Entry,
    pub prev: Option<Reference>,
    pub next: Option<Reference>,
}

/// First and last reference of a run of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerBounds {
    pub first: Option<Reference>,
    pub last: Option<Reference>,
}

/// Ordered, hash-indexed entry collection.
#[derive(Debug, Clone, Default)]
pub struct EntryStorage {
    nodes: HashMap<Reference, Node>,
    head: Option<Reference>,
    tail: Option<Reference>,
}

impl EntryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has(&self, reference: &Reference) -> bool {
        self.nodes.contains_key(reference)
    }

    pub fn get(&self, reference: &Reference) -> Result<&Entry> {
        self.nodes
            .get(reference)
            .map(|node| &node.entry)
            .ok_or_else(|| EngineError::ReferenceNotFound(reference.clone()))
    }

    /// Mutable access to an entry.
    ///
    /// The entry's `reference` is the storage key; callers must not change it.
    pub(crate) fn get_mut(&mut self, reference: &Reference) -> Result<&mut Entry> {
        self.nodes
            .get_mut(reference)
            .map(|node| &mut node.entry)
            .ok_or_else(|| EngineError::ReferenceNotFound(reference.clone()))
    }

    pub fn first(&self) -> Option<&Entry> {
        self.head.as_ref().and_then(|r| self.nodes.get(r)).map(|n| &n.entry)
    }

    pub fn last(&self) -> Option<&Entry> {
        self.tail.as_ref().and_then(|r| self.nodes.get(r)).map(|n| &n.entry)
    }

    /// Reference following `reference`, if any.
    pub fn next_of(&self, reference: &Reference) -> Result<Option<&Reference>> {
        self.nodes
            .get(reference)
            .map(|node| node.next.as_ref())
            .ok_or_else(|| EngineError::ReferenceNotFound(reference.clone()))
    }

    /// Reference preceding `reference`, if any.
    pub fn prev_of(&self, reference: &Reference) -> Result<Option<&Reference>> {
        self.nodes
            .get(reference)
            .map(|node| node.prev.as_ref())
            .ok_or_else(|| EngineError::ReferenceNotFound(reference.clone()))
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            storage: self,
            cursor: self.head.as_ref(),
        }
    }

    /// References in storage order.
    pub fn references(&self) -> Vec<Reference> {
        self.iter().map(|e| e.reference.clone()).collect()
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Append at the tail.
    pub fn push(&mut self, entry: Entry) -> Result<()> {
        self.ensure_absent(&entry.reference)?;
        let prev = self.tail.clone();
        self.link(entry, prev, None);
        Ok(())
    }

    /// Insert before the current head (or push when empty).
    pub fn unshift(&mut self, entry: Entry) -> Result<()> {
        self.ensure_absent(&entry.reference)?;
        let next = self.head.clone();
        self.link(entry, None, next);
        Ok(())
    }

    pub fn insert_before(&mut self, target: &Reference, entry: Entry) -> Result<()> {
        let prev = self
            .nodes
            .get(target)
            .map(|n| n.prev.clone())
            .ok_or_else(|| EngineError::ReferenceNotFound(target.clone()))?;
        self.ensure_absent(&entry.reference)?;
        self.link(entry, prev, Some(target.clone()));
        Ok(())
    }

    pub fn insert_after(&mut self, target: &Reference, entry: Entry) -> Result<()> {
        let next = self
            .nodes
            .get(target)
            .map(|n| n.next.clone())
            .ok_or_else(|| EngineError::ReferenceNotFound(target.clone()))?;
        self.ensure_absent(&entry.reference)?;
        self.link(entry, Some(target.clone()), next);
        Ok(())
    }

    fn ensure_absent(&self, reference: &Reference) -> Result<()> {
        if self.nodes.contains_key(reference) {
            return Err(EngineError::DuplicateReference(reference.clone()));
        }
        Ok(())
    }

    /// Splice `entry` between `prev` and `next`, which must be adjacent.
    fn link(&mut self, entry: Entry, prev: Option<Reference>, next: Option<Reference>) {
        let key = entry.reference.clone();

        match &prev {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(p) {
                    node.next = Some(key.clone());
                }
            }
            None => self.head = Some(key.clone()),
        }
        match &next {
            Some(n) => {
                if let Some(node) = self.nodes.get_mut(n) {
                    node.prev = Some(key.clone());
                }
            }
            None => self.tail = Some(key.clone()),
        }

        self.nodes.insert(key, Node { entry, prev, next });
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Detach an entry, returning it with its former neighbours.
    pub fn remove(&mut self, reference: &Reference) -> Result<Removed> {
        let node = self
            .nodes
            .remove(reference)
            .ok_or_else(|| EngineError::ReferenceNotFound(reference.clone()))?;

        match &node.prev {
            Some(p) => {
                if let Some(prev) = self.nodes.get_mut(p) {
                    prev.next = node.next.clone();
                }
            }
            None => self.head = node.next.clone(),
        }
        match &node.next {
            Some(n) => {
                if let Some(next) = self.nodes.get_mut(n) {
                    next.prev = node.prev.clone();
                }
            }
            None => self.tail = node.prev.clone(),
        }

        Ok(Removed {
            entry: node.entry,
            prev: node.prev,
            next: node.next,
        })
    }

    /// Remove and return the tail entry.
    pub fn pop(&mut self) -> Option<Entry> {
        let tail = self.tail.clone()?;
        self.remove(&tail).ok().map(|r| r.entry)
    }

    /// Remove and return the head entry.
    pub fn shift(&mut self) -> Option<Entry> {
        let head = self.head.clone()?;
        self.remove(&head).ok().map(|r| r.entry)
    }

    /// Remove every entry matching `predicate`, returning them in storage order.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&Entry) -> bool) -> Vec<Entry> {
        let doomed: Vec<Reference> = self
            .iter()
            .filter(|&e| predicate(e))
            .map(|e| e.reference.clone())
            .collect();

        doomed
            .iter()
            .filter_map(|r| self.remove(r).ok())
            .map(|r| r.entry)
            .collect()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    // =========================================================================
    // Region anchors
    // =========================================================================

    /// Where the entries related to `reference`'s owner sit.
    ///
    /// For a native reference: the head of the foreign region (if the list
    /// starts with a mirror) and the tail. For a foreign reference: scans the
    /// leading foreign region and returns the first and last reference with
    /// the same owner, so a new mirror can join that owner's run.
    pub fn bounds_for_owner(&self, reference: &Reference) -> OwnerBounds {
        match reference.owner() {
            None => OwnerBounds {
                first: self.head.clone().filter(Reference::is_foreign),
                last: self.tail.clone(),
            },
            Some(owner) => self.owner_run(owner),
        }
    }

    fn owner_run(&self, owner: &ContainerId) -> OwnerBounds {
        let mut bounds = OwnerBounds::default();
        for entry in self.iter().take_while(|e| e.reference.is_foreign()) {
            if entry.reference.is_owned_by(owner) {
                if bounds.first.is_none() {
                    bounds.first = Some(entry.reference.clone());
                }
                bounds.last = Some(entry.reference.clone());
            }
        }
        bounds
    }

    /// First native reference, i.e. the end of the foreign region.
    pub fn first_native(&self) -> Option<&Reference> {
        self.iter()
            .map(|e| &e.reference)
            .find(|r| r.is_native())
    }

    /// Insert next to whichever of `prev` / `next` is still present and in
    /// the same region as `entry`, preferring `prev`. With neither usable the
    /// entry goes to the end of its region.
    pub fn insert_near(
        &mut self,
        entry: Entry,
        prev: Option<&Reference>,
        next: Option<&Reference>,
    ) -> Result<()> {
        let key = entry.reference.clone();
        let usable = |r: &Reference| self.has(r) && same_region(r, &key);
        let prev = prev.filter(|&r| usable(r)).cloned();
        let next = next.filter(|&r| usable(r)).cloned();

        match (prev, next) {
            (Some(p), _) => self.insert_after(&p, entry),
            (None, Some(n)) => self.insert_before(&n, entry),
            (None, None) => self.insert_in_region(entry),
        }
    }

    /// Append at the end of the entry's region.
    ///
    /// Native entries go to the tail. Foreign entries join the end of their
    /// owner's run, or start a new run at the end of the foreign region.
    pub fn insert_in_region(&mut self, entry: Entry) -> Result<()> {
        if entry.reference.is_native() {
            return self.push(entry);
        }
        if let Some(last) = self.bounds_for_owner(&entry.reference).last {
            return self.insert_after(&last, entry);
        }
        match self.first_native().cloned() {
            Some(first) => self.insert_before(&first, entry),
            None => self.push(entry),
        }
    }
}

/// Both native, or both foreign with the same owner.
fn same_region(a: &Reference, b: &Reference) -> bool {
    a.owner() == b.owner()
}

/// Iterator over entries in storage order.
pub struct Iter<'a> {
    storage: &'a EntryStorage,
    cursor: Option<&'a Reference>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.storage.nodes.get(self.cursor?)?;
        self.cursor = node.next.as_ref();
        Some(&node.entry)
    }
}

impl<'a> IntoIterator for &'a EntryStorage {
    type Item = &'a Entry;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartstate_types::EntryOptions;

    fn entry(reference: Reference) -> Entry {
        Entry::new(reference, "line", EntryOptions::new())
    }

    fn native(id: &str) -> Entry {
        entry(Reference::native(id))
    }

    fn keys(storage: &EntryStorage) -> Vec<String> {
        storage.iter().map(|e| e.reference.to_string()).collect()
    }

    #[test]
    fn test_push_pop_unshift_shift() {
        let mut storage = EntryStorage::new();
        storage.push(native("b")).unwrap();
        storage.push(native("c")).unwrap();
        storage.unshift(native("a")).unwrap();
        assert_eq!(keys(&storage), ["a", "b", "c"]);

        assert_eq!(storage.pop().unwrap().reference, Reference::native("c"));
        assert_eq!(storage.shift().unwrap().reference, Reference::native("a"));
        assert_eq!(keys(&storage), ["b"]);
        assert_eq!(storage.first().unwrap().reference, Reference::native("b"));
        assert_eq!(storage.last().unwrap().reference, Reference::native("b"));
    }

    #[test]
    fn test_unshift_into_empty() {
        let mut storage = EntryStorage::new();
        storage.unshift(native("a")).unwrap();
        assert_eq!(keys(&storage), ["a"]);
        assert!(storage.pop().is_some());
        assert!(storage.pop().is_none());
        assert!(storage.shift().is_none());
    }

    #[test]
    fn test_insert_relative() {
        let mut storage = EntryStorage::new();
        storage.push(native("a")).unwrap();
        storage.push(native("d")).unwrap();

        storage.insert_after(&Reference::native("a"), native("b")).unwrap();
        storage.insert_before(&Reference::native("d"), native("c")).unwrap();
        storage.insert_before(&Reference::native("a"), native("_")).unwrap();
        storage.insert_after(&Reference::native("d"), native("e")).unwrap();

        assert_eq!(keys(&storage), ["_", "a", "b", "c", "d", "e"]);
        assert_eq!(storage.last().unwrap().reference, Reference::native("e"));
    }

    #[test]
    fn test_insert_errors() {
        let mut storage = EntryStorage::new();
        storage.push(native("a")).unwrap();

        let missing = storage.insert_after(&Reference::native("zz"), native("b"));
        assert!(matches!(missing, Err(EngineError::ReferenceNotFound(_))));

        let dup = storage.insert_after(&Reference::native("a"), native("a"));
        assert!(matches!(dup, Err(EngineError::DuplicateReference(_))));

        assert!(matches!(storage.push(native("a")), Err(EngineError::DuplicateReference(_))));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_remove_reports_neighbours() {
        let mut storage = EntryStorage::new();
        for id in ["a", "b", "c"] {
            storage.push(native(id)).unwrap();
        }

        let removed = storage.remove(&Reference::native("b")).unwrap();
        assert_eq!(removed.prev, Some(Reference::native("a")));
        assert_eq!(removed.next, Some(Reference::native("c")));
        assert_eq!(keys(&storage), ["a", "c"]);

        let head = storage.remove(&Reference::native("a")).unwrap();
        assert_eq!(head.prev, None);
        assert_eq!(head.next, Some(Reference::native("c")));

        assert!(matches!(
            storage.remove(&Reference::native("a")),
            Err(EngineError::ReferenceNotFound(_))
        ));
    }

    #[test]
    fn test_remove_then_reinsert_restores_order() {
        let mut storage = EntryStorage::new();
        for id in ["a", "b", "c", "d"] {
            storage.push(native(id)).unwrap();
        }

        let removed = storage.remove(&Reference::native("c")).unwrap();
        let prev = removed.prev.clone().unwrap();
        storage.insert_after(&prev, removed.entry).unwrap();

        assert_eq!(keys(&storage), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_get_and_has() {
        let mut storage = EntryStorage::new();
        storage.push(native("a")).unwrap();
        assert!(storage.has(&Reference::native("a")));
        assert!(!storage.has(&Reference::foreign("ds1", "a")));
        assert!(storage.get(&Reference::native("a")).is_ok());
        assert!(matches!(
            storage.get(&Reference::native("b")),
            Err(EngineError::ReferenceNotFound(_))
        ));
    }

    #[test]
    fn test_bounds_for_owner() {
        let mut storage = EntryStorage::new();
        storage.push(entry(Reference::foreign("ds2", "x0"))).unwrap();
        storage.push(entry(Reference::foreign("ds2", "x1"))).unwrap();
        storage.push(entry(Reference::foreign("ds3", "y0"))).unwrap();
        storage.push(native("e0")).unwrap();
        storage.push(native("e1")).unwrap();

        let ds2 = storage.bounds_for_owner(&Reference::foreign("ds2", "new"));
        assert_eq!(ds2.first, Some(Reference::foreign("ds2", "x0")));
        assert_eq!(ds2.last, Some(Reference::foreign("ds2", "x1")));

        let ds4 = storage.bounds_for_owner(&Reference::foreign("ds4", "z"));
        assert_eq!(ds4, OwnerBounds::default());

        let native_bounds = storage.bounds_for_owner(&Reference::native("e9"));
        assert_eq!(native_bounds.first, Some(Reference::foreign("ds2", "x0")));
        assert_eq!(native_bounds.last, Some(Reference::native("e1")));

        assert_eq!(storage.first_native(), Some(&Reference::native("e0")));
    }

    #[test]
    fn test_remove_where() {
        let mut storage = EntryStorage::new();
        storage.push(entry(Reference::foreign("ds2", "x0"))).unwrap();
        storage.push(native("e0")).unwrap();
        storage.push(entry(Reference::foreign("ds2", "x1"))).unwrap();

        let owner = ContainerId::from("ds2");
        let removed = storage.remove_where(|e| e.reference.is_owned_by(&owner));
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].reference, Reference::foreign("ds2", "x0"));
        assert_eq!(keys(&storage), ["e0"]);
    }

    #[test]
    fn test_insert_near_prefers_same_region_anchor() {
        let mut storage = EntryStorage::new();
        storage.push(entry(Reference::foreign("ds2", "x0"))).unwrap();
        storage.push(native("a")).unwrap();
        storage.push(native("c")).unwrap();

        // A foreign `prev` is not a valid anchor for a native entry.
        storage
            .insert_near(
                native("b"),
                Some(&Reference::foreign("ds2", "x0")),
                Some(&Reference::native("c")),
            )
            .unwrap();
        assert_eq!(keys(&storage), ["[ds2,x0]", "a", "b", "c"]);

        // Missing anchors fall back to the end of the region.
        storage
            .insert_near(native("d"), Some(&Reference::native("gone")), None)
            .unwrap();
        assert_eq!(keys(&storage).last().unwrap(), "d");
    }

    #[test]
    fn test_insert_in_region_keeps_owner_runs() {
        let mut storage = EntryStorage::new();
        storage.push(native("e0")).unwrap();
        storage
            .insert_in_region(entry(Reference::foreign("ds2", "x0")))
            .unwrap();
        storage
            .insert_in_region(entry(Reference::foreign("ds3", "y0")))
            .unwrap();
        storage
            .insert_in_region(entry(Reference::foreign("ds2", "x1")))
            .unwrap();
        storage.insert_in_region(native("e1")).unwrap();

        assert_eq!(
            keys(&storage),
            ["[ds2,x0]", "[ds2,x1]", "[ds3,y0]", "e0", "e1"]
        );
    }

    #[test]
    fn test_neighbour_queries() {
        let mut storage = EntryStorage::new();
        storage.push(native("a")).unwrap();
        storage.push(native("b")).unwrap();

        assert_eq!(storage.next_of(&Reference::native("a")).unwrap(), Some(&Reference::native("b")));
        assert_eq!(storage.prev_of(&Reference::native("a")).unwrap(), None);
        assert!(storage.next_of(&Reference::native("zz")).is_err());
    }
}
