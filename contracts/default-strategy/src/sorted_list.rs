//! Sorted Group List
//!
//! Doubly linked list of groups ordered by a `u128` key, greatest at the
//! head. Inserts and updates take the new neighbours as hints and verify
//! them with a few O(log n) map lookups instead of searching. `reposition`
//! finds the neighbours itself with a linear walk; traversals are O(n).

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use stcelo_common::{
    errors::{StCeloError, StCeloResult},
    types::{Address, SortHints},
    BTreeMap, Vec,
};

/// One node of the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct GroupEntry {
    /// Sort key
    pub value: u128,
    /// Neighbour with the smaller key (towards the tail)
    pub lesser: Option<Address>,
    /// Neighbour with the greater key (towards the head)
    pub greater: Option<Address>,
}

/// Groups sorted by descending key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SortedGroupList {
    nodes: BTreeMap<Address, GroupEntry>,
    /// Greatest key
    head: Option<Address>,
    /// Smallest key
    tail: Option<Address>,
}

impl SortedGroupList {
    /// Create a new empty sorted list
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &Address) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn value_of(&self, key: &Address) -> Option<u128> {
        self.nodes.get(key).map(|n| n.value)
    }

    pub fn head(&self) -> Option<Address> {
        self.head
    }

    pub fn tail(&self) -> Option<Address> {
        self.tail
    }

    /// Neighbour of `key` with the next smaller key
    pub fn lesser_of(&self, key: &Address) -> Option<Address> {
        self.nodes.get(key).and_then(|n| n.lesser)
    }

    /// Neighbour of `key` with the next greater key
    pub fn greater_of(&self, key: &Address) -> Option<Address> {
        self.nodes.get(key).and_then(|n| n.greater)
    }

    /// `(key, value)` pairs from head to tail
    pub fn entries(&self) -> Vec<(Address, u128)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.head;
        while let Some(key) = cursor {
            match self.nodes.get(&key) {
                Some(node) => {
                    out.push((key, node.value));
                    cursor = node.lesser;
                }
                None => break,
            }
        }
        out
    }

    /// Keys from head to tail
    pub fn keys(&self) -> Vec<Address> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }

    // ============ Mutation ============

    /// Insert `key` with `value` between the hinted neighbours.
    ///
    /// # Errors
    /// - `GroupAlreadyAdded` if `key` is present
    /// - `InvalidSortHints` if the hints are not the neighbours of `value`
    pub fn insert(&mut self, key: Address, value: u128, hints: SortHints) -> StCeloResult<()> {
        if self.contains(&key) {
            return Err(StCeloError::GroupAlreadyAdded { group: key });
        }
        if !self.is_valid_position(value, &hints) {
            return Err(StCeloError::InvalidSortHints { key });
        }
        self.link(key, value, hints.lesser, hints.greater);
        Ok(())
    }

    /// Remove `key`, returning its value
    pub fn remove(&mut self, key: &Address) -> StCeloResult<u128> {
        let node = self.unlink(key).ok_or(StCeloError::GroupNotActive { group: *key })?;
        Ok(node.value)
    }

    /// Change the value of `key` and move it between the hinted neighbours.
    /// On invalid hints the list is left unchanged.
    pub fn update(&mut self, key: Address, value: u128, hints: SortHints) -> StCeloResult<()> {
        let old = self.unlink(&key).ok_or(StCeloError::GroupNotActive { group: key })?;
        if !self.is_valid_position(value, &hints) {
            self.link(key, old.value, old.lesser, old.greater);
            return Err(StCeloError::InvalidSortHints { key });
        }
        self.link(key, value, hints.lesser, hints.greater);
        Ok(())
    }

    /// Change the value of `key`, computing the neighbours itself
    pub fn reposition(&mut self, key: Address, value: u128) -> StCeloResult<()> {
        let hints = self.find_lesser_and_greater(value, Some(&key));
        self.update(key, value, hints)
    }

    /// Neighbours a key with `value` would get, ignoring `exclude`.
    /// Equal keys stay ahead of the new position.
    pub fn find_lesser_and_greater(&self, value: u128, exclude: Option<&Address>) -> SortHints {
        let mut greater = None;
        let mut cursor = self.head;
        while let Some(key) = cursor {
            let Some(node) = self.nodes.get(&key) else { break };
            cursor = node.lesser;
            if Some(&key) == exclude {
                continue;
            }
            if node.value < value {
                return SortHints { lesser: Some(key), greater };
            }
            greater = Some(key);
        }
        SortHints { lesser: None, greater }
    }

    // ============ Internals ============

    fn is_valid_position(&self, value: u128, hints: &SortHints) -> bool {
        match (hints.lesser, hints.greater) {
            (None, None) => self.is_empty(),
            (None, Some(g)) => {
                self.tail == Some(g) && self.value_of(&g).map(|v| v >= value).unwrap_or(false)
            }
            (Some(l), None) => {
                self.head == Some(l) && self.value_of(&l).map(|v| v <= value).unwrap_or(false)
            }
            (Some(l), Some(g)) => match (self.nodes.get(&l), self.nodes.get(&g)) {
                (Some(ln), Some(gn)) => ln.greater == Some(g) && ln.value <= value && value <= gn.value,
                _ => false,
            },
        }
    }

    fn link(&mut self, key: Address, value: u128, lesser: Option<Address>, greater: Option<Address>) {
        match lesser {
            Some(l) => {
                if let Some(node) = self.nodes.get_mut(&l) {
                    node.greater = Some(key);
                }
            }
            None => self.tail = Some(key),
        }
        match greater {
            Some(g) => {
                if let Some(node) = self.nodes.get_mut(&g) {
                    node.lesser = Some(key);
                }
            }
            None => self.head = Some(key),
        }
        self.nodes.insert(key, GroupEntry { value, lesser, greater });
    }

    fn unlink(&mut self, key: &Address) -> Option<GroupEntry> {
        let node = self.nodes.remove(key)?;
        match node.lesser {
            Some(l) => {
                if let Some(n) = self.nodes.get_mut(&l) {
                    n.greater = node.greater;
                }
            }
            None => self.tail = node.greater,
        }
        match node.greater {
            Some(g) => {
                if let Some(n) = self.nodes.get_mut(&g) {
                    n.lesser = node.lesser;
                }
            }
            None => self.head = node.lesser,
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Address = [1u8; 20];
    const B: Address = [2u8; 20];
    const C: Address = [3u8; 20];
    const D: Address = [4u8; 20];

    fn build() -> SortedGroupList {
        // head C(30) -> B(20) -> A(10) tail
        let mut list = SortedGroupList::new();
        list.insert(A, 10, SortHints::new(None, None)).unwrap();
        list.insert(B, 20, SortHints::new(Some(A), None)).unwrap();
        list.insert(C, 30, SortHints::new(Some(B), None)).unwrap();
        list
    }

    #[test]
    fn test_sorted_list_order() {
        let list = build();
        assert_eq!(list.keys(), vec![C, B, A]);
        assert_eq!(list.head(), Some(C));
        assert_eq!(list.tail(), Some(A));
        assert_eq!(list.lesser_of(&B), Some(A));
        assert_eq!(list.greater_of(&B), Some(C));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_insert_middle_and_tail() {
        let mut list = build();
        list.insert(D, 15, SortHints::new(Some(A), Some(B))).unwrap();
        assert_eq!(list.keys(), vec![C, B, D, A]);

        let mut list = build();
        list.insert(D, 5, SortHints::new(None, Some(A))).unwrap();
        assert_eq!(list.tail(), Some(D));
    }

    #[test]
    fn test_invalid_hints_rejected() {
        let mut list = build();
        // Wrong order
        assert_eq!(
            list.insert(D, 25, SortHints::new(Some(A), Some(B))),
            Err(StCeloError::InvalidSortHints { key: D })
        );
        // Not adjacent
        assert!(list.insert(D, 15, SortHints::new(Some(A), Some(C))).is_err());
        // Claims head but is not
        assert!(list.insert(D, 40, SortHints::new(Some(B), None)).is_err());
        // Empty hints on a non-empty list
        assert!(list.insert(D, 40, SortHints::default()).is_err());
        assert_eq!(list.len(), 3);

        assert_eq!(
            list.insert(A, 1, SortHints::default()),
            Err(StCeloError::GroupAlreadyAdded { group: A })
        );
    }

    #[test]
    fn test_update_moves_and_restores() {
        let mut list = build();
        list.update(A, 35, SortHints::new(Some(C), None)).unwrap();
        assert_eq!(list.keys(), vec![A, C, B]);

        // Bad hints leave the list as it was
        assert!(list.update(B, 50, SortHints::new(Some(C), None)).is_err());
        assert_eq!(list.keys(), vec![A, C, B]);
        assert_eq!(list.value_of(&B), Some(20));
    }

    #[test]
    fn test_reposition_and_remove() {
        let mut list = build();
        list.reposition(C, 0).unwrap();
        assert_eq!(list.keys(), vec![B, A, C]);

        assert_eq!(list.remove(&A).unwrap(), 10);
        assert_eq!(list.keys(), vec![B, C]);
        assert_eq!(list.lesser_of(&B), Some(C));
        assert_eq!(list.remove(&A), Err(StCeloError::GroupNotActive { group: A }));

        list.remove(&B).unwrap();
        list.remove(&C).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.head(), None);
        assert_eq!(list.tail(), None);
    }

    #[test]
    fn test_find_lesser_and_greater_ties() {
        let list = build();
        // Equal to B: goes after B
        assert_eq!(list.find_lesser_and_greater(20, None), SortHints::new(Some(A), Some(B)));
        assert_eq!(list.find_lesser_and_greater(100, None), SortHints::new(Some(C), None));
        assert_eq!(list.find_lesser_and_greater(0, None), SortHints::new(None, Some(A)));
        // Excluding B itself
        assert_eq!(list.find_lesser_and_greater(20, Some(&B)), SortHints::new(Some(A), Some(C)));
    }
}
