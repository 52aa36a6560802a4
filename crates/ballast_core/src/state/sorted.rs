//! Doubly linked list of active positions ordered by nominal collateral ratio
//!
//! Head is the best-collateralised position, tail the worst. The index stores
//! links only; ratios are read through a caller-supplied key function so they
//! always include pending redistribution rewards. Hints let the caller point at
//! the expected neighbours: a correct hint makes insertion O(1), a wrong or
//! stale one only costs a walk.
//!
//! Ties: an unhinted insert goes after every entry with the same ratio, so
//! among equals the earliest inserted sits closest to the head.

use crate::error::{EngineError, EngineResult};
use crate::state::position::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Node {
    prev: Option<AccountId>,
    next: Option<AccountId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedPositions {
    nodes: BTreeMap<AccountId, Node>,
    head: Option<AccountId>,
    tail: Option<AccountId>,
    max_size: usize,
}

impl SortedPositions {
    pub fn new(max_size: usize) -> Self {
        Self {
            nodes: BTreeMap::new(),
            head: None,
            tail: None,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.nodes.len() >= self.max_size
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Highest ratio
    pub fn best(&self) -> Option<AccountId> {
        self.head
    }

    /// Lowest ratio
    pub fn worst(&self) -> Option<AccountId> {
        self.tail
    }

    /// Neighbour on the worse (lower ratio) side
    pub fn next(&self, id: AccountId) -> Option<AccountId> {
        self.nodes.get(&id).and_then(|n| n.next)
    }

    /// Neighbour on the better (higher ratio) side
    pub fn prev(&self, id: AccountId) -> Option<AccountId> {
        self.nodes.get(&id).and_then(|n| n.prev)
    }

    /// Walk from the worst position towards the best
    pub fn iter_from_worst(&self) -> impl Iterator<Item = AccountId> + '_ {
        std::iter::successors(self.tail, move |id| self.prev(*id))
    }

    /// Walk from the best position towards the worst
    pub fn iter(&self) -> impl Iterator<Item = AccountId> + '_ {
        std::iter::successors(self.head, move |id| self.next(*id))
    }

    pub fn insert<F>(
        &mut self,
        id: AccountId,
        nicr: u128,
        prev_hint: Option<AccountId>,
        next_hint: Option<AccountId>,
        key: F,
    ) -> EngineResult<()>
    where
        F: Fn(AccountId) -> u128,
    {
        if self.is_full() {
            return Err(EngineError::IndexFull);
        }
        if self.contains(id) {
            return Err(EngineError::PositionAlreadyActive(id));
        }

        let (prev, next) = if self.valid_insert_position(nicr, prev_hint, next_hint, &key) {
            (prev_hint, next_hint)
        } else {
            self.find_insert_position(nicr, prev_hint, next_hint, &key)
        };

        self.link(id, prev, next);
        Ok(())
    }

    pub fn remove(&mut self, id: AccountId) -> EngineResult<()> {
        let node = self
            .nodes
            .remove(&id)
            .ok_or(EngineError::PositionNotActive(id))?;

        match node.prev {
            Some(p) => {
                if let Some(prev) = self.nodes.get_mut(&p) {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => {
                if let Some(next) = self.nodes.get_mut(&n) {
                    next.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        Ok(())
    }

    /// Move an existing entry after its ratio changed
    pub fn reinsert<F>(
        &mut self,
        id: AccountId,
        new_nicr: u128,
        prev_hint: Option<AccountId>,
        next_hint: Option<AccountId>,
        key: F,
    ) -> EngineResult<()>
    where
        F: Fn(AccountId) -> u128,
    {
        self.remove(id)?;
        self.insert(id, new_nicr, prev_hint, next_hint, key)
    }

    /// Whether `nicr` fits between `prev` and `next` as they stand
    pub fn valid_insert_position<F>(
        &self,
        nicr: u128,
        prev: Option<AccountId>,
        next: Option<AccountId>,
        key: &F,
    ) -> bool
    where
        F: Fn(AccountId) -> u128,
    {
        match (prev, next) {
            (None, None) => self.is_empty(),
            (None, Some(n)) => self.head == Some(n) && nicr >= key(n),
            (Some(p), None) => self.tail == Some(p) && nicr <= key(p),
            (Some(p), Some(n)) => {
                self.next(p) == Some(n) && key(p) >= nicr && nicr >= key(n)
            }
        }
    }

    /// Locate the neighbours for `nicr`, starting from whichever hint is still usable
    pub fn find_insert_position<F>(
        &self,
        nicr: u128,
        prev_hint: Option<AccountId>,
        next_hint: Option<AccountId>,
        key: &F,
    ) -> (Option<AccountId>, Option<AccountId>)
    where
        F: Fn(AccountId) -> u128,
    {
        // Drop hints that left the list or sit on the wrong side of nicr
        let prev = prev_hint.filter(|p| self.contains(*p) && nicr <= key(*p));
        let next = next_hint.filter(|n| self.contains(*n) && nicr > key(*n));

        match (prev, next) {
            (None, None) => match self.head {
                Some(head) => self.descend(nicr, head, key),
                None => (None, None),
            },
            (None, Some(n)) => self.ascend(nicr, n, key),
            (Some(p), _) => self.descend(nicr, p, key),
        }
    }

    /// Like `valid_insert_position` but only accepts the slot after every equal ratio
    fn fits_after_equals<F>(
        &self,
        nicr: u128,
        prev: Option<AccountId>,
        next: Option<AccountId>,
        key: &F,
    ) -> bool
    where
        F: Fn(AccountId) -> u128,
    {
        match (prev, next) {
            (None, None) => self.is_empty(),
            (None, Some(n)) => self.head == Some(n) && nicr > key(n),
            (Some(p), None) => self.tail == Some(p) && nicr <= key(p),
            (Some(p), Some(n)) => self.next(p) == Some(n) && key(p) >= nicr && nicr > key(n),
        }
    }

    fn descend<F>(&self, nicr: u128, start: AccountId, key: &F) -> (Option<AccountId>, Option<AccountId>)
    where
        F: Fn(AccountId) -> u128,
    {
        if self.head == Some(start) && nicr > key(start) {
            return (None, Some(start));
        }

        let mut prev = Some(start);
        let mut next = self.next(start);
        while let Some(p) = prev {
            if self.fits_after_equals(nicr, prev, next, key) {
                break;
            }
            prev = self.next(p);
            next = prev.and_then(|q| self.next(q));
        }
        (prev, next)
    }

    fn ascend<F>(&self, nicr: u128, start: AccountId, key: &F) -> (Option<AccountId>, Option<AccountId>)
    where
        F: Fn(AccountId) -> u128,
    {
        if self.tail == Some(start) && nicr <= key(start) {
            return (Some(start), None);
        }

        let mut next = Some(start);
        let mut prev = self.prev(start);
        while let Some(n) = next {
            if self.fits_after_equals(nicr, prev, next, key) {
                break;
            }
            next = self.prev(n);
            prev = next.and_then(|q| self.prev(q));
        }
        (prev, next)
    }

    fn link(&mut self, id: AccountId, prev: Option<AccountId>, next: Option<AccountId>) {
        self.nodes.insert(id, Node { prev, next });
        match prev {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(&p) {
                    node.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        match next {
            Some(n) => {
                if let Some(node) = self.nodes.get_mut(&n) {
                    node.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn keys(pairs: &[(u64, u128)]) -> HashMap<AccountId, u128> {
        pairs.iter().map(|(id, k)| (AccountId(*id), *k)).collect()
    }

    fn order(list: &SortedPositions) -> Vec<u64> {
        list.iter().map(|id| id.0).collect()
    }

    fn insert_all(list: &mut SortedPositions, ratios: &HashMap<AccountId, u128>, ids: &[u64]) {
        for id in ids {
            let id = AccountId(*id);
            list.insert(id, ratios[&id], None, None, |k| ratios[&k]).unwrap();
        }
    }

    #[test]
    fn test_insert_keeps_descending_order() {
        let ratios = keys(&[(1, 150), (2, 300), (3, 120), (4, 200), (5, 110)]);
        let mut list = SortedPositions::new(10);
        insert_all(&mut list, &ratios, &[1, 2, 3, 4, 5]);

        assert_eq!(order(&list), vec![2, 4, 1, 3, 5]);
        assert_eq!(list.best(), Some(AccountId(2)));
        assert_eq!(list.worst(), Some(AccountId(5)));
        let worst_first: Vec<u64> = list.iter_from_worst().map(|id| id.0).collect();
        assert_eq!(worst_first, vec![5, 3, 1, 4, 2]);
    }

    #[test]
    fn test_ties_follow_insertion_order() {
        let ratios = keys(&[(1, 150), (2, 150), (3, 150), (4, 200)]);
        let mut list = SortedPositions::new(10);
        insert_all(&mut list, &ratios, &[1, 2, 3, 4]);
        assert_eq!(order(&list), vec![4, 1, 2, 3]);
    }

    #[test]
    fn test_wrong_hints_still_sort_correctly() {
        let ratios = keys(&[(1, 100), (2, 200), (3, 300), (4, 400), (5, 250)]);
        let mut list = SortedPositions::new(10);
        insert_all(&mut list, &ratios, &[1, 2, 3, 4]);

        // Hints point at the wrong end of the list
        list.insert(AccountId(5), 250, Some(AccountId(1)), None, |k| ratios[&k])
            .unwrap();
        assert_eq!(order(&list), vec![4, 3, 5, 2, 1]);
    }

    #[test]
    fn test_exact_hints_are_used() {
        let ratios = keys(&[(1, 100), (2, 200), (3, 300), (4, 250)]);
        let mut list = SortedPositions::new(10);
        insert_all(&mut list, &ratios, &[1, 2, 3]);

        assert!(list.valid_insert_position(250, Some(AccountId(3)), Some(AccountId(2)), &|k| ratios[&k]));
        list.insert(AccountId(4), 250, Some(AccountId(3)), Some(AccountId(2)), |k| ratios[&k])
            .unwrap();
        assert_eq!(order(&list), vec![3, 4, 2, 1]);
    }

    #[test]
    fn test_next_hint_ascends() {
        let ratios = keys(&[(1, 100), (2, 200), (3, 300), (4, 400), (5, 350)]);
        let mut list = SortedPositions::new(10);
        insert_all(&mut list, &ratios, &[1, 2, 3, 4]);

        let pos = list.find_insert_position(350, None, Some(AccountId(1)), &|k| ratios[&k]);
        assert_eq!(pos, (Some(AccountId(4)), Some(AccountId(3))));
    }

    #[test]
    fn test_stale_hint_outside_list_is_ignored() {
        let ratios = keys(&[(1, 100), (2, 200), (9, 50), (3, 150)]);
        let mut list = SortedPositions::new(10);
        insert_all(&mut list, &ratios, &[1, 2]);

        list.insert(AccountId(3), 150, Some(AccountId(9)), Some(AccountId(9)), |k| ratios[&k])
            .unwrap();
        assert_eq!(order(&list), vec![2, 3, 1]);
    }

    #[test]
    fn test_remove_relinks_neighbours() {
        let ratios = keys(&[(1, 100), (2, 200), (3, 300)]);
        let mut list = SortedPositions::new(10);
        insert_all(&mut list, &ratios, &[1, 2, 3]);

        list.remove(AccountId(2)).unwrap();
        assert_eq!(order(&list), vec![3, 1]);
        assert_eq!(list.prev(AccountId(1)), Some(AccountId(3)));

        list.remove(AccountId(3)).unwrap();
        assert_eq!(list.best(), Some(AccountId(1)));
        list.remove(AccountId(1)).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.worst(), None);

        assert_eq!(list.remove(AccountId(1)), Err(EngineError::PositionNotActive(AccountId(1))));
    }

    #[test]
    fn test_reinsert_moves_entry() {
        let mut ratios = keys(&[(1, 100), (2, 200), (3, 300)]);
        let mut list = SortedPositions::new(10);
        insert_all(&mut list, &ratios, &[1, 2, 3]);

        ratios.insert(AccountId(1), 500);
        list.reinsert(AccountId(1), 500, None, None, |k| ratios[&k]).unwrap();
        assert_eq!(order(&list), vec![1, 3, 2]);
    }

    #[test]
    fn test_capacity_and_duplicates() {
        let ratios = keys(&[(1, 100), (2, 200)]);
        let mut list = SortedPositions::new(1);
        insert_all(&mut list, &ratios, &[1]);
        assert_eq!(
            list.insert(AccountId(2), 200, None, None, |k| ratios[&k]),
            Err(EngineError::IndexFull)
        );

        let mut list = SortedPositions::new(5);
        insert_all(&mut list, &ratios, &[1]);
        assert_eq!(
            list.insert(AccountId(1), 100, None, None, |k| ratios[&k]),
            Err(EngineError::PositionAlreadyActive(AccountId(1)))
        );
    }
}
