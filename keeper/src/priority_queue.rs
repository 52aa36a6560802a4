//! Priority queue of positions by ICR (min-heap: riskiest first)

use crate::health::PositionHealth;
use ballast_core::AccountId;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;

pub struct HealthQueue {
    /// Priority queue (using Reverse for min-heap)
    queue: PriorityQueue<AccountId, Reverse<u128>>,
    /// Map for O(1) lookups
    map: HashMap<AccountId, PositionHealth>,
}

impl HealthQueue {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            map: HashMap::new(),
        }
    }

    /// Push or update a position
    pub fn push(&mut self, health: PositionHealth) {
        let id = health.id;
        self.queue.push(id, Reverse(health.icr));
        self.map.insert(id, health);
    }

    /// Pop the position with the lowest ICR
    pub fn pop(&mut self) -> Option<PositionHealth> {
        let (id, _priority) = self.queue.pop()?;
        self.map.remove(&id)
    }

    pub fn peek(&self) -> Option<&PositionHealth> {
        let (id, _priority) = self.queue.peek()?;
        self.map.get(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Pop positions from the riskiest up while `pred` holds
    pub fn take_while<F>(&mut self, mut pred: F) -> Vec<PositionHealth>
    where
        F: FnMut(&PositionHealth) -> bool,
    {
        let mut taken = Vec::new();
        while let Some(next) = self.peek() {
            if !pred(next) {
                break;
            }
            if let Some(health) = self.pop() {
                taken.push(health);
            }
        }
        taken
    }
}

impl Default for HealthQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballast_core::math::{percent, wad};

    fn make_health(id: u64, icr_percent: u128) -> PositionHealth {
        PositionHealth {
            id: AccountId(id),
            icr: percent(icr_percent),
            coll: wad(10),
            debt: wad(2000),
        }
    }

    #[test]
    fn test_queue_push_pop() {
        let mut queue = HealthQueue::new();
        queue.push(make_health(1, 105));
        queue.push(make_health(2, 180));
        queue.push(make_health(3, 95));
        assert_eq!(queue.len(), 3);

        // Lowest ICR first
        assert_eq!(queue.pop().unwrap().id, AccountId(3));
        assert_eq!(queue.pop().unwrap().id, AccountId(1));
    }

    #[test]
    fn test_push_updates_priority() {
        let mut queue = HealthQueue::new();
        queue.push(make_health(1, 120));
        queue.push(make_health(2, 130));
        queue.push(make_health(2, 90));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek().unwrap().id, AccountId(2));
        assert_eq!(queue.peek().unwrap().icr, percent(90));
    }

    #[test]
    fn test_take_while_stops_at_first_failure() {
        let mut queue = HealthQueue::new();
        for (id, icr) in [(1, 100), (2, 108), (3, 112), (4, 101)] {
            queue.push(make_health(id, icr));
        }
        let taken = queue.take_while(|h| h.icr < percent(110));
        let ids: Vec<_> = taken.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![AccountId(1), AccountId(4), AccountId(2)]);
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_empty());
    }
}
