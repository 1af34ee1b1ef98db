use std::collections::{HashSet, VecDeque};

use wristlink_common::MessageId;

/// Bounded memory of recently seen message identifiers.
///
/// Once full, remembering a new identifier forgets the oldest one.
#[derive(Debug, Clone)]
pub(crate) struct RecentIds {
    capacity: usize,
    order: VecDeque<MessageId>,
    seen: HashSet<MessageId>,
}

impl RecentIds {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    pub(crate) fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// Remember `id`. Returns `false` if it was already remembered.
    pub(crate) fn insert(&mut self, id: MessageId) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id.clone());
        self.order.push_back(id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_repeats() {
        let mut ids = RecentIds::new(4);
        assert!(ids.insert(MessageId::from("a")));
        assert!(!ids.insert(MessageId::from("a")));
        assert!(ids.contains(&MessageId::from("a")));
    }

    #[test]
    fn test_oldest_is_forgotten_first() {
        let mut ids = RecentIds::new(2);
        ids.insert(MessageId::from("a"));
        ids.insert(MessageId::from("b"));
        ids.insert(MessageId::from("c"));
        assert!(!ids.contains(&MessageId::from("a")));
        assert!(ids.contains(&MessageId::from("b")));
        assert!(ids.contains(&MessageId::from("c")));
    }

    #[test]
    fn test_zero_capacity_still_remembers_one() {
        let mut ids = RecentIds::new(0);
        ids.insert(MessageId::from("a"));
        assert!(ids.contains(&MessageId::from("a")));
    }
}
