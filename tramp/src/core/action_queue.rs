//! Run-length encoded queue of scripted actions.
//!
//! Entries are `(action, count)` pairs consumed from the head. Adjacent entries
//! never share an action name unless the left one is full (`MAX_ENTRY_COUNT`),
//! in which case the right one holds the overflow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum count a single entry may hold before spilling into a new entry.
pub const MAX_ENTRY_COUNT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub action: String,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// `pop_next` on an empty queue.
    Empty,
    /// An index beyond the last entry was addressed.
    IndexOutOfRange { index: usize, len: usize },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Empty => write!(f, "action queue is empty"),
            QueueError::IndexOutOfRange { index, len } => {
                write!(f, "action index {index} out of range (queue has {len} entries)")
            }
        }
    }
}

impl std::error::Error for QueueError {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ActionEntry>", into = "Vec<ActionEntry>")]
pub struct ActionQueue {
    entries: Vec<ActionEntry>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of actions still to perform (sum of counts).
    pub fn remaining(&self) -> u64 {
        self.entries.iter().map(|entry| u64::from(entry.count)).sum()
    }

    /// Name of the action `pop_next` would return.
    pub fn peek(&self) -> Option<&str> {
        self.entries.first().map(|entry| entry.action.as_str())
    }

    /// Append `count` repetitions of `action`, merging into the last entry when
    /// it has the same name.
    pub fn add_action(&mut self, action: &str, count: u32) {
        if count == 0 {
            return;
        }
        match self.entries.last() {
            Some(last) if last.action == action => {
                let index = self.entries.len() - 1;
                let merged = last.count.saturating_add(count);
                self.apply_count(index, merged);
            }
            _ => {
                self.entries.push(ActionEntry {
                    action: action.to_string(),
                    count: 0,
                });
                let index = self.entries.len() - 1;
                self.apply_count(index, count);
            }
        }
    }

    /// Set the count of the entry at `index`.
    ///
    /// A zero count removes the entry. Counts above `MAX_ENTRY_COUNT` cap the
    /// entry and spill the remainder into the entry right after it.
    pub fn set_count(&mut self, index: usize, count: u32) -> Result<(), QueueError> {
        if index >= self.entries.len() {
            return Err(QueueError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.apply_count(index, count);
        Ok(())
    }

    /// Consume one repetition of the head entry and return its action name.
    pub fn pop_next(&mut self) -> Result<String, QueueError> {
        let head = self.entries.first().ok_or(QueueError::Empty)?;
        let action = head.action.clone();
        let count = head.count.saturating_sub(1);
        self.apply_count(0, count);
        Ok(action)
    }

    fn apply_count(&mut self, index: usize, count: u32) {
        if count == 0 {
            self.entries.remove(index);
            self.merge_neighbours(index);
            return;
        }
        let next = index + 1;
        let same_next = self
            .entries
            .get(next)
            .is_some_and(|entry| entry.action == self.entries[index].action);

        if count <= MAX_ENTRY_COUNT {
            self.entries[index].count = count;
            // A non-full entry absorbs the overflow entry that follows it.
            if same_next && count < MAX_ENTRY_COUNT {
                let absorbed = self.entries.remove(next);
                self.apply_count(index, count.saturating_add(absorbed.count));
            }
            return;
        }

        self.entries[index].count = MAX_ENTRY_COUNT;
        let remainder = count - MAX_ENTRY_COUNT;
        if same_next {
            let merged = self.entries[next].count.saturating_add(remainder);
            self.apply_count(next, merged);
        } else {
            let action = self.entries[index].action.clone();
            self.entries.insert(next, ActionEntry { action, count: 0 });
            self.apply_count(next, remainder);
        }
    }

    /// After removing the entry at `index`, the entries now at `index - 1` and
    /// `index` may share a name.
    fn merge_neighbours(&mut self, index: usize) {
        if index == 0 || index >= self.entries.len() {
            return;
        }
        let left = index - 1;
        if self.entries[left].action != self.entries[index].action {
            return;
        }
        let right = self.entries.remove(index);
        let merged = self.entries[left].count.saturating_add(right.count);
        self.apply_count(left, merged);
    }
}

impl From<Vec<ActionEntry>> for ActionQueue {
    fn from(entries: Vec<ActionEntry>) -> Self {
        let mut queue = ActionQueue::new();
        for entry in entries {
            queue.add_action(&entry.action, entry.count);
        }
        queue
    }
}

impl From<ActionQueue> for Vec<ActionEntry> {
    fn from(queue: ActionQueue) -> Self {
        queue.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(queue: &ActionQueue) -> Vec<(&str, u32)> {
        queue
            .entries()
            .iter()
            .map(|entry| (entry.action.as_str(), entry.count))
            .collect()
    }

    /// Adjacent entries may only repeat a name when the left one is full.
    fn assert_canonical(queue: &ActionQueue) {
        for pair in queue.entries().windows(2) {
            if pair[0].action == pair[1].action {
                assert_eq!(pair[0].count, MAX_ENTRY_COUNT, "queue {:?}", queue);
            }
        }
        assert!(queue.entries().iter().all(|entry| entry.count > 0));
    }

    #[test]
    fn adjacent_adds_of_same_action_merge() {
        let mut queue = ActionQueue::new();
        queue.add_action("spin", 5);
        queue.add_action("spin", 3);
        assert_eq!(pairs(&queue), vec![("spin", 8)]);
    }

    #[test]
    fn different_actions_stay_separate() {
        let mut queue = ActionQueue::new();
        queue.add_action("spin", 2);
        queue.add_action("bet_up", 1);
        queue.add_action("spin", 2);
        assert_eq!(pairs(&queue), vec![("spin", 2), ("bet_up", 1), ("spin", 2)]);
        assert_canonical(&queue);
    }

    #[test]
    fn overflow_spills_into_next_entry() {
        let mut queue = ActionQueue::new();
        queue.add_action("spin", MAX_ENTRY_COUNT + 50);
        assert_eq!(pairs(&queue), vec![("spin", MAX_ENTRY_COUNT), ("spin", 50)]);
        assert_eq!(queue.remaining(), u64::from(MAX_ENTRY_COUNT + 50));
    }

    #[test]
    fn large_overflow_caps_recursively() {
        let mut queue = ActionQueue::new();
        queue.add_action("spin", MAX_ENTRY_COUNT * 2 + 7);
        assert_eq!(
            pairs(&queue),
            vec![
                ("spin", MAX_ENTRY_COUNT),
                ("spin", MAX_ENTRY_COUNT),
                ("spin", 7)
            ]
        );
        assert_canonical(&queue);
    }

    #[test]
    fn pop_single_entry_empties_queue() {
        let mut queue = ActionQueue::new();
        queue.add_action("spin", 1);
        assert_eq!(queue.pop_next().expect("pop"), "spin");
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_empty_queue_errors() {
        let mut queue = ActionQueue::new();
        assert_eq!(queue.pop_next(), Err(QueueError::Empty));
    }

    #[test]
    fn set_count_zero_removes_and_merges_neighbours() {
        let mut queue = ActionQueue::new();
        queue.add_action("spin", 2);
        queue.add_action("bet_up", 1);
        queue.add_action("spin", 3);

        queue.set_count(1, 0).expect("set count");
        assert_eq!(pairs(&queue), vec![("spin", 5)]);
    }

    #[test]
    fn set_count_out_of_range_errors() {
        let mut queue = ActionQueue::new();
        queue.add_action("spin", 1);
        assert_eq!(
            queue.set_count(3, 1),
            Err(QueueError::IndexOutOfRange { index: 3, len: 1 })
        );
    }

    #[test]
    fn spill_into_existing_same_name_neighbour() {
        let mut queue = ActionQueue::new();
        queue.add_action("spin", MAX_ENTRY_COUNT + 10);
        queue.set_count(0, MAX_ENTRY_COUNT + 5).expect("set count");
        assert_eq!(pairs(&queue), vec![("spin", MAX_ENTRY_COUNT), ("spin", 15)]);
    }

    #[test]
    fn pop_from_full_head_rebalances_overflow() {
        let mut queue = ActionQueue::new();
        queue.add_action("spin", MAX_ENTRY_COUNT + 1);
        assert_eq!(queue.pop_next().expect("pop"), "spin");
        assert_eq!(pairs(&queue), vec![("spin", MAX_ENTRY_COUNT)]);
    }

    #[test]
    fn mixed_sequence_keeps_invariant() {
        let mut queue = ActionQueue::new();
        let script = [
            ("spin", 40),
            ("spin", 90),
            ("auto_spin", 3),
            ("spin", 1),
            ("spin", 250),
            ("bet_down", 2),
            ("bet_down", 0),
            ("auto_spin", 120),
        ];
        for (action, count) in script {
            queue.add_action(action, count);
            assert_canonical(&queue);
        }
        let expected: u64 = script.iter().map(|(_, count)| u64::from(*count)).sum();
        assert_eq!(queue.remaining(), expected);

        while !queue.is_empty() {
            queue.pop_next().expect("pop");
            assert_canonical(&queue);
        }
    }

    #[test]
    fn deserialize_restores_invariants() {
        let raw = r#"[{"action":"spin","count":3},{"action":"spin","count":4},{"action":"idle","count":0}]"#;
        let queue: ActionQueue = serde_json::from_str(raw).expect("parse");
        assert_eq!(pairs(&queue), vec![("spin", 7)]);
    }
}
