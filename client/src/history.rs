//! Bounded history of predicted (input, state) pairs.
//!
//! Entries are kept in ascending sequence order so lookups can binary search.
//! The buffer never grows past its capacity: pushing onto a full buffer
//! evicts the oldest pair.

use log::warn;
use shared::{EntityState, InputSample};
use std::collections::VecDeque;

/// One predicted tick. `input.sequence_number == state.sequence_number`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub input: InputSample,
    pub state: EntityState,
}

impl HistoryEntry {
    /// Pairs an input with the state predicted from it.
    pub fn new(input: InputSample, state: EntityState) -> Self {
        debug_assert_eq!(input.sequence_number, state.sequence_number);
        Self { input, state }
    }

    pub fn sequence_number(&self) -> u32 {
        self.input.sequence_number
    }
}

/// Predictions awaiting acknowledgement, oldest first, bounded by capacity.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Creates an empty buffer holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest ones while over capacity.
    ///
    /// Returns false (and stores nothing) if the entry is older than the
    /// newest one already recorded.
    pub fn push(&mut self, entry: HistoryEntry) -> bool {
        if let Some(newest) = self.newest_sequence() {
            if entry.sequence_number() < newest {
                warn!(
                    "Rejected out-of-order history entry {} (newest is {})",
                    entry.sequence_number(),
                    newest
                );
                return false;
            }
        }

        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        true
    }

    /// Replaces the entry recorded for the same sequence number.
    pub fn overwrite(&mut self, entry: HistoryEntry) -> bool {
        match self.index_of(entry.sequence_number()) {
            Some(index) => {
                self.entries[index] = entry;
                true
            }
            None => false,
        }
    }

    /// The state predicted for `sequence`, if it is still recorded.
    pub fn find_state_by_sequence(&self, sequence: u32) -> Option<EntityState> {
        self.index_of(sequence).map(|index| self.entries[index].state)
    }

    /// Removes every entry with a sequence number `<= sequence`.
    pub fn evict_up_to(&mut self, sequence: u32) {
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.sequence_number() <= sequence)
        {
            self.entries.pop_front();
        }
    }

    /// Inputs recorded after `sequence`, ascending.
    pub fn inputs_after(&self, sequence: u32) -> Vec<InputSample> {
        self.entries
            .iter()
            .filter(|entry| entry.sequence_number() > sequence)
            .map(|entry| entry.input)
            .collect()
    }

    /// Entries in ascending sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Sequence of the oldest recorded entry. Acks below it can no longer
    /// be checked against a prediction.
    pub fn oldest_sequence(&self) -> Option<u32> {
        self.entries.front().map(HistoryEntry::sequence_number)
    }

    pub fn newest_sequence(&self) -> Option<u32> {
        self.entries.back().map(HistoryEntry::sequence_number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn index_of(&self, sequence: u32) -> Option<usize> {
        self.entries
            .binary_search_by_key(&sequence, HistoryEntry::sequence_number)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    fn entry(seq: u32) -> HistoryEntry {
        let input = InputSample::new(seq, Vec2::X, seq as f64 / 60.0);
        let mut state = EntityState::new(Vec3::new(seq as f32, 0.0, 0.0));
        state.sequence_number = seq;
        HistoryEntry::new(input, state)
    }

    fn filled(range: std::ops::Range<u32>, capacity: usize) -> HistoryBuffer {
        let mut buffer = HistoryBuffer::new(capacity);
        for seq in range {
            buffer.push(entry(seq));
        }
        buffer
    }

    #[test]
    fn test_push_and_find() {
        let buffer = filled(0..5, 60);
        assert_eq!(buffer.len(), 5);
        let state = buffer.find_state_by_sequence(3).unwrap();
        assert_eq!(state.position.x, 3.0);
        assert!(buffer.find_state_by_sequence(7).is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest_pairs() {
        let buffer = filled(0..100, 60);
        assert_eq!(buffer.len(), 60);
        assert_eq!(buffer.oldest_sequence(), Some(40));
        assert_eq!(buffer.newest_sequence(), Some(99));
        assert!(buffer.find_state_by_sequence(39).is_none());
        for entry in buffer.iter() {
            assert_eq!(entry.input.sequence_number, entry.state.sequence_number);
        }
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let mut buffer = HistoryBuffer::new(8);
        for seq in 0..1000 {
            buffer.push(entry(seq));
            assert!(buffer.len() <= buffer.capacity());
        }
    }

    #[test]
    fn test_out_of_order_push_rejected() {
        let mut buffer = filled(0..5, 60);
        assert!(!buffer.push(entry(2)));
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.newest_sequence(), Some(4));
    }

    #[test]
    fn test_evict_up_to() {
        let mut buffer = filled(0..20, 60);
        buffer.evict_up_to(10);
        assert_eq!(buffer.oldest_sequence(), Some(11));
        assert_eq!(buffer.len(), 9);
    }

    #[test]
    fn test_evict_up_to_is_idempotent() {
        let mut once = filled(0..20, 60);
        once.evict_up_to(7);

        let mut twice = filled(0..20, 60);
        twice.evict_up_to(7);
        twice.evict_up_to(7);

        let once: Vec<_> = once.iter().copied().collect();
        let twice: Vec<_> = twice.iter().copied().collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_evict_past_end_empties() {
        let mut buffer = filled(0..5, 60);
        buffer.evict_up_to(100);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_inputs_after_is_ascending_and_non_destructive() {
        let buffer = filled(0..10, 60);
        let first: Vec<u32> = buffer
            .inputs_after(6)
            .iter()
            .map(|input| input.sequence_number)
            .collect();
        assert_eq!(first, vec![7, 8, 9]);

        let again = buffer.inputs_after(6);
        assert_eq!(again.len(), 3);
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_overwrite_replaces_matching_entry() {
        let mut buffer = filled(0..5, 60);
        let mut replacement = entry(2);
        replacement.state.position = Vec3::new(-1.0, 0.0, 0.0);

        assert!(buffer.overwrite(replacement));
        assert_eq!(buffer.find_state_by_sequence(2).unwrap().position.x, -1.0);
        assert!(!buffer.overwrite(entry(42)));
    }
}
