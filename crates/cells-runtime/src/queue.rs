use std::collections::{BTreeMap, VecDeque};

/// Tick-bucketed FIFO of pending work items.
pub(crate) struct TickQueue<T> {
    // map of tick -> FIFO queue of items
    by_tick: BTreeMap<u64, VecDeque<T>>,
    now: u64,
}

impl<T> Default for TickQueue<T> {
    fn default() -> Self {
        Self {
            by_tick: BTreeMap::new(),
            now: 0,
        }
    }
}

impl<T> TickQueue<T> {
    #[inline]
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn push_at(&mut self, tick: u64, item: T) {
        self.by_tick.entry(tick).or_default().push_back(item);
    }

    pub fn push_after(&mut self, delta: u64, item: T) {
        self.push_at(self.now + delta, item);
    }

    /// Moves to the next tick and returns everything due at or before it, oldest first.
    pub fn advance(&mut self) -> Vec<T> {
        self.now = self.now.wrapping_add(1);
        let later = self.by_tick.split_off(&(self.now + 1));
        let due = std::mem::replace(&mut self.by_tick, later);
        due.into_values().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.by_tick.values().map(VecDeque::len).sum()
    }

    /// Tick of the earliest pending item.
    pub fn next_due(&self) -> Option<u64> {
        self.by_tick.keys().next().copied()
    }
}
