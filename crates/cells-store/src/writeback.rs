use std::hash::Hash;

use hashbrown::HashMap;

/// Tracks which keys hold unsaved changes.
///
/// Every `mark` stamps a fresh generation. A save acknowledges the generation
/// it snapshotted, so a change made while the save was running keeps the key dirty.
#[derive(Debug)]
pub struct WriteBackBuffer<K> {
    dirty: HashMap<K, u64>,
    next_gen: u64,
}

impl<K> Default for WriteBackBuffer<K> {
    fn default() -> Self {
        Self {
            dirty: HashMap::new(),
            next_gen: 1,
        }
    }
}

impl<K: Eq + Hash + Clone> WriteBackBuffer<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, key: K) -> u64 {
        let g = self.next_gen;
        self.next_gen += 1;
        self.dirty.insert(key, g);
        g
    }

    #[inline]
    pub fn is_dirty(&self, key: &K) -> bool {
        self.dirty.contains_key(key)
    }

    #[inline]
    pub fn generation(&self, key: &K) -> Option<u64> {
        self.dirty.get(key).copied()
    }

    /// Snapshot of dirty keys with their current generation.
    pub fn pending(&self) -> Vec<(K, u64)> {
        self.dirty.iter().map(|(k, g)| (k.clone(), *g)).collect()
    }

    /// Clears `key` if it is still at `generation`. Returns whether it was cleared.
    pub fn acknowledge(&mut self, key: &K, generation: u64) -> bool {
        match self.dirty.get(key) {
            Some(g) if *g == generation => {
                self.dirty.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn forget(&mut self, key: &K) -> bool {
        self.dirty.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.dirty.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dirty.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_acknowledge_keeps_key_dirty() {
        let mut b = WriteBackBuffer::new();
        let g1 = b.mark("a");
        let g2 = b.mark("a");
        assert!(g2 > g1);
        assert!(!b.acknowledge(&"a", g1));
        assert!(b.is_dirty(&"a"));
        assert!(b.acknowledge(&"a", g2));
        assert!(b.is_empty());
    }

    #[test]
    fn pending_lists_each_key_once() {
        let mut b = WriteBackBuffer::new();
        b.mark(1u32);
        b.mark(2u32);
        b.mark(1u32);
        let mut keys: Vec<u32> = b.pending().into_iter().map(|(k, _)| k).collect();
        keys.sort();
        assert_eq!(keys, vec![1, 2]);
        assert!(b.forget(&2));
        assert!(!b.forget(&2));
        assert_eq!(b.len(), 1);
    }
}
