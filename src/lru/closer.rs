// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Closer-aware LRU, a port of `original_source/inmem/closer.go`. Only
//! item-count limited; a closer callback runs on every evicted value
//! (used by the chunk appender's backing file handles, the way the
//! original used it to close `os.File`s). `items()` returns a snapshot
//! for bulk operations like fsync.

use std::hash::Hash;

use hashlink::LinkedHashMap;

pub struct CloserLru<K, V> {
    max_items: usize,
    map: LinkedHashMap<K, V>,
    closer: Box<dyn FnMut(V) + Send>,
}

impl<K: Eq + Hash + Clone, V> CloserLru<K, V> {
    pub fn new(max_items: usize, closer: impl FnMut(V) + Send + 'static) -> Self {
        assert!(max_items > 0, "CloserLru: max_items must be > 0");
        CloserLru {
            max_items,
            map: LinkedHashMap::new(),
            closer: Box::new(closer),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn add(&mut self, key: K, value: V) {
        if let Some(old) = self.map.remove(&key) {
            (self.closer)(old);
        }
        self.map.insert(key, value);
        if self.map.len() > self.max_items {
            if let Some((_, evicted)) = self.map.pop_front() {
                (self.closer)(evicted);
            }
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V>
    where
        V: Clone,
    {
        // Promoting requires removing and reinserting, which needs an
        // owned value; clone rather than widen the trait bound crate-wide.
        let value = self.map.get(key)?.clone();
        self.map.remove(key);
        self.map.insert(key.clone(), value);
        self.map.get(key)
    }

    pub fn remove(&mut self, key: &K) {
        if let Some(old) = self.map.remove(key) {
            (self.closer)(old);
        }
    }

    /// Snapshot of the current entries, in LRU order (oldest first).
    pub fn items(&self) -> Vec<(&K, &V)> {
        self.map.iter().collect()
    }

    /// Drains every entry through the closer, e.g. on shutdown.
    pub fn clear(&mut self) {
        while let Some((_, v)) = self.map.pop_front() {
            (self.closer)(v);
        }
    }
}

impl<K, V> Drop for CloserLru<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn evicts_with_closer_callback() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let closed2 = closed.clone();
        let mut c: CloserLru<i32, i32> = CloserLru::new(2, move |v| closed2.lock().unwrap().push(v));
        c.add(1, 100);
        c.add(2, 200);
        c.add(3, 300);
        assert_eq!(*closed.lock().unwrap(), vec![100]);
        assert!(c.get(&1).is_none());
    }

    #[test]
    fn drop_closes_remaining_entries() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let closed2 = closed.clone();
        {
            let mut c: CloserLru<i32, i32> =
                CloserLru::new(10, move |v| closed2.lock().unwrap().push(v));
            c.add(1, 100);
            c.add(2, 200);
        }
        let mut got = closed.lock().unwrap().clone();
        got.sort();
        assert_eq!(got, vec![100, 200]);
    }

    #[test]
    fn items_snapshot() {
        let mut c: CloserLru<i32, i32> = CloserLru::new(10, |_| {});
        c.add(1, 100);
        c.add(2, 200);
        let items = c.items();
        assert_eq!(items.len(), 2);
    }
}
