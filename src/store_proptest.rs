//! Property-based tests for the bounded LRU store.
//!
//! A plain `Vec` ordered from most to least recently used serves as the
//! reference model; every generated operation sequence must leave the store
//! and the model in the same state.

#[cfg(test)]
mod proptest_tests {
    use std::num::NonZeroUsize;

    use proptest::prelude::*;

    use crate::store::BoundedStore;

    #[derive(Debug, Clone)]
    enum Op {
        Get(u8),
        Put(u8, u32),
        Remove(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        // A small key domain keeps hits, replacements and evictions frequent
        prop_oneof![
            (0u8..12).prop_map(Op::Get),
            ((0u8..12), any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
            (0u8..12).prop_map(Op::Remove),
        ]
    }

    /// Reference model: (key, value) pairs, most recently used first.
    struct Model {
        entries: Vec<(u8, u32)>,
        capacity: usize,
    }

    impl Model {
        fn position(&self, key: u8) -> Option<usize> {
            self.entries.iter().position(|(k, _)| *k == key)
        }

        fn get(&mut self, key: u8) -> Option<u32> {
            let pos = self.position(key)?;
            let entry = self.entries.remove(pos);
            self.entries.insert(0, entry);
            Some(entry.1)
        }

        fn put(&mut self, key: u8, value: u32) -> Option<u8> {
            if let Some(pos) = self.position(key) {
                self.entries.remove(pos);
                self.entries.insert(0, (key, value));
                return None;
            }
            let evicted = if self.entries.len() >= self.capacity {
                self.entries.pop().map(|(k, _)| k)
            } else {
                None
            };
            self.entries.insert(0, (key, value));
            evicted
        }

        fn remove(&mut self, key: u8) -> Option<u32> {
            let pos = self.position(key)?;
            Some(self.entries.remove(pos).1)
        }
    }

    proptest! {
        /// Property: the store behaves exactly like the reference LRU model,
        /// never exceeds its capacity and always evicts the least recently used key
        #[test]
        fn store_matches_lru_model(
            capacity in 1usize..8,
            ops in prop::collection::vec(op_strategy(), 0..200),
        ) {
            let store: BoundedStore<u8, u32> =
                BoundedStore::new(NonZeroUsize::new(capacity).unwrap());
            let mut model = Model { entries: Vec::new(), capacity };

            for op in ops {
                match op {
                    Op::Get(k) => {
                        prop_assert_eq!(store.get(&k).unwrap(), model.get(k));
                    }
                    Op::Put(k, v) => {
                        prop_assert_eq!(store.put(k, v).unwrap(), model.put(k, v));
                    }
                    Op::Remove(k) => {
                        prop_assert_eq!(store.remove(&k).unwrap(), model.remove(k));
                    }
                }

                let expected: Vec<u8> = model.entries.iter().map(|(k, _)| *k).collect();
                prop_assert_eq!(store.keys_by_recency().unwrap(), expected);
                prop_assert!(store.len().unwrap() <= capacity);
            }
        }

        /// Property: after inserting N distinct keys, exactly the last
        /// min(N, capacity) keys remain
        #[test]
        fn store_keeps_most_recent_inserts(capacity in 1usize..16, n in 0u8..64) {
            let store: BoundedStore<u8, u8> =
                BoundedStore::new(NonZeroUsize::new(capacity).unwrap());
            for k in 0..n {
                store.put(k, k).unwrap();
            }
            let kept = store.keys_by_recency().unwrap();
            let expected: Vec<u8> = (0..n).rev().take(capacity).collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
