//! Key-based differ - ordered diff between two collection snapshots.
//!
//! Identity is key-based, not reference-based: a caller-supplied key function
//! maps each item to a key, and key equality defines which items are "the
//! same" across snapshots. A key present in both snapshots with a changed
//! value yields [`Operation::Update`], never a remove/insert pair, and a
//! matched key is always reused via [`Operation::Move`] no matter how far it
//! travelled.
//!
//! # Operation order
//!
//! The emitted operations carry live container indices: applying them in
//! emission order to a container holding the previous snapshot's views
//! produces the next snapshot's order. Emission order is:
//!
//! 1. removals, front to back
//! 2. moves, computed back to front within the surviving set (indices are
//!    post-removal and pre-insertion, so they stay valid even when view
//!    creation is deferred)
//! 3. insertions, ascending final target index
//! 4. identity updates at final indices
//!
//! The differ retains only the previous snapshot; operations are transient
//! and produced once per pass.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

/// Per-item classification produced by one diff pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation<T> {
    /// A new key appeared; create a view at `index`.
    Insert {
        /// Target position of the new view.
        index: usize,
        /// Item to bind the new view to.
        item: T,
    },
    /// A key disappeared; drop the view at `index`.
    Remove {
        /// Live position of the doomed view.
        index: usize,
    },
    /// A key changed position; relocate its existing view.
    ///
    /// Both indices are in the post-removal, pre-insertion space: only
    /// surviving views exist when a move applies.
    Move {
        /// Position of the view before the move.
        from: usize,
        /// Position of the view after the move.
        to: usize,
        /// Item value from the next snapshot.
        item: T,
    },
    /// A key kept its position but its value changed.
    Update {
        /// Final position of the view.
        index: usize,
        /// Item value from the next snapshot.
        item: T,
    },
}

/// Computes ordered diffs between consecutive collection snapshots.
pub struct KeyedDiffer<T, K> {
    key_fn: Rc<dyn Fn(&T) -> K>,
    previous: Vec<T>,
    previous_keys: Vec<K>,
}

impl<T, K> KeyedDiffer<T, K>
where
    T: Clone + PartialEq + 'static,
    K: Eq + Hash + Clone + Debug + 'static,
{
    /// Create a differ with an empty baseline.
    pub fn new(key_fn: Rc<dyn Fn(&T) -> K>) -> Self {
        Self {
            key_fn,
            previous: Vec::new(),
            previous_keys: Vec::new(),
        }
    }

    /// Discard the baseline so the next diff is an all-insert pass.
    pub fn reset(&mut self) {
        self.previous.clear();
        self.previous_keys.clear();
    }

    /// Number of items in the retained baseline.
    pub fn baseline_len(&self) -> usize {
        self.previous.len()
    }

    /// Diff `next` against the retained snapshot.
    ///
    /// Returns `None` when keys, order and values are all unchanged - the
    /// fast path that schedules no work downstream.
    pub fn diff(&mut self, next: &[T]) -> Option<Vec<Operation<T>>> {
        // Dedup by key; first occurrence wins.
        let mut next_items: Vec<T> = Vec::with_capacity(next.len());
        let mut next_keys: Vec<K> = Vec::with_capacity(next.len());
        let mut seen: HashSet<K> = HashSet::with_capacity(next.len());
        for item in next {
            let key = (self.key_fn)(item);
            if !seen.insert(key.clone()) {
                tracing::warn!(?key, "duplicate key in snapshot, keeping first occurrence");
                continue;
            }
            next_keys.push(key);
            next_items.push(item.clone());
        }

        if next_keys == self.previous_keys && next_items == self.previous {
            return None;
        }

        let mut operations: Vec<Operation<T>> = Vec::new();
        {
            let next_index: HashMap<&K, usize> =
                next_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();
            let prev_value: HashMap<&K, &T> = self
                .previous_keys
                .iter()
                .zip(self.previous.iter())
                .collect();

            // Removals front to back; `kept` is the live index of the next
            // surviving view while earlier removals are already applied.
            let mut working: Vec<K> = Vec::with_capacity(next_keys.len());
            let mut kept = 0usize;
            for key in &self.previous_keys {
                if next_index.contains_key(key) {
                    working.push(key.clone());
                    kept += 1;
                } else {
                    operations.push(Operation::Remove { index: kept });
                }
            }

            // Moves back to front within the surviving set: once position i
            // matches, everything after it already matches, so the needed key
            // always sits at some j < i.
            let survivor_target: Vec<&K> = next_keys
                .iter()
                .filter(|key| prev_value.contains_key(key))
                .collect();
            let mut moved: HashSet<K> = HashSet::new();
            for i in (0..survivor_target.len()).rev() {
                let key = survivor_target[i];
                if &working[i] == key {
                    continue;
                }
                let Some(from) = working.iter().position(|k| k == key) else {
                    debug_assert!(false, "key vanished from working set");
                    continue;
                };
                let k = working.remove(from);
                working.insert(i, k);
                operations.push(Operation::Move {
                    from,
                    to: i,
                    item: next_items[next_index[key]].clone(),
                });
                moved.insert(key.clone());
            }

            // Insertions in ascending final-index order. Survivors already
            // sit in their relative final order, so inserting each new key
            // at its absolute final index lands it correctly.
            for (i, key) in next_keys.iter().enumerate() {
                if !prev_value.contains_key(key) {
                    operations.push(Operation::Insert {
                        index: i,
                        item: next_items[i].clone(),
                    });
                }
            }

            // Identity updates for keys that kept their view but changed
            // value. Moved keys already carry the new value with the move.
            for (i, key) in next_keys.iter().enumerate() {
                if moved.contains(key) {
                    continue;
                }
                if let Some(prev) = prev_value.get(key) {
                    if **prev != next_items[i] {
                        operations.push(Operation::Update {
                            index: i,
                            item: next_items[i].clone(),
                        });
                    }
                }
            }
        }

        self.previous = next_items;
        self.previous_keys = next_keys;

        if operations.is_empty() {
            None
        } else {
            Some(operations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn differ() -> KeyedDiffer<&'static str, &'static str> {
        KeyedDiffer::new(Rc::new(|item| *item))
    }

    fn count_ops(ops: &[Operation<&'static str>]) -> (usize, usize, usize, usize) {
        let mut counts = (0, 0, 0, 0);
        for op in ops {
            match op {
                Operation::Insert { .. } => counts.0 += 1,
                Operation::Remove { .. } => counts.1 += 1,
                Operation::Move { .. } => counts.2 += 1,
                Operation::Update { .. } => counts.3 += 1,
            }
        }
        counts
    }

    /// Apply operations to a plain vec the way the engine applies them to a
    /// container: removes/moves in place, inserts at the target index.
    fn apply(previous: &[&'static str], ops: &[Operation<&'static str>]) -> Vec<&'static str> {
        let mut current: Vec<&'static str> = previous.to_vec();
        for op in ops {
            match op {
                Operation::Insert { index, item } => {
                    current.insert((*index).min(current.len()), item)
                }
                Operation::Remove { index } => {
                    current.remove(*index);
                }
                Operation::Move { from, to, .. } => {
                    let item = current.remove(*from);
                    current.insert(*to, item);
                }
                Operation::Update { .. } => {}
            }
        }
        current
    }

    #[test]
    fn test_unchanged_snapshot_is_fast_path() {
        let mut d = differ();
        assert!(d.diff(&["a", "b"]).is_some());
        assert!(
            d.diff(&["a", "b"]).is_none(),
            "identical keys and order must yield no operations"
        );
    }

    #[test]
    fn test_all_insert_from_empty() {
        let mut d = differ();
        let ops = d.diff(&["x", "y"]).expect("diff expected");
        assert_eq!(
            ops,
            vec![
                Operation::Insert { index: 0, item: "x" },
                Operation::Insert { index: 1, item: "y" },
            ]
        );
    }

    #[test]
    fn test_rotation_yields_two_moves() {
        let mut d = differ();
        d.diff(&["a", "b", "c"]);
        let ops = d.diff(&["c", "a", "b"]).expect("diff expected");
        let (inserts, removes, moves, updates) = count_ops(&ops);
        assert_eq!(moves, 2, "rotation must reuse every view via moves");
        assert_eq!((inserts, removes, updates), (0, 0, 0));
        assert_eq!(apply(&["a", "b", "c"], &ops), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_move_preferred_over_remove_insert() {
        let mut d = differ();
        d.diff(&["a", "b", "c", "d", "e"]);
        // "a" travels the full distance; it must still be a move
        let ops = d.diff(&["b", "c", "d", "e", "a"]).expect("diff expected");
        let (inserts, removes, _, _) = count_ops(&ops);
        assert_eq!((inserts, removes), (0, 0), "matched keys never churn views");
        assert_eq!(
            apply(&["a", "b", "c", "d", "e"], &ops),
            vec!["b", "c", "d", "e", "a"]
        );
    }

    #[test]
    fn test_mixed_operations_converge() {
        let mut d = differ();
        d.diff(&["a", "b", "c", "d"]);
        let ops = d.diff(&["e", "c", "a"]).expect("diff expected");
        assert_eq!(apply(&["a", "b", "c", "d"], &ops), vec!["e", "c", "a"]);
        let (inserts, removes, _, _) = count_ops(&ops);
        assert_eq!(inserts, 1, "only `e` is new");
        assert_eq!(removes, 2, "`b` and `d` are gone");
    }

    #[test]
    fn test_value_change_yields_update() {
        #[derive(Clone, PartialEq, Debug, Eq)]
        struct Item {
            id: &'static str,
            value: i32,
        }
        let mut d: KeyedDiffer<Item, &'static str> = KeyedDiffer::new(Rc::new(|item| item.id));
        d.diff(&[Item { id: "a", value: 1 }]);
        let ops = d
            .diff(&[Item { id: "a", value: 2 }])
            .expect("value change must produce operations");
        assert_eq!(
            ops,
            vec![Operation::Update {
                index: 0,
                item: Item { id: "a", value: 2 }
            }],
            "same key with changed value is an identity update, not remove+insert"
        );
    }

    #[test]
    fn test_duplicate_keys_keep_first() {
        let mut d = differ();
        let ops = d.diff(&["a", "a", "b"]).expect("diff expected");
        let (inserts, _, _, _) = count_ops(&ops);
        assert_eq!(inserts, 2, "second `a` is skipped");
    }

    #[test]
    fn test_reset_discards_baseline() {
        let mut d = differ();
        d.diff(&["a", "b"]);
        d.reset();
        assert_eq!(d.baseline_len(), 0);
        let ops = d.diff(&["a", "b"]).expect("diff expected");
        let (inserts, removes, moves, _) = count_ops(&ops);
        assert_eq!((inserts, removes, moves), (2, 0, 0), "post-reset pass is all-insert");
    }

    #[test]
    fn test_clear_to_empty() {
        let mut d = differ();
        d.diff(&["a", "b"]);
        let ops = d.diff(&[]).expect("diff expected");
        assert_eq!(
            ops,
            vec![
                Operation::Remove { index: 0 },
                Operation::Remove { index: 0 },
            ]
        );
    }
}
