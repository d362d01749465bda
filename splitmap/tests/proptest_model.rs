//! Property-based tests checking the map and the list against `BTreeMap`.

use proptest::prelude::*;
use splitmap::{Node, SortedList, SplitOrderedMap, KEY_LIMIT};
use splitmap_epoch::pin;
use std::collections::BTreeMap;

// ============================================================================
//  Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Put(u32, u32),
    Get(u32),
    Remove(u32),
}

/// Keys from a small range so operations collide often.
fn dense_key() -> impl Strategy<Value = u32> + Clone {
    0u32..256
}

/// Keys from the whole permitted range.
fn any_key() -> impl Strategy<Value = u32> + Clone {
    0..KEY_LIMIT
}

fn op(key: impl Strategy<Value = u32> + Clone) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (key.clone(), any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
        2 => key.clone().prop_map(Op::Get),
        2 => key.prop_map(Op::Remove),
    ]
}

fn check_against_model(ops: &[Op], expected: u64, load_factor: u64) -> Result<(), TestCaseError> {
    let map = SplitOrderedMap::new(expected, load_factor);
    let mut model = BTreeMap::new();

    for op in ops {
        match *op {
            Op::Put(k, v) => {
                let fresh = !model.contains_key(&k);
                if fresh {
                    model.insert(k, v);
                }
                prop_assert_eq!(map.put(k, v), fresh);
            }
            Op::Get(k) => prop_assert_eq!(map.get(k), model.get(&k).copied()),
            Op::Remove(k) => prop_assert_eq!(map.remove(k), model.remove(&k).is_some()),
        }
    }

    prop_assert_eq!(map.len() as usize, model.len());
    for (&k, &v) in &model {
        prop_assert_eq!(map.get(k), Some(v));
    }
    Ok(())
}

// ============================================================================
//  Map Properties
// ============================================================================

proptest! {
    /// Colliding keys on a small table that splits often.
    #[test]
    fn map_matches_model_dense(ops in prop::collection::vec(op(dense_key()), 1..400)) {
        check_against_model(&ops, 256, 1)?;
    }

    /// Sparse keys spread over many buckets.
    #[test]
    fn map_matches_model_sparse(ops in prop::collection::vec(op(any_key()), 1..400)) {
        check_against_model(&ops, 1 << 16, 2)?;
    }

    /// Bucket count stays a power of two within bounds.
    #[test]
    fn bucket_count_stays_bounded(keys in prop::collection::vec(any_key(), 0..600)) {
        let map = SplitOrderedMap::new(128, 2);
        for k in keys {
            map.put(k, k);
        }
        prop_assert!(map.bucket_count().is_power_of_two());
        prop_assert!(map.bucket_count() <= map.max_bucket_count());
        prop_assert_eq!(map.max_bucket_count(), 64);
    }
}

// ============================================================================
//  List Properties
// ============================================================================

proptest! {
    /// Iteration yields the model's keys in ascending order.
    #[test]
    fn list_iterates_in_key_order(ops in prop::collection::vec(op(dense_key()), 1..300)) {
        let list = SortedList::new();
        let mut model = BTreeMap::new();
        let guard = pin();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    if list.insert(list.head(), k, v, &guard).is_ok() {
                        model.insert(k, v);
                    }
                }
                Op::Get(_) => {}
                Op::Remove(k) => {
                    if list.remove(list.head(), k, &guard) {
                        model.remove(&k);
                    }
                }
            }
        }

        let items: Vec<(u32, u32)> = list.iter(&guard).map(|n: &Node| (n.key(), n.value())).collect();
        let expected: Vec<(u32, u32)> = model.into_iter().collect();
        prop_assert_eq!(items, expected);
    }
}
