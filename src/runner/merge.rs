//! Layered variable merging.
//!
//! Precedence, lowest to highest: persisted environment, global variables,
//! the current data row. Every function returns a new sequence and leaves
//! its inputs alone.

use crate::parser::types::KeyValue;
use std::collections::HashMap;

/// Overlay `higher` on top of `lower`.
///
/// Keys already in `lower` keep their position and take the higher value;
/// new keys are appended in `higher`'s order. Duplicate keys collapse onto
/// their first position, the last value winning.
pub fn merge(lower: &[KeyValue], higher: &[KeyValue]) -> Vec<KeyValue> {
    let mut merged: Vec<KeyValue> = Vec::with_capacity(lower.len() + higher.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for kv in lower.iter().chain(higher) {
        match positions.get(&kv.key) {
            Some(&index) => merged[index].value = kv.value.clone(),
            None => {
                positions.insert(kv.key.clone(), merged.len());
                merged.push(kv.clone());
            }
        }
    }

    merged
}

/// The baseline that persists after an iteration: environment plus globals
pub fn with_globals(current: &[KeyValue], globals: &[KeyValue]) -> Vec<KeyValue> {
    merge(current, globals)
}

/// Effective variables for one iteration
pub fn merge_layers(current: &[KeyValue], globals: &[KeyValue], row: &[KeyValue]) -> Vec<KeyValue> {
    merge(&with_globals(current, globals), row)
}

/// Entries of `after` that are new or carry a different value than in `before`
pub fn changed_entries(before: &[KeyValue], after: &[KeyValue]) -> Vec<KeyValue> {
    after
        .iter()
        .filter(|kv| {
            before
                .iter()
                .rev()
                .find(|old| old.key == kv.key)
                .map_or(true, |old| old.value != kv.value)
        })
        .cloned()
        .collect()
}
