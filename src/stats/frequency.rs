//! Per-dimension occurrence counters

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Count of occurrences per observed value.
///
/// Keys keep the order in which they were first seen. Ranking sorts a copy
/// with a stable sort, so keys with equal counts stay in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence of `key`
    pub fn increment(&mut self, key: &str) {
        self.add(key, 1);
    }

    /// Add `count` occurrences of `key`, creating it if unseen
    pub fn add(&mut self, key: &str, count: u64) {
        match self.index.get(key) {
            Some(&slot) => self.entries[slot].1 += count,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), count));
            }
        }
    }

    /// Fold another table into this one. Keys new to `self` are appended in
    /// the order `other` first saw them.
    pub fn merge(&mut self, other: FrequencyTable) {
        for (key, count) in other.entries {
            match self.index.get(&key) {
                Some(&slot) => self.entries[slot].1 += count,
                None => {
                    self.index.insert(key.clone(), self.entries.len());
                    self.entries.push((key, count));
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.index.get(key).map(|&slot| self.entries[slot].1)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    /// Entries in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(key, count)| (key.as_str(), *count))
    }

    /// The `n` highest counts, descending. The table itself is untouched.
    pub fn top(&self, n: usize) -> Ranking {
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(n);
        Ranking(ranked)
    }
}

impl Serialize for FrequencyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_counts(&self.entries, serializer)
    }
}

/// Ranked slice of a [`FrequencyTable`], highest count first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ranking(Vec<(String, u64)>);

impl Ranking {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(key, count)| (key.as_str(), *count))
    }

    pub fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|(key, _)| key.as_str()).collect()
    }
}

impl Serialize for Ranking {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_counts(&self.0, serializer)
    }
}

/// JSON object whose key order follows the slice
fn serialize_counts<S: Serializer>(
    entries: &[(String, u64)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (key, count) in entries {
        map.serialize_entry(key, count)?;
    }
    map.end()
}
