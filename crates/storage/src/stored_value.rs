//! Value types held by the memory store
//!
//! - `String`: serialized entries
//! - `SortedSet`: queues, members ordered by (score, member)
//! - `Hash`: metadata collections
//! - `List`: only inspected by length conditions

use matchstore_core::ScoredMember;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Name of a value type, used in `WrongType` errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Plain string
    String,
    /// Sorted set
    SortedSet,
    /// Hash
    Hash,
    /// List
    List,
}

impl ValueType {
    /// Lowercase type name
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::SortedSet => "sorted set",
            ValueType::Hash => "hash",
            ValueType::List => "list",
        }
    }
}

/// A value stored under one key
#[derive(Debug, Clone)]
pub enum StoredValue {
    /// Plain string
    String(String),
    /// Sorted set
    SortedSet(SortedSet),
    /// Hash of field to value
    Hash(BTreeMap<String, String>),
    /// List of strings
    List(VecDeque<String>),
}

impl StoredValue {
    /// Type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            StoredValue::String(_) => ValueType::String,
            StoredValue::SortedSet(_) => ValueType::SortedSet,
            StoredValue::Hash(_) => ValueType::Hash,
            StoredValue::List(_) => ValueType::List,
        }
    }

    /// Whether a collection value has become empty and should be dropped
    pub fn is_empty_collection(&self) -> bool {
        match self {
            StoredValue::String(_) => false,
            StoredValue::SortedSet(set) => set.is_empty(),
            StoredValue::Hash(hash) => hash.is_empty(),
            StoredValue::List(list) => list.is_empty(),
        }
    }
}

/// Score with a total order, so it can key a `BTreeSet`
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Members ordered by ascending score, ties broken by member id
///
/// `scores` and `order` always hold the same members.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: FxHashMap<String, f64>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    /// Create an empty sorted set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member or move it to a new score
    ///
    /// Returns true if the member was not present before.
    pub fn insert(&mut self, member: String, score: f64) -> bool {
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                self.order.remove(&(Score(old), member.clone()));
                self.order.insert((Score(score), member));
                false
            }
            None => {
                self.order.insert((Score(score), member));
                true
            }
        }
    }

    /// Remove a member; returns true if it was present
    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&(Score(score), member.to_string()));
                true
            }
            None => false,
        }
    }

    /// Remove and return up to `count` lowest-scored members
    pub fn pop_min(&mut self, count: usize) -> Vec<ScoredMember> {
        let mut popped = Vec::with_capacity(count.min(self.len()));
        while popped.len() < count {
            let Some((Score(score), member)) = self.order.pop_first() else {
                break;
            };
            self.scores.remove(&member);
            popped.push(ScoredMember::new(member, score));
        }
        popped
    }

    /// Score of a member
    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the set has no members
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = ScoredMember> + '_ {
        self.order
            .iter()
            .map(|(Score(score), member)| ScoredMember::new(member.clone(), *score))
    }
}
