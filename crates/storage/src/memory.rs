//! MemoryStore: in-process store backend
//!
//! Holds the whole keyspace in one `FxHashMap` behind a `parking_lot::RwLock`.
//! Point reads take the read lock; a batch runs entirely under the write
//! lock, which makes every batch (conditions, type checks and commands) a
//! single indivisible step.
//!
//! # Batch execution
//!
//! 1. Evaluate every condition and record its outcome
//! 2. If any failed, return `Rejected` and apply nothing
//! 3. Type-check every command against the keyspace as it will look when
//!    the command runs; a mismatch fails the batch before anything applies
//! 4. Apply commands in order, collecting replies
//!
//! Collections that become empty are removed, so a missing key and an
//! empty collection are indistinguishable.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};

use matchstore_core::{
    Batch, BatchOutcome, Command, Condition, Key, Reply, Result, ScoredMember, StoreBackend,
    StoreError,
};

use crate::stored_value::{SortedSet, StoredValue, ValueType};

type Keyspace = FxHashMap<Key, StoredValue>;

/// In-process store backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keyspace.read().len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.keyspace.read().is_empty()
    }

    /// Remove every key
    pub fn flush(&self) {
        self.keyspace.write().clear();
    }

    /// Append values to the tail of a list, creating it if needed
    ///
    /// Returns the new list length.
    ///
    /// # Errors
    ///
    /// `WrongType` if the key holds a non-list value.
    pub fn rpush<I, S>(&self, key: &Key, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keyspace = self.keyspace.write();
        let entry = keyspace
            .entry(key.clone())
            .or_insert_with(|| StoredValue::List(VecDeque::new()));
        match entry {
            StoredValue::List(list) => {
                list.extend(values.into_iter().map(Into::into));
                let len = list.len();
                if len == 0 {
                    keyspace.remove(key);
                }
                Ok(len)
            }
            _ => Err(wrong_type(key, ValueType::List)),
        }
    }

    fn execute_batch(&self, batch: Batch) -> Result<BatchOutcome> {
        let mut keyspace = self.keyspace.write();

        let condition_results: Vec<bool> = batch
            .conditions
            .iter()
            .map(|condition| evaluate(&keyspace, condition))
            .collect();
        if condition_results.iter().any(|held| !held) {
            tracing::trace!(
                conditions = condition_results.len(),
                failed = condition_results.iter().filter(|held| !**held).count(),
                "batch rejected"
            );
            return Ok(BatchOutcome::Rejected { condition_results });
        }

        type_check(&keyspace, &batch.commands)?;

        let replies: Vec<Reply> = batch
            .commands
            .into_iter()
            .map(|command| apply(&mut keyspace, command))
            .collect();
        tracing::trace!(commands = replies.len(), "batch applied");
        Ok(BatchOutcome::Committed { replies })
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn get_string(&self, key: &Key) -> Result<Option<String>> {
        match self.keyspace.read().get(key) {
            None => Ok(None),
            Some(StoredValue::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key, ValueType::String)),
        }
    }

    async fn get_hash(&self, key: &Key) -> Result<BTreeMap<String, String>> {
        match self.keyspace.read().get(key) {
            None => Ok(BTreeMap::new()),
            Some(StoredValue::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key, ValueType::Hash)),
        }
    }

    async fn get_sorted_set(&self, key: &Key) -> Result<Vec<ScoredMember>> {
        match self.keyspace.read().get(key) {
            None => Ok(Vec::new()),
            Some(StoredValue::SortedSet(set)) => Ok(set.iter().collect()),
            Some(_) => Err(wrong_type(key, ValueType::SortedSet)),
        }
    }

    async fn exists(&self, key: &Key) -> Result<bool> {
        Ok(self.keyspace.read().contains_key(key))
    }

    async fn execute(&self, batch: Batch) -> Result<BatchOutcome> {
        self.execute_batch(batch)
    }
}

fn wrong_type(key: &Key, expected: ValueType) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected: expected.as_str(),
    }
}

/// Length of a collection of the wanted type; missing keys are empty.
/// `None` if the key holds a different type.
fn collection_len(keyspace: &Keyspace, key: &Key, wanted: ValueType) -> Option<usize> {
    match keyspace.get(key) {
        None => Some(0),
        Some(StoredValue::SortedSet(set)) if wanted == ValueType::SortedSet => Some(set.len()),
        Some(StoredValue::Hash(hash)) if wanted == ValueType::Hash => Some(hash.len()),
        Some(StoredValue::List(list)) if wanted == ValueType::List => Some(list.len()),
        Some(_) => None,
    }
}

fn hash_field<'a>(keyspace: &'a Keyspace, key: &Key, field: &str) -> Option<&'a str> {
    match keyspace.get(key) {
        Some(StoredValue::Hash(hash)) => hash.get(field).map(String::as_str),
        _ => None,
    }
}

/// Evaluate one condition; values of the wrong type never satisfy a
/// type-specific condition
fn evaluate(keyspace: &Keyspace, condition: &Condition) -> bool {
    match condition {
        Condition::KeyExists(key) => keyspace.contains_key(key),
        Condition::KeyNotExists(key) => !keyspace.contains_key(key),
        Condition::StringEqual { key, value } => {
            matches!(keyspace.get(key), Some(StoredValue::String(current)) if current == value)
        }
        Condition::HashLengthEqual { key, length } => {
            collection_len(keyspace, key, ValueType::Hash) == Some(*length)
        }
        Condition::ListLengthEqual { key, length } => {
            collection_len(keyspace, key, ValueType::List) == Some(*length)
        }
        Condition::SortedSetLengthGreaterThan { key, length } => {
            collection_len(keyspace, key, ValueType::SortedSet).is_some_and(|len| len > *length)
        }
        Condition::HashExists { key, field } => hash_field(keyspace, key, field).is_some(),
        Condition::HashNotExists { key, field } => hash_field(keyspace, key, field).is_none(),
        Condition::HashEqual { key, field, value } => {
            hash_field(keyspace, key, field) == Some(value.as_str())
        }
        Condition::HashNotEqual { key, field, value } => {
            hash_field(keyspace, key, field) != Some(value.as_str())
        }
    }
}

/// Check every command against the type its key will hold when it runs
fn type_check(keyspace: &Keyspace, commands: &[Command]) -> Result<()> {
    let mut pending: FxHashMap<&Key, Option<ValueType>> = FxHashMap::default();

    for command in commands {
        let key = command.key();
        let current = match pending.get(key) {
            Some(value_type) => *value_type,
            None => keyspace.get(key).map(StoredValue::value_type),
        };

        let after = match command {
            Command::StringSet { .. } => Some(ValueType::String),
            Command::KeyDelete(_) => None,
            Command::SortedSetAdd { .. } => {
                require(key, current, ValueType::SortedSet)?;
                Some(ValueType::SortedSet)
            }
            // Removals never create the key
            Command::SortedSetRemove { .. } | Command::PopMin { .. } => {
                require(key, current, ValueType::SortedSet)?;
                current
            }
            Command::HashSet { fields, .. } => {
                require(key, current, ValueType::Hash)?;
                if fields.is_empty() {
                    current
                } else {
                    Some(ValueType::Hash)
                }
            }
            Command::HashDelete { .. } => {
                require(key, current, ValueType::Hash)?;
                current
            }
        };
        pending.insert(key, after);
    }
    Ok(())
}

fn require(key: &Key, current: Option<ValueType>, expected: ValueType) -> Result<()> {
    match current {
        Some(found) if found != expected => Err(wrong_type(key, expected)),
        _ => Ok(()),
    }
}

/// Apply one type-checked command
fn apply(keyspace: &mut Keyspace, command: Command) -> Reply {
    match command {
        Command::StringSet { key, value } => {
            keyspace.insert(key, StoredValue::String(value));
            Reply::Done
        }
        Command::KeyDelete(key) => {
            keyspace.remove(&key);
            Reply::Done
        }
        Command::SortedSetAdd { key, member, score } => {
            if let StoredValue::SortedSet(set) = keyspace
                .entry(key)
                .or_insert_with(|| StoredValue::SortedSet(SortedSet::new()))
            {
                set.insert(member, score);
            }
            Reply::Done
        }
        Command::SortedSetRemove { key, member } => {
            if let Some(StoredValue::SortedSet(set)) = keyspace.get_mut(&key) {
                set.remove(&member);
            }
            drop_if_empty(keyspace, &key);
            Reply::Done
        }
        Command::PopMin { key, count } => {
            let popped = match keyspace.get_mut(&key) {
                Some(StoredValue::SortedSet(set)) => set.pop_min(count),
                _ => Vec::new(),
            };
            drop_if_empty(keyspace, &key);
            Reply::Popped(popped)
        }
        Command::HashSet { key, fields } => {
            if fields.is_empty() {
                return Reply::Done;
            }
            if let StoredValue::Hash(hash) = keyspace
                .entry(key)
                .or_insert_with(|| StoredValue::Hash(BTreeMap::new()))
            {
                hash.extend(fields);
            }
            Reply::Done
        }
        Command::HashDelete { key, field } => {
            if let Some(StoredValue::Hash(hash)) = keyspace.get_mut(&key) {
                hash.remove(&field);
            }
            drop_if_empty(keyspace, &key);
            Reply::Done
        }
    }
}

fn drop_if_empty(keyspace: &mut Keyspace, key: &Key) {
    if keyspace.get(key).is_some_and(StoredValue::is_empty_collection) {
        keyspace.remove(key);
    }
}
