//! Staged transactions over a shared store
//!
//! A [`Transaction`] accumulates writes and preconditions in memory and
//! submits them to the backend as one conditional batch on
//! [`commit`](Transaction::commit). Nothing reaches the store before commit,
//! and a rejected commit applies nothing.
//!
//! # Optimistic concurrency
//!
//! Entries read through `StoreClient::get` carry the exact string the store
//! held at read time. `update_all` and `delete_all` attach that snapshot as a
//! precondition, so a commit fails if any other transaction changed the key
//! in between. The first committer wins; the loser sees `Aborted` and may
//! reload and retry.
//!
//! # Failure diagnosis
//!
//! When the store rejects a batch it reports which conditions held. The
//! transaction's [`ConditionRegistry`] turns that into exactly one
//! [`TransactionFailure`]. See the `conditions` module for the order.

use std::sync::Arc;
use std::time::Instant;

use matchstore_core::{
    Batch, BatchOutcome, Command, Condition, Entry, Key, QueuedEntry, Reply, Result,
    ScoredMember, StoreBackend, StoreError,
};

use crate::conditions::{ConditionClass, ConditionRegistry};
use crate::config::TransactionSettings;

/// Handle for reading the result of a staged dequeue after commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeueTicket {
    txn_id: u64,
    reply_index: usize,
}

/// Outcome of a successful commit
#[derive(Debug, Clone)]
pub struct Committed {
    txn_id: u64,
    replies: Vec<Reply>,
}

impl Committed {
    /// Id of the transaction that produced this outcome
    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Number of commands the store applied
    pub fn applied(&self) -> usize {
        self.replies.len()
    }

    /// Ids popped by the dequeue behind `ticket`, lowest score first
    ///
    /// Empty for a ticket issued by another transaction.
    pub fn dequeued(&self, ticket: DequeueTicket) -> Vec<String> {
        self.dequeued_members(ticket)
            .iter()
            .map(|popped| popped.member.clone())
            .collect()
    }

    /// Popped ids together with the scores they were queued at
    pub fn dequeued_members(&self, ticket: DequeueTicket) -> &[ScoredMember] {
        if ticket.txn_id != self.txn_id {
            return &[];
        }
        match self.replies.get(ticket.reply_index) {
            Some(Reply::Popped(members)) => members,
            _ => &[],
        }
    }
}

/// A single-use batch of staged operations
///
/// Created by `StoreClient::create_transaction`. Staging methods only append
/// to in-memory buffers and never fail; an entry that cannot be serialized
/// is remembered and returned by `commit` instead. Operations apply in call
/// order.
///
/// Dropping a transaction that still holds staged work discards it and
/// logs a warning.
#[derive(Debug)]
pub struct Transaction {
    txn_id: u64,
    backend: Arc<dyn StoreBackend>,
    settings: TransactionSettings,
    registry: ConditionRegistry,
    commands: Vec<Command>,
    deferred: Option<StoreError>,
    finished: bool,
}

impl Transaction {
    pub(crate) fn new(
        txn_id: u64,
        backend: Arc<dyn StoreBackend>,
        settings: TransactionSettings,
    ) -> Self {
        Self {
            txn_id,
            backend,
            settings,
            registry: ConditionRegistry::new(),
            commands: Vec::new(),
            deferred: None,
            finished: false,
        }
    }

    /// Transaction id, unique per client manager
    pub fn id(&self) -> u64 {
        self.txn_id
    }

    /// Number of staged write commands
    pub fn staged_commands(&self) -> usize {
        self.commands.len()
    }

    /// Number of attached preconditions
    pub fn condition_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether nothing has been staged
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.registry.is_empty() && self.deferred.is_none()
    }

    fn defer(&mut self, error: StoreError) {
        if self.deferred.is_none() {
            self.deferred = Some(error);
        }
    }

    fn serialize<T: Entry>(&mut self, entry: &T) -> Option<String> {
        match entry.serialize_to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                self.defer(e);
                None
            }
        }
    }

    // ========================================================================
    // Entries
    // ========================================================================

    /// Write new entries; each key must not exist yet
    ///
    /// Fails the commit with `AlreadyExists(key)` otherwise.
    pub fn create_all<'a, T, I>(&mut self, entries: I) -> &mut Self
    where
        T: Entry + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for entry in entries {
            let Some(value) = self.serialize(entry) else {
                continue;
            };
            let key = entry.key();
            self.registry.attach(
                ConditionClass::MustNotExist,
                key.as_str(),
                Condition::KeyNotExists(key.clone()),
            );
            self.commands.push(Command::StringSet { key, value });
        }
        self
    }

    /// Overwrite entries that still hold their captured previous state
    ///
    /// Fails the commit with `NotFound(key)` if a key is missing, or with
    /// `Aborted` if another transaction changed it since it was read.
    pub fn update_all<'a, T, I>(&mut self, entries: I) -> &mut Self
    where
        T: Entry + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for entry in entries {
            let Some(value) = self.serialize(entry) else {
                continue;
            };
            let key = entry.key();
            self.attach_snapshot(entry, &key);
            self.commands.push(Command::StringSet { key, value });
        }
        self
    }

    /// Delete entries that still hold their captured previous state
    pub fn delete_all<'a, T, I>(&mut self, entries: I) -> &mut Self
    where
        T: Entry + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for entry in entries {
            let key = entry.key();
            self.attach_snapshot(entry, &key);
            self.commands.push(Command::KeyDelete(key));
        }
        self
    }

    /// Key must exist and still hold the entry's previous state. The
    /// snapshot comparison is never reported by label.
    fn attach_snapshot<T: Entry>(&mut self, entry: &T, key: &Key) {
        self.registry.attach(
            ConditionClass::MustExist,
            key.as_str(),
            Condition::KeyExists(key.clone()),
        );
        let expected = entry.previous_state().as_str().unwrap_or_default();
        self.registry.attach(
            ConditionClass::Snapshot,
            "",
            Condition::StringEqual {
                key: key.clone(),
                value: expected.to_string(),
            },
        );
    }

    /// Delete a key of any type; it must exist
    pub fn delete_key(&mut self, key: impl Into<Key>) -> &mut Self {
        let key = key.into();
        self.registry.attach(
            ConditionClass::MustExist,
            key.as_str(),
            Condition::KeyExists(key.clone()),
        );
        self.commands.push(Command::KeyDelete(key));
        self
    }

    // ========================================================================
    // Queues
    // ========================================================================

    /// Add entry ids to their queues, or move them to a new score
    pub fn enqueue_all<'a, T, I>(&mut self, entries: I) -> &mut Self
    where
        T: QueuedEntry + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for entry in entries {
            self.commands.push(Command::SortedSetAdd {
                key: Key::for_queue(entry.queue_name()),
                member: entry.id().to_string(),
                score: entry.score(),
            });
        }
        self
    }

    /// Put scored ids back on a queue, e.g. members taken off by a dequeue
    pub fn enqueue_members(&mut self, queue: &str, members: &[ScoredMember]) -> &mut Self {
        for member in members {
            self.commands.push(Command::SortedSetAdd {
                key: Key::for_queue(queue),
                member: member.member.clone(),
                score: member.score,
            });
        }
        self
    }

    /// Remove entry ids from their queues; absent ids are ignored
    pub fn remove_all_from_queue<'a, T, I>(&mut self, entries: I) -> &mut Self
    where
        T: QueuedEntry + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for entry in entries {
            self.commands.push(Command::SortedSetRemove {
                key: Key::for_queue(entry.queue_name()),
                member: entry.id().to_string(),
            });
        }
        self
    }

    /// Pop the `number` lowest-scored ids from a queue
    ///
    /// The length check and the pop execute in the same atomic batch as
    /// everything else in this transaction. Fails the commit with
    /// `InsufficientEntries` if the queue holds fewer than `number` ids, in
    /// which case nothing is removed. Read the ids with
    /// [`Committed::dequeued`].
    ///
    /// A `number` of zero or above the configured `max_dequeue` fails the
    /// commit with `InvalidOperation`.
    pub fn dequeue(&mut self, queue: &str, number: usize) -> DequeueTicket {
        let ticket = DequeueTicket {
            txn_id: self.txn_id,
            reply_index: self.commands.len(),
        };
        if number == 0 || number > self.settings.max_dequeue {
            self.defer(StoreError::invalid_operation(format!(
                "dequeue of {} from '{}' outside 1..={}",
                number, queue, self.settings.max_dequeue
            )));
            return ticket;
        }

        let key = Key::for_queue(queue);
        self.registry.attach(
            ConditionClass::QueueLength,
            key.as_str(),
            Condition::SortedSetLengthGreaterThan {
                key: key.clone(),
                length: number - 1,
            },
        );
        self.commands.push(Command::PopMin { key, count: number });
        ticket
    }

    // ========================================================================
    // Hashes
    // ========================================================================

    /// Create a hash with the given fields; it must have no fields yet
    ///
    /// Fails the commit with `AlreadyExists(hash)` otherwise.
    pub fn create_hash_with_entries<I, F, V>(&mut self, hash: impl Into<Key>, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        let key = hash.into();
        self.registry.attach(
            ConditionClass::MustNotExist,
            key.as_str(),
            Condition::HashLengthEqual {
                key: key.clone(),
                length: 0,
            },
        );
        let fields = fields
            .into_iter()
            .map(|(field, value)| (field.into(), value.into()))
            .collect();
        self.commands.push(Command::HashSet { key, fields });
        self
    }

    /// Set or clear hash fields without preconditions
    ///
    /// An empty value deletes the field; anything else sets it.
    pub fn update_hash_with_entries<I, F, V>(&mut self, hash: impl Into<Key>, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        let key = hash.into();
        for (field, value) in fields {
            let (field, value) = (field.into(), value.into());
            let command = if value.is_empty() {
                Command::HashDelete {
                    key: key.clone(),
                    field,
                }
            } else {
                Command::HashSet {
                    key: key.clone(),
                    fields: vec![(field, value)],
                }
            };
            self.commands.push(command);
        }
        self
    }

    /// Remove one hash field; both the hash and the field must exist
    pub fn delete_hash_entry(&mut self, hash: impl Into<Key>, field: &str) -> &mut Self {
        let key = hash.into();
        self.registry.attach(
            ConditionClass::MustExist,
            key.as_str(),
            Condition::KeyExists(key.clone()),
        );
        self.registry.attach(
            ConditionClass::MustExist,
            key.field_label(field),
            Condition::HashExists {
                key: key.clone(),
                field: field.to_string(),
            },
        );
        self.commands.push(Command::HashDelete {
            key,
            field: field.to_string(),
        });
        self
    }

    // ========================================================================
    // Pure preconditions
    // ========================================================================

    /// Require a list to be empty or absent; `AlreadyExists(list)` otherwise
    pub fn add_list_empty_condition(&mut self, list: impl Into<Key>) -> &mut Self {
        let key = list.into();
        self.registry.attach(
            ConditionClass::MustNotExist,
            key.as_str(),
            Condition::ListLengthEqual {
                key: key.clone(),
                length: 0,
            },
        );
        self
    }

    /// Require a hash to be empty or absent; `AlreadyExists(hash)` otherwise
    pub fn add_hash_empty_condition(&mut self, hash: impl Into<Key>) -> &mut Self {
        let key = hash.into();
        self.registry.attach(
            ConditionClass::MustNotExist,
            key.as_str(),
            Condition::HashLengthEqual {
                key: key.clone(),
                length: 0,
            },
        );
        self
    }

    /// Require a hash field to exist; `NotFound(hash:field)` otherwise
    pub fn add_hash_entry_exists_condition(&mut self, hash: impl Into<Key>, field: &str) -> &mut Self {
        let key = hash.into();
        self.registry.attach(
            ConditionClass::MustExist,
            key.field_label(field),
            Condition::HashExists {
                key,
                field: field.to_string(),
            },
        );
        self
    }

    /// Require a hash field to be absent; `AlreadyExists(hash:field)` otherwise
    pub fn add_hash_entry_not_exists_condition(
        &mut self,
        hash: impl Into<Key>,
        field: &str,
    ) -> &mut Self {
        let key = hash.into();
        self.registry.attach(
            ConditionClass::MustNotExist,
            key.field_label(field),
            Condition::HashNotExists {
                key,
                field: field.to_string(),
            },
        );
        self
    }

    /// Require a hash field to hold `value`
    ///
    /// Fails the commit with `FailedCondition("hash:field == value")`.
    pub fn add_hash_entry_equal_condition(
        &mut self,
        hash: impl Into<Key>,
        field: &str,
        value: &str,
    ) -> &mut Self {
        let key = hash.into();
        self.registry.attach(
            ConditionClass::ValueMatch,
            format!("{} == {}", key.field_label(field), value),
            Condition::HashEqual {
                key,
                field: field.to_string(),
                value: value.to_string(),
            },
        );
        self
    }

    /// Require a hash field to be absent or hold anything but `value`
    ///
    /// Fails the commit with `FailedCondition("hash:field != value")`.
    pub fn add_hash_entry_not_equal_condition(
        &mut self,
        hash: impl Into<Key>,
        field: &str,
        value: &str,
    ) -> &mut Self {
        let key = hash.into();
        self.registry.attach(
            ConditionClass::ValueMatch,
            format!("{} != {}", key.field_label(field), value),
            Condition::HashNotEqual {
                key,
                field: field.to_string(),
                value: value.to_string(),
            },
        );
        self
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Submit every staged command and condition as one atomic batch
    ///
    /// # Errors
    ///
    /// - `Transaction(failure)` if a precondition did not hold; nothing was
    ///   written. The failure kind follows the diagnosis order.
    /// - A deferred staging error (serialization, invalid dequeue count),
    ///   returned without contacting the store.
    /// - Backend errors (`WrongType`, `Backend`) unchanged.
    pub async fn commit(mut self) -> Result<Committed> {
        self.finished = true;
        let txn_id = self.txn_id;

        if let Some(error) = self.deferred.take() {
            tracing::debug!(txn_id, error = %error, "transaction not submitted");
            return Err(error);
        }
        if self.commands.is_empty() && self.registry.is_empty() {
            return Ok(Committed {
                txn_id,
                replies: Vec::new(),
            });
        }

        let batch = Batch::new(
            self.registry.take_conditions(),
            std::mem::take(&mut self.commands),
        );
        let started = Instant::now();
        let outcome = self.backend.execute(batch).await;
        let elapsed = started.elapsed();
        if elapsed > self.settings.slow_commit_threshold {
            tracing::warn!(
                txn_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow transaction commit"
            );
        }

        match outcome {
            Ok(BatchOutcome::Committed { replies }) => {
                tracing::debug!(txn_id, commands = replies.len(), "transaction committed");
                Ok(Committed { txn_id, replies })
            }
            Ok(BatchOutcome::Rejected { condition_results }) => {
                self.registry.record_outcomes(&condition_results);
                let failure = self.registry.diagnose();
                tracing::debug!(
                    txn_id,
                    kind = ?failure.kind,
                    key = ?failure.key,
                    "transaction rejected"
                );
                Err(failure.into())
            }
            Err(e) => {
                tracing::error!(txn_id, error = %e, "transaction commit failed");
                Err(e)
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished && !self.is_empty() {
            tracing::warn!(
                txn_id = self.txn_id,
                commands = self.commands.len(),
                conditions = self.registry.len(),
                "transaction dropped without commit, staged work discarded"
            );
        }
    }
}
