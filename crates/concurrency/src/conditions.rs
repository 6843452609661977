//! Condition bookkeeping and commit-failure diagnosis
//!
//! Every condition a transaction attaches is recorded here together with
//! the class of failure it stands for and a diagnostic label. When the
//! store rejects a commit it reports which conditions held; the registry
//! then picks the single most specific failure to surface.
//!
//! # Diagnosis order
//!
//! 1. `QueueLength` unsatisfied -> InsufficientEntries
//! 2. `MustNotExist` unsatisfied -> AlreadyExists(label)
//! 3. `MustExist` unsatisfied -> EntryNotFound(label)
//! 4. `ValueMatch` unsatisfied -> FailedCondition(label)
//! 5. otherwise -> Aborted
//!
//! `Snapshot` conditions (the previous-state comparison of updates and
//! deletes) are never blamed individually: a stale snapshot of an existing
//! entry surfaces as Aborted. Within a class, the first registered
//! unsatisfied condition wins.

use matchstore_core::{Condition, FailureKind, TransactionFailure};

/// What an unsatisfied condition means for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionClass {
    /// A dequeue's minimum queue length
    QueueLength,
    /// Target must be absent or empty
    MustNotExist,
    /// Target must be present
    MustExist,
    /// A named hash-value comparison
    ValueMatch,
    /// An entry must still hold its captured previous state
    Snapshot,
}

impl ConditionClass {
    /// Diagnosis precedence, most specific first
    const PRECEDENCE: [ConditionClass; 4] = [
        ConditionClass::QueueLength,
        ConditionClass::MustNotExist,
        ConditionClass::MustExist,
        ConditionClass::ValueMatch,
    ];

    /// Failure kind reported when a condition of this class fails
    pub fn failure_kind(self) -> FailureKind {
        match self {
            ConditionClass::QueueLength => FailureKind::InsufficientEntries,
            ConditionClass::MustNotExist => FailureKind::AlreadyExists,
            ConditionClass::MustExist => FailureKind::NotFound,
            ConditionClass::ValueMatch => FailureKind::FailedCondition,
            ConditionClass::Snapshot => FailureKind::Aborted,
        }
    }
}

/// One attached condition and, after a commit attempt, its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionRecord {
    /// Diagnostic label
    pub label: String,
    /// Failure class
    pub class: ConditionClass,
    /// Whether the condition held; `None` until the commit attempt completes
    pub satisfied: Option<bool>,
}

/// Ordered list of the conditions attached to one transaction
#[derive(Debug, Default)]
pub struct ConditionRegistry {
    records: Vec<ConditionRecord>,
    conditions: Vec<Condition>,
}

impl ConditionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a condition
    pub fn attach(&mut self, class: ConditionClass, label: impl Into<String>, condition: Condition) {
        self.records.push(ConditionRecord {
            label: label.into(),
            class,
            satisfied: None,
        });
        self.conditions.push(condition);
    }

    /// Number of attached conditions
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no conditions are attached
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Recorded conditions, in attach order
    pub fn records(&self) -> &[ConditionRecord] {
        &self.records
    }

    /// Take the conditions to send to the store, keeping the records
    pub fn take_conditions(&mut self) -> Vec<Condition> {
        std::mem::take(&mut self.conditions)
    }

    /// Fill in outcomes reported by the store, in attach order
    ///
    /// Missing trailing outcomes leave their records unresolved.
    pub fn record_outcomes(&mut self, outcomes: &[bool]) {
        for (record, held) in self.records.iter_mut().zip(outcomes) {
            record.satisfied = Some(*held);
        }
    }

    /// Pick the failure to report for a rejected commit
    pub fn diagnose(&self) -> TransactionFailure {
        for class in ConditionClass::PRECEDENCE {
            let failed = self
                .records
                .iter()
                .find(|record| record.class == class && record.satisfied == Some(false));
            if let Some(record) = failed {
                return TransactionFailure::new(class.failure_kind(), Some(record.label.clone()));
            }
        }
        TransactionFailure::aborted()
    }
}
