//! Store command vocabulary
//!
//! A [`Batch`] is what a transaction hands to the backend on commit: a list
//! of [`Condition`]s that must all hold, and a list of [`Command`]s that are
//! applied in order if they do. Backends execute a batch atomically and
//! report either the replies of every command or the outcome of every
//! condition.

use serde::{Deserialize, Serialize};

use crate::types::Key;

/// A server-evaluated precondition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Key is present (any type)
    KeyExists(Key),
    /// Key is absent
    KeyNotExists(Key),
    /// Key holds exactly this string
    StringEqual {
        /// Key of the string value
        key: Key,
        /// Expected contents
        value: String,
    },
    /// Hash has exactly this many fields (missing = 0)
    HashLengthEqual {
        /// Hash key
        key: Key,
        /// Expected field count
        length: usize,
    },
    /// List has exactly this many elements (missing = 0)
    ListLengthEqual {
        /// List key
        key: Key,
        /// Expected element count
        length: usize,
    },
    /// Sorted set has strictly more than this many members (missing = 0)
    SortedSetLengthGreaterThan {
        /// Sorted set key
        key: Key,
        /// Exclusive lower bound
        length: usize,
    },
    /// Hash field is present
    HashExists {
        /// Hash key
        key: Key,
        /// Field name
        field: String,
    },
    /// Hash field is absent
    HashNotExists {
        /// Hash key
        key: Key,
        /// Field name
        field: String,
    },
    /// Hash field holds exactly this value
    HashEqual {
        /// Hash key
        key: Key,
        /// Field name
        field: String,
        /// Expected value
        value: String,
    },
    /// Hash field is absent or holds another value
    HashNotEqual {
        /// Hash key
        key: Key,
        /// Field name
        field: String,
        /// Value the field must not hold
        value: String,
    },
}

impl Condition {
    /// The key this condition inspects
    pub fn key(&self) -> &Key {
        match self {
            Condition::KeyExists(key) | Condition::KeyNotExists(key) => key,
            Condition::StringEqual { key, .. }
            | Condition::HashLengthEqual { key, .. }
            | Condition::ListLengthEqual { key, .. }
            | Condition::SortedSetLengthGreaterThan { key, .. }
            | Condition::HashExists { key, .. }
            | Condition::HashNotExists { key, .. }
            | Condition::HashEqual { key, .. }
            | Condition::HashNotEqual { key, .. } => key,
        }
    }
}

/// A write applied when a batch commits
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set a string value, replacing whatever the key held
    StringSet {
        /// Target key
        key: Key,
        /// New contents
        value: String,
    },
    /// Remove a key of any type
    KeyDelete(Key),
    /// Add a member to a sorted set, or move it to a new score
    SortedSetAdd {
        /// Sorted set key
        key: Key,
        /// Member id
        member: String,
        /// Ordering score
        score: f64,
    },
    /// Remove a member from a sorted set
    SortedSetRemove {
        /// Sorted set key
        key: Key,
        /// Member id
        member: String,
    },
    /// Remove and return the `count` lowest-scored members, as one step
    PopMin {
        /// Sorted set key
        key: Key,
        /// Number of members to pop
        count: usize,
    },
    /// Set several hash fields
    HashSet {
        /// Hash key
        key: Key,
        /// Field/value pairs, applied in order
        fields: Vec<(String, String)>,
    },
    /// Remove a hash field
    HashDelete {
        /// Hash key
        key: Key,
        /// Field name
        field: String,
    },
}

impl Command {
    /// The key this command writes
    pub fn key(&self) -> &Key {
        match self {
            Command::KeyDelete(key) => key,
            Command::StringSet { key, .. }
            | Command::SortedSetAdd { key, .. }
            | Command::SortedSetRemove { key, .. }
            | Command::PopMin { key, .. }
            | Command::HashSet { key, .. }
            | Command::HashDelete { key, .. } => key,
        }
    }
}

/// A sorted set member with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    /// Member id
    pub member: String,
    /// Ordering score
    pub score: f64,
}

impl ScoredMember {
    /// Create a scored member
    pub fn new(member: impl Into<String>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Reply to one applied command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Write applied; nothing to return
    Done,
    /// Members removed by [`Command::PopMin`], lowest score first
    Popped(Vec<ScoredMember>),
}

/// Conditions plus commands, executed atomically
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Preconditions; all must hold for the commands to apply
    pub conditions: Vec<Condition>,
    /// Writes, applied in order
    pub commands: Vec<Command>,
}

impl Batch {
    /// Create a batch
    pub fn new(conditions: Vec<Condition>, commands: Vec<Command>) -> Self {
        Self {
            conditions,
            commands,
        }
    }

    /// Whether the batch has neither conditions nor commands
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.commands.is_empty()
    }
}

/// Result of executing a batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Every condition held; one reply per command, in order
    Committed {
        /// Command replies
        replies: Vec<Reply>,
    },
    /// At least one condition failed; nothing was applied
    Rejected {
        /// Whether each condition held, in order
        condition_results: Vec<bool>,
    },
}

impl BatchOutcome {
    /// Whether the batch was applied
    pub fn is_committed(&self) -> bool {
        matches!(self, BatchOutcome::Committed { .. })
    }
}
