//! Entry model
//!
//! An [`Entry`] is a typed record persisted as one serialized string under
//! [`Key::of`]. When an entry is read from the store, the exact string that
//! was read is kept as its [`PreviousState`]; updates and deletes of that
//! instance only commit if the store still holds that same string.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::types::Key;

/// The serialized snapshot an entry was loaded from
///
/// Empty for entries that were constructed in memory and never read back.
/// Never serialized as part of the entry itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousState(Option<String>);

impl PreviousState {
    /// Snapshot of a freshly read entry
    pub fn captured(raw: impl Into<String>) -> Self {
        PreviousState(Some(raw.into()))
    }

    /// The raw snapshot, if one was captured
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Whether this entry was read from the store
    pub fn is_captured(&self) -> bool {
        self.0.is_some()
    }
}

/// A typed record stored under `<NAMESPACE>:<id>`
pub trait Entry: Serialize + DeserializeOwned + Send + Sync {
    /// Key namespace of this entry type; must not contain `:`
    const NAMESPACE: &'static str;

    /// Identity, unique within the type
    fn id(&self) -> &str;

    /// Snapshot captured when the entry was read
    fn previous_state(&self) -> &PreviousState;

    /// Mutable access to the captured snapshot
    fn previous_state_mut(&mut self) -> &mut PreviousState;

    /// Store key of this entry
    fn key(&self) -> Key
    where
        Self: Sized,
    {
        Key::of(self)
    }

    /// Serialize to the stored representation
    fn serialize_to_json(&self) -> Result<String>
    where
        Self: Sized,
    {
        Ok(serde_json::to_string(self)?)
    }
}

/// An entry that is also a member of a priority queue
///
/// Only the entry's id is stored in the queue; the entry itself is
/// persisted separately.
pub trait QueuedEntry: Entry {
    /// Name of the queue, without the queue namespace
    fn queue_name(&self) -> &str;

    /// Ordering key; lower scores are dequeued first
    fn score(&self) -> f64;
}

/// Deserialize a stored entry and stamp its previous state
pub fn decode_entry<T: Entry>(raw: String) -> Result<T> {
    let mut entry: T = serde_json::from_str(&raw)?;
    *entry.previous_state_mut() = PreviousState::captured(raw);
    Ok(entry)
}
