//! Key encoding
//!
//! Every value in the store lives under a string key:
//! - entries: `<type-namespace>:<id>`
//! - queues: `queue:<name>`
//! - hashes and lists: whatever key the caller chooses
//!
//! Derivation is pure: the same type and id always produce the same key,
//! and because namespaces never contain the separator, keys of different
//! entry types never collide.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::entry::Entry;

/// Separator between namespace and id
pub const KEY_SEPARATOR: char = ':';

/// Namespace of queue keys
pub const QUEUE_NAMESPACE: &str = "queue";

/// A store key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(String);

impl Key {
    /// Key of the entry of type `T` with the given id
    pub fn for_entry<T: Entry>(id: &str) -> Self {
        Self::compose(T::NAMESPACE, id)
    }

    /// Key of the given entry
    pub fn of<T: Entry>(entry: &T) -> Self {
        Self::for_entry::<T>(entry.id())
    }

    /// Key of the queue with the given name
    pub fn for_queue(name: &str) -> Self {
        Self::compose(QUEUE_NAMESPACE, name)
    }

    /// Wrap a caller-chosen key verbatim
    pub fn raw(key: impl Into<String>) -> Self {
        Key(key.into())
    }

    fn compose(namespace: &str, id: &str) -> Self {
        debug_assert!(
            !namespace.contains(KEY_SEPARATOR),
            "namespace {namespace:?} must not contain the key separator"
        );
        let mut key = String::with_capacity(namespace.len() + 1 + id.len());
        key.push_str(namespace);
        key.push(KEY_SEPARATOR);
        key.push_str(id);
        Key(key)
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace part, if the key has one
    pub fn namespace(&self) -> Option<&str> {
        self.0.split_once(KEY_SEPARATOR).map(|(ns, _)| ns)
    }

    /// Suffix a field name, producing the diagnostic label of a hash field
    pub fn field_label(&self, field: &str) -> String {
        format!("{}{}{}", self.0, KEY_SEPARATOR, field)
    }

    /// Consume the key, returning the owned string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key(key.to_string())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key(key)
    }
}

impl From<&String> for Key {
    fn from(key: &String) -> Self {
        Key(key.clone())
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}
