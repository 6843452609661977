//! Common imports
//!
//! ```ignore
//! use matchstore::prelude::*;
//! ```

pub use matchstore_concurrency::{
    ClientManager, Committed, DequeueTicket, StoreClient, StoreConfig, Transaction,
};
pub use matchstore_core::{
    Entry, FailureKind, Key, PreviousState, QueuedEntry, StoreBackend, StoreError,
};
pub use matchstore_primitives::{
    Assignment, AssignmentResult, DeploymentMetadata, EntryPrecondition, Gateway, GatewayError,
    MatchState, Parties, Party, PartyJoinRequest, Phase, PlayerJoinRequest,
};
pub use matchstore_storage::MemoryStore;
