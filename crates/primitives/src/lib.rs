//! Matchmaking primitives for matchstore
//!
//! Provides the matchmaking data model and stateless facades over a
//! [`StoreClient`](matchstore_concurrency::StoreClient):
//! - **Party / Member**: parties and the player-to-party mapping
//! - **PartyJoinRequest / PlayerJoinRequest**: queued matchmaking requests
//! - **Parties**: create, join and leave parties
//! - **Gateway**: join matchmaking, pop waiting parties, assign deployments
//! - **DeploymentMetadata**: per-deployment metadata hashes
//!
//! ## Design Principle: Stateless Facades
//!
//! Facades hold only a client. All state lives in the store and every write
//! goes through one transaction, so any number of replicas may run the same
//! flows against the same store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod gateway;
pub mod join_request;
pub mod metadata;
pub mod parties;
pub mod party;

pub use error::{commit_error, GatewayError, Result};
pub use gateway::{Assignment, AssignmentResult, Gateway, MATCHING_UPDATE_ATTEMPTS};
pub use join_request::{MatchState, PartyJoinRequest, PlayerJoinRequest};
pub use metadata::{DeploymentMetadata, EntryPrecondition, DEPLOYMENT_NAMESPACE};
pub use parties::Parties;
pub use party::{Member, Party, Phase};
