//! Matchmaking join requests
//!
//! Joining matchmaking writes one [`PartyJoinRequest`] (the entry that sits
//! in the queue) and one [`PlayerJoinRequest`] per member (what each player
//! polls for their match status).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use matchstore_core::{Entry, PreviousState, QueuedEntry};

use crate::party::Party;

/// A party waiting in a matchmaking queue
///
/// Keyed by the party id and queued under its matchmaking type, scored by
/// the time it was queued so older requests are matched first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyJoinRequest {
    /// Party id
    pub id: String,
    /// Snapshot of the party when it joined
    pub party: Party,
    /// Matchmaking type, which is also the queue name
    pub matchmaking_type: String,
    /// Caller-supplied matchmaking metadata
    pub metadata: BTreeMap<String, String>,
    /// Queue time in milliseconds since the Unix epoch
    pub score: f64,
    #[serde(skip)]
    previous_state: PreviousState,
}

impl PartyJoinRequest {
    /// Create a request scored with the current time
    pub fn new(
        party: Party,
        matchmaking_type: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self::with_score(
            party,
            matchmaking_type,
            metadata,
            Utc::now().timestamp_millis() as f64,
        )
    }

    /// Create a request with an explicit score
    pub fn with_score(
        party: Party,
        matchmaking_type: impl Into<String>,
        metadata: BTreeMap<String, String>,
        score: f64,
    ) -> Self {
        Self {
            id: party.id.clone(),
            party,
            matchmaking_type: matchmaking_type.into(),
            metadata,
            score,
            previous_state: PreviousState::default(),
        }
    }
}

impl Entry for PartyJoinRequest {
    const NAMESPACE: &'static str = "party_join_request";

    fn id(&self) -> &str {
        &self.id
    }

    fn previous_state(&self) -> &PreviousState {
        &self.previous_state
    }

    fn previous_state_mut(&mut self) -> &mut PreviousState {
        &mut self.previous_state
    }
}

impl QueuedEntry for PartyJoinRequest {
    fn queue_name(&self) -> &str {
        &self.matchmaking_type
    }

    fn score(&self) -> f64 {
        self.score
    }
}

/// Where a player's join request stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchState {
    /// Queued, not yet picked by a matcher
    #[default]
    Requested,
    /// Picked by a matcher, waiting for a deployment
    Matching,
    /// Assigned to a deployment
    Matched,
    /// Matching failed
    Error,
}

impl MatchState {
    /// Whether the request has reached a final state
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchState::Matched | MatchState::Error)
    }
}

/// One player's view of a party's join request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoinRequest {
    /// Player id
    pub id: String,
    /// Player identity token
    pub player_identity_token: String,
    /// Matchmaking type
    pub matchmaking_type: String,
    /// Matchmaking metadata copied from the party request
    pub metadata: BTreeMap<String, String>,
    /// Current state
    pub state: MatchState,
    /// Assigned deployment id, once matched
    pub deployment_id: Option<String>,
    /// Assigned deployment name, once matched
    pub deployment_name: Option<String>,
    #[serde(skip)]
    previous_state: PreviousState,
}

impl PlayerJoinRequest {
    /// Create a request in the `Requested` state
    pub fn new(
        player_id: impl Into<String>,
        player_identity_token: impl Into<String>,
        matchmaking_type: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: player_id.into(),
            player_identity_token: player_identity_token.into(),
            matchmaking_type: matchmaking_type.into(),
            metadata,
            state: MatchState::Requested,
            deployment_id: None,
            deployment_name: None,
            previous_state: PreviousState::default(),
        }
    }

    /// One request per member of the party
    pub fn for_members(
        party: &Party,
        matchmaking_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Vec<Self> {
        party
            .member_id_to_pit
            .iter()
            .map(|(player_id, pit)| Self::new(player_id, pit, matchmaking_type, metadata.clone()))
            .collect()
    }

    /// Mark as matched to a deployment
    pub fn assign_match(&mut self, deployment_id: impl Into<String>, deployment_name: impl Into<String>) {
        self.state = MatchState::Matched;
        self.deployment_id = Some(deployment_id.into());
        self.deployment_name = Some(deployment_name.into());
    }
}

impl Entry for PlayerJoinRequest {
    const NAMESPACE: &'static str = "player_join_request";

    fn id(&self) -> &str {
        &self.id
    }

    fn previous_state(&self) -> &PreviousState {
        &self.previous_state
    }

    fn previous_state_mut(&mut self) -> &mut PreviousState {
        &mut self.previous_state
    }
}
