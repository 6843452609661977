//! Gateway: matchmaking queue flows
//!
//! ## Flow
//!
//! 1. A party leader calls [`Gateway::join`]; the party moves to
//!    `Matchmaking` and its join request enters the queue named after the
//!    matchmaking type.
//! 2. A matcher calls [`Gateway::pop_waiting_parties`] to take the oldest
//!    requests off the queue; every member's request becomes `Matching`.
//! 3. The matcher reports back through [`Gateway::assign_deployments`].
//! 4. Players poll [`Gateway::get_join_status`]; a finished request is
//!    removed once it has been observed.
//!
//! Every step that writes runs in one transaction, so a party is never half
//! queued or half assigned.

use std::collections::BTreeMap;

use matchstore_concurrency::StoreClient;
use matchstore_core::{FailureKind, ScoredMember};

use crate::error::{commit_error, GatewayError, Result};
use crate::join_request::{MatchState, PartyJoinRequest, PlayerJoinRequest};
use crate::party::{Member, Party, Phase};

/// Times `pop_waiting_parties` tries to move popped members to `Matching`
pub const MATCHING_UPDATE_ATTEMPTS: usize = 3;

/// What a matcher decided for one party
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentResult {
    /// Party was placed in a deployment
    Matched {
        /// Deployment id
        deployment_id: String,
        /// Deployment name
        deployment_name: String,
    },
    /// No deployment available; put the party back in the queue
    Requeued,
    /// Matching failed; return the party to `Forming`
    Error,
}

/// A matcher's decision for one popped party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Id of the popped party
    pub party_id: String,
    /// Outcome
    pub result: AssignmentResult,
}

impl Assignment {
    /// Create an assignment
    pub fn new(party_id: impl Into<String>, result: AssignmentResult) -> Self {
        Self {
            party_id: party_id.into(),
            result,
        }
    }
}

/// Matchmaking facade over a store client
///
/// Stateless: holds only the client, so any number of gateways on the same
/// store are safe.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: StoreClient,
}

impl Gateway {
    /// Create a gateway
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Underlying client
    pub fn client(&self) -> &StoreClient {
        &self.client
    }

    /// Queue the caller's party for matchmaking
    ///
    /// # Errors
    ///
    /// - `NotFound` if the player is in no party
    /// - `PermissionDenied` if the player does not lead the party
    /// - `FailedPrecondition` if the party is too small
    /// - `AlreadyQueued` if the party or a member already has a join request
    /// - `Unavailable` if the party changed concurrently; safe to retry
    pub async fn join(
        &self,
        player_id: &str,
        matchmaking_type: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<PartyJoinRequest> {
        let mut party = self.party_for_member(player_id).await?.ok_or_else(|| {
            tracing::info!(player_id, "player is not a member of any party");
            GatewayError::NotFound("player is not a member of any party".to_string())
        })?;

        if party.leader_player_id != player_id {
            return Err(GatewayError::PermissionDenied(
                "only the leader can start matchmaking".to_string(),
            ));
        }
        if !party.sufficient_members() {
            return Err(GatewayError::FailedPrecondition(
                "there are not enough members in the party to start matchmaking".to_string(),
            ));
        }

        party.current_phase = Phase::Matchmaking;
        let player_requests = PlayerJoinRequest::for_members(&party, matchmaking_type, &metadata);
        let party_request = PartyJoinRequest::new(party.clone(), matchmaking_type, metadata);

        self.client
            .transact(|tx| {
                tx.update_all([&party])
                    .create_all([&party_request])
                    .create_all(&player_requests)
                    .enqueue_all([&party_request]);
            })
            .await
            .map_err(|e| {
                commit_error("join", e, |key| {
                    tracing::info!(key = %key, "party already queued");
                    GatewayError::AlreadyQueued(key)
                })
            })?;

        tracing::info!(
            party_id = %party.id,
            matchmaking_type,
            members = party.member_count(),
            "created party join request"
        );
        Ok(party_request)
    }

    /// Take the `num_parties` oldest join requests off a queue
    ///
    /// Members' requests that change between the dequeue and their update
    /// are reloaded, up to [`MATCHING_UPDATE_ATTEMPTS`] times. If the update
    /// still cannot commit, the popped ids go back on the queue with their
    /// original scores before the error is returned.
    ///
    /// # Errors
    ///
    /// - `ResourceExhausted` if fewer than `num_parties` parties are waiting;
    ///   the queue is left unchanged
    /// - `Unavailable` if members kept changing; the parties are queued again
    pub async fn pop_waiting_parties(
        &self,
        matchmaking_type: &str,
        num_parties: usize,
    ) -> Result<Vec<PartyJoinRequest>> {
        if num_parties == 0 {
            return Err(GatewayError::InvalidArgument(
                "must request at least one party".to_string(),
            ));
        }

        let mut tx = self.client.create_transaction();
        let ticket = tx.dequeue(matchmaking_type, num_parties);
        let committed = tx.commit().await.map_err(|e| {
            commit_error("pop_waiting_parties", e, GatewayError::AlreadyExists)
        })?;
        let dequeued = committed.dequeued_members(ticket);

        match self.mark_matching(dequeued).await {
            Ok(popped) => {
                tracing::info!(matchmaking_type, parties = popped.len(), "popped waiting parties");
                Ok(popped)
            }
            Err(err) => {
                self.requeue(matchmaking_type, dequeued).await;
                Err(err)
            }
        }
    }

    /// Load the popped parties' requests and set their members to `Matching`
    async fn mark_matching(&self, dequeued: &[ScoredMember]) -> Result<Vec<PartyJoinRequest>> {
        let mut popped = Vec::with_capacity(dequeued.len());
        for scored in dequeued {
            match self.client.get::<PartyJoinRequest>(&scored.member).await? {
                Some(request) => popped.push(request),
                None => tracing::warn!(party_id = %scored.member, "queued party has no join request"),
            }
        }

        let mut attempt = 1;
        loop {
            let mut to_update = Vec::new();
            for request in &popped {
                for player_id in request.party.member_id_to_pit.keys() {
                    match self.client.get::<PlayerJoinRequest>(player_id).await? {
                        Some(mut player_request) => {
                            player_request.state = MatchState::Matching;
                            to_update.push(player_request);
                        }
                        None => {
                            tracing::warn!(player_id = %player_id, "member has no join request");
                        }
                    }
                }
            }

            let result = self
                .client
                .transact(|tx| {
                    tx.update_all(&to_update);
                })
                .await;
            match result {
                Ok(_) => return Ok(popped),
                Err(e)
                    if attempt < MATCHING_UPDATE_ATTEMPTS
                        && (e.is(FailureKind::Aborted) || e.is(FailureKind::NotFound)) =>
                {
                    tracing::debug!(attempt, "member requests changed while popping; reloading");
                    attempt += 1;
                }
                Err(e) => {
                    return Err(commit_error("pop_waiting_parties", e, GatewayError::AlreadyExists))
                }
            }
        }
    }

    async fn requeue(&self, matchmaking_type: &str, dequeued: &[ScoredMember]) {
        let result = self
            .client
            .transact(|tx| {
                tx.enqueue_members(matchmaking_type, dequeued);
            })
            .await;
        match result {
            Ok(_) => tracing::warn!(
                matchmaking_type,
                parties = dequeued.len(),
                "returned popped parties to the queue"
            ),
            Err(e) => tracing::error!(
                matchmaking_type,
                parties = dequeued.len(),
                error = %e,
                "failed to return popped parties to the queue"
            ),
        }
    }

    /// Apply a matcher's decisions, one transaction per party
    ///
    /// Stops at the first failing assignment; earlier ones stay applied.
    pub async fn assign_deployments(&self, assignments: &[Assignment]) -> Result<()> {
        for assignment in assignments {
            self.assign(assignment).await?;
        }
        Ok(())
    }

    async fn assign(&self, assignment: &Assignment) -> Result<()> {
        let party_id = assignment.party_id.as_str();
        let party_request = self
            .client
            .get::<PartyJoinRequest>(party_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("join request for party {}", party_id)))?;
        let mut party = self
            .client
            .get::<Party>(party_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("party {}", party_id)))?;

        let mut player_requests = Vec::with_capacity(party.member_count());
        for player_id in party_request.party.member_id_to_pit.keys() {
            if let Some(request) = self.client.get::<PlayerJoinRequest>(player_id).await? {
                player_requests.push(request);
            }
        }

        let mut tx = self.client.create_transaction();
        match &assignment.result {
            AssignmentResult::Matched {
                deployment_id,
                deployment_name,
            } => {
                for request in &mut player_requests {
                    request.assign_match(deployment_id, deployment_name);
                }
                party.current_phase = Phase::InGame;
                tx.update_all(&player_requests)
                    .update_all([&party])
                    .delete_all([&party_request]);
            }
            AssignmentResult::Requeued => {
                for request in &mut player_requests {
                    request.state = MatchState::Requested;
                }
                tx.update_all(&player_requests)
                    .enqueue_all([&party_request]);
            }
            AssignmentResult::Error => {
                for request in &mut player_requests {
                    request.state = MatchState::Error;
                }
                party.current_phase = Phase::Forming;
                tx.update_all(&player_requests)
                    .update_all([&party])
                    .delete_all([&party_request]);
            }
        }
        tx.commit()
            .await
            .map_err(|e| commit_error("assign_deployments", e, GatewayError::AlreadyExists))?;

        tracing::info!(party_id, result = ?assignment.result, "assigned party");
        Ok(())
    }

    /// A player's join request
    ///
    /// A `Matched` or `Error` request is deleted once returned, so the next
    /// call reports `NotFound`.
    pub async fn get_join_status(&self, player_id: &str) -> Result<PlayerJoinRequest> {
        let request = self
            .client
            .get::<PlayerJoinRequest>(player_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("join request for player {}", player_id)))?;

        if request.state.is_terminal() {
            self.client
                .transact(|tx| {
                    tx.delete_all([&request]);
                })
                .await
                .map_err(|e| commit_error("get_join_status", e, GatewayError::AlreadyExists))?;
            tracing::debug!(player_id, state = ?request.state, "join request consumed");
        }
        Ok(request)
    }

    async fn party_for_member(&self, player_id: &str) -> Result<Option<Party>> {
        let Some(member) = self.client.get::<Member>(player_id).await? else {
            return Ok(None);
        };
        Ok(self.client.get::<Party>(&member.party_id).await?)
    }
}
