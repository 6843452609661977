//! Matchmaking flow tests for matchstore-primitives
//!
//! End-to-end flows against a `MemoryStore`:
//!
//! 1. **Parties** - create, join, leave
//! 2. **Join** - queueing a party and the checks before it
//! 3. **Matching** - pop, assign, poll status
//! 4. **Metadata** - deployment metadata with conditional writes
//! 5. **Concurrency** - racing joins and pops
//! 6. **Interrupted pops** - member requests rewritten between dequeue and update

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use matchstore_concurrency::StoreClient;
use matchstore_core::{
    Batch, BatchOutcome, Command, Entry, Key, Result as StoreResult, ScoredMember, StoreBackend,
};
use matchstore_primitives::{
    Assignment, AssignmentResult, DeploymentMetadata, EntryPrecondition, Gateway, GatewayError,
    MatchState, Parties, Party, PartyJoinRequest, Phase, PlayerJoinRequest,
    MATCHING_UPDATE_ATTEMPTS,
};
use matchstore_storage::MemoryStore;

// ============================================================================
// Test Helpers
// ============================================================================

struct Env {
    client: StoreClient,
    parties: Parties,
    gateway: Gateway,
}

fn env() -> Env {
    env_on(Arc::new(MemoryStore::new()))
}

fn env_on(backend: Arc<dyn StoreBackend>) -> Env {
    let client = StoreClient::new(backend);
    Env {
        parties: Parties::new(client.clone()),
        gateway: Gateway::new(client.clone()),
        client,
    }
}

fn metadata(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Party led by `leader` with the given extra members
async fn party_with(env: &Env, leader: &str, others: &[&str]) -> Party {
    let mut party = env
        .parties
        .create_party(leader, &format!("{leader}-pit"), 1, 8)
        .await
        .unwrap();
    for player in others {
        party = env
            .parties
            .join_party(player, &format!("{player}-pit"), &party.id)
            .await
            .unwrap();
    }
    party
}

async fn status(env: &Env, player: &str) -> Option<MatchState> {
    env.client
        .get::<PlayerJoinRequest>(player)
        .await
        .unwrap()
        .map(|r| r.state)
}

// ============================================================================
// Parties
// ============================================================================

mod parties {
    use super::*;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let env = env();
        let party = party_with(&env, "alice", &["bob"]).await;

        let found = env.parties.get_party_by_player("bob").await.unwrap().unwrap();
        assert_eq!(found.id, party.id);
        assert_eq!(found.member_count(), 2);
    }

    #[tokio::test]
    async fn test_player_in_one_party_only() {
        let env = env();
        party_with(&env, "alice", &[]).await;
        let other = party_with(&env, "carol", &[]).await;

        let err = env.parties.create_party("alice", "pit", 1, 4).await.unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyExists(_)));

        let err = env
            .parties
            .join_party("alice", "alice-pit", &other.id)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyExists(_)));
        // The failed join left the other party untouched
        let other = env.client.get::<Party>(&other.id).await.unwrap().unwrap();
        assert_eq!(other.member_count(), 1);
    }

    #[tokio::test]
    async fn test_full_party() {
        let env = env();
        let party = env.parties.create_party("alice", "pit", 1, 1).await.unwrap();
        let err = env.parties.join_party("bob", "pit", &party.id).await.unwrap_err();
        assert!(matches!(err, GatewayError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_leave_hands_over_leadership_then_deletes() {
        let env = env();
        let party = party_with(&env, "alice", &["bob"]).await;

        env.parties.leave_party("alice").await.unwrap();
        let party = env.client.get::<Party>(&party.id).await.unwrap().unwrap();
        assert_eq!(party.leader_player_id, "bob");
        assert!(env.parties.get_party_by_player("alice").await.unwrap().is_none());

        env.parties.leave_party("bob").await.unwrap();
        assert!(env.client.get::<Party>(&party.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_leave_without_party() {
        let env = env();
        assert!(matches!(
            env.parties.leave_party("nobody").await,
            Err(GatewayError::NotFound(_))
        ));
    }
}

// ============================================================================
// Join
// ============================================================================

mod join {
    use super::*;

    #[tokio::test]
    async fn test_join_queues_party_and_members() {
        let env = env();
        let party = party_with(&env, "alice", &["bob"]).await;

        let request = env
            .gateway
            .join("alice", "ranked", metadata(&[("region", "eu")]))
            .await
            .unwrap();

        assert_eq!(request.id, party.id);
        let queued = env.client.queue_members("ranked").await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].member, party.id);
        assert_eq!(queued[0].score, request.score);

        let stored = env.client.get::<Party>(&party.id).await.unwrap().unwrap();
        assert_eq!(stored.current_phase, Phase::Matchmaking);
        assert_eq!(status(&env, "alice").await, Some(MatchState::Requested));
        assert_eq!(status(&env, "bob").await, Some(MatchState::Requested));

        let bob = env.client.get::<PlayerJoinRequest>("bob").await.unwrap().unwrap();
        assert_eq!(bob.player_identity_token, "bob-pit");
        assert_eq!(bob.metadata["region"], "eu");
    }

    #[tokio::test]
    async fn test_join_twice_is_already_queued() {
        let env = env();
        party_with(&env, "alice", &[]).await;
        env.gateway.join("alice", "ranked", BTreeMap::new()).await.unwrap();

        let err = env
            .gateway
            .join("alice", "ranked", BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyQueued(_)));
        assert_eq!(env.client.queue_length("ranked").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_join_without_party() {
        let env = env();
        let err = env.gateway.join("ghost", "ranked", BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_only_leader_may_join() {
        let env = env();
        party_with(&env, "alice", &["bob"]).await;
        let err = env.gateway.join("bob", "ranked", BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_party_too_small() {
        let env = env();
        env.parties.create_party("alice", "pit", 2, 4).await.unwrap();
        let err = env.gateway.join("alice", "ranked", BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::FailedPrecondition(_)));
        assert_eq!(env.client.queue_length("ranked").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_member_with_pending_request_blocks_join() {
        let env = env();
        party_with(&env, "alice", &["bob"]).await;
        let stray = PlayerJoinRequest::new("bob", "bob-pit", "casual", BTreeMap::new());
        env.client
            .transact(|tx| {
                tx.create_all([&stray]);
            })
            .await
            .unwrap();

        let err = env.gateway.join("alice", "ranked", BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyQueued(key) if key == "player_join_request:bob"));
        // Nothing from the failed join is visible
        assert_eq!(env.client.queue_length("ranked").await.unwrap(), 0);
        assert_eq!(status(&env, "alice").await, None);
    }
}

// ============================================================================
// Matching
// ============================================================================

mod matching {
    use super::*;

    async fn queued_party(env: &Env, leader: &str, others: &[&str]) -> PartyJoinRequest {
        party_with(env, leader, others).await;
        env.gateway.join(leader, "ranked", BTreeMap::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_pop_oldest_first_and_mark_matching() {
        let env = env();
        let first = queued_party(&env, "alice", &["bob"]).await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = queued_party(&env, "carol", &[]).await;

        let popped = env.gateway.pop_waiting_parties("ranked", 1).await.unwrap();
        assert_eq!(popped.len(), 1);
        assert_eq!(popped[0].id, first.id);
        assert_eq!(status(&env, "alice").await, Some(MatchState::Matching));
        assert_eq!(status(&env, "bob").await, Some(MatchState::Matching));
        assert_eq!(status(&env, "carol").await, Some(MatchState::Requested));

        let rest = env.client.queue_members("ranked").await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].member, second.id);
    }

    #[tokio::test]
    async fn test_pop_more_than_waiting_is_exhausted() {
        let env = env();
        queued_party(&env, "alice", &[]).await;

        let err = env.gateway.pop_waiting_parties("ranked", 2).await.unwrap_err();
        assert!(matches!(err, GatewayError::ResourceExhausted(_)));
        assert!(err.is_retryable());
        assert_eq!(env.client.queue_length("ranked").await.unwrap(), 1);
        assert_eq!(status(&env, "alice").await, Some(MatchState::Requested));
    }

    #[tokio::test]
    async fn test_pop_zero_is_invalid() {
        let env = env();
        assert!(matches!(
            env.gateway.pop_waiting_parties("ranked", 0).await,
            Err(GatewayError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_matched_assignment() {
        let env = env();
        let request = queued_party(&env, "alice", &["bob"]).await;
        env.gateway.pop_waiting_parties("ranked", 1).await.unwrap();

        env.gateway
            .assign_deployments(&[Assignment::new(
                &request.id,
                AssignmentResult::Matched {
                    deployment_id: "dpl-7".to_string(),
                    deployment_name: "arena-7".to_string(),
                },
            )])
            .await
            .unwrap();

        let party = env.client.get::<Party>(&request.id).await.unwrap().unwrap();
        assert_eq!(party.current_phase, Phase::InGame);
        assert!(env
            .client
            .get::<PartyJoinRequest>(&request.id)
            .await
            .unwrap()
            .is_none());

        let bob = env.gateway.get_join_status("bob").await.unwrap();
        assert_eq!(bob.state, MatchState::Matched);
        assert_eq!(bob.deployment_id.as_deref(), Some("dpl-7"));
        assert_eq!(bob.deployment_name.as_deref(), Some("arena-7"));

        // Observed once, then gone
        assert!(matches!(
            env.gateway.get_join_status("bob").await,
            Err(GatewayError::NotFound(_))
        ));
        assert_eq!(status(&env, "alice").await, Some(MatchState::Matched));
    }

    #[tokio::test]
    async fn test_requeued_assignment_keeps_original_score() {
        let env = env();
        let request = queued_party(&env, "alice", &[]).await;
        env.gateway.pop_waiting_parties("ranked", 1).await.unwrap();
        assert_eq!(env.client.queue_length("ranked").await.unwrap(), 0);

        env.gateway
            .assign_deployments(&[Assignment::new(&request.id, AssignmentResult::Requeued)])
            .await
            .unwrap();

        let queued = env.client.queue_members("ranked").await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].score, request.score);
        assert_eq!(status(&env, "alice").await, Some(MatchState::Requested));

        let party = env.client.get::<Party>(&request.id).await.unwrap().unwrap();
        assert_eq!(party.current_phase, Phase::Matchmaking);
    }

    #[tokio::test]
    async fn test_error_assignment_returns_party_to_forming() {
        let env = env();
        let request = queued_party(&env, "alice", &["bob"]).await;
        env.gateway.pop_waiting_parties("ranked", 1).await.unwrap();

        env.gateway
            .assign_deployments(&[Assignment::new(&request.id, AssignmentResult::Error)])
            .await
            .unwrap();

        let party = env.client.get::<Party>(&request.id).await.unwrap().unwrap();
        assert_eq!(party.current_phase, Phase::Forming);
        let alice = env.gateway.get_join_status("alice").await.unwrap();
        assert_eq!(alice.state, MatchState::Error);

        // A forming party may queue again once every error was observed
        env.gateway.get_join_status("bob").await.unwrap();
        env.gateway.join("alice", "ranked", BTreeMap::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_of_pending_request_is_kept() {
        let env = env();
        queued_party(&env, "alice", &[]).await;

        let alice = env.gateway.get_join_status("alice").await.unwrap();
        assert_eq!(alice.state, MatchState::Requested);
        assert_eq!(status(&env, "alice").await, Some(MatchState::Requested));
    }

    #[tokio::test]
    async fn test_assign_unknown_party() {
        let env = env();
        let err = env
            .gateway
            .assign_deployments(&[Assignment::new("nope", AssignmentResult::Requeued)])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }
}

// ============================================================================
// Metadata
// ============================================================================

mod deployment_metadata {
    use super::*;

    fn facade(env: &Env) -> DeploymentMetadata {
        DeploymentMetadata::new(env.client.clone())
    }

    #[tokio::test]
    async fn test_set_once() {
        let env = env();
        let meta = facade(&env);
        meta.set_metadata("42", metadata(&[("status", "Ready")])).await.unwrap();

        let err = meta
            .set_metadata("42", metadata(&[("status", "Ready")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyExists(key) if key == "deployment:42"));
        assert_eq!(meta.get_metadata("42").await.unwrap()["status"], "Ready");
    }

    #[tokio::test]
    async fn test_update_sets_and_clears() {
        let env = env();
        let meta = facade(&env);
        meta.set_metadata("1", metadata(&[("a", "1"), ("b", "2")])).await.unwrap();
        meta.update_metadata("1", metadata(&[("a", ""), ("c", "3")])).await.unwrap();

        assert_eq!(
            meta.get_metadata("1").await.unwrap(),
            metadata(&[("b", "2"), ("c", "3")])
        );
    }

    #[tokio::test]
    async fn test_conditional_entry_write() {
        let env = env();
        let meta = facade(&env);
        meta.set_metadata("1", metadata(&[("status", "Ready")])).await.unwrap();

        meta.set_metadata_entry(
            "1",
            "status",
            "InUse",
            EntryPrecondition::Equals("Ready".to_string()),
        )
        .await
        .unwrap();

        // A second claimer sees the changed value
        let err = meta
            .set_metadata_entry(
                "1",
                "status",
                "InUse",
                EntryPrecondition::Equals("Ready".to_string()),
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, GatewayError::FailedPrecondition(key) if key == "deployment:1:status == Ready")
        );

        let err = meta
            .set_metadata_entry("1", "status", "x", EntryPrecondition::Absent)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyExists(_)));

        meta.set_metadata_entry("1", "owner", "pool-a", EntryPrecondition::Absent)
            .await
            .unwrap();
        assert_eq!(meta.get_metadata_entry("1", "owner").await.unwrap(), "pool-a");
        assert_eq!(meta.get_metadata_entry("1", "status").await.unwrap(), "InUse");
    }

    #[tokio::test]
    async fn test_empty_value_rejected() {
        let env = env();
        let err = facade(&env)
            .set_metadata_entry("1", "status", "", EntryPrecondition::None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_delete_entry_and_all() {
        let env = env();
        let meta = facade(&env);
        meta.set_metadata("1", metadata(&[("a", "1"), ("b", "2")])).await.unwrap();

        meta.delete_metadata_entry("1", "a").await.unwrap();
        assert!(matches!(
            meta.delete_metadata_entry("1", "a").await,
            Err(GatewayError::NotFound(key)) if key == "deployment:1:a"
        ));

        meta.delete_metadata("1").await.unwrap();
        assert!(matches!(
            meta.get_metadata("1").await,
            Err(GatewayError::NotFound(_))
        ));
        assert!(matches!(
            meta.delete_metadata("1").await,
            Err(GatewayError::NotFound(_))
        ));
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_joins_queue_party_once() {
        let env = env();
        party_with(&env, "alice", &["bob", "carol"]).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gateway = env.gateway.clone();
                tokio::spawn(async move { gateway.join("alice", "ranked", BTreeMap::new()).await })
            })
            .collect();

        let mut queued = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => queued += 1,
                Err(GatewayError::AlreadyQueued(_)) | Err(GatewayError::Unavailable(_)) => {}
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(queued, 1);
        assert_eq!(env.client.queue_length("ranked").await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_pops_never_share_a_party() {
        let env = env();
        for i in 0..12 {
            let leader = format!("leader-{i}");
            party_with(&env, &leader, &[]).await;
            env.gateway.join(&leader, "casual", BTreeMap::new()).await.unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gateway = env.gateway.clone();
                tokio::spawn(async move {
                    let mut ids = Vec::new();
                    loop {
                        match gateway.pop_waiting_parties("casual", 2).await {
                            Ok(popped) => ids.extend(popped.into_iter().map(|r| r.id)),
                            Err(GatewayError::ResourceExhausted(_)) => break,
                            Err(e) => panic!("unexpected error {e}"),
                        }
                    }
                    ids
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        let before = all.len();
        all.dedup();
        assert_eq!(all.len(), before);
        assert_eq!(all.len(), 12);
    }
}

// ============================================================================
// Interrupted pops
// ============================================================================

mod interrupted_pops {
    use super::*;

    /// Rewrites one player's join request right before each armed commit that
    /// touches it without popping
    #[derive(Debug)]
    struct InterferingStore {
        inner: MemoryStore,
        target: Key,
        remaining: AtomicUsize,
    }

    impl InterferingStore {
        fn new(player_id: &str) -> Self {
            Self {
                inner: MemoryStore::new(),
                target: Key::for_entry::<PlayerJoinRequest>(player_id),
                remaining: AtomicUsize::new(0),
            }
        }

        fn arm(&self, times: usize) {
            self.remaining.store(times, Ordering::SeqCst);
        }

        async fn rewrite_target(&self, turn: usize) {
            let Some(raw) = self.inner.get_string(&self.target).await.unwrap() else {
                return;
            };
            let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            value["metadata"]["rewrites"] = serde_json::Value::String(turn.to_string());
            let rewrite = Command::StringSet {
                key: self.target.clone(),
                value: value.to_string(),
            };
            self.inner
                .execute(Batch::new(vec![], vec![rewrite]))
                .await
                .unwrap();
        }
    }

    #[async_trait]
    impl StoreBackend for InterferingStore {
        async fn get_string(&self, key: &Key) -> StoreResult<Option<String>> {
            self.inner.get_string(key).await
        }

        async fn get_hash(&self, key: &Key) -> StoreResult<BTreeMap<String, String>> {
            self.inner.get_hash(key).await
        }

        async fn get_sorted_set(&self, key: &Key) -> StoreResult<Vec<ScoredMember>> {
            self.inner.get_sorted_set(key).await
        }

        async fn exists(&self, key: &Key) -> StoreResult<bool> {
            self.inner.exists(key).await
        }

        async fn execute(&self, batch: Batch) -> StoreResult<BatchOutcome> {
            let pops = batch
                .commands
                .iter()
                .any(|c| matches!(c, Command::PopMin { .. }));
            let touches = batch.commands.iter().any(|c| c.key() == &self.target);
            if !pops && touches {
                let turn = self
                    .remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
                if let Ok(turn) = turn {
                    self.rewrite_target(turn).await;
                }
            }
            self.inner.execute(batch).await
        }
    }

    async fn queued(store: &Arc<InterferingStore>) -> (Env, PartyJoinRequest) {
        let env = env_on(store.clone());
        party_with(&env, "alice", &["bob"]).await;
        let request = env.gateway.join("alice", "ranked", BTreeMap::new()).await.unwrap();
        (env, request)
    }

    #[tokio::test]
    async fn test_pop_reloads_members_changed_after_dequeue() {
        let store = Arc::new(InterferingStore::new("alice"));
        let (env, request) = queued(&store).await;

        store.arm(1);
        let popped = env.gateway.pop_waiting_parties("ranked", 1).await.unwrap();

        assert_eq!(popped.len(), 1);
        assert_eq!(popped[0].id, request.id);
        assert_eq!(env.client.queue_length("ranked").await.unwrap(), 0);
        assert_eq!(status(&env, "alice").await, Some(MatchState::Matching));
        assert_eq!(status(&env, "bob").await, Some(MatchState::Matching));
        let alice = env.client.get::<PlayerJoinRequest>("alice").await.unwrap().unwrap();
        assert!(alice.metadata.contains_key("rewrites"));
    }

    #[tokio::test]
    async fn test_pop_requeues_parties_when_members_keep_changing() {
        let store = Arc::new(InterferingStore::new("alice"));
        let (env, request) = queued(&store).await;

        store.arm(usize::MAX);
        let err = env.gateway.pop_waiting_parties("ranked", 1).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert!(err.is_retryable());

        let waiting = env.client.queue_members("ranked").await.unwrap();
        assert_eq!(waiting, vec![ScoredMember::new(request.id(), request.score)]);
        assert_eq!(status(&env, "alice").await, Some(MatchState::Requested));
        assert_eq!(status(&env, "bob").await, Some(MatchState::Requested));

        store.arm(0);
        let popped = env.gateway.pop_waiting_parties("ranked", 1).await.unwrap();
        assert_eq!(popped[0].id, request.id);
        assert_eq!(status(&env, "alice").await, Some(MatchState::Matching));
    }

    #[tokio::test]
    async fn test_pop_gives_up_after_bounded_attempts() {
        let store = Arc::new(InterferingStore::new("alice"));
        let (env, _) = queued(&store).await;

        store.arm(MATCHING_UPDATE_ATTEMPTS);
        assert!(env.gateway.pop_waiting_parties("ranked", 1).await.is_err());
        assert_eq!(env.client.queue_length("ranked").await.unwrap(), 1);

        store.arm(MATCHING_UPDATE_ATTEMPTS - 1);
        assert!(env.gateway.pop_waiting_parties("ranked", 1).await.is_ok());
        assert_eq!(env.client.queue_length("ranked").await.unwrap(), 0);
    }
}
