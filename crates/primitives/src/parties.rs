//! Parties: forming and leaving parties
//!
//! Keeps the `Party` entry and every player's `Member` entry in step: both
//! are written in the same transaction, and creating a `Member` that already
//! exists fails, so a player is in at most one party.

use matchstore_concurrency::StoreClient;

use crate::error::{commit_error, GatewayError, Result};
use crate::party::{Member, Party, Phase};

/// Party management facade over a store client
#[derive(Debug, Clone)]
pub struct Parties {
    client: StoreClient,
}

impl Parties {
    /// Create a party facade
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Create a party led by `leader_id`
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the leader is already in a party.
    pub async fn create_party(
        &self,
        leader_id: &str,
        leader_pit: &str,
        min_members: u32,
        max_members: u32,
    ) -> Result<Party> {
        let party = Party::new(leader_id, leader_pit, min_members, max_members)?;
        let member = Member::new(leader_id, &party.id);

        self.client
            .transact(|tx| {
                tx.create_all([&party]).create_all([&member]);
            })
            .await
            .map_err(|e| commit_error("create_party", e, already_in_party))?;

        tracing::info!(party_id = %party.id, leader_id, "created party");
        Ok(party)
    }

    /// Add a player to a forming party
    ///
    /// # Errors
    ///
    /// - `NotFound` if the party does not exist
    /// - `FailedPrecondition` if it is full or no longer forming
    /// - `AlreadyExists` if the player is already in a party
    /// - `Unavailable` if the party changed concurrently
    pub async fn join_party(&self, player_id: &str, pit: &str, party_id: &str) -> Result<Party> {
        let mut party = self
            .client
            .get::<Party>(party_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("party {}", party_id)))?;

        if party.current_phase != Phase::Forming {
            return Err(GatewayError::FailedPrecondition(
                "party is not accepting members".to_string(),
            ));
        }
        if party.is_member(player_id) {
            return Err(already_in_party(player_id.to_string()));
        }
        if !party.add_player_to_party(player_id, pit) {
            return Err(GatewayError::FailedPrecondition("party is full".to_string()));
        }
        let member = Member::new(player_id, party_id);

        self.client
            .transact(|tx| {
                tx.update_all([&party]).create_all([&member]);
            })
            .await
            .map_err(|e| commit_error("join_party", e, already_in_party))?;
        Ok(party)
    }

    /// Remove a player from their party
    ///
    /// The last member leaving deletes the party.
    pub async fn leave_party(&self, player_id: &str) -> Result<()> {
        let member = self
            .client
            .get::<Member>(player_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("player is not a member of any party".to_string()))?;
        let mut party = self
            .client
            .get::<Party>(&member.party_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("party {}", member.party_id)))?;

        if party.current_phase != Phase::Forming {
            return Err(GatewayError::FailedPrecondition(
                "cannot leave a party while it is matchmaking or in game".to_string(),
            ));
        }
        party.remove_player_from_party(player_id);

        let mut tx = self.client.create_transaction();
        tx.delete_all([&member]);
        if party.member_count() == 0 {
            tx.delete_all([&party]);
        } else {
            tx.update_all([&party]);
        }
        tx.commit()
            .await
            .map_err(|e| commit_error("leave_party", e, GatewayError::AlreadyExists))?;
        Ok(())
    }

    /// The party a player belongs to, if any
    pub async fn get_party_by_player(&self, player_id: &str) -> Result<Option<Party>> {
        let Some(member) = self.client.get::<Member>(player_id).await? else {
            return Ok(None);
        };
        Ok(self.client.get::<Party>(&member.party_id).await?)
    }
}

fn already_in_party(key: String) -> GatewayError {
    GatewayError::AlreadyExists(format!("player already in a party ({})", key))
}
