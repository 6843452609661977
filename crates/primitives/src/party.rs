//! Party and Member entries
//!
//! A party is a group of players who queue for matchmaking together. Each
//! player in a party also has a [`Member`] entry mapping the player id back
//! to the party, so a party can be found from any of its players.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use matchstore_core::{Entry, PreviousState};

use crate::error::{GatewayError, Result};

/// Lifecycle phase of a party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Accepting and losing members
    #[default]
    Forming,
    /// Queued for a match
    Matchmaking,
    /// Assigned to a deployment
    InGame,
    /// Not recognised
    Unknown,
}

/// A group of players with a leader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    /// Party id
    pub id: String,
    /// Player id of the leader
    pub leader_player_id: String,
    /// Player identity token of the leader
    pub leader_pit: String,
    /// Members required before the party may queue
    pub min_members: u32,
    /// Largest allowed party size
    pub max_members: u32,
    /// Player id to player identity token, for every member including the leader
    pub member_id_to_pit: BTreeMap<String, String>,
    /// Current phase
    pub current_phase: Phase,
    #[serde(skip)]
    previous_state: PreviousState,
}

impl Party {
    /// Create a party in the `Forming` phase led by the given player
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `min_members` is zero or exceeds `max_members`.
    pub fn new(
        leader_player_id: impl Into<String>,
        leader_pit: impl Into<String>,
        min_members: u32,
        max_members: u32,
    ) -> Result<Self> {
        if min_members == 0 || min_members > max_members {
            return Err(GatewayError::InvalidArgument(format!(
                "invalid party size bounds {}..={}",
                min_members, max_members
            )));
        }
        let leader_player_id = leader_player_id.into();
        let leader_pit = leader_pit.into();
        let mut member_id_to_pit = BTreeMap::new();
        member_id_to_pit.insert(leader_player_id.clone(), leader_pit.clone());

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            leader_player_id,
            leader_pit,
            min_members,
            max_members,
            member_id_to_pit,
            current_phase: Phase::Forming,
            previous_state: PreviousState::default(),
        })
    }

    /// Add a player; false if already a member or the party is full
    pub fn add_player_to_party(&mut self, player_id: &str, pit: &str) -> bool {
        if self.is_at_capacity() || self.member_id_to_pit.contains_key(player_id) {
            return false;
        }
        self.member_id_to_pit
            .insert(player_id.to_string(), pit.to_string());
        true
    }

    /// Remove a player; false if not a member
    ///
    /// When the leader leaves, the member with the lowest player id takes
    /// over.
    pub fn remove_player_from_party(&mut self, player_id: &str) -> bool {
        if self.member_id_to_pit.remove(player_id).is_none() {
            return false;
        }
        if self.leader_player_id == player_id {
            let next = self
                .member_id_to_pit
                .iter()
                .next()
                .map(|(id, pit)| (id.clone(), pit.clone()));
            if let Some((id, pit)) = next {
                self.leader_player_id = id;
                self.leader_pit = pit;
            }
        }
        true
    }

    /// Hand leadership to another member; false if not a member
    pub fn update_party_leader(&mut self, player_id: &str) -> bool {
        match self.member_id_to_pit.get(player_id) {
            Some(pit) => {
                self.leader_pit = pit.clone();
                self.leader_player_id = player_id.to_string();
                true
            }
            None => false,
        }
    }

    /// Whether the party has at least `min_members`
    pub fn sufficient_members(&self) -> bool {
        self.member_count() >= self.min_members as usize
    }

    /// Whether the party has `max_members` or more
    pub fn is_at_capacity(&self) -> bool {
        self.member_count() >= self.max_members as usize
    }

    /// Member entry for a player in this party
    pub fn get_member(&self, player_id: &str) -> Option<Member> {
        self.member_id_to_pit
            .contains_key(player_id)
            .then(|| Member::new(player_id, &self.id))
    }

    /// Number of members, leader included
    pub fn member_count(&self) -> usize {
        self.member_id_to_pit.len()
    }

    /// Whether the player is in this party
    pub fn is_member(&self, player_id: &str) -> bool {
        self.member_id_to_pit.contains_key(player_id)
    }
}

impl Entry for Party {
    const NAMESPACE: &'static str = "party";

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

/// Maps a player id to the party it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Player id
    pub id: String,
    /// Id of the player's party
    pub party_id: String,
    #[serde(skip)]
    previous_state: PreviousState,
}

impl Member {
    /// Create a member entry
    pub fn new(player_id: impl Into<String>, party_id: impl Into<String>) -> Self {
        Self {
            id: player_id.into(),
            party_id: party_id.into(),
            previous_state: PreviousState::default(),
        }
    }
}

impl Entry for Member {
    const NAMESPACE: &'static str = "member";

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
