//! DeploymentMetadata: per-deployment key/value metadata
//!
//! Each deployment's metadata is one hash at `deployment:<id>`. Field-level
//! writes can be made conditional on the current value, which lets several
//! deployment pool replicas claim a deployment without a lock.

use std::collections::BTreeMap;

use matchstore_concurrency::StoreClient;
use matchstore_core::Key;

use crate::error::{commit_error, GatewayError, Result};

/// Namespace of deployment metadata hashes
pub const DEPLOYMENT_NAMESPACE: &str = "deployment";

/// Precondition for a single-field write
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EntryPrecondition {
    /// Write unconditionally
    #[default]
    None,
    /// Field must currently hold this value
    Equals(String),
    /// Field must not exist yet
    Absent,
}

/// Metadata facade over a store client
#[derive(Debug, Clone)]
pub struct DeploymentMetadata {
    client: StoreClient,
}

impl DeploymentMetadata {
    /// Create a metadata facade
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Hash key holding a deployment's metadata
    pub fn key(deployment_id: &str) -> Key {
        Key::raw(format!("{}:{}", DEPLOYMENT_NAMESPACE, deployment_id))
    }

    /// Create a deployment's metadata; it must not have any yet
    pub async fn set_metadata(
        &self,
        deployment_id: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<()> {
        if metadata.is_empty() {
            return Err(GatewayError::InvalidArgument("metadata must not be empty".to_string()));
        }
        self.client
            .transact(|tx| {
                tx.create_hash_with_entries(Self::key(deployment_id), metadata);
            })
            .await
            .map_err(|e| commit_error("set_metadata", e, GatewayError::AlreadyExists))?;
        Ok(())
    }

    /// Set or clear fields; an empty value removes the field
    pub async fn update_metadata(
        &self,
        deployment_id: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<()> {
        self.client
            .transact(|tx| {
                tx.update_hash_with_entries(Self::key(deployment_id), metadata);
            })
            .await
            .map_err(|e| commit_error("update_metadata", e, GatewayError::AlreadyExists))?;
        Ok(())
    }

    /// Set one field, optionally conditioned on its current value
    ///
    /// # Errors
    ///
    /// - `FailedPrecondition` if `Equals` did not match
    /// - `AlreadyExists` if `Absent` found the field
    pub async fn set_metadata_entry(
        &self,
        deployment_id: &str,
        field: &str,
        value: &str,
        precondition: EntryPrecondition,
    ) -> Result<()> {
        if value.is_empty() {
            return Err(GatewayError::InvalidArgument(format!(
                "value for {} must not be empty",
                field
            )));
        }
        let key = Self::key(deployment_id);
        self.client
            .transact(|tx| {
                match &precondition {
                    EntryPrecondition::None => {}
                    EntryPrecondition::Equals(expected) => {
                        tx.add_hash_entry_equal_condition(key.clone(), field, expected);
                    }
                    EntryPrecondition::Absent => {
                        tx.add_hash_entry_not_exists_condition(key.clone(), field);
                    }
                }
                tx.update_hash_with_entries(key, [(field, value)]);
            })
            .await
            .map_err(|e| commit_error("set_metadata_entry", e, GatewayError::AlreadyExists))?;
        Ok(())
    }

    /// Remove one field; it must exist
    pub async fn delete_metadata_entry(&self, deployment_id: &str, field: &str) -> Result<()> {
        self.client
            .transact(|tx| {
                tx.delete_hash_entry(Self::key(deployment_id), field);
            })
            .await
            .map_err(|e| commit_error("delete_metadata_entry", e, GatewayError::AlreadyExists))?;
        Ok(())
    }

    /// All metadata of a deployment
    ///
    /// # Errors
    ///
    /// `NotFound` if the deployment has none.
    pub async fn get_metadata(&self, deployment_id: &str) -> Result<BTreeMap<String, String>> {
        let metadata = self.client.get_hash(Self::key(deployment_id)).await?;
        if metadata.is_empty() {
            return Err(GatewayError::NotFound(format!(
                "metadata for deployment {}",
                deployment_id
            )));
        }
        Ok(metadata)
    }

    /// One field of a deployment's metadata
    pub async fn get_metadata_entry(&self, deployment_id: &str, field: &str) -> Result<String> {
        let mut metadata = self.get_metadata(deployment_id).await?;
        metadata
            .remove(field)
            .ok_or_else(|| GatewayError::NotFound(Self::key(deployment_id).field_label(field)))
    }

    /// Remove all metadata of a deployment; it must exist
    pub async fn delete_metadata(&self, deployment_id: &str) -> Result<()> {
        self.client
            .transact(|tx| {
                tx.delete_key(Self::key(deployment_id));
            })
            .await
            .map_err(|e| commit_error("delete_metadata", e, GatewayError::AlreadyExists))?;
        Ok(())
    }
}
