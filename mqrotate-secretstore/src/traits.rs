//! Secret store trait

use async_trait::async_trait;
use mqrotate_core::VersionStage;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from secret store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceExists(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service error {code}: {message}")]
    Service { code: String, message: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound(_))
    }
}

/// Rotation-relevant metadata of a secret
#[derive(Debug, Clone, Default)]
pub struct RotationState {
    pub rotation_enabled: bool,
    /// version id -> staging labels
    pub version_ids_to_stages: HashMap<String, Vec<String>>,
}

impl RotationState {
    /// Labels attached to `version_id`, if the version is known
    pub fn stages_of(&self, version_id: &str) -> Option<&[String]> {
        self.version_ids_to_stages.get(version_id).map(Vec::as_slice)
    }

    /// Every version carrying `stage`
    pub fn versions_with(&self, stage: VersionStage) -> Vec<&str> {
        let mut versions: Vec<&str> = self
            .version_ids_to_stages
            .iter()
            .filter(|(_, labels)| stage.is_in(labels))
            .map(|(id, _)| id.as_str())
            .collect();
        versions.sort_unstable();
        versions
    }
}

/// A single version of a secret
#[derive(Debug, Clone)]
pub struct SecretValue {
    pub version_id: String,
    pub secret_string: Option<String>,
    pub version_stages: Vec<String>,
}

/// Version-staged secret storage
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Rotation flag and stage assignment of every version
    async fn describe_rotation_state(&self, secret_id: &str) -> Result<RotationState, StoreError>;

    /// Fetch the version labelled `stage`.
    ///
    /// With `version_id`, the version must exist and carry `stage`, otherwise
    /// `ResourceNotFound`.
    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: VersionStage,
        version_id: Option<&str>,
    ) -> Result<SecretValue, StoreError>;

    /// Store `secret_string` as a new `AWSPENDING` version with id `version_id`.
    ///
    /// Never overwrites: an existing version with the same id is accepted only
    /// if it holds the same value.
    async fn put_pending_value(
        &self,
        secret_id: &str,
        version_id: &str,
        secret_string: &str,
    ) -> Result<(), StoreError>;

    /// Generate a random password that avoids `exclude_characters`
    async fn get_random_password(&self, exclude_characters: &str) -> Result<String, StoreError>;

    /// Atomically move `stage` onto `move_to`, taking it off `remove_from`
    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> Result<(), StoreError>;
}
