//! In-memory secret store

use async_trait::async_trait;
use dashmap::DashMap;
use mqrotate_core::VersionStage;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::password::{generate_password, DEFAULT_PASSWORD_LENGTH};
use crate::traits::{RotationState, SecretStore, SecretValue, StoreError};

/// A secret with its versions
#[derive(Debug, Clone)]
pub struct Secret {
    /// Secret ARN
    pub arn: String,
    /// Secret name
    pub name: String,
    /// Whether rotation is turned on
    pub rotation_enabled: bool,
    /// Secret versions (version_id -> SecretVersion)
    pub versions: HashMap<String, SecretVersion>,
}

impl Secret {
    /// Id of the version carrying `stage`
    pub fn version_with(&self, stage: VersionStage) -> Option<&str> {
        self.versions
            .values()
            .find(|v| stage.is_in(&v.version_stages))
            .map(|v| v.version_id.as_str())
    }

    pub fn version_ids_to_stages(&self) -> HashMap<String, Vec<String>> {
        self.versions
            .iter()
            .map(|(k, v)| (k.clone(), v.version_stages.clone()))
            .collect()
    }

    fn remove_label(&mut self, label: &str) {
        for version in self.versions.values_mut() {
            version.version_stages.retain(|s| s != label);
        }
    }

    /// Versions without labels are unreachable; drop them
    fn prune_unlabelled(&mut self) {
        self.versions.retain(|_, v| !v.version_stages.is_empty());
    }
}

/// A version of a secret
#[derive(Debug, Clone)]
pub struct SecretVersion {
    /// Version ID
    pub version_id: String,
    /// Secret string value
    pub secret_string: Option<String>,
    /// Version stages (e.g., AWSCURRENT, AWSPENDING)
    pub version_stages: Vec<String>,
}

/// In-memory storage for secrets.
///
/// Each secret lives behind its own map entry; every mutation of a secret
/// holds that entry's lock, which makes stage moves atomic.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    /// Secrets indexed by name
    secrets: DashMap<String, Secret>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self {
            secrets: DashMap::new(),
        }
    }

    /// Create a new secret whose first version is `AWSCURRENT`
    pub fn create_secret(&self, name: &str, secret_string: &str) -> Result<Secret, StoreError> {
        if self.secrets.contains_key(name) {
            return Err(StoreError::ResourceExists(name.to_string()));
        }

        let version_id = Uuid::new_v4().to_string();
        let arn = format!(
            "arn:aws:secretsmanager:us-east-1:000000000000:secret:{}-{}",
            name,
            &Uuid::new_v4().to_string()[..6]
        );

        let mut versions = HashMap::new();
        versions.insert(
            version_id.clone(),
            SecretVersion {
                version_id,
                secret_string: Some(secret_string.to_string()),
                version_stages: vec![VersionStage::Current.as_str().to_string()],
            },
        );

        let secret = Secret {
            arn,
            name: name.to_string(),
            rotation_enabled: false,
            versions,
        };

        self.secrets.insert(name.to_string(), secret.clone());
        Ok(secret)
    }

    /// Get a secret by name
    pub fn get_secret(&self, name: &str) -> Result<Secret, StoreError> {
        self.secrets
            .get(name)
            .map(|s| s.clone())
            .ok_or_else(|| StoreError::ResourceNotFound(name.to_string()))
    }

    /// Turn rotation on or off
    pub fn set_rotation_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError> {
        let mut secret = self
            .secrets
            .get_mut(name)
            .ok_or_else(|| StoreError::ResourceNotFound(name.to_string()))?;
        secret.rotation_enabled = enabled;
        Ok(())
    }

    /// Put a new value as `AWSCURRENT`; the old current becomes `AWSPREVIOUS`.
    /// Returns the new version id.
    pub fn put_secret_value(&self, name: &str, secret_string: &str) -> Result<String, StoreError> {
        let mut secret = self
            .secrets
            .get_mut(name)
            .ok_or_else(|| StoreError::ResourceNotFound(name.to_string()))?;

        let new_version_id = Uuid::new_v4().to_string();

        let current_vid = secret.version_with(VersionStage::Current).map(String::from);

        secret.remove_label(VersionStage::Previous.as_str());
        if let Some(cvid) = current_vid {
            if let Some(current_version) = secret.versions.get_mut(&cvid) {
                current_version
                    .version_stages
                    .retain(|s| s != VersionStage::Current.as_str());
                current_version
                    .version_stages
                    .push(VersionStage::Previous.as_str().to_string());
            }
        }
        secret.prune_unlabelled();

        secret.versions.insert(
            new_version_id.clone(),
            SecretVersion {
                version_id: new_version_id.clone(),
                secret_string: Some(secret_string.to_string()),
                version_stages: vec![VersionStage::Current.as_str().to_string()],
            },
        );

        Ok(new_version_id)
    }

    /// Label a new, valueless version `AWSPENDING` as the rotation service
    /// does before invoking the first step. A version id already in use is
    /// left alone.
    pub fn begin_rotation(&self, name: &str, version_id: &str) -> Result<(), StoreError> {
        let mut secret = self
            .secrets
            .get_mut(name)
            .ok_or_else(|| StoreError::ResourceNotFound(name.to_string()))?;

        if !secret.rotation_enabled {
            return Err(StoreError::InvalidRequest(format!(
                "Rotation is not enabled for {}",
                name
            )));
        }
        if secret.versions.contains_key(version_id) {
            return Ok(());
        }

        secret.remove_label(VersionStage::Pending.as_str());
        secret.prune_unlabelled();
        secret.versions.insert(
            version_id.to_string(),
            SecretVersion {
                version_id: version_id.to_string(),
                secret_string: None,
                version_stages: vec![VersionStage::Pending.as_str().to_string()],
            },
        );
        Ok(())
    }

}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn describe_rotation_state(&self, secret_id: &str) -> Result<RotationState, StoreError> {
        let secret = self.get_secret(secret_id)?;
        Ok(RotationState {
            rotation_enabled: secret.rotation_enabled,
            version_ids_to_stages: secret.version_ids_to_stages(),
        })
    }

    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: VersionStage,
        version_id: Option<&str>,
    ) -> Result<SecretValue, StoreError> {
        let secret = self
            .secrets
            .get(secret_id)
            .ok_or_else(|| StoreError::ResourceNotFound(secret_id.to_string()))?;

        let version_id = match version_id {
            Some(vid) => vid.to_string(),
            None => secret
                .version_with(stage)
                .map(String::from)
                .ok_or_else(|| StoreError::ResourceNotFound(format!("No {} version", stage)))?,
        };

        let version = secret
            .versions
            .get(&version_id)
            .filter(|v| stage.is_in(&v.version_stages) && v.secret_string.is_some())
            .ok_or_else(|| {
                StoreError::ResourceNotFound(format!("Version {} with stage {}", version_id, stage))
            })?;

        Ok(SecretValue {
            version_id: version.version_id.clone(),
            secret_string: version.secret_string.clone(),
            version_stages: version.version_stages.clone(),
        })
    }

    async fn put_pending_value(
        &self,
        secret_id: &str,
        version_id: &str,
        secret_string: &str,
    ) -> Result<(), StoreError> {
        let mut secret = self
            .secrets
            .get_mut(secret_id)
            .ok_or_else(|| StoreError::ResourceNotFound(secret_id.to_string()))?;

        if let Some(existing) = secret.versions.get_mut(version_id) {
            if existing.secret_string.is_none() {
                existing.secret_string = Some(secret_string.to_string());
                if !VersionStage::Pending.is_in(&existing.version_stages) {
                    existing
                        .version_stages
                        .push(VersionStage::Pending.as_str().to_string());
                }
                return Ok(());
            }
            if existing.secret_string.as_deref() == Some(secret_string) {
                debug!(secret_id = %secret_id, version_id = %version_id, "Pending value already stored");
                return Ok(());
            }
            return Err(StoreError::ResourceExists(format!(
                "Version {} already exists with a different value",
                version_id
            )));
        }

        secret.remove_label(VersionStage::Pending.as_str());
        secret.prune_unlabelled();
        secret.versions.insert(
            version_id.to_string(),
            SecretVersion {
                version_id: version_id.to_string(),
                secret_string: Some(secret_string.to_string()),
                version_stages: vec![VersionStage::Pending.as_str().to_string()],
            },
        );

        Ok(())
    }

    async fn get_random_password(&self, exclude_characters: &str) -> Result<String, StoreError> {
        generate_password(&mut rand::thread_rng(), DEFAULT_PASSWORD_LENGTH, exclude_characters)
            .ok_or_else(|| {
                StoreError::InvalidParameter(
                    "ExcludeCharacters leaves no characters to generate a password from".to_string(),
                )
            })
    }

    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut secret = self
            .secrets
            .get_mut(secret_id)
            .ok_or_else(|| StoreError::ResourceNotFound(secret_id.to_string()))?;

        if !secret.versions.contains_key(move_to) {
            return Err(StoreError::ResourceNotFound(format!("Version {}", move_to)));
        }

        let holder = secret.version_with(stage).map(String::from);
        if holder.as_deref() == Some(move_to) {
            return Ok(());
        }
        if holder.as_deref() != remove_from {
            return Err(StoreError::InvalidParameter(format!(
                "{} is attached to {:?}, not {:?}",
                stage, holder, remove_from
            )));
        }

        let label = stage.as_str();
        if stage == VersionStage::Current {
            // Completing a rotation: the old current becomes previous and the
            // promoted version is no longer pending.
            secret.remove_label(VersionStage::Previous.as_str());
            if let Some(old) = holder.as_deref().and_then(|h| secret.versions.get_mut(h)) {
                old.version_stages
                    .push(VersionStage::Previous.as_str().to_string());
            }
            if let Some(new) = secret.versions.get_mut(move_to) {
                new.version_stages
                    .retain(|s| s != VersionStage::Pending.as_str());
            }
        }

        secret.remove_label(label);
        if let Some(new) = secret.versions.get_mut(move_to) {
            new.version_stages.push(label.to_string());
        }
        secret.prune_unlabelled();

        debug!(secret_id = %secret_id, stage = %stage, move_to = %move_to, "Moved version stage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_secret() -> (InMemorySecretStore, String) {
        let store = InMemorySecretStore::new();
        let secret = store
            .create_secret("mq", r#"{"username":"svc","password":"old"}"#)
            .unwrap();
        let current = secret.version_with(VersionStage::Current).unwrap().to_string();
        (store, current)
    }

    #[tokio::test]
    async fn test_create_and_get_secret() {
        let (store, current) = store_with_secret();

        let value = store
            .get_secret_value("mq", VersionStage::Current, None)
            .await
            .unwrap();
        assert_eq!(value.version_id, current);
        assert_eq!(
            value.secret_string.as_deref(),
            Some(r#"{"username":"svc","password":"old"}"#)
        );

        let missing = store.get_secret_value("mq", VersionStage::Previous, None).await;
        assert!(matches!(missing, Err(StoreError::ResourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_put_secret_value_rotates_versions() {
        let (store, first) = store_with_secret();
        let second = store.put_secret_value("mq", "value-2").unwrap();
        let third = store.put_secret_value("mq", "value-3").unwrap();

        let state = store.describe_rotation_state("mq").await.unwrap();
        assert_eq!(state.versions_with(VersionStage::Current), vec![third.as_str()]);
        assert_eq!(state.versions_with(VersionStage::Previous), vec![second.as_str()]);
        // Unlabelled versions are dropped
        assert!(state.stages_of(&first).is_none());
    }

    #[tokio::test]
    async fn test_get_by_version_requires_matching_stage() {
        let (store, current) = store_with_secret();

        let result = store
            .get_secret_value("mq", VersionStage::Pending, Some(&current))
            .await;
        assert!(matches!(result, Err(StoreError::ResourceNotFound(_))));

        let result = store
            .get_secret_value("mq", VersionStage::Pending, Some("no-such-version"))
            .await;
        assert!(matches!(result, Err(StoreError::ResourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_put_pending_never_overwrites() {
        let (store, _) = store_with_secret();

        store.put_pending_value("mq", "token-1", "a").await.unwrap();
        // Same value is idempotent
        store.put_pending_value("mq", "token-1", "a").await.unwrap();

        let result = store.put_pending_value("mq", "token-1", "b").await;
        assert!(matches!(result, Err(StoreError::ResourceExists(_))));

        let value = store
            .get_secret_value("mq", VersionStage::Pending, Some("token-1"))
            .await
            .unwrap();
        assert_eq!(value.secret_string.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_begin_rotation_stages_valueless_pending() {
        let (store, _) = store_with_secret();
        assert!(matches!(
            store.begin_rotation("mq", "token-1"),
            Err(StoreError::InvalidRequest(_))
        ));
        store.set_rotation_enabled("mq", true).unwrap();
        store.begin_rotation("mq", "token-1").unwrap();

        let state = store.describe_rotation_state("mq").await.unwrap();
        assert_eq!(state.versions_with(VersionStage::Pending), vec!["token-1"]);

        // No value yet
        let result = store
            .get_secret_value("mq", VersionStage::Pending, Some("token-1"))
            .await;
        assert!(matches!(result, Err(StoreError::ResourceNotFound(_))));

        store.put_pending_value("mq", "token-1", "a").await.unwrap();
        let value = store
            .get_secret_value("mq", VersionStage::Pending, Some("token-1"))
            .await
            .unwrap();
        assert_eq!(value.secret_string.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_promote_moves_current_atomically() {
        let (store, old_current) = store_with_secret();
        store.put_pending_value("mq", "token-1", "new").await.unwrap();

        store
            .update_version_stage("mq", VersionStage::Current, "token-1", Some(&old_current))
            .await
            .unwrap();

        let state = store.describe_rotation_state("mq").await.unwrap();
        assert_eq!(state.versions_with(VersionStage::Current), vec!["token-1"]);
        assert_eq!(
            state.versions_with(VersionStage::Previous),
            vec![old_current.as_str()]
        );
        assert!(state.versions_with(VersionStage::Pending).is_empty());

        // Moving onto the holder again is a no-op
        store
            .update_version_stage("mq", VersionStage::Current, "token-1", Some(&old_current))
            .await
            .unwrap();
        let state = store.describe_rotation_state("mq").await.unwrap();
        assert_eq!(state.versions_with(VersionStage::Current), vec!["token-1"]);
    }

    #[tokio::test]
    async fn test_promote_rejects_stale_holder() {
        let (store, _) = store_with_secret();
        store.put_pending_value("mq", "token-1", "new").await.unwrap();

        let result = store
            .update_version_stage("mq", VersionStage::Current, "token-1", Some("someone-else"))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidParameter(_))));

        let state = store.describe_rotation_state("mq").await.unwrap();
        assert_eq!(state.versions_with(VersionStage::Current).len(), 1);
        assert_ne!(state.versions_with(VersionStage::Current), vec!["token-1"]);
    }

    #[tokio::test]
    async fn test_random_password_respects_exclusions() {
        let store = InMemorySecretStore::new();
        let password = store.get_random_password("/@\"'\\").await.unwrap();

        assert_eq!(password.len(), DEFAULT_PASSWORD_LENGTH);
        assert!(!password.contains(['/', '@', '"', '\'', '\\']));
    }

    #[test]
    fn test_duplicate_secret_fails() {
        let (store, _) = store_with_secret();

        let result = store.create_secret("mq", "{}");
        assert!(matches!(result, Err(StoreError::ResourceExists(_))));
    }

    #[test]
    fn test_rotation_flag() {
        let (store, _) = store_with_secret();
        assert!(!store.get_secret("mq").unwrap().rotation_enabled);

        store.set_rotation_enabled("mq", true).unwrap();
        assert!(store.get_secret("mq").unwrap().rotation_enabled);

        let result = store.set_rotation_enabled("missing", true);
        assert!(matches!(result, Err(StoreError::ResourceNotFound(_))));
    }
}
