//! Loading credential records out of the secret store

use mqrotate_core::{CredentialError, CredentialRecord, VersionStage};
use mqrotate_secretstore::{SecretStore, SecretValue, StoreError};
use tracing::warn;

use crate::error::RotationError;

/// Fetch the raw version labelled `stage`
pub(crate) async fn fetch(
    store: &dyn SecretStore,
    secret_id: &str,
    stage: VersionStage,
    version_id: Option<&str>,
) -> Result<SecretValue, RotationError> {
    store
        .get_secret_value(secret_id, stage, version_id)
        .await
        .map_err(|e| match e {
            StoreError::ResourceNotFound(_) if stage == VersionStage::Current => {
                RotationError::CurrentMissing {
                    secret_id: secret_id.to_string(),
                }
            }
            other => other.into(),
        })
}

/// Parse a fetched version into a validated record
pub(crate) fn parse(stage: VersionStage, value: &SecretValue) -> Result<CredentialRecord, RotationError> {
    let secret_string = value
        .secret_string
        .as_deref()
        .ok_or(CredentialError::MissingSecretString)
        .map_err(|source| RotationError::MalformedRecord { stage, source })?;

    CredentialRecord::parse(secret_string)
        .map_err(|source| RotationError::MalformedRecord { stage, source })
}

/// Fetch and parse the record labelled `stage`
pub(crate) async fn load(
    store: &dyn SecretStore,
    secret_id: &str,
    stage: VersionStage,
    version_id: Option<&str>,
) -> Result<CredentialRecord, RotationError> {
    let value = fetch(store, secret_id, stage, version_id).await?;
    parse(stage, &value)
}

/// Like `load`, but a missing or malformed record is `None`
pub(crate) async fn load_optional(
    store: &dyn SecretStore,
    secret_id: &str,
    stage: VersionStage,
) -> Result<Option<CredentialRecord>, RotationError> {
    match load(store, secret_id, stage, None).await {
        Ok(record) => Ok(Some(record)),
        Err(RotationError::SecretStore(e)) if e.is_not_found() => Ok(None),
        Err(RotationError::MalformedRecord { source, .. }) => {
            warn!(stage = %stage, error = %source, "Ignoring malformed secret");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
