//! Rotation errors

use mqrotate_broker::UpdateError;
use mqrotate_core::{CredentialError, ErrorCode, VersionStage};
use mqrotate_secretstore::StoreError;
use thiserror::Error;

/// Why a rotation step failed. None of these are retried within the step.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("Secret {secret_id} is not enabled for rotation")]
    RotationNotEnabled { secret_id: String },

    #[error("Secret version {version_id} has no stage for rotation of secret {secret_id}")]
    UnknownVersion {
        secret_id: String,
        version_id: String,
    },

    #[error("Secret version {version_id} not set as AWSPENDING for rotation of secret {secret_id}")]
    NotPendingVersion {
        secret_id: String,
        version_id: String,
    },

    #[error("Secret {secret_id} has AWSCURRENT on more than one version: {}", .versions.join(", "))]
    MultipleCurrentVersions {
        secret_id: String,
        versions: Vec<String>,
    },

    #[error("Invalid step parameter: {0}")]
    InvalidStep(String),

    #[error("Secret {secret_id} has no AWSCURRENT version")]
    CurrentMissing { secret_id: String },

    #[error("{stage} secret is malformed: {source}")]
    MalformedRecord {
        stage: VersionStage,
        source: CredentialError,
    },

    #[error("Attempting to modify user {pending} other than {stage} user {candidate}")]
    UsernameMismatch {
        stage: VersionStage,
        pending: String,
        candidate: String,
    },

    #[error("Unable to authenticate with the broker using {}", describe_tried(.tried))]
    NoValidCredential { tried: Vec<VersionStage> },

    #[error("Unable to authenticate with the broker using pending secret version {version_id} of {secret_id}")]
    VerificationFailed {
        secret_id: String,
        version_id: String,
    },

    #[error(transparent)]
    UpdateRejected(#[from] UpdateError),

    #[error("Secret store error: {0}")]
    SecretStore(#[from] StoreError),
}

impl RotationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RotationNotEnabled { .. } => ErrorCode::RotationNotEnabled,
            Self::UnknownVersion { .. } => ErrorCode::UnknownVersion,
            Self::NotPendingVersion { .. } => ErrorCode::NotPendingVersion,
            Self::MultipleCurrentVersions { .. } => ErrorCode::MultipleCurrentVersions,
            Self::InvalidStep(_) => ErrorCode::InvalidStep,
            Self::CurrentMissing { .. } => ErrorCode::CurrentMissing,
            Self::MalformedRecord { .. } => ErrorCode::MalformedRecord,
            Self::UsernameMismatch { .. } => ErrorCode::UsernameMismatch,
            Self::NoValidCredential { .. } => ErrorCode::NoValidCredential,
            Self::VerificationFailed { .. } => ErrorCode::VerificationFailed,
            Self::UpdateRejected(_) => ErrorCode::UpdateRejected,
            Self::SecretStore(_) => ErrorCode::SecretStoreFailure,
        }
    }

    /// Lambda-style JSON error document
    pub fn to_json(&self) -> String {
        self.code().to_json(&self.to_string())
    }
}

fn describe_tried(tried: &[VersionStage]) -> String {
    if tried.is_empty() {
        return "no candidate secret".to_string();
    }
    let names: Vec<&str> = tried.iter().map(VersionStage::as_str).collect();
    let mut message = format!("{} secret", names.join(" or "));
    if !tried.contains(&VersionStage::Previous) {
        message.push_str(" (no AWSPREVIOUS secret to fall back on)");
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_valid_credential_names_what_was_tried() {
        let err = RotationError::NoValidCredential {
            tried: vec![VersionStage::Current, VersionStage::Previous],
        };
        assert_eq!(err.code(), ErrorCode::NoValidCredential);
        assert!(err.to_string().contains("AWSCURRENT or AWSPREVIOUS"));

        let err = RotationError::NoValidCredential {
            tried: vec![VersionStage::Current],
        };
        assert!(err
            .to_string()
            .ends_with("AWSCURRENT secret (no AWSPREVIOUS secret to fall back on)"));
    }

    #[test]
    fn test_to_json_uses_code() {
        let err = RotationError::InvalidStep("rotateSecret".to_string());
        let value: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();

        assert_eq!(value["errorType"], "InvalidStep");
        assert_eq!(value["errorMessage"], "Invalid step parameter: rotateSecret");
    }

    #[test]
    fn test_store_errors_are_collaborator_failures() {
        let err: RotationError = StoreError::Transport("connection reset".to_string()).into();
        assert_eq!(err.code(), ErrorCode::SecretStoreFailure);
    }

    #[test]
    fn test_update_failures_are_rejections() {
        let err: RotationError = UpdateError::Transport {
            username: "svc".to_string(),
            message: "connection refused".to_string(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::UpdateRejected);

        let err: RotationError = UpdateError::Rejected {
            username: "svc".to_string(),
            status: 403,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::UpdateRejected);
    }
}
