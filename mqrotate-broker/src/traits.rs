//! Validator and updater contracts

use async_trait::async_trait;
use mqrotate_core::CredentialRecord;
use thiserror::Error;

/// Errors from pushing a password to the broker
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Broker rejected password update for {username}: HTTP {status}")]
    Rejected { username: String, status: u16 },

    #[error("Password update for {username} failed: {message}")]
    Transport { username: String, message: String },
}

/// Decides whether a credential authenticates against the broker
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Read-only login attempt. Any failure, including transport errors, is `false`.
    async fn authenticates(&self, credential: &CredentialRecord) -> bool;
}

/// Sets a broker user's password
#[async_trait]
pub trait PasswordUpdater: Send + Sync {
    /// Log in as `auth` and set `target.username`'s password to `target.password`
    async fn push_password(
        &self,
        auth: &CredentialRecord,
        target: &CredentialRecord,
    ) -> Result<(), UpdateError>;
}
