//! Secret store adapters for mqrotate
//!
//! Provides the version-staged secret store the rotation orchestrator runs
//! against:
//! - `SecretStore` trait (DescribeSecret, GetSecretValue, PutSecretValue,
//!   GetRandomPassword, UpdateSecretVersionStage)
//! - `InMemorySecretStore` for local runs and tests
//! - `SecretsManagerClient` on the AWS SDK

mod aws;
mod memory;
pub mod password;
mod traits;

pub use aws::SecretsManagerClient;
pub use memory::{InMemorySecretStore, Secret, SecretVersion};
pub use traits::{RotationState, SecretStore, SecretValue, StoreError};
