//! Broker management API client for mqrotate
//!
//! Answers two questions against the broker's HTTP management API:
//! - does a credential currently authenticate (`CredentialValidator`)
//! - set a user's password using some other working credential
//!   (`PasswordUpdater`)

mod client;
mod traits;

pub use client::{BrokerConfig, ManagementApiClient};
pub use traits::{CredentialValidator, PasswordUpdater, UpdateError};
