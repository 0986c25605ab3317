//! Core types for mqrotate
//!
//! This crate provides the types shared by the secret store adapter, the
//! broker client and the rotation orchestrator.

pub mod credential;
pub mod error;
pub mod stage;

pub use credential::{CredentialError, CredentialRecord, TRANSPORT_FIELDS};
pub use error::ErrorCode;
pub use stage::VersionStage;
