//! Broker credential rotation for mqrotate
//!
//! Runs one step of a four-step rotation against a version-staged secret:
//! - `createSecret`: stage a new `AWSPENDING` credential
//! - `setSecret`: make the pending password live on the broker, logging in
//!   with whichever of current or previous still works
//! - `testSecret`: check the pending credential logs in
//! - `finishSecret`: promote the pending version to `AWSCURRENT`
//!
//! Every step is idempotent; all state is re-read from the secret store on
//! each call.

pub mod candidates;
mod error;
mod records;
mod request;
mod rotator;

#[cfg(test)]
mod test_support;

pub use candidates::{Candidate, CandidateChain};
pub use error::RotationError;
pub use request::{RotationRequest, RotationStep};
pub use rotator::{Rotator, RotatorConfig, StepOutcome, DEFAULT_EXCLUDE_CHARACTERS};
