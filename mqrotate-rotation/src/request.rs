//! Rotation requests and steps

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RotationError;

/// One step of the rotation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStep {
    /// Stage a new pending credential
    Create,
    /// Make the pending credential live on the broker
    Activate,
    /// Check the pending credential logs in
    Verify,
    /// Promote the pending version to current
    Finish,
}

impl RotationStep {
    /// Name used by the rotation framework
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "createSecret",
            Self::Activate => "setSecret",
            Self::Verify => "testSecret",
            Self::Finish => "finishSecret",
        }
    }
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationStep {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createSecret" | "create" => Ok(Self::Create),
            "setSecret" | "activate" => Ok(Self::Activate),
            "testSecret" | "verify" => Ok(Self::Verify),
            "finishSecret" | "finish" => Ok(Self::Finish),
            other => Err(RotationError::InvalidStep(other.to_string())),
        }
    }
}

/// A rotation invocation as delivered by the rotation framework.
///
/// `step` stays a string so that an unknown step is reported only after the
/// version staging checks, the same way a known one would be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RotationRequest {
    pub secret_id: String,
    pub client_request_token: String,
    pub step: String,
}

impl RotationRequest {
    pub fn new(
        secret_id: impl Into<String>,
        client_request_token: impl Into<String>,
        step: impl Into<String>,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            client_request_token: client_request_token.into(),
            step: step.into(),
        }
    }
}
