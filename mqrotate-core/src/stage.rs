//! Secret version staging labels

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A staging label attached to a secret version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionStage {
    /// The live credential
    #[serde(rename = "AWSCURRENT")]
    Current,
    /// The candidate produced by an in-flight rotation
    #[serde(rename = "AWSPENDING")]
    Pending,
    /// The credential that was live before the last promotion
    #[serde(rename = "AWSPREVIOUS")]
    Previous,
}

impl VersionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "AWSCURRENT",
            Self::Pending => "AWSPENDING",
            Self::Previous => "AWSPREVIOUS",
        }
    }

    /// True if `labels` contains this stage
    pub fn is_in<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        labels.iter().any(|l| l.as_ref() == self.as_str())
    }
}

impl fmt::Display for VersionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWSCURRENT" => Ok(Self::Current),
            "AWSPENDING" => Ok(Self::Pending),
            "AWSPREVIOUS" => Ok(Self::Previous),
            other => Err(format!("Unknown version stage: {}", other)),
        }
    }
}
