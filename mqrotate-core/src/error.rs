//! Rotation error taxonomy and reporting

use serde::Serialize;

/// Stable error names reported by a failed rotation step.
///
/// Every one of these is terminal for the invocation that raised it; the
/// rotation framework retries the whole step later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Version staging
    RotationNotEnabled,
    UnknownVersion,
    NotPendingVersion,
    MultipleCurrentVersions,

    // Dispatch
    InvalidStep,

    // Records
    CurrentMissing,
    MalformedRecord,
    UsernameMismatch,

    // Broker
    NoValidCredential,
    VerificationFailed,
    UpdateRejected,

    // Collaborators
    SecretStoreFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RotationNotEnabled => "RotationNotEnabled",
            Self::UnknownVersion => "UnknownVersion",
            Self::NotPendingVersion => "NotPendingVersion",
            Self::MultipleCurrentVersions => "MultipleCurrentVersions",
            Self::InvalidStep => "InvalidStep",
            Self::CurrentMissing => "CurrentMissing",
            Self::MalformedRecord => "MalformedRecord",
            Self::UsernameMismatch => "UsernameMismatch",
            Self::NoValidCredential => "NoValidCredential",
            Self::VerificationFailed => "VerificationFailed",
            Self::UpdateRejected => "UpdateRejected",
            Self::SecretStoreFailure => "SecretStoreFailure",
        }
    }

    /// Format as a Lambda-style JSON error document
    pub fn to_json(&self, message: &str) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct JsonError<'a> {
            error_type: &'a str,
            error_message: &'a str,
        }

        let error = JsonError {
            error_type: self.as_str(),
            error_message: message,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(r#"{{"errorType":"{}","errorMessage":"{}"}}"#, self.as_str(), message)
        })
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_json_format() {
        let json = ErrorCode::NoValidCredential.to_json("Unable to authenticate as \"svc\"");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["errorType"], "NoValidCredential");
        assert_eq!(value["errorMessage"], "Unable to authenticate as \"svc\"");
    }

    #[test]
    fn test_display_matches_name() {
        assert_eq!(ErrorCode::UpdateRejected.to_string(), "UpdateRejected");
        assert_eq!(ErrorCode::SecretStoreFailure.as_str(), "SecretStoreFailure");
    }
}
