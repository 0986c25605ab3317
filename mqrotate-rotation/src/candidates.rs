//! Candidate credentials for logging in to the broker during `setSecret`
//!
//! A rotation can find the broker still on the previous password: the last
//! rotation's promotion reached the secret store but its password never
//! reached the broker. The chain tries the current credential first and the
//! previous one only if current fails.

use mqrotate_broker::CredentialValidator;
use mqrotate_core::{CredentialRecord, VersionStage};
use tracing::{debug, info};

use crate::error::RotationError;

/// A credential that may still log in to the broker
#[derive(Debug, Clone)]
pub struct Candidate {
    pub stage: VersionStage,
    pub record: CredentialRecord,
}

/// Ordered candidates, evaluated lazily until one authenticates
#[derive(Debug, Clone, Default)]
pub struct CandidateChain {
    candidates: Vec<Candidate>,
}

impl CandidateChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate to the end of the chain
    #[must_use]
    pub fn then(mut self, stage: VersionStage, record: CredentialRecord) -> Self {
        self.candidates.push(Candidate { stage, record });
        self
    }

    /// Current, then previous if there is one.
    ///
    /// The previous record takes the current record's transport settings.
    pub fn for_rotation(current: CredentialRecord, previous: Option<CredentialRecord>) -> Self {
        let previous = previous.map(|mut record| {
            record.carry_transport_settings_from(&current);
            record
        });

        let chain = Self::new().then(VersionStage::Current, current);
        match previous {
            Some(record) => chain.then(VersionStage::Previous, record),
            None => chain,
        }
    }

    pub fn stages(&self) -> Vec<VersionStage> {
        self.candidates.iter().map(|c| c.stage).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// First candidate, in order, that authenticates.
    ///
    /// A candidate for another user than `pending` is an error as soon as it
    /// is reached; later candidates are not looked at.
    pub async fn select(
        self,
        pending: &CredentialRecord,
        validator: &dyn CredentialValidator,
    ) -> Result<Candidate, RotationError> {
        let mut tried = Vec::with_capacity(self.candidates.len());

        for candidate in self.candidates {
            if candidate.record.username != pending.username {
                return Err(RotationError::UsernameMismatch {
                    stage: candidate.stage,
                    pending: pending.username.clone(),
                    candidate: candidate.record.username,
                });
            }

            tried.push(candidate.stage);
            if validator.authenticates(&candidate.record).await {
                info!(stage = %candidate.stage, username = %candidate.record.username, "Authenticated with broker");
                return Ok(candidate);
            }
            debug!(stage = %candidate.stage, "Candidate did not authenticate");
        }

        Err(RotationError::NoValidCredential { tried })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBroker;
    use serde_json::json;

    fn record(username: &str, password: &str) -> CredentialRecord {
        CredentialRecord::new(username, password)
    }

    #[tokio::test]
    async fn test_current_wins_without_probing_previous() {
        let broker = ScriptedBroker::with_user("svc", "cur");
        let chain = CandidateChain::for_rotation(record("svc", "cur"), Some(record("svc", "prev")));

        let chosen = chain.select(&record("svc", "new"), &broker).await.unwrap();
        assert_eq!(chosen.stage, VersionStage::Current);
        assert_eq!(broker.attempted_passwords(), vec!["cur"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_previous_with_current_transport() {
        let broker = ScriptedBroker::with_user("svc", "prev");
        let mut current = record("svc", "cur");
        current.extra.insert("ssl".to_string(), json!(true));
        let mut previous = record("svc", "prev");
        previous.extra.insert("ssl".to_string(), json!(false));

        let chain = CandidateChain::for_rotation(current, Some(previous));
        assert_eq!(chain.stages(), vec![VersionStage::Current, VersionStage::Previous]);

        let chosen = chain.select(&record("svc", "new"), &broker).await.unwrap();
        assert_eq!(chosen.stage, VersionStage::Previous);
        assert_eq!(chosen.record.extra.get("ssl"), Some(&json!(true)));

        // The login attempt itself already saw the carried setting
        let attempts = broker.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1].extra.get("ssl"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_username_mismatch_stops_the_chain() {
        let broker = ScriptedBroker::with_user("svc", "cur");
        let chain = CandidateChain::for_rotation(record("other", "cur"), None);

        let err = chain.select(&record("svc", "new"), &broker).await.unwrap_err();
        assert!(matches!(
            err,
            RotationError::UsernameMismatch { stage: VersionStage::Current, .. }
        ));
        assert!(broker.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_previous_username_checked_before_login() {
        let broker = ScriptedBroker::new();
        let chain =
            CandidateChain::for_rotation(record("svc", "cur"), Some(record("other", "prev")));

        let err = chain.select(&record("svc", "new"), &broker).await.unwrap_err();
        assert!(matches!(
            err,
            RotationError::UsernameMismatch { stage: VersionStage::Previous, .. }
        ));
        assert_eq!(broker.attempted_passwords(), vec!["cur"]);
    }

    #[tokio::test]
    async fn test_nothing_authenticates() {
        let broker = ScriptedBroker::new();

        let chain = CandidateChain::for_rotation(record("svc", "cur"), Some(record("svc", "prev")));
        let err = chain.select(&record("svc", "new"), &broker).await.unwrap_err();
        assert!(matches!(
            err,
            RotationError::NoValidCredential { ref tried }
                if *tried == vec![VersionStage::Current, VersionStage::Previous]
        ));

        let chain = CandidateChain::for_rotation(record("svc", "cur"), None);
        let err = chain.select(&record("svc", "new"), &broker).await.unwrap_err();
        assert!(matches!(
            err,
            RotationError::NoValidCredential { ref tried } if *tried == vec![VersionStage::Current]
        ));
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let chain = CandidateChain::new();
        assert!(chain.is_empty());

        let err = chain
            .select(&record("svc", "new"), &ScriptedBroker::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RotationError::NoValidCredential { ref tried } if tried.is_empty()));
    }
}
