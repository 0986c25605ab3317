//! Recording test doubles for the broker traits

use async_trait::async_trait;
use mqrotate_broker::{CredentialValidator, PasswordUpdater, UpdateError};
use mqrotate_core::CredentialRecord;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Broker whose users live in a map; records every call
#[derive(Default)]
pub(crate) struct ScriptedBroker {
    users: Mutex<HashMap<String, String>>,
    attempts: Mutex<Vec<CredentialRecord>>,
    updates: Mutex<Vec<(CredentialRecord, CredentialRecord)>>,
    reject_updates: bool,
}

impl ScriptedBroker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_user(username: &str, password: &str) -> Self {
        let broker = Self::new();
        broker.set_password(username, password);
        broker
    }

    pub(crate) fn rejecting_updates(mut self) -> Self {
        self.reject_updates = true;
        self
    }

    pub(crate) fn set_password(&self, username: &str, password: &str) {
        self.users
            .lock()
            .insert(username.to_string(), password.to_string());
    }

    pub(crate) fn password_of(&self, username: &str) -> Option<String> {
        self.users.lock().get(username).cloned()
    }

    pub(crate) fn attempts(&self) -> Vec<CredentialRecord> {
        self.attempts.lock().clone()
    }

    pub(crate) fn attempted_passwords(&self) -> Vec<String> {
        self.attempts.lock().iter().map(|r| r.password.clone()).collect()
    }

    /// (authenticating, target) pairs of accepted updates
    pub(crate) fn updates(&self) -> Vec<(CredentialRecord, CredentialRecord)> {
        self.updates.lock().clone()
    }

    fn accepts(&self, credential: &CredentialRecord) -> bool {
        self.users.lock().get(&credential.username) == Some(&credential.password)
    }
}

#[async_trait]
impl CredentialValidator for ScriptedBroker {
    async fn authenticates(&self, credential: &CredentialRecord) -> bool {
        self.attempts.lock().push(credential.clone());
        self.accepts(credential)
    }
}

#[async_trait]
impl PasswordUpdater for ScriptedBroker {
    async fn push_password(
        &self,
        auth: &CredentialRecord,
        target: &CredentialRecord,
    ) -> Result<(), UpdateError> {
        if self.reject_updates {
            return Err(UpdateError::Rejected {
                username: target.username.clone(),
                status: 403,
            });
        }
        if !self.accepts(auth) {
            return Err(UpdateError::Rejected {
                username: target.username.clone(),
                status: 401,
            });
        }

        self.set_password(&target.username, &target.password);
        self.updates.lock().push((auth.clone(), target.clone()));
        Ok(())
    }
}
