//! Rotation orchestrator

use mqrotate_broker::{CredentialValidator, PasswordUpdater};
use mqrotate_core::VersionStage;
use mqrotate_secretstore::{RotationState, SecretStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

use crate::candidates::CandidateChain;
use crate::error::RotationError;
use crate::records;
use crate::request::{RotationRequest, RotationStep};

/// Characters generated passwords avoid unless configured otherwise
pub const DEFAULT_EXCLUDE_CHARACTERS: &str = "/@\"'\\";

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct RotatorConfig {
    /// Characters generated passwords must not contain
    pub exclude_characters: String,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            exclude_characters: DEFAULT_EXCLUDE_CHARACTERS.to_string(),
        }
    }
}

/// What a successful step did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum StepOutcome {
    /// The version is already current; nothing to do
    AlreadyCurrent,
    /// A new pending version was written
    PendingCreated,
    /// A pending version for this token already existed and was kept
    PendingExists,
    /// The broker already accepts the pending password
    AlreadyActive,
    /// The pending password was pushed while logged in as `via`
    PasswordUpdated { via: VersionStage },
    /// The pending credential logs in
    Verified,
    /// The version became current, taking the label from `previous`
    Promoted {
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<String>,
    },
}

/// Staging of the version being rotated
#[derive(Debug)]
enum Staging {
    AlreadyCurrent,
    Pending,
}

/// Drives one rotation step against a secret store and a broker
pub struct Rotator {
    store: Arc<dyn SecretStore>,
    validator: Arc<dyn CredentialValidator>,
    updater: Arc<dyn PasswordUpdater>,
    config: RotatorConfig,
}

impl Rotator {
    pub fn new(
        store: Arc<dyn SecretStore>,
        validator: Arc<dyn CredentialValidator>,
        updater: Arc<dyn PasswordUpdater>,
    ) -> Self {
        Self {
            store,
            validator,
            updater,
            config: RotatorConfig::default(),
        }
    }

    /// Use one broker client as both validator and updater
    pub fn with_broker<B>(store: Arc<dyn SecretStore>, broker: Arc<B>) -> Self
    where
        B: CredentialValidator + PasswordUpdater + 'static,
    {
        Self::new(store, broker.clone(), broker)
    }

    #[must_use]
    pub fn with_config(mut self, config: RotatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the step named in `request`
    pub async fn rotate(&self, request: &RotationRequest) -> Result<StepOutcome, RotationError> {
        let span = info_span!(
            "rotate",
            secret_id = %request.secret_id,
            version_id = %request.client_request_token,
            step = %request.step,
        );

        async {
            let result = self.rotate_inner(request).await;
            match &result {
                Ok(outcome) => info!(outcome = ?outcome, "Rotation step finished"),
                Err(e) => error!(code = %e.code(), error = %e, "Rotation step failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn rotate_inner(&self, request: &RotationRequest) -> Result<StepOutcome, RotationError> {
        let secret_id = request.secret_id.as_str();
        let token = request.client_request_token.as_str();

        let state = self.store.describe_rotation_state(secret_id).await?;
        if let Staging::AlreadyCurrent = check_staging(secret_id, token, &state)? {
            info!("Secret version already set as AWSCURRENT");
            return Ok(StepOutcome::AlreadyCurrent);
        }

        match request.step.parse::<RotationStep>()? {
            RotationStep::Create => self.create_pending(secret_id, token).await,
            RotationStep::Activate => self.activate_pending(secret_id, token).await,
            RotationStep::Verify => self.verify_pending(secret_id, token).await,
            RotationStep::Finish => self.finish(secret_id, token).await,
        }
    }

    /// `createSecret`: stage a pending credential for `token` unless one exists
    async fn create_pending(&self, secret_id: &str, token: &str) -> Result<StepOutcome, RotationError> {
        let store = self.store.as_ref();
        let current = records::fetch(store, secret_id, VersionStage::Current, None).await?;

        match store
            .get_secret_value(secret_id, VersionStage::Pending, Some(token))
            .await
        {
            Ok(_) => {
                info!("createSecret: Successfully retrieved pending secret");
                return Ok(StepOutcome::PendingExists);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let current = records::parse(VersionStage::Current, &current)?;
        let password = store
            .get_random_password(&self.config.exclude_characters)
            .await?;
        let pending = current.with_password(password);

        store
            .put_pending_value(secret_id, token, &pending.to_secret_string())
            .await?;
        info!(username = %pending.username, "createSecret: Successfully put pending secret");
        Ok(StepOutcome::PendingCreated)
    }

    /// `setSecret`: make the pending password live on the broker
    async fn activate_pending(&self, secret_id: &str, token: &str) -> Result<StepOutcome, RotationError> {
        let store = self.store.as_ref();
        let pending = records::load(store, secret_id, VersionStage::Pending, Some(token)).await?;
        let current = records::load(store, secret_id, VersionStage::Current, None).await?;
        let previous = records::load_optional(store, secret_id, VersionStage::Previous).await?;

        if self.validator.authenticates(&pending).await {
            info!("setSecret: AWSPENDING secret is already set as password on the broker");
            return Ok(StepOutcome::AlreadyActive);
        }

        let chain = CandidateChain::for_rotation(current, previous);
        let auth = chain.select(&pending, self.validator.as_ref()).await?;

        self.updater.push_password(&auth.record, &pending).await?;
        info!(username = %pending.username, via = %auth.stage, "setSecret: Successfully set password on the broker");
        Ok(StepOutcome::PasswordUpdated { via: auth.stage })
    }

    /// `testSecret`: the pending credential must log in
    async fn verify_pending(&self, secret_id: &str, token: &str) -> Result<StepOutcome, RotationError> {
        let pending =
            records::load(self.store.as_ref(), secret_id, VersionStage::Pending, Some(token)).await?;

        if !self.validator.authenticates(&pending).await {
            return Err(RotationError::VerificationFailed {
                secret_id: secret_id.to_string(),
                version_id: token.to_string(),
            });
        }

        info!("testSecret: Successfully authenticated with AWSPENDING secret");
        Ok(StepOutcome::Verified)
    }

    /// `finishSecret`: move `AWSCURRENT` onto `token`
    async fn finish(&self, secret_id: &str, token: &str) -> Result<StepOutcome, RotationError> {
        let state = self.store.describe_rotation_state(secret_id).await?;
        let holder = current_holder(secret_id, &state)?;

        if holder.as_deref() == Some(token) {
            info!("finishSecret: Version already marked as AWSCURRENT");
            return Ok(StepOutcome::AlreadyCurrent);
        }

        self.store
            .update_version_stage(secret_id, VersionStage::Current, token, holder.as_deref())
            .await?;
        info!(previous = ?holder, "finishSecret: Successfully set AWSCURRENT stage");
        Ok(StepOutcome::Promoted { previous: holder })
    }
}

/// Check the version being rotated is staged for rotation
fn check_staging(secret_id: &str, token: &str, state: &RotationState) -> Result<Staging, RotationError> {
    if !state.rotation_enabled {
        return Err(RotationError::RotationNotEnabled {
            secret_id: secret_id.to_string(),
        });
    }

    current_holder(secret_id, state)?;

    let stages = state
        .stages_of(token)
        .ok_or_else(|| RotationError::UnknownVersion {
            secret_id: secret_id.to_string(),
            version_id: token.to_string(),
        })?;

    if VersionStage::Current.is_in(stages) {
        Ok(Staging::AlreadyCurrent)
    } else if VersionStage::Pending.is_in(stages) {
        Ok(Staging::Pending)
    } else {
        Err(RotationError::NotPendingVersion {
            secret_id: secret_id.to_string(),
            version_id: token.to_string(),
        })
    }
}

/// The single version labelled `AWSCURRENT`, if any
fn current_holder(secret_id: &str, state: &RotationState) -> Result<Option<String>, RotationError> {
    match state.versions_with(VersionStage::Current).as_slice() {
        [] => Ok(None),
        [one] => Ok(Some((*one).to_string())),
        many => Err(RotationError::MultipleCurrentVersions {
            secret_id: secret_id.to_string(),
            versions: many.iter().map(|v| (*v).to_string()).collect(),
        }),
    }
}
