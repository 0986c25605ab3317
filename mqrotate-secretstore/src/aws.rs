//! AWS Secrets Manager adapter

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::config::Region;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::Client;
use mqrotate_core::VersionStage;
use tracing::{debug, info};

use crate::traits::{RotationState, SecretStore, SecretValue, StoreError};

const DEFAULT_REGION: &str = "us-east-1";

/// `SecretStore` backed by the AWS SDK Secrets Manager client
#[derive(Debug, Clone)]
pub struct SecretsManagerClient {
    client: Client,
}

impl SecretsManagerClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Load configuration from the default AWS provider chains.
    ///
    /// Credentials come from the environment, shared profiles, web identity,
    /// the container endpoint or instance metadata. The region is `region`,
    /// else whatever the provider chain finds, else `us-east-1`.
    /// `endpoint_url` replaces the regional endpoint.
    pub async fn load(region: Option<&str>, endpoint_url: Option<&str>) -> Self {
        let region = RegionProviderChain::first_try(region.map(|r| Region::new(r.to_string())))
            .or_default_provider()
            .or_else(DEFAULT_REGION);

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let Some(endpoint) = endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        info!(
            region = ?sdk_config.region(),
            endpoint = ?endpoint_url,
            "Initialized AWS Secrets Manager client"
        );
        Self::new(Client::new(&sdk_config))
    }
}

#[async_trait]
impl SecretStore for SecretsManagerClient {
    async fn describe_rotation_state(&self, secret_id: &str) -> Result<RotationState, StoreError> {
        let output = self
            .client
            .describe_secret()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| store_error("DescribeSecret", e))?;

        Ok(RotationState {
            rotation_enabled: output.rotation_enabled.unwrap_or(false),
            version_ids_to_stages: output.version_ids_to_stages.unwrap_or_default(),
        })
    }

    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: VersionStage,
        version_id: Option<&str>,
    ) -> Result<SecretValue, StoreError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .version_stage(stage.as_str())
            .set_version_id(version_id.map(String::from))
            .send()
            .await
            .map_err(|e| store_error("GetSecretValue", e))?;

        let version_id = output.version_id.ok_or_else(|| {
            StoreError::Transport("GetSecretValue response has no VersionId".to_string())
        })?;
        Ok(SecretValue {
            version_id,
            secret_string: output.secret_string,
            version_stages: output.version_stages.unwrap_or_default(),
        })
    }

    async fn put_pending_value(
        &self,
        secret_id: &str,
        version_id: &str,
        secret_string: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_secret_value()
            .secret_id(secret_id)
            .client_request_token(version_id)
            .secret_string(secret_string)
            .version_stages(VersionStage::Pending.as_str())
            .send()
            .await
            .map_err(|e| store_error("PutSecretValue", e))?;

        debug!(secret_id = %secret_id, version_id = %version_id, "Stored pending value");
        Ok(())
    }

    async fn get_random_password(&self, exclude_characters: &str) -> Result<String, StoreError> {
        let output = self
            .client
            .get_random_password()
            .set_exclude_characters(
                Some(exclude_characters.to_string()).filter(|c| !c.is_empty()),
            )
            .send()
            .await
            .map_err(|e| store_error("GetRandomPassword", e))?;

        output.random_password.ok_or_else(|| {
            StoreError::Transport("GetRandomPassword response has no RandomPassword".to_string())
        })
    }

    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> Result<(), StoreError> {
        self.client
            .update_secret_version_stage()
            .secret_id(secret_id)
            .version_stage(stage.as_str())
            .move_to_version_id(move_to)
            .set_remove_from_version_id(remove_from.map(String::from))
            .send()
            .await
            .map_err(|e| store_error("UpdateSecretVersionStage", e))?;

        debug!(secret_id = %secret_id, stage = %stage, move_to = %move_to, "Moved version stage");
        Ok(())
    }
}

/// Map an SDK failure onto a `StoreError` by its service error code
fn store_error<E, R>(operation: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = err.message().unwrap_or_default().to_string();
    match err.code() {
        Some(code) => from_service_code(code, message),
        None => StoreError::Transport(format!("{}: {}", operation, DisplayErrorContext(&err))),
    }
}

fn from_service_code(code: &str, message: String) -> StoreError {
    match code {
        "ResourceNotFoundException" => StoreError::ResourceNotFound(message),
        "ResourceExistsException" => StoreError::ResourceExists(message),
        "InvalidParameterException" => StoreError::InvalidParameter(message),
        "InvalidRequestException" => StoreError::InvalidRequest(message),
        _ => StoreError::Service {
            code: code.to_string(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_codes_map_onto_store_errors() {
        let err = from_service_code(
            "ResourceNotFoundException",
            "Secrets Manager can't find the specified secret.".to_string(),
        );
        assert!(err.is_not_found());

        let err = from_service_code("ResourceExistsException", "exists".to_string());
        assert!(matches!(err, StoreError::ResourceExists(m) if m == "exists"));

        let err = from_service_code("AccessDeniedException", "no".to_string());
        assert!(matches!(err, StoreError::Service { code, .. } if code == "AccessDeniedException"));
    }

    #[tokio::test]
    async fn test_load_honours_explicit_region_and_endpoint() {
        let client = SecretsManagerClient::load(Some("eu-west-1"), Some("http://127.0.0.1:4566")).await;
        let config = client.client.config();

        assert_eq!(
            config.region().map(ToString::to_string).as_deref(),
            Some("eu-west-1")
        );
    }
}
