//! Secrets Manager JSON protocol server over an in-memory store

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::post,
    Router,
};
use aws_sdk_secretsmanager::config::{BehaviorVersion, Credentials, Region};
use bytes::Bytes;
use mqrotate_auth::{parse_authorization_header, verify_signature};
use mqrotate_core::VersionStage;
use mqrotate_secretstore::{InMemorySecretStore, SecretStore, SecretsManagerClient, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::server::TestServer;

struct SecretsState {
    store: Arc<InMemorySecretStore>,
    /// When set, every request must carry a valid SigV4 signature
    credentials: Option<Credentials>,
}

/// Serves `InMemorySecretStore` on a random local port
pub struct SecretsManagerServer {
    store: Arc<InMemorySecretStore>,
    credentials: Option<Credentials>,
    server: TestServer,
}

impl SecretsManagerServer {
    /// Serve `store` without checking signatures
    pub async fn start(store: Arc<InMemorySecretStore>) -> Self {
        Self::start_inner(store, None).await
    }

    /// Serve `store`, rejecting requests not signed with `credentials`
    pub async fn start_with_credentials(
        store: Arc<InMemorySecretStore>,
        credentials: Credentials,
    ) -> Self {
        Self::start_inner(store, Some(credentials)).await
    }

    async fn start_inner(store: Arc<InMemorySecretStore>, credentials: Option<Credentials>) -> Self {
        let state = Arc::new(SecretsState {
            store: store.clone(),
            credentials: credentials.clone(),
        });
        let router = Router::new()
            .route("/", post(handle_request))
            .with_state(state);

        let server = TestServer::start(router)
            .await
            .expect("failed to start secrets manager server");
        Self {
            store,
            credentials,
            server,
        }
    }

    pub fn url(&self) -> &str {
        self.server.url()
    }

    pub fn store(&self) -> &Arc<InMemorySecretStore> {
        &self.store
    }

    /// SDK-backed client for this server, signing with the server's
    /// credentials when it has any
    pub fn client(&self) -> SecretsManagerClient {
        let credentials = self
            .credentials
            .clone()
            .unwrap_or_else(|| Credentials::new("test", "test", None, None, "mqrotate-test"));
        self.client_with(credentials)
    }

    /// SDK-backed client for this server signing with `credentials`
    pub fn client_with(&self, credentials: Credentials) -> SecretsManagerClient {
        let config = aws_sdk_secretsmanager::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(self.url())
            .credentials_provider(credentials)
            .build();
        SecretsManagerClient::new(aws_sdk_secretsmanager::Client::from_conf(config))
    }
}

/// Handle Secrets Manager requests based on X-Amz-Target header
async fn handle_request(
    State(state): State<Arc<SecretsState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = headers
        .get("x-amz-target")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    info!(target = %target, "Secrets Manager request");

    if let Some(credentials) = &state.credentials {
        if !signature_is_valid(&headers, &body, credentials) {
            return error_response(
                StatusCode::FORBIDDEN,
                "InvalidSignatureException",
                "The request signature we calculated does not match the signature you provided.",
            );
        }
    }

    let result = match target.as_str() {
        "secretsmanager.DescribeSecret" => handle_describe_secret(&state.store, &body).await,
        "secretsmanager.GetSecretValue" => handle_get_secret_value(&state.store, &body).await,
        "secretsmanager.PutSecretValue" => handle_put_secret_value(&state.store, &body).await,
        "secretsmanager.GetRandomPassword" => handle_get_random_password(&state.store, &body).await,
        "secretsmanager.UpdateSecretVersionStage" => {
            handle_update_secret_version_stage(&state.store, &body).await
        }
        _ => {
            warn!(target = %target, "Unknown Secrets Manager operation");
            return error_response(
                StatusCode::BAD_REQUEST,
                "UnknownOperationException",
                &format!("Unknown operation: {}", target),
            );
        }
    };

    match result {
        Ok(value) => json_response(StatusCode::OK, &value),
        Err(e) => store_error_response(&e),
    }
}

// === Request/Response types ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecretRequest {
    secret_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecretResponse {
    #[serde(rename = "ARN")]
    arn: String,
    name: String,
    rotation_enabled: bool,
    version_ids_to_stages: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSecretValueRequest {
    secret_id: String,
    version_id: Option<String>,
    version_stage: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetSecretValueResponse {
    #[serde(rename = "ARN")]
    arn: String,
    name: String,
    version_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_string: Option<String>,
    version_stages: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutSecretValueRequest {
    secret_id: String,
    client_request_token: Option<String>,
    secret_string: String,
    #[serde(default)]
    version_stages: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutSecretValueResponse {
    #[serde(rename = "ARN")]
    arn: String,
    name: String,
    version_id: String,
    version_stages: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetRandomPasswordRequest {
    #[serde(default)]
    exclude_characters: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetRandomPasswordResponse {
    random_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateSecretVersionStageRequest {
    secret_id: String,
    version_stage: String,
    move_to_version_id: String,
    remove_from_version_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateSecretVersionStageResponse {
    #[serde(rename = "ARN")]
    arn: String,
    name: String,
}

// === Handlers ===

async fn handle_describe_secret(
    store: &InMemorySecretStore,
    body: &[u8],
) -> Result<serde_json::Value, StoreError> {
    let req: DescribeSecretRequest = parse_body(body)?;
    let secret = store.get_secret(&req.secret_id)?;

    to_value(&DescribeSecretResponse {
        arn: secret.arn.clone(),
        name: secret.name.clone(),
        rotation_enabled: secret.rotation_enabled,
        version_ids_to_stages: secret.version_ids_to_stages(),
    })
}

async fn handle_get_secret_value(
    store: &InMemorySecretStore,
    body: &[u8],
) -> Result<serde_json::Value, StoreError> {
    let req: GetSecretValueRequest = parse_body(body)?;
    let stage = parse_stage(req.version_stage.as_deref().unwrap_or("AWSCURRENT"))?;

    let value = store
        .get_secret_value(&req.secret_id, stage, req.version_id.as_deref())
        .await?;
    let secret = store.get_secret(&req.secret_id)?;

    to_value(&GetSecretValueResponse {
        arn: secret.arn,
        name: secret.name,
        version_id: value.version_id,
        secret_string: value.secret_string,
        version_stages: value.version_stages,
    })
}

async fn handle_put_secret_value(
    store: &InMemorySecretStore,
    body: &[u8],
) -> Result<serde_json::Value, StoreError> {
    let req: PutSecretValueRequest = parse_body(body)?;

    let pending = VersionStage::Pending.is_in(&req.version_stages);
    let version_id = match (pending, req.client_request_token) {
        (true, Some(token)) => {
            store
                .put_pending_value(&req.secret_id, &token, &req.secret_string)
                .await?;
            token
        }
        (true, None) => {
            return Err(StoreError::InvalidParameter(
                "ClientRequestToken is required for AWSPENDING".to_string(),
            ))
        }
        (false, _) => store.put_secret_value(&req.secret_id, &req.secret_string)?,
    };

    let secret = store.get_secret(&req.secret_id)?;
    let version_stages = secret
        .versions
        .get(&version_id)
        .map(|v| v.version_stages.clone())
        .unwrap_or_default();

    to_value(&PutSecretValueResponse {
        arn: secret.arn,
        name: secret.name,
        version_id,
        version_stages,
    })
}

async fn handle_get_random_password(
    store: &InMemorySecretStore,
    body: &[u8],
) -> Result<serde_json::Value, StoreError> {
    let req: GetRandomPasswordRequest = parse_body(body)?;
    let random_password = store.get_random_password(&req.exclude_characters).await?;

    to_value(&GetRandomPasswordResponse { random_password })
}

async fn handle_update_secret_version_stage(
    store: &InMemorySecretStore,
    body: &[u8],
) -> Result<serde_json::Value, StoreError> {
    let req: UpdateSecretVersionStageRequest = parse_body(body)?;
    let stage = parse_stage(&req.version_stage)?;

    store
        .update_version_stage(
            &req.secret_id,
            stage,
            &req.move_to_version_id,
            req.remove_from_version_id.as_deref(),
        )
        .await?;
    let secret = store.get_secret(&req.secret_id)?;

    to_value(&UpdateSecretVersionStageResponse {
        arn: secret.arn,
        name: secret.name,
    })
}

// === Helpers ===

fn parse_body<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(body).map_err(|e| StoreError::InvalidRequest(e.to_string()))
}

fn parse_stage(stage: &str) -> Result<VersionStage, StoreError> {
    stage.parse().map_err(StoreError::InvalidParameter)
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::InvalidRequest(e.to_string()))
}

fn signature_is_valid(headers: &HeaderMap, body: &[u8], credentials: &Credentials) -> bool {
    let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_authorization_header(v).ok())
    else {
        return false;
    };
    if auth.access_key != credentials.access_key_id() {
        return false;
    }

    let pairs: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();

    verify_signature("POST", "/", "", &pairs, body, &auth, credentials.secret_access_key())
        .unwrap_or(false)
}

fn store_error_response(error: &StoreError) -> Response {
    let (status, error_type) = match error {
        StoreError::ResourceNotFound(_) => (StatusCode::BAD_REQUEST, "ResourceNotFoundException"),
        StoreError::ResourceExists(_) => (StatusCode::BAD_REQUEST, "ResourceExistsException"),
        StoreError::InvalidParameter(_) => (StatusCode::BAD_REQUEST, "InvalidParameterException"),
        StoreError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "InvalidRequestException"),
        StoreError::Transport(_) | StoreError::Service { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "InternalServiceError")
        }
    };
    error_response(status, error_type, &error.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let body = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/x-amz-json-1.1")
        .body(Body::from(body))
        .unwrap_or_default()
}

fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    let body = serde_json::json!({
        "__type": error_type,
        "message": message
    });
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/x-amz-json-1.1")
        .body(Body::from(body.to_string()))
        .unwrap_or_default()
}
