//! HTTP management API client

use async_trait::async_trait;
use mqrotate_core::CredentialRecord;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::traits::{CredentialValidator, PasswordUpdater, UpdateError};

/// Characters left as-is in the username path segment (RFC 3986 unreserved)
const USERNAME_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the broker's management API lives
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Scheme, host and optional port, e.g. `https://b-1234.mq.eu-west-1.amazonaws.com:443`
    pub host: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

impl BrokerConfig {
    pub fn new(host: Url) -> Self {
        Self {
            host,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn parse(host: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(host)?))
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct UserBody<'a> {
    username: &'a str,
    password: &'a str,
    tags: &'a str,
}

/// Client for the broker's `/api/users/{name}` endpoint
pub struct ManagementApiClient {
    config: BrokerConfig,
    client: reqwest::Client,
}

impl ManagementApiClient {
    pub fn new(config: BrokerConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn user_url(&self, username: &str) -> String {
        format!(
            "{}/api/users/{}",
            self.config.host.as_str().trim_end_matches('/'),
            utf8_percent_encode(username, USERNAME_SEGMENT)
        )
    }
}

#[async_trait]
impl CredentialValidator for ManagementApiClient {
    async fn authenticates(&self, credential: &CredentialRecord) -> bool {
        let response = self
            .client
            .get(self.user_url(&credential.username))
            .basic_auth(&credential.username, Some(&credential.password))
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                debug!(username = %credential.username, status = %status, "Broker authentication attempt");
                status == StatusCode::OK
            }
            Err(e) => {
                warn!(username = %credential.username, error = %e, "Broker authentication attempt failed");
                false
            }
        }
    }
}

#[async_trait]
impl PasswordUpdater for ManagementApiClient {
    async fn push_password(
        &self,
        auth: &CredentialRecord,
        target: &CredentialRecord,
    ) -> Result<(), UpdateError> {
        let body = UserBody {
            username: &target.username,
            password: &target.password,
            tags: &target.username,
        };

        let response = self
            .client
            .put(self.user_url(&target.username))
            .basic_auth(&auth.username, Some(&auth.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| UpdateError::Transport {
                username: target.username.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Rejected {
                username: target.username.clone(),
                status: status.as_u16(),
            });
        }

        debug!(username = %target.username, as_user = %auth.username, status = %status, "Broker password updated");
        Ok(())
    }
}
