//! mqrotate - message broker credential rotation
//!
//! Runs one step of a Secrets Manager rotation for a broker user: stage a new
//! password, push it to the broker's management API, verify it, then promote
//! it to `AWSCURRENT`.

mod config;

use anyhow::{bail, Context};
use clap::Parser;
use mqrotate_broker::{BrokerConfig, ManagementApiClient};
use mqrotate_rotation::{RotationError, RotationRequest, Rotator, RotatorConfig};
use mqrotate_secretstore::SecretsManagerClient;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "mqrotate")]
#[command(about = "Rotate a broker user's password held in AWS Secrets Manager", long_about = None)]
struct Args {
    /// Rotation event JSON file, or `-` to read it from stdin
    #[arg(long, conflicts_with_all = ["secret_id", "token", "step"])]
    event: Option<PathBuf>,

    /// Secret ARN or name
    #[arg(long, required_unless_present = "event")]
    secret_id: Option<String>,

    /// Version id being rotated (ClientRequestToken)
    #[arg(long, required_unless_present = "event")]
    token: Option<String>,

    /// createSecret, setSecret, testSecret or finishSecret
    #[arg(long, required_unless_present = "event")]
    step: Option<String>,

    /// Broker management endpoint
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Characters generated passwords must not contain
    #[arg(long, env = "EXCLUDE_CHARACTERS")]
    exclude_characters: Option<String>,

    /// Secrets Manager endpoint
    #[arg(long, env = "MQROTATE_SECRETS_ENDPOINT")]
    secrets_endpoint: Option<String>,

    /// AWS region of the secret
    #[arg(long)]
    region: Option<String>,

    /// Configuration file (defaults to ./mqrotate.toml when present)
    #[arg(long, env = "MQROTATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MQROTATE_LOG_LEVEL")]
    log_level: String,
}

impl Args {
    async fn request(&self) -> anyhow::Result<RotationRequest> {
        if let Some(path) = &self.event {
            let event = read_event(path).await?;
            return serde_json::from_str::<RotationRequest>(&event).context("Invalid rotation event");
        }

        match (&self.secret_id, &self.token, &self.step) {
            (Some(secret_id), Some(token), Some(step)) => {
                Ok(RotationRequest::new(secret_id, token, step))
            }
            _ => bail!("--secret-id, --token and --step are required without --event"),
        }
    }

    /// Command-line values win over the file and environment
    fn apply_to(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.broker.host = Some(host.clone());
        }
        if let Some(exclude) = &self.exclude_characters {
            config.rotation.exclude_characters = exclude.clone();
        }
        if let Some(endpoint) = &self.secrets_endpoint {
            config.secrets.endpoint = Some(endpoint.clone());
        }
        if let Some(region) = &self.region {
            config.secrets.region = Some(region.clone());
        }
    }
}

async fn read_event(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        return tokio::task::spawn_blocking(|| std::io::read_to_string(std::io::stdin()))
            .await?
            .context("Failed to read event from stdin");
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read event file {}", path.display()))
}

async fn build_rotator(config: &Config) -> anyhow::Result<Rotator> {
    let host = config
        .broker
        .host
        .as_deref()
        .context("No broker host configured (--host, HOST or broker.host)")?;
    let broker_config = BrokerConfig::parse(host)
        .with_context(|| format!("Invalid broker host {}", host))?
        .with_timeout(Duration::from_secs(config.broker.timeout_secs));
    let broker = Arc::new(ManagementApiClient::new(broker_config)?);

    let store = SecretsManagerClient::load(
        config.secrets.region.as_deref(),
        config.secrets.endpoint.as_deref(),
    )
    .await;

    Ok(Rotator::with_broker(Arc::new(store), broker).with_config(RotatorConfig {
        exclude_characters: config.rotation.exclude_characters.clone(),
    }))
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply_to(&mut config);

    let request = args.request().await?;
    let rotator = build_rotator(&config).await?;

    info!(secret_id = %request.secret_id, step = %request.step, "Starting rotation step");
    let outcome = rotator.rotate(&request).await?;
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing; stdout carries the result
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mqrotate={}", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<RotationError>() {
                Some(rotation) => println!("{}", rotation.to_json()),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_or_event_required() {
        assert!(Args::try_parse_from(["mqrotate"]).is_err());
        assert!(Args::try_parse_from(["mqrotate", "--event", "-", "--step", "create"]).is_err());

        let args = Args::try_parse_from([
            "mqrotate",
            "--secret-id",
            "mq",
            "--token",
            "t",
            "--step",
            "create",
        ])
        .unwrap();
        assert_eq!(args.step.as_deref(), Some("create"));
    }

    #[tokio::test]
    async fn test_request_from_event_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(
            &path,
            r#"{"SecretId":"mq","ClientRequestToken":"t","Step":"setSecret"}"#,
        )
        .unwrap();

        let args = Args::try_parse_from(["mqrotate", "--event", path.to_str().unwrap()]).unwrap();
        let request = args.request().await.unwrap();
        assert_eq!(request, RotationRequest::new("mq", "t", "setSecret"));
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "mqrotate",
            "--event",
            "-",
            "--host",
            "https://broker.example",
            "--exclude-characters",
            "abc",
        ])
        .unwrap();
        let mut config = Config::default();
        config.broker.host = Some("https://other".to_string());
        args.apply_to(&mut config);

        assert_eq!(config.broker.host.as_deref(), Some("https://broker.example"));
        assert_eq!(config.rotation.exclude_characters, "abc");
    }

    #[tokio::test]
    async fn test_rotator_requires_broker_host() {
        let config = Config::default();
        let err = build_rotator(&config).await.err().unwrap();
        assert!(err.to_string().contains("No broker host"));
    }
}
