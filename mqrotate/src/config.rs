//! Configuration management

use mqrotate_rotation::DEFAULT_EXCLUDE_CHARACTERS;
use serde::Deserialize;
#[cfg(test)]
use std::collections::HashMap;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerSection,

    #[serde(default)]
    pub rotation: RotationSection,

    #[serde(default)]
    pub secrets: SecretsSection,
}

#[derive(Debug, Deserialize)]
pub struct BrokerSection {
    /// Management endpoint, e.g. `https://b-1234.mq.eu-west-1.amazonaws.com`
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RotationSection {
    #[serde(default = "default_exclude_characters")]
    pub exclude_characters: String,
}

impl Default for RotationSection {
    fn default() -> Self {
        Self {
            exclude_characters: default_exclude_characters(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SecretsSection {
    /// Overrides the regional Secrets Manager endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Region of the secret; the AWS provider chain decides when unset
    #[serde(default)]
    pub region: Option<String>,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_exclude_characters() -> String {
    DEFAULT_EXCLUDE_CHARACTERS.to_string()
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("MQROTATE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load `path` (or `mqrotate.toml` if present) overlaid with `MQROTATE_*`
    /// environment variables, e.g. `MQROTATE_BROKER__HOST`
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("mqrotate").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(environment())
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }

    /// Like `load`, with the environment given as a map
    #[cfg(test)]
    fn load_with_env(path: &Path, env: HashMap<String, String>) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(environment().source(Some(env)))
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}
