//! Connection Parameter Sources
//!
//! Builds [`ConnectionParams`] from key/value pairs, `GATEWAY_*` environment
//! variables, or a flat YAML file with `${VAR}` / `${VAR:-default}`
//! interpolation. Missing, empty, or malformed values are errors; a session
//! manager must never be built from a partial configuration.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::session::{ConnectionParams, Credentials};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is absent.
    #[error("Missing required configuration value: {0}")]
    MissingValue(String),

    /// A required key is present but blank.
    #[error("Configuration value {0} cannot be empty")]
    EmptyValue(String),

    /// A value could not be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue {
        /// The key.
        key: String,
        /// The raw value.
        value: String,
    },

    /// Failed to read a configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),
}

// =============================================================================
// Key/Value Source
// =============================================================================

/// Raw, not yet validated values.
#[derive(Debug, Default, Deserialize)]
struct RawParams {
    #[serde(default, deserialize_with = "scalar")]
    username: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    password: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    ip: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    port: Option<String>,
    #[serde(default, alias = "clientport", deserialize_with = "scalar")]
    client_port: Option<String>,
}

/// YAML scalar that may arrive as text or as a number.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|value| match value {
        Scalar::Text(text) => text,
        Scalar::Unsigned(number) => number.to_string(),
        Scalar::Signed(number) => number.to_string(),
    }))
}

impl RawParams {
    fn set(&mut self, key: &str, value: String) {
        match key.trim().to_lowercase().as_str() {
            "username" => self.username = Some(value),
            "password" => self.password = Some(value),
            "ip" => self.ip = Some(value),
            "port" => self.port = Some(value),
            "clientport" | "client_port" => self.client_port = Some(value),
            other => debug!(key = other, "Ignoring unknown connection key"),
        }
    }

    fn validate(self) -> Result<ConnectionParams, ConfigError> {
        let username = required("username", self.username)?;
        let password = required("password", self.password)?;
        let ip = required("ip", self.ip)?;
        let server_port = port("port", self.port)?;
        let client_port = port("clientport", self.client_port)?;

        Ok(ConnectionParams::new(
            Credentials::new(&username, password),
            ip,
            server_port,
            client_port,
        ))
    }
}

fn required(key: &str, value: Option<String>) -> Result<String, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::MissingValue(key.to_string()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value.to_string())
}

fn port(key: &str, value: Option<String>) -> Result<u16, ConfigError> {
    let value = required(key, value)?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

impl ConnectionParams {
    /// Build from key/value pairs. Keys are case-insensitive: `username`,
    /// `password`, `ip`, `port`, `clientport`. Values are trimmed. Unknown
    /// keys are ignored.
    pub fn from_key_values<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self, ConfigError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut raw = RawParams::default();
        for (key, value) in pairs {
            raw.set(key.as_ref(), value.as_ref().to_string());
        }
        raw.validate()
    }

    /// Build from `GATEWAY_USERNAME`, `GATEWAY_PASSWORD`, `GATEWAY_IP`,
    /// `GATEWAY_PORT` and `GATEWAY_CLIENT_PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_lookup(|key| std::env::var(key).ok())
    }

    /// [`ConnectionParams::from_env`] over an arbitrary variable lookup.
    pub fn from_env_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        RawParams {
            username: lookup("GATEWAY_USERNAME"),
            password: lookup("GATEWAY_PASSWORD"),
            ip: lookup("GATEWAY_IP"),
            port: lookup("GATEWAY_PORT"),
            client_port: lookup("GATEWAY_CLIENT_PORT"),
        }
        .validate()
        .map_err(|err| match err {
            ConfigError::MissingValue(key) => ConfigError::MissingValue(env_name(&key)),
            ConfigError::EmptyValue(key) => ConfigError::EmptyValue(env_name(&key)),
            ConfigError::InvalidValue { key, value } => ConfigError::InvalidValue {
                key: env_name(&key),
                value,
            },
            other => other,
        })
    }
}

fn env_name(key: &str) -> String {
    match key {
        "clientport" => "GATEWAY_CLIENT_PORT".to_string(),
        other => format!("GATEWAY_{}", other.to_uppercase()),
    }
}

// =============================================================================
// YAML Source
// =============================================================================

/// Load connection parameters from a YAML file.
///
/// ```yaml
/// username: ${GATEWAY_USERNAME}
/// password: ${GATEWAY_PASSWORD}
/// ip: ${GATEWAY_IP:-127.0.0.1}
/// port: 9000
/// clientport: 9001
/// ```
pub fn load_params_file(path: impl AsRef<Path>) -> Result<ConnectionParams, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.display().to_string(),
        source,
    })?;
    load_params_from_string(&contents)
}

/// Load connection parameters from a YAML string.
pub fn load_params_from_string(yaml: &str) -> Result<ConnectionParams, ConfigError> {
    let interpolated = interpolate_env_vars(yaml, |key| std::env::var(key).ok());
    let raw: RawParams = serde_yaml_bw::from_str(&interpolated)?;
    raw.validate()
}

/// Replace `${VAR}` and `${VAR:-default}`. Unset or empty variables take the
/// default, or the empty string when there is none.
#[allow(clippy::expect_used)] // Static pattern.
fn interpolate_env_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    static ENV_VAR_REGEX: OnceLock<Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("env var regex is valid")
    });

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let default = caps.get(2).map_or("", |m| m.as_str());
        match lookup(&caps[1]) {
            Some(value) if !value.is_empty() => value,
            _ => default.to_string(),
        }
    })
    .into_owned()
}
