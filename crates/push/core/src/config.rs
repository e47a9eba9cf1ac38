//! Construction-time configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Legacy FCM HTTP endpoint.
pub const FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// Huawei Push Kit API base URL.
pub const HCM_ENDPOINT: &str = "https://push-api.cloud.huawei.com";

/// Huawei OAuth token endpoint.
pub const HCM_TOKEN_URL: &str = "https://oauth-login.cloud.huawei.com/oauth2/v3/token";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Config file not found at {0}")]
    NotFound(PathBuf),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    pub provider: ProviderConfig,
}

/// Dispatch engine sizing, shared by every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_sender_count")]
    pub sender_count: usize,
    /// Retries performed by the provider client before a send is dropped.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default)]
    pub environment: Environment,
    /// Upper bound on devices per provider request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_response_buffer")]
    pub response_buffer: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Sandbox,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    Apns(ApnsConfig),
    Fcm(FcmConfig),
    Hcm(HcmConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApnsConfig {
    pub auth: ApnsAuth,
    /// APNs topic, usually the app bundle ID.
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ApnsAuth {
    /// `.p8` signing key.
    Token {
        key_path: PathBuf,
        key_id: String,
        team_id: String,
    },
    /// PKCS#12 push certificate.
    Certificate { path: PathBuf, password: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    pub api_key: String,
    #[serde(default = "default_fcm_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HcmConfig {
    pub app_id: String,
    pub app_secret: String,
    #[serde(default = "default_hcm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_hcm_token_url")]
    pub token_url: String,
}

fn default_sender_count() -> usize {
    8
}

fn default_retry_count() -> u32 {
    3
}

fn default_batch_size() -> usize {
    1000
}

fn default_queue_capacity() -> usize {
    100_000
}

fn default_response_buffer() -> usize {
    1000
}

fn default_fcm_endpoint() -> String {
    FCM_ENDPOINT.to_string()
}

fn default_hcm_endpoint() -> String {
    HCM_ENDPOINT.to_string()
}

fn default_hcm_token_url() -> String {
    HCM_TOKEN_URL.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sender_count: default_sender_count(),
            retry_count: default_retry_count(),
            environment: Environment::default(),
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
            response_buffer: default_response_buffer(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("sender_count", self.sender_count),
            ("batch_size", self.batch_size),
            ("queue_capacity", self.queue_capacity),
            ("response_buffer", self.response_buffer),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(content)?;
        config.engine.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config: Config = r#"
            [provider]
            kind = "fcm"
            api_key = "secret"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.engine, EngineConfig::default());
        match config.provider {
            ProviderConfig::Fcm(fcm) => {
                assert_eq!(fcm.api_key, "secret");
                assert_eq!(fcm.endpoint, FCM_ENDPOINT);
            }
            other => panic!("unexpected provider: {other:?}"),
        }
    }

    #[test]
    fn test_apns_token_config() {
        let config: Config = r#"
            [engine]
            sender_count = 2
            environment = "production"

            [provider]
            kind = "apns"
            topic = "com.example.app"

            [provider.auth]
            method = "token"
            key_path = "/etc/push/AuthKey.p8"
            key_id = "KEY123"
            team_id = "TEAM456"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.engine.sender_count, 2);
        assert!(config.engine.environment.is_production());
        match config.provider {
            ProviderConfig::Apns(ApnsConfig {
                auth: ApnsAuth::Token { key_id, .. },
                topic,
            }) => {
                assert_eq!(key_id, "KEY123");
                assert_eq!(topic, "com.example.app");
            }
            other => panic!("unexpected provider: {other:?}"),
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result: Result<Config, _> = r#"
            [engine]
            sender_count = 0

            [provider]
            kind = "hcm"
            app_id = "1"
            app_secret = "s"
        "#
        .parse();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/push-relay.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
