//! Huawei Push Kit provider.
//!
//! Requests are authorized with an OAuth access token that a
//! [`CredentialManager`] keeps fresh in the background.

use std::time::Duration;

use color_eyre::eyre::{WrapErr as _, bail, eyre};
use push_core::config::{EngineConfig, HcmConfig};
use push_core::{Message, Outcome, Priority};
use push_engine::{CredentialManager, Grant, Job, Provider, RefreshPolicy, TokenSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::retry::{Attempt, RetryPolicy};

/// Devices per request.
pub const MAX_TOKENS: usize = 1000;

/// Largest data payload Push Kit accepts.
pub const MAX_PAYLOAD_BYTES: usize = 4096;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(5);

const CODE_SUCCESS: &str = "80000000";
const CODE_PARTIAL_SUCCESS: &str = "80100000";
const CODE_ALL_TOKENS_INVALID: &str = "80300007";
const CODE_TOKEN_EXPIRED: &str = "80200003";
const CODE_TOKEN_FAILED: &str = "80200001";

/// OAuth `client_credentials` exchange against the Huawei login service.
pub struct HcmTokenSource {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

impl HcmTokenSource {
    pub fn new(config: &HcmConfig) -> color_eyre::eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .wrap_err("failed to build HCM token client")?;

        Ok(Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.app_id.clone(),
            client_secret: config.app_secret.clone(),
        })
    }
}

impl TokenSource for HcmTokenSource {
    async fn exchange(&self) -> color_eyre::eyre::Result<Grant> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .wrap_err("access token request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("access token request returned {status}");
        }

        let body: TokenResponse = response
            .json()
            .await
            .wrap_err("failed to decode access token response")?;

        Ok(Grant {
            access_token: body.access_token,
            expires_in: Duration::from_secs(body.expires_in),
        })
    }
}

/// Rendered Push Kit content shared by every batch of a message.
#[derive(Debug, Clone, PartialEq)]
pub struct HcmPayload {
    /// Data payload, sent as a JSON-encoded string.
    data: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    validate_only: bool,
    message: HcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct HcmMessage<'a> {
    data: &'a str,
    android: AndroidConfig,
    token: &'a [String],
}

#[derive(Debug, Serialize)]
struct AndroidConfig {
    ttl: String,
    urgency: &'static str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialResult {
    #[serde(default)]
    illegal_tokens: Vec<String>,
}

impl SendResponse {
    fn outcomes(&self, devices: &[String]) -> color_eyre::eyre::Result<Vec<Outcome>> {
        let all = |outcome: Outcome| vec![outcome; devices.len()];
        match self.code.as_str() {
            CODE_SUCCESS => Ok(all(Outcome::Delivered)),
            CODE_ALL_TOKENS_INVALID => Ok(all(Outcome::Expired)),
            CODE_PARTIAL_SUCCESS => {
                let partial: PartialResult = serde_json::from_str(&self.msg)
                    .wrap_err("failed to decode partial success details")?;
                Ok(devices
                    .iter()
                    .map(|device| {
                        if partial.illegal_tokens.contains(device) {
                            Outcome::Expired
                        } else {
                            Outcome::Delivered
                        }
                    })
                    .collect())
            }
            code => {
                tracing::warn!(code, msg = %self.msg, "HCM rejected message");
                Ok(all(Outcome::Failed))
            }
        }
    }
}

/// Build the Push Kit payload for a message.
pub fn render(message: &Message) -> color_eyre::eyre::Result<HcmPayload> {
    let data = serde_json::to_string(&Value::Object(message.payload.data.clone()))
        .wrap_err("failed to encode HCM payload")?;
    if data.len() > MAX_PAYLOAD_BYTES {
        bail!(
            "HCM payload is {} bytes, limit is {MAX_PAYLOAD_BYTES}",
            data.len()
        );
    }
    Ok(HcmPayload { data })
}

/// Push Kit provider; sends up to 1000 devices per request.
pub struct HcmProvider {
    http: reqwest::Client,
    url: String,
    credentials: CredentialManager,
    validate_only: bool,
    batch_size: usize,
    retry: RetryPolicy,
}

impl HcmProvider {
    /// Create the provider and start refreshing its access token.
    /// Must be called inside a tokio runtime.
    pub fn new(config: &HcmConfig, engine: &EngineConfig) -> color_eyre::eyre::Result<Self> {
        let source = HcmTokenSource::new(config)?;
        let credentials = CredentialManager::spawn(source, RefreshPolicy::default());
        Self::with_credentials(config, engine, credentials)
    }

    pub fn with_credentials(
        config: &HcmConfig,
        engine: &EngineConfig,
        credentials: CredentialManager,
    ) -> color_eyre::eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("failed to build HCM HTTP client")?;

        Ok(Self {
            http,
            url: format!(
                "{}/v1/{}/messages:send",
                config.endpoint.trim_end_matches('/'),
                config.app_id
            ),
            credentials,
            validate_only: !engine.environment.is_production(),
            batch_size: engine.batch_size.clamp(1, MAX_TOKENS),
            retry: RetryPolicy::new(engine.retry_count),
        })
    }

    /// Override the delay before the first retry.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry.initial_backoff = backoff;
        self
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    async fn post(&self, request: &SendRequest<'_>) -> Attempt<SendResponse> {
        let token = self.credentials.wait_for_token().await;
        let response = match self
            .http
            .post(&self.url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(eyre!(e).wrap_err("HCM request failed")),
        };

        let status = response.status();
        if status.is_server_error() {
            return Attempt::Retry(eyre!("HCM returned {status}"));
        }

        let parsed = match response.json::<SendResponse>().await {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Attempt::Fail(eyre!(e).wrap_err("failed to decode HCM response"));
            }
            Err(_) => return Attempt::Fail(eyre!("HCM rejected request with {status}")),
        };

        match parsed.code.as_str() {
            CODE_TOKEN_EXPIRED | CODE_TOKEN_FAILED => {
                Attempt::Retry(eyre!("HCM access token rejected ({})", parsed.code))
            }
            _ if status.is_client_error() && parsed.code.is_empty() => {
                Attempt::Fail(eyre!("HCM rejected request with {status}"))
            }
            _ => Attempt::Done(parsed),
        }
    }
}

impl Provider for HcmProvider {
    type Payload = HcmPayload;

    fn name(&self) -> &'static str {
        "hcm"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn render(&self, message: &Message) -> color_eyre::eyre::Result<HcmPayload> {
        render(message)
    }

    async fn send(&self, job: &Job<HcmPayload>) -> color_eyre::eyre::Result<Vec<Outcome>> {
        let request = SendRequest {
            validate_only: self.validate_only,
            message: HcmMessage {
                data: &job.payload.data,
                android: AndroidConfig {
                    ttl: format!("{}s", job.expiration),
                    urgency: match job.priority {
                        Priority::High => "HIGH",
                        Priority::Normal => "NORMAL",
                    },
                },
                token: &job.devices,
            },
        };

        let request = &request;
        let response = self
            .retry
            .run("hcm", job.message_id, || self.post(request))
            .await?;
        response.outcomes(&job.devices)
    }
}
