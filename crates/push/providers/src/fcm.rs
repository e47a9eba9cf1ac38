//! Firebase Cloud Messaging (legacy HTTP API) provider.

use std::time::Duration;

use color_eyre::eyre::{WrapErr as _, bail, eyre};
use push_core::config::{EngineConfig, FcmConfig};
use push_core::{Message, Outcome, Priority};
use push_engine::{Job, Provider};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::retry::{Attempt, RetryPolicy};

/// Devices per multicast request.
pub const MAX_REGISTRATION_IDS: usize = 1000;

/// Largest data payload FCM accepts.
pub const MAX_PAYLOAD_BYTES: usize = 4096;

/// Longest time to live FCM honours (four weeks).
const MAX_TIME_TO_LIVE: u64 = 2_419_200;

/// Rendered FCM content shared by every batch of a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FcmPayload {
    #[serde(skip_serializing_if = "Map::is_empty")]
    data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<FcmNotification>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct FcmNotification {
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<String>,
}

#[derive(Debug, Serialize)]
struct FcmRequest<'a> {
    registration_ids: &'a [String],
    #[serde(flatten)]
    payload: &'a FcmPayload,
    priority: &'static str,
    time_to_live: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    registration_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl FcmResult {
    fn outcome(self) -> Outcome {
        match (self.message_id, self.registration_id, self.error.as_deref()) {
            (Some(_), Some(new_id), _) => Outcome::Changed { new_id },
            (Some(_), None, _) => Outcome::Delivered,
            (None, _, Some("InvalidRegistration" | "NotRegistered")) => Outcome::Expired,
            (None, _, _) => Outcome::Failed,
        }
    }
}

/// Build the FCM payload for a message.
pub fn render(message: &Message) -> color_eyre::eyre::Result<FcmPayload> {
    let payload = FcmPayload {
        data: message.payload.data.clone(),
        notification: message.payload.alert.clone().map(|body| FcmNotification {
            body,
            sound: message.payload.sound.clone(),
        }),
    };

    let size = serde_json::to_vec(&payload)
        .wrap_err("failed to encode FCM payload")?
        .len();
    if size > MAX_PAYLOAD_BYTES {
        bail!("FCM payload is {size} bytes, limit is {MAX_PAYLOAD_BYTES}");
    }

    Ok(payload)
}

/// FCM provider; sends up to 1000 devices per request.
pub struct FcmProvider {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    dry_run: bool,
    batch_size: usize,
    retry: RetryPolicy,
}

impl FcmProvider {
    pub fn new(config: &FcmConfig, engine: &EngineConfig) -> color_eyre::eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("failed to build FCM HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            dry_run: !engine.environment.is_production(),
            batch_size: engine.batch_size.clamp(1, MAX_REGISTRATION_IDS),
            retry: RetryPolicy::new(engine.retry_count),
        })
    }

    /// Override the delay before the first retry.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry.initial_backoff = backoff;
        self
    }

    async fn post(&self, request: &FcmRequest<'_>) -> Attempt<FcmResponse> {
        let response = match self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.api_key))
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(eyre!(e).wrap_err("FCM request failed")),
        };

        let status = response.status();
        if status.is_server_error() {
            return Attempt::Retry(eyre!("FCM returned {status}"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Attempt::Fail(eyre!("FCM rejected request with {status}: {body}"));
        }

        match response.json::<FcmResponse>().await {
            Ok(parsed) => Attempt::Done(parsed),
            Err(e) => Attempt::Fail(eyre!(e).wrap_err("failed to decode FCM response")),
        }
    }
}

impl Provider for FcmProvider {
    type Payload = FcmPayload;

    fn name(&self) -> &'static str {
        "fcm"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn render(&self, message: &Message) -> color_eyre::eyre::Result<FcmPayload> {
        render(message)
    }

    async fn send(&self, job: &Job<FcmPayload>) -> color_eyre::eyre::Result<Vec<Outcome>> {
        let request = FcmRequest {
            registration_ids: &job.devices,
            payload: &job.payload,
            priority: match job.priority {
                Priority::Normal => "normal",
                Priority::High => "high",
            },
            time_to_live: job.expiration.min(MAX_TIME_TO_LIVE),
            dry_run: self.dry_run,
        };

        let request = &request;
        let response = self
            .retry
            .run("fcm", job.message_id, || self.post(request))
            .await?;

        if response.results.len() != job.devices.len() {
            bail!(
                "FCM returned {} results for {} devices",
                response.results.len(),
                job.devices.len()
            );
        }
        Ok(response.results.into_iter().map(FcmResult::outcome).collect())
    }
}
