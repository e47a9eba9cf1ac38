//! APNs provider using the a2 crate.

use a2::NotificationBuilder as _;
use color_eyre::eyre::{WrapErr as _, bail};
use push_core::config::{ApnsAuth, ApnsConfig, EngineConfig, Environment};
use push_core::{Message, Outcome, Priority};
use push_engine::{Job, Provider};
use serde_json::{Map, Value, json};

/// Largest payload APNs accepts for regular notifications.
pub const MAX_PAYLOAD_BYTES: usize = 4096;

/// Rendered alert shared by every device of a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    alert: Option<String>,
    sound: Option<String>,
    custom: Map<String, Value>,
}

impl Notification {
    /// The JSON document APNs receives, used for size checks.
    fn to_json(&self) -> Value {
        let mut aps = Map::new();
        if let Some(alert) = &self.alert {
            aps.insert("alert".into(), json!({ "body": alert }));
        }
        if let Some(sound) = &self.sound {
            aps.insert("sound".into(), Value::String(sound.clone()));
        }
        let mut root = self.custom.clone();
        root.insert("aps".into(), Value::Object(aps));
        Value::Object(root)
    }
}

/// Build the notification for a message.
pub fn render(message: &Message) -> color_eyre::eyre::Result<Notification> {
    let payload = &message.payload;
    if payload.custom.contains_key("aps") {
        bail!("custom data must not use the reserved `aps` key");
    }

    let notification = Notification {
        alert: payload.alert.clone(),
        sound: payload.sound.clone(),
        custom: payload.custom.clone(),
    };

    let size = serde_json::to_vec(&notification.to_json())
        .wrap_err("failed to encode APNs payload")?
        .len();
    if size > MAX_PAYLOAD_BYTES {
        bail!("APNs payload is {size} bytes, limit is {MAX_PAYLOAD_BYTES}");
    }

    Ok(notification)
}

/// Map an APNs rejection to a device outcome.
fn classify(code: u16, reason: Option<&a2::ErrorReason>) -> Outcome {
    match reason {
        Some(
            a2::ErrorReason::Unregistered
            | a2::ErrorReason::BadDeviceToken
            | a2::ErrorReason::DeviceTokenNotForTopic,
        ) => Outcome::Expired,
        _ if code == 410 => Outcome::Expired,
        _ => Outcome::Failed,
    }
}

fn apns_priority(priority: Priority) -> a2::Priority {
    match priority {
        Priority::Normal => a2::Priority::Normal,
        Priority::High => a2::Priority::High,
    }
}

/// Absolute `apns-expiration` for a time to live in seconds.
fn expiration_timestamp(ttl: u64) -> u64 {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    now.saturating_add(ttl)
}

fn endpoint(environment: Environment) -> a2::Endpoint {
    match environment {
        Environment::Production => a2::Endpoint::Production,
        Environment::Sandbox => a2::Endpoint::Sandbox,
    }
}

/// APNs provider; sends one device per job.
pub struct ApnsProvider {
    client: a2::Client,
    topic: String,
    retry_count: u32,
}

impl ApnsProvider {
    /// Create a provider authenticating with a `.p8` signing key.
    pub fn token(
        key_pem: &[u8],
        key_id: &str,
        team_id: &str,
        topic: impl Into<String>,
        environment: Environment,
        retry_count: u32,
    ) -> color_eyre::eyre::Result<Self> {
        let mut cursor = std::io::Cursor::new(key_pem);
        let config = a2::ClientConfig::new(endpoint(environment));

        let client = a2::Client::token(&mut cursor, key_id, team_id, config)
            .wrap_err("failed to create APNs client")?;

        Ok(Self {
            client,
            topic: topic.into(),
            retry_count,
        })
    }

    /// Create a provider from PKCS12 certificate bytes and password.
    pub fn certificate(
        pkcs12_der: &[u8],
        password: &str,
        topic: impl Into<String>,
        environment: Environment,
        retry_count: u32,
    ) -> color_eyre::eyre::Result<Self> {
        let mut cursor = std::io::Cursor::new(pkcs12_der);
        let config = a2::ClientConfig::new(endpoint(environment));

        let client = a2::Client::certificate(&mut cursor, password, config)
            .wrap_err("failed to create APNs client")?;

        Ok(Self {
            client,
            topic: topic.into(),
            retry_count,
        })
    }

    pub fn from_config(
        config: &ApnsConfig,
        engine: &EngineConfig,
    ) -> color_eyre::eyre::Result<Self> {
        match &config.auth {
            ApnsAuth::Token {
                key_path,
                key_id,
                team_id,
            } => {
                let key = std::fs::read(key_path)
                    .wrap_err_with(|| format!("failed to read {}", key_path.display()))?;
                Self::token(
                    &key,
                    key_id,
                    team_id,
                    &config.topic,
                    engine.environment,
                    engine.retry_count,
                )
            }
            ApnsAuth::Certificate { path, password } => {
                let der = std::fs::read(path)
                    .wrap_err_with(|| format!("failed to read {}", path.display()))?;
                Self::certificate(
                    &der,
                    password,
                    &config.topic,
                    engine.environment,
                    engine.retry_count,
                )
            }
        }
    }

    async fn send_single(
        &self,
        device: &str,
        job: &Job<Notification>,
    ) -> color_eyre::eyre::Result<Outcome> {
        let notification = &*job.payload;
        let expiration = expiration_timestamp(job.expiration);
        let mut attempt = 0;

        loop {
            let mut builder = a2::DefaultNotificationBuilder::new();
            if let Some(alert) = &notification.alert {
                builder = builder.set_body(alert);
            }
            if let Some(sound) = &notification.sound {
                builder = builder.set_sound(sound);
            }

            let mut payload = builder.build(
                device,
                a2::NotificationOptions {
                    apns_topic: Some(&self.topic),
                    apns_priority: Some(apns_priority(job.priority)),
                    apns_expiration: Some(expiration),
                    ..Default::default()
                },
            );
            for (key, value) in &notification.custom {
                payload
                    .add_custom_data(key, value)
                    .wrap_err("failed to add APNs custom data")?;
            }

            match self.client.send(payload).await {
                Ok(_) => return Ok(Outcome::Delivered),
                Err(a2::Error::ResponseError(response)) => {
                    let reason = response.error.as_ref().map(|body| &body.reason);
                    return Ok(classify(response.code, reason));
                }
                Err(e) if attempt < self.retry_count => {
                    attempt += 1;
                    tracing::warn!(
                        message_id = %job.message_id,
                        attempt,
                        error = %e,
                        "APNs send failed, retrying"
                    );
                }
                Err(e) => return Err(e).wrap_err("failed to send APNs notification"),
            }
        }
    }
}

impl Provider for ApnsProvider {
    type Payload = Notification;

    fn name(&self) -> &'static str {
        "apns"
    }

    fn batch_size(&self) -> usize {
        1
    }

    fn render(&self, message: &Message) -> color_eyre::eyre::Result<Notification> {
        render(message)
    }

    async fn send(&self, job: &Job<Notification>) -> color_eyre::eyre::Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(job.devices.len());
        for device in &job.devices {
            outcomes.push(self.send_single(device, job).await?);
        }
        Ok(outcomes)
    }
}
