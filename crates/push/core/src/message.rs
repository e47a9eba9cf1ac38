//! Logical push requests.

use serde_json::{Map, Value};

/// Delivery priority requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Deliver when convenient for the device (power-saving).
    #[default]
    Normal,
    /// Deliver immediately.
    High,
}

/// Provider-opaque notification content.
///
/// Data-message providers (FCM, HCM) read `data`; rich-notification providers
/// (APNs) read `alert`, `sound` and `custom`. Fields a provider does not
/// understand are ignored by it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Payload {
    /// Free-form data map.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,

    /// Alert body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,

    /// Sound file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,

    /// Custom top-level keys merged next to the alert.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom: Map<String, Value>,
}

/// A logical send request fanned out to many devices.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Target device identifiers. Duplicates are sent independently.
    pub devices: Vec<String>,

    /// Delivery priority.
    #[serde(default)]
    pub priority: Priority,

    /// Time to live in seconds.
    #[serde(default)]
    pub expiration: u64,

    /// Notification content.
    #[serde(default)]
    pub payload: Payload,

    /// Caller metadata echoed back verbatim in the response.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Create a data message (FCM / HCM style).
    pub fn data(
        devices: Vec<String>,
        data: Map<String, Value>,
        priority: Priority,
        expiration: u64,
        extra: Map<String, Value>,
    ) -> Self {
        Self {
            devices,
            priority,
            expiration,
            payload: Payload {
                data,
                ..Default::default()
            },
            extra,
        }
    }

    /// Create an alert notification (APNs style).
    pub fn alert(
        devices: Vec<String>,
        alert: impl Into<String>,
        sound: Option<String>,
        custom: Map<String, Value>,
        priority: Priority,
        expiration: u64,
        extra: Map<String, Value>,
    ) -> Self {
        Self {
            devices,
            priority,
            expiration,
            payload: Payload {
                alert: Some(alert.into()),
                sound,
                custom,
                ..Default::default()
            },
            extra,
        }
    }
}
