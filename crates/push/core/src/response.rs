//! Per-device outcomes and aggregated responses.

use serde_json::{Map, Value};

/// Classified result of sending to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Accepted by the provider.
    Delivered,
    /// Not delivered; the provider client already exhausted its retries.
    Failed,
    /// The device identifier is no longer valid (uninstalled, revoked).
    Expired,
    /// Delivered, but the provider reports a replacement identifier.
    Changed {
        /// Identifier the caller should use from now on.
        new_id: String,
    },
}

/// Kind of action the caller should take for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Remove the device from the registry.
    Expired,
    /// Replace the device identifier.
    Changed,
}

/// A device that needs caller action.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceResult {
    /// What happened to the device.
    pub kind: ResultKind,
    /// Identifier the message was sent to.
    pub target_id: String,
    /// Replacement identifier (`changed` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_target_id: Option<String>,
}

impl DeviceResult {
    /// Result for a device that no longer exists.
    pub fn expired(target_id: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Expired,
            target_id: target_id.into(),
            new_target_id: None,
        }
    }

    /// Result for a device whose identifier rotated.
    pub fn changed(target_id: impl Into<String>, new_target_id: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Changed,
            target_id: target_id.into(),
            new_target_id: Some(new_target_id.into()),
        }
    }
}

/// Aggregated result of one message.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Response {
    /// Devices the provider accepted.
    pub success: usize,
    /// Devices that were not delivered.
    pub failure: usize,
    /// Devices reported with a replacement identifier.
    pub canonical_ids: usize,
    /// Devices processed.
    pub total: usize,
    /// Metadata copied from the originating message.
    pub extra: Map<String, Value>,
    /// Devices needing caller action, in arrival order.
    #[serde(default)]
    pub results: Vec<DeviceResult>,
}

impl Response {
    /// Create an empty response carrying the message metadata.
    pub fn new(extra: Map<String, Value>) -> Self {
        Self {
            extra,
            ..Default::default()
        }
    }

    /// Fold one device outcome into the response.
    pub fn record(&mut self, device: &str, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Delivered => self.success += 1,
            Outcome::Failed => self.failure += 1,
            Outcome::Expired => {
                self.failure += 1;
                self.results.push(DeviceResult::expired(device));
            }
            Outcome::Changed { new_id } => {
                self.success += 1;
                self.canonical_ids += 1;
                self.results.push(DeviceResult::changed(device, new_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts() {
        let mut response = Response::default();
        response.record("a", Outcome::Delivered);
        response.record("b", Outcome::Failed);
        response.record("c", Outcome::Expired);
        response.record("d", Outcome::Changed { new_id: "d2".into() });

        assert_eq!(response.total, 4);
        assert_eq!(response.success, 2);
        assert_eq!(response.failure, 2);
        assert_eq!(response.canonical_ids, 1);
        assert_eq!(
            response.results,
            vec![DeviceResult::expired("c"), DeviceResult::changed("d", "d2")]
        );
    }

    #[test]
    fn test_serialize_results() {
        let mut response = Response::default();
        response.record("old", Outcome::Changed { new_id: "new".into() });
        response.record("gone", Outcome::Expired);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["results"][0]["kind"], "changed");
        assert_eq!(json["results"][0]["new_target_id"], "new");
        assert_eq!(json["results"][1]["kind"], "expired");
        assert!(json["results"][1].get("new_target_id").is_none());
    }
}
