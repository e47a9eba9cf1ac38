//! Push Provider Bindings
//!
//! APNs, FCM and Huawei Push Kit implementations of the engine's
//! [`Provider`](push_engine::Provider) trait.

mod apns;
mod fcm;
mod hcm;
mod retry;

use push_core::config::{ApnsConfig, EngineConfig, FcmConfig, HcmConfig};
use push_engine::Dispatcher;

pub use apns::{ApnsProvider, Notification};
pub use fcm::{FcmPayload, FcmProvider};
pub use hcm::{HcmPayload, HcmProvider, HcmTokenSource};

/// APNs dispatcher. Must be called inside a tokio runtime.
pub fn apns(
    config: &ApnsConfig,
    engine: &EngineConfig,
) -> color_eyre::eyre::Result<Dispatcher<ApnsProvider>> {
    let provider = ApnsProvider::from_config(config, engine)?;
    Ok(Dispatcher::new(provider, engine))
}

/// FCM dispatcher. Must be called inside a tokio runtime.
pub fn fcm(
    config: &FcmConfig,
    engine: &EngineConfig,
) -> color_eyre::eyre::Result<Dispatcher<FcmProvider>> {
    let provider = FcmProvider::new(config, engine)?;
    Ok(Dispatcher::new(provider, engine))
}

/// Push Kit dispatcher; starts the access token refresher.
/// Must be called inside a tokio runtime.
pub fn hcm(
    config: &HcmConfig,
    engine: &EngineConfig,
) -> color_eyre::eyre::Result<Dispatcher<HcmProvider>> {
    let provider = HcmProvider::new(config, engine)?;
    Ok(Dispatcher::new(provider, engine))
}

#[cfg(test)]
mod tests {
    use push_core::config::Environment;
    use push_core::{Message, Priority};
    use push_engine::Pusher;
    use serde_json::{Map, json};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_fcm_dispatcher_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fcm/send"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"message_id": "1"},
                    {"error": "NotRegistered"},
                    {"message_id": "3"}
                ]
            })))
            .mount(&server)
            .await;

        let config = FcmConfig {
            api_key: "k".into(),
            endpoint: format!("{}/fcm/send", server.uri()),
        };
        let engine = EngineConfig {
            environment: Environment::Production,
            ..Default::default()
        };
        let dispatcher = fcm(&config, &engine).unwrap();
        let listener = dispatcher.listen();

        let mut data = Map::new();
        data.insert("k".into(), json!("v"));
        let mut extra = Map::new();
        extra.insert("id".into(), json!("x7"));
        dispatcher
            .queue(Message::data(
                vec!["a".into(), "b".into(), "c".into()],
                data,
                Priority::High,
                60,
                extra,
            ))
            .await;

        let response = listener.recv().await.unwrap();
        assert_eq!(response.success, 2);
        assert_eq!(response.failure, 1);
        assert_eq!(response.total, 3);
        assert_eq!(response.extra["id"], "x7");
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].target_id, "b");
    }

    #[tokio::test]
    async fn test_hcm_dispatcher_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v3/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "at", "expires_in": 3600})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/1/messages:send"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "80100000",
                "msg": "{\"success\":1,\"failure\":1,\"illegal_tokens\":[\"b\"]}"
            })))
            .mount(&server)
            .await;

        let config = HcmConfig {
            app_id: "1".into(),
            app_secret: "s".into(),
            endpoint: server.uri(),
            token_url: format!("{}/oauth2/v3/token", server.uri()),
        };
        let dispatcher = hcm(&config, &EngineConfig::default()).unwrap();
        let listener = dispatcher.listen();

        dispatcher
            .queue(Message::data(
                vec!["a".into(), "b".into()],
                Map::new(),
                Priority::Normal,
                60,
                Map::new(),
            ))
            .await;

        let response = listener.recv().await.unwrap();
        assert_eq!(response.success, 1);
        assert_eq!(response.failure, 1);
        assert_eq!(response.results[0].target_id, "b");
    }
}
