//! End-to-end dispatcher behavior against mock chat-completion servers.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use abex::core::clock::SystemClock;
use abex::core::config::{DispatchConfig, ExtractorConfig, ModelEndpoint, PoolConfig};
use abex::core::dispatcher::{Dispatcher, ExtractTask};
use abex::core::record::{ExtractField, NEEDS_REVIEW};

const CHAT_PATH: &str = "/v1/chat/completions";

fn entry(server: &MockServer, model: &str) -> ModelEndpoint {
    ModelEndpoint {
        endpoint: format!("{}{CHAT_PATH}", server.uri()),
        model: model.to_string(),
    }
}

fn test_config(catalog: Vec<ModelEndpoint>, key_count: usize) -> ExtractorConfig {
    ExtractorConfig {
        api_keys: (0..key_count).map(|i| format!("sk-test-{i}")).collect(),
        catalog,
        pool: PoolConfig {
            max_failure_count: 100,
            disable_duration_secs: 300,
            rotation_enabled: true,
        },
        dispatch: DispatchConfig {
            request_delay_ms: 0,
            max_retries_per_config: 3,
            max_total_attempts: 6,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
            call_timeout_secs: 5,
        },
    }
}

fn dispatcher(config: &ExtractorConfig) -> Dispatcher {
    Dispatcher::new(config, Arc::new(SystemClock)).expect("dispatcher")
}

fn chat_body(content: &str) -> serde_json::Value {
    json!({ "choices": [ { "message": { "content": content } } ] })
}

fn task() -> ExtractTask {
    ExtractTask::new("extract from this abstract").with_title("Caller Title")
}

#[tokio::test]
async fn success_returns_decoded_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
            r#"{"translated_title": "Translated", "country": "Japan", "original_title": "forged"}"#,
        )))
        .mount(&server)
        .await;

    let config = test_config(vec![entry(&server, "model-a")], 2);
    let record = dispatcher(&config).extract(&task()).await;

    assert_eq!(record.get(ExtractField::TranslatedTitle), "Translated");
    assert_eq!(record.get(ExtractField::Country), "Japan");
    // Caller input beats whatever the provider echoed back.
    assert_eq!(record.get(ExtractField::OriginalTitle), "Caller Title");
    assert!(!record.is_fallback());
}

#[tokio::test]
async fn persistent_server_errors_degrade_to_review_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = test_config(vec![entry(&server, "model-a")], 2);
    let record = dispatcher(&config).extract(&task()).await;

    assert!(record.is_fallback());
    assert_eq!(record.get(ExtractField::Summary), NEEDS_REVIEW);
    assert_eq!(record.get(ExtractField::OriginalTitle), "Caller Title");

    // One catalog entry with three attempts each.
    let requests = server.received_requests().await.expect("requests");
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn total_attempt_budget_is_a_hard_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    // Three catalog entries at three retries each would mean nine calls,
    // but the total budget stops at four.
    let mut config = test_config(
        vec![
            entry(&server, "model-a"),
            entry(&server, "model-b"),
            entry(&server, "model-c"),
        ],
        2,
    );
    config.dispatch.max_total_attempts = 4;

    let record = dispatcher(&config).extract(&task()).await;
    assert!(record.is_fallback());

    let requests = server.received_requests().await.expect("requests");
    assert_eq!(requests.len(), 4);
}

#[tokio::test]
async fn auth_failure_forces_a_different_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let config = test_config(vec![entry(&server, "model-a")], 3);
    let record = dispatcher(&config).extract(&task()).await;
    assert!(record.is_fallback());

    let requests = server.received_requests().await.expect("requests");
    let auth_headers: Vec<String> = requests
        .iter()
        .filter_map(|r| r.headers.get("authorization"))
        .map(|v| v.to_str().expect("ascii").to_string())
        .collect();
    assert_eq!(auth_headers.len(), 3);

    let mut distinct = auth_headers.clone();
    distinct.sort();
    distinct.dedup();
    assert!(
        distinct.len() >= 2,
        "expected rotation across credentials, got {auth_headers:?}"
    );
}

#[tokio::test]
async fn falls_back_to_next_catalog_entry() {
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;

    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_body(r#"{"summary": "from the backup model"}"#)),
        )
        .mount(&healthy)
        .await;

    let config = test_config(vec![entry(&broken, "model-a"), entry(&healthy, "model-b")], 2);
    let record = dispatcher(&config).extract(&task()).await;

    assert_eq!(record.get(ExtractField::Summary), "from the backup model");

    let broken_requests = broken.received_requests().await.expect("requests");
    assert_eq!(broken_requests.len(), 3);
    let healthy_requests = healthy.received_requests().await.expect("requests");
    assert_eq!(healthy_requests.len(), 1);
}

#[tokio::test]
async fn undecodable_body_retries_the_same_config() {
    let server = MockServer::start().await;
    // First response is prose with no JSON object; the retry succeeds.
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_body("Sorry, I cannot help with that.")),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_body(r#"{"dosage": "10 mg"}"#)),
        )
        .mount(&server)
        .await;

    let config = test_config(vec![entry(&server, "model-a")], 2);
    let record = dispatcher(&config).extract(&task()).await;

    assert_eq!(record.get(ExtractField::Dosage), "10 mg");
    let requests = server.received_requests().await.expect("requests");
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn rate_limit_backs_off_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_body(r#"{"conclusion": "works"}"#)),
        )
        .mount(&server)
        .await;

    let config = test_config(vec![entry(&server, "model-a")], 2);
    let dispatcher = dispatcher(&config);
    let record = dispatcher.extract(&task()).await;

    assert_eq!(record.get(ExtractField::Conclusion), "works");
    let stats = dispatcher.pool_statistics();
    assert!(stats.iter().all(|s| !s.disabled));
    assert_eq!(stats.iter().map(|s| s.total_attempts).sum::<u64>(), 2);
}

#[tokio::test]
async fn cancellation_skips_all_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = test_config(vec![entry(&server, "model-a")], 2);
    let dispatcher = dispatcher(&config);
    dispatcher.cancel_flag().cancel();

    let record = dispatcher.extract(&task()).await;
    assert!(record.is_fallback());

    let requests = server.received_requests().await.expect("requests");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn request_body_carries_the_expected_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_body(r#"{"summary": "ok"}"#)),
        )
        .mount(&server)
        .await;

    let config = test_config(vec![entry(&server, "model-xyz")], 1);
    dispatcher(&config).extract(&task()).await;

    let requests = server.received_requests().await.expect("requests");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json body");
    assert_eq!(body["model"], "model-xyz");
    assert_eq!(body["max_tokens"], 1500);
    assert_eq!(body["response_format"]["type"], "json_object");
    assert_eq!(body["messages"][1]["role"], "user");
}
