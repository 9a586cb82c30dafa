//! Integration tests for the relay server.
//!
//! These tests start a real axum server on a random port, backed by a
//! scripted completion source, and exercise every endpoint over HTTP.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parley_rs::api::{ScriptedSource, StreamEvent};
use parley_rs::chat::ChatOrchestrator;
use parley_rs::config::Settings;
use parley_rs::memory::build_memory;
use parley_web::{AppState, WebConfig, spawn_web};
use serde_json::{Value, json};

/// Helper: spawn a test server on port 0 (random available port).
async fn spawn_test_server(source: ScriptedSource, settings: Settings) -> (String, Arc<ScriptedSource>) {
    let source = Arc::new(source);
    let memory = build_memory(settings.memory.enabled, settings.memory.limits());
    let chat = ChatOrchestrator::new(memory, source.clone());
    let state = AppState::new(chat, settings);

    let config = WebConfig {
        bind_addr: ([127, 0, 0, 1], 0).into(),
    };
    let addr = spawn_web(state, config).await.unwrap();
    (format!("http://{addr}"), source)
}

async fn post_chat(base: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/chat"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn session(base: &str, id: &str) -> reqwest::Response {
    reqwest::get(format!("{base}/session/{id}")).await.unwrap()
}

/// Poll the snapshot until it reports `count` turns.
async fn wait_for_count(base: &str, id: &str, count: u64) -> Value {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let json: Value = session(base, id).await.json().await.unwrap();
            if json["count"].as_u64() >= Some(count) {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap()
}

// ── /chat ────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_streams_plain_text() {
    let (base, _) =
        spawn_test_server(ScriptedSource::replying(&["Hello", ", ", "world"]), Settings::default())
            .await;

    let resp = post_chat(&base, json!({"message": "hi"})).await;
    assert_eq!(resp.status(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(resp.text().await.unwrap(), "Hello, world");
}

#[tokio::test]
async fn chat_body_arrives_incrementally() {
    let source =
        ScriptedSource::replying(&["first", "second"]).with_delay(Duration::from_millis(300));
    let (base, _) = spawn_test_server(source, Settings::default()).await;

    let resp = post_chat(&base, json!({"message": "hi"})).await;
    let mut body = resp.bytes_stream();
    let first = tokio::time::timeout(Duration::from_millis(250), body.next())
        .await
        .expect("first fragment should not wait for the whole reply")
        .unwrap()
        .unwrap();
    assert_eq!(&first[..], b"first");
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let (base, source) =
        spawn_test_server(ScriptedSource::replying(&["x"]), Settings::default()).await;

    let resp = post_chat(&base, json!({"message": "   ", "session_id": "s1"})).await;
    assert_eq!(resp.status(), 400);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["detail"], "Empty message");

    assert!(source.prompts().is_empty());
    let snapshot: Value = session(&base, "s1").await.json().await.unwrap();
    assert_eq!(snapshot["count"], 0);
}

#[tokio::test]
async fn overlong_message_is_rejected() {
    let (base, _) = spawn_test_server(ScriptedSource::replying(&["x"]), Settings::default()).await;

    let resp = post_chat(&base, json!({"message": "a".repeat(8001)})).await;
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn upstream_failure_is_reported_in_band() {
    let source = ScriptedSource::new(vec![
        StreamEvent::TextDelta("partial".into()),
        StreamEvent::Error("upstream HTTP 500: oops".into()),
    ]);
    let (base, _) = spawn_test_server(source, Settings::default()).await;

    let resp = post_chat(&base, json!({"message": "hi"})).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.text().await.unwrap(),
        "partial\n[error] upstream HTTP 500: oops"
    );
}

#[tokio::test]
async fn follow_up_carries_previous_exchange() {
    let source = ScriptedSource::replying(&["second"]).then(vec![
        StreamEvent::TextDelta("first".into()),
        StreamEvent::Done,
    ]);
    let (base, source) = spawn_test_server(source, Settings::default()).await;

    let resp = post_chat(&base, json!({"message": "hello", "session_id": "s1"})).await;
    assert_eq!(resp.text().await.unwrap(), "first");
    wait_for_count(&base, "s1", 2).await;

    let resp = post_chat(&base, json!({"message": "again", "session_id": "s1"})).await;
    assert_eq!(resp.text().await.unwrap(), "second");

    let prompt: Vec<(String, String)> = source.prompts()[1]
        .iter()
        .map(|t| (t.role().to_string(), t.content().to_string()))
        .collect();
    assert_eq!(prompt.len(), 4);
    assert_eq!(prompt[0].0, "system");
    assert_eq!(prompt[1], ("user".to_string(), "hello".to_string()));
    assert_eq!(prompt[2], ("assistant".to_string(), "first".to_string()));
    assert_eq!(prompt[3], ("user".to_string(), "again".to_string()));
}

// ── /session ─────────────────────────────────────────────────────────

#[tokio::test]
async fn session_snapshot_reports_turns_and_limits() {
    let (base, _) =
        spawn_test_server(ScriptedSource::replying(&["abcd"]), Settings::default()).await;

    post_chat(&base, json!({"message": "wxyz", "session_id": "s1"}))
        .await
        .text()
        .await
        .unwrap();

    let json = wait_for_count(&base, "s1", 2).await;
    assert_eq!(json["session_id"], "s1");
    assert_eq!(json["approx_tokens"], 2);
    assert_eq!(json["messages"][0], json!({"role": "user", "content": "wxyz"}));
    assert_eq!(json["messages"][1], json!({"role": "assistant", "content": "abcd"}));
    assert_eq!(json["limits"], json!({"max_messages": 40, "max_approx_tokens": 2400}));
}

#[tokio::test]
async fn chat_without_session_leaves_no_trace() {
    let (base, _) = spawn_test_server(ScriptedSource::replying(&["ok"]), Settings::default()).await;

    let resp = post_chat(&base, json!({"message": "hi"})).await;
    assert_eq!(resp.text().await.unwrap(), "ok");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let json: Value = session(&base, "anything").await.json().await.unwrap();
    assert_eq!(json["count"], 0);
    assert_eq!(json["messages"], json!([]));
}

#[tokio::test]
async fn session_endpoint_is_missing_when_memory_is_off() {
    let mut settings = Settings::default();
    settings.memory.enabled = false;
    let (base, _) = spawn_test_server(ScriptedSource::replying(&["ok"]), settings).await;

    let resp = post_chat(&base, json!({"message": "hi", "session_id": "s1"})).await;
    assert_eq!(resp.text().await.unwrap(), "ok");

    let resp = session(&base, "s1").await;
    assert_eq!(resp.status(), 404);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["detail"], "Memory disabled");
}

// ── /config and /health ──────────────────────────────────────────────

#[tokio::test]
async fn config_never_exposes_the_key() {
    let mut settings = Settings::default();
    settings.upstream.endpoint = "https://example.openai.azure.com".into();
    settings.upstream.api_key = "do-not-leak".into();
    let (base, _) = spawn_test_server(ScriptedSource::replying(&["ok"]), settings).await;

    let resp = reqwest::get(format!("{base}/config")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    assert!(!text.contains("do-not-leak"));

    let json: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["azure_openai"]["endpoint"], "https://example.openai.azure.com");
    assert_eq!(json["azure_openai"]["model"], "gpt-4o");
    assert_eq!(json["azure_openai"]["api_key_set"], true);
    assert_eq!(
        json["memory"],
        json!({"enabled": true, "max_messages": 40, "max_tokens": 2400})
    );
}

#[tokio::test]
async fn health_reports_ok() {
    let (base, _) = spawn_test_server(ScriptedSource::replying(&["ok"]), Settings::default()).await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["time"].as_i64().unwrap() > 0);
}
