//! Integration tests for the onboarding REST + WebSocket surface.
//!
//! Each test spins up an Axum server on a random port with an in-memory
//! database and a stub workflow backend, then drives it over HTTP and
//! tokio-tungstenite.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use outreach_flow::backend::{Backend, SaveReceipt};
use outreach_flow::error::BackendError;
use outreach_flow::notify::EventHub;
use outreach_flow::onboarding::{
    CampaignDataType, OnboardingManager, OnboardingRouteState, onboarding_routes,
};
use outreach_flow::store::LibSqlBackend;
use outreach_flow::workflow::{PreviewStep, StepType, WorkflowGraph};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Stub workflow backend (no real network calls).
struct StubBackend;

#[async_trait]
impl Backend for StubBackend {
    async fn save_workflow(&self, _workflow: &WorkflowGraph) -> Result<SaveReceipt, BackendError> {
        Ok(SaveReceipt {
            workflow_id: Some("wf_42".to_string()),
            message: None,
        })
    }

    async fn fetch_preview(
        &self,
        _campaign_data_type: Option<CampaignDataType>,
    ) -> Result<Vec<PreviewStep>, BackendError> {
        Ok(vec![
            PreviewStep::new("p1", StepType::LinkedinProfileVisit),
            PreviewStep::new("p2", StepType::LinkedinConnect),
        ])
    }
}

/// Start an Axum server on a random port, return its base URL.
async fn start_server() -> String {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let manager = Arc::new(OnboardingManager::new(
        db,
        Arc::new(StubBackend),
        EventHub::new(),
        50,
    ));
    let app = onboarding_routes(OnboardingRouteState { manager });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("127.0.0.1:{port}")
}

/// Create a session seeded with `s1 (linkedin_connect) → s2 (email_send)`.
async fn seeded_session(client: &reqwest::Client, addr: &str) -> String {
    let snapshot: Value = client
        .post(format!("http://{addr}/api/onboarding/sessions"))
        .json(&json!({ "user_id": "user-1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = snapshot["id"].as_str().unwrap().to_string();

    let resp = client
        .put(format!("http://{addr}/api/onboarding/sessions/{id}/preview"))
        .json(&json!({
            "steps": [
                { "id": "s1", "type": "linkedin_connect" },
                { "id": "s2", "type": "email_send" }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    id
}

fn node_ids(snapshot: &Value) -> Vec<String> {
    snapshot["editor"]["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap().to_string())
        .collect()
}

/// Parse a WS text frame into a serde_json::Value.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(txt) => serde_json::from_str(txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

/// Read WS frames until one of the given type arrives.
async fn next_of_type<S>(ws: &mut S, event_type: &str) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        if json["type"] == event_type {
            return json;
        }
    }
}

// ── REST Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let body: Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn palette_lists_addable_steps() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let body: Value = reqwest::get(format!("http://{addr}/api/onboarding/palette"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 8);
        assert!(items.iter().all(|i| i["type"] != "start" && i["type"] != "end"));
        assert!(items.iter().any(|i| i["type"] == "email_send" && i["title"] == "Send Email"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn seeding_builds_linear_chain() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let client = reqwest::Client::new();
        let id = seeded_session(&client, &addr).await;

        let snapshot: Value = client
            .get(format!("http://{addr}/api/onboarding/sessions/{id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(node_ids(&snapshot), vec!["start", "s1", "s2", "end"]);
        let edges: Vec<(String, String)> = snapshot["editor"]["edges"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| {
                (
                    e["source"].as_str().unwrap().to_string(),
                    e["target"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            edges,
            vec![
                ("start".to_string(), "s1".to_string()),
                ("s1".to_string(), "s2".to_string()),
                ("s2".to_string(), "end".to_string()),
            ]
        );
        assert_eq!(snapshot["phase"], "not_started");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_session_is_404() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let resp = reqwest::get(format!(
            "http://{addr}/api/onboarding/sessions/00000000-0000-0000-0000-000000000000"
        ))
        .await
        .unwrap();
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("not found"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn deleting_anchors_keeps_them() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let client = reqwest::Client::new();
        let id = seeded_session(&client, &addr).await;

        let body: Value = client
            .post(format!("http://{addr}/api/onboarding/sessions/{id}/nodes/delete"))
            .json(&json!({ "ids": ["start", "s1", "end"] }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["outcome"], "applied");
        assert_eq!(node_ids(&body["snapshot"]), vec!["start", "s2", "end"]);
        for edge in body["snapshot"]["editor"]["edges"].as_array().unwrap() {
            assert_ne!(edge["source"], "s1");
            assert_ne!(edge["target"], "s1");
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn undo_then_redo_round_trips() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let client = reqwest::Client::new();
        let id = seeded_session(&client, &addr).await;
        let base = format!("http://{addr}/api/onboarding/sessions/{id}");

        client
            .post(format!("{base}/palette"))
            .json(&json!({ "type": "delay" }))
            .send()
            .await
            .unwrap();
        let edited: Value = client.get(&base).send().await.unwrap().json().await.unwrap();
        assert_eq!(node_ids(&edited).len(), 5);

        let undone: Value = client
            .post(format!("{base}/shortcut"))
            .json(&json!({ "key": "z", "ctrl": true }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(undone["command"], "undo");
        assert_eq!(
            node_ids(&undone["snapshot"]),
            vec!["start", "s1", "s2", "end"]
        );
        assert_eq!(undone["snapshot"]["can_redo"], true);

        let redone: Value = client
            .post(format!("{base}/redo"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(redone["changed"], true);
        assert_eq!(redone["snapshot"]["workflow"], edited["workflow"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn node_data_patch_merges() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let client = reqwest::Client::new();
        let id = seeded_session(&client, &addr).await;

        let body: Value = client
            .patch(format!("http://{addr}/api/onboarding/sessions/{id}/nodes/s2"))
            .json(&json!({ "subject": "Quick question" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["outcome"], "applied");

        let node = body["snapshot"]["workflow"]["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["id"] == "s2")
            .unwrap()
            .clone();
        assert_eq!(node["data"]["subject"], "Quick question");
        assert!(node["data"]["title"].is_string());

        let missing = client
            .patch(format!("http://{addr}/api/onboarding/sessions/{id}/nodes/nope"))
            .json(&json!({ "subject": "x" }))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 422);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn wizard_completes_and_tears_down() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let client = reqwest::Client::new();
        let id = seeded_session(&client, &addr).await;
        let base = format!("http://{addr}/api/onboarding/sessions/{id}");

        let early = client.post(format!("{base}/complete")).send().await.unwrap();
        assert_eq!(early.status(), 409);

        for expected in ["channels", "platforms", "workflow", "review"] {
            let body: Value = client
                .post(format!("{base}/advance"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(body["phase"], expected);
        }

        let saved: Value = client
            .post(format!("{base}/save"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(saved["saved"], true);
        assert_eq!(saved["receipt"]["workflow_id"], "wf_42");

        let done: Value = client
            .post(format!("{base}/complete"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(done["phase"], "complete");

        let gone = client.get(&base).send().await.unwrap();
        assert_eq!(gone.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn preview_refresh_seeds_empty_workflow() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let client = reqwest::Client::new();

        let snapshot: Value = client
            .post(format!("http://{addr}/api/onboarding/sessions"))
            .json(&json!({ "user_id": "user-2" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = snapshot["id"].as_str().unwrap();

        let body: Value = client
            .post(format!(
                "http://{addr}/api/onboarding/sessions/{id}/preview/refresh"
            ))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["outcome"], "applied");
        assert_eq!(node_ids(&body["snapshot"]), vec!["start", "p1", "p2", "end"]);
    })
    .await
    .expect("test timed out");
}

// ── WebSocket Tests ──────────────────────────────────────────────────

#[tokio::test]
async fn ws_connect_receives_session_sync() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let client = reqwest::Client::new();
        let id = seeded_session(&client, &addr).await;

        let (mut ws, _resp) = connect_async(format!("ws://{addr}/ws/onboarding/{id}"))
            .await
            .expect("WS connect failed");

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "session_sync");
        assert_eq!(json["snapshot"]["id"], id.as_str());
        assert_eq!(node_ids(&json["snapshot"]), vec!["start", "s1", "s2", "end"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_unknown_session_is_refused() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let result = connect_async(format!(
            "ws://{addr}/ws/onboarding/00000000-0000-0000-0000-000000000000"
        ))
        .await;
        assert!(result.is_err());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_duplicate_drop_sends_warning() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let client = reqwest::Client::new();
        let id = seeded_session(&client, &addr).await;

        let (mut ws, _resp) = connect_async(format!("ws://{addr}/ws/onboarding/{id}"))
            .await
            .expect("WS connect failed");
        next_of_type(&mut ws, "session_sync").await;

        let body: Value = client
            .post(format!("http://{addr}/api/onboarding/sessions/{id}/drop"))
            .json(&json!({
                "payload": "email_send",
                "cursor": { "x": 500.0, "y": 400.0 },
                "canvas_origin": { "x": 100.0, "y": 50.0 }
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["outcome"], "rejected");
        assert_eq!(node_ids(&body["snapshot"]).len(), 4);

        let event = next_of_type(&mut ws, "notification").await;
        assert_eq!(event["notification"]["level"], "warning");
        assert!(
            event["notification"]["message"]
                .as_str()
                .unwrap()
                .contains("already")
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_editor_change_broadcasts_graph_update() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let client = reqwest::Client::new();
        let id = seeded_session(&client, &addr).await;

        let (mut ws, _resp) = connect_async(format!("ws://{addr}/ws/onboarding/{id}"))
            .await
            .expect("WS connect failed");
        let sync = next_of_type(&mut ws, "session_sync").await;

        // Move s1 on the canvas.
        let mut editor = sync["snapshot"]["editor"].clone();
        for node in editor["nodes"].as_array_mut().unwrap() {
            if node["id"] == "s1" {
                node["position"] = json!({ "x": 420.0, "y": 150.0 });
            }
        }
        let mut message = editor.clone();
        message["type"] = json!("editor_change");
        ws.send(Message::Text(message.to_string().into()))
            .await
            .unwrap();

        let update = next_of_type(&mut ws, "graph_updated").await;
        assert_eq!(update["can_undo"], true);
        let moved = update["editor"]["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["id"] == "s1")
            .unwrap()
            .clone();
        assert_eq!(moved["position"]["x"], 420.0);

        // Pushing the same arrays again is a no-op.
        let snapshot: Value = client
            .put(format!("http://{addr}/api/onboarding/sessions/{id}/editor"))
            .json(&editor)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(snapshot["outcome"], "unchanged");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_invalid_editor_change_sends_error() {
    timeout(TEST_TIMEOUT, async {
        let addr = start_server().await;
        let client = reqwest::Client::new();
        let id = seeded_session(&client, &addr).await;

        let (mut ws, _resp) = connect_async(format!("ws://{addr}/ws/onboarding/{id}"))
            .await
            .expect("WS connect failed");
        let sync = next_of_type(&mut ws, "session_sync").await;

        // Two nodes sharing the id s1.
        let mut message = sync["snapshot"]["editor"].clone();
        let nodes = message["nodes"].as_array_mut().unwrap();
        let copy = nodes.iter().find(|n| n["id"] == "s1").unwrap().clone();
        nodes.push(copy);
        message["type"] = json!("editor_change");
        ws.send(Message::Text(message.to_string().into()))
            .await
            .unwrap();

        let event = next_of_type(&mut ws, "notification").await;
        assert_eq!(event["notification"]["level"], "error");
        assert!(
            event["notification"]["message"]
                .as_str()
                .unwrap()
                .contains("s1")
        );

        // The session is untouched.
        let snapshot: Value = client
            .get(format!("http://{addr}/api/onboarding/sessions/{id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(node_ids(&snapshot).len(), 4);
    })
    .await
    .expect("test timed out");
}
