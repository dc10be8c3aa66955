//! REST + WebSocket endpoints for onboarding sessions.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::manager::OnboardingManager;
use super::model::ChatRole;
use super::session::{EditOutcome, SelectionUpdate};
use crate::error::{BackendError, SessionError};
use crate::notify::{NotificationLevel, SessionEvent};
use crate::workflow::{DropEvent, EditorGraph, KeyPress, PreviewStep, StepType, WorkflowGraph};

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub manager: Arc<OnboardingManager>,
}

/// Build the onboarding REST and WebSocket routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/onboarding/palette", get(palette))
        .route("/api/onboarding/sessions", post(start_session))
        .route("/api/onboarding/sessions/{id}", get(get_session))
        .route("/api/onboarding/sessions/{id}/editor", put(apply_editor))
        .route("/api/onboarding/sessions/{id}/workflow", put(replace_workflow))
        .route("/api/onboarding/sessions/{id}/undo", post(undo))
        .route("/api/onboarding/sessions/{id}/redo", post(redo))
        .route("/api/onboarding/sessions/{id}/shortcut", post(shortcut))
        .route("/api/onboarding/sessions/{id}/connect", post(connect))
        .route("/api/onboarding/sessions/{id}/nodes/delete", post(delete_nodes))
        .route(
            "/api/onboarding/sessions/{id}/nodes/{node_id}",
            patch(update_node_data),
        )
        .route("/api/onboarding/sessions/{id}/drop", post(drop_node))
        .route("/api/onboarding/sessions/{id}/palette", post(click_palette))
        .route("/api/onboarding/sessions/{id}/preview", put(seed_preview))
        .route(
            "/api/onboarding/sessions/{id}/preview/refresh",
            post(refresh_preview),
        )
        .route("/api/onboarding/sessions/{id}/selections", put(set_selections))
        .route("/api/onboarding/sessions/{id}/chat", post(push_chat))
        .route("/api/onboarding/sessions/{id}/advance", post(advance))
        .route("/api/onboarding/sessions/{id}/save", post(save))
        .route("/api/onboarding/sessions/{id}/reset", post(reset))
        .route("/api/onboarding/sessions/{id}/complete", post(complete))
        .route("/ws/onboarding/{id}", get(ws_handler))
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

/// `SessionError` rendered as a status code and `{ "error": ... }` body.
pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SessionError::NotFound { .. } => StatusCode::NOT_FOUND,
            SessionError::InvalidTransition { .. } => StatusCode::CONFLICT,
            SessionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SessionError::Workflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SessionError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::Backend(BackendError::Disabled) => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::Backend(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "Onboarding request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

// ── Request bodies ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StartRequest {
    user_id: String,
}

#[derive(Deserialize)]
struct ConnectRequest {
    source: String,
    target: String,
}

#[derive(Deserialize)]
struct DeleteRequest {
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct PaletteRequest {
    #[serde(alias = "type")]
    step_type: StepType,
}

#[derive(Deserialize)]
struct PreviewRequest {
    steps: Vec<PreviewStep>,
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default = "default_chat_role")]
    role: ChatRole,
    content: String,
}

fn default_chat_role() -> ChatRole {
    ChatRole::User
}

/// Messages a canvas client may send over the WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    EditorChange(EditorGraph),
    Shortcut(KeyPress),
    Undo,
    Redo,
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "outreach-flow"
    }))
}

/// Step types the canvas palette offers.
async fn palette() -> impl IntoResponse {
    let items: Vec<serde_json::Value> = StepType::PALETTE
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": t,
                "title": t.title(),
                "description": t.description(),
            })
        })
        .collect();
    Json(serde_json::json!({ "items": items }))
}

// ── Sessions ────────────────────────────────────────────────────────────

async fn start_session(
    State(state): State<OnboardingRouteState>,
    Json(body): Json<StartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.manager.start_session(&body.user_id).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn get_session(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let snapshot = state.manager.snapshot(id).await?;
    Ok(Json(serde_json::json!(snapshot)))
}

/// Edit outcome plus the session as it now stands.
async fn edit_response(
    state: &OnboardingRouteState,
    id: Uuid,
    outcome: EditOutcome,
) -> ApiResult {
    let snapshot = state.manager.snapshot(id).await?;
    let message = match outcome {
        EditOutcome::Rejected { ref message } => Some(message.clone()),
        _ => None,
    };
    Ok(Json(serde_json::json!({
        "outcome": outcome.label(),
        "message": message,
        "snapshot": snapshot,
    })))
}

// ── Graph edits ─────────────────────────────────────────────────────────

async fn apply_editor(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(editor): Json<EditorGraph>,
) -> ApiResult {
    let outcome = state.manager.apply_editor_change(id, editor).await?;
    edit_response(&state, id, outcome).await
}

async fn replace_workflow(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(graph): Json<WorkflowGraph>,
) -> ApiResult {
    let outcome = state.manager.replace_workflow(id, graph).await?;
    edit_response(&state, id, outcome).await
}

async fn connect(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConnectRequest>,
) -> ApiResult {
    let outcome = state.manager.connect(id, &body.source, &body.target).await?;
    edit_response(&state, id, outcome).await
}

async fn delete_nodes(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(body): Json<DeleteRequest>,
) -> ApiResult {
    let outcome = state.manager.delete_nodes(id, &body.ids).await?;
    edit_response(&state, id, outcome).await
}

async fn update_node_data(
    State(state): State<OnboardingRouteState>,
    Path((id, node_id)): Path<(Uuid, String)>,
    Json(data): Json<serde_json::Value>,
) -> ApiResult {
    let outcome = state.manager.update_node_data(id, &node_id, data).await?;
    edit_response(&state, id, outcome).await
}

async fn drop_node(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(event): Json<DropEvent>,
) -> ApiResult {
    let outcome = state.manager.drop_node(id, &event).await?;
    edit_response(&state, id, outcome).await
}

async fn click_palette(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PaletteRequest>,
) -> ApiResult {
    let outcome = state.manager.click_palette_item(id, body.step_type).await?;
    edit_response(&state, id, outcome).await
}

async fn seed_preview(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PreviewRequest>,
) -> ApiResult {
    let outcome = state.manager.seed_preview(id, body.steps).await?;
    edit_response(&state, id, outcome).await
}

async fn refresh_preview(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let outcome = state.manager.refresh_preview(id).await?;
    edit_response(&state, id, outcome).await
}

// ── History ─────────────────────────────────────────────────────────────

async fn undo(State(state): State<OnboardingRouteState>, Path(id): Path<Uuid>) -> ApiResult {
    let changed = state.manager.undo(id).await?;
    let snapshot = state.manager.snapshot(id).await?;
    Ok(Json(serde_json::json!({ "changed": changed, "snapshot": snapshot })))
}

async fn redo(State(state): State<OnboardingRouteState>, Path(id): Path<Uuid>) -> ApiResult {
    let changed = state.manager.redo(id).await?;
    let snapshot = state.manager.snapshot(id).await?;
    Ok(Json(serde_json::json!({ "changed": changed, "snapshot": snapshot })))
}

async fn shortcut(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(key): Json<KeyPress>,
) -> ApiResult {
    let command = state.manager.handle_shortcut(id, &key).await?;
    let snapshot = state.manager.snapshot(id).await?;
    Ok(Json(serde_json::json!({ "command": command, "snapshot": snapshot })))
}

// ── Wizard ──────────────────────────────────────────────────────────────

async fn set_selections(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(update): Json<SelectionUpdate>,
) -> ApiResult {
    let snapshot = state.manager.set_selections(id, update).await?;
    Ok(Json(serde_json::json!(snapshot)))
}

async fn push_chat(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ChatRequest>,
) -> ApiResult {
    let snapshot = state
        .manager
        .push_chat_message(id, body.role, body.content)
        .await?;
    Ok(Json(serde_json::json!(snapshot)))
}

async fn advance(State(state): State<OnboardingRouteState>, Path(id): Path<Uuid>) -> ApiResult {
    let phase = state.manager.advance(id).await?;
    Ok(Json(serde_json::json!({ "phase": phase })))
}

async fn complete(State(state): State<OnboardingRouteState>, Path(id): Path<Uuid>) -> ApiResult {
    let phase = state.manager.complete(id).await?;
    Ok(Json(serde_json::json!({ "phase": phase })))
}

async fn reset(State(state): State<OnboardingRouteState>, Path(id): Path<Uuid>) -> ApiResult {
    let snapshot = state.manager.reset(id).await?;
    Ok(Json(serde_json::json!(snapshot)))
}

async fn save(State(state): State<OnboardingRouteState>, Path(id): Path<Uuid>) -> ApiResult {
    let receipt = state.manager.save_workflow(id).await?;
    Ok(Json(serde_json::json!({
        "saved": receipt.is_some(),
        "receipt": receipt,
    })))
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    // Reject unknown sessions before upgrading.
    state.manager.snapshot(id).await?;
    info!(session_id = %id, "WebSocket client connecting");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state.manager, id)))
}

async fn send_event(socket: &mut WebSocket, event: &SessionEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize session event");
            true
        }
    }
}

/// Send a full snapshot. Returns false if the client or session is gone.
async fn send_sync(socket: &mut WebSocket, manager: &OnboardingManager, id: Uuid) -> bool {
    match manager.snapshot(id).await {
        Ok(snapshot) => send_event(socket, &SessionEvent::SessionSync { snapshot }).await,
        Err(_) => false,
    }
}

async fn handle_socket(mut socket: WebSocket, manager: Arc<OnboardingManager>, id: Uuid) {
    // Subscribe before the initial sync so nothing slips in between.
    let mut rx = manager.events().subscribe();

    if !send_sync(&mut socket, &manager, id).await {
        warn!(session_id = %id, "Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) if event.session_id() == id => {
                        if !send_event(&mut socket, &event).await {
                            debug!(session_id = %id, "Client disconnected during send");
                            break;
                        }
                        if matches!(event, SessionEvent::SessionClosed { .. }) {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(session_id = %id, missed = n, "WS client lagged behind broadcast");
                        if !send_sync(&mut socket, &manager, id).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &manager, id).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(session_id = %id, "WebSocket connection closed");
}

/// Apply a client message. Results, including failures, reach the client as
/// broadcast events.
async fn handle_client_message(text: &str, manager: &OnboardingManager, id: Uuid) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            manager
                .events()
                .notify(id, NotificationLevel::Error, format!("Unreadable message: {e}"));
            return;
        }
    };

    let result = match message {
        ClientMessage::EditorChange(editor) => {
            manager.apply_editor_change(id, editor).await.map(|_| ())
        }
        ClientMessage::Shortcut(key) => manager.handle_shortcut(id, &key).await.map(|_| ()),
        ClientMessage::Undo => manager.undo(id).await.map(|_| ()),
        ClientMessage::Redo => manager.redo(id).await.map(|_| ()),
    };
    if let Err(e) = result {
        manager
            .events()
            .notify(id, NotificationLevel::Error, e.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"editor_change","nodes":[],"edges":[]}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::EditorChange(ref g) if g.nodes.is_empty()));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"shortcut","key":"z","ctrl":true}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Shortcut(ref k) if k.ctrl));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"undo"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Undo));
    }

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (SessionError::NotFound { id: Uuid::nil() }, StatusCode::NOT_FOUND),
            (
                SessionError::InvalidRequest("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                SessionError::InvalidTransition {
                    id: Uuid::nil(),
                    phase: "complete".to_string(),
                    target: "next".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                SessionError::Backend(BackendError::Disabled),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).into_response().status(), status);
        }
    }

    #[test]
    fn palette_request_accepts_type_alias() {
        let body: PaletteRequest = serde_json::from_str(r#"{"type":"delay"}"#).unwrap();
        assert_eq!(body.step_type, StepType::Delay);
    }
}
