//! Remote workflow backend — saves finished workflows and fetches preview
//! step lists.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::BackendError;
use crate::onboarding::model::CampaignDataType;
use crate::workflow::{PreviewStep, WorkflowGraph};

const SAVE_PATH: &str = "/api/workflow/save";
const PREVIEW_PATH: &str = "/api/workflow/preview";

/// What the backend returns after a successful save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /api/workflow/save` with `{ "workflow": { nodes, edges } }`.
    async fn save_workflow(&self, workflow: &WorkflowGraph) -> Result<SaveReceipt, BackendError>;

    /// Preview step list for a campaign.
    async fn fetch_preview(
        &self,
        campaign_data_type: Option<CampaignDataType>,
    ) -> Result<Vec<PreviewStep>, BackendError>;
}

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct SaveRequest<'a> {
    workflow: &'a WorkflowGraph,
}

/// The preview endpoint answers with either a bare array or `{ "steps": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PreviewResponse {
    Bare(Vec<PreviewStep>),
    Wrapped { steps: Vec<PreviewStep> },
}

/// reqwest-backed client for the workflow backend.
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::RequestFailed {
                endpoint: config.base_url.clone(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        info!(base_url = %config.base_url, "Workflow backend configured");
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.token {
            Some(ref token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Send a request and hand back the response body on success.
    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, BackendError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout {
                    endpoint: endpoint.to_string(),
                    timeout: self.config.timeout,
                }
            } else {
                BackendError::RequestFailed {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        if !status.is_success() {
            return Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn save_workflow(&self, workflow: &WorkflowGraph) -> Result<SaveReceipt, BackendError> {
        let request = self
            .client
            .post(self.url(SAVE_PATH))
            .json(&SaveRequest { workflow });
        let body = self.send(SAVE_PATH, request).await?;
        debug!(nodes = workflow.nodes.len(), edges = workflow.edges.len(), "Workflow saved");

        if body.trim().is_empty() {
            return Ok(SaveReceipt::default());
        }
        serde_json::from_str(&body).map_err(|e| BackendError::InvalidResponse {
            endpoint: SAVE_PATH.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_preview(
        &self,
        campaign_data_type: Option<CampaignDataType>,
    ) -> Result<Vec<PreviewStep>, BackendError> {
        let mut request = self.client.get(self.url(PREVIEW_PATH));
        if let Some(data_type) = campaign_data_type {
            request = request.query(&[("campaign_data_type", data_type.to_string())]);
        }
        let body = self.send(PREVIEW_PATH, request).await?;

        let parsed: PreviewResponse =
            serde_json::from_str(&body).map_err(|e| BackendError::InvalidResponse {
                endpoint: PREVIEW_PATH.to_string(),
                reason: e.to_string(),
            })?;
        Ok(match parsed {
            PreviewResponse::Bare(steps) | PreviewResponse::Wrapped { steps } => steps,
        })
    }
}

/// Stand-in used when no backend URL is configured.
pub struct DisabledBackend;

#[async_trait]
impl Backend for DisabledBackend {
    async fn save_workflow(&self, _workflow: &WorkflowGraph) -> Result<SaveReceipt, BackendError> {
        Err(BackendError::Disabled)
    }

    async fn fetch_preview(
        &self,
        _campaign_data_type: Option<CampaignDataType>,
    ) -> Result<Vec<PreviewStep>, BackendError> {
        Err(BackendError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    use super::*;
    use crate::workflow::{seed_graph, StepType};

    #[derive(Clone, Default)]
    struct Captured {
        body: Arc<Mutex<Option<serde_json::Value>>>,
        auth: Arc<Mutex<Option<String>>>,
        query: Arc<Mutex<Option<String>>>,
    }

    async fn save(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        *captured.auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        *captured.body.lock().unwrap() = Some(body);
        Json(serde_json::json!({ "workflow_id": "wf_1" }))
    }

    async fn preview(
        State(captured): State<Captured>,
        Query(params): Query<std::collections::HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        *captured.query.lock().unwrap() = params.get("campaign_data_type").cloned();
        Json(serde_json::json!({
            "steps": [
                { "id": "s1", "type": "linkedin_connect" },
                { "id": "s2", "type": "email_send", "title": "Intro" }
            ]
        }))
    }

    async fn start_stub(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://127.0.0.1:{port}")
    }

    fn backend(base_url: String) -> HttpBackend {
        HttpBackend::new(BackendConfig {
            base_url,
            token: Some(SecretString::from("tok_123")),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn save_posts_workflow_with_bearer_token() {
        let captured = Captured::default();
        let router = Router::new()
            .route(SAVE_PATH, post(save))
            .with_state(captured.clone());
        let base = start_stub(router).await;

        let graph = seed_graph(&[crate::workflow::PreviewStep::new("s1", StepType::Delay)]);
        let receipt = backend(base).save_workflow(&graph).await.unwrap();
        assert_eq!(receipt.workflow_id.as_deref(), Some("wf_1"));

        let body = captured.body.lock().unwrap().clone().unwrap();
        assert_eq!(body["workflow"]["nodes"][0]["id"], "s1");
        assert_eq!(body["workflow"]["edges"].as_array().unwrap().len(), 2);
        assert_eq!(
            captured.auth.lock().unwrap().as_deref(),
            Some("Bearer tok_123")
        );
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let router = Router::new().route(
            SAVE_PATH,
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = start_stub(router).await;

        let err = backend(base)
            .save_workflow(&WorkflowGraph::default())
            .await
            .unwrap_err();
        match err {
            BackendError::Status { status, body, .. } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn preview_accepts_wrapped_steps() {
        let captured = Captured::default();
        let router = Router::new()
            .route(PREVIEW_PATH, get(preview))
            .with_state(captured.clone());
        let base = start_stub(router).await;

        let steps = backend(base)
            .fetch_preview(Some(CampaignDataType::Apollo))
            .await
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].title.as_deref(), Some("Intro"));
        assert_eq!(captured.query.lock().unwrap().as_deref(), Some("apollo"));
    }

    #[tokio::test]
    async fn preview_accepts_bare_array() {
        let router = Router::new().route(
            PREVIEW_PATH,
            get(|| async { Json(serde_json::json!([{ "id": "a", "type": "delay" }])) }),
        );
        let base = start_stub(router).await;

        let steps = backend(base).fetch_preview(None).await.unwrap();
        assert_eq!(steps[0].step_type, StepType::Delay);
    }

    #[tokio::test]
    async fn unreachable_backend_fails_cleanly() {
        let backend = backend("http://127.0.0.1:1".to_string());
        let err = backend.fetch_preview(None).await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::RequestFailed { .. } | BackendError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn disabled_backend_refuses() {
        assert!(matches!(
            DisabledBackend.fetch_preview(None).await,
            Err(BackendError::Disabled)
        ));
    }
}
