use std::sync::Arc;

use anyhow::Context;
use axum::http::{Method, header};
use tower_http::cors::{Any, CorsLayer};

use outreach_flow::backend::{Backend, DisabledBackend, HttpBackend};
use outreach_flow::config::ServerConfig;
use outreach_flow::notify::EventHub;
use outreach_flow::onboarding::{OnboardingManager, OnboardingRouteState, onboarding_routes};
use outreach_flow::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env().context("Invalid configuration")?;

    eprintln!("Outreach Flow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/onboarding/sessions", config.port);
    eprintln!("   WS:  ws://0.0.0.0:{}/ws/onboarding/{{id}}", config.port);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Workflow backend ─────────────────────────────────────────────────
    let backend: Arc<dyn Backend> = match config.backend.clone() {
        Some(backend_config) => {
            eprintln!("   Backend: {}", backend_config.base_url);
            Arc::new(HttpBackend::new(backend_config).context("Failed to build backend client")?)
        }
        None => {
            eprintln!("   Backend: disabled (set OUTREACH_FLOW_BACKEND_URL)");
            tracing::warn!("No workflow backend configured; saves and previews are disabled");
            Arc::new(DisabledBackend)
        }
    };

    // ── Onboarding ───────────────────────────────────────────────────────
    let manager = Arc::new(OnboardingManager::new(
        db,
        backend,
        EventHub::new(),
        config.history_limit,
    ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = onboarding_routes(OnboardingRouteState { manager }).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(port = config.port, "Onboarding server started");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
