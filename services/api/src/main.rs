//! API Service - Chat gateway for the analytics workflow
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /api/v1/ask - Forward a question to the chat webhook
//! - POST /api/v1/feedback - Forward answer feedback to the feedback webhook

mod error;
mod webhook;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::webhook::Webhook;

// ============================================================================
// State
// ============================================================================

struct AppState {
    webhook: Webhook,
}

#[derive(Debug, Clone)]
struct Config {
    bind: String,
    chat_url: String,
    feedback_url: String,
    timeout: Duration,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let chat_url = std::env::var("N8N_WEBHOOK_URL").context("N8N_WEBHOOK_URL env var missing")?;
        Ok(Self {
            bind: std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            feedback_url: std::env::var("N8N_FEEDBACK_URL").unwrap_or_else(|_| chat_url.clone()),
            chat_url,
            timeout: Duration::from_secs(
                std::env::var("WEBHOOK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    n8n_webhook: String,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
    user_id: Option<String>,
    user_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    feedback: String,
    user_id: String,
    question: String,
    sql_query: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct FeedbackResponse {
    success: bool,
    message: &'static str,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        n8n_webhook: state.webhook.chat_url().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Unwrap a JSON body, turning axum's rejection into the gateway's error body
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, GatewayError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| GatewayError::BadRequest(rejection.body_text()))
}

fn session_id(user_id: Option<&str>) -> String {
    match user_id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("user_{}", Uuid::new_v4().simple()),
    }
}

async fn ask_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Value>, GatewayError> {
    let req = json_body(payload)?;
    let question = req.question.trim();
    if question.is_empty() {
        return Err(GatewayError::BadRequest("question must not be empty".to_string()));
    }

    let session = session_id(req.user_id.as_deref());
    info!("ask [{}]: {}", session, question);

    let payload = webhook::chat_payload(question, &session, req.user_context.as_deref());
    let reply = state.webhook.ask(&payload).await?;
    Ok(Json(reply))
}

async fn feedback_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, GatewayError> {
    let req = json_body(payload)?;
    let payload = webhook::feedback_payload(
        &req.feedback,
        &req.user_id,
        &req.question,
        req.sql_query.as_deref(),
        &req.results,
        &Utc::now().to_rfc3339(),
    );
    state.webhook.feedback(&payload).await?;
    info!("feedback [{}]: {}", req.user_id, req.feedback);

    Ok(Json(FeedbackResponse {
        success: true,
        message: "Feedback sent",
    }))
}

fn router(state: Arc<AppState>) -> Router {
    // CORS for web frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/ask", post(ask_handler))
        .route("/api/v1/feedback", post(feedback_handler))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    println!("=== Analytics Chat Gateway ===");
    println!("Chat webhook: {}", config.chat_url);
    println!("Feedback webhook: {}", config.feedback_url);
    println!("Timeout: {}s", config.timeout.as_secs());

    let webhook = Webhook::new(config.chat_url, config.feedback_url, config.timeout)
        .context("Failed to build HTTP client")?;
    let app = router(Arc::new(AppState { webhook }));

    println!("API listening on http://{}", config.bind);
    println!("\nEndpoints:");
    println!("  GET  /health");
    println!("  POST /api/v1/ask");
    println!("  POST /api/v1/feedback");

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
