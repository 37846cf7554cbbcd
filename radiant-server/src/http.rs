//! Radiant HTTP surface
//!
//! Axum server for the chat page and its JSON endpoints.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions are directly testable without axum dispatch
//! machinery.
//!
//! Endpoints:
//! - GET  /                 — chat page with the full history
//! - POST /chat             — submit one turn, returns `{"response": ...}`
//! - POST /clear            — wipe the history
//! - GET  /health           — health check with store status
//! - GET  /version          — server version info
//! - GET  /static/script.js — client script used by the page

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use minijinja::{context, Environment};
use radiant_core::config::ServerConfig;
use radiant_core::{ChatService, TurnInput, TurnStore};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
const CLIENT_SCRIPT: &str = include_str!("../static/script.js");

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub chat: ChatService,
    pub pages: Environment<'static>,
    /// Request body cap applied to every route.
    pub body_limit: usize,
}

impl HttpState {
    pub fn new(chat: ChatService) -> Result<Self> {
        let mut pages = Environment::new();
        pages.add_template("index.html", INDEX_TEMPLATE)?;
        Ok(Self {
            chat,
            pages,
            body_limit: ServerConfig::default().max_body_bytes,
        })
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_handler))
        .route("/clear", post(clear_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/static/script.js", get(script_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: HttpState,
    server: &ServerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", server.host, server.port);

    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Radiant listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    /// Data URI or bare base64.
    #[serde(default)]
    pub image: Option<String>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner page render — full history handed to the template unmodified.
pub async fn index_inner(state: &HttpState) -> (StatusCode, Html<String>) {
    let history = match state.chat.history().await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, error_kind = "storage", "Failed to load history for page");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("Chat history is unavailable right now.".to_string()),
            );
        }
    };

    let rendered = state
        .pages
        .get_template("index.html")
        .and_then(|t| t.render(context! { history => history }));

    match rendered {
        Ok(page) => (StatusCode::OK, Html(page)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render chat page");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("Chat page could not be rendered.".to_string()),
            )
        }
    }
}

/// Inner chat — validates the body and runs one turn. Model and storage
/// failures come back as 200 with an apology.
pub async fn chat_inner(chat: &ChatService, req: ChatRequest) -> (StatusCode, serde_json::Value) {
    let input = TurnInput::new(req.message, req.image);
    if input.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "error": "message or image is required",
                "status": "error",
            }),
        );
    }

    let reply = chat.submit(input).await;
    (
        StatusCode::OK,
        serde_json::json!({ "response": reply.response }),
    )
}

/// Inner clear — wipes the store.
pub async fn clear_inner(chat: &ChatService) -> (StatusCode, serde_json::Value) {
    match chat.clear().await {
        Ok(()) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "success",
                "message": "Chat history cleared",
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, error_kind = "storage", "Failed to clear history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "status": "error",
                    "message": "Chat history could not be cleared",
                }),
            )
        }
    }
}

/// Inner health check — pings the store and returns (status_code, json_body).
pub async fn health_inner(store: &TurnStore) -> (StatusCode, serde_json::Value) {
    match store.ping().await {
        Ok(sqlite) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "sqlite": sqlite,
                "database": store.path().display().to_string(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "radiant",
    })
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn index_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    index_inner(&state).await
}

pub async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let (status, body) = chat_inner(&state.chat, req).await;
    (status, Json(body))
}

pub async fn clear_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = clear_inner(&state.chat).await;
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.chat.store()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        CLIENT_SCRIPT,
    )
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use radiant_core::{OpenRouterClient, RadiantConfig};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn make_state(server: &MockServer) -> (tempfile::TempDir, HttpState) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = RadiantConfig::default();
        config.model.api_key = "test-api-key".to_string();

        let store = TurnStore::open(dir.path().join("chat_history.db"))
            .await
            .expect("open store");
        let backend = OpenRouterClient::with_base_url(&config.model, server.uri()).unwrap();
        let chat = ChatService::new(&config, store, Arc::new(backend));
        (dir, HttpState::new(chat).expect("templates"))
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["service"], "radiant");
    }

    #[tokio::test]
    async fn test_chat_inner_rejects_empty_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let (_dir, state) = make_state(&server).await;

        let req = ChatRequest {
            message: Some("  ".to_string()),
            image: None,
        };
        let (status, body) = chat_inner(&state.chat, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(state.chat.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_inner_model_failure_is_still_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (_dir, state) = make_state(&server).await;

        let req = ChatRequest {
            message: Some("shaghaf".to_string()),
            image: None,
        };
        let (status, body) = chat_inner(&state.chat, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["response"],
            RadiantConfig::default().replies.exhausted.as_str()
        );
    }

    #[tokio::test]
    async fn test_clear_inner_acknowledges() {
        let server = MockServer::start().await;
        let (_dir, state) = make_state(&server).await;
        state.chat.store().append("a", "b").await.unwrap();

        let (status, body) = clear_inner(&state.chat).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Chat history cleared");
        assert!(state.chat.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_inner_escapes_history() {
        let server = MockServer::start().await;
        let (_dir, state) = make_state(&server).await;
        state
            .chat
            .store()
            .append("<b>position</b> PA chest", "Stand facing the detector.")
            .await
            .unwrap();

        let (status, Html(page)) = index_inner(&state).await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("Stand facing the detector."));
        assert!(page.contains("&lt;b&gt;position"));
        assert!(!page.contains("<b>position</b>"));
    }

    #[tokio::test]
    async fn test_health_inner_ok() {
        let server = MockServer::start().await;
        let (_dir, state) = make_state(&server).await;

        let (status, body) = health_inner(state.chat.store()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["sqlite"].is_string());
    }
}
