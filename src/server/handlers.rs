use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{info, warn};

use super::images::{ServerError, add_text_request, generate_request};
use super::models::{
    AddTextRequest, AddTextResponse, GenerateImageRequest, GenerateImageResponse, MessageResponse,
};
use super::state::ServerState;
use crate::providers;
use crate::settings::Settings;

pub async fn run_server(settings: Settings, addr: String) -> Result<()> {
    let provider = providers::build_provider(&settings)?;
    let state = Arc::new(ServerState::new(settings, provider)?);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address {}", addr))?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .with_context(|| "server stopped unexpectedly")?;
    info!("server stopped");
    Ok(())
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/images/generate", post(generate))
        .route("/images/add-text", post(add_text))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn root(State(state): State<Arc<ServerState>>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!(
            "Welcome to {}. POST /images/generate or /images/add-text to get started.",
            state.settings.app_name
        ),
    })
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "healthy" })),
    )
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

async fn generate(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<Json<GenerateImageResponse>, ServerError> {
    let Json(payload) = payload.map_err(rejected)?;
    Ok(Json(generate_request(state, payload).await?))
}

async fn add_text(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<AddTextRequest>, JsonRejection>,
) -> Result<Json<AddTextResponse>, ServerError> {
    let Json(payload) = payload.map_err(rejected)?;
    Ok(Json(add_text_request(state, payload).await?))
}

fn rejected(rejection: JsonRejection) -> ServerError {
    ServerError::bad_request(rejection.body_text())
}
