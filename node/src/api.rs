//! # REST API
//!
//! HTTP front of the development node. A client plays the peer: it posts
//! raw argument vectors, the node runs them against the hosted chaincode
//! and the sled world state.
//!
//! ## Endpoints
//!
//! | Method | Path              | Description                              |
//! |--------|-------------------|------------------------------------------|
//! | GET    | `/health`         | Liveness check                           |
//! | GET    | `/status`         | Channel, chaincode and last sequence     |
//! | POST   | `/init`           | Runs the chaincode `init` entry point    |
//! | POST   | `/invoke`         | Runs `invoke` and commits on success     |
//! | POST   | `/query`          | Runs `query` against committed state     |
//! | GET    | `/events/:tx_id`  | Event committed by a transaction         |
//! | GET    | `/state/:key`     | Raw committed value, for debugging       |
//! | GET    | `/metrics`        | Prometheus exposition                    |
//!
//! Invocation bodies look like
//! `{"creator": "relay", "args": ["balanceOf", "<address>"]}`. The creator
//! is passed to the chaincode as its UTF-8 bytes and defaults to `client`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ledger_protocol::ChaincodeInterface;

use crate::metrics::{metrics_handler, SharedMetrics};
use crate::world::{Entry, SledWorld};

const DEFAULT_CREATOR: &str = "client";

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared by every handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub world: Arc<SledWorld>,
    pub chaincode: Arc<dyn ChaincodeInterface>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let metrics = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state.metrics.clone());

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/init", post(init_handler))
        .route("/invoke", post(invoke_handler))
        .route("/query", post(query_handler))
        .route("/events/:tx_id", get(event_handler))
        .route("/state/:key", get(state_handler))
        .with_state(state)
        .merge(metrics)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct InvocationRequest {
    #[serde(default)]
    pub creator: Option<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub tx_id: String,
    pub status: i32,
    /// Payload as UTF-8 text, lossy.
    pub payload: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub channel: String,
    pub chaincode: String,
    pub sequence: u64,
    pub keys: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub name: String,
    /// Payload as UTF-8 text, lossy.
    pub payload: String,
}

/// Generic error body returned on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> Response {
    match state.world.sequence() {
        Ok(sequence) => Json(StatusResponse {
            version: state.version.clone(),
            channel: state.world.channel().to_string(),
            chaincode: state.world.chaincode().to_string(),
            sequence,
            keys: state.world.len(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
        .into_response(),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, format!("storage error: {}", e)),
    }
}

async fn init_handler(
    State(state): State<AppState>,
    Json(req): Json<InvocationRequest>,
) -> Response {
    execute(state, Entry::Init, req).await
}

async fn invoke_handler(
    State(state): State<AppState>,
    Json(req): Json<InvocationRequest>,
) -> Response {
    execute(state, Entry::Invoke, req).await
}

async fn query_handler(
    State(state): State<AppState>,
    Json(req): Json<InvocationRequest>,
) -> Response {
    execute(state, Entry::Query, req).await
}

/// Runs one entry point on the blocking pool. A chaincode error is a 400
/// carrying the chaincode's message; storage failures are 500s.
async fn execute(state: AppState, entry: Entry, req: InvocationRequest) -> Response {
    if req.args.is_empty() {
        return error(StatusCode::BAD_REQUEST, "args must name a function");
    }
    let creator = req.creator.unwrap_or_else(|| DEFAULT_CREATOR.to_string());
    let args: Vec<Vec<u8>> = req.args.into_iter().map(String::into_bytes).collect();
    let function = String::from_utf8_lossy(&args[0]).into_owned();

    let world = Arc::clone(&state.world);
    let chaincode = Arc::clone(&state.chaincode);
    let started = Instant::now();
    let joined = tokio::task::spawn_blocking(move || {
        let outcome = world.execute(chaincode.as_ref(), entry, creator.as_bytes(), args)?;
        let sequence = world.sequence()?;
        Ok::<_, crate::world::WorldError>((outcome, sequence))
    })
    .await;

    let (outcome, sequence) = match joined {
        Ok(Ok(done)) => done,
        Ok(Err(e)) => {
            tracing::error!(%function, "storage error: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, format!("storage error: {}", e));
        }
        Err(e) => {
            tracing::error!(%function, "invocation task failed: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "invocation task failed");
        }
    };

    let ok = outcome.response.is_ok();
    state
        .metrics
        .observe(entry.as_str(), ok, started.elapsed().as_secs_f64(), outcome.committed_keys);
    state.metrics.last_sequence.set(sequence as i64);
    tracing::info!(
        entry = entry.as_str(),
        %function,
        tx_id = %outcome.tx_id,
        status = outcome.response.status,
        "invocation finished"
    );

    let code = if ok { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    let body = InvocationResponse {
        tx_id: outcome.tx_id,
        status: outcome.response.status,
        payload: outcome.response.payload_text(),
        message: outcome.response.message,
    };
    (code, Json(body)).into_response()
}

/// `GET /events/:tx_id`
async fn event_handler(Path(tx_id): Path<String>, State(state): State<AppState>) -> Response {
    match state.world.event(&tx_id) {
        Ok(Some(event)) => Json(EventResponse {
            name: event.name,
            payload: String::from_utf8_lossy(&event.payload).into_owned(),
        })
        .into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, format!("no event for transaction {}", tx_id)),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, format!("storage error: {}", e)),
    }
}

/// `GET /state/:key`
async fn state_handler(Path(key): Path<String>, State(state): State<AppState>) -> Response {
    match state.world.get(&key) {
        Ok(Some(value)) => (StatusCode::OK, value).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, format!("key {} not found", key)),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, format!("storage error: {}", e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
