use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{QuorumError, Result};
use crate::raft::{LogIndex, Term};
use crate::runtime::NodeHandle;
use crate::transport::Envelope;

#[derive(Clone)]
pub struct AppState {
    pub handle: NodeHandle,
}

#[derive(Deserialize)]
pub struct AppendBody {
    pub entries: Vec<String>,
}

#[derive(Serialize)]
struct AppendReply {
    accepted: bool,
    term: Option<Term>,
    index: Option<LogIndex>,
    error: Option<String>,
}

pub fn router(handle: NodeHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/raft", post(inbox_handler))
        .route("/status", get(status_handler))
        .route("/append", post(append_handler))
        .layer(cors)
        .with_state(AppState { handle })
}

/// Bind and serve until the token is cancelled.
pub async fn serve(addr: SocketAddr, handle: NodeHandle, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| QuorumError::Transport(format!("bind {addr}: {e}")))?;
    tracing::info!(%addr, "transport listening");
    axum::serve(listener, router(handle))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| QuorumError::Transport(e.to_string()))
}

/// Peer inbox: hand the envelope to the node and acknowledge receipt. The
/// consensus-level answer travels back as its own envelope later.
async fn inbox_handler(
    State(state): State<AppState>,
    Json(envelope): Json<Envelope>,
) -> StatusCode {
    match state.handle.deliver(envelope.from, envelope.message).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.handle.status().await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response(),
    }
}

async fn append_handler(
    State(state): State<AppState>,
    Json(body): Json<AppendBody>,
) -> impl IntoResponse {
    let data = body.entries.into_iter().map(String::into_bytes).collect();
    match state.handle.append(data).await {
        Ok(coords) => (
            StatusCode::OK,
            Json(AppendReply {
                accepted: true,
                term: Some(coords.term),
                index: Some(coords.index),
                error: None,
            }),
        ),
        Err(err) => (
            StatusCode::CONFLICT,
            Json(AppendReply {
                accepted: false,
                term: None,
                index: None,
                error: Some(err.to_string()),
            }),
        ),
    }
}
