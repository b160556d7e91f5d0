//! HTTP adapter over the window aggregator.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::aggregator::WindowAggregator;
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::model::{Statistics, Transaction};

/// Shared handler state: one aggregator for the whole process.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<WindowAggregator>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(aggregator: Arc<WindowAggregator>, clock: Arc<dyn Clock>) -> Self {
        Self { aggregator, clock }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    buckets: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/transactions", post(create_transaction))
        .route("/statistics", get(get_statistics))
        .route("/clear-storage", put(clear_storage))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServiceError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServiceError::Bind { addr, source })
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        window_secs = state.aggregator.window_secs(),
        "window-stats server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("window-stats server stopped");
    Ok(())
}

async fn create_transaction(
    State(state): State<AppState>,
    Json(txn): Json<Transaction>,
) -> Response {
    let now = state.clock.now();
    if state.aggregator.is_stale(txn.timestamp, now) {
        tracing::debug!(timestamp_ms = txn.timestamp, "stale transaction ignored");
        return StatusCode::NO_CONTENT.into_response();
    }

    match state.aggregator.try_record(txn.amount, txn.timestamp, now) {
        Ok(_) => StatusCode::CREATED.into_response(),
        Err(reason) => {
            tracing::debug!(
                amount = txn.amount,
                timestamp_ms = txn.timestamp,
                %reason,
                "transaction rejected"
            );
            (StatusCode::UNPROCESSABLE_ENTITY, reason.to_string()).into_response()
        }
    }
}

async fn get_statistics(State(state): State<AppState>) -> Json<Statistics> {
    Json(state.aggregator.query(state.clock.now()))
}

async fn clear_storage(State(state): State<AppState>) -> StatusCode {
    state.aggregator.reset();
    StatusCode::OK
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        buckets: state.aggregator.bucket_count(),
    })
}
