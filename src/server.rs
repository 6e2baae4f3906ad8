// SPDX-License-Identifier: Apache-2.0

//! HTTP surface
//!
//! Thin axum binding of the commands. Errors are rendered as
//! `{"detail": ..., "kind": ...}` with a status derived from the error kind.

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;

use crate::commands::connection::{self, ConnectionInSchema, ConnectionListOutput, ConnectionResponse};
use crate::commands::models::{self, ListModelResponse};
use crate::commands::query::{self, QueryInSchema, QueryOut};
use crate::commands::metrics as metrics_command;
use crate::engine::EngineError;
use crate::metrics::QueryMetricsSnapshot;
use crate::SharedState;

const SHUTTING_DOWN: &str = "Server is shutting down";

/// Engine error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::ConnectionNotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::UnsupportedDialect { .. }
            | EngineError::MissingConfiguration { .. }
            | EngineError::InvalidModel { .. } => StatusCode::BAD_REQUEST,
            EngineError::CompileFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::ExecutionFailure { .. }
            | EngineError::ConnectionFailed { .. }
            | EngineError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match &self.0 {
            EngineError::CompileFailure { message } => format!("Parsing error: {message}"),
            EngineError::MissingConfiguration { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({ "detail": self.detail(), "kind": self.0.kind() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(healthcheck))
        .route("/models", get(list_models))
        .route("/connections", get(list_connections))
        .route("/connection", post(create_connection).put(create_connection))
        .route("/query", post(run_query))
        .route("/raw_query", post(run_raw_query))
        .route("/metrics", get(get_metrics))
        .route("/terminate", get(terminate))
        .with_state(state)
}

/// Binds `addr` and serves until the shutdown token fires.
pub async fn serve(state: SharedState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let shutdown = state.shutdown.clone();
    tracing::info!(%addr, "Gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn healthcheck() -> Json<&'static str> {
    Json("healthy")
}

async fn list_models(State(state): State<SharedState>) -> Json<ListModelResponse> {
    Json(models::list_models(&state))
}

async fn list_connections(State(state): State<SharedState>) -> Json<ConnectionListOutput> {
    Json(connection::list_connections(&state).await)
}

async fn create_connection(
    State(state): State<SharedState>,
    Json(request): Json<ConnectionInSchema>,
) -> ApiResult<ConnectionResponse> {
    Ok(Json(connection::create_connection(&state, request).await?))
}

async fn run_query(
    State(state): State<SharedState>,
    Json(request): Json<QueryInSchema>,
) -> ApiResult<QueryOut> {
    Ok(Json(query::run_query(&state, request).await?))
}

async fn run_raw_query(
    State(state): State<SharedState>,
    Json(request): Json<QueryInSchema>,
) -> ApiResult<QueryOut> {
    Ok(Json(query::run_raw_query(&state, request).await?))
}

async fn get_metrics() -> Json<QueryMetricsSnapshot> {
    Json(metrics_command::get_metrics())
}

async fn terminate(State(state): State<SharedState>) -> impl IntoResponse {
    tracing::warn!("Terminate requested; cancelling in-flight work");
    state.shutdown.cancel();
    (StatusCode::SERVICE_UNAVAILABLE, SHUTTING_DOWN)
}
