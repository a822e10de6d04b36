use std::fmt;
use std::net::SocketAddr;

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{
    ApiError, ConfigError, ErrorCode, ExperimentConfig, ExperimentStatus, GamePageView,
    LiveRequest, LiveResponse, LiveResult, ParticipantStatus, ResultsView, RoundOrder,
    RoundRecord, SCHEMA_VERSION_V1,
};
use game_core::{SessionError, SettlementError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;

use crate::{GameApi, PersistedExperimentSummary, PersistenceError, SqliteRoundStore};

const MAX_PAGE_SIZE: usize = 1000;
const DEFAULT_SQLITE_PATH: &str = "game_rounds.sqlite";

include!("error.rs");
include!("state.rs");
include!("routes/experiments.rs");
include!("routes/participants.rs");
include!("util.rs");

pub async fn serve(addr: SocketAddr) -> Result<(), ServerError> {
    let state = AppState::new();
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "investment game api listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/experiments",
            post(create_experiment).get(list_experiments),
        )
        .route(
            "/api/v1/experiments/{experiment_id}/status",
            get(get_experiment_status),
        )
        .route(
            "/api/v1/experiments/{experiment_id}/participants",
            post(register_participant).get(list_participants),
        )
        .route(
            "/api/v1/experiments/{experiment_id}/participants/{participant_id}",
            get(get_participant),
        )
        .route(
            "/api/v1/experiments/{experiment_id}/participants/{participant_id}/live",
            post(post_live),
        )
        .route(
            "/api/v1/experiments/{experiment_id}/participants/{participant_id}/spending",
            post(post_spending),
        )
        .route(
            "/api/v1/experiments/{experiment_id}/participants/{participant_id}/advance",
            post(post_advance),
        )
        .route(
            "/api/v1/experiments/{experiment_id}/participants/{participant_id}/game",
            get(get_game_page),
        )
        .route(
            "/api/v1/experiments/{experiment_id}/participants/{participant_id}/results",
            get(get_results_page),
        )
        .route(
            "/api/v1/experiments/{experiment_id}/participants/{participant_id}/records",
            get(get_records),
        )
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests;
