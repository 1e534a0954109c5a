//! HTTP service for the customer leaderboard.
//!
//! This module defines [`LeaderboardService`], which owns the pipeline manager
//! and the leaderboard it feeds, and [`router`], which exposes them over JSON:
//!
//! - `POST /customer/{customer_id}/score/{delta}`: apply a score delta,
//!   answers the new score.
//! - `GET /leaderboard?start=&end=`: customers ranked `start..=end`.
//! - `GET /leaderboard/{customer_id}?high=&low=`: a customer and its
//!   neighbors.
//! - `GET /health`: rebuild pipeline health.
//!
//! Every error is answered as `{ "error": "<message>" }` with a status derived
//! from the underlying [`leaderboard::Error`].

use crate::server::{
    config::ServerConfig,
    telemetry::{
        increment_rejected, increment_requests, record_pipeline_pending, record_update_duration,
    },
};
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use leaderboard::{
    CustomerId, Error, HealthReport, Leaderboard, PipelineManager, RankedCustomer,
};
use serde::Deserialize;
use std::{sync::Arc, time::Instant};
use tower_http::cors::{Any, CorsLayer};

/// Leaderboard state shared by every request handler.
#[derive(Clone)]
pub struct LeaderboardService {
    board: Arc<Leaderboard>,
    manager: Arc<PipelineManager>,
}

impl LeaderboardService {
    /// Creates the pipeline manager and starts the leaderboard's rebuild
    /// worker.
    pub fn new(config: &ServerConfig) -> leaderboard::Result<Self> {
        let manager = PipelineManager::new(config.shutdown_timeout);
        let board = Leaderboard::start(&manager, &config.leaderboard)?;

        Ok(Self {
            board: Arc::new(board),
            manager: Arc::new(manager),
        })
    }

    /// Refuses further updates, then waits for the rebuilder to publish
    /// everything already accepted.
    pub async fn shutdown(&self) -> leaderboard::Result<()> {
        self.manager.shutdown().await
    }
}

/// Builds the HTTP router over `service`.
pub fn router(service: LeaderboardService) -> Router {
    Router::new()
        .route("/customer/{customer_id}/score/{delta}", post(update_score))
        .route("/leaderboard", get(range))
        .route("/leaderboard/{customer_id}", get(neighbors))
        .route("/health", get(health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    start: usize,
    end: usize,
}

#[derive(Debug, Default, Deserialize)]
struct WindowParams {
    #[serde(default)]
    high: usize,
    #[serde(default)]
    low: usize,
}

#[tracing::instrument(level = "debug", skip_all)]
async fn update_score(
    State(service): State<LeaderboardService>,
    path: Result<Path<(CustomerId, f64)>, PathRejection>,
) -> Result<Json<f64>, ApiError> {
    const ROUTE: &str = "update_score";
    increment_requests(ROUTE);

    let start = Instant::now();
    let result = path
        .map_err(ApiError::from)
        .and_then(|Path((id, delta))| Ok(service.board.update_score(id, delta)?));
    record_update_duration(start.elapsed().as_secs_f64() * 1e6);
    record_pipeline_pending(service.board.health().pending);

    observe(ROUTE, result).map(Json)
}

#[tracing::instrument(level = "debug", skip_all)]
async fn range(
    State(service): State<LeaderboardService>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<Vec<RankedCustomer>>, ApiError> {
    const ROUTE: &str = "range";
    increment_requests(ROUTE);

    let result = params
        .map_err(ApiError::from)
        .and_then(|Query(RangeParams { start, end })| Ok(service.board.range(start, end)?));

    observe(ROUTE, result).map(Json)
}

#[tracing::instrument(level = "debug", skip_all)]
async fn neighbors(
    State(service): State<LeaderboardService>,
    path: Result<Path<CustomerId>, PathRejection>,
    params: Result<Query<WindowParams>, QueryRejection>,
) -> Result<Json<Vec<RankedCustomer>>, ApiError> {
    const ROUTE: &str = "neighbors";
    increment_requests(ROUTE);

    let result = path.map_err(ApiError::from).and_then(|Path(id)| {
        let Query(WindowParams { high, low }) = params?;
        Ok(service.board.neighbors(id, high, low)?)
    });

    observe(ROUTE, result).map(Json)
}

async fn health(State(service): State<LeaderboardService>) -> (StatusCode, Json<HealthReport>) {
    increment_requests("health");

    let report = service.board.health();
    let status = if report.alive {
        StatusCode::OK
    } else {
        increment_rejected("health");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

fn observe<T>(route: &'static str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    if result.is_err() {
        increment_rejected(route);
    }
    result
}

/// An error answered to an HTTP client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::InvalidRange { .. } | Error::InvalidDelta { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } | Error::NoData { .. } => StatusCode::NOT_FOUND,
            Error::ServiceShutdown => StatusCode::SERVICE_UNAVAILABLE,
            Error::PipelineExists { .. }
            | Error::PipelineMissing { .. }
            | Error::WorkerSpawn { .. }
            | Error::ChannelError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        } else {
            tracing::debug!(status = %self.status, "{}", self.message);
        }
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use core::time::Duration;
    use leaderboard::LeaderboardConfig;
    use serde_json::Value;
    use tower::ServiceExt;

    fn service() -> LeaderboardService {
        let config = ServerConfig {
            server_addr: String::from("127.0.0.1:0"),
            leaderboard: LeaderboardConfig::default(),
            shutdown_timeout: Duration::from_secs(1),
        };
        LeaderboardService::new(&config).unwrap()
    }

    async fn call(service: &LeaderboardService, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router(service.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn ids(body: &Value) -> Vec<i64> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|c| c["customerId"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn update_answers_new_score() {
        let service = service();

        let (status, body) = call(&service, "POST", "/customer/1/score/20").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_f64(), Some(20.0));

        let (_, body) = call(&service, "POST", "/customer/1/score/-30.5").await;
        assert_eq!(body.as_f64(), Some(0.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn update_rejects_bad_input() {
        let service = service();

        let (status, body) = call(&service, "POST", "/customer/1/score/1001").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("1001"));

        let (status, body) = call(&service, "POST", "/customer/abc/score/1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn leaderboard_range_and_neighbors() {
        let service = service();
        for (id, delta) in [(3, 50), (1, 70), (2, 70), (4, 10)] {
            let uri = format!("/customer/{id}/score/{delta}");
            assert_eq!(call(&service, "POST", &uri).await.0, StatusCode::OK);
        }
        service.board.sync().await.unwrap();

        let (status, body) = call(&service, "GET", "/leaderboard?start=1&end=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec![1, 2, 3]);
        assert_eq!(body[0]["rank"], 1);
        assert_eq!(body[0]["score"], 70.0);

        let (status, body) = call(&service, "GET", "/leaderboard/2?high=1&low=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec![1, 2, 3]);
        assert_eq!(body[1]["rank"], 2);

        let (_, body) = call(&service, "GET", "/leaderboard/4").await;
        assert_eq!(ids(&body), vec![4]);
        assert_eq!(body[0]["rank"], 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn leaderboard_query_errors() {
        let service = service();
        call(&service, "POST", "/customer/1/score/5").await;
        service.board.sync().await.unwrap();

        let (status, _) = call(&service, "GET", "/leaderboard?start=3&end=2").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&service, "GET", "/leaderboard?start=0&end=2").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&service, "GET", "/leaderboard?start=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&service, "GET", "/leaderboard?start=2&end=5").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&service, "GET", "/leaderboard/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("99"));

        let (status, _) = call(&service, "GET", "/leaderboard/1?high=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn health_reflects_shutdown() {
        let service = service();
        call(&service, "POST", "/customer/1/score/5").await;

        let (status, body) = call(&service, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["alive"], true);
        assert_eq!(body["name"], "leaderboard");

        service.shutdown().await.unwrap();

        let (status, body) = call(&service, "GET", "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["alive"], false);
        assert_eq!(body["processed"], 1);

        let (status, _) = call(&service, "POST", "/customer/1/score/5").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
