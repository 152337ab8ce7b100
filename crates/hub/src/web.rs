use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use anyhow::{Context, Result};
use riego_node::{Clock, EngineError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use sysinfo::System;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::controller::SharedController;
use crate::scheduler::{trigger_cycle, Trigger};
use crate::state::{format_local, round1, IrrigationEvent, Report};

const INDEX_HTML: &str = include_str!("ui/index.html");

const SERVICE_NAME: &str = "riego-hub";

#[derive(Clone)]
pub struct AppState {
    controller: SharedController,
    /// Same clock the controller reads; `/health` uses it without the lock.
    clock: Arc<dyn Clock>,
    started_at: Instant,
}

impl AppState {
    pub fn new(controller: SharedController, clock: Arc<dyn Clock>) -> Self {
        Self {
            controller,
            clock,
            started_at: Instant::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

struct ApiError(EngineError);

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("api: {}", self.0);
        let body = ErrorBody {
            status: "error",
            message: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ReportQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct CycleResponse {
    status: &'static str,
    message: &'static str,
    local_time: String,
    humidity: f64,
    event: IrrigationEvent,
}

#[derive(Serialize)]
struct ResetResponse {
    status: &'static str,
    message: &'static str,
    local_time: String,
}

#[derive(Deserialize)]
struct ModeRequest {
    automatic: bool,
}

#[derive(Serialize)]
struct ModeResponse {
    status: &'static str,
    automatic: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    local_time: String,
    service: &'static str,
    uptime_secs: u64,
    host_uptime_secs: u64,
    memory_used_kb: u64,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/report", get(api_report))
        .route("/api/cycle", post(api_cycle))
        .route("/api/reset", post(api_reset))
        .route("/api/mode", post(api_mode))
        .route("/health", get(health))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

async fn api_report(
    State(state): State<AppState>,
    Query(q): Query<ReportQuery>,
) -> Json<Report> {
    let ctl = state.controller.read().await;
    match q.limit {
        Some(limit) => Json(ctl.report_recent(limit)),
        None => Json(ctl.report()),
    }
}

async fn api_cycle(State(state): State<AppState>) -> Result<Json<CycleResponse>, ApiError> {
    let event = trigger_cycle(&state.controller, Trigger::Manual)
        .await
        .map_err(ApiError)?;
    Ok(Json(CycleResponse {
        status: "success",
        message: "monitoring cycle executed",
        local_time: format_local(&event.timestamp),
        humidity: round1(event.humidity_after),
        event,
    }))
}

async fn api_reset(State(state): State<AppState>) -> Json<ResetResponse> {
    let mut ctl = state.controller.write().await;
    ctl.reset();
    Json(ResetResponse {
        status: "success",
        message: "system reset",
        local_time: format_local(&ctl.now()),
    })
}

async fn api_mode(
    State(state): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> Json<ModeResponse> {
    let mut ctl = state.controller.write().await;
    ctl.set_automatic_mode(req.automatic);
    Json(ModeResponse {
        status: "success",
        automatic: ctl.state().automatic_mode,
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut sys = System::new();
    sys.refresh_memory();

    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now(),
        local_time: format_local(&state.clock.now()),
        service: SERVICE_NAME,
        uptime_secs: state.started_at.elapsed().as_secs(),
        host_uptime_secs: System::uptime(),
        memory_used_kb: sys.used_memory() / 1024,
    })
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!("dashboard listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
