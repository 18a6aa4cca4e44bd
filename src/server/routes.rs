//! HTTP orchestration layer over the automation core.
//!
//! Batch runs are spawned detached and polled through the job registry;
//! the monitor is started/stopped through its process-wide registry. This
//! layer owns request validation and history caps: the automation core
//! only ever sees clean rows and callbacks.

use crate::automation::{batch, monitor::MonitorOptions};
use crate::core::types::Recipient;
use crate::core::AppState;
use crate::ingest;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

fn bad_request(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub rows: Vec<Recipient>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

pub async fn start_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Response {
    let parsed = match ingest::csv::sanitize_rows(request.rows) {
        Ok(p) => p,
        Err(e) => return bad_request(e),
    };
    spawn_batch(state, parsed, request.delay_ms)
}

pub async fn start_batch_csv(State(state): State<Arc<AppState>>, body: String) -> Response {
    let parsed = match ingest::csv::parse_rows(&body) {
        Ok(p) => p,
        Err(e) => return bad_request(e),
    };
    spawn_batch(state, parsed, None)
}

fn spawn_batch(
    state: Arc<AppState>,
    parsed: ingest::csv::ParsedRows,
    delay_ms: Option<u64>,
) -> Response {
    let delay = Duration::from_millis(delay_ms.unwrap_or_else(|| state.config.resolve_default_delay_ms()));
    let rows = parsed.rows;
    let record = state.jobs.create(rows.len());
    info!("batch: job {} queued with {} recipients", record.id, rows.len());

    let job = Arc::clone(&record);
    let cfg = Arc::clone(&state.config);
    tokio::spawn(async move {
        let progress_job = Arc::clone(&job);
        match batch::send_batch(&cfg, rows, delay, move |result| {
            progress_job.push_result(result)
        })
        .await
        {
            Ok(_summary) => job.finish(),
            Err(e) => {
                error!("batch: job {} setup failed: {}", job.id, e);
                job.fail(e.to_string());
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "job_id": record.id,
            "total": record.total,
            "rejected_rows": parsed.rejected,
        })),
    )
        .into_response()
}

pub async fn batch_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.jobs.get(&id) {
        Some(record) => Json(record.snapshot()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "unknown job" })),
        )
            .into_response(),
    }
}

// ── Monitor ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct MonitorStartRequest {
    /// Recipient walk for CSV sub-mode; omit (or send neither field) for
    /// watch sub-mode.
    #[serde(default)]
    pub rows: Option<Vec<Recipient>>,
    /// Same rows as a raw CSV document; `rows` wins when both are present.
    #[serde(default)]
    pub rows_csv: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

pub async fn monitor_start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MonitorStartRequest>,
) -> Response {
    let rows = if let Some(rows) = request.rows.filter(|r| !r.is_empty()) {
        match ingest::csv::sanitize_rows(rows) {
            Ok(p) => p.rows,
            Err(e) => return bad_request(e),
        }
    } else if let Some(csv_text) = request.rows_csv.filter(|t| !t.trim().is_empty()) {
        match ingest::csv::parse_rows(&csv_text) {
            Ok(p) => p.rows,
            Err(e) => return bad_request(e),
        }
    } else {
        Vec::new()
    };

    let delay = Duration::from_millis(
        request
            .delay_ms
            .unwrap_or_else(|| state.config.resolve_default_delay_ms()),
    );

    let sink_state = state.clone();
    let opts = MonitorOptions {
        rows,
        delay,
        host: state.config.resolve_host(),
        on_event: Arc::new(move |event| sink_state.push_monitor_event(event)),
    };

    let outcome = state.monitor.start(&state.config, opts).await;
    if outcome.started {
        state
            .monitor_events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
    Json(outcome).into_response()
}

pub async fn monitor_stop(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stopped = state.monitor.stop().await;
    Json(serde_json::json!({ "stopped": stopped }))
}

pub async fn monitor_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = match state.monitor.stats().await {
        Some(stats) => Some(stats.snapshot()),
        None => None,
    };
    let events: Vec<_> = state
        .monitor_events
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .cloned()
        .collect();
    Json(serde_json::json!({
        "running": stats.as_ref().map(|s| s.running).unwrap_or(false),
        "stats": stats,
        "recent_events": events,
    }))
}

pub async fn monitor_screenshot(State(state): State<Arc<AppState>>) -> Response {
    match state.monitor.screenshot().await {
        Some(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        None => Json(serde_json::json!({ "available": false })).into_response(),
    }
}

// ── Service ──────────────────────────────────────────────────────────────────

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "wa-courier",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
