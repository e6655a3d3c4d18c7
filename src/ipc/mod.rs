//! HTTP/WebSocket API gateway.
//!
//! A thin translation layer: inbound commands become Supervisor calls, and
//! the live snapshot stream is exposed at `/ws`.

pub mod ws;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::scripts::ScriptStore;
use crate::supervisor::error::SupervisorError;
use crate::supervisor::record::ProcessStatus;
use crate::supervisor::Supervisor;

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessStartRequest {
    pub name: String,
    pub script_path: String,
    #[serde(default)]
    pub auto_restart: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub processes_count: usize,
    pub active_processes: usize,
}

#[derive(Clone)]
pub struct ApiServer {
    pub supervisor: Arc<Supervisor>,
    pub scripts: Arc<ScriptStore>,
    pub listen_addr: String,
}

impl ApiServer {
    pub fn new(supervisor: Arc<Supervisor>, scripts: Arc<ScriptStore>, listen_addr: &str) -> Self {
        Self {
            supervisor,
            scripts,
            listen_addr: listen_addr.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/processes", get(list_processes).post(create_process))
            .route("/api/processes/:id", get(get_process).delete(delete_process))
            .route("/api/processes/:id/stop", post(stop_process))
            .route("/api/processes/:id/restart", post(restart_process))
            .route("/api/processes/:id/logs", get(get_process_logs))
            .route("/api/scripts", get(list_scripts))
            .route("/api/upload", post(upload_script))
            .route("/api/health", get(health))
            .route("/ws", get(ws::status_stream))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn start(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("API listening on http://{}", self.listen_addr);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// GET /api/processes - snapshots of all managed processes
async fn list_processes(State(state): State<ApiServer>) -> impl IntoResponse {
    Json(state.supervisor.list().await)
}

/// POST /api/processes - create and start a process
async fn create_process(
    State(state): State<ApiServer>,
    Json(payload): Json<ProcessStartRequest>,
) -> Result<impl IntoResponse, SupervisorError> {
    let snapshot = state
        .supervisor
        .start(&payload.name, &payload.script_path, payload.auto_restart)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "process_id": snapshot.id,
            "process": snapshot,
        })),
    ))
}

/// GET /api/processes/:id - one snapshot
async fn get_process(
    Path(id): Path<String>,
    State(state): State<ApiServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let snapshot = state.supervisor.get(&id).await?;
    Ok(Json(snapshot))
}

/// POST /api/processes/:id/stop
async fn stop_process(
    Path(id): Path<String>,
    State(state): State<ApiServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let snapshot = state.supervisor.stop(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Process '{}' stopped", snapshot.name),
        "process": snapshot,
    })))
}

/// POST /api/processes/:id/restart
async fn restart_process(
    Path(id): Path<String>,
    State(state): State<ApiServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let snapshot = state.supervisor.restart(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Process '{}' restarted", snapshot.name),
        "process": snapshot,
    })))
}

/// DELETE /api/processes/:id
async fn delete_process(
    Path(id): Path<String>,
    State(state): State<ApiServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    state.supervisor.delete(&id).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/processes/:id/logs?limit=N
async fn get_process_logs(
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
    State(state): State<ApiServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let limit = query.limit.unwrap_or(100);
    let logs = state.supervisor.get_logs(&id, limit).await?;
    Ok(Json(json!({ "logs": logs })))
}

/// GET /api/scripts - uploaded scripts available to run
async fn list_scripts(State(state): State<ApiServer>) -> impl IntoResponse {
    Json(json!({ "scripts": state.scripts.list() }))
}

/// POST /api/upload - multipart upload of a .py script
async fn upload_script(
    State(state): State<ApiServer>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, SupervisorError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SupervisorError::Validation(format!("invalid multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(|f| f.to_string()) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| SupervisorError::Validation(format!("failed to read upload: {}", e)))?;

        let info = state.scripts.save(&filename, &data).await?;
        return Ok(Json(json!({
            "filename": info.name,
            "path": info.path,
            "size": info.size,
        })));
    }

    Err(SupervisorError::Validation(
        "multipart body contains no file".to_string(),
    ))
}

/// GET /api/health
async fn health(State(state): State<ApiServer>) -> impl IntoResponse {
    let processes = state.supervisor.list().await;
    let active = processes
        .iter()
        .filter(|p| p.status == ProcessStatus::Running)
        .count();
    Json(HealthResponse {
        status: "healthy",
        processes_count: processes.len(),
        active_processes: active,
    })
}
