//! HTTP/JSON surface of the gateway.
//!
//! A thin shell over the core: routing, body shapes, and status mapping.
//! The command dispatcher lives in the `POST /command` handler: resolve the
//! device, authorize the command, acquire a session, execute. Authorization
//! runs before session acquisition so a denied command never touches the
//! device.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use axum_extra::extract::Query;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::GatewayError;
use crate::gate::CommandGate;
use crate::inventory::{Device, Inventory};
use crate::session::SessionPool;

/// Shared state injected into every handler. Constructed once in `main`,
/// torn down (sessions closed) on shutdown.
#[derive(Clone)]
pub struct AppState {
    pub inventory: Arc<Inventory>,
    pub pool: Arc<SessionPool>,
    pub gate: Arc<CommandGate>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/devices", get(list_devices))
        .route("/devices/:host_or_tag", get(get_device))
        .route("/management/devices", post(upsert_device))
        .route("/management/devices/:host_or_tag", delete(delete_device))
        .route("/command", post(run_command))
        .with_state(state)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Unknown devices, missing sessions, and SSH failures all
            // surface as 404, matching the service's published contract.
            _ => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "aos ssh api": "1.0.0" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
struct TagQuery {
    #[serde(default)]
    tags: Vec<String>,
}

/// Public projection of a device: never includes credentials or key paths.
#[derive(Debug, Serialize)]
struct DeviceView {
    host: String,
    tags: Vec<String>,
}

impl From<Device> for DeviceView {
    fn from(device: Device) -> DeviceView {
        DeviceView {
            host: device.host,
            tags: device.tags,
        }
    }
}

/// `GET /devices?tags=a&tags=b` — devices whose tags intersect the query;
/// no query returns everything.
async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> Json<Vec<DeviceView>> {
    let views = state
        .inventory
        .devices()
        .await
        .into_iter()
        .filter(|d| query.tags.is_empty() || d.tags.iter().any(|t| query.tags.contains(t)))
        .map(DeviceView::from)
        .collect();
    Json(views)
}

async fn get_device(
    State(state): State<AppState>,
    Path(host_or_tag): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let device = state
        .inventory
        .resolve(&host_or_tag)
        .await
        .ok_or(GatewayError::NotFound(host_or_tag))?;
    Ok(Json(json!({ "host": device.host })))
}

/// `POST /management/devices` — create or replace a device entry and rewrite
/// the inventory file.
async fn upsert_device(
    State(state): State<AppState>,
    Json(device): Json<Device>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let view = json!({
        "host": device.host,
        "port": device.port,
        "jump_ssh_name": device.jump_ssh_name,
        "tags": device.tags,
    });
    state.inventory.upsert(device).await?;
    Ok(Json(json!({ "status": "success", "device": view })))
}

/// `DELETE /management/devices/{host_or_tag}` — remove the entry and rewrite
/// the file. Live sessions to the device are not closed; the reaper collects
/// them once idle.
async fn delete_device(
    State(state): State<AppState>,
    Path(host_or_tag): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let removed = state.inventory.remove(&host_or_tag).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!(
            "Device {} (requested: {host_or_tag}) deleted successfully.",
            removed.host
        ),
    })))
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub host: String,
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// `POST /command` — the dispatcher.
async fn run_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, GatewayError> {
    let device = state
        .inventory
        .resolve(&request.host)
        .await
        .ok_or_else(|| GatewayError::NotFound(request.host.clone()))?;

    state.gate.check(&request.command)?;

    let jump = match device.jump_ssh_name.as_deref() {
        Some(name) => Some(state.inventory.find_jump(name).await.ok_or_else(|| {
            GatewayError::NotFound(format!("jump host {name}"))
        })?),
        None => None,
    };

    state.pool.get_session(&device, jump.as_ref()).await?;
    let (stdout, stderr) = state
        .pool
        .execute(&device.host, &request.command, device.jump_name())
        .await?;

    debug!(
        "executed '{}' on {} (requested: {})",
        request.command, device.host, request.host
    );
    Ok(Json(CommandResponse {
        stdout: Some(stdout),
        stderr: Some(stderr),
    }))
}
