//! /status, /download, /suspend, /abort, /resume handlers.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use dwl_client::DownloadController;
use dwl_core::event::UpdateStateFacade;
use dwl_core::wire::UpdateType;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

pub async fn handle_status(State(state): State<ApiState>) -> Json<UpdateStateFacade> {
    Json(state.facade.snapshot())
}

// ── /download ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DownloadRequest {
    pub uri: String,
    #[serde(default)]
    pub update_type: DownloadUpdateType,
}

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DownloadUpdateType {
    #[default]
    Firmware,
    Software,
}

impl From<DownloadUpdateType> for UpdateType {
    fn from(value: DownloadUpdateType) -> Self {
        match value {
            DownloadUpdateType::Firmware => UpdateType::Firmware,
            DownloadUpdateType::Software => UpdateType::Software,
        }
    }
}

#[derive(Serialize)]
pub struct DownloadResponse {
    pub accepted: bool,
}

pub async fn handle_download(
    State(state): State<ApiState>,
    Json(body): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>, (StatusCode, String)> {
    state.facade.initiate(body.uri.clone());

    let mut controller = new_controller(&state);
    let update_type: UpdateType = body.update_type.into();
    if let Err(reason) = controller.initiate(&body.uri, update_type) {
        tracing::warn!(?reason, "rejected download request");
        return Err((StatusCode::BAD_REQUEST, format!("{:?}", reason)));
    }

    spawn_run(controller);
    Ok(Json(DownloadResponse { accepted: true }))
}

// ── /suspend, /abort, /resume ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ControlResponse {
    pub ok: bool,
}

pub async fn handle_suspend(State(state): State<ApiState>) -> Json<ControlResponse> {
    state.flags.suspend.store(true, Ordering::SeqCst);
    tracing::info!("suspend requested");
    Json(ControlResponse { ok: true })
}

pub async fn handle_abort(State(state): State<ApiState>) -> Json<ControlResponse> {
    state.flags.abort.store(true, Ordering::SeqCst);
    tracing::info!("abort requested");
    Json(ControlResponse { ok: true })
}

pub async fn handle_resume(State(state): State<ApiState>) -> Json<ControlResponse> {
    state.flags.suspend.store(false, Ordering::SeqCst);
    state.flags.abort.store(false, Ordering::SeqCst);
    spawn_run(new_controller(&state));
    tracing::info!("resume requested");
    Json(ControlResponse { ok: true })
}

fn new_controller(state: &ApiState) -> DownloadController {
    DownloadController::new(
        state.config.clone(),
        state.credentials.clone(),
        state.sink_factory.clone(),
        state.facade.clone() as Arc<dyn dwl_core::event::EventSink>,
        state.flags.clone(),
    )
}

fn spawn_run(mut controller: DownloadController) {
    tokio::spawn(async move {
        let event = controller.run().await;
        tracing::debug!(?event, "controller run finished");
    });
}
