//! Node-facing handlers

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::config::{CollectorSettings, Thresholds};
use crate::middleware::auth::NodeContext;
use crate::{AppState, AppResult};

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub ok: bool,
    pub node_id: String,
    pub measurement_id: i64,
    pub events_detected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChannelSubmitResponse {
    pub ok: bool,
    pub node_id: String,
    pub stored: usize,
}

#[derive(Debug, Serialize)]
pub struct NodeConfigResponse {
    pub collector_settings: CollectorSettings,
    pub threshold_config: Thresholds,
}

/// Submit one measurement
///
/// Raw body so that an empty request is read as an empty object and JSON
/// errors surface as our own `400` body.
pub async fn submit_measurement(
    State(state): State<AppState>,
    node: NodeContext,
    body: Bytes,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
    let outcome = state.ingestion.ingest(Some(&node.credential), &body).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            ok: true,
            node_id: outcome.node_id,
            measurement_id: outcome.measurement_id,
            events_detected: outcome.events.len(),
            warning: outcome.warning,
        }),
    ))
}

/// Submit per-channel amplitude samples
pub async fn submit_channel_amplitude(
    State(state): State<AppState>,
    node: NodeContext,
    body: Bytes,
) -> AppResult<(StatusCode, Json<ChannelSubmitResponse>)> {
    let outcome = state
        .ingestion
        .ingest_channel_amplitude(Some(&node.credential), &body)
        .await?;

    tracing::debug!(node_id = %outcome.node_id, stored = outcome.stored, "Channel amplitude stored");

    Ok((
        StatusCode::CREATED,
        Json(ChannelSubmitResponse {
            ok: true,
            node_id: outcome.node_id,
            stored: outcome.stored,
        }),
    ))
}

pub async fn node_config(State(state): State<AppState>, _node: NodeContext) -> Json<NodeConfigResponse> {
    Json(NodeConfigResponse {
        collector_settings: state.config.collector.clone(),
        threshold_config: state.config.thresholds.clone(),
    })
}
