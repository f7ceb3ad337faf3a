//! Read-only dashboard handlers

use axum::{extract::{State, Path, Query}, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, AppResult};
use crate::models::{ChannelAmplitude, Event, MetricDescriptor, NodeSummary, TimeRange};
use crate::services::query::{parse_metrics, resolve_range, InferenceReport, MetricSeries, SummaryStats};

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub node_id: Option<String>,
    pub metrics: Option<String>,
}

impl RangeParams {
    fn range(&self) -> AppResult<TimeRange> {
        resolve_range(self.start.as_deref(), self.end.as_deref(), Utc::now())
    }

    fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct InferenceParams {
    pub context_hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct NodesParams {
    #[serde(default)]
    pub located: bool,
}

#[derive(Debug, Serialize)]
pub struct DataRangeResponse {
    pub min_timestamp: Option<DateTime<Utc>>,
    pub max_timestamp: Option<DateTime<Utc>>,
}

/// Measurement series over a time range
pub async fn measurements(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> AppResult<Json<MetricSeries>> {
    let range = params.range()?;
    let metrics = parse_metrics(params.metrics.as_deref())?;
    let series = state.query.measurement_series(range, &metrics, params.node_id()).await?;
    Ok(Json(series))
}

pub async fn events(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> AppResult<Json<Vec<Event>>> {
    let events = state.query.events(params.range()?, params.node_id()).await?;
    Ok(Json(events))
}

/// Likely causes for one stored event
pub async fn event_inferences(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<InferenceParams>,
) -> AppResult<Json<InferenceReport>> {
    let report = state.query.event_inferences(id, params.context_hours).await?;
    Ok(Json(report))
}

pub async fn nodes(
    State(state): State<AppState>,
    Query(params): Query<NodesParams>,
) -> AppResult<Json<Vec<NodeSummary>>> {
    Ok(Json(state.query.list_nodes(params.located).await?))
}

pub async fn data_range(State(state): State<AppState>) -> AppResult<Json<DataRangeResponse>> {
    let range = state.query.data_range().await?;
    Ok(Json(DataRangeResponse {
        min_timestamp: range.as_ref().map(|r| r.min_timestamp),
        max_timestamp: range.as_ref().map(|r| r.max_timestamp),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Json<Vec<MetricDescriptor>> {
    Json(state.query.available_metrics())
}

pub async fn summary(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> AppResult<Json<SummaryStats>> {
    Ok(Json(state.query.summary(params.range()?).await?))
}

pub async fn channel_amplitude(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> AppResult<Json<Vec<ChannelAmplitude>>> {
    Ok(Json(state.query.channel_amplitude(params.range()?).await?))
}
