//! Add Route
//!
//! - POST /add - Ingest one event or an array of events
//!
//! Rejected events do not fail the request; they are listed in the report
//! and appended to the collection's rejection log.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use crate::api::dto::AddParams;
use crate::api::error::ApiResult;
use crate::api::state::{AppState, DEFAULT_COLLECTION};
use crate::ingest::IngestReport;

/// POST /add
pub async fn add_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AddParams>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<IngestReport>)> {
    let collection = params.collection.as_deref().unwrap_or(DEFAULT_COLLECTION);
    let report = state.ingestor.ingest(collection, body).await?;

    let status = if report.accepted > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)))
}
