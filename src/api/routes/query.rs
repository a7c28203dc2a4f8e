//! Query Routes
//!
//! - POST /query - Execute a list or chart query

use axum::{extract::State, Json};
use serde_json::Value;
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::query::{decode, QueryOutput};

/// POST /query
///
/// Decode the body, execute it and return `{results, total}` for lists or
/// `{labels, series, scores?}` for charts.
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult<Json<QueryOutput>> {
    let query = decode(body, state.config.default_list_limit)?;
    let output = state.executor.execute(query).await?;
    Ok(Json(output))
}
