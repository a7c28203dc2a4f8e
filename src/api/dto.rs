//! Data Transfer Objects
//!
//! Request and response types for the REST API. Query bodies are decoded by
//! [`crate::query::request`]; ingest answers with [`crate::ingest::IngestReport`].

use serde::{Deserialize, Serialize};

use crate::storage::CollectionStats;

/// Query string of `POST /add`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddParams {
    /// Target collection; the default collection when omitted
    pub collection: Option<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, unhealthy
    pub status: String,
    /// Per-collection counts
    pub collections: Vec<CollectionStats>,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
