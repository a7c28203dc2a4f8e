//! Handler State
//!
//! The engine and its two fronts: the ingestor behind `/add` and the query
//! executor behind `/query`.

use crate::ingest::Ingestor;
use crate::query::{QueryExecutor, DEFAULT_LIST_LIMIT};
use crate::storage::Engine;
use std::sync::Arc;
use std::time::Instant;

/// Collection `POST /add` writes to when none is named
pub const DEFAULT_COLLECTION: &str = "events";

/// State cloned into every handler through `Arc`
#[derive(Clone)]
pub struct AppState {
    /// Event store
    pub engine: Arc<Engine>,
    /// Query executor for list and chart queries
    pub executor: Arc<QueryExecutor>,
    /// Validate-then-insert pipeline
    pub ingestor: Arc<Ingestor>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Reported as uptime by `/health`
    pub start_time: Instant,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, ingestor: Arc<Ingestor>, config: ApiConfig) -> Self {
        Self {
            executor: Arc::new(QueryExecutor::new(Arc::clone(&engine))),
            engine,
            ingestor,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Page size of list queries that set no limit
    pub default_list_limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            max_body_size: 10 * 1024 * 1024, // 10MB
            default_list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
