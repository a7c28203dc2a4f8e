//! # Insightful
//!
//! Local event analytics: an append-only event store with an inverted field
//! index, answering raw listing and chart queries (bucketed X axis,
//! aggregated Y value, optional split series) without an external search
//! engine.
//!
//! ## Features
//!
//! - **Durable storage**: JSON-lines log per collection, replayed at startup
//! - **Inverted index**: path → value → positions, snapshotted to disk
//! - **Filtering**: time windows and `where` criteria resolved from the index
//! - **Charts**: histogram, terms, significant/threshold terms, date histogram
//! - **Validation**: schema-driven event and query validation
//!
//! ## Modules
//!
//! - [`storage`]: Event types, durable log and the engine
//! - [`index`]: Field index and its snapshot
//! - [`schema`]: Schema grammar and validator
//! - [`query`]: Query AST, request decoder, filter and executor
//! - [`aggregation`]: Bucketing, split series and Y metrics
//! - [`ingest`]: Validate-then-insert pipeline
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use insightful::query::{ChartSpec, TimeWindow, XSpec, YSpec, Bucketing, QueryExecutor};
//! use insightful::storage::{parse_timestamp, Engine, StorageConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(Engine::open(StorageConfig::new("./data")).await?);
//!
//!     let when = "2020-01-01T00:00:00.000Z";
//!     engine.insert("events", json!({"event": {"action": "a", "when": when}})).await?;
//!     engine.insert("events", json!({"event": {"action": "b", "when": when}})).await?;
//!
//!     let executor = QueryExecutor::new(Arc::clone(&engine));
//!     let window = TimeWindow::new(
//!         parse_timestamp("2020-01-01").ok_or("bad date")?,
//!         parse_timestamp("2020-01-02").ok_or("bad date")?,
//!     );
//!     let chart = ChartSpec {
//!         x: XSpec::new("event.action", Bucketing::terms()),
//!         y: YSpec::count(),
//!     };
//!     let result = executor.chart("events", &window, &[], &chart).await?;
//!     println!("{:?}", result.pairs());
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod api;
pub mod config;
pub mod index;
pub mod ingest;
pub mod query;
pub mod schema;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    Collection, Engine, StorageConfig, StorageError, StorageResult, StorageStats, StoredEvent,
};

pub use index::{FieldIndex, IndexStats};

pub use query::{decode, Query, QueryError, QueryExecutor, QueryOutput};

pub use aggregation::{ChartResult, Series};

pub use ingest::{IngestReport, Ingestor};

pub use schema::{Schema, ValidationError, Validator};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use config::{Config, ConfigError, LoggingConfig};
