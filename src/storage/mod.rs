//! Event Storage Engine
//!
//! This module provides the append-only event store:
//!
//! - **types**: Stored events, path flattening, index key stringification
//! - **log**: JSON-lines durable log and the rejection log
//! - **engine**: Collections, inserts, replay and snapshot management
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Event → Log append → Store append → FieldIndex update → Snapshot rewrite
//!
//! Startup:
//!   Log replay → Snapshot load (or rebuild from replayed events + skeleton)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use insightful::storage::{Engine, StorageConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::open(StorageConfig::new("./data")).await?;
//!
//!     let event = json!({"event": {"action": "signup", "when": "2020-01-01T00:00:00.000Z"}});
//!     let stored = engine.insert("events", event).await?;
//!     println!("stored {} at position {}", stored.id, stored.position);
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod log;
pub mod types;

// Re-export commonly used types
pub use engine::{
    Collection, CollectionSpec, CollectionStats, Engine, StorageConfig, StorageStats,
    DEFAULT_TIMESTAMP_FIELD,
};
pub use error::{StorageError, StorageResult};
pub use log::{EventLog, LogSyncMode, RejectionLog};
pub use types::{
    as_number, canonical_timestamp, flatten, format_number, format_timestamp, index_key,
    parse_timestamp, resolve_path, resolve_path_mut, Position, StoredEvent,
};
