//! Event Storage Engine
//!
//! The engine owns every collection's store, field index and durable log:
//! - Write path: event → log append → store append → index update → snapshot
//! - Read path: shared lock → index lookups → records by position
//!
//! Each collection sits behind its own Tokio `RwLock`. Inserts hold the write
//! lock until every effect is in place, so a reader never observes the index
//! without the record or the record without the index.

use crate::index::{FieldIndex, IndexStats};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::log::{EventLog, LogSyncMode};
use crate::storage::types::{canonical_timestamp, resolve_path_mut, Position, StoredEvent};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Default path holding an event's timestamp
pub const DEFAULT_TIMESTAMP_FIELD: &str = "event.when";

/// Configuration for the storage engine
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all data
    pub data_dir: PathBuf,
    /// Log sync strategy
    pub log_sync: LogSyncMode,
    /// Rewrite the index snapshot inside every insert (otherwise on flush)
    pub sync_snapshot: bool,
    /// Collections to open
    pub collections: Vec<CollectionSpec>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("insightful_data"),
            log_sync: LogSyncMode::Batched,
            sync_snapshot: true,
            collections: vec![CollectionSpec::new("events")],
        }
    }
}

impl StorageConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Replace the configured collections
    pub fn with_collections(mut self, collections: Vec<CollectionSpec>) -> Self {
        self.collections = collections;
        self
    }

    /// Get path to a collection's event log
    pub fn log_path(&self, collection: &str) -> PathBuf {
        self.data_dir.join(format!("{}.log", collection))
    }

    /// Get path to a collection's index snapshot
    pub fn snapshot_path(&self, collection: &str) -> PathBuf {
        self.data_dir.join(format!("{}.index.json", collection))
    }

    /// Get path to a collection's rejection log
    pub fn rejected_path(&self, collection: &str) -> PathBuf {
        self.data_dir.join(format!("rejected-{}.log", collection))
    }
}

/// Declaration of one collection
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    /// Path whose values define the time window
    pub timestamp_field: String,
    /// Paths that get an index bucket even before any event has them
    pub skeleton: Vec<String>,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
            skeleton: Vec::new(),
        }
    }

    pub fn timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    pub fn skeleton(mut self, paths: Vec<String>) -> Self {
        self.skeleton = paths;
        self
    }
}

/// One collection's store, index and log
pub struct Collection {
    name: String,
    timestamp_field: String,
    events: Vec<StoredEvent>,
    index: FieldIndex,
    log: EventLog,
    sync_snapshot: bool,
}

impl Collection {
    /// Rehydrate a collection from its log and snapshot
    fn open(config: &StorageConfig, spec: &CollectionSpec) -> StorageResult<Self> {
        let log = EventLog::open(config.log_path(&spec.name), config.log_sync)?;
        let events = log.replay()?;
        let snapshot_path = config.snapshot_path(&spec.name);
        let skeleton = spec.skeleton.iter().map(String::as_str);

        let mut index = match FieldIndex::load(&snapshot_path) {
            Ok(Some(mut index)) if Self::snapshot_matches(&index, events.len()) => {
                for path in skeleton {
                    index.declare(path);
                }
                index
            }
            Ok(Some(_)) => {
                tracing::warn!(
                    "Index snapshot for '{}' does not match the log, rebuilding",
                    spec.name
                );
                FieldIndex::rebuild(&snapshot_path, skeleton, &events)
            }
            Ok(None) => FieldIndex::rebuild(&snapshot_path, skeleton, &events),
            Err(e) => {
                tracing::warn!("Failed to load index for '{}': {}, rebuilding", spec.name, e);
                FieldIndex::rebuild(&snapshot_path, skeleton, &events)
            }
        };
        index.persist()?;

        tracing::info!(
            "Loaded collection '{}': {} events, {} indexed paths",
            spec.name,
            events.len(),
            index.path_count()
        );

        Ok(Self {
            name: spec.name.clone(),
            timestamp_field: spec.timestamp_field.clone(),
            events,
            index,
            log,
            sync_snapshot: config.sync_snapshot,
        })
    }

    fn snapshot_matches(index: &FieldIndex, event_count: usize) -> bool {
        index.max_position().map_or(0, |max| max + 1) == event_count
    }

    /// Append an event
    ///
    /// The timestamp field, when present, is stored in canonical form so the
    /// window range walk compares like with like; a value that does not parse
    /// as a date rejects the event.
    ///
    /// The log append comes first: if it fails nothing has changed. A failed
    /// snapshot rewrite is reported, but the event is already durable in the
    /// log and visible to queries; the index stays dirty for the next write.
    pub fn insert(&mut self, event: Value) -> StorageResult<StoredEvent> {
        let mut event = event;
        self.canonicalize_timestamp(&mut event)?;

        let body = match event {
            Value::Object(map) => map,
            other => {
                return Err(StorageError::InvalidEvent(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let position = self.events.len();
        let stored = StoredEvent::new(uuid::Uuid::new_v4().to_string(), position, body);

        self.log.append(&stored)?;
        self.index.index_event(&stored);
        self.events.push(stored.clone());

        tracing::debug!(collection = %self.name, id = %stored.id, position, "Inserted event");

        if self.sync_snapshot {
            self.index.persist()?;
        }

        Ok(stored)
    }

    fn canonicalize_timestamp(&self, event: &mut Value) -> StorageResult<()> {
        let Some(raw) = resolve_path_mut(event, &self.timestamp_field) else {
            return Ok(());
        };
        let canonical = raw.as_str().and_then(canonical_timestamp).ok_or_else(|| {
            StorageError::InvalidEvent(format!(
                "\"{}\" must be an ISO-8601 date, got {}",
                self.timestamp_field, raw
            ))
        })?;
        *raw = Value::String(canonical);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }

    /// All events in position order
    pub fn events(&self) -> &[StoredEvent] {
        &self.events
    }

    pub fn get(&self, position: Position) -> Option<&StoredEvent> {
        self.events.get(position)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn index(&self) -> &FieldIndex {
        &self.index
    }

    /// Write the snapshot and sync the log
    pub fn flush(&mut self) -> StorageResult<()> {
        self.log.sync()?;
        self.index.persist()
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            name: self.name.clone(),
            events: self.events.len(),
            log_entries: self.log.entry_count(),
            index: IndexStats::from(&self.index),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The event store: every configured collection, opened once at startup
pub struct Engine {
    config: StorageConfig,
    collections: HashMap<String, Arc<RwLock<Collection>>>,
}

impl Engine {
    /// Open every configured collection, replaying logs and loading snapshots
    pub async fn open(config: StorageConfig) -> StorageResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        if config.collections.is_empty() {
            return Err(StorageError::Config(
                "at least one collection must be configured".to_string(),
            ));
        }

        let mut collections = HashMap::new();
        for spec in &config.collections {
            if collections.contains_key(&spec.name) {
                return Err(StorageError::Config(format!(
                    "collection '{}' declared twice",
                    spec.name
                )));
            }
            let collection = Collection::open(&config, spec)?;
            collections.insert(spec.name.clone(), Arc::new(RwLock::new(collection)));
        }

        Ok(Self {
            config,
            collections,
        })
    }

    fn collection(&self, name: &str) -> StorageResult<&Arc<RwLock<Collection>>> {
        self.collections
            .get(name)
            .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))
    }

    /// Insert one event into a collection
    pub async fn insert(&self, collection: &str, event: Value) -> StorageResult<StoredEvent> {
        let mut guard = self.collection(collection)?.write().await;
        guard.insert(event)
    }

    /// Take a consistent read view of a collection
    ///
    /// Hold the guard for the whole of a query so nested lookups see the
    /// same state.
    pub async fn read(&self, collection: &str) -> StorageResult<RwLockReadGuard<'_, Collection>> {
        Ok(self.collection(collection)?.read().await)
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Configured collection names, sorted
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Persist dirty snapshots and sync logs
    pub async fn flush(&self) -> StorageResult<()> {
        for name in self.collection_names() {
            self.collection(&name)?.write().await.flush()?;
        }
        Ok(())
    }

    /// Shutdown the engine gracefully
    pub async fn shutdown(&self) -> StorageResult<()> {
        self.flush().await?;
        tracing::info!("Storage engine shut down");
        Ok(())
    }

    pub async fn stats(&self) -> StorageStats {
        let mut collections = Vec::with_capacity(self.collections.len());
        for name in self.collection_names() {
            if let Some(collection) = self.collections.get(&name) {
                collections.push(collection.read().await.stats());
            }
        }
        StorageStats { collections }
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

/// Per-collection statistics
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub events: usize,
    pub log_entries: u64,
    pub index: IndexStats,
}

/// Storage statistics
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub collections: Vec<CollectionStats>,
}

impl StorageStats {
    pub fn total_events(&self) -> usize {
        self.collections.iter().map(|c| c.events).sum()
    }
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .collections
            .iter()
            .map(|c| {
                format!(
                    "{}: {} events, {} paths, {} value keys",
                    c.name, c.events, c.index.indexed_paths, c.index.value_keys
                )
            })
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}
