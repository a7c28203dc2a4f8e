//! Ingest Pipeline
//!
//! Validates incoming events against their collection's schema, records
//! rejects in the collection's rejection log and inserts the rest in order.
//!
//! ```text
//! body → [event, ...] → validate ─┬─ ok  → Engine::insert
//!                                 └─ err → rejected-<collection>.log
//! ```

use crate::schema::{ValidationIssue, Validator};
use crate::storage::{Engine, RejectionLog, StorageError, StorageResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One rejected event of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// Position of the event in the submitted batch
    pub index: usize,
    pub issues: Vec<ValidationIssue>,
}

/// Outcome of one ingest call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    /// Ids assigned to the accepted events, in submission order
    pub ids: Vec<String>,
    pub rejected: Vec<Rejection>,
}

/// Validate-then-insert front of the engine
pub struct Ingestor {
    engine: Arc<Engine>,
    validators: HashMap<String, Validator>,
}

impl Ingestor {
    /// Collections without a validator take any JSON object
    pub fn new(engine: Arc<Engine>, validators: HashMap<String, Validator>) -> Self {
        Self { engine, validators }
    }

    /// Ingest one event or an array of events
    ///
    /// Rejections do not fail the call; a storage failure does, and leaves
    /// the events before it inserted.
    pub async fn ingest(&self, collection: &str, body: Value) -> StorageResult<IngestReport> {
        if !self.engine.has_collection(collection) {
            return Err(StorageError::CollectionNotFound(collection.to_string()));
        }

        let events = match body {
            Value::Array(events) => events,
            event => vec![event],
        };

        let rejections = RejectionLog::new(self.engine.config().rejected_path(collection));
        let validator = self.validators.get(collection);
        let mut report = IngestReport::default();

        for (index, event) in events.into_iter().enumerate() {
            let event = match validator.map(|v| v.validate(&event)) {
                None => event,
                Some(Ok(normalized)) => normalized,
                Some(Err(err)) => {
                    tracing::debug!(collection, index, "Rejected event: {}", err);
                    rejections.record(&err.to_string(), &event)?;
                    report.rejected.push(Rejection {
                        index,
                        issues: err.issues,
                    });
                    continue;
                }
            };

            if !event.is_object() {
                let message = "\"value\" must be an object";
                rejections.record(message, &event)?;
                report.rejected.push(Rejection {
                    index,
                    issues: vec![ValidationIssue::new("", message)],
                });
                continue;
            }

            match self.engine.insert(collection, event.clone()).await {
                Ok(stored) => {
                    report.accepted += 1;
                    report.ids.push(stored.id);
                }
                Err(StorageError::InvalidEvent(message)) => {
                    tracing::debug!(collection, index, "Rejected event: {}", message);
                    rejections.record(&message, &event)?;
                    report.rejected.push(Rejection {
                        index,
                        issues: vec![ValidationIssue::new("", message)],
                    });
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            collection,
            accepted = report.accepted,
            rejected = report.rejected.len(),
            "Ingested events"
        );
        Ok(report)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}
