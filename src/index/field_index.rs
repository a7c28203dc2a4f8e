//! Field Index - Inverted index over flattened event paths
//!
//! Maps `path → value key → positions` so criteria resolve without scanning
//! the store.
//!
//! # Example
//! ```ignore
//! // Query: events where event.action = "click"
//! let positions = index.positions("event.action", "click");
//! // positions = [0, 4, 7]
//! ```
//!
//! # Design Notes
//! - Value keys live in a `BTreeMap`, so every path is kept in key order.
//!   For canonical ISO-8601 date paths that is chronological order and a
//!   time window is a key-range walk.
//! - Positions per value are appended in insertion order and so stay
//!   ascending without re-sorting.
//! - Persisted as one JSON document, rewritten in full via temp file + rename.

use crate::storage::{Position, StorageError, StorageResult, StoredEvent};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};

/// Value key → ascending positions
pub type ValueIndex = BTreeMap<String, Vec<Position>>;

/// Inverted index for one collection
#[derive(Debug)]
pub struct FieldIndex {
    /// path → value key → positions
    fields: BTreeMap<String, ValueIndex>,
    /// Snapshot file
    path: PathBuf,
    /// Modified since last persist
    dirty: bool,
}

impl FieldIndex {
    /// Create an empty index persisting to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            fields: BTreeMap::new(),
            path: path.into(),
            dirty: false,
        }
    }

    /// Load the snapshot at `path`, or `None` if there is none yet
    pub fn load(path: impl Into<PathBuf>) -> StorageResult<Option<Self>> {
        let path = path.into();
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path)?;
        let fields: BTreeMap<String, ValueIndex> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| {
                StorageError::Corruption(format!("failed to load index snapshot: {}", e))
            })?;

        Ok(Some(Self {
            fields,
            path,
            dirty: false,
        }))
    }

    /// Ensure a bucket exists for a declared path
    pub fn declare(&mut self, path: &str) {
        if !self.fields.contains_key(path) {
            self.fields.insert(path.to_string(), ValueIndex::new());
            self.dirty = true;
        }
    }

    /// Record that `position` holds `key` at `path`
    pub fn add(&mut self, path: &str, key: &str, position: Position) {
        let positions = self
            .fields
            .entry(path.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default();

        match positions.last() {
            Some(&last) if last == position => {}
            Some(&last) if last > position => {
                // out-of-order add, only possible when indexing by hand
                if let Err(at) = positions.binary_search(&position) {
                    positions.insert(at, position);
                }
            }
            _ => positions.push(position),
        }
        self.dirty = true;
    }

    /// Index every flattened leaf of a stored event
    pub fn index_event(&mut self, event: &StoredEvent) {
        for (path, key) in event.index_entries() {
            self.add(&path, &key, event.position);
        }
    }

    /// Build a fresh index from a replayed store on top of a skeleton
    pub fn rebuild<'a>(
        path: impl Into<PathBuf>,
        skeleton: impl IntoIterator<Item = &'a str>,
        events: &[StoredEvent],
    ) -> Self {
        let mut index = Self::new(path);
        for declared in skeleton {
            index.declare(declared);
        }
        for event in events {
            index.index_event(event);
        }
        index.dirty = true;
        index
    }

    /// Value keys for a path
    pub fn values(&self, path: &str) -> Option<&ValueIndex> {
        self.fields.get(path)
    }

    /// Positions holding exactly `key` at `path`
    pub fn positions(&self, path: &str, key: &str) -> &[Position] {
        self.fields
            .get(path)
            .and_then(|values| values.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Positions whose value key at `path` lies in `[from, to]`
    pub fn range(&self, path: &str, from: &str, to: &str) -> BTreeSet<Position> {
        let Some(values) = self.fields.get(path) else {
            return BTreeSet::new();
        };
        if from > to {
            return BTreeSet::new();
        }

        values
            .range::<str, _>((Bound::Included(from), Bound::Included(to)))
            .flat_map(|(_, positions)| positions.iter().copied())
            .collect()
    }

    /// All positions that have any value at `path`
    pub fn all_positions(&self, path: &str) -> BTreeSet<Position> {
        self.fields
            .get(path)
            .map(|values| values.values().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Whether the path is indexed (declared or seen)
    pub fn has_path(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    /// Iterate paths with their value indexes
    pub fn fields(&self) -> impl Iterator<Item = (&String, &ValueIndex)> {
        self.fields.iter()
    }

    /// Number of indexed paths
    pub fn path_count(&self) -> usize {
        self.fields.len()
    }

    /// Number of distinct (path, value) pairs
    pub fn value_key_count(&self) -> usize {
        self.fields.values().map(BTreeMap::len).sum()
    }

    /// Highest position referenced anywhere in the index
    pub fn max_position(&self) -> Option<Position> {
        self.fields
            .values()
            .flat_map(|values| values.values())
            .filter_map(|positions| positions.last().copied())
            .max()
    }

    /// The raw path → value → positions mapping
    pub fn snapshot(&self) -> &BTreeMap<String, ValueIndex> {
        &self.fields
    }

    /// Persist the snapshot if anything changed
    pub fn persist(&mut self) -> StorageResult<()> {
        if !self.dirty {
            return Ok(());
        }

        self.write_snapshot().map_err(|e| {
            StorageError::Persistence(format!(
                "failed to rewrite index snapshot {}: {}",
                self.path.display(),
                e
            ))
        })?;

        self.dirty = false;
        Ok(())
    }

    fn write_snapshot(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &self.fields)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Check if there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FieldIndex {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.persist() {
                tracing::warn!("Index snapshot not saved on drop: {}", e);
            }
        }
    }
}
