//! Index Structures
//!
//! - **FieldIndex**: inverted index from flattened path and value key to the
//!   ascending positions of the events holding that value
//!
//! # Architecture
//!
//! ```text
//! Query: "click events last week where pet.type is one of [cat, dog]"
//!        ↓
//! event.when  : key-range walk [from, to]        → {0, 1, 2, 5, 8}
//! event.action: exact key "click"                → {1, 2, 8, 9}
//! pet.type    : union of keys "cat", "dog"       → {2, 3, 8}
//!        ↓
//! intersect → {2, 8} → materialize records in position order
//! ```

mod field_index;

pub use field_index::{FieldIndex, ValueIndex};

use serde::Serialize;

/// Statistics about an index
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    /// Number of indexed paths (declared or seen)
    pub indexed_paths: usize,
    /// Number of distinct (path, value) pairs
    pub value_keys: usize,
    /// Unsaved changes pending a snapshot rewrite
    pub dirty: bool,
}

impl From<&FieldIndex> for IndexStats {
    fn from(index: &FieldIndex) -> Self {
        Self {
            indexed_paths: index.path_count(),
            value_keys: index.value_key_count(),
            dirty: index.is_dirty(),
        }
    }
}
