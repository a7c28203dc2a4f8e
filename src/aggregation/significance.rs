//! Significant terms scoring
//!
//! A term is significant when it is more frequent in the foreground (the
//! windowed result) than in the background (the same criteria over the
//! whole collection).

use super::{OrderedBuckets, Row};
use crate::storage::index_key;
use std::collections::HashMap;

/// Score one term
///
/// Zero when either set is empty or the term is not over-represented in the
/// foreground; otherwise the absolute probability change weighted by the
/// relative change.
pub fn score(freq_fg: usize, size_fg: usize, freq_bg: usize, size_bg: usize) -> f64 {
    if size_fg == 0 || size_bg == 0 {
        return 0.0;
    }
    let freq_bg = freq_bg.max(1);

    let subset = freq_fg as f64 / size_fg as f64;
    let superset = freq_bg as f64 / size_bg as f64;
    let absolute = subset - superset;
    if absolute <= 0.0 {
        return 0.0;
    }

    let relative = subset / superset;
    absolute * relative
}

/// Score every terms bucket against the background rows
pub(crate) fn score_terms(
    buckets: &OrderedBuckets<Row<'_>>,
    size_fg: usize,
    background: &[Row<'_>],
) -> HashMap<String, f64> {
    let mut background_freq: HashMap<String, usize> = HashMap::new();
    for row in background {
        if let Some(key) = index_key(row.x) {
            *background_freq.entry(key).or_default() += 1;
        }
    }

    buckets
        .iter()
        .map(|(key, members)| {
            let freq_bg = background_freq.get(key).copied().unwrap_or(0);
            (
                key.to_string(),
                score(members.len(), size_fg, freq_bg, background.len()),
            )
        })
        .collect()
}
