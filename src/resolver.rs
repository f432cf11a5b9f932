//! Collection → source-identifier resolution.
//!
//! Collections arrive with `sources` as bare ids, embedded source documents,
//! or a mix of both. Everything downstream compares identifiers, so this is
//! the single place where the two shapes are normalised.

use std::collections::HashSet;

use crate::model::Collection;

/// Resolve a collection to the deduplicated set of its member source ids.
///
/// Runs on every filter recomputation: one pass over `sources`, no I/O.
/// An empty member list yields an empty set.
pub fn resolve_source_ids(collection: &Collection) -> HashSet<&str> {
    collection.sources.iter().map(|s| s.id()).collect()
}

/// Owned, sorted form of [`resolve_source_ids`], used when the member set is
/// captured into a `FilterState`.
pub fn resolved_source_list(collection: &Collection) -> Vec<String> {
    let mut ids: Vec<String> = resolve_source_ids(collection)
        .into_iter()
        .map(str::to_owned)
        .collect();
    ids.sort_unstable();
    ids
}
