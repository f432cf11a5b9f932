//! Collection-scoped article filtering for a news aggregator.
//!
//! The viewer groups sources into collections and filters the loaded article
//! list by collection, source and search term. Collections live in an Entity
//! Store reached through [`api::EntityStore`]; every mutation is applied to
//! the shared [`sync::CollectionCache`] first and rolled back if the store
//! rejects it. The active filter and the default-collection mark persist
//! locally in SQLite between runs.

pub mod api;
pub mod config;
pub mod default_mark;
pub mod filter;
pub mod model;
pub mod resolver;
pub mod storage;
pub mod sync;
pub mod util;
