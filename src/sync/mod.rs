//! Keeping every surface's view of the viewer's collections consistent.
//!
//! - [`CollectionCache`]: the one shared copy, with change notifications and
//!   tombstones for locally deleted collections.
//! - [`LoadGuard`]: per-surface staleness check for responses that arrive
//!   after the surface moved on.
//! - [`CollectionSync`]: the mutation operations. Each applies its change to
//!   the cache first, then calls the Entity Store, then either keeps the
//!   change or rolls it back and returns the error.
//!
//! Two overlapping mutations of the same field resolve last-write-wins: a
//! rollback restores the field as it was when *that* mutation started, which
//! can discard a concurrent mutation that succeeded in between. The next
//! reload repairs it. There is no per-entity serialisation or version check.

mod cache;
mod guard;
mod synchronizer;

use thiserror::Error;

use crate::api::ApiError;

pub use cache::{CacheEvent, CollectionCache, ReloadTicket};
pub use guard::{LoadGuard, LoadTicket};
pub use synchronizer::CollectionSync;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The collection is not (or no longer) in the cache.
    #[error("Collection not found: {0}")]
    NotFound(String),

    /// The viewer may not perform this operation on the collection.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    #[error("Collection name cannot be empty")]
    InvalidName,

    /// The Entity Store call failed; any optimistic change was reverted.
    #[error(transparent)]
    Api(#[from] ApiError),
}
