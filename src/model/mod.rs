//! Domain records exchanged with the Entity Store and the filter state
//! owned by this crate.
//!
//! Sources, collections and articles are read from the store as JSON using
//! its field names (`_id`, `sourceId`, `isFollowed`, ...). `FilterState` is
//! local to the client and persisted by the filter manager.

mod types;

pub use types::{
    Article, Collection, CollectionDetails, FilterState, NewCollection, Source, SourceMetadata,
    SourceRef,
};
