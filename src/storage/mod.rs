//! Local client-side persistence.
//!
//! A small SQLite key/value table holds the state that must survive a
//! restart without a round trip to the Entity Store: the active filter and
//! the user's default-collection mark.

mod preferences;
mod schema;
mod types;

pub use preferences::PreferenceStore;
pub use schema::Database;
pub use types::DatabaseError;
