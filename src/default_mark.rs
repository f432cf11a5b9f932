//! The viewer's "home" collection.
//!
//! At most one collection per user is marked default. The mark is persisted
//! through a [`PreferenceStore`] and only changes in memory once the write
//! succeeded, so a failed attempt leaves the previous mark in place.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;

use crate::storage::PreferenceStore;
use crate::sync::CollectionCache;

/// Storage key of a user's default-collection mark.
pub fn default_collection_key(user_id: &str) -> String {
    format!("collection.default.{}", user_id)
}

pub struct DefaultCollectionSelector<P> {
    store: Arc<P>,
    cache: Arc<CollectionCache>,
    user_id: String,
    key: String,
    mark: RwLock<Option<String>>,
    /// Serialises set/clear so the persisted and in-memory marks cannot
    /// interleave.
    writer: Mutex<()>,
}

impl<P: PreferenceStore> DefaultCollectionSelector<P> {
    /// Load the persisted mark for `user_id`. A read failure starts unmarked.
    pub async fn load(store: Arc<P>, cache: Arc<CollectionCache>, user_id: &str) -> Self {
        let key = default_collection_key(user_id);
        let mark = match store.get_preference(&key).await {
            Ok(mark) => mark,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read default collection");
                None
            }
        };
        Self {
            store,
            cache,
            user_id: user_id.to_owned(),
            key,
            mark: RwLock::new(mark),
            writer: Mutex::new(()),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.mark
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, mark: Option<String>) {
        *self.mark.write().unwrap_or_else(PoisonError::into_inner) = mark;
    }

    /// Mark `collection_id` as the default, replacing any previous mark.
    ///
    /// The viewer must own or follow the collection. Returns `false` if the
    /// precondition fails or the mark could not be persisted; the previous
    /// mark is then unchanged.
    pub async fn set_as_default(&self, collection_id: &str) -> bool {
        let _writer = self.writer.lock().await;

        let Some(collection) = self.cache.get(collection_id) else {
            tracing::warn!(collection_id = %collection_id, "Cannot mark unknown collection as default");
            return false;
        };
        if !collection.is_owned_by(&self.user_id) && !collection.is_followed {
            tracing::warn!(collection_id = %collection_id, "Default collection must be owned or followed");
            return false;
        }
        if self.current().as_deref() == Some(collection_id) {
            return true;
        }

        match self.store.set_preference(&self.key, collection_id).await {
            Ok(()) => {
                self.replace(Some(collection_id.to_owned()));
                tracing::info!(collection_id = %collection_id, "Default collection set");
                true
            }
            Err(e) => {
                tracing::warn!(collection_id = %collection_id, error = %e, "Failed to persist default collection");
                false
            }
        }
    }

    /// Remove the mark. Returns `false` if the removal could not be persisted.
    pub async fn clear_default(&self) -> bool {
        let _writer = self.writer.lock().await;
        self.clear_locked().await
    }

    /// Clear the mark if it points at `collection_id`, e.g. after the
    /// collection was deleted. Returns whether a mark was cleared.
    pub async fn clear_if_default(&self, collection_id: &str) -> bool {
        let _writer = self.writer.lock().await;
        if self.current().as_deref() != Some(collection_id) {
            return false;
        }
        self.clear_locked().await
    }

    /// Drop the mark if its collection is no longer owned or followed by the
    /// viewer, e.g. after an unfollow. Returns whether a mark was cleared.
    ///
    /// A collection missing from the cache is left alone; deletions go
    /// through [`clear_if_default`](Self::clear_if_default).
    pub async fn revalidate(&self) -> bool {
        let _writer = self.writer.lock().await;
        let Some(mark) = self.current() else {
            return false;
        };
        let Some(collection) = self.cache.get(&mark) else {
            return false;
        };
        if collection.is_owned_by(&self.user_id) || collection.is_followed {
            return false;
        }
        tracing::debug!(collection_id = %mark, "Default collection no longer eligible");
        self.clear_locked().await
    }

    async fn clear_locked(&self) -> bool {
        if self.current().is_none() {
            return true;
        }
        match self.store.delete_preference(&self.key).await {
            Ok(()) => {
                self.replace(None);
                tracing::info!("Default collection cleared");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to clear default collection");
                false
            }
        }
    }
}
