use std::sync::Arc;

use super::{CollectionCache, LoadGuard, SyncError};
use crate::api::EntityStore;
use crate::model::{Collection, CollectionDetails, NewCollection, SourceRef};
use crate::util::clean_name;

/// Mutation and load operations on the viewer's collections.
///
/// Every mutation is two-phase: the change is applied to the shared
/// [`CollectionCache`] before the Entity Store is called, and reverted if the
/// call fails. `Ok` means the store acknowledged the change; `Err` means the
/// cache is back to its pre-mutation state for the mutated field.
pub struct CollectionSync<S> {
    store: Arc<S>,
    cache: Arc<CollectionCache>,
    user_id: String,
}

impl<S> Clone for CollectionSync<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            user_id: self.user_id.clone(),
        }
    }
}

impl<S: EntityStore> CollectionSync<S> {
    pub fn new(store: Arc<S>, cache: Arc<CollectionCache>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            cache,
            user_id: user_id.into(),
        }
    }

    pub fn cache(&self) -> &Arc<CollectionCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn visible(&self, id: &str) -> Result<Collection, SyncError> {
        self.cache
            .get(id)
            .ok_or_else(|| SyncError::NotFound(id.to_owned()))
    }

    fn owned(&self, id: &str) -> Result<Collection, SyncError> {
        let collection = self.visible(id)?;
        if !collection.is_owned_by(&self.user_id) {
            return Err(SyncError::NotPermitted(format!(
                "collection {} belongs to another user",
                id
            )));
        }
        Ok(collection)
    }

    // ========================================================================
    // Loads
    // ========================================================================

    /// Full reload from the Entity Store.
    ///
    /// Returns `Ok(false)` if a newer reload was issued while this one was in
    /// flight; its response was discarded.
    pub async fn reload(&self) -> Result<bool, SyncError> {
        let ticket = self.cache.begin_reload();
        let collections = self.store.list_collections().await?;
        let count = collections.len();
        let applied = self.cache.apply_reload(ticket, collections);
        if applied {
            tracing::debug!(count, "Collections reloaded");
        } else {
            tracing::debug!(count, "Discarded superseded collection reload");
        }
        Ok(applied)
    }

    /// Load one collection for the surface owning `guard`.
    ///
    /// Returns `Ok(None)` when the response is stale (the surface has moved
    /// to another target or issued a newer request) or names a collection
    /// that was deleted locally in the meantime.
    pub async fn open_detail(
        &self,
        guard: &LoadGuard,
        id: &str,
    ) -> Result<Option<Collection>, SyncError> {
        let ticket = guard.begin(id);
        let collection = match self.store.get_collection(id).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => return Err(SyncError::NotFound(id.to_owned())),
            Err(e) => return Err(e.into()),
        };

        if !guard.is_current(&ticket) || collection.id != ticket.target() {
            tracing::debug!(collection_id = %id, "Ignoring stale collection response");
            return Ok(None);
        }
        if !self.cache.upsert(collection.clone()) {
            tracing::debug!(collection_id = %id, "Ignoring fetch of deleted collection");
            return Ok(None);
        }
        Ok(Some(collection))
    }

    /// Ask the store whether the viewer follows `id` and record the answer.
    ///
    /// Returns `Ok(None)` when the answer arrived stale.
    pub async fn refresh_follow_status(
        &self,
        guard: &LoadGuard,
        id: &str,
    ) -> Result<Option<bool>, SyncError> {
        let ticket = guard.begin(id);
        let following = self.store.is_following(id).await?;
        if !guard.is_current(&ticket) {
            tracing::debug!(collection_id = %id, "Ignoring stale follow status");
            return Ok(None);
        }
        match self.cache.get(id) {
            Some(c) if !c.is_owned_by(&self.user_id) => {
                self.cache.set_followed(id, following);
                Ok(Some(following))
            }
            Some(_) => Ok(Some(false)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Source membership
    // ========================================================================

    /// Add `source_id` to a collection the viewer owns.
    ///
    /// Adding a source that is already a member is a no-op.
    pub async fn add_source(&self, collection_id: &str, source_id: &str) -> Result<(), SyncError> {
        let collection = self.owned(collection_id)?;
        if collection.contains_source(source_id) {
            return Ok(());
        }

        let previous = self
            .cache
            .update_sources(collection_id, |sources| {
                sources.push(SourceRef::from(source_id))
            })
            .ok_or_else(|| SyncError::NotFound(collection_id.to_owned()))?;

        match self.store.add_source(collection_id, source_id).await {
            Ok(()) => {
                tracing::info!(collection_id = %collection_id, source_id = %source_id, "Source added to collection");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(collection_id = %collection_id, source_id = %source_id, error = %e, "Add source failed, rolling back");
                self.cache.set_sources(collection_id, previous);
                Err(e.into())
            }
        }
    }

    /// Remove `source_id` from a collection the viewer owns.
    ///
    /// Removing a non-member is a no-op.
    pub async fn remove_source(
        &self,
        collection_id: &str,
        source_id: &str,
    ) -> Result<(), SyncError> {
        let collection = self.owned(collection_id)?;
        if !collection.contains_source(source_id) {
            return Ok(());
        }

        let previous = self
            .cache
            .update_sources(collection_id, |sources| {
                sources.retain(|s| s.id() != source_id)
            })
            .ok_or_else(|| SyncError::NotFound(collection_id.to_owned()))?;

        match self.store.remove_source(collection_id, source_id).await {
            Ok(()) => {
                tracing::info!(collection_id = %collection_id, source_id = %source_id, "Source removed from collection");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(collection_id = %collection_id, source_id = %source_id, error = %e, "Remove source failed, rolling back");
                self.cache.set_sources(collection_id, previous);
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Collection lifecycle
    // ========================================================================

    /// Create a collection owned by the viewer.
    ///
    /// Not optimistic: the identifier is assigned by the store, so the cache
    /// only changes once the created document comes back.
    pub async fn create_collection(
        &self,
        name: &str,
        description: &str,
        is_public: bool,
        sources: &[String],
    ) -> Result<Collection, SyncError> {
        let name = clean_name(name).ok_or(SyncError::InvalidName)?;
        let mut source_ids = sources.to_vec();
        source_ids.sort_unstable();
        source_ids.dedup();

        let new = NewCollection {
            name,
            description: description.trim().to_owned(),
            is_public,
            sources: source_ids,
        };
        let created = self.store.create_collection(&new).await?;
        tracing::info!(collection_id = %created.id, name = %created.name, "Collection created");
        self.cache.upsert(created.clone());
        Ok(created)
    }

    /// Edit name, description and visibility of a collection the viewer owns.
    pub async fn update_details(
        &self,
        collection_id: &str,
        details: CollectionDetails,
    ) -> Result<(), SyncError> {
        self.owned(collection_id)?;
        let details = CollectionDetails {
            name: clean_name(&details.name).ok_or(SyncError::InvalidName)?,
            description: details.description.trim().to_owned(),
            is_public: details.is_public,
        };

        let previous = self
            .cache
            .set_details(collection_id, &details)
            .ok_or_else(|| SyncError::NotFound(collection_id.to_owned()))?;

        match self.store.update_collection(collection_id, &details).await {
            Ok(_) => {
                tracing::info!(collection_id = %collection_id, "Collection details updated");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(collection_id = %collection_id, error = %e, "Update failed, rolling back");
                self.cache.set_details(collection_id, &previous);
                Err(e.into())
            }
        }
    }

    /// Delete a collection the viewer owns.
    ///
    /// The collection disappears from every surface immediately and stays
    /// hidden, even from stale fetches, until a reload issued after the
    /// store acknowledged the delete.
    pub async fn delete_collection(&self, collection_id: &str) -> Result<(), SyncError> {
        self.owned(collection_id)?;
        let (position, removed) = self
            .cache
            .tombstone(collection_id)
            .ok_or_else(|| SyncError::NotFound(collection_id.to_owned()))?;

        match self.store.delete_collection(collection_id).await {
            Ok(()) => {
                self.cache.confirm_tombstone(collection_id);
                tracing::info!(collection_id = %collection_id, "Collection deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                // Already gone server-side; the local delete stands.
                self.cache.confirm_tombstone(collection_id);
                tracing::info!(collection_id = %collection_id, "Collection already deleted on server");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(collection_id = %collection_id, error = %e, "Delete failed, restoring collection");
                self.cache.restore(position, removed);
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Follow relationship
    // ========================================================================

    /// Follow another user's public collection.
    pub async fn follow(&self, collection_id: &str) -> Result<(), SyncError> {
        let collection = self.visible(collection_id)?;
        if collection.is_owned_by(&self.user_id) {
            return Err(SyncError::NotPermitted(
                "cannot follow your own collection".to_string(),
            ));
        }
        if !collection.is_public {
            return Err(SyncError::NotPermitted(format!(
                "collection {} is private",
                collection_id
            )));
        }
        if collection.is_followed {
            return Ok(());
        }
        self.set_following(collection_id, true).await
    }

    /// Stop following a collection. Unfollowing one not followed is a no-op.
    pub async fn unfollow(&self, collection_id: &str) -> Result<(), SyncError> {
        let collection = self.visible(collection_id)?;
        if !collection.is_followed {
            return Ok(());
        }
        self.set_following(collection_id, false).await
    }

    async fn set_following(&self, collection_id: &str, following: bool) -> Result<(), SyncError> {
        let previous = self
            .cache
            .set_followed(collection_id, following)
            .ok_or_else(|| SyncError::NotFound(collection_id.to_owned()))?;

        let result = if following {
            self.store.follow(collection_id).await
        } else {
            self.store.unfollow(collection_id).await
        };

        match result {
            Ok(()) => {
                tracing::info!(collection_id = %collection_id, following, "Follow status changed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(collection_id = %collection_id, following, error = %e, "Follow change failed, rolling back");
                self.cache.set_followed(collection_id, previous);
                Err(e.into())
            }
        }
    }
}
