use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;

use crate::model::{Collection, CollectionDetails, SourceRef};

/// Capacity of the change-notification channel. Slow subscribers that fall
/// further behind see `RecvError::Lagged` and should re-read the snapshot.
const EVENT_CAPACITY: usize = 64;

/// Change notifications published to every surface holding a view of the
/// cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A full reload replaced the collection list.
    Reloaded { count: usize },
    /// A collection was inserted or replaced by a fetched document.
    Upserted { collection_id: String },
    SourcesChanged { collection_id: String },
    DetailsChanged { collection_id: String },
    FollowChanged { collection_id: String, following: bool },
    /// Tombstoned by a local delete.
    Removed { collection_id: String },
    /// A failed delete put the collection back.
    Restored { collection_id: String },
}

/// Proof that a full reload was issued; see [`CollectionCache::begin_reload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadTicket {
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Tombstone {
    /// Reload generation at which the server acknowledged the delete.
    /// `None` while the delete request is still in flight.
    confirmed_at: Option<u64>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: Vec<Collection>,
    tombstones: HashMap<String, Tombstone>,
    reload_generation: u64,
    revision: u64,
}

impl Inner {
    fn position(&self, id: &str) -> Option<usize> {
        self.collections.iter().position(|c| c.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Collection> {
        self.collections.iter_mut().find(|c| c.id == id)
    }
}

/// The single authoritative in-memory copy of the viewer's collections.
///
/// Every surface reads through this cache and is told about changes over a
/// broadcast channel instead of keeping its own copy. Only the synchronizer
/// mutates it (crate-private methods); readers get clones.
///
/// `revision` increases on every mutation, so derived views can memoise on
/// it. Tombstoned ids are hidden from every read and from every stale fetch
/// until a reload issued after the delete was acknowledged.
#[derive(Debug)]
pub struct CollectionCache {
    inner: RwLock<Inner>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for CollectionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    /// All visible collections, in list order.
    pub fn snapshot(&self) -> Vec<Collection> {
        self.read().collections.clone()
    }

    /// Visible collections together with the revision they were read at.
    pub fn snapshot_with_revision(&self) -> (u64, Vec<Collection>) {
        let inner = self.read();
        (inner.revision, inner.collections.clone())
    }

    pub fn get(&self, id: &str) -> Option<Collection> {
        self.read().collections.iter().find(|c| c.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().position(id).is_some()
    }

    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.read().tombstones.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Loads
    // ========================================================================

    /// Record that a full reload is being issued. Only the response for the
    /// most recent ticket is applied.
    pub(crate) fn begin_reload(&self) -> ReloadTicket {
        let mut inner = self.write();
        inner.reload_generation += 1;
        ReloadTicket {
            generation: inner.reload_generation,
        }
    }

    /// Apply a full reload response.
    ///
    /// Returns `false` (and changes nothing) if a newer reload was issued in
    /// the meantime. Tombstones acknowledged before this reload was issued
    /// are cleared; the rest keep filtering the response.
    pub(crate) fn apply_reload(&self, ticket: ReloadTicket, fetched: Vec<Collection>) -> bool {
        let count = {
            let mut inner = self.write();
            if ticket.generation != inner.reload_generation {
                return false;
            }

            inner.tombstones.retain(|_, t| match t.confirmed_at {
                Some(at) => at >= ticket.generation,
                None => true,
            });

            let tombstones = &inner.tombstones;
            let mut visible: Vec<Collection> = Vec::with_capacity(fetched.len());
            for collection in fetched {
                if tombstones.contains_key(&collection.id) {
                    tracing::debug!(collection_id = %collection.id, "Reload skipped tombstoned collection");
                    continue;
                }
                if visible.iter().any(|c| c.id == collection.id) {
                    continue;
                }
                visible.push(collection);
            }

            inner.collections = visible;
            inner.revision += 1;
            inner.collections.len()
        };
        self.publish(CacheEvent::Reloaded { count });
        true
    }

    /// Insert or replace a single fetched collection.
    ///
    /// Returns `false` for tombstoned ids: a late fetch must not resurrect a
    /// deleted collection.
    pub(crate) fn upsert(&self, collection: Collection) -> bool {
        let id = collection.id.clone();
        {
            let mut inner = self.write();
            if inner.tombstones.contains_key(&id) {
                return false;
            }
            match inner.position(&id) {
                Some(pos) => inner.collections[pos] = collection,
                None => inner.collections.push(collection),
            }
            inner.revision += 1;
        }
        self.publish(CacheEvent::Upserted { collection_id: id });
        true
    }

    // ========================================================================
    // Optimistic mutations
    // ========================================================================

    /// Edit a collection's member list in place, returning the list as it was
    /// before the edit, or `None` if the collection is not visible.
    pub(crate) fn update_sources<F>(&self, id: &str, edit: F) -> Option<Vec<SourceRef>>
    where
        F: FnOnce(&mut Vec<SourceRef>),
    {
        let previous = {
            let mut inner = self.write();
            let collection = inner.find_mut(id)?;
            let previous = collection.sources.clone();
            edit(&mut collection.sources);
            inner.revision += 1;
            previous
        };
        self.publish(CacheEvent::SourcesChanged {
            collection_id: id.to_owned(),
        });
        Some(previous)
    }

    /// Overwrite a collection's member list (rollback path).
    pub(crate) fn set_sources(&self, id: &str, sources: Vec<SourceRef>) -> bool {
        self.update_sources(id, move |current| *current = sources)
            .is_some()
    }

    /// Set the viewer's follow flag, returning the previous value.
    pub(crate) fn set_followed(&self, id: &str, following: bool) -> Option<bool> {
        let previous = {
            let mut inner = self.write();
            let collection = inner.find_mut(id)?;
            let previous = collection.is_followed;
            collection.is_followed = following;
            inner.revision += 1;
            previous
        };
        self.publish(CacheEvent::FollowChanged {
            collection_id: id.to_owned(),
            following,
        });
        Some(previous)
    }

    /// Replace the owner-editable fields, returning the previous ones.
    pub(crate) fn set_details(
        &self,
        id: &str,
        details: &CollectionDetails,
    ) -> Option<CollectionDetails> {
        let previous = {
            let mut inner = self.write();
            let collection = inner.find_mut(id)?;
            let previous = CollectionDetails::of(collection);
            details.apply_to(collection);
            inner.revision += 1;
            previous
        };
        self.publish(CacheEvent::DetailsChanged {
            collection_id: id.to_owned(),
        });
        Some(previous)
    }

    /// Hide a collection behind a pending tombstone. Returns its list
    /// position and document so a failed delete can put it back.
    pub(crate) fn tombstone(&self, id: &str) -> Option<(usize, Collection)> {
        let removed = {
            let mut inner = self.write();
            let pos = inner.position(id)?;
            let collection = inner.collections.remove(pos);
            inner
                .tombstones
                .insert(id.to_owned(), Tombstone { confirmed_at: None });
            inner.revision += 1;
            (pos, collection)
        };
        self.publish(CacheEvent::Removed {
            collection_id: id.to_owned(),
        });
        Some(removed)
    }

    /// The server acknowledged the delete; the next reload may clear it.
    pub(crate) fn confirm_tombstone(&self, id: &str) {
        let mut inner = self.write();
        let generation = inner.reload_generation;
        if let Some(tombstone) = inner.tombstones.get_mut(id) {
            tombstone.confirmed_at = Some(generation);
        }
    }

    /// Undo [`tombstone`](Self::tombstone) after a failed delete.
    pub(crate) fn restore(&self, position: usize, collection: Collection) {
        let id = collection.id.clone();
        {
            let mut inner = self.write();
            inner.tombstones.remove(&id);
            if inner.position(&id).is_none() {
                let pos = position.min(inner.collections.len());
                inner.collections.insert(pos, collection);
            }
            inner.revision += 1;
        }
        self.publish(CacheEvent::Restored { collection_id: id });
    }
}
