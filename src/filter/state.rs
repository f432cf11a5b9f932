use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::model::FilterState;
use crate::resolver::resolved_source_list;
use crate::storage::PreferenceStore;
use crate::sync::CollectionCache;
use crate::util::{strip_control_chars, MAX_SEARCH_TERM_LENGTH};

/// Storage key of a user's persisted filter.
pub fn filter_state_key(user_id: &str) -> String {
    format!("filter.state.{}", user_id)
}

/// Owner of the viewer's [`FilterState`].
///
/// All changes go through the operations below. Each one persists the
/// resulting state before returning; persistence failures are logged and
/// swallowed so filtering keeps working in memory. Changes are applied and
/// persisted one at a time, so the stored filter is always the latest one. Readers either call
/// [`current`](Self::current) or hold a [`watch::Receiver`] from
/// [`subscribe`](Self::subscribe) to recompute when the filter changes.
pub struct FilterStateManager<P> {
    state: watch::Sender<FilterState>,
    cache: Arc<CollectionCache>,
    store: Arc<P>,
    key: String,
    writer: Mutex<()>,
}

impl<P: PreferenceStore> FilterStateManager<P> {
    /// Restore the persisted filter for `user_id`, or start from the default.
    ///
    /// Unreadable storage and unparseable JSON both fall back to the default
    /// state; neither is an error for the caller.
    pub async fn restore(store: Arc<P>, cache: Arc<CollectionCache>, user_id: &str) -> Self {
        let key = filter_state_key(user_id);
        let initial = match store.get_preference(&key).await {
            Ok(Some(json)) => match serde_json::from_str::<FilterState>(&json) {
                Ok(state) => {
                    tracing::debug!(key = %key, "Restored filter state");
                    state
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding malformed persisted filter state");
                    FilterState::default()
                }
            },
            Ok(None) => FilterState::default(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read persisted filter state");
                FilterState::default()
            }
        };

        let (state, _) = watch::channel(initial);
        Self {
            state,
            cache,
            store,
            key,
            writer: Mutex::new(()),
        }
    }

    pub fn current(&self) -> FilterState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterState> {
        self.state.subscribe()
    }

    /// Scope the view to a collection.
    ///
    /// Returns `false` and leaves the state untouched if the collection is
    /// not among the currently known collections (for example because the
    /// caller raced ahead of a reload).
    pub async fn filter_by_collection(&self, collection_id: &str) -> bool {
        let Some(collection) = self.cache.get(collection_id) else {
            tracing::debug!(collection_id = %collection_id, "Filter by unknown collection ignored");
            return false;
        };
        let sources = resolved_source_list(&collection);
        self.apply(|state| {
            state.collection = Some(collection.id);
            state.sources = sources;
            state.drill_down = false;
        })
        .await;
        true
    }

    /// Scope the view to a single source, leaving any collection scope.
    pub async fn filter_by_source(&self, source_id: &str) {
        self.apply(|state| {
            state.sources = vec![source_id.to_owned()];
            state.collection = None;
            state.drill_down = false;
        })
        .await;
    }

    /// Narrow the active collection to one of its sources.
    ///
    /// Returns `false` and changes nothing when no collection is active.
    /// A source that is not a member selects no articles.
    pub async fn drill_into_source(&self, source_id: &str) -> bool {
        let _writer = self.writer.lock().await;
        if self.state.borrow().collection.is_none() {
            tracing::debug!(source_id = %source_id, "Drill-down without an active collection ignored");
            return false;
        }
        self.apply_locked(|state| {
            state.sources = vec![source_id.to_owned()];
            state.drill_down = true;
        })
        .await;
        true
    }

    /// Set the search term. The active scope is kept.
    pub async fn filter_by_search(&self, term: &str) {
        let term: String = strip_control_chars(term)
            .chars()
            .take(MAX_SEARCH_TERM_LENGTH)
            .collect();
        self.apply(|state| state.search_term = term).await;
    }

    /// Back to the empty default filter.
    pub async fn reset(&self) {
        self.apply(|state| *state = FilterState::default()).await;
    }

    async fn apply<F>(&self, edit: F)
    where
        F: FnOnce(&mut FilterState),
    {
        let _writer = self.writer.lock().await;
        self.apply_locked(edit).await;
    }

    async fn apply_locked<F>(&self, edit: F)
    where
        F: FnOnce(&mut FilterState),
    {
        self.state.send_if_modified(|state| {
            let before = state.clone();
            edit(state);
            *state != before
        });
        let snapshot = self.current();
        self.persist(&snapshot).await;
    }

    async fn persist(&self, state: &FilterState) {
        let json = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize filter state");
                return;
            }
        };
        if let Err(e) = self.store.set_preference(&self.key, &json).await {
            tracing::warn!(key = %self.key, error = %e, "Failed to persist filter state, continuing in memory");
        }
    }
}
