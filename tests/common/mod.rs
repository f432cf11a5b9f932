//! Shared fixtures for the integration tests: a scripted in-memory Entity
//! Store and a preference store that always fails.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use newsdeck::api::{ApiError, EntityStore};
use newsdeck::model::{Article, Collection, CollectionDetails, NewCollection, SourceRef};
use newsdeck::storage::PreferenceStore;

pub fn collection(id: &str, owner: &str, sources: &[&str]) -> Collection {
    let mut c = Collection::new(id, owner, id.to_uppercase()).with_sources(sources.iter().copied());
    c.is_public = true;
    c
}

pub fn article(id: &str, source: &str, title: &str) -> Article {
    let mut a = Article::new(id, source);
    a.title = title.to_string();
    a
}

pub fn ids(articles: &[Article]) -> Vec<&str> {
    articles.iter().map(|a| a.id.as_str()).collect()
}

pub fn source_ids(collection: &Collection) -> Vec<&str> {
    collection.sources.iter().map(SourceRef::id).collect()
}

// ============================================================================
// Gates
// ============================================================================

/// Holds one response of the fake store in flight until released.
///
/// The store computes the response (including any server-side effect) when
/// the call arrives, signals `arrived`, then waits for `release` before
/// returning it.
#[derive(Default)]
pub struct Gate {
    arrived: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until the gated call has reached the store.
    pub async fn arrived(&self) {
        self.arrived.notified().await;
    }

    /// Let the gated response through.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

// ============================================================================
// Fake Entity Store
// ============================================================================

#[derive(Default)]
struct ServerState {
    collections: Vec<Collection>,
    articles: Vec<Article>,
    following: HashSet<String>,
    failures: HashMap<String, u16>,
    calls: Vec<String>,
    next_id: u32,
}

/// In-memory Entity Store with failure injection and gated responses.
///
/// Calls are keyed like `add_source:c1:s2`, `delete_collection:c1` or
/// `list_collections`; [`fail_once`](Self::fail_once) and
/// [`hold`](Self::hold) take the same keys.
pub struct FakeStore {
    viewer: String,
    state: Mutex<ServerState>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
}

impl FakeStore {
    pub fn new(viewer: &str) -> Self {
        Self {
            viewer: viewer.to_string(),
            state: Mutex::new(ServerState::default()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_collections(self, collections: Vec<Collection>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for c in &collections {
                if c.is_followed {
                    state.following.insert(c.id.clone());
                }
            }
            state.collections = collections;
        }
        self
    }

    pub fn with_articles(self, articles: Vec<Article>) -> Self {
        self.state.lock().unwrap().articles = articles;
        self
    }

    /// The next call with `key` answers with HTTP `status`.
    pub fn fail_once(&self, key: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(key.to_string(), status);
    }

    /// Hold the next response for `key` until the returned gate is released.
    pub fn hold(&self, key: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates
            .lock()
            .unwrap()
            .insert(key.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn server_collection(&self, id: &str) -> Option<Collection> {
        self.state
            .lock()
            .unwrap()
            .collections
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Change the viewer's follow relationship behind the client's back.
    pub fn set_following(&self, id: &str, following: bool) {
        let mut state = self.state.lock().unwrap();
        if following {
            state.following.insert(id.to_string());
        } else {
            state.following.remove(id);
        }
    }

    /// Change a collection behind the client's back.
    pub fn server_edit<F: FnOnce(&mut Collection)>(&self, id: &str, edit: F) {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.collections.iter_mut().find(|c| c.id == id) {
            edit(c);
        }
    }

    /// Record the call, then run `respond` against the server state unless a
    /// failure was injected for `key`. The result is returned after the gate
    /// for `key`, if any, is released.
    async fn call<T, F>(&self, key: String, respond: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut ServerState, &str) -> Result<T, ApiError>,
    {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(key.clone());
            match state.failures.remove(&key) {
                Some(status) => Err(ApiError::HttpStatus(status)),
                None => respond(&mut *state, &self.viewer),
            }
        };

        let gate = self.gates.lock().unwrap().remove(&key);
        if let Some(gate) = gate {
            gate.arrived.notify_one();
            gate.release.notified().await;
        }
        result
    }
}

fn view(state: &ServerState, c: &Collection) -> Collection {
    let mut c = c.clone();
    c.is_followed = state.following.contains(&c.id);
    c
}

fn find_mut<'a>(state: &'a mut ServerState, id: &str) -> Result<&'a mut Collection, ApiError> {
    state
        .collections
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or(ApiError::HttpStatus(404))
}

impl EntityStore for FakeStore {
    async fn list_collections(&self) -> Result<Vec<Collection>, ApiError> {
        self.call("list_collections".to_string(), |state, _| {
            let state: &ServerState = state;
            Ok(state.collections.iter().map(|c| view(state, c)).collect())
        })
        .await
    }

    async fn get_collection(&self, id: &str) -> Result<Collection, ApiError> {
        self.call(format!("get_collection:{}", id), |state, _| {
            let state: &ServerState = state;
            state
                .collections
                .iter()
                .find(|c| c.id == id)
                .map(|c| view(state, c))
                .ok_or(ApiError::HttpStatus(404))
        })
        .await
    }

    async fn create_collection(&self, new: &NewCollection) -> Result<Collection, ApiError> {
        self.call("create_collection".to_string(), |state, viewer| {
            state.next_id += 1;
            let mut c = Collection::new(format!("new-{}", state.next_id), viewer, new.name.clone())
                .with_sources(new.sources.iter().cloned());
            c.description = new.description.clone();
            c.is_public = new.is_public;
            state.collections.push(c.clone());
            Ok(c)
        })
        .await
    }

    async fn update_collection(
        &self,
        id: &str,
        details: &CollectionDetails,
    ) -> Result<Collection, ApiError> {
        self.call(format!("update_collection:{}", id), |state, _| {
            let c = find_mut(state, id)?;
            c.name = details.name.clone();
            c.description = details.description.clone();
            c.is_public = details.is_public;
            Ok(c.clone())
        })
        .await
    }

    async fn delete_collection(&self, id: &str) -> Result<(), ApiError> {
        self.call(format!("delete_collection:{}", id), |state, _| {
            let before = state.collections.len();
            state.collections.retain(|c| c.id != id);
            if state.collections.len() == before {
                return Err(ApiError::HttpStatus(404));
            }
            Ok(())
        })
        .await
    }

    async fn add_source(&self, collection_id: &str, source_id: &str) -> Result<(), ApiError> {
        self.call(
            format!("add_source:{}:{}", collection_id, source_id),
            |state, _| {
                let c = find_mut(state, collection_id)?;
                if !c.contains_source(source_id) {
                    c.sources.push(SourceRef::from(source_id));
                }
                Ok(())
            },
        )
        .await
    }

    async fn remove_source(&self, collection_id: &str, source_id: &str) -> Result<(), ApiError> {
        self.call(
            format!("remove_source:{}:{}", collection_id, source_id),
            |state, _| {
                let c = find_mut(state, collection_id)?;
                c.sources.retain(|s| s.id() != source_id);
                Ok(())
            },
        )
        .await
    }

    async fn follow(&self, collection_id: &str) -> Result<(), ApiError> {
        self.call(format!("follow:{}", collection_id), |state, _| {
            find_mut(state, collection_id)?;
            state.following.insert(collection_id.to_string());
            Ok(())
        })
        .await
    }

    async fn unfollow(&self, collection_id: &str) -> Result<(), ApiError> {
        self.call(format!("unfollow:{}", collection_id), |state, _| {
            state.following.remove(collection_id);
            Ok(())
        })
        .await
    }

    async fn is_following(&self, collection_id: &str) -> Result<bool, ApiError> {
        self.call(format!("is_following:{}", collection_id), |state, _| {
            Ok(state.following.contains(collection_id))
        })
        .await
    }

    async fn list_articles(&self) -> Result<Vec<Article>, ApiError> {
        self.call("list_articles".to_string(), |state, _| Ok(state.articles.clone()))
            .await
    }
}

// ============================================================================
// Failing preference store
// ============================================================================

/// A preference store whose every operation fails.
#[derive(Default)]
pub struct BrokenPreferences;

impl PreferenceStore for BrokenPreferences {
    async fn get_preference(&self, _key: &str) -> anyhow::Result<Option<String>> {
        anyhow::bail!("disk unavailable")
    }

    async fn set_preference(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
        anyhow::bail!("disk unavailable")
    }

    async fn delete_preference(&self, _key: &str) -> anyhow::Result<()> {
        anyhow::bail!("disk unavailable")
    }
}
