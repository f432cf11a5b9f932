use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;

use crate::model::{Article, Collection, FilterState};
use crate::resolver::resolve_source_ids;
use crate::sync::CollectionCache;

/// Which sources the scope part of a filter admits.
enum Scope<'a> {
    All,
    Sources(HashSet<&'a str>),
    Nothing,
}

impl Scope<'_> {
    fn admits(&self, article: &Article) -> bool {
        match self {
            Scope::All => true,
            Scope::Sources(ids) => ids.contains(article.source_id()),
            Scope::Nothing => false,
        }
    }
}

/// First matching rule wins: active collection (narrowed to one member
/// when drilled down), then explicit sources, then everything.
fn scope<'a>(filter: &'a FilterState, collections: &'a [Collection]) -> Scope<'a> {
    if let Some(collection_id) = &filter.collection {
        // Fail closed: a stale or deleted collection selects nothing.
        let Some(collection) = collections.iter().find(|c| &c.id == collection_id) else {
            return Scope::Nothing;
        };
        let members = resolve_source_ids(collection);
        if filter.drill_down {
            if let [only] = filter.sources.as_slice() {
                return if members.contains(only.as_str()) {
                    Scope::Sources(HashSet::from([only.as_str()]))
                } else {
                    Scope::Nothing
                };
            }
        }
        return Scope::Sources(members);
    }

    if !filter.sources.is_empty() {
        return Scope::Sources(filter.sources.iter().map(String::as_str).collect());
    }

    Scope::All
}

fn matches_search(article: &Article, needle: &str) -> bool {
    article.title.to_lowercase().contains(needle) || article.snippet.to_lowercase().contains(needle)
}

/// Select the articles the filter admits, preserving input order.
///
/// The collection rule resolves the collection's *current* membership from
/// `collections` on every call, so removing a source from the active
/// collection drops its articles without reselecting the collection. The
/// search term (case-insensitive substring of title or snippet) narrows
/// whatever the scope rules selected.
pub fn compute_visible_articles(
    articles: &[Article],
    filter: &FilterState,
    collections: &[Collection],
) -> Vec<Article> {
    let scope = scope(filter, collections);
    if matches!(scope, Scope::Nothing) {
        return Vec::new();
    }

    let needle = filter.search_term.trim().to_lowercase();
    articles
        .iter()
        .filter(|a| scope.admits(a))
        .filter(|a| needle.is_empty() || matches_search(a, &needle))
        .cloned()
        .collect()
}

// ============================================================================
// Memoised view
// ============================================================================

static NEXT_ARTICLE_REVISION: AtomicU64 = AtomicU64::new(1);

/// An immutable batch of loaded articles with a process-unique revision.
///
/// Replacing the loaded articles means building a new set, which gets a new
/// revision and so invalidates memoised results.
#[derive(Debug, Clone)]
pub struct ArticleSet {
    articles: Arc<[Article]>,
    revision: u64,
}

impl ArticleSet {
    pub fn new(articles: Vec<Article>) -> Self {
        Self {
            articles: articles.into(),
            revision: NEXT_ARTICLE_REVISION.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

impl Default for ArticleSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    articles: u64,
    collections: u64,
    filter: FilterState,
}

/// Memoising front for [`compute_visible_articles`] over the live cache.
///
/// Unchanged inputs (same article set, same cache revision, equal filter)
/// return the same `Arc`, so callers can compare results by pointer to
/// skip re-rendering.
pub struct VisibleArticles {
    memo: Mutex<LruCache<MemoKey, Arc<[Article]>>>,
}

impl VisibleArticles {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memo: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn compute(
        &self,
        articles: &ArticleSet,
        filter: &FilterState,
        cache: &CollectionCache,
    ) -> Arc<[Article]> {
        let key = MemoKey {
            articles: articles.revision(),
            collections: cache.revision(),
            filter: filter.clone(),
        };
        if let Some(hit) = self
            .memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(hit);
        }

        // Re-read revision and contents together so the key matches the data.
        let (revision, collections) = cache.snapshot_with_revision();
        let visible: Arc<[Article]> =
            compute_visible_articles(articles.articles(), filter, &collections).into();
        tracing::debug!(
            total = articles.len(),
            visible = visible.len(),
            collections_revision = revision,
            "Recomputed visible articles"
        );

        let key = MemoKey {
            collections: revision,
            ..key
        };
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, Arc::clone(&visible));
        visible
    }
}

impl Default for VisibleArticles {
    fn default() -> Self {
        Self::new(16)
    }
}
