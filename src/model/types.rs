use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Sources
// ============================================================================

/// Optional editorial metadata attached to a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceMetadata {
    /// Orientation tags (e.g. "left", "centre", "independent").
    pub orientation: Vec<String>,
    /// Free-form funding description.
    pub funding: Option<String>,
}

/// An RSS-backed content origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub favicon: Option<String>,
    #[serde(default)]
    pub metadata: Option<SourceMetadata>,
}

/// A reference to a source as it appears inside collections and articles.
///
/// Depending on which endpoint populated the record, the store sends either
/// the bare identifier or the whole embedded source document. Both forms
/// compare by identifier only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceRef {
    Id(String),
    Embedded(Source),
}

impl SourceRef {
    /// The identifier of the referenced source, whatever the representation.
    pub fn id(&self) -> &str {
        match self {
            SourceRef::Id(id) => id,
            SourceRef::Embedded(source) => &source.id,
        }
    }
}

impl PartialEq for SourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for SourceRef {}

impl From<&str> for SourceRef {
    fn from(id: &str) -> Self {
        SourceRef::Id(id.to_owned())
    }
}

impl From<String> for SourceRef {
    fn from(id: String) -> Self {
        SourceRef::Id(id)
    }
}

impl From<Source> for SourceRef {
    fn from(source: Source) -> Self {
        SourceRef::Embedded(source)
    }
}

// ============================================================================
// Collections
// ============================================================================

/// A named grouping of sources owned by one user.
///
/// `sources` may mix bare identifiers and embedded sources; use
/// [`crate::resolver::resolve_source_ids`] before comparing membership.
/// `is_followed` is viewer-scoped: true when the viewer follows a collection
/// owned by somebody else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "userId", default)]
    pub owner_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub is_followed: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Collection {
    /// Build an empty collection owned by `owner_id`.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            description: String::new(),
            is_public: false,
            sources: Vec::new(),
            is_followed: false,
            created_at: None,
            updated_at: None,
        }
    }

    /// Replace the member list with bare identifiers.
    pub fn with_sources<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceRef>,
    {
        self.sources = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    /// Whether `source_id` is a member, in either representation.
    pub fn contains_source(&self, source_id: &str) -> bool {
        self.sources.iter().any(|s| s.id() == source_id)
    }
}

/// The store sends `"sources": null` for collections created without members.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<SourceRef>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<SourceRef>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Payload for `POST /collections`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCollection {
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub sources: Vec<String>,
}

/// Owner-editable fields, sent as the body of `PUT /collections/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDetails {
    pub name: String,
    pub description: String,
    pub is_public: bool,
}

impl CollectionDetails {
    pub fn of(collection: &Collection) -> Self {
        Self {
            name: collection.name.clone(),
            description: collection.description.clone(),
            is_public: collection.is_public,
        }
    }

    pub(crate) fn apply_to(&self, collection: &mut Collection) {
        collection.name.clone_from(&self.name);
        collection.description.clone_from(&self.description);
        collection.is_public = self.is_public;
    }
}

// ============================================================================
// Articles
// ============================================================================

/// A content item attributed to exactly one source. Read-only for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Content snippet; older endpoints call this field `content`.
    #[serde(default, alias = "content")]
    pub snippet: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(rename = "sourceId")]
    pub source: SourceRef,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub saved: bool,
}

impl Article {
    pub fn new(id: impl Into<String>, source: impl Into<SourceRef>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            snippet: String::new(),
            published_at: None,
            source: source.into(),
            read: false,
            saved: false,
        }
    }

    pub fn source_id(&self) -> &str {
        self.source.id()
    }
}

// ============================================================================
// Filter State
// ============================================================================

/// The active article filter.
///
/// When `collection` is set, `sources` holds the member identifiers captured
/// at selection time. The snapshot is not used for matching: the filter
/// engine re-resolves the live collection on every pass. Only with
/// `drill_down` set does the single entry in `sources` narrow the collection
/// to that one source.
///
/// Persisted as `{"searchTerm": "...", "sources": [...], "collection": ...}`,
/// plus `"drillDown": true` while drilled into a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub search_term: String,
    pub sources: Vec<String>,
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub drill_down: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FilterState {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}
