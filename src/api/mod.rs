//! The Entity Store seam.
//!
//! The engine never talks HTTP directly: it calls an [`EntityStore`], which
//! is [`RestClient`] in production and a scripted fake in tests. Every call
//! is a suspension point; failures come back as [`ApiError`] and the engine
//! does not retry.

mod rest;

use std::future::Future;

use thiserror::Error;

use crate::model::{Article, Collection, CollectionDetails, NewCollection};
use crate::util::UrlValidationError;

pub use rest::RestClient;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    BaseUrl(#[from] UrlValidationError),
}

impl ApiError {
    /// The referenced entity no longer exists on the server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::HttpStatus(404))
    }
}

/// CRUD and follow operations on collections, plus article listing.
///
/// Endpoints (relative to the configured base URL), each answering
/// `{ "data": ... }` on success:
///
/// | operation           | request                                   |
/// |---------------------|-------------------------------------------|
/// | `list_collections`  | `GET /collections`                        |
/// | `get_collection`    | `GET /collections/:id`                    |
/// | `create_collection` | `POST /collections`                       |
/// | `update_collection` | `PUT /collections/:id`                    |
/// | `delete_collection` | `DELETE /collections/:id`                 |
/// | `add_source`        | `POST /collections/:id/sources`           |
/// | `remove_source`     | `DELETE /collections/:id/sources/:source` |
/// | `follow`            | `POST /collections/:id/follow`            |
/// | `unfollow`          | `DELETE /collections/:id/follow`          |
/// | `is_following`      | `GET /collections/:id/follow`             |
/// | `list_articles`     | `GET /articles`                           |
pub trait EntityStore: Send + Sync {
    fn list_collections(&self) -> impl Future<Output = Result<Vec<Collection>, ApiError>> + Send;

    fn get_collection(&self, id: &str) -> impl Future<Output = Result<Collection, ApiError>> + Send;

    fn create_collection(
        &self,
        new: &NewCollection,
    ) -> impl Future<Output = Result<Collection, ApiError>> + Send;

    fn update_collection(
        &self,
        id: &str,
        details: &CollectionDetails,
    ) -> impl Future<Output = Result<Collection, ApiError>> + Send;

    fn delete_collection(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn add_source(
        &self,
        collection_id: &str,
        source_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn remove_source(
        &self,
        collection_id: &str,
        source_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn follow(&self, collection_id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn unfollow(&self, collection_id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn is_following(
        &self,
        collection_id: &str,
    ) -> impl Future<Output = Result<bool, ApiError>> + Send;

    fn list_articles(&self) -> impl Future<Output = Result<Vec<Article>, ApiError>> + Send;
}
