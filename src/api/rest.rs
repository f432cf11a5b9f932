use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{ApiError, EntityStore};
use crate::model::{Article, Collection, CollectionDetails, NewCollection};
use crate::util::validate_base_url;

/// Success envelope used by every Entity Store endpoint.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FollowStatus {
    is_following: bool,
}

/// REST implementation of [`EntityStore`] on top of `reqwest`.
///
/// Cheap to clone: the inner `reqwest::Client` is reference counted.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
    timeout: Duration,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RestClient {
    /// Build a client for `base_url`.
    ///
    /// The base URL must be HTTPS unless it points at localhost.
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base = validate_base_url(base_url)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base,
            token,
            timeout,
        })
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, ApiError> {
        tracing::debug!(method = %method, url = %url, "Entity store request");

        let mut request = self.http.request(method.clone(), url.clone()).timeout(self.timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Network(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(method = %method, url = %url, status = status.as_u16(), "Entity store rejected request");
            return Err(ApiError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Network(e)
            }
        })?;
        Ok(bytes.to_vec())
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Vec<u8>>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let bytes = self.send(method, url, body).await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        Ok(envelope.data)
    }

    /// Send a request whose response body is not needed beyond its status.
    async fn execute(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Vec<u8>>,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(segments)?;
        self.send(method, url, body).await?;
        Ok(())
    }
}

impl EntityStore for RestClient {
    async fn list_collections(&self) -> Result<Vec<Collection>, ApiError> {
        self.fetch(Method::GET, &["collections"], None).await
    }

    async fn get_collection(&self, id: &str) -> Result<Collection, ApiError> {
        self.fetch(Method::GET, &["collections", id], None).await
    }

    async fn create_collection(&self, new: &NewCollection) -> Result<Collection, ApiError> {
        let body = serde_json::to_vec(new)?;
        self.fetch(Method::POST, &["collections"], Some(body)).await
    }

    async fn update_collection(
        &self,
        id: &str,
        details: &CollectionDetails,
    ) -> Result<Collection, ApiError> {
        let body = serde_json::to_vec(details)?;
        self.fetch(Method::PUT, &["collections", id], Some(body)).await
    }

    async fn delete_collection(&self, id: &str) -> Result<(), ApiError> {
        self.execute(Method::DELETE, &["collections", id], None).await
    }

    async fn add_source(&self, collection_id: &str, source_id: &str) -> Result<(), ApiError> {
        let body = serde_json::to_vec(&serde_json::json!({ "sourceId": source_id }))?;
        self.execute(Method::POST, &["collections", collection_id, "sources"], Some(body))
            .await
    }

    async fn remove_source(&self, collection_id: &str, source_id: &str) -> Result<(), ApiError> {
        self.execute(
            Method::DELETE,
            &["collections", collection_id, "sources", source_id],
            None,
        )
        .await
    }

    async fn follow(&self, collection_id: &str) -> Result<(), ApiError> {
        self.execute(Method::POST, &["collections", collection_id, "follow"], None)
            .await
    }

    async fn unfollow(&self, collection_id: &str) -> Result<(), ApiError> {
        self.execute(Method::DELETE, &["collections", collection_id, "follow"], None)
            .await
    }

    async fn is_following(&self, collection_id: &str) -> Result<bool, ApiError> {
        let status: FollowStatus = self
            .fetch(Method::GET, &["collections", collection_id, "follow"], None)
            .await?;
        Ok(status.is_following)
    }

    async fn list_articles(&self) -> Result<Vec<Article>, ApiError> {
        self.fetch(Method::GET, &["articles"], None).await
    }
}
