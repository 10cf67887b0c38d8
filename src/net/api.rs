//! HTTP collaborators of the session client.
//!
//! Joining, leaving, curation, catalog search and report export go through
//! the room service's REST API rather than the socket. [`RoomApi`] is the seam
//! the session client depends on; [`HttpRoomApi`] implements it with reqwest.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION};
use reqwest::{Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::types::{Item, ItemId};
use crate::config::SessionConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{method} {path} returned {status}: {body}")]
    Status { method: Method, path: String, status: u16, body: String },
    #[error("invalid api url: {0}")]
    InvalidUrl(String),
}

/// Answer of the membership lookup for the current account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTicket {
    pub is_host: bool,
    /// Per-session token passed to the socket URL.
    pub token: String,
    #[serde(default)]
    pub message: String,
}

/// Catalog search parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// One page of catalog results.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CatalogPage {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<Item>,
}

/// A downloaded report file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait RoomApi: Send + Sync {
    /// Join a room, optionally with its password.
    async fn join(&self, room: &str, password: &str) -> Result<(), ApiError>;

    /// Whether the account is in the room, its role, and its socket token.
    async fn membership(&self, room: &str) -> Result<RoomTicket, ApiError>;

    async fn leave(&self, room: &str) -> Result<(), ApiError>;

    /// Curate an item into the room (host only).
    async fn add_item(&self, room: &str, item_id: ItemId) -> Result<(), ApiError>;

    /// Remove a curated item (host only).
    async fn remove_item(&self, room: &str, item_id: ItemId) -> Result<(), ApiError>;

    async fn browse_items(&self, query: &CatalogQuery) -> Result<CatalogPage, ApiError>;

    async fn export_report(&self, room: &str) -> Result<Report, ApiError>;
}

// =============================================================================
// HTTP IMPLEMENTATION
// =============================================================================

/// reqwest-backed [`RoomApi`] authenticating with a bearer access token.
#[derive(Clone, Debug)]
pub struct HttpRoomApi {
    client: reqwest::Client,
    base: Url,
    access_token: Option<String>,
}

impl HttpRoomApi {
    /// # Errors
    ///
    /// Returns an error if `config.api_url` is not a valid base URL or the
    /// HTTP client cannot be built.
    pub fn new(config: &SessionConfig, access_token: Option<String>) -> Result<Self, ApiError> {
        let base = Url::parse(&config.api_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", config.api_url)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(config.api_url.clone()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.http_timeout)
            .build()?;
        Ok(Self { client, base, access_token })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.access_token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder + Send,
    ) -> Result<reqwest::Response, ApiError> {
        let path = url.path().to_owned();
        debug!(%method, %path, "api request");
        let response = build(self.request(method.clone(), url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { method, path, status: status.as_u16(), body });
        }
        Ok(response)
    }
}

#[async_trait]
impl RoomApi for HttpRoomApi {
    async fn join(&self, room: &str, password: &str) -> Result<(), ApiError> {
        let url = room_url(&self.base, room, &["join"])?;
        self.send(Method::PUT, url, |r| r.json(&json!({ "password": password }))).await?;
        info!(%room, "joined room");
        Ok(())
    }

    async fn membership(&self, room: &str) -> Result<RoomTicket, ApiError> {
        let url = room_url(&self.base, room, &["in"])?;
        let response = self.send(Method::GET, url, |r| r).await?;
        Ok(response.json::<RoomTicket>().await?)
    }

    async fn leave(&self, room: &str) -> Result<(), ApiError> {
        let url = room_url(&self.base, room, &["leave"])?;
        self.send(Method::DELETE, url, |r| r).await?;
        info!(%room, "left room");
        Ok(())
    }

    async fn add_item(&self, room: &str, item_id: ItemId) -> Result<(), ApiError> {
        let url = room_url(&self.base, room, &["beers"])?;
        self.send(Method::PUT, url, |r| r.json(&json!({ "beer_id": item_id }))).await?;
        Ok(())
    }

    async fn remove_item(&self, room: &str, item_id: ItemId) -> Result<(), ApiError> {
        let mut url = room_url(&self.base, room, &["beers"])?;
        url.query_pairs_mut().append_pair("beer_id", &item_id.to_string());
        self.send(Method::DELETE, url, |r| r).await?;
        Ok(())
    }

    async fn browse_items(&self, query: &CatalogQuery) -> Result<CatalogPage, ApiError> {
        let url = catalog_url(&self.base, query)?;
        let response = self.send(Method::GET, url, |r| r).await?;
        Ok(response.json::<CatalogPage>().await?)
    }

    async fn export_report(&self, room: &str) -> Result<Report, ApiError> {
        let url = room_url(&self.base, room, &["report"])?;
        let response = self.send(Method::GET, url, |r| r).await?;
        let filename = match response.headers().get(CONTENT_DISPOSITION).map(|v| v.to_str()) {
            Some(Ok(header)) => filename_from_content_disposition(header),
            _ => None,
        }
        .unwrap_or_else(|| format!("{room}_report"));
        let bytes = response.bytes().await?.to_vec();
        info!(%room, %filename, size = bytes.len(), "report downloaded");
        Ok(Report { filename, bytes })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// `{base}/api/rooms/{room}/{tail..}/`
pub(crate) fn room_url(base: &Url, room: &str, tail: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(base.to_string()))?;
        segments.pop_if_empty().extend(["api", "rooms", room]).extend(tail).push("");
    }
    Ok(url)
}

pub(crate) fn catalog_url(base: &Url, query: &CatalogQuery) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ApiError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(["api", "beers", ""]);
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.append_pair("search", search);
        }
        if let Some(page) = query.page {
            pairs.append_pair("page", &page.to_string());
        }
        if let Some(page_size) = query.page_size {
            pairs.append_pair("page_size", &page_size.to_string());
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}

/// Filename from a `Content-Disposition` header value, e.g.
/// `attachment; filename="friday.xlsx"`.
#[must_use]
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = value.trim().trim_matches('"').trim();
        (!name.is_empty()).then(|| name.to_owned())
    })
}
