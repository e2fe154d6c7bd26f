//! Per-server library API client
//!
//! Bound to one resolved base URL; fetches library sections, paginated
//! section contents, and collections. Responses arrive MediaContainer-shaped
//! and are converted into our catalog models.

use anyhow::Result;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ExternalIds, MediaKind, MediaRecord};

/// Page size used when walking a library section
pub const PAGE_SIZE: usize = 200;

/// Server API error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Unauthorized (401): server token rejected")]
    Unauthorized,

    #[error("Not found (404): {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// One library section as listed by the server
#[derive(Debug, Clone)]
pub struct LibrarySection {
    pub key: String,
    pub title: String,
    /// None for section types we do not sync (music, photos)
    pub kind: Option<MediaKind>,
}

/// One page of section contents
#[derive(Debug)]
pub struct ItemPage {
    pub items: Vec<MediaRecord>,
    /// Total item count in the section, from the container header
    pub total: usize,
}

/// A collection as listed by the server
#[derive(Debug, Clone)]
pub struct CollectionEntry {
    pub rating_key: String,
    pub title: String,
}

/// Per-server library client, bound to a resolved base URL
pub struct ServerClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl ServerClient {
    /// Create a client for one server. `base_url` comes from the connection
    /// resolver; `token` is the per-server access token from the account
    /// resource list.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Make an authenticated GET request and deserialize the body
    async fn get<T: for<'de> Deserialize<'de>>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path_and_query);

        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ServerError::RequestFailed)?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await.map_err(ServerError::RequestFailed)?;
                let parsed: T = serde_json::from_str(&body).map_err(|e| {
                    ServerError::InvalidResponse(format!("JSON parse error: {}", e))
                })?;
                Ok(parsed)
            }
            StatusCode::UNAUTHORIZED => Err(ServerError::Unauthorized.into()),
            StatusCode::NOT_FOUND => Err(ServerError::NotFound(url).into()),
            status => Err(ServerError::ServerError(status.as_u16()).into()),
        }
    }

    /// List library sections
    pub async fn sections(&self) -> Result<Vec<LibrarySection>> {
        let response: ContainerResponse<SectionsContainer> =
            self.get("/library/sections").await?;

        Ok(response
            .media_container
            .directory
            .into_iter()
            .map(|d| LibrarySection {
                kind: MediaKind::from_type_str(&d.section_type),
                key: d.key,
                title: d.title,
            })
            .collect())
    }

    /// Fetch one page of a section's contents
    pub async fn section_items(
        &self,
        server_id: &str,
        section_key: &str,
        start: usize,
        size: usize,
    ) -> Result<ItemPage> {
        let path = format!(
            "/library/sections/{}/all?includeGuids=1&X-Plex-Container-Start={}&X-Plex-Container-Size={}",
            urlencoding::encode(section_key),
            start,
            size
        );
        let response: ContainerResponse<ItemsContainer> = self.get(&path).await?;
        let container = response.media_container;

        let total = container.total_size.unwrap_or(container.size);
        let items = container
            .metadata
            .into_iter()
            .filter_map(|m| m.into_record(server_id, section_key))
            .collect();

        Ok(ItemPage { items, total })
    }

    /// List collections within a section
    pub async fn collections(&self, section_key: &str) -> Result<Vec<CollectionEntry>> {
        let path = format!(
            "/library/sections/{}/collections",
            urlencoding::encode(section_key)
        );
        let response: ContainerResponse<ItemsContainer> = self.get(&path).await?;

        Ok(response
            .media_container
            .metadata
            .into_iter()
            .map(|m| CollectionEntry {
                rating_key: m.rating_key,
                title: m.title,
            })
            .collect())
    }

    /// List the rating keys of a collection's members
    pub async fn collection_children(&self, collection_key: &str) -> Result<Vec<String>> {
        let path = format!(
            "/library/collections/{}/children",
            urlencoding::encode(collection_key)
        );
        let response: ContainerResponse<ItemsContainer> = self.get(&path).await?;

        Ok(response
            .media_container
            .metadata
            .into_iter()
            .map(|m| m.rating_key)
            .collect())
    }
}

// =============================================================================
// Response Structures (internal deserialization)
// =============================================================================

#[derive(Debug, Deserialize)]
struct ContainerResponse<T> {
    #[serde(rename = "MediaContainer")]
    media_container: T,
}

#[derive(Debug, Deserialize)]
struct SectionsContainer {
    #[serde(rename = "Directory", default)]
    directory: Vec<DirectoryRaw>,
}

#[derive(Debug, Deserialize)]
struct DirectoryRaw {
    key: String,
    title: String,
    #[serde(rename = "type", default)]
    section_type: String,
}

#[derive(Debug, Deserialize)]
struct ItemsContainer {
    #[serde(default)]
    size: usize,
    #[serde(rename = "totalSize")]
    total_size: Option<usize>,
    #[serde(rename = "Metadata", default)]
    metadata: Vec<MetadataRaw>,
}

#[derive(Debug, Deserialize)]
struct MetadataRaw {
    #[serde(rename = "ratingKey", default)]
    rating_key: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type", default)]
    item_type: String,
    year: Option<u16>,
    /// Legacy single agent guid
    guid: Option<String>,
    /// Structured external IDs
    #[serde(rename = "Guid", default)]
    guids: Vec<GuidRaw>,
}

#[derive(Debug, Deserialize)]
struct GuidRaw {
    id: String,
}

impl MetadataRaw {
    /// Convert a metadata entry to our MediaRecord model; entries without a
    /// rating key or with an unrecognized type yield None
    fn into_record(self, server_id: &str, section_key: &str) -> Option<MediaRecord> {
        if self.rating_key.is_empty() {
            return None;
        }
        let kind = MediaKind::from_type_str(&self.item_type)?;

        let structured: Vec<String> = self.guids.into_iter().map(|g| g.id).collect();
        let ids = ExternalIds::from_guids(&structured, self.guid.as_deref());

        Some(MediaRecord {
            server_id: server_id.to_string(),
            rating_key: self.rating_key,
            title: self.title,
            kind,
            ids,
            year: self.year,
            section_key: section_key.to_string(),
        })
    }
}
