//! Account API client
//!
//! Fetches the authoritative list of servers the signed-in account can
//! reach, including every advertised connection path per server.

use anyhow::Result;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ConnectionCandidate, Server};

/// Account API error types
#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Unauthorized (401): account token rejected")]
    Unauthorized,

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// Account API client
pub struct AccountClient {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl AccountClient {
    /// Create a new account client with the given token
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, "https://plex.tv")
    }

    /// Create a client with a custom base URL (for testing)
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Fetch all servers visible to this account, with their connection
    /// descriptors. Devices that do not provide the "server" capability
    /// are filtered out.
    pub async fn resources(&self) -> Result<Vec<Server>> {
        let url = format!("{}/api/v2/resources?includeRelay=1", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(AccountError::RequestFailed)?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await.map_err(AccountError::RequestFailed)?;
                let resources: Vec<ResourceRaw> = serde_json::from_str(&body).map_err(|e| {
                    AccountError::InvalidResponse(format!("JSON parse error: {}", e))
                })?;

                Ok(resources
                    .into_iter()
                    .filter_map(|r| r.into_server())
                    .collect())
            }
            StatusCode::UNAUTHORIZED => Err(AccountError::Unauthorized.into()),
            status => Err(AccountError::ServerError(status.as_u16()).into()),
        }
    }
}

// =============================================================================
// Response Structures (internal deserialization)
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceRaw {
    name: String,
    client_identifier: String,
    #[serde(default)]
    provides: String,
    #[serde(default)]
    owned: bool,
    #[serde(default)]
    relay: bool,
    access_token: Option<String>,
    #[serde(default)]
    connections: Vec<ConnectionRaw>,
}

#[derive(Debug, Deserialize)]
struct ConnectionRaw {
    #[serde(default)]
    protocol: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: u16,
    uri: Option<String>,
    #[serde(default)]
    local: bool,
    #[serde(default)]
    relay: bool,
}

impl ResourceRaw {
    /// Convert an account resource to our Server model; non-server devices
    /// (players, controllers) yield None
    fn into_server(self) -> Option<Server> {
        if !self.provides.split(',').any(|p| p.trim() == "server") {
            return None;
        }

        let candidates = self
            .connections
            .into_iter()
            .filter_map(|c| c.into_candidate())
            .collect();

        Some(Server {
            machine_id: self.client_identifier,
            name: self.name,
            access_token: self.access_token.unwrap_or_default(),
            owned: self.owned,
            relay_capable: self.relay,
            candidates,
        })
    }
}

impl ConnectionRaw {
    /// A descriptor is usable only when protocol, address, and port are all
    /// present; anything less is dropped here
    fn into_candidate(self) -> Option<ConnectionCandidate> {
        if self.protocol.is_empty() || self.address.is_empty() || self.port == 0 {
            return None;
        }
        Some(ConnectionCandidate::new(
            self.protocol,
            self.address,
            self.port,
            self.uri,
            self.local,
            self.relay,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_server_resources_filtered() {
        let player = ResourceRaw {
            name: "Phone".to_string(),
            client_identifier: "abc".to_string(),
            provides: "player,controller".to_string(),
            owned: true,
            relay: false,
            access_token: None,
            connections: vec![],
        };
        assert!(player.into_server().is_none());

        let server = ResourceRaw {
            name: "NAS".to_string(),
            client_identifier: "def".to_string(),
            provides: "server".to_string(),
            owned: true,
            relay: true,
            access_token: Some("tok".to_string()),
            connections: vec![],
        };
        let s = server.into_server().unwrap();
        assert_eq!(s.machine_id, "def");
        assert!(s.relay_capable);
    }

    #[test]
    fn test_incomplete_connection_dropped() {
        let incomplete = ConnectionRaw {
            protocol: "https".to_string(),
            address: String::new(),
            port: 32400,
            uri: None,
            local: false,
            relay: false,
        };
        assert!(incomplete.into_candidate().is_none());

        let complete = ConnectionRaw {
            protocol: "https".to_string(),
            address: "10.0.0.2".to_string(),
            port: 32400,
            uri: None,
            local: true,
            relay: false,
        };
        let c = complete.into_candidate().unwrap();
        assert_eq!(c.uri, "https://10.0.0.2:32400");
        assert!(c.local);
    }
}
