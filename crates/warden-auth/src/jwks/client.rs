//! Key authority client
//!
//! Thin client over the authority's three read-only endpoints:
//!
//! - `GET /v1/secret/set` - full public key set
//! - `GET /v1/secret/key` - key id list
//! - `GET /v1/secret/key/{id}` - one key, as JSON or PEM
//!
//! No retries: any failure is returned to the caller, which treats it as a
//! validation failure.

use std::time::Duration;

use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use tracing::{debug, error};
use url::Url;

use crate::API_VERSION;
use crate::error::{Error, Result};
use crate::secret::Key;

/// Authority address used when none is configured
pub const DEFAULT_ADDRESS: &str = "localhost:8001";
/// Per-request timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Scheme assumed for addresses without one
pub const DEFAULT_SCHEME: &str = "http";

/// Route prefix below the API version
pub const PATH_BASE: &str = "secret";
/// Full key set route
pub const PATH_SET: &str = "set";
/// Key list and single key route
pub const PATH_KEY: &str = "key";

/// JSON media type
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// PEM media type
pub const CONTENT_TYPE_PEM: &str = "application/x-pem-file";

/// Key authority client configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` or full URL of the authority
    pub address: String,
    /// Per-request timeout, in seconds
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Body of `GET /v1/secret/key`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyListResponse {
    /// Ids of every published key
    #[serde(rename = "keyIDs")]
    pub key_ids: Vec<String>,
}

/// Client for the key authority
#[derive(Debug, Clone)]
pub struct KeySetClient {
    http: reqwest::Client,
    url_set: Url,
    url_key: Url,
}

impl KeySetClient {
    /// Create a client for the configured authority
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unparseable address or if the
    /// HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;

        Self::with_http_client(http, &config.address)
    }

    /// Create a client reusing an existing `reqwest::Client`
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unparseable address.
    pub fn with_http_client(http: reqwest::Client, address: &str) -> Result<Self> {
        let base = base_url(address)?;

        Ok(Self {
            http,
            url_set: join(&base, &[PATH_SET])?,
            url_key: join(&base, &[PATH_KEY])?,
        })
    }

    /// Full key set URL
    pub fn set_url(&self) -> &Url {
        &self.url_set
    }

    /// Fetch the full public key set
    ///
    /// # Errors
    ///
    /// Returns a network error on transport failure, non-2xx status or an
    /// undecodable body.
    pub async fn set(&self) -> Result<JwkSet> {
        self.get_json(self.url_set.clone()).await
    }

    /// Fetch the full public key set as [`Key`]s
    ///
    /// # Errors
    ///
    /// As [`KeySetClient::set`]; a key that cannot be rebuilt is a decode
    /// failure.
    pub async fn set_keys(&self) -> Result<Vec<Key>> {
        self.set()
            .await?
            .keys
            .iter()
            .map(|jwk| decode_key(&self.url_set, jwk))
            .collect()
    }

    /// Fetch the list of published key ids
    ///
    /// # Errors
    ///
    /// Returns a network error on transport failure, non-2xx status or an
    /// undecodable body.
    pub async fn key_ids(&self) -> Result<Vec<String>> {
        let list: KeyListResponse = self.get_json(self.url_key.clone()).await?;
        Ok(list.key_ids)
    }

    /// Fetch one key by id
    ///
    /// The returned key's own id is whatever the authority reported; callers
    /// must compare it with `id`.
    ///
    /// # Errors
    ///
    /// Returns a network error on transport failure, non-2xx status or an
    /// undecodable key.
    pub async fn key(&self, id: &str) -> Result<Key> {
        let url = self.key_url(id)?;
        let jwk: Jwk = self.get_json(url.clone()).await?;
        decode_key(&url, &jwk)
    }

    /// Fetch one key by id as SPKI PEM
    ///
    /// # Errors
    ///
    /// Returns a network error on transport failure or non-2xx status.
    pub async fn key_pem(&self, id: &str) -> Result<String> {
        let url = self.key_url(id)?;
        let response = self.get(url.clone(), CONTENT_TYPE_PEM).await?;

        response.text().await.map_err(|e| {
            error!(url = %url, error = %e, failure = "network", "Failed to read key authority response");
            Error::network(format!("failed to read response: {e}"))
        })
    }

    fn key_url(&self, id: &str) -> Result<Url> {
        let mut url = self.url_key.clone();
        url.path_segments_mut()
            .map_err(|()| Error::configuration("key authority address cannot be a base URL"))?
            .push(id);
        Ok(url)
    }

    async fn get(&self, url: Url, accept: &'static str) -> Result<reqwest::Response> {
        debug!(url = %url, accept, "Requesting key authority");

        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, failure = "network", "Key authority request failed");
                Error::network(format!("failed to perform request: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, failure = "network", "Key authority returned error status");
            return Err(Error::network_with_status(
                format!("non-success response code: {}", status.as_u16()),
                status.as_u16(),
            ));
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.get(url.clone(), CONTENT_TYPE_JSON).await?;

        response.json::<T>().await.map_err(|e| {
            error!(url = %url, error = %e, failure = "network", "Failed to decode key authority response");
            Error::network(format!("failed to decode response: {e}"))
        })
    }
}

fn decode_key(url: &Url, jwk: &Jwk) -> Result<Key> {
    Key::from_jwk(jwk).map_err(|e| {
        error!(url = %url, error = %e, failure = "network", "Key authority returned an unusable key");
        Error::network(format!("failed to decode key: {e}"))
    })
}

fn base_url(address: &str) -> Result<Url> {
    let address = if address.contains("://") {
        address.to_string()
    } else {
        format!("{DEFAULT_SCHEME}://{address}")
    };

    let base = Url::parse(&address)
        .map_err(|e| Error::configuration(format!("invalid address '{address}': {e}")))?;
    join(&base, &[API_VERSION, PATH_BASE])
}

fn join(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::configuration(format!("invalid address '{base}'")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
