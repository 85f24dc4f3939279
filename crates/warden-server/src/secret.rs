//! Key authority service
//!
//! Publishes the public halves of the configured keys under `/v1/secret`:
//!
//! | Route | Body |
//! |-------|------|
//! | `GET /set` | `{"keys": [JWK, ...]}` |
//! | `GET /key` | `{"keyIDs": [...]}` |
//! | `GET /key/{keyID}` | one JWK, or its SPKI PEM when `Accept` asks for `application/x-pem-file` |

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use tracing::info;
use warden_auth::jwks::{CONTENT_TYPE_JSON, CONTENT_TYPE_PEM, KeyListResponse, PATH_BASE};
use warden_auth::{API_VERSION, Key, SecretConfig};

use crate::error::HttpError;

/// Address the authority listens on when none is configured
pub const DEFAULT_ADDRESS: &str = warden_auth::jwks::DEFAULT_ADDRESS;

/// Key authority configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretServiceConfig {
    /// Listen address
    pub address: String,
    /// Keys to publish, public halves only
    pub keys: Vec<SecretConfig>,
}

impl Default for SecretServiceConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            keys: vec![SecretConfig::default()],
        }
    }
}

/// Published key set
#[derive(Debug)]
pub struct SecretServer {
    keys: Vec<Key>,
}

impl SecretServer {
    /// Publish the given keys
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `keys` is empty or any key is not
    /// a public key.
    pub fn new(keys: Vec<Key>) -> warden_auth::Result<Self> {
        if keys.is_empty() {
            return Err(warden_auth::Error::configuration("no keys configured"));
        }

        if let Some(key) = keys.iter().find(|key| !key.is_public()) {
            return Err(warden_auth::Error::configuration(format!(
                "key '{}' is not public",
                key.key_id()
            )));
        }

        Ok(Self { keys })
    }

    /// Load the public half of every configured key
    ///
    /// # Errors
    ///
    /// Returns the first key loading failure, or any error from
    /// [`SecretServer::new`].
    pub fn from_config(config: &SecretServiceConfig) -> warden_auth::Result<Self> {
        let keys = config
            .keys
            .iter()
            .map(SecretConfig::public_key)
            .collect::<warden_auth::Result<Vec<_>>>()?;

        for key in &keys {
            info!(key_id = key.key_id(), algorithm = ?key.algorithm(), "Publishing key");
        }

        Self::new(keys)
    }

    /// Ids of every published key, in configuration order
    pub fn key_ids(&self) -> Vec<String> {
        self.keys.iter().map(|key| key.key_id().to_string()).collect()
    }

    /// First published key with id `key_id`
    pub fn key(&self, key_id: &str) -> Option<&Key> {
        self.keys.iter().find(|key| key.key_id() == key_id)
    }

    /// The published set as JWKs
    ///
    /// # Errors
    ///
    /// Returns an error if a key cannot be rendered as a JWK.
    pub fn set(&self) -> warden_auth::Result<JwkSet> {
        let keys = self
            .keys
            .iter()
            .map(Key::to_jwk)
            .collect::<warden_auth::Result<Vec<_>>>()?;
        Ok(JwkSet { keys })
    }

    /// Routes under `/v1/secret`
    pub fn router(self) -> Router {
        let base = format!("/{API_VERSION}/{PATH_BASE}");

        Router::new()
            .route(&format!("{base}/set"), get(read_set))
            .route(&format!("{base}/key"), get(list_keys))
            .route(&format!("{base}/key/{{key_id}}"), get(read_key))
            .with_state(Arc::new(self))
    }
}

type SharedServer = Arc<SecretServer>;

async fn read_set(State(server): State<SharedServer>) -> Result<Response, HttpError> {
    let set = server.set().map_err(HttpError::encode)?;
    json_response(&set)
}

async fn list_keys(State(server): State<SharedServer>) -> Result<Response, HttpError> {
    json_response(&KeyListResponse {
        key_ids: server.key_ids(),
    })
}

async fn read_key(
    State(server): State<SharedServer>,
    Path(key_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let key = server.key(&key_id).ok_or_else(|| {
        HttpError::new(StatusCode::NOT_FOUND, "failed to load key")
            .with_source(format!("no such key '{key_id}'"))
    })?;

    if wants_pem(&headers) {
        let pem = key.to_pem().map_err(HttpError::encode)?;
        Ok(with_content_type(CONTENT_TYPE_PEM, pem))
    } else {
        let jwk = key.to_jwk().map_err(HttpError::encode)?;
        json_response(&jwk)
    }
}

fn json_response<T: Serialize>(body: &T) -> Result<Response, HttpError> {
    let bytes = serde_json::to_vec(body).map_err(HttpError::encode)?;
    Ok(with_content_type(CONTENT_TYPE_JSON, bytes))
}

fn with_content_type(content_type: &str, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("{content_type}; charset=utf-8")) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

/// Whether `Accept` names the PEM media type with a non-zero quality
fn wants_pem(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| {
            let mut parts = item.split(';');
            let media = parts.next().unwrap_or_default().trim();
            let quality = parts
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            media.eq_ignore_ascii_case(CONTENT_TYPE_PEM) && quality > 0.0
        })
}
