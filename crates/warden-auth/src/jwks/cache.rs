//! Key id → [`Validater`] cache with fetch-on-miss
//!
//! Entries carry their own creation time and TTL and are checked lazily at
//! lookup against an injectable [`Clock`]. Size is bounded by LRU eviction
//! (moka). Concurrent misses on one key id are not coalesced; each racer
//! fetches on its own and the last insert wins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use tracing::{debug, info, warn};

use super::client::{ClientConfig, KeySetClient};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result, ValidationError};
use crate::secret::Key;
use crate::token::{StandardClaims, Validate, Validater};

/// TTL applied to entries when none is configured
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Entry bound applied when none is configured
pub const DEFAULT_MAX_SIZE: u64 = 10;

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Validator cache configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Key authority client settings
    pub client: ClientConfig,
    /// Lifetime of each entry, in seconds
    #[serde_as(as = "DurationSeconds<u64>")]
    pub default_ttl: Duration,
    /// Maximum number of cached validaters
    pub max_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            default_ttl: DEFAULT_TTL,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    validater: Arc<Validater>,
    created_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match TimeDelta::from_std(self.ttl) {
            Ok(ttl) => now.signed_duration_since(self.created_at) >= ttl,
            Err(_) => false,
        }
    }
}

/// Builder for [`ValidatorCache`]
pub struct ValidatorCacheBuilder {
    client: Option<KeySetClient>,
    client_config: ClientConfig,
    ttl: Duration,
    max_size: u64,
    on_hit: Option<Hook>,
    on_miss: Option<Hook>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ValidatorCacheBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorCacheBuilder")
            .field("client", &self.client)
            .field("client_config", &self.client_config)
            .field("ttl", &self.ttl)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

impl Default for ValidatorCacheBuilder {
    fn default() -> Self {
        Self {
            client: None,
            client_config: ClientConfig::default(),
            ttl: DEFAULT_TTL,
            max_size: DEFAULT_MAX_SIZE,
            on_hit: None,
            on_miss: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl ValidatorCacheBuilder {
    /// Apply every setting from `config`
    pub fn with_config(self, config: &CacheConfig) -> Self {
        self.with_client_config(config.client.clone())
            .with_default_ttl(config.default_ttl)
            .with_max_size(config.max_size)
    }

    /// Use an existing client; takes precedence over the client config
    pub fn with_client(mut self, client: KeySetClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the client from `config`
    pub fn with_client_config(mut self, config: ClientConfig) -> Self {
        self.client_config = config;
        self
    }

    /// Lifetime of newly inserted entries
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Maximum entry count (at least one)
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    /// Called on every unexpired cache hit
    pub fn on_hit(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_hit = Some(Arc::new(hook));
        self
    }

    /// Called on every miss or expired entry, before fetching
    pub fn on_miss(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_miss = Some(Arc::new(hook));
        self
    }

    /// Read time from `clock` for entry expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the cache
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no client was supplied and one cannot
    /// be built from the client config.
    pub fn build(self) -> Result<ValidatorCache> {
        let client = match self.client {
            Some(client) => client,
            None => KeySetClient::new(&self.client_config)?,
        };

        let entries = Cache::builder()
            .name("warden-validaters")
            .max_capacity(self.max_size)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Ok(ValidatorCache {
            entries,
            client,
            ttl: self.ttl,
            clock: self.clock,
            on_hit: self.on_hit.unwrap_or_else(|| Arc::new(|| {})),
            on_miss: self.on_miss.unwrap_or_else(|| Arc::new(|| {})),
        })
    }
}

/// Process-wide key id → [`Validater`] cache for relying services.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct ValidatorCache {
    entries: Cache<String, CacheEntry>,
    client: KeySetClient,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    on_hit: Hook,
    on_miss: Hook,
}

impl fmt::Debug for ValidatorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorCache")
            .field("client", &self.client)
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.entry_count())
            .finish_non_exhaustive()
    }
}

impl ValidatorCache {
    /// Start building a cache
    pub fn builder() -> ValidatorCacheBuilder {
        ValidatorCacheBuilder::default()
    }

    /// Build a cache straight from configuration
    ///
    /// # Errors
    ///
    /// See [`ValidatorCacheBuilder::build`].
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::builder().with_config(config).build()
    }

    /// Authority client used on misses
    pub fn client(&self) -> &KeySetClient {
        &self.client
    }

    /// Verify `token` with the validater for its key id and decode the payload as `C`
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed tokens, key id mismatches and
    /// signature failures, and a network error if the key could not be fetched.
    pub async fn validate_as<C>(&self, token: &str) -> Result<C>
    where
        C: DeserializeOwned + Clone,
    {
        let key_id = extract_kid(token).inspect_err(|e| {
            debug!(error = %e, failure = "token", "Failed to read token key id");
        })?;

        let validater = self.resolve(&key_id).await?;
        validater.validate_as(token)
    }

    async fn resolve(&self, key_id: &str) -> Result<Arc<Validater>> {
        if let Some(entry) = self.entries.get(key_id).await {
            if !entry.is_expired(self.clock.now()) {
                (self.on_hit)();
                return Ok(entry.validater);
            }
            debug!(key_id, "Cached validater expired");
        }

        (self.on_miss)();
        debug!(key_id, "Validater cache miss, fetching key");

        let key = self.client.key(key_id).await.inspect_err(|e| {
            warn!(key_id, error = %e, failure = e.failure_kind(), "Failed to fetch validation key");
        })?;

        if key.key_id() != key_id {
            warn!(
                key_id,
                received = key.key_id(),
                failure = "token",
                "Key authority returned mismatched key id"
            );
            return Err(ValidationError::KeyIdMismatch {
                requested: key_id.to_string(),
                received: key.key_id().to_string(),
            }
            .into());
        }

        self.insert(&key).await
    }

    /// Insert or replace the validater for `key` with a fresh TTL
    ///
    /// # Errors
    ///
    /// Returns an invalid-key error if `key` has no id or is not public.
    pub async fn insert(&self, key: &Key) -> Result<Arc<Validater>> {
        if key.key_id().is_empty() {
            return Err(ValidationError::InvalidKey("key is missing key id".into()).into());
        }

        let validater = Validater::new(key)
            .map(Arc::new)
            .map_err(|e| Error::from(ValidationError::InvalidKey(e.to_string())))?;

        let entry = CacheEntry {
            validater: Arc::clone(&validater),
            created_at: self.clock.now(),
            ttl: self.ttl,
        };
        self.entries.insert(key.key_id().to_string(), entry).await;

        Ok(validater)
    }

    /// Drop the entry for `key_id`, if any
    pub async fn evict(&self, key_id: &str) {
        self.entries.invalidate(key_id).await;
    }

    /// True if an entry (expired or not) is held for `key_id`
    pub fn contains_key(&self, key_id: &str) -> bool {
        self.entries.contains_key(key_id)
    }

    /// Populate the cache from the authority's full key set
    ///
    /// # Errors
    ///
    /// Returns the first fetch or insert failure; keys inserted before it
    /// stay cached.
    pub async fn warm(&self) -> Result<()> {
        let keys = self.client.set_keys().await?;
        for key in &keys {
            self.insert(key).await?;
        }

        info!(count = keys.len(), "Validater cache warmed");
        Ok(())
    }

    /// Number of cached entries, after applying pending evictions
    pub async fn item_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    /// Drop every entry and flush pending maintenance
    pub async fn close(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }
}

#[async_trait]
impl Validate for ValidatorCache {
    async fn validate(&self, token: &str) -> Result<StandardClaims> {
        self.validate_as(token).await
    }
}

/// Read the `kid` from a compact token's unverified header.
///
/// Nothing else in the header is trusted at this point.
///
/// # Errors
///
/// Returns a malformed-token error for a missing separator, undecodable
/// header, or missing/empty `kid`.
pub fn extract_kid(token: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct KidHeader {
        #[serde(default)]
        kid: Option<String>,
    }

    let (header, _) = token
        .split_once('.')
        .ok_or_else(|| ValidationError::MalformedToken("invalid token separator format".into()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| ValidationError::MalformedToken("failed to base64 decode token header".into()))?;

    let parsed: KidHeader = serde_json::from_slice(&bytes).map_err(|e| {
        ValidationError::MalformedToken(format!("failed to json decode token header: {e}"))
    })?;

    match parsed.kid {
        Some(kid) if !kid.is_empty() => Ok(kid),
        _ => Err(ValidationError::MalformedToken("token missing key id (kid)".into()).into()),
    }
}
