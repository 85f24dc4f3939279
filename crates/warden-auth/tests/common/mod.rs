//! Common test utilities for warden-auth integration tests
//!
//! A `wiremock` server stands in for the key authority; helpers generate
//! key pairs and cache builders pointed at it.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jsonwebtoken::Algorithm;
use serde_json::json;
use warden_auth::{
    ClientConfig, Key, KeySetClient, KeySource, KeyType, Signer, ValidatorCache,
    ValidatorCacheBuilder,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

/// Private/public halves of one generated key
pub struct KeyPair {
    pub private: Key,
    pub public: Key,
}

impl KeyPair {
    /// Fresh EC P-256 pair bound to ES256
    pub fn ec() -> Self {
        Self::generate(KeyType::Ec, Algorithm::ES256)
    }

    /// Fresh RSA pair bound to `algorithm`
    pub fn rsa(algorithm: Algorithm) -> Self {
        Self::generate(KeyType::Rsa, algorithm)
    }

    fn generate(key_type: KeyType, algorithm: Algorithm) -> Self {
        let store = KeySource::Generate(key_type).store().expect("generate key");
        Self {
            private: Key::new_private(algorithm, &store).expect("private key"),
            public: Key::new_public(algorithm, &store).expect("public key"),
        }
    }

    pub fn key_id(&self) -> &str {
        self.public.key_id()
    }

    pub fn signer(&self) -> Signer {
        Signer::new(&self.private).expect("signer")
    }
}

/// Mock key authority
pub struct MockAuthority {
    pub server: MockServer,
}

impl MockAuthority {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base address as configured on a client
    pub fn address(&self) -> String {
        self.server.uri()
    }

    pub fn client(&self) -> KeySetClient {
        KeySetClient::new(&ClientConfig {
            address: self.address(),
            ..ClientConfig::default()
        })
        .expect("client")
    }

    /// Cache builder pointed at this authority
    pub fn cache_builder(&self) -> ValidatorCacheBuilder {
        ValidatorCache::builder().with_client(self.client())
    }

    /// Serve `key` under its own id
    pub async fn mock_key(&self, key: &Key) {
        self.mock_key_as(key.key_id(), key).await;
    }

    /// Serve `key` under `id`, which may differ from its own
    pub async fn mock_key_as(&self, id: &str, key: &Key) {
        let jwk = key.to_jwk().expect("public jwk");
        Mock::given(method("GET"))
            .and(path(format!("/v1/secret/key/{id}")))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwk))
            .mount(&self.server)
            .await;
    }

    /// Serve `key` and require exactly `times` fetches before the server drops
    pub async fn expect_key_fetches(&self, key: &Key, times: u64) {
        let jwk = key.to_jwk().expect("public jwk");
        Mock::given(method("GET"))
            .and(path(format!("/v1/secret/key/{}", key.key_id())))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwk))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Serve the full set
    pub async fn mock_set(&self, keys: &[&Key]) {
        let jwks: Vec<_> = keys.iter().map(|k| k.to_jwk().expect("public jwk")).collect();
        Mock::given(method("GET"))
            .and(path("/v1/secret/set"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": jwks })))
            .mount(&self.server)
            .await;
    }

    /// Serve the id list
    pub async fn mock_key_ids(&self, ids: &[&str]) {
        Mock::given(method("GET"))
            .and(path("/v1/secret/key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keyIDs": ids })))
            .mount(&self.server)
            .await;
    }

    /// Answer `route` with a bare status
    pub async fn mock_status(&self, route: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answer `route` with a 200 and a body that is not JSON
    pub async fn mock_garbage(&self, route: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&self.server)
            .await;
    }
}

/// Hit/miss counters wired into a cache builder
#[derive(Clone, Default)]
pub struct HitMiss {
    hits: Arc<AtomicUsize>,
    misses: Arc<AtomicUsize>,
}

impl HitMiss {
    pub fn attach(&self, builder: ValidatorCacheBuilder) -> ValidatorCacheBuilder {
        let hits = Arc::clone(&self.hits);
        let misses = Arc::clone(&self.misses);
        builder
            .on_hit(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
            .on_miss(move || {
                misses.fetch_add(1, Ordering::SeqCst);
            })
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::SeqCst)
    }
}
