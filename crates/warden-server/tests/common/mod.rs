//! Common test utilities for warden-server integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use jsonwebtoken::Algorithm;
use tower::ServiceExt;
use warden_auth::{IssuerConfig, Key, KeySource, KeyType, Signer};
use warden_server::store::MIN_COST;
use warden_server::{MemoryStore, TokenServer};

pub const PASSWORD: &str = "correct horse battery staple";

/// Private/public halves of one generated EC key
pub struct Keys {
    pub private: Key,
    pub public: Key,
}

impl Keys {
    pub fn ec() -> Self {
        let store = KeySource::Generate(KeyType::Ec).store().expect("generate key");
        Self {
            private: Key::new_private(Algorithm::ES256, &store).expect("private key"),
            public: Key::new_public(Algorithm::ES256, &store).expect("public key"),
        }
    }

    pub fn signer(&self) -> Signer {
        Signer::new(&self.private).expect("signer")
    }
}

/// Token issuer over a memory store holding users `alice` and `bob`
pub struct Issuer {
    pub keys: Keys,
    pub store: Arc<MemoryStore>,
    pub alice: String,
    pub bob: String,
}

impl Issuer {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::with_cost(MIN_COST));
        let alice = store.add_user("alice", PASSWORD).expect("add alice").id;
        let bob = store.add_user("bob", PASSWORD).expect("add bob").id;
        Self {
            keys: Keys::ec(),
            store,
            alice,
            bob,
        }
    }

    pub fn router(&self) -> Router {
        TokenServer::new(&IssuerConfig::default(), self.keys.signer(), self.store.clone()).router()
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, bearer: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Send one request through a fresh clone of `router`
pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn content_type(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
