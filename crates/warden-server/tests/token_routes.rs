//! Token issuer routes and the relying-service read path

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{StatusCode, header};
use common::{Issuer, PASSWORD, body_json, content_type, get, get_with_bearer, post_json, send};
use pretty_assertions::assert_eq;
use serde_json::json;
use warden_auth::{CacheConfig, ClientConfig, IssuerConfig, ValidatorCache};
use warden_server::token::{ReaderServiceConfig, TokenResponse};
use warden_server::{SecretServer, TokenReader};

/// Serve a key authority for `issuer`'s key on an ephemeral port
async fn spawn_authority(issuer: &Issuer) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let authority = SecretServer::new(vec![issuer.keys.public.clone()]).unwrap().router();
    tokio::spawn(async move { axum::serve(listener, authority).await });
    address
}

async fn login(router: &axum::Router, name: &str, ttl: u64) -> TokenResponse {
    let response = send(
        router,
        post_json(
            "/v1/token/user",
            None,
            json!({ "name": name, "password": PASSWORD, "ttl": ttl }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED, "login as {name}");
    serde_json::from_value(body_json(response).await).unwrap()
}

#[tokio::test]
async fn test_login_issues_user_token() {
    // GIVEN: an issuer with user alice
    let issuer = Issuer::new();
    let router = issuer.router();

    // WHEN: alice logs in with a zero ttl
    let response = send(
        &router,
        post_json(
            "/v1/token/user",
            None,
            json!({ "name": "alice", "password": PASSWORD, "ttl": 0 }),
        ),
    )
    .await;

    // THEN: a token for alice's id is created with the maximum lifetime
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(content_type(&response), "application/json; charset=utf-8");
    let body: TokenResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(body.id, issuer.alice);

    let claims = issuer.keys.signer().validate_claims(&body.token).unwrap();
    assert_eq!(claims.subject.as_deref(), Some(issuer.alice.as_str()));
    assert_eq!(claims.expiration, Some(body.expiration));
    let lifetime = body.expiration - claims.issued_at.unwrap();
    assert_eq!(lifetime.num_seconds(), 24 * 60 * 60);

    // AND: the token passes the user read route
    let response = send(&router, get_with_bearer("/v1/token/user", &body.token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_failures() {
    let issuer = Issuer::new();
    let router = issuer.router();

    let wrong_password = send(
        &router,
        post_json("/v1/token/user", None, json!({ "name": "alice", "password": "nope" })),
    )
    .await;
    assert_eq!(wrong_password.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(wrong_password).await["message"], "failed to validate password");

    // An unknown name looks exactly like a wrong password
    let unknown_user = send(
        &router,
        post_json("/v1/token/user", None, json!({ "name": "carol", "password": PASSWORD })),
    )
    .await;
    assert_eq!(unknown_user.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(unknown_user).await["message"], "failed to validate password");

    let bad_body = send(&router, post_json("/v1/token/user", None, json!({ "name": 7 }))).await;
    assert_eq!(bad_body.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(bad_body).await["message"], "failed to load request body");
}

#[tokio::test]
async fn test_user_read_rejections_carry_bearer_challenge() {
    let issuer = Issuer::new();
    let router = issuer.router();

    for request in [
        get("/v1/token/user"),
        get_with_bearer("/v1/token/user", "not.a.token"),
    ] {
        let response = send(&router, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(body_json(response).await["message"], "failed to validate user token");
    }
}

#[tokio::test]
async fn test_signup_requires_owned_invite() {
    // GIVEN: an invite owned by alice
    let issuer = Issuer::new();
    let router = issuer.router();
    let invite = issuer.store.add_invite(&issuer.alice);

    let alice = login(&router, "alice", 600).await;
    let bob = login(&router, "bob", 600).await;

    // WHEN: bob asks for a signup token on alice's invite
    let response = send(
        &router,
        post_json("/v1/token/signup", Some(&bob.token), json!({ "inviteID": invite.id })),
    )
    .await;

    // THEN: it is forbidden
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // WHEN: alice asks
    let response = send(
        &router,
        post_json(
            "/v1/token/signup",
            Some(&alice.token),
            json!({ "inviteID": invite.id, "ttl": 60 }),
        ),
    )
    .await;

    // THEN: a signup token for the invite is created
    assert_eq!(response.status(), StatusCode::CREATED);
    let signup: TokenResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(signup.id, invite.id);

    // AND: it passes the signup read route but not the user one
    let ok = send(&router, get_with_bearer("/v1/token/signup", &signup.token)).await;
    assert_eq!(ok.status(), StatusCode::OK);
    let wrong_audience = send(&router, get_with_bearer("/v1/token/user", &signup.token)).await;
    assert_eq!(wrong_audience.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_failures() {
    let issuer = Issuer::new();
    let router = issuer.router();
    let alice = login(&router, "alice", 600).await;

    // No user token at all
    let response = send(
        &router,
        post_json("/v1/token/signup", None, json!({ "inviteID": "x" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Unknown invite
    let response = send(
        &router,
        post_json("/v1/token/signup", Some(&alice.token), json!({ "inviteID": "missing" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["message"], "failed to read invite");
}

#[tokio::test]
async fn test_relying_service_validates_through_live_authority() {
    // GIVEN: a key authority publishing the issuer's public key
    let issuer = Issuer::new();
    let address = spawn_authority(&issuer).await;

    // AND: a relying service mounting only the read routes over a validator cache
    let cache = ValidatorCache::builder()
        .with_client_config(ClientConfig {
            address,
            timeout: Duration::from_secs(5),
        })
        .build()
        .unwrap();
    let relying = TokenReader::new(&IssuerConfig::default(), Arc::new(cache.clone())).router();

    // WHEN: a token minted by the issuer is presented to the relying service
    let token = login(&issuer.router(), "alice", 600).await.token;
    let response = send(&relying, get_with_bearer("/v1/token/user", &token)).await;

    // THEN: it is accepted after fetching the key once
    assert_eq!(response.status(), StatusCode::OK);
    assert!(cache.contains_key(issuer.keys.public.key_id()));

    // AND: the relying side cannot mint tokens
    let response = send(
        &relying,
        post_json("/v1/token/user", None, json!({ "name": "alice", "password": PASSWORD })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_reader_from_config_warms_and_checks_both_audiences() {
    // GIVEN: a live authority and a reader configured against it
    let issuer = Issuer::new();
    let config = ReaderServiceConfig {
        cache: CacheConfig {
            client: ClientConfig {
                address: spawn_authority(&issuer).await,
                timeout: Duration::from_secs(5),
            },
            ..CacheConfig::default()
        },
        ..ReaderServiceConfig::default()
    };

    // WHEN: the reader is built
    let (reader, cache) = TokenReader::from_config(&config).await.unwrap();

    // THEN: the published key is cached before any token arrives
    assert_eq!(cache.item_count().await, 1);
    assert!(cache.contains_key(issuer.keys.public.key_id()));

    // AND: user and signup tokens pass only their own routes
    let router = issuer.router();
    let alice = login(&router, "alice", 600).await;
    let invite = issuer.store.add_invite(&issuer.alice);
    let response = send(
        &router,
        post_json("/v1/token/signup", Some(&alice.token), json!({ "inviteID": invite.id })),
    )
    .await;
    let signup: TokenResponse = serde_json::from_value(body_json(response).await).unwrap();

    let relying = reader.router();
    for (uri, token, expected) in [
        ("/v1/token/user", &alice.token, StatusCode::OK),
        ("/v1/token/signup", &signup.token, StatusCode::OK),
        ("/v1/token/user", &signup.token, StatusCode::UNAUTHORIZED),
        ("/v1/token/signup", &alice.token, StatusCode::UNAUTHORIZED),
    ] {
        let response = send(&relying, get_with_bearer(uri, token)).await;
        assert_eq!(response.status(), expected, "{uri}");
    }

    cache.close().await;
    assert_eq!(cache.item_count().await, 0);
}

#[tokio::test]
async fn test_reader_from_config_survives_unreachable_authority() {
    let config = ReaderServiceConfig {
        cache: CacheConfig {
            client: ClientConfig {
                address: "127.0.0.1:9".to_string(),
                timeout: Duration::from_millis(500),
            },
            ..CacheConfig::default()
        },
        ..ReaderServiceConfig::default()
    };

    let (reader, cache) = TokenReader::from_config(&config).await.unwrap();
    assert_eq!(cache.item_count().await, 0);

    // Tokens are rejected while the authority stays down
    let issuer = Issuer::new();
    let token = login(&issuer.router(), "alice", 600).await.token;
    let response = send(&reader.router(), get_with_bearer("/v1/token/user", &token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
