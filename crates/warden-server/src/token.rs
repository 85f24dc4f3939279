//! Token issuing service
//!
//! Routes under `/v1/token`:
//!
//! - `POST /user` logs a user in and returns a `user` token
//! - `GET /user` checks a `user` bearer token
//! - `POST /signup` exchanges a `user` token and an owned invite for a
//!   `signup` token
//! - `GET /signup` checks a `signup` bearer token
//!
//! The read routes only need the [`Validate`] capability, so [`TokenReader`]
//! can be mounted on its own by a relying service backed by a
//! [`ValidatorCache`] (see [`TokenReader::from_config`]).

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{FromRef, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};
use warden_auth::token::DEFAULT_AUDIENCE_SIGNUP;
use warden_auth::{
    API_VERSION, Authorizer, CacheConfig, ClaimsIssuer, ClaimsPolicy, IssuerConfig, PolicyConfig,
    SecretConfig, Signer, Validate, ValidatorCache,
};

use crate::error::HttpError;
use crate::store::{MemoryStoreConfig, Store, StoreError};

/// Address the issuer listens on when none is configured
pub const DEFAULT_ADDRESS: &str = "localhost:8002";
/// Address a relying reader listens on when none is configured
pub const DEFAULT_READER_ADDRESS: &str = "localhost:8003";

/// Route prefix below the API version
pub const PATH_BASE: &str = "token";
/// Login token route
pub const PATH_USER: &str = "user";
/// Signup token route
pub const PATH_SIGNUP: &str = "signup";

/// Token issuer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenServiceConfig {
    /// Listen address
    pub address: String,
    /// Signing key
    pub secret: SecretConfig,
    /// Claims stamped into issued tokens
    pub issuer: IssuerConfig,
    /// Users and invites loaded into the in-process store
    pub store: MemoryStoreConfig,
}

impl Default for TokenServiceConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            secret: SecretConfig::default(),
            issuer: IssuerConfig::default(),
            store: MemoryStoreConfig::default(),
        }
    }
}

/// Relying-service configuration: read routes over a validator cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderServiceConfig {
    /// Listen address
    pub address: String,
    /// Validator cache and the authority it fetches from
    pub cache: CacheConfig,
    /// Claims policy for `user` tokens
    pub user: PolicyConfig,
    /// Claims policy for `signup` tokens
    pub signup: PolicyConfig,
}

impl Default for ReaderServiceConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_READER_ADDRESS.to_string(),
            cache: CacheConfig::default(),
            user: PolicyConfig::default(),
            signup: PolicyConfig {
                audience_name: DEFAULT_AUDIENCE_SIGNUP.to_string(),
                ..PolicyConfig::default()
            },
        }
    }
}

/// Body of `POST /v1/token/user`
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTokenRequest {
    pub name: String,
    pub password: String,
    /// Requested lifetime in seconds; zero or over the maximum gets the maximum
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default)]
    pub ttl: Duration,
}

/// Body of `POST /v1/token/signup`
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupTokenRequest {
    #[serde(rename = "inviteID")]
    pub invite_id: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default)]
    pub ttl: Duration,
}

/// Issued token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Subject the token was issued for
    pub id: String,
    pub token: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expiration: DateTime<Utc>,
}

/// Bearer checks for the two token audiences
#[derive(Debug, Clone)]
pub struct TokenReader {
    user: Arc<Authorizer>,
    signup: Arc<Authorizer>,
}

impl TokenReader {
    /// Accept tokens from `config`'s issuer, verified through `validator`
    pub fn new(config: &IssuerConfig, validator: Arc<dyn Validate>) -> Self {
        let names = &config.audience_names;
        Self::with_policies(config.policy(&names.user), config.policy(&names.signup), validator)
    }

    /// Check `user` and `signup` tokens against their own policies
    pub fn with_policies(user: ClaimsPolicy, signup: ClaimsPolicy, validator: Arc<dyn Validate>) -> Self {
        Self {
            user: Arc::new(Authorizer::new(user, Arc::clone(&validator))),
            signup: Arc::new(Authorizer::new(signup, validator)),
        }
    }

    /// Reader for a relying service, backed by a cache built from `config`
    ///
    /// The cache is warmed with the authority's full key set first. A failed
    /// warm-up is logged and keys are then fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the cache cannot be built.
    pub async fn from_config(config: &ReaderServiceConfig) -> warden_auth::Result<(Self, ValidatorCache)> {
        let cache = ValidatorCache::from_config(&config.cache)?;
        if let Err(e) = cache.warm().await {
            warn!(
                error = %e,
                authority = %config.cache.client.address,
                "Failed to warm validater cache"
            );
        }

        let reader = Self::with_policies(
            config.user.policy(),
            config.signup.policy(),
            Arc::new(cache.clone()),
        );
        Ok((reader, cache))
    }

    /// Read-only routes: `GET /v1/token/user` and `GET /v1/token/signup`
    pub fn router(self) -> Router {
        Router::new()
            .route(&route(PATH_USER), get(read_user))
            .route(&route(PATH_SIGNUP), get(read_signup))
            .with_state(self)
    }

    async fn authorize_user(&self, headers: &HeaderMap) -> Result<String, HttpError> {
        self.user
            .authorize(headers)
            .await
            .map_err(|e| HttpError::unauthorized(e, "failed to validate user token"))
    }

    async fn authorize_signup(&self, headers: &HeaderMap) -> Result<String, HttpError> {
        self.signup
            .authorize(headers)
            .await
            .map_err(|e| HttpError::unauthorized(e, "failed to validate signup token"))
    }
}

/// Token issuer: signs login and signup tokens
pub struct TokenServer {
    signer: Signer,
    store: Arc<dyn Store>,
    user_claims: ClaimsIssuer,
    signup_claims: ClaimsIssuer,
    reader: TokenReader,
}

impl TokenServer {
    /// Issue tokens with `signer`, checking them with the same key
    pub fn new(config: &IssuerConfig, signer: Signer, store: Arc<dyn Store>) -> Self {
        let reader = TokenReader::new(config, Arc::new(signer.clone()));
        let names = &config.audience_names;

        info!(
            key_id = signer.key_id(),
            issuer = %config.issuer_name,
            max_ttl_secs = config.max_ttl.as_secs(),
            "Token issuer ready"
        );

        Self {
            user_claims: config.issuer(&names.user),
            signup_claims: config.issuer(&names.signup),
            signer,
            store,
            reader,
        }
    }

    /// Load the signing key from `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key cannot be loaded or cannot sign.
    pub fn from_config(config: &TokenServiceConfig, store: Arc<dyn Store>) -> warden_auth::Result<Self> {
        let signer = Signer::new(&config.secret.private_key()?)?;
        Ok(Self::new(&config.issuer, signer, store))
    }

    /// All four `/v1/token` routes
    pub fn router(self) -> Router {
        let state = TokenState {
            reader: self.reader.clone(),
            server: Arc::new(self),
        };

        Router::new()
            .route(&route(PATH_USER), get(read_user).post(create_user))
            .route(&route(PATH_SIGNUP), get(read_signup).post(create_signup))
            .with_state(state)
    }

    async fn login(&self, request: UserTokenRequest) -> Result<TokenResponse, HttpError> {
        // Unknown names and wrong passwords are indistinguishable to the caller
        let user = match self.store.lookup_user(&request.name).await {
            Ok(user) => user,
            Err(e @ StoreError::NotFound(_)) => {
                return Err(HttpError::forbidden(e, "failed to validate password"));
            }
            Err(e) => return Err(HttpError::store(e, "failed to lookup user")),
        };

        let matches = user
            .password_hash
            .verify(&request.password)
            .await
            .map_err(|e| HttpError::internal(e, "failed to validate password"))?;
        if !matches {
            return Err(HttpError::forbidden("password mismatch", "failed to validate password"));
        }

        self.issue(&self.user_claims, user.id, request.ttl)
            .map_err(|e| HttpError::internal(e, "failed to sign token claims"))
    }

    async fn signup(
        &self,
        headers: &HeaderMap,
        payload: Result<Json<SignupTokenRequest>, JsonRejection>,
    ) -> Result<TokenResponse, HttpError> {
        let user_id = self.reader.authorize_user(headers).await?;
        let Json(request) = payload?;

        let invite = self
            .store
            .read_invite(&request.invite_id)
            .await
            .map_err(|e| HttpError::store(e, "failed to read invite"))?;

        if invite.owner_id != user_id {
            return Err(HttpError::forbidden("forbidden", "failed to read invite"));
        }

        self.issue(&self.signup_claims, invite.id, request.ttl)
            .map_err(|e| HttpError::internal(e, "failed to sign signup token claims"))
    }

    fn issue(&self, claims: &ClaimsIssuer, subject: String, ttl: Duration) -> warden_auth::Result<TokenResponse> {
        let claims = claims.generate(subject.clone(), ttl)?;
        let token = self.signer.sign(&claims)?;
        let expiration = claims
            .expiration
            .ok_or_else(|| warden_auth::Error::configuration("generated claims lack expiration"))?;

        Ok(TokenResponse {
            id: subject,
            token,
            expiration,
        })
    }
}

#[derive(Clone, FromRef)]
struct TokenState {
    server: Arc<TokenServer>,
    reader: TokenReader,
}

fn route(leaf: &str) -> String {
    format!("/{API_VERSION}/{PATH_BASE}/{leaf}")
}

fn created(body: &TokenResponse) -> Result<Response, HttpError> {
    let bytes = serde_json::to_vec(body).map_err(HttpError::encode)?;
    let mut response = (StatusCode::CREATED, bytes).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    Ok(response)
}

async fn create_user(
    State(server): State<Arc<TokenServer>>,
    payload: Result<Json<UserTokenRequest>, JsonRejection>,
) -> Result<Response, HttpError> {
    let Json(request) = payload?;
    created(&server.login(request).await?)
}

async fn read_user(State(reader): State<TokenReader>, headers: HeaderMap) -> Result<StatusCode, HttpError> {
    reader.authorize_user(&headers).await?;
    Ok(StatusCode::OK)
}

async fn create_signup(
    State(server): State<Arc<TokenServer>>,
    headers: HeaderMap,
    payload: Result<Json<SignupTokenRequest>, JsonRejection>,
) -> Result<Response, HttpError> {
    created(&server.signup(&headers, payload).await?)
}

async fn read_signup(State(reader): State<TokenReader>, headers: HeaderMap) -> Result<StatusCode, HttpError> {
    reader.authorize_signup(&headers).await?;
    Ok(StatusCode::OK)
}
