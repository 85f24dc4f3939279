//! # Warden Auth - Key Distribution and Token Validation
//!
//! A central key authority holds asymmetric signing keys and publishes the
//! public halves. Issuing services mint compact signed tokens; relying
//! services validate them without ever holding a private key, by fetching
//! and locally caching the authority's public keys.
//!
//! ## Architecture
//!
//! - [`secret`] - Key sources (generate/inline/env/file) and the key factory
//!   that classifies material and derives RFC 7638 key ids
//! - [`token`] - Immutable [`Signer`] / [`Validater`] primitives, standard
//!   claims, claim generation and the ordered claims policy
//! - [`jwks`] - [`KeySetClient`] for the authority endpoints and the
//!   TTL/LRU [`ValidatorCache`]
//! - [`bearer`] - `Authorization: Bearer` extraction
//! - [`version`] - Build metadata passed explicitly to reporting components
//!
//! ## Flow
//!
//! ```text
//!  authority                 issuer                      relying service
//!  KeySource ─► KeyFactory   Signer + ClaimsIssuer       ValidatorCache ─► ClaimsPolicy
//!       │                         │                            ▲
//!       └── GET /v1/secret/* ─────┼────────────────────────────┘ (fetch on miss)
//!                                 └──── token ───────────────► bearer header
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use warden_auth::{ClaimsIssuer, Key, KeySource, KeyType, Signer, Validater};
//! use jsonwebtoken::Algorithm;
//!
//! # fn main() -> warden_auth::Result<()> {
//! let store = KeySource::Generate(KeyType::Ec).store()?;
//! let private = Key::new_private(Algorithm::ES256, &store)?;
//! let public = Key::new_public(Algorithm::ES256, &store)?;
//! assert_eq!(private.key_id(), public.key_id());
//!
//! let signer = Signer::new(&private)?;
//! let claims = ClaimsIssuer::new("warden", Duration::from_secs(3600), ["user"])
//!     .generate("user-123", Duration::from_secs(60))?;
//! let token = signer.sign(&claims)?;
//!
//! let validater = Validater::new(&public)?;
//! let decoded = validater.validate_claims(&token)?;
//! assert_eq!(decoded, claims);
//! # Ok(())
//! # }
//! ```

pub mod bearer;
pub mod clock;
pub mod error;
pub mod jwks;
pub mod secret;
pub mod token;
pub mod version;

#[doc(inline)]
pub use bearer::{bearer_token, parse_bearer};
#[doc(inline)]
pub use clock::{Clock, ManualClock, SystemClock};
#[doc(inline)]
pub use error::{ClaimError, Error, Result, ValidationError};
#[doc(inline)]
pub use jwks::{CacheConfig, ClientConfig, KeySetClient, ValidatorCache, ValidatorCacheBuilder};
#[doc(inline)]
pub use secret::{InlineKey, Key, KeyClass, KeyMaterial, KeySource, KeyStore, KeyType, SecretConfig};
#[doc(inline)]
pub use token::{
    Authorizer, ClaimsIssuer, ClaimsPolicy, IssuerConfig, PolicyConfig, Signer, StandardClaims,
    Validate, Validater,
};
#[doc(inline)]
pub use version::BuildInfo;

/// Version segment shared by every authority route (`/v1/...`)
pub const API_VERSION: &str = "v1";
