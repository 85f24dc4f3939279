//! Token primitives and claims
//!
//! - [`Signer`] / [`Validater`]: immutable single-key sign and verify
//! - [`StandardClaims`], [`ClaimsIssuer`], [`ClaimsPolicy`]: claim generation and enforcement
//! - [`Authorizer`]: bearer header to authorized subject
//! - [`Validate`]: the one-method capability shared by every verifier

mod authorize;
mod claims;
mod signer;

use async_trait::async_trait;

pub use authorize::Authorizer;
pub use claims::{
    AudienceNames, ClaimsIssuer, ClaimsPolicy, DEFAULT_AUDIENCE_SIGNUP, DEFAULT_AUDIENCE_USER,
    DEFAULT_ISSUER_NAME, DEFAULT_MAX_TTL, IssuerConfig, PolicyConfig, StandardClaims,
};
pub use signer::{Signer, TOKEN_TYPE, Validater};

use crate::error::Result;

/// Anything that can verify a token and hand back its standard claims
#[async_trait]
pub trait Validate: Send + Sync {
    /// Verify `token` and decode its claims
    async fn validate(&self, token: &str) -> Result<StandardClaims>;
}

#[async_trait]
impl Validate for Validater {
    async fn validate(&self, token: &str) -> Result<StandardClaims> {
        self.validate_claims(token)
    }
}

#[async_trait]
impl Validate for Signer {
    async fn validate(&self, token: &str) -> Result<StandardClaims> {
        self.validate_claims(token)
    }
}
