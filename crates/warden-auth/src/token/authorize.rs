//! Bearer authorization: extract, verify, apply the claims policy

use std::sync::Arc;

use http::HeaderMap;
use tracing::{debug, warn};

use super::Validate;
use super::claims::ClaimsPolicy;
use crate::bearer::bearer_token;
use crate::error::Result;

/// Authorizes requests for one audience.
///
/// Generic over the [`Validate`] capability, so the same authorizer serves an
/// issuing service (local [`Signer`](super::Signer)) and a relying service
/// ([`ValidatorCache`](crate::ValidatorCache)).
#[derive(Clone)]
pub struct Authorizer {
    policy: ClaimsPolicy,
    validator: Arc<dyn Validate>,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    /// Pair a policy with a validation capability
    pub fn new(policy: ClaimsPolicy, validator: Arc<dyn Validate>) -> Self {
        Self { policy, validator }
    }

    /// Policy in force
    pub fn policy(&self) -> &ClaimsPolicy {
        &self.policy
    }

    /// Validate `token` and apply the policy, returning the subject
    ///
    /// # Errors
    ///
    /// Returns the validation, network or claim error that rejected the token.
    pub async fn authorize_token(&self, token: &str) -> Result<String> {
        let claims = self.validator.validate(token).await.inspect_err(|e| {
            if e.is_network() {
                warn!(error = %e, failure = e.failure_kind(), "Token rejected, key authority unavailable");
            } else {
                debug!(error = %e, failure = e.failure_kind(), "Token rejected");
            }
        })?;

        let subject = self.policy.check(&claims).inspect_err(|e| {
            debug!(
                reason = %e,
                audience = self.policy.audience_name(),
                failure = "token",
                "Token claims rejected"
            );
        })?;

        Ok(subject.to_string())
    }

    /// Extract the bearer token from `headers` and authorize it
    ///
    /// # Errors
    ///
    /// Returns an authorization header error or any error from
    /// [`Authorizer::authorize_token`].
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<String> {
        let token = bearer_token(headers)?;
        self.authorize_token(token).await
    }
}
