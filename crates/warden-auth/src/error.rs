//! Error types for warden-auth
//!
//! Three tiers, matching how callers react to them:
//! - Configuration: bad key source, ambiguous/missing key, unsupported key type.
//!   Fatal at startup.
//! - Network: the key authority could not be reached or answered badly.
//! - Validation: the token itself is unacceptable (malformed, wrong key,
//!   bad signature, claims policy violation).
//!
//! Network and validation failures both surface externally as the same terse
//! "unauthorized" rejection (see [`Error::public_message`]); the distinction
//! only survives in logs.

use thiserror::Error;

/// Result type for warden-auth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for warden-auth
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid key or service configuration
    #[error("configuration error: {message}")]
    Configuration {
        /// What was wrong
        message: String,
    },

    /// Key authority unreachable, non-2xx response, or undecodable body
    #[error("network error: {message}")]
    Network {
        /// What failed
        message: String,
        /// HTTP status when the authority answered with a non-success code
        status: Option<u16>,
    },

    /// Token rejected
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    /// Create a network error carrying the authority's response status
    pub fn network_with_status(message: impl Into<String>, status: u16) -> Self {
        Self::Network {
            message: message.into(),
            status: Some(status),
        }
    }

    /// True for configuration errors
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// True for key authority failures
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// True for token rejections
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// The claim policy failure, if this is one
    pub fn claim_error(&self) -> Option<&ClaimError> {
        match self {
            Self::Validation(ValidationError::Claim(claim)) => Some(claim),
            _ => None,
        }
    }

    /// Terse message safe to return to an external caller.
    ///
    /// Never includes key ids, claim values, or upstream addresses.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "service misconfigured",
            Self::Network { .. } | Self::Validation(_) => "unauthorized",
        }
    }

    /// Short label used as the `failure` field in log records
    pub fn failure_kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Network { .. } => "network",
            Self::Validation(_) => "token",
        }
    }
}

impl From<ClaimError> for Error {
    fn from(err: ClaimError) -> Self {
        Self::Validation(ValidationError::Claim(err))
    }
}

/// Reasons a presented token is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// No `Authorization` header (or an empty one)
    #[error("empty authorization header")]
    MissingAuthorization,

    /// `Authorization` header is not exactly `<scheme> <token>`
    #[error("invalid authorization header format")]
    InvalidAuthorizationFormat,

    /// `Authorization` header uses a scheme other than `Bearer`
    #[error("invalid authorization header authentication scheme: {0}")]
    InvalidAuthorizationScheme(String),

    /// Token could not be parsed (separators, base64, JSON, missing kid)
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The authority answered with a key whose own id differs from the one requested
    #[error("received mismatched key id: requested '{requested}', received '{received}'")]
    KeyIdMismatch {
        /// Key id taken from the token header
        requested: String,
        /// Key id reported by the fetched key
        received: String,
    },

    /// Fetched key is unusable for validation (not public, no id, bad algorithm)
    #[error("invalid validation key: {0}")]
    InvalidKey(String),

    /// Signature did not verify under the bound key and algorithm
    #[error("signature verification failed: {0}")]
    Signature(String),

    /// Claims policy violation
    #[error(transparent)]
    Claim(#[from] ClaimError),
}

/// Ordered claims policy failures.
///
/// Each variant names the claim at fault; checks run in declaration order and
/// the first failure wins.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimError {
    /// `sub` absent or empty
    #[error("sub: missing subject")]
    MissingSubject,
    /// `iss` absent or empty
    #[error("iss: missing issuer")]
    MissingIssuer,
    /// `aud` absent
    #[error("aud: missing audience")]
    MissingAudience,
    /// `exp` absent
    #[error("exp: missing expiration")]
    MissingExpiration,
    /// `iss` not in the allowed issuer set
    #[error("iss: not from an allowed issuer")]
    IssuerNotAllowed,
    /// Required audience name not in `aud`
    #[error("aud: not for this audience")]
    AudienceMismatch,
    /// `exp` in the past
    #[error("exp: expired")]
    Expired,
    /// `nbf` in the future
    #[error("nbf: not yet valid")]
    NotYetValid,
}

impl ClaimError {
    /// Registered claim name this failure refers to
    pub fn claim(self) -> &'static str {
        match self {
            Self::MissingSubject => "sub",
            Self::MissingIssuer | Self::IssuerNotAllowed => "iss",
            Self::MissingAudience | Self::AudienceMismatch => "aud",
            Self::MissingExpiration | Self::Expired => "exp",
            Self::NotYetValid => "nbf",
        }
    }
}
