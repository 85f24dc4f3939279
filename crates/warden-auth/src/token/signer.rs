//! Single-key sign and verify primitives
//!
//! Both types are immutable once built. A [`Validater`] verifies with the
//! algorithm it was bound to at construction and ignores whatever the token
//! header claims, which rules out algorithm confusion.

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::claims::StandardClaims;
use crate::error::{Error, Result, ValidationError};
use crate::secret::Key;

/// `typ` header stamped on every token
pub const TOKEN_TYPE: &str = "JWT";

/// Verifies tokens against exactly one public key and algorithm
#[derive(Clone)]
pub struct Validater {
    key_id: String,
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for Validater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validater")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Validater {
    /// Bind a validater to a public key
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless `key` is a public key.
    pub fn new(key: &Key) -> Result<Self> {
        if !key.is_public() {
            return Err(Error::configuration("key is not public"));
        }
        Self::bind(key)
    }

    // Skips the class check; symmetric keys verify with themselves.
    fn bind(key: &Key) -> Result<Self> {
        let decoding_key = key.material().decoding_key()?;

        // Time and audience rules belong to the claims policy
        let mut validation = Validation::new(key.algorithm());
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self {
            key_id: key.key_id().to_string(),
            algorithm: key.algorithm(),
            decoding_key,
            validation,
        })
    }

    /// Key id this validater is bound to
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm this validater is bound to
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Verify `token` and decode its payload as `C`
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed tokens, signatures that do
    /// not verify under the bound algorithm, or undecodable payloads.
    pub fn validate_as<C>(&self, token: &str) -> Result<C>
    where
        C: DeserializeOwned + Clone,
    {
        let data = decode::<C>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(key_id = %self.key_id, error = %e, failure = "token", "Token verification failed");
            Error::from(map_jwt_error(&e))
        })?;

        Ok(data.claims)
    }

    /// Verify `token` and decode its standard claims
    ///
    /// # Errors
    ///
    /// See [`Validater::validate_as`].
    pub fn validate_claims(&self, token: &str) -> Result<StandardClaims> {
        self.validate_as(token)
    }
}

/// Signs tokens with exactly one private key.
///
/// Carries the matching [`Validater`] derived once at construction so locally
/// issued tokens verify without a network round trip. That validater is kept
/// private; it must never be handed out as a general validater backed by
/// private material.
#[derive(Clone)]
pub struct Signer {
    encoding_key: EncodingKey,
    header: Header,
    validater: Validater,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("key_id", &self.validater.key_id)
            .field("algorithm", &self.header.alg)
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Bind a signer to a private (or symmetric) key
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless `key` can sign.
    pub fn new(key: &Key) -> Result<Self> {
        if !key.is_private() {
            return Err(Error::configuration("key is not private"));
        }

        let verifying = key.verifying_key();
        let validater = Validater::bind(&verifying)?;

        let mut header = Header::new(key.algorithm());
        header.kid = Some(key.key_id().to_string());
        header.typ = Some(TOKEN_TYPE.to_string());

        Ok(Self {
            encoding_key: key.material().encoding_key()?,
            header,
            validater,
        })
    }

    /// Key id stamped into every header
    pub fn key_id(&self) -> &str {
        self.validater.key_id()
    }

    /// Algorithm used for signing
    pub fn algorithm(&self) -> Algorithm {
        self.header.alg
    }

    /// Serialize `claims` and sign them into a compact token
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the claims cannot be serialized or
    /// the signing operation fails.
    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String> {
        encode(&self.header, claims, &self.encoding_key)
            .map_err(|e| Error::configuration(format!("failed to sign token: {e}")))
    }

    /// Verify a token with the derived validater
    ///
    /// # Errors
    ///
    /// See [`Validater::validate_as`].
    pub fn validate_as<C>(&self, token: &str) -> Result<C>
    where
        C: DeserializeOwned + Clone,
    {
        self.validater.validate_as(token)
    }

    /// Verify a token with the derived validater and decode standard claims
    ///
    /// # Errors
    ///
    /// See [`Validater::validate_as`].
    pub fn validate_claims(&self, token: &str) -> Result<StandardClaims> {
        self.validater.validate_as(token)
    }
}

fn map_jwt_error(err: &jsonwebtoken::errors::Error) -> ValidationError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
            ValidationError::Signature(err.to_string())
        }
        _ => ValidationError::MalformedToken(err.to_string()),
    }
}
