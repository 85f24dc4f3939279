//! `Authorization: Bearer` extraction

use http::HeaderMap;
use http::header::AUTHORIZATION;

use crate::error::{Result, ValidationError};

/// Authentication scheme accepted in the `Authorization` header
pub const BEARER_SCHEME: &str = "Bearer";

/// Pull the bearer token out of request headers
///
/// # Errors
///
/// Fails with a distinct [`ValidationError`] for a missing header, a header
/// that is not exactly two fields, or a scheme other than `Bearer`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(ValidationError::MissingAuthorization)?
        .to_str()
        .map_err(|_| ValidationError::InvalidAuthorizationFormat)?;

    parse_bearer(value)
}

/// Parse an `Authorization` header value
///
/// # Errors
///
/// See [`bearer_token`].
pub fn parse_bearer(value: &str) -> Result<&str> {
    if value.is_empty() {
        return Err(ValidationError::MissingAuthorization.into());
    }

    let mut fields = value.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(BEARER_SCHEME), Some(token), None) => Ok(token),
        (Some(scheme), Some(_), None) => {
            Err(ValidationError::InvalidAuthorizationScheme(scheme.to_string()).into())
        }
        _ => Err(ValidationError::InvalidAuthorizationFormat.into()),
    }
}
