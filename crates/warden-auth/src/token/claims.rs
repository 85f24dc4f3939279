//! Standard claims, claim generation and the ordered claims policy

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{DurationSeconds, serde_as};

use crate::clock::{Clock, SystemClock};
use crate::error::{ClaimError, Error, Result};

/// Issuer name stamped on generated tokens by default
pub const DEFAULT_ISSUER_NAME: &str = "warden";
/// Audience of login tokens
pub const DEFAULT_AUDIENCE_USER: &str = "user";
/// Audience of signup tokens
pub const DEFAULT_AUDIENCE_SIGNUP: &str = "signup";
/// Upper bound on generated token lifetimes
pub const DEFAULT_MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Registered claims carried in every token.
///
/// Time fields are numeric dates (integer seconds since the epoch); absent
/// claims are omitted from the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardClaims {
    /// Issuer (`iss`)
    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Subject (`sub`)
    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Token id (`jti`)
    #[serde(rename = "jti", default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,

    /// Audience set (`aud`); accepts a single string or an array
    #[serde(
        rename = "aud",
        default,
        deserialize_with = "string_or_set",
        skip_serializing_if = "Option::is_none"
    )]
    pub audience: Option<BTreeSet<String>>,

    /// Expiration (`exp`)
    #[serde(
        rename = "exp",
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration: Option<DateTime<Utc>>,

    /// Not before (`nbf`)
    #[serde(
        rename = "nbf",
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub not_before: Option<DateTime<Utc>>,

    /// Issued at (`iat`)
    #[serde(
        rename = "iat",
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub issued_at: Option<DateTime<Utc>>,
}

fn string_or_set<'de, D>(deserializer: D) -> std::result::Result<Option<BTreeSet<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audience {
        One(String),
        Many(BTreeSet<String>),
    }

    Ok(Option::<Audience>::deserialize(deserializer)?.map(|aud| match aud {
        Audience::One(name) => BTreeSet::from([name]),
        Audience::Many(names) => names,
    }))
}

fn present(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

/// Builds claims for newly issued tokens
#[derive(Debug, Clone)]
pub struct ClaimsIssuer {
    issuer_name: String,
    max_ttl: Duration,
    audience: BTreeSet<String>,
    clock: Arc<dyn Clock>,
}

impl ClaimsIssuer {
    /// Issuer stamping `issuer_name` and `audience`, with lifetimes capped at `max_ttl`
    pub fn new<I, S>(issuer_name: impl Into<String>, max_ttl: Duration, audience: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            issuer_name: issuer_name.into(),
            max_ttl,
            audience: audience.into_iter().map(Into::into).collect(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Read time from `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Lifetime actually granted for a requested `ttl`.
    ///
    /// Zero or anything above the maximum is clamped to the maximum, never
    /// rejected.
    pub fn effective_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() || ttl > self.max_ttl {
            self.max_ttl
        } else {
            ttl
        }
    }

    /// Claims for `subject` valid from now for the effective `ttl`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the maximum lifetime is out of the
    /// representable date range.
    pub fn generate(&self, subject: impl Into<String>, ttl: Duration) -> Result<StandardClaims> {
        let now = self.clock.now();
        let now = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);

        let expiration = TimeDelta::from_std(self.effective_ttl(ttl))
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| Error::configuration("token lifetime out of range"))?;

        Ok(StandardClaims {
            issuer: Some(self.issuer_name.clone()),
            subject: Some(subject.into()),
            audience: Some(self.audience.clone()),
            expiration: Some(expiration),
            issued_at: Some(now),
            ..StandardClaims::default()
        })
    }
}

/// Ordered claims policy enforced after signature verification.
///
/// Checks run in a fixed order and the first failure wins:
/// subject, issuer, audience and expiration presence; issuer allowance;
/// audience membership; expiration; not-before.
#[derive(Debug, Clone)]
pub struct ClaimsPolicy {
    allowed_issuers: BTreeSet<String>,
    audience_name: String,
    clock: Arc<dyn Clock>,
}

impl ClaimsPolicy {
    /// Policy accepting tokens from `allowed_issuers` addressed to `audience_name`
    pub fn new<I, S>(allowed_issuers: I, audience_name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_issuers: allowed_issuers.into_iter().map(Into::into).collect(),
            audience_name: audience_name.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Read time from `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Audience this policy requires
    pub fn audience_name(&self) -> &str {
        &self.audience_name
    }

    /// Apply the policy, returning the subject on success
    ///
    /// # Errors
    ///
    /// Returns the first [`ClaimError`] encountered.
    pub fn check<'a>(&self, claims: &'a StandardClaims) -> std::result::Result<&'a str, ClaimError> {
        let subject = match claims.subject.as_deref() {
            Some(subject) if !subject.is_empty() => subject,
            _ => return Err(ClaimError::MissingSubject),
        };
        if !present(claims.issuer.as_ref()) {
            return Err(ClaimError::MissingIssuer);
        }
        let Some(audience) = claims.audience.as_ref() else {
            return Err(ClaimError::MissingAudience);
        };
        let Some(expiration) = claims.expiration else {
            return Err(ClaimError::MissingExpiration);
        };

        if !claims
            .issuer
            .as_ref()
            .is_some_and(|iss| self.allowed_issuers.contains(iss))
        {
            return Err(ClaimError::IssuerNotAllowed);
        }
        if !audience.contains(&self.audience_name) {
            return Err(ClaimError::AudienceMismatch);
        }

        let now = self.clock.now();
        if now > expiration {
            return Err(ClaimError::Expired);
        }
        if claims.not_before.is_some_and(|nbf| now < nbf) {
            return Err(ClaimError::NotYetValid);
        }

        Ok(subject)
    }
}

/// Relying-side claims policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Issuers whose tokens are accepted
    pub allowed_issuers: BTreeSet<String>,
    /// Audience name that must appear in `aud`
    pub audience_name: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_issuers: BTreeSet::from([DEFAULT_ISSUER_NAME.to_string()]),
            audience_name: DEFAULT_AUDIENCE_USER.to_string(),
        }
    }
}

impl PolicyConfig {
    /// Build the policy
    pub fn policy(&self) -> ClaimsPolicy {
        ClaimsPolicy::new(self.allowed_issuers.iter().cloned(), self.audience_name.clone())
    }
}

/// Audience names per token purpose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudienceNames {
    /// Login tokens
    pub user: String,
    /// Signup tokens
    pub signup: String,
}

impl Default for AudienceNames {
    fn default() -> Self {
        Self {
            user: DEFAULT_AUDIENCE_USER.to_string(),
            signup: DEFAULT_AUDIENCE_SIGNUP.to_string(),
        }
    }
}

/// Issuing-side claims configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Value stamped into `iss`
    pub issuer_name: String,
    /// Longest lifetime ever granted, in seconds
    #[serde_as(as = "DurationSeconds<u64>")]
    pub max_ttl: Duration,
    /// Audience per token purpose
    pub audience_names: AudienceNames,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            issuer_name: DEFAULT_ISSUER_NAME.to_string(),
            max_ttl: DEFAULT_MAX_TTL,
            audience_names: AudienceNames::default(),
        }
    }
}

impl IssuerConfig {
    /// Claims generator for tokens addressed to `audience`
    pub fn issuer(&self, audience: &str) -> ClaimsIssuer {
        ClaimsIssuer::new(self.issuer_name.clone(), self.max_ttl, [audience])
    }

    /// Policy accepting this issuer's own tokens addressed to `audience`
    pub fn policy(&self, audience: &str) -> ClaimsPolicy {
        ClaimsPolicy::new([self.issuer_name.clone()], audience)
    }
}
