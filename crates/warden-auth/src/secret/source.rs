//! Key sources and their configuration
//!
//! A [`KeySource`] is one of exactly four origins for PEM key material. It is
//! serialized as an adjacently tagged object so configuration files read
//! naturally:
//!
//! ```json
//! { "algorithm": "ES256", "type": "file", "data": "/etc/warden/signing.pem" }
//! ```

use std::fmt;
use std::path::PathBuf;

use jsonwebtoken::Algorithm;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use super::key::Key;
use super::material::{KeyMaterial, KeyType};
use crate::error::{Error, Result};

/// Marker rendered in place of inline key material
pub const REDACTED: &str = "<REDACTED>";

/// Decoded PEM key blocks, in input order
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    blocks: Vec<KeyMaterial>,
}

impl KeyStore {
    /// Decode every key-bearing PEM block in `bytes`.
    ///
    /// Blocks that carry no key (certificates, curve parameters) are skipped.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the PEM framing is invalid or a key
    /// block cannot be decoded.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let parsed = pem::parse_many(bytes)
            .map_err(|e| Error::configuration(format!("failed to parse PEM data: {e}")))?;

        let mut blocks = Vec::with_capacity(parsed.len());
        for block in &parsed {
            match KeyMaterial::from_pem_block(block.tag(), block.contents())? {
                Some(material) => blocks.push(material),
                None => debug!(label = block.tag(), "Skipping PEM block without key material"),
            }
        }

        Ok(Self { blocks })
    }

    /// Wrap already decoded material
    pub fn from_material(blocks: impl IntoIterator<Item = KeyMaterial>) -> Self {
        Self {
            blocks: blocks.into_iter().collect(),
        }
    }

    /// Iterate over the decoded blocks
    pub fn iter(&self) -> impl Iterator<Item = &KeyMaterial> {
        self.blocks.iter()
    }

    /// Number of decoded blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True when no key blocks were found
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Inline PEM data; never echoed back out
#[derive(Clone)]
pub struct InlineKey(SecretString);

impl InlineKey {
    /// Wrap PEM text
    pub fn new(pem: impl Into<String>) -> Self {
        Self(SecretString::new(pem.into()))
    }

    fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for InlineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InlineKey").field(&REDACTED).finish()
    }
}

impl fmt::Display for InlineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for InlineKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for InlineKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Origin of key material
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum KeySource {
    /// Fresh key of the given type
    Generate(KeyType),
    /// PEM carried in the configuration itself
    Inline(InlineKey),
    /// PEM read from the named environment variable
    Env(String),
    /// PEM read from a file
    File(PathBuf),
}

impl Default for KeySource {
    fn default() -> Self {
        Self::Generate(KeyType::Rsa)
    }
}

impl KeySource {
    /// Produce the decoded key blocks
    ///
    /// # Errors
    ///
    /// Returns a configuration error if generation fails, the variable is
    /// unset, the file cannot be read, or the PEM data is invalid.
    pub fn store(&self) -> Result<KeyStore> {
        match self {
            Self::Generate(key_type) => {
                debug!(key_type = %key_type, "Generating key");
                Ok(KeyStore::from_material([KeyMaterial::generate(*key_type)?]))
            }
            Self::Inline(inline) => KeyStore::decode(inline.expose().as_bytes()),
            Self::Env(name) => {
                let value = std::env::var(name)
                    .map_err(|_| Error::configuration(format!("env: variable '{name}' not set")))?;
                KeyStore::decode(value.as_bytes())
            }
            Self::File(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    Error::configuration(format!("file: failed to read '{}': {e}", path.display()))
                })?;
                KeyStore::decode(&bytes)
            }
        }
    }

    /// Short variant name as used in the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generate(_) => "generate",
            Self::Inline(_) => "inline",
            Self::Env(_) => "env",
            Self::File(_) => "file",
        }
    }
}

/// Signing algorithm plus the source of its key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawSecretConfig")]
pub struct SecretConfig {
    /// Algorithm the loaded key is stamped with
    pub algorithm: Algorithm,
    /// Where the key comes from
    #[serde(flatten)]
    pub source: KeySource,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::RS256,
            source: KeySource::default(),
        }
    }
}

impl SecretConfig {
    /// Pair an algorithm with a source
    pub fn new(algorithm: Algorithm, source: KeySource) -> Self {
        Self { algorithm, source }
    }

    /// Load the source and build the single private (signing) key
    ///
    /// # Errors
    ///
    /// Propagates source and key factory configuration errors.
    pub fn private_key(&self) -> Result<Key> {
        Key::new_private(self.algorithm, &self.source.store()?)
    }

    /// Load the source and build the single public (verification) key
    ///
    /// # Errors
    ///
    /// Propagates source and key factory configuration errors.
    pub fn public_key(&self) -> Result<Key> {
        Key::new_public(self.algorithm, &self.source.store()?)
    }
}

#[derive(Deserialize)]
struct RawSecretConfig {
    #[serde(default)]
    algorithm: Option<Algorithm>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl TryFrom<RawSecretConfig> for SecretConfig {
    type Error = String;

    fn try_from(raw: RawSecretConfig) -> std::result::Result<Self, Self::Error> {
        let mut config = Self::default();
        if let Some(algorithm) = raw.algorithm {
            config.algorithm = algorithm;
        }

        match raw.kind.filter(|kind| !kind.is_empty()) {
            None if raw.data.is_some() => return Err("secret: missing type".to_string()),
            None => {}
            Some(kind) => {
                let tagged = serde_json::json!({ "type": kind, "data": raw.data });
                config.source = serde_json::from_value(tagged).map_err(|e| format!("secret: {e}"))?;
            }
        }

        Ok(config)
    }
}
