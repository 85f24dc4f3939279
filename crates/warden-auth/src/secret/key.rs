//! Key factory
//!
//! Turns a [`KeyStore`] into exactly one [`Key`] of the requested class,
//! stamped with its algorithm, thumbprint key id, `use=sig` and key operations.

use jsonwebtoken::Algorithm;
use jsonwebtoken::jwk::{CommonParameters, Jwk, KeyAlgorithm, KeyOperations, PublicKeyUse};

use super::material::{KeyClass, KeyMaterial, KeyType};
use super::source::KeyStore;
use crate::error::{Error, Result};

/// A single classified key with its JWK metadata
#[derive(Debug, Clone)]
pub struct Key {
    material: KeyMaterial,
    algorithm: Algorithm,
    key_id: String,
    key_ops: Vec<KeyOperations>,
}

impl Key {
    /// Build the signing key held in `store`.
    ///
    /// Private and symmetric blocks qualify. Blocks are deduplicated by
    /// thumbprint; exactly one distinct key must remain. Key ops are
    /// `[sign, verify]`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no or several qualifying keys exist,
    /// or when `algorithm` does not fit the key type.
    pub fn new_private(algorithm: Algorithm, store: &KeyStore) -> Result<Self> {
        let material = single(store.iter().filter(|m| m.is_private()).cloned())?;
        Self::stamp(
            material,
            algorithm,
            vec![KeyOperations::Sign, KeyOperations::Verify],
        )
    }

    /// Build the verification key for `store`.
    ///
    /// Public blocks qualify, as do the public halves derived from any private
    /// blocks. Symmetric material never qualifies. Key ops are `[verify]`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no or several qualifying keys exist,
    /// or when `algorithm` does not fit the key type.
    pub fn new_public(algorithm: Algorithm, store: &KeyStore) -> Result<Self> {
        let candidates = store
            .iter()
            .filter_map(KeyMaterial::to_public)
            .filter(KeyMaterial::is_public);
        let material = single(candidates)?;
        Self::stamp(material, algorithm, vec![KeyOperations::Verify])
    }

    fn stamp(material: KeyMaterial, algorithm: Algorithm, key_ops: Vec<KeyOperations>) -> Result<Self> {
        check_algorithm(algorithm, material.key_type())?;
        Ok(Self {
            key_id: material.thumbprint(),
            material,
            algorithm,
            key_ops,
        })
    }

    /// Rebuild a key received from the authority.
    ///
    /// The JWK must name its algorithm. A missing `kid` yields an empty key
    /// id, which callers are expected to reject.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unsupported algorithms, key types or
    /// undecodable members.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        let algorithm = jwk
            .common
            .key_algorithm
            .as_ref()
            .ok_or_else(|| Error::configuration("jwk: missing algorithm"))
            .and_then(|alg| from_key_algorithm(alg.clone()))?;
        let material = KeyMaterial::from_algorithm_parameters(&jwk.algorithm)?;
        check_algorithm(algorithm, material.key_type())?;

        Ok(Self {
            material,
            algorithm,
            key_id: jwk.common.key_id.clone().unwrap_or_default(),
            key_ops: jwk
                .common
                .key_operations
                .clone()
                .unwrap_or_else(|| vec![KeyOperations::Verify]),
        })
    }

    /// Thumbprint key id
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm this key is bound to
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Underlying material
    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Material classification
    pub fn class(&self) -> KeyClass {
        self.material.class()
    }

    /// JWK key type
    pub fn key_type(&self) -> KeyType {
        self.material.key_type()
    }

    /// Permitted operations
    pub fn key_ops(&self) -> &[KeyOperations] {
        &self.key_ops
    }

    /// True if this key can sign (private or symmetric)
    pub fn is_private(&self) -> bool {
        self.material.is_private()
    }

    /// True if this key is a publishable public key
    pub fn is_public(&self) -> bool {
        self.material.is_public()
    }

    /// Key that verifies what this key signs.
    ///
    /// Private asymmetric keys yield their public half carrying identical
    /// algorithm, key id and usage. Symmetric and public keys yield themselves.
    pub fn verifying_key(&self) -> Self {
        match self.material.to_public() {
            Some(public) => Self {
                material: public,
                algorithm: self.algorithm,
                key_id: self.key_id.clone(),
                key_ops: vec![KeyOperations::Verify],
            },
            None => self.clone(),
        }
    }

    /// Public JWK representation
    ///
    /// # Errors
    ///
    /// Returns a configuration error for anything but a public key; private
    /// material never leaves the process.
    pub fn to_jwk(&self) -> Result<Jwk> {
        if !self.is_public() {
            return Err(Error::configuration("only public keys can be published"));
        }

        Ok(Jwk {
            common: CommonParameters {
                public_key_use: Some(PublicKeyUse::Signature),
                key_operations: Some(self.key_ops.clone()),
                key_algorithm: to_key_algorithm(self.algorithm),
                key_id: Some(self.key_id.clone()),
                ..CommonParameters::default()
            },
            algorithm: self.material.algorithm_parameters(),
        })
    }

    /// SPKI PEM of a public key
    ///
    /// # Errors
    ///
    /// Returns a configuration error for anything but a public key.
    pub fn to_pem(&self) -> Result<String> {
        self.material.to_public_pem()
    }
}

fn single(candidates: impl Iterator<Item = KeyMaterial>) -> Result<KeyMaterial> {
    let mut found: Option<KeyMaterial> = None;
    for candidate in candidates {
        match &found {
            Some(existing) if existing.thumbprint() == candidate.thumbprint() => {}
            Some(_) => return Err(Error::configuration("multiple keys found in pem store")),
            None => found = Some(candidate),
        }
    }

    found.ok_or_else(|| Error::configuration("no valid keys found in pem store"))
}

/// Verify that `algorithm` can be used with a key of `key_type`
///
/// # Errors
///
/// Returns a configuration error on mismatch.
pub fn check_algorithm(algorithm: Algorithm, key_type: KeyType) -> Result<()> {
    let compatible = match key_type {
        KeyType::Ec => matches!(algorithm, Algorithm::ES256),
        KeyType::Rsa => matches!(
            algorithm,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ),
        KeyType::Oct => matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ),
    };

    if compatible {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "algorithm {algorithm:?} cannot be used with {key_type} keys"
        )))
    }
}

fn to_key_algorithm(algorithm: Algorithm) -> Option<KeyAlgorithm> {
    let alg = match algorithm {
        Algorithm::HS256 => KeyAlgorithm::HS256,
        Algorithm::HS384 => KeyAlgorithm::HS384,
        Algorithm::HS512 => KeyAlgorithm::HS512,
        Algorithm::ES256 => KeyAlgorithm::ES256,
        Algorithm::ES384 => KeyAlgorithm::ES384,
        Algorithm::RS256 => KeyAlgorithm::RS256,
        Algorithm::RS384 => KeyAlgorithm::RS384,
        Algorithm::RS512 => KeyAlgorithm::RS512,
        Algorithm::PS256 => KeyAlgorithm::PS256,
        Algorithm::PS384 => KeyAlgorithm::PS384,
        Algorithm::PS512 => KeyAlgorithm::PS512,
        _ => return None,
    };
    Some(alg)
}

fn from_key_algorithm(alg: KeyAlgorithm) -> Result<Algorithm> {
    let algorithm = match alg {
        KeyAlgorithm::HS256 => Algorithm::HS256,
        KeyAlgorithm::HS384 => Algorithm::HS384,
        KeyAlgorithm::HS512 => Algorithm::HS512,
        KeyAlgorithm::ES256 => Algorithm::ES256,
        KeyAlgorithm::ES384 => Algorithm::ES384,
        KeyAlgorithm::RS256 => Algorithm::RS256,
        KeyAlgorithm::RS384 => Algorithm::RS384,
        KeyAlgorithm::RS512 => Algorithm::RS512,
        KeyAlgorithm::PS256 => Algorithm::PS256,
        KeyAlgorithm::PS384 => Algorithm::PS384,
        KeyAlgorithm::PS512 => Algorithm::PS512,
        other => {
            return Err(Error::configuration(format!(
                "jwk: unsupported signature algorithm {other:?}"
            )));
        }
    };
    Ok(algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::source::KeySource;

    fn ec_store() -> KeyStore {
        KeySource::Generate(KeyType::Ec).store().unwrap()
    }

    #[test]
    fn test_private_and_public_share_key_id() {
        let store = ec_store();
        let private = Key::new_private(Algorithm::ES256, &store).unwrap();
        let public = Key::new_public(Algorithm::ES256, &store).unwrap();

        assert!(private.is_private());
        assert!(public.is_public());
        assert_eq!(private.key_id(), public.key_id());
        assert_eq!(private.key_ops(), &[KeyOperations::Sign, KeyOperations::Verify]);
        assert_eq!(public.key_ops(), &[KeyOperations::Verify]);
    }

    #[test]
    fn test_verifying_key_keeps_metadata() {
        let private = Key::new_private(Algorithm::ES256, &ec_store()).unwrap();
        let verifying = private.verifying_key();

        assert!(verifying.is_public());
        assert_eq!(verifying.key_id(), private.key_id());
        assert_eq!(verifying.algorithm(), private.algorithm());
    }

    #[test]
    fn test_multiple_distinct_keys_are_ambiguous() {
        let a = KeyMaterial::generate(KeyType::Ec).unwrap();
        let b = KeyMaterial::generate(KeyType::Ec).unwrap();
        let store = KeyStore::from_material([a, b]);

        let err = Key::new_private(Algorithm::ES256, &store).unwrap_err();
        assert!(err.to_string().contains("multiple keys"));
    }

    #[test]
    fn test_private_and_matching_public_block_dedup() {
        let private = KeyMaterial::generate(KeyType::Ec).unwrap();
        let public = private.to_public().unwrap();
        let store = KeyStore::from_material([private, public]);

        assert!(Key::new_public(Algorithm::ES256, &store).is_ok());
        assert!(Key::new_private(Algorithm::ES256, &store).is_ok());
    }

    #[test]
    fn test_symmetric_is_never_public() {
        let store = KeySource::Generate(KeyType::Oct).store().unwrap();

        let private = Key::new_private(Algorithm::HS256, &store).unwrap();
        assert!(private.is_private());
        assert!(!private.is_public());
        assert!(private.to_jwk().is_err());

        let err = Key::new_public(Algorithm::HS256, &store).unwrap_err();
        assert!(err.to_string().contains("no valid keys"));
    }

    #[test]
    fn test_algorithm_must_fit_key_type() {
        let err = Key::new_private(Algorithm::RS256, &ec_store()).unwrap_err();
        assert!(err.is_configuration());

        assert!(check_algorithm(Algorithm::PS384, KeyType::Rsa).is_ok());
        assert!(check_algorithm(Algorithm::HS512, KeyType::Oct).is_ok());
        assert!(check_algorithm(Algorithm::HS256, KeyType::Ec).is_err());
    }

    #[test]
    fn test_jwk_round_trip() {
        let public = Key::new_public(Algorithm::ES256, &ec_store()).unwrap();
        let jwk = public.to_jwk().unwrap();

        assert_eq!(jwk.common.key_id.as_deref(), Some(public.key_id()));
        assert!(matches!(jwk.common.public_key_use, Some(PublicKeyUse::Signature)));

        let rebuilt = Key::from_jwk(&jwk).unwrap();
        assert_eq!(rebuilt.key_id(), public.key_id());
        assert_eq!(rebuilt.algorithm(), Algorithm::ES256);
        assert_eq!(rebuilt.material().thumbprint(), public.key_id());
    }

    #[test]
    fn test_private_key_is_not_published() {
        let private = Key::new_private(Algorithm::ES256, &ec_store()).unwrap();
        assert!(private.to_jwk().is_err());
        assert!(private.to_pem().is_err());
    }

    #[test]
    fn test_public_pem_round_trip() {
        let public = Key::new_public(Algorithm::ES256, &ec_store()).unwrap();
        let pem = public.to_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let store = KeyStore::decode(pem.as_bytes()).unwrap();
        let reloaded = Key::new_public(Algorithm::ES256, &store).unwrap();
        assert_eq!(reloaded.key_id(), public.key_id());
    }
}
