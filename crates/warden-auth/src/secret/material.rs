//! Decoded key material
//!
//! [`KeyMaterial`] is the raw key behind a [`Key`](super::Key): an EC P-256 or
//! RSA key pair half, or a symmetric secret. It knows how to derive its public
//! counterpart, compute its RFC 7638 thumbprint, and turn itself into the
//! `jsonwebtoken` encoding/decoding keys.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, EllipticCurve, EllipticCurveKeyParameters,
    EllipticCurveKeyType, Jwk, OctetKeyParameters, OctetKeyType, RSAKeyParameters, RSAKeyType,
    ThumbprintHash,
};
use jsonwebtoken::{DecodingKey, EncodingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{
    DecodePrivateKey as _, DecodePublicKey as _, EncodePrivateKey as _, EncodePublicKey as _,
};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey as _, DecodeRsaPublicKey as _, EncodeRsaPrivateKey as _};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Modulus size for generated RSA keys
pub const GENERATE_RSA_BITS: usize = 2048;
/// Length of generated symmetric secrets
pub const GENERATE_SYMMETRIC_LEN: usize = 32;

/// Key type as named in JWK `kty`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Elliptic curve (P-256)
    #[serde(rename = "EC")]
    Ec,
    /// RSA
    #[serde(rename = "RSA")]
    Rsa,
    /// Symmetric octet sequence
    #[serde(rename = "oct")]
    Oct,
}

impl KeyType {
    /// JWK `kty` value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ec => "EC",
            Self::Rsa => "RSA",
            Self::Oct => "oct",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of key material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyClass {
    /// Private half of an asymmetric pair
    Private,
    /// Public half of an asymmetric pair
    Public,
    /// Shared secret
    Symmetric,
}

/// Raw key material
#[derive(Clone)]
pub enum KeyMaterial {
    /// P-256 private key
    EcPrivate(p256::SecretKey),
    /// P-256 public key
    EcPublic(p256::PublicKey),
    /// RSA private key
    RsaPrivate(Box<RsaPrivateKey>),
    /// RSA public key
    RsaPublic(RsaPublicKey),
    /// Symmetric secret, zeroized on drop
    Symmetric(Zeroizing<Vec<u8>>),
}

// Private parameters never reach a formatter
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Self::EcPrivate(_) => "EcPrivate",
            Self::EcPublic(_) => "EcPublic",
            Self::RsaPrivate(_) => "RsaPrivate",
            Self::RsaPublic(_) => "RsaPublic",
            Self::Symmetric(_) => "Symmetric",
        };
        f.debug_struct(variant)
            .field("thumbprint", &self.thumbprint())
            .finish_non_exhaustive()
    }
}

impl KeyMaterial {
    /// Generate fresh material of the given type
    ///
    /// EC keys use P-256, RSA keys are 2048 bits, symmetric secrets are 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if RSA key generation fails.
    pub fn generate(key_type: KeyType) -> Result<Self> {
        match key_type {
            KeyType::Ec => Ok(Self::EcPrivate(p256::SecretKey::random(&mut OsRng))),
            KeyType::Rsa => {
                let key = RsaPrivateKey::new(&mut OsRng, GENERATE_RSA_BITS).map_err(|e| {
                    Error::configuration(format!("generate: failed to create RSA key: {e}"))
                })?;
                Ok(Self::RsaPrivate(Box::new(key)))
            }
            KeyType::Oct => {
                let mut secret = Zeroizing::new(vec![0u8; GENERATE_SYMMETRIC_LEN]);
                OsRng.fill_bytes(&mut secret);
                Ok(Self::Symmetric(secret))
            }
        }
    }

    /// Classify this material
    pub fn class(&self) -> KeyClass {
        match self {
            Self::EcPrivate(_) | Self::RsaPrivate(_) => KeyClass::Private,
            Self::EcPublic(_) | Self::RsaPublic(_) => KeyClass::Public,
            Self::Symmetric(_) => KeyClass::Symmetric,
        }
    }

    /// JWK key type
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::EcPrivate(_) | Self::EcPublic(_) => KeyType::Ec,
            Self::RsaPrivate(_) | Self::RsaPublic(_) => KeyType::Rsa,
            Self::Symmetric(_) => KeyType::Oct,
        }
    }

    /// True if this material can sign.
    ///
    /// Listed explicitly, never computed as `!is_public()`.
    pub fn is_private(&self) -> bool {
        matches!(
            self,
            Self::EcPrivate(_) | Self::RsaPrivate(_) | Self::Symmetric(_)
        )
    }

    /// True if this material is the public half of an asymmetric pair.
    ///
    /// Listed explicitly, never computed as `!is_private()`.
    pub fn is_public(&self) -> bool {
        matches!(self, Self::EcPublic(_) | Self::RsaPublic(_))
    }

    /// Public counterpart with every private parameter stripped.
    ///
    /// Public material returns a copy of itself; symmetric material has no
    /// public counterpart.
    pub fn to_public(&self) -> Option<Self> {
        match self {
            Self::EcPrivate(key) => Some(Self::EcPublic(key.public_key())),
            Self::RsaPrivate(key) => Some(Self::RsaPublic(key.to_public_key())),
            Self::EcPublic(_) | Self::RsaPublic(_) => Some(self.clone()),
            Self::Symmetric(_) => None,
        }
    }

    /// JWK algorithm parameters.
    ///
    /// Private asymmetric material is represented by its public members only;
    /// symmetric material includes the secret (`k`) and must never be published.
    pub fn algorithm_parameters(&self) -> AlgorithmParameters {
        match self {
            Self::EcPrivate(key) => ec_parameters(&key.public_key()),
            Self::EcPublic(key) => ec_parameters(key),
            Self::RsaPrivate(key) => rsa_parameters(key.n(), key.e()),
            Self::RsaPublic(key) => rsa_parameters(key.n(), key.e()),
            Self::Symmetric(secret) => AlgorithmParameters::OctetKey(OctetKeyParameters {
                key_type: OctetKeyType::Octet,
                value: URL_SAFE_NO_PAD.encode(secret.as_slice()),
            }),
        }
    }

    /// RFC 7638 SHA-256 thumbprint, base64url without padding.
    ///
    /// Computed over the required public members in lexicographic order, so a
    /// private key and its public half share one thumbprint.
    pub fn thumbprint(&self) -> String {
        let jwk = Jwk {
            common: CommonParameters::default(),
            algorithm: self.algorithm_parameters(),
        };
        jwk.thumbprint(ThumbprintHash::SHA256)
    }

    /// Signing key for `jsonwebtoken`.
    ///
    /// # Errors
    ///
    /// Fails for public material or if the private key cannot be DER encoded.
    pub fn encoding_key(&self) -> Result<EncodingKey> {
        match self {
            Self::EcPrivate(key) => {
                let der = key.to_pkcs8_der().map_err(|e| {
                    Error::configuration(format!("failed to encode EC private key: {e}"))
                })?;
                Ok(EncodingKey::from_ec_der(der.as_bytes()))
            }
            Self::RsaPrivate(key) => {
                let der = key.to_pkcs1_der().map_err(|e| {
                    Error::configuration(format!("failed to encode RSA private key: {e}"))
                })?;
                Ok(EncodingKey::from_rsa_der(der.as_bytes()))
            }
            Self::Symmetric(secret) => Ok(EncodingKey::from_secret(secret)),
            Self::EcPublic(_) | Self::RsaPublic(_) => {
                Err(Error::configuration("public key cannot sign"))
            }
        }
    }

    /// Verification key for `jsonwebtoken`.
    ///
    /// # Errors
    ///
    /// Fails for private asymmetric material; derive the public half first.
    pub fn decoding_key(&self) -> Result<DecodingKey> {
        match self.algorithm_parameters() {
            _ if matches!(self, Self::EcPrivate(_) | Self::RsaPrivate(_)) => Err(
                Error::configuration("private key material cannot back a validater"),
            ),
            AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|e| Error::configuration(format!("invalid EC public key: {e}"))),
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| Error::configuration(format!("invalid RSA public key: {e}"))),
            AlgorithmParameters::OctetKey(_) => match self {
                Self::Symmetric(secret) => Ok(DecodingKey::from_secret(secret)),
                _ => Err(Error::configuration("unexpected octet key parameters")),
            },
            _ => Err(Error::configuration("unsupported key parameters")),
        }
    }

    /// SPKI PEM encoding of public material
    ///
    /// # Errors
    ///
    /// Fails for private or symmetric material.
    pub fn to_public_pem(&self) -> Result<String> {
        match self {
            Self::EcPublic(key) => key
                .to_public_key_pem(p256::pkcs8::LineEnding::LF)
                .map_err(|e| Error::configuration(format!("failed to encode EC public key: {e}"))),
            Self::RsaPublic(key) => key
                .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
                .map_err(|e| {
                    Error::configuration(format!("failed to encode RSA public key: {e}"))
                }),
            _ => Err(Error::configuration("only public keys can be PEM encoded")),
        }
    }

    /// Rebuild material from JWK parameters
    ///
    /// # Errors
    ///
    /// Fails on unsupported curves/key types or undecodable members.
    pub fn from_algorithm_parameters(params: &AlgorithmParameters) -> Result<Self> {
        match params {
            AlgorithmParameters::EllipticCurve(ec) => {
                if !matches!(ec.curve, EllipticCurve::P256) {
                    return Err(Error::configuration("unsupported elliptic curve"));
                }
                let x = decode_member("x", &ec.x)?;
                let y = decode_member("y", &ec.y)?;
                let mut sec1 = Vec::with_capacity(1 + x.len() + y.len());
                sec1.push(0x04);
                sec1.extend_from_slice(&x);
                sec1.extend_from_slice(&y);
                let key = p256::PublicKey::from_sec1_bytes(&sec1)
                    .map_err(|e| Error::configuration(format!("invalid EC point: {e}")))?;
                Ok(Self::EcPublic(key))
            }
            AlgorithmParameters::RSA(rsa) => {
                let n = BigUint::from_bytes_be(&decode_member("n", &rsa.n)?);
                let e = BigUint::from_bytes_be(&decode_member("e", &rsa.e)?);
                let key = RsaPublicKey::new(n, e)
                    .map_err(|e| Error::configuration(format!("invalid RSA public key: {e}")))?;
                Ok(Self::RsaPublic(key))
            }
            AlgorithmParameters::OctetKey(oct) => {
                let secret = decode_member("k", &oct.value)?;
                Ok(Self::Symmetric(Zeroizing::new(secret)))
            }
            _ => Err(Error::configuration("unsupported key type")),
        }
    }

    /// Decode one PEM block by its label.
    ///
    /// Returns `Ok(None)` for labels that do not carry a key (certificates,
    /// EC parameters).
    pub(crate) fn from_pem_block(label: &str, der: &[u8]) -> Result<Option<Self>> {
        let material = match label {
            "PRIVATE KEY" => {
                if let Ok(key) = p256::SecretKey::from_pkcs8_der(der) {
                    Self::EcPrivate(key)
                } else {
                    let key = RsaPrivateKey::from_pkcs8_der(der).map_err(|e| {
                        Error::configuration(format!("unsupported PKCS#8 private key: {e}"))
                    })?;
                    Self::RsaPrivate(Box::new(key))
                }
            }
            "EC PRIVATE KEY" => {
                let key = p256::SecretKey::from_sec1_der(der).map_err(|e| {
                    Error::configuration(format!("invalid EC private key: {e}"))
                })?;
                Self::EcPrivate(key)
            }
            "RSA PRIVATE KEY" => {
                let key = RsaPrivateKey::from_pkcs1_der(der).map_err(|e| {
                    Error::configuration(format!("invalid RSA private key: {e}"))
                })?;
                Self::RsaPrivate(Box::new(key))
            }
            "PUBLIC KEY" => {
                if let Ok(key) = p256::PublicKey::from_public_key_der(der) {
                    Self::EcPublic(key)
                } else {
                    let key = RsaPublicKey::from_public_key_der(der).map_err(|e| {
                        Error::configuration(format!("unsupported public key: {e}"))
                    })?;
                    Self::RsaPublic(key)
                }
            }
            "RSA PUBLIC KEY" => {
                let key = RsaPublicKey::from_pkcs1_der(der).map_err(|e| {
                    Error::configuration(format!("invalid RSA public key: {e}"))
                })?;
                Self::RsaPublic(key)
            }
            _ => return Ok(None),
        };

        Ok(Some(material))
    }
}

fn ec_parameters(key: &p256::PublicKey) -> AlgorithmParameters {
    let point = key.to_encoded_point(false);
    // Uncompressed points always carry both coordinates
    let x = point.x().map(|x| URL_SAFE_NO_PAD.encode(x)).unwrap_or_default();
    let y = point.y().map(|y| URL_SAFE_NO_PAD.encode(y)).unwrap_or_default();

    AlgorithmParameters::EllipticCurve(EllipticCurveKeyParameters {
        key_type: EllipticCurveKeyType::EC,
        curve: EllipticCurve::P256,
        x,
        y,
    })
}

fn rsa_parameters(n: &BigUint, e: &BigUint) -> AlgorithmParameters {
    AlgorithmParameters::RSA(RSAKeyParameters {
        key_type: RSAKeyType::RSA,
        n: URL_SAFE_NO_PAD.encode(n.to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(e.to_bytes_be()),
    })
}

fn decode_member(name: &str, value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| Error::configuration(format!("invalid base64url in '{name}': {e}")))
}
