//! Key sources and the key factory
//!
//! - [`KeySource`]: generate / inline / env / file origins producing a [`KeyStore`]
//! - [`Key`]: exactly one classified key with thumbprint id and JWK metadata
//! - [`KeyMaterial`]: the decoded EC, RSA or symmetric key behind a [`Key`]

mod key;
mod material;
mod source;

pub use key::{Key, check_algorithm};
pub use material::{
    GENERATE_RSA_BITS, GENERATE_SYMMETRIC_LEN, KeyClass, KeyMaterial, KeyType,
};
pub use source::{InlineKey, KeySource, KeyStore, REDACTED, SecretConfig};
