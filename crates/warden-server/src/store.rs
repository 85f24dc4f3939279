//! User and invite store consulted by the token issuer
//!
//! The issuer only needs two reads: a user by login name and an invite by id.
//! [`MemoryStore`] is the in-process backend used by the binary and tests.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Bcrypt cost for stored passwords
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

/// Cheapest cost bcrypt accepts
pub const MIN_COST: u32 = 4; // mirrors bcrypt's private `MIN_COST`

/// Store lookup failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with that name or id
    #[error("not found: {0}")]
    NotFound(String),
    /// The backend itself failed
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Bcrypt password hash, salt and cost included
#[derive(Clone)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hash `password` under a fresh salt at `cost`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if `cost` is outside the bcrypt range.
    pub fn new(password: &str, cost: u32) -> Result<Self, StoreError> {
        bcrypt::hash(password, cost)
            .map(Self)
            .map_err(|e| StoreError::Backend(format!("failed to hash password: {e}")))
    }

    /// Check a candidate password
    ///
    /// Runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the stored hash is malformed or the
    /// blocking task fails.
    pub async fn verify(&self, password: &str) -> Result<bool, StoreError> {
        let password = password.to_string();
        let hash = self.0.clone();

        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| StoreError::Backend(format!("password check task failed: {e}")))?
            .map_err(|e| StoreError::Backend(format!("failed to verify password: {e}")))
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<REDACTED>)")
    }
}

/// Registered user
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub password_hash: PasswordHash,
}

/// Signup invite owned by an existing user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: String,
    pub owner_id: String,
}

/// Reads the token issuer performs
#[async_trait]
pub trait Store: Send + Sync {
    /// Find a user by login name
    async fn lookup_user(&self, name: &str) -> Result<User, StoreError>;

    /// Read an invite by id
    async fn read_invite(&self, id: &str) -> Result<Invite, StoreError>;
}

/// Seed user for [`MemoryStore`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    /// Fixed id; a random one is assigned when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(serialize_with = "redact")]
    pub password: SecretString,
}

fn redact<S: Serializer>(_: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(warden_auth::secret::REDACTED)
}

/// Seed contents for [`MemoryStore`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStoreConfig {
    /// Bcrypt cost for seeded and added users
    pub cost: u32,
    pub users: Vec<UserSeed>,
    pub invites: Vec<Invite>,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            cost: DEFAULT_COST,
            users: Vec::new(),
            invites: Vec::new(),
        }
    }
}

/// In-process store
#[derive(Debug)]
pub struct MemoryStore {
    cost: u32,
    users: RwLock<HashMap<String, User>>,
    invites: RwLock<HashMap<String, Invite>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_cost(DEFAULT_COST)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store hashing passwords at `cost`
    pub fn with_cost(cost: u32) -> Self {
        Self {
            cost,
            users: RwLock::default(),
            invites: RwLock::default(),
        }
    }

    /// Store seeded from configuration
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a seed password cannot be hashed.
    pub fn from_config(config: &MemoryStoreConfig) -> Result<Self, StoreError> {
        let store = Self::with_cost(config.cost);
        for seed in &config.users {
            let id = seed
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            store.insert_user(id, &seed.name, seed.password.expose_secret())?;
        }
        for invite in &config.invites {
            store.insert_invite(&invite.id, &invite.owner_id);
        }
        Ok(store)
    }

    /// Register a user under a random id
    ///
    /// # Errors
    ///
    /// As [`MemoryStore::insert_user`].
    pub fn add_user(&self, name: &str, password: &str) -> Result<User, StoreError> {
        self.insert_user(Uuid::new_v4().to_string(), name, password)
    }

    /// Register a user under a fixed id, replacing any user with that name
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the password cannot be hashed.
    pub fn insert_user(&self, id: impl Into<String>, name: &str, password: &str) -> Result<User, StoreError> {
        let user = User {
            id: id.into(),
            name: name.to_string(),
            password_hash: PasswordHash::new(password, self.cost)?,
        };
        self.users.write().insert(user.name.clone(), user.clone());
        Ok(user)
    }

    /// Create an invite owned by `owner_id` under a random id
    pub fn add_invite(&self, owner_id: &str) -> Invite {
        self.insert_invite(&Uuid::new_v4().to_string(), owner_id)
    }

    /// Create an invite under a fixed id
    pub fn insert_invite(&self, id: &str, owner_id: &str) -> Invite {
        let invite = Invite {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
        };
        self.invites.write().insert(invite.id.clone(), invite.clone());
        invite
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn lookup_user(&self, name: &str) -> Result<User, StoreError> {
        self.users
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user '{name}'")))
    }

    async fn read_invite(&self, id: &str) -> Result<Invite, StoreError> {
        self.invites
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("invite '{id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_password_hash_verifies_only_the_original() {
        let hash = PasswordHash::new("hunter2", MIN_COST).unwrap();
        assert!(hash.verify("hunter2").await.unwrap());
        assert!(!hash.verify("hunter3").await.unwrap());
        assert!(!hash.verify("").await.unwrap());
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let a = PasswordHash::new("hunter2", MIN_COST).unwrap();
        let b = PasswordHash::new("hunter2", MIN_COST).unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn test_default_store_uses_bcrypt_default_cost() {
        let user = MemoryStore::new().add_user("alice", "pw").unwrap();
        assert!(user.password_hash.0.starts_with("$2b$12$"), "{}", user.password_hash.0);
        assert_eq!(MemoryStoreConfig::default().cost, DEFAULT_COST);
    }

    #[test]
    fn test_out_of_range_cost_is_rejected() {
        let store = MemoryStore::with_cost(MIN_COST - 1);
        assert!(matches!(
            store.add_user("alice", "pw"),
            Err(StoreError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_hash_fails_verification() {
        let hash = PasswordHash("not-a-bcrypt-hash".to_string());
        assert!(matches!(hash.verify("pw").await, Err(StoreError::Backend(_))));
    }

    #[test]
    fn test_hash_debug_is_redacted() {
        let hash = PasswordHash::new("hunter2", MIN_COST).unwrap();
        assert_eq!(format!("{hash:?}"), "PasswordHash(<REDACTED>)");
    }

    #[tokio::test]
    async fn test_memory_store_lookups() {
        let store = MemoryStore::with_cost(MIN_COST);
        let user = store.add_user("alice", "pw").unwrap();
        let invite = store.add_invite(&user.id);

        assert_eq!(store.lookup_user("alice").await.unwrap().id, user.id);
        assert_eq!(store.read_invite(&invite.id).await.unwrap(), invite);
        assert!(matches!(
            store.lookup_user("bob").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_seed_config_redacts_passwords() {
        let config: MemoryStoreConfig = serde_json::from_value(serde_json::json!({
            "cost": MIN_COST,
            "users": [{ "id": "u1", "name": "alice", "password": "pw" }],
            "invites": [{ "id": "i1", "owner_id": "u1" }],
        }))
        .unwrap();

        let store = MemoryStore::from_config(&config).unwrap();
        let user = store.lookup_user("alice").await.unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.password_hash.verify("pw").await.unwrap());
        assert_eq!(store.read_invite("i1").await.unwrap().owner_id, "u1");

        let echoed = serde_json::to_string(&config).unwrap();
        assert!(!echoed.contains("\"pw\""));
        assert!(echoed.contains("<REDACTED>"));
    }
}
