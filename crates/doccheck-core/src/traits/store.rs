//! Credential store trait.

use std::fmt;

use crate::error::StoreError;

/// The independent entries a credential store holds.
///
/// Keys are separate so that a missing or corrupt user snapshot never
/// invalidates a present token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    AccessToken,
    RefreshToken,
    User,
}

impl StoreKey {
    pub const ALL: [StoreKey; 3] = [StoreKey::AccessToken, StoreKey::RefreshToken, StoreKey::User];

    /// The persisted key name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::AccessToken => "access_token",
            StoreKey::RefreshToken => "refresh_token",
            StoreKey::User => "user",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A small key-value store that survives process restarts.
///
/// Calls are synchronous and cheap; the client invokes them while holding
/// its state lock, which serializes all mutation within a process.
/// `put` and `remove` are all-or-nothing across the given keys, so a token
/// pair is never observed half-rotated.
pub trait CredentialStore: Send + Sync {
    /// Read a single entry.
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError>;

    /// Write all entries atomically.
    fn put(&self, entries: &[(StoreKey, String)]) -> Result<(), StoreError>;

    /// Remove all keys atomically. Missing keys are not an error.
    fn remove(&self, keys: &[StoreKey]) -> Result<(), StoreError>;
}
