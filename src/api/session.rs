//! Authentication context read from persisted key-value storage.
//!
//! Persistence itself belongs to the host. The core reads two entries: `token`
//! (opaque bearer token) and `user` (cached JSON profile).

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::sync::domain::{Role, UserId};
use crate::sync::error::SyncError;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// Host-provided persistent key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// The signed-in account as cached under `user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(alias = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
}

impl SessionUser {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
            email: String::new(),
            role,
        }
    }

    pub fn is_recruiter(&self) -> bool {
        self.role == Role::Recruiter
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user: SessionUser,
    pub token: String,
}

impl AuthContext {
    pub fn from_store(store: &dyn KeyValueStore) -> Result<Self, SyncError> {
        let token = store
            .get(TOKEN_KEY)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| SyncError::Unauthenticated("no stored token".to_string()))?;
        let raw_user = store
            .get(USER_KEY)
            .ok_or_else(|| SyncError::Unauthenticated("no cached user".to_string()))?;
        let user = serde_json::from_str(&raw_user)
            .map_err(|err| SyncError::Unauthenticated(format!("cached user unreadable: {err}")))?;
        Ok(Self { user, token })
    }

    /// Persist the session the way the sign-in flow does.
    pub fn store_into(&self, store: &dyn KeyValueStore) -> Result<(), SyncError> {
        let user = serde_json::to_string(&self.user)
            .map_err(|err| SyncError::MalformedResponse(err.to_string()))?;
        store.set(TOKEN_KEY, self.token.clone());
        store.set(USER_KEY, user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_cached_mongo_style_user() {
        let store = MemoryKeyValueStore::new();
        store.set(TOKEN_KEY, "tok-123".to_string());
        store.set(
            USER_KEY,
            r#"{"_id":"rec-1","name":"Rita","email":"rita@example.com","role":"recruiter"}"#
                .to_string(),
        );

        let auth = AuthContext::from_store(&store).expect("session loads");
        assert_eq!(auth.token, "tok-123");
        assert_eq!(auth.user.id, UserId::new("rec-1"));
        assert!(auth.user.is_recruiter());
    }

    #[test]
    fn missing_token_is_unauthenticated() {
        let store = MemoryKeyValueStore::new();
        store.set(USER_KEY, r#"{"id":"s1","role":"jobseeker"}"#.to_string());
        assert!(matches!(
            AuthContext::from_store(&store),
            Err(SyncError::Unauthenticated(_))
        ));
    }

    #[test]
    fn round_trips_through_store() {
        let store = MemoryKeyValueStore::new();
        let auth = AuthContext {
            user: SessionUser::new("seek-1", "Sam", Role::JobSeeker),
            token: "tok".to_string(),
        };
        auth.store_into(&store).expect("stored");
        assert_eq!(AuthContext::from_store(&store).expect("loads"), auth);

        store.remove(TOKEN_KEY);
        assert!(AuthContext::from_store(&store).is_err());
    }
}
