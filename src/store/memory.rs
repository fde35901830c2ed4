//! In-memory user store, populated from the `store.users` config map.

use std::collections::HashMap;

use anyhow::{Context, Result};

use super::{StoreError, UserRecord, UserStore};
use crate::auth::AuthorizedKey;

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: HashMap<String, Vec<u8>>,
}

impl MemoryUserStore {
    /// Parse every configured `owner -> authorized-key line` entry.  A bad
    /// key aborts startup rather than surfacing on first login.
    pub fn from_config(users: &HashMap<String, String>) -> Result<Self> {
        let mut store = Self::default();
        for (owner, line) in users {
            let key = AuthorizedKey::parse(line)
                .with_context(|| format!("invalid public key for user {owner}"))?;
            store.insert(owner.clone(), key.into_blob());
        }
        Ok(store)
    }

    pub fn insert(&mut self, owner: String, stored_public_key: Vec<u8>) {
        self.users.insert(owner, stored_public_key);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user(&self, owner: &str) -> Result<UserRecord, StoreError> {
        self.users
            .get(owner)
            .map(|key| UserRecord {
                owner: owner.to_string(),
                stored_public_key: key.clone(),
            })
            .ok_or_else(|| StoreError::NotFound {
                owner: owner.to_string(),
            })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "static"
    }
}
