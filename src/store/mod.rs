//! User-record storage.
//!
//! The verifier only needs one query: fetch the stored public key for an
//! owner.  [`UserStore`] abstracts that so the Postgres deployment and the
//! config-file store used in development share one code path.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

/// A user's stored credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub owner: String,
    /// SSH wire-format public key.
    pub stored_public_key: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found: {owner}")]
    NotFound { owner: String },
    #[error("user store query failed: {reason}")]
    Backend {
        reason: String,
        #[source]
        source: Option<sqlx::Error>,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch the record for `owner`.  Missing users are
    /// [`StoreError::NotFound`]; nothing is retried here.
    async fn get_user(&self, owner: &str) -> Result<UserRecord, StoreError>;

    /// Cheap connectivity probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Short backend name used in logs.
    fn kind(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build the configured [`UserStore`].
pub async fn build_store(config: &StoreConfig) -> Result<Arc<dyn UserStore>> {
    let store: Arc<dyn UserStore> = match config.backend {
        StoreBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("store.backend is postgres but store.postgres is missing")?;
            Arc::new(postgres::PostgresUserStore::connect(pg).await?)
        }
        StoreBackend::Static => {
            let store = memory::MemoryUserStore::from_config(&config.users)?;
            if store.is_empty() {
                tracing::warn!("static user store has no users; every public key will be refused");
            }
            tracing::debug!(users = store.len(), "static users loaded");
            Arc::new(store)
        }
    };
    tracing::info!(backend = store.kind(), "user store initialised");
    Ok(store)
}
