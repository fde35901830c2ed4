//! Postgres-backed user store.
//!
//! Reads from the `users` table, where `public_key` holds the SSH wire-format
//! key blob registered for each login.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, trace};

use super::{StoreError, UserRecord, UserStore};
use crate::config::PostgresConfig;

const GET_USER: &str = "SELECT login_name, public_key FROM users WHERE login_name = $1 LIMIT 1";

pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Connect using the URL held in the env var named by `config.url_env`.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let url = std::env::var(&config.url_env)
            .with_context(|| format!("database URL env var {} not set", config.url_env))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect(&url)
            .await
            .context("failed to connect to Postgres")?;

        debug!(
            max_connections = config.max_connections,
            "Postgres pool initialised"
        );
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Wrap a sqlx error with what we were doing when it happened.
fn backend_error(context: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend {
        reason: format!("{context}: {err}"),
        source: Some(err),
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresUserStore {
    async fn get_user(&self, owner: &str) -> Result<UserRecord, StoreError> {
        let row: Option<(String, Vec<u8>)> = sqlx::query_as(GET_USER)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend_error("get user", e))?;

        let (owner, stored_public_key) = row.ok_or_else(|| StoreError::NotFound {
            owner: owner.to_string(),
        })?;
        trace!(%owner, "user record loaded");
        Ok(UserRecord {
            owner,
            stored_public_key,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| backend_error("ping", e))?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "postgres"
    }
}
