use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::auth::AuthorizedKey;
use crate::route::TrustedFingerprints;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root of the YAML configuration file.
///
/// Only `store` is required; `server` and `routing` fall back to their
/// defaults when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Webhook listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// What the gateway is told when it asks where to send a connection.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Where users' registered public keys are looked up.
    pub store: StoreConfig,
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

/// HTTP server the gateway's webhooks are sent to.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address the webhook listener binds (e.g. `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Backend host keys handed to the gateway with every route.
///
/// Both lists are merged into one set at startup by [`load_fingerprints`].
/// An empty set is allowed but the gateway will then refuse every backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingConfig {
    /// Backend host-key fingerprints in `SHA256:<base64>` form.
    #[serde(default)]
    pub trusted_fingerprints: Vec<String>,
    /// Backend host public key files (`*.pub`).  Their fingerprints are
    /// computed at startup and added to `trusted_fingerprints`.
    #[serde(default)]
    pub host_key_files: Vec<String>,
}

// ---------------------------------------------------------------------------
// User store
// ---------------------------------------------------------------------------

/// Which [`UserStore`](crate::store::UserStore) implementation to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// `users` table in Postgres.
    #[default]
    Postgres,
    /// Users listed inline under `store.users`.  Intended for development
    /// and tests; changes need a restart.
    Static,
}

/// User store selection and per-backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend to use.  Defaults to `postgres`.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Connection settings.  Required when `backend` is `postgres`, ignored
    /// otherwise.
    pub postgres: Option<PostgresConfig>,
    /// Owner name to authorized-key line.  Only read by the static backend.
    #[serde(default)]
    pub users: HashMap<String, String>,
}

/// Postgres connection pool settings.
///
/// The connection URL itself is never written in the config file; only the
/// name of the variable that carries it.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    /// Name of the environment variable that holds the connection URL.
    #[serde(default = "default_url_env")]
    pub url_env: String,
    /// Upper bound on pooled connections, and so on concurrent lookups.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection before failing the lookup.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,
}

fn default_url_env() -> String {
    "DATABASE_URL".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("invalid config file: {}", path.display()))
}

fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(contents).context("failed to parse YAML")?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    config
        .server
        .listen
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid server.listen address: {}", config.server.listen))?;

    for fp in &config.routing.trusted_fingerprints {
        anyhow::ensure!(
            fp.strip_prefix("SHA256:").is_some_and(|rest| !rest.is_empty()),
            "trusted fingerprint must look like SHA256:<base64>, got {fp:?}"
        );
    }

    match config.store.backend {
        StoreBackend::Postgres => {
            let pg = config
                .store
                .postgres
                .as_ref()
                .context("store.backend is postgres but store.postgres is missing")?;
            anyhow::ensure!(pg.max_connections > 0, "store.postgres.max_connections must be > 0");
        }
        StoreBackend::Static => {
            for (owner, line) in &config.store.users {
                anyhow::ensure!(
                    crate::identity::encode(owner, "x").is_ok(),
                    "invalid user name in store.users: {owner:?}"
                );
                AuthorizedKey::parse(line)
                    .with_context(|| format!("invalid public key for user {owner}"))?;
            }
        }
    }
    Ok(())
}

/// Build the process-wide fingerprint set from inline fingerprints and host
/// key files.
pub fn load_fingerprints(routing: &RoutingConfig) -> Result<TrustedFingerprints> {
    let mut fingerprints = routing.trusted_fingerprints.clone();
    for path in &routing.host_key_files {
        let key = AuthorizedKey::from_file(path)?;
        tracing::debug!(path = %path, fingerprint = %key.fingerprint(), "loaded backend host key");
        fingerprints.push(key.fingerprint());
    }
    Ok(TrustedFingerprints::new(fingerprints))
}
