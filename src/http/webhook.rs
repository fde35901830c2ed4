//! Request and response bodies of the gateway's webhook protocol.
//!
//! Field names follow the gateway's JSON schema exactly (camelCase); unknown
//! request fields such as `metadata` or `environment` are ignored.

use serde::{Deserialize, Serialize};

use crate::auth::AuthVerdict;
use crate::route::RouteConfig;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// `POST /config` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
    pub username: String,
    #[serde(default)]
    pub remote_address: String,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub client_version: String,
}

/// `POST /pubkey` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyAuthRequest {
    pub username: String,
    #[serde(default)]
    pub remote_address: String,
    #[serde(default)]
    pub connection_id: String,
    /// Offered key in `authorized_keys` format.
    pub public_key: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ConfigResponse {
    pub config: AppConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub backend: &'static str,
    pub sshproxy: SshProxyConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshProxyConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub allowed_host_key_fingerprints: Vec<String>,
}

impl From<RouteConfig> for ConfigResponse {
    fn from(route: RouteConfig) -> Self {
        Self {
            config: AppConfig {
                backend: route.backend_kind.as_str(),
                sshproxy: SshProxyConfig {
                    server: route.target_host,
                    port: route.target_port,
                    username: route.proxy_username,
                    allowed_host_key_fingerprints: route.trusted_fingerprints.as_slice().to_vec(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthResponse {
    pub success: bool,
}

impl From<AuthVerdict> for AuthResponse {
    fn from(verdict: AuthVerdict) -> Self {
        Self {
            success: verdict.success,
        }
    }
}

/// Body returned with every non-200 response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}
