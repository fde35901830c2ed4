//! Backend route resolution for the gateway's `/config` webhook.

use std::sync::Arc;

use crate::identity::{self, MalformedIdentity};

/// Port every backend's SSH daemon listens on.
pub const BACKEND_PORT: u16 = 2222;

/// Username the gateway presents to the backend.  This is the gateway's own
/// identity, not the connecting user's.
pub const PROXY_USERNAME: &str = "envd";

// ---------------------------------------------------------------------------
// Trusted fingerprints
// ---------------------------------------------------------------------------

/// Host-key fingerprints the gateway may accept when dialing a backend.
///
/// Built once at startup and shared read-only; cloning only bumps a
/// reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedFingerprints(Arc<[String]>);

impl TrustedFingerprints {
    /// Collect fingerprints, dropping duplicates while keeping first-seen order.
    pub fn new<I>(fingerprints: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for fp in fingerprints {
            if !unique.contains(&fp) {
                unique.push(fp);
            }
        }
        Self(unique.into())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` when both handles point at the same backing allocation.
    #[cfg(test)]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// ---------------------------------------------------------------------------
// Route config
// ---------------------------------------------------------------------------

/// Which gateway backend handles the connection.  Only SSH proxying is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    SshProxy,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SshProxy => "sshproxy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub backend_kind: BackendKind,
    pub target_host: String,
    pub target_port: u16,
    pub proxy_username: String,
    pub trusted_fingerprints: TrustedFingerprints,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RouteResolver {
    fingerprints: TrustedFingerprints,
}

impl RouteResolver {
    pub fn new(fingerprints: TrustedFingerprints) -> Self {
        Self { fingerprints }
    }

    pub fn fingerprints(&self) -> &TrustedFingerprints {
        &self.fingerprints
    }

    /// Map an encoded username to the backend the gateway should dial.
    ///
    /// The backend target is used as the host verbatim; reachability is the
    /// gateway's concern.
    pub fn resolve(&self, username: &str) -> Result<RouteConfig, MalformedIdentity> {
        let identity = identity::decode(username)?;
        Ok(RouteConfig {
            backend_kind: BackendKind::SshProxy,
            target_host: identity.backend_target,
            target_port: BACKEND_PORT,
            proxy_username: PROXY_USERNAME.to_string(),
            trusted_fingerprints: self.fingerprints.clone(),
        })
    }
}
