use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{debug, instrument};

use super::key::AuthorizedKey;
use super::VerifyError;
use crate::identity;
use crate::store::{StoreError, UserStore};

/// Outcome of a completed public-key check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthVerdict {
    pub success: bool,
}

/// Checks a client's offered public key against the owner's stored key.
#[derive(Clone)]
pub struct KeyVerifier {
    store: Arc<dyn UserStore>,
}

impl KeyVerifier {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Decide whether `candidate` (an authorized-key line) authenticates the
    /// owner encoded in `username`.
    ///
    /// Anything that prevents a decision is an error; a wrong key is
    /// `Ok(AuthVerdict { success: false })`.
    #[instrument(skip(self, candidate))]
    pub async fn verify(&self, username: &str, candidate: &str) -> Result<AuthVerdict, VerifyError> {
        let identity = identity::decode(username)?;

        let record = self
            .store
            .get_user(&identity.owner)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { owner } => VerifyError::UserNotFound { owner },
                other => VerifyError::Store(other),
            })?;

        let offered = AuthorizedKey::parse(candidate)?;
        let success = keys_match(offered.blob(), &record.stored_public_key);

        debug!(
            owner = %record.owner,
            algorithm = offered.algorithm(),
            fingerprint = %offered.fingerprint(),
            comment = offered.comment().unwrap_or_default(),
            success,
            "public key checked"
        );
        Ok(AuthVerdict { success })
    }
}

/// Constant-time in the contents; only a length mismatch returns early.
fn keys_match(offered: &[u8], stored: &[u8]) -> bool {
    offered.ct_eq(stored).into()
}
