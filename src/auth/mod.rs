//! Public-key authentication for the gateway's `/pubkey` webhook.
//!
//! [`key`] turns an `authorized_keys` line into canonical bytes and
//! [`verifier`] compares those against the owner's stored key.

pub mod key;
pub mod verifier;

use thiserror::Error;

use crate::identity::MalformedIdentity;
use crate::store::StoreError;

pub use key::{AuthorizedKey, KeyParseError};
pub use verifier::{AuthVerdict, KeyVerifier};

/// Reasons the verifier could not reach a decision.
///
/// A key that simply does not match is not an error; see [`AuthVerdict`].
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    MalformedIdentity(#[from] MalformedIdentity),
    #[error("user not found: {owner}")]
    UserNotFound { owner: String },
    #[error("failed to parse public key: {0}")]
    KeyParse(#[from] KeyParseError),
    #[error(transparent)]
    Store(StoreError),
}

impl VerifyError {
    /// Stable machine-readable name, used in responses and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedIdentity(_) => "malformed_identity",
            Self::UserNotFound { .. } => "user_not_found",
            Self::KeyParse(_) => "key_parse_error",
            Self::Store(_) => "store_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let malformed = VerifyError::from(crate::identity::decode("x").unwrap_err());
        assert_eq!(malformed.kind(), "malformed_identity");
        assert_eq!(
            VerifyError::UserNotFound {
                owner: "a".to_string()
            }
            .kind(),
            "user_not_found"
        );
        assert_eq!(VerifyError::from(KeyParseError::Empty).kind(), "key_parse_error");
        let store = VerifyError::Store(StoreError::Backend {
            reason: "down".to_string(),
            source: None,
        });
        assert_eq!(store.kind(), "store_error");
    }

    #[test]
    fn test_messages() {
        let err = VerifyError::UserNotFound {
            owner: "alice".to_string(),
        };
        assert_eq!(err.to_string(), "user not found: alice");
        assert_eq!(
            VerifyError::from(KeyParseError::Empty).to_string(),
            "failed to parse public key: empty key material"
        );
    }
}
