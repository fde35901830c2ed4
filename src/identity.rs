//! SSH username codec.
//!
//! The gateway receives a single username per connection attempt.  We pack
//! two identifiers into it, the owning user and the backend the connection
//! should be routed to, separated by [`DELIMITER`]:
//!
//! ```text
//! alice#gpu-box-1
//! ^^^^^ ^^^^^^^^^
//! owner backend target
//! ```

use thiserror::Error;

/// Separator between the owner and backend-target segments.
pub const DELIMITER: char = '#';

/// Decoded form of an SSH username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub owner: String,
    pub backend_target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed identity {username:?}: {reason}")]
pub struct MalformedIdentity {
    pub username: String,
    pub reason: &'static str,
}

impl MalformedIdentity {
    fn new(username: &str, reason: &'static str) -> Self {
        Self {
            username: username.to_string(),
            reason,
        }
    }
}

/// Split an encoded username into its owner and backend target.
///
/// Exactly one delimiter is accepted and both segments must be non-empty.
pub fn decode(username: &str) -> Result<Identity, MalformedIdentity> {
    let (owner, backend_target) = username
        .split_once(DELIMITER)
        .ok_or_else(|| MalformedIdentity::new(username, "missing delimiter"))?;

    if backend_target.contains(DELIMITER) {
        return Err(MalformedIdentity::new(username, "more than one delimiter"));
    }
    if owner.is_empty() {
        return Err(MalformedIdentity::new(username, "empty owner"));
    }
    if backend_target.is_empty() {
        return Err(MalformedIdentity::new(username, "empty backend target"));
    }

    Ok(Identity {
        owner: owner.to_string(),
        backend_target: backend_target.to_string(),
    })
}

/// Build the username a client must present to reach `backend_target` as
/// `owner`.  Inverse of [`decode`].
pub fn encode(owner: &str, backend_target: &str) -> Result<String, MalformedIdentity> {
    let username = format!("{owner}{DELIMITER}{backend_target}");
    if owner.contains(DELIMITER) || backend_target.contains(DELIMITER) {
        return Err(MalformedIdentity::new(&username, "segment contains delimiter"));
    }
    if owner.is_empty() {
        return Err(MalformedIdentity::new(&username, "empty owner"));
    }
    if backend_target.is_empty() {
        return Err(MalformedIdentity::new(&username, "empty backend target"));
    }
    Ok(username)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── decode ───────────────────────────────────────────────────────

    #[test]
    fn test_decode_owner_and_target() {
        let id = decode("alice#gpu-box-1").unwrap();
        assert_eq!(id.owner, "alice");
        assert_eq!(id.backend_target, "gpu-box-1");
    }

    #[test]
    fn test_decode_keeps_segments_verbatim() {
        let id = decode("Alice.Smith#10.0.0.7").unwrap();
        assert_eq!(id.owner, "Alice.Smith");
        assert_eq!(id.backend_target, "10.0.0.7");
    }

    #[test]
    fn test_decode_no_delimiter() {
        let err = decode("malformed-no-delimiter").unwrap_err();
        assert_eq!(err.reason, "missing delimiter");
        assert_eq!(err.username, "malformed-no-delimiter");
    }

    #[test]
    fn test_decode_two_delimiters() {
        let err = decode("alice#gpu#box").unwrap_err();
        assert_eq!(err.reason, "more than one delimiter");
    }

    #[test]
    fn test_decode_empty_owner() {
        assert_eq!(decode("#gpu-box-1").unwrap_err().reason, "empty owner");
    }

    #[test]
    fn test_decode_empty_target() {
        assert_eq!(decode("alice#").unwrap_err().reason, "empty backend target");
    }

    #[test]
    fn test_decode_delimiter_only() {
        assert!(decode("#").is_err());
    }

    #[test]
    fn test_decode_empty_string() {
        assert_eq!(decode("").unwrap_err().reason, "missing delimiter");
    }

    // ── encode ───────────────────────────────────────────────────────

    #[test]
    fn test_encode_then_decode() {
        let username = encode("bob", "worker-3").unwrap();
        assert_eq!(username, "bob#worker-3");
        let id = decode(&username).unwrap();
        assert_eq!(id.owner, "bob");
        assert_eq!(id.backend_target, "worker-3");
    }

    #[test]
    fn test_encode_rejects_delimiter_in_segment() {
        assert!(encode("b#ob", "worker").is_err());
        assert!(encode("bob", "work#er").is_err());
    }

    #[test]
    fn test_encode_rejects_empty_segments() {
        assert!(encode("", "worker").is_err());
        assert!(encode("bob", "").is_err());
    }

    #[test]
    fn test_error_message_names_username() {
        let err = decode("nobody").unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed identity \"nobody\": missing delimiter"
        );
    }
}
