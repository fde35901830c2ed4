//! OpenSSH `authorized_keys` line parsing.
//!
//! A line has the shape `[options] <algorithm> <base64-blob> [comment]`.  We
//! reduce it to the canonical SSH wire encoding of the key, which is what the
//! user store holds and what credentials are compared on.

use std::path::Path;

use anyhow::Context;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("empty key material")]
    Empty,
    #[error("no public key found in authorized-key line")]
    MissingKey,
    #[error("invalid public key: {0}")]
    Invalid(String),
    #[error("key type mismatch: line declares {declared}, key is {actual}")]
    TypeMismatch { declared: String, actual: String },
}

/// A parsed public key in canonical wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedKey {
    algorithm: String,
    blob: Vec<u8>,
    comment: Option<String>,
}

impl AuthorizedKey {
    /// Parse a single `authorized_keys` line.
    pub fn parse(line: &str) -> Result<Self, KeyParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(KeyParseError::Empty);
        }
        if line.starts_with('#') {
            return Err(KeyParseError::MissingKey);
        }

        match parse_fields(line) {
            Ok(key) => Ok(key),
            Err(first) => match skip_options(line) {
                // Only fall back when the first token could be an options list.
                Some(rest) => parse_fields(rest).map_err(|_| first),
                None => Err(first),
            },
        }
    }

    /// Read a public key file such as `ssh_host_ed25519_key.pub`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read public key file: {}", path.display()))?;
        let line = contents
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .ok_or(KeyParseError::Empty)
            .with_context(|| format!("no key in {}", path.display()))?;
        Self::parse(line).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// SSH wire-format encoding of the key.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn into_blob(self) -> Vec<u8> {
        self.blob
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// SHA-256 fingerprint in the `ssh-keygen -l` format (`SHA256:<base64>`).
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.blob)
    }
}

/// Fingerprint a wire-format key blob.
pub fn fingerprint_of(blob: &[u8]) -> String {
    let hash = Sha256::digest(blob);
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    format!("SHA256:{encoded}")
}

/// Parse `<algorithm> <base64-blob> [comment]`.
fn parse_fields(s: &str) -> Result<AuthorizedKey, KeyParseError> {
    let mut fields = s.split_whitespace();
    let declared = fields.next().ok_or(KeyParseError::MissingKey)?;
    let encoded = fields.next().ok_or(KeyParseError::MissingKey)?;
    let comment = {
        let rest: Vec<&str> = fields.collect();
        (!rest.is_empty()).then(|| rest.join(" "))
    };

    let key = russh::keys::parse_public_key_base64(encoded)
        .map_err(|e| KeyParseError::Invalid(e.to_string()))?;

    let actual = key.algorithm();
    if actual.as_str() != declared {
        return Err(KeyParseError::TypeMismatch {
            declared: declared.to_string(),
            actual: actual.as_str().to_string(),
        });
    }

    // Re-encode rather than keep the client's bytes so that equal keys always
    // compare equal.
    let blob = key
        .to_bytes()
        .map_err(|e| KeyParseError::Invalid(e.to_string()))?;

    Ok(AuthorizedKey {
        algorithm: actual.as_str().to_string(),
        blob,
        comment,
    })
}

/// Skip a leading options field (`no-pty,command="echo hi" ssh-ed25519 ...`).
///
/// The options field ends at the first whitespace outside double quotes.
/// Returns `None` when there is nothing after it.
fn skip_options(line: &str) -> Option<&str> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                let rest = line[i..].trim_start();
                return (!rest.is_empty()).then_some(rest);
            }
            _ => {}
        }
    }
    None
}
