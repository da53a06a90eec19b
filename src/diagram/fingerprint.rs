//! Render fingerprints
//!
//! A fingerprint is the SHA-256 digest of everything that determines a
//! rendered artifact: the renderer version tag, the output format and the
//! normalized source text. Each field is length-prefixed before hashing so
//! that no two field tuples produce the same byte stream.

use std::fmt;

use sha2::{Digest, Sha256};

use super::types::DiagramSource;

/// Domain separator, bumped if the digest layout ever changes
const FINGERPRINT_DOMAIN: &[u8] = b"plantuml-render/v1";

/// Fixed-length identifier of a renderable unit of work
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }

    /// Parse a 64-character hex string (e.g. an `If-None-Match` value)
    pub fn from_hex(value: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Compute the fingerprint of a normalized source
pub fn fingerprint(source: &DiagramSource, renderer_version: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN);
    update_field(&mut hasher, renderer_version.as_bytes());
    update_field(&mut hasher, source.format().as_str().as_bytes());
    update_field(&mut hasher, source.text().as_bytes());
    Fingerprint(hasher.finalize().into())
}

fn update_field(hasher: &mut Sha256, field: &[u8]) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field);
}
