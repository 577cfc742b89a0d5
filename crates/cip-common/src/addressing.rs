//! Content addressing: SHA-256 digests and CID-style identifiers
//!
//! Every blob is addressed two ways from the same hash computation:
//!
//! - Legacy prefixed hex: `sha256-a7ffc6f8bf1e...` (64 hex chars)
//! - CIDv1 text: `bafkrei...` (version 1, raw codec, sha2-256 multihash,
//!   base32 lower)
//!
//! Both forms are accepted wherever an address is parsed, and both resolve
//! to the same underlying 32-byte digest.

use crate::error::{CipError, Result};
use cid::multihash::Multihash;
use cid::Cid;
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// Multicodec code for raw binary content
const RAW_CODEC: u64 = 0x55;

/// Multihash code for sha2-256
const SHA2_256_CODE: u64 = 0x12;

/// A SHA-256 content digest with both textual address forms.
///
/// Immutable once computed. Equal input bytes always produce equal digests
/// in both forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest {
    bytes: [u8; 32],
}

impl ContentDigest {
    /// Compute the digest of a byte payload
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self { bytes }
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Legacy prefixed-hex address form: `sha256-<64 hex chars>`
    pub fn legacy(&self) -> String {
        format!("sha256-{}", hex::encode(self.bytes))
    }

    /// Bare hex form without the prefix
    pub fn hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// CIDv1 text form: raw codec, sha2-256 multihash, base32 lower
    pub fn cid(&self) -> String {
        wrap_sha256(&self.bytes)
            .map(|mh| Cid::new_v1(RAW_CODEC, mh).to_string())
            .unwrap_or_default()
    }

    /// Parse a content address in any accepted form.
    ///
    /// Accepts CID text (`baf...`), `sha256-` prefixed hex, or bare 64-char
    /// hex. Non-sha256 CIDs and malformed hex are rejected.
    pub fn parse(address: &str) -> Result<Self> {
        // CID text forms start with a multibase prefix
        if address.starts_with("baf") || address.starts_with("Qm") || address.starts_with('z') {
            let cid = Cid::from_str(address).map_err(|e| {
                CipError::invalid_address(address, format!("invalid CID: {}", e))
            })?;
            let digest = cid.hash().digest();
            if digest.len() != 32 {
                return Err(CipError::invalid_address(
                    address,
                    format!(
                        "CID uses unsupported hash algorithm (expected sha2-256, got {} bytes)",
                        digest.len()
                    ),
                ));
            }
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(digest);
            return Ok(Self { bytes });
        }

        let hex_part = address.strip_prefix("sha256-").unwrap_or(address);
        if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CipError::invalid_address(
                address,
                "expected CID, sha256-prefixed hex, or 64 hex chars",
            ));
        }

        let decoded = hex::decode(hex_part)
            .map_err(|e| CipError::invalid_address(address, e.to_string()))?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    /// Verify that a byte payload matches this digest
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let actual = Self::from_bytes(data);
        if actual == *self {
            Ok(())
        } else {
            Err(CipError::DigestMismatch {
                expected: self.legacy(),
                actual: actual.legacy(),
            })
        }
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.legacy())
    }
}

/// Wrap a 32-byte digest in a multihash. Only fails if the digest exceeds
/// the 64-byte capacity, which a sha-256 digest never does.
fn wrap_sha256(digest: &[u8; 32]) -> Option<Multihash<64>> {
    Multihash::wrap(SHA2_256_CODE, digest).ok()
}
