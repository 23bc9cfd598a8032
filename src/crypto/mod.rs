//! Hashing helpers used by the auth gate.
//! Credentials are compared through SHA-256 digests so the comparison time
//! does not depend on where the inputs first differ.

use sha2::{Digest, Sha256};

/// Hash data with SHA-256 and return the raw digest
pub fn digest_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Compare two byte strings without short-circuiting on the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Exact string equality evaluated over fixed-length digests.
pub fn secrets_match(expected_digest: &[u8; 32], candidate: &str) -> bool {
    constant_time_eq(expected_digest, &digest_sha256(candidate.as_bytes()))
}
