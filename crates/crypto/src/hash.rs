// Path: crates/crypto/src/hash.rs
//! SHA-256 hashing.

use crate::error::CryptoError;
use sha2::{Digest, Sha256};
use timpal_types::Hash256;

/// A hash function producing a fixed-size digest.
pub trait HashFunction {
    /// Hashes `message` and returns the digest.
    fn hash(&self, message: &[u8]) -> Vec<u8>;

    /// The digest size in bytes.
    fn digest_size(&self) -> usize;

    /// The name of the hash function.
    fn name(&self) -> &str;
}

/// SHA-256 hash function.
#[derive(Default, Clone, Copy)]
pub struct Sha256Hash;

impl HashFunction for Sha256Hash {
    fn hash(&self, message: &[u8]) -> Vec<u8> {
        Sha256::digest(message).to_vec()
    }

    fn digest_size(&self) -> usize {
        32
    }

    fn name(&self) -> &str {
        "SHA-256"
    }
}

/// Hashes `data` with SHA-256, returning a fixed 32-byte digest.
pub fn sha256<T: AsRef<[u8]>>(data: T) -> [u8; 32] {
    Sha256::digest(data.as_ref()).into()
}

/// Hashes `data` with SHA-256 and returns the lowercase hex digest, the
/// form used throughout the consensus core for block hashes, tx hashes,
/// and epoch seeds.
pub fn sha256_hex<T: AsRef<[u8]>>(data: T) -> String {
    hex::encode(sha256(data))
}

/// Double SHA-256: `sha256(sha256(data))`. Used for address derivation.
pub fn double_sha256<T: AsRef<[u8]>>(data: T) -> [u8; 32] {
    sha256(sha256(data))
}

/// Hashes `data` with SHA-256 and wraps the digest as a [`Hash256`].
pub fn sha256_hash256<T: AsRef<[u8]>>(data: T) -> Hash256 {
    Hash256::from_bytes(sha256(data))
}

/// Parses a lowercase hex string into a fixed-size byte array.
pub fn decode_hex_fixed<const N: usize>(s: &str) -> Result<[u8; N], CryptoError> {
    let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    if bytes.len() != N {
        return Err(CryptoError::InvalidLength {
            expected: N,
            got: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_matches_known_vector() {
        let digest = sha256_hex(b"");
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn double_sha256_hashes_twice() {
        let once = sha256(b"timpal");
        let twice = double_sha256(b"timpal");
        assert_eq!(twice, sha256(once));
    }

    #[test]
    fn decode_hex_fixed_rejects_wrong_length() {
        let err = decode_hex_fixed::<32>("abcd").unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidLength {
                expected: 32,
                got: 2
            }
        );
    }
}
