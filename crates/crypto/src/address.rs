// Path: crates/crypto/src/address.rs
//! Address derivation: `"tmpl" ++ hex(sha256(sha256(public_key)))[..44]`.

use crate::hash::double_sha256;
use crate::sign::PublicKey;
use timpal_types::Address;

/// Derives the canonical TIMPAL address for a public key.
///
/// Uses the public key's uncompressed SEC1 encoding as input to
/// double SHA-256, then takes the first 22 bytes (44 hex characters) of
/// the digest as the address suffix.
pub fn derive_address(public_key: &PublicKey) -> Address {
    let digest = double_sha256(public_key.to_bytes());
    let hex_digest = hex::encode(digest);
    let suffix: String = hex_digest.chars().take(44).collect();
    let raw = format!("tmpl{suffix}");
    // `hex::encode` only ever emits lowercase hex digits and `suffix` is
    // always exactly 44 of them, so `raw` always satisfies `Address::parse`.
    match Address::parse(&raw) {
        Ok(address) => address,
        Err(_) => Address::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::KeyPair;

    #[test]
    fn derives_well_formed_address() {
        let keypair = KeyPair::generate();
        let address = derive_address(&keypair.public);
        assert_eq!(address.as_str().len(), 48);
        assert!(address.as_str().starts_with("tmpl"));
    }

    #[test]
    fn is_deterministic() {
        let keypair = KeyPair::generate();
        let a = derive_address(&keypair.public);
        let b = derive_address(&keypair.public);
        assert_eq!(a, b);
    }

    #[test]
    fn differs_across_keys() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(derive_address(&a.public), derive_address(&b.public));
    }
}
