// Path: crates/crypto/src/sign.rs
//! secp256k1 ECDSA signing and verification.
//!
//! Signatures are encoded as a fixed 64-byte `r || s` pair, matching the
//! network's wire format: no DER, no recovery byte.

use crate::error::CryptoError;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

/// Number of bytes in an uncompressed secp256k1 public key (`0x04 || X || Y`).
pub const PUBLIC_KEY_LEN: usize = 65;
/// Number of bytes in a secp256k1 private key scalar.
pub const PRIVATE_KEY_LEN: usize = 32;
/// Number of bytes in a raw `r || s` signature.
pub const SIGNATURE_LEN: usize = 64;

/// A secp256k1 public key, stored in uncompressed SEC1 form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

/// A secp256k1 private (signing) key.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

/// A raw 64-byte `r || s` ECDSA signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

/// A generated secp256k1 key pair.
pub struct KeyPair {
    /// The public half, shared with peers and embedded in transactions.
    pub public: PublicKey,
    /// The private half, never transmitted.
    pub private: PrivateKey,
}

impl KeyPair {
    /// Generates a new random key pair using the OS CSPRNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair {
            public: PublicKey(verifying_key),
            private: PrivateKey(signing_key),
        }
    }
}

impl PrivateKey {
    /// Decodes a private key from its raw 32-byte scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        SigningKey::from_slice(bytes)
            .map(PrivateKey)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Returns the raw 32-byte scalar.
    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_LEN] {
        self.0.to_bytes().into()
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(*self.0.verifying_key())
    }

    /// Signs `message`, producing a raw 64-byte `r || s` signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig: EcdsaSignature = self.0.sign(message);
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&sig.to_bytes());
        Signature(out)
    }
}

impl PublicKey {
    /// Decodes an uncompressed SEC1 public key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(PublicKey)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Returns the uncompressed SEC1 encoding.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let encoded = self.0.to_encoded_point(false);
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(encoded.as_bytes());
        out
    }

    /// Verifies `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let sig = EcdsaSignature::from_slice(&signature.0)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        self.0
            .verify(message, &sig)
            .map_err(|_| CryptoError::InvalidSignature("signature did not verify".to_string()))
    }
}

impl Signature {
    /// Decodes a signature from its raw 64-byte `r || s` encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(CryptoError::InvalidLength {
                expected: SIGNATURE_LEN,
                got: bytes.len(),
            });
        }
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(bytes);
        Ok(Signature(out))
    }

    /// Returns the raw 64-byte `r || s` encoding.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trips() {
        let keypair = KeyPair::generate();
        let message = b"deposit 1000 pals";
        let signature = keypair.private.sign(message);
        assert!(keypair.public.verify(message, &signature).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let keypair = KeyPair::generate();
        let signature = keypair.private.sign(b"original");
        assert!(keypair.public.verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let signature = a.private.sign(b"message");
        assert!(b.public.verify(b"message", &signature).is_err());
    }

    #[test]
    fn public_key_round_trips_through_bytes() {
        let keypair = KeyPair::generate();
        let bytes = keypair.public.to_bytes();
        let restored = PublicKey::from_bytes(&bytes).unwrap();
        assert_eq!(keypair.public, restored);
    }

    #[test]
    fn signature_round_trips_through_bytes() {
        let keypair = KeyPair::generate();
        let signature = keypair.private.sign(b"message");
        let restored = Signature::from_bytes(&signature.to_bytes()).unwrap();
        assert_eq!(signature, restored);
    }
}
