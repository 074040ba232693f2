//! At-rest encryption for durable cache values using AES-256-GCM.
//!
//! The data key is derived deterministically from the configured passphrase
//! (SHA-256), so entries written before a restart remain readable with the
//! same passphrase. Each value is framed as `nonce || ciphertext+tag` with a
//! fresh 12-byte random nonce per write.

use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::errors::{Error, Result};

/// Size of the AES-256-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Derive a 256-bit data key from a passphrase.
pub fn derive_key(passphrase: &str) -> [u8; 32] {
    let digest = Sha256::digest(passphrase.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Sealing/opening of cache values with a passphrase-derived key.
pub struct SecretBox {
    key: [u8; 32],
    rng: SystemRandom,
}

impl SecretBox {
    pub fn new(passphrase: &str) -> Self {
        Self { key: derive_key(passphrase), rng: SystemRandom::new() }
    }

    /// Encrypt plaintext into the `nonce || ciphertext+tag` frame.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| Error::internal("failed to generate random nonce"))?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| Error::internal("failed to create encryption key"))?;
        let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut framed = Vec::with_capacity(NONCE_SIZE + plaintext.len() + TAG_SIZE);
        framed.extend_from_slice(&nonce_bytes);
        let mut buf = plaintext.to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::empty(), &mut buf)
            .map_err(|_| Error::internal("failed to encrypt cache entry"))?;
        framed.extend_from_slice(&buf);
        Ok(framed)
    }

    /// Decrypt a `nonce || ciphertext+tag` frame back into plaintext.
    ///
    /// Returns [`Error::DecryptFailed`] on a truncated frame, a tampered
    /// ciphertext, or a mismatched key.
    pub fn open(&self, framed: &[u8]) -> Result<Vec<u8>> {
        if framed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::DecryptFailed);
        }
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(&framed[..NONCE_SIZE]);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| Error::internal("failed to create decryption key"))?;
        let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut buf = framed[NONCE_SIZE..].to_vec();
        let plaintext = opening_key
            .open_in_place(Aad::empty(), &mut buf)
            .map_err(|_| Error::DecryptFailed)?;
        Ok(plaintext.to_vec())
    }
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").field("key", &"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        assert_eq!(derive_key("passphrase"), derive_key("passphrase"));
        assert_ne!(derive_key("passphrase"), derive_key("other"));
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let sb = SecretBox::new("test-encryption-key-32chars!!");
        let framed = sb.seal(b"my-secret-value").unwrap();
        assert_eq!(framed.len(), NONCE_SIZE + b"my-secret-value".len() + TAG_SIZE);
        assert_eq!(sb.open(&framed).unwrap(), b"my-secret-value");
    }

    #[test]
    fn test_distinct_nonces_per_seal() {
        let sb = SecretBox::new("key");
        let a = sb.seal(b"same").unwrap();
        let b = sb.seal(b"same").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let sb = SecretBox::new("key");
        let mut framed = sb.seal(b"sensitive").unwrap();
        framed[NONCE_SIZE] ^= 0xff;
        assert!(matches!(sb.open(&framed), Err(Error::DecryptFailed)));
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let framed = SecretBox::new("key-a").seal(b"v").unwrap();
        assert!(matches!(SecretBox::new("key-b").open(&framed), Err(Error::DecryptFailed)));
    }

    #[test]
    fn test_truncated_frame_fails() {
        let sb = SecretBox::new("key");
        assert!(matches!(sb.open(&[0u8; 8]), Err(Error::DecryptFailed)));
    }

    #[test]
    fn test_empty_plaintext() {
        let sb = SecretBox::new("key");
        let framed = sb.seal(b"").unwrap();
        assert_eq!(framed.len(), NONCE_SIZE + TAG_SIZE);
        assert_eq!(sb.open(&framed).unwrap(), b"");
    }
}
