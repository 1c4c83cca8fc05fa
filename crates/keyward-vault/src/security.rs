//! Authenticated encryption and hashing
//!
//! Implements AES-256-GCM and ChaCha20-Poly1305 sealing of arbitrary byte
//! payloads, plus SHA-256 fingerprinting.
//!
//! Wire format of a sealed message, for both algorithms:
//!
//! ```text
//! [nonce(12)][ciphertext(variable)][tag(16)]
//! ```
//!
//! The external text representation is standard padded base64 of that blob.

use crate::{CryptoError, CryptoResult};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

/// Key length in bytes (256-bit)
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes (96-bit)
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes (128-bit)
pub const TAG_LEN: usize = 16;

/// Digest length in bytes (256-bit)
pub const DIGEST_LEN: usize = 32;

/// Encryption algorithm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionAlgorithm {
    /// AES-256-GCM
    #[default]
    Aes256Gcm,
    /// ChaCha20-Poly1305
    #[serde(rename = "chacha20_poly1305")]
    ChaCha20Poly1305,
}

impl EncryptionAlgorithm {
    /// Algorithm name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }
}

/// Symmetric 256-bit key, zeroized on drop
#[derive(Clone)]
pub struct SecretKey {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl SecretKey {
    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);

        Ok(Self { key })
    }

    /// Decode from base64
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| CryptoError::Malformed(format!("Invalid key encoding: {}", e)))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Encode as base64 (for export through a vault)
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.key.as_ref()))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Nonce, ciphertext and tag as one opaque blob
#[derive(Clone, PartialEq, Eq)]
pub struct SealedMessage {
    bytes: Vec<u8>,
}

impl SealedMessage {
    /// Minimum blob length: nonce + tag, empty plaintext
    pub const MIN_LEN: usize = NONCE_LEN + TAG_LEN;

    /// Parse a raw `nonce || ciphertext || tag` blob
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < Self::MIN_LEN {
            return Err(CryptoError::Malformed(format!(
                "expected at least {} bytes, got {}",
                Self::MIN_LEN,
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Parse the base64 representation
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Malformed(format!("Invalid base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Raw blob
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the raw blob
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Base64 representation
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Nonce bytes
    pub fn nonce(&self) -> &[u8] {
        &self.bytes[..NONCE_LEN]
    }

    /// Ciphertext without nonce or tag
    pub fn ciphertext(&self) -> &[u8] {
        &self.bytes[NONCE_LEN..self.bytes.len() - TAG_LEN]
    }

    /// Authentication tag
    pub fn tag(&self) -> &[u8] {
        &self.bytes[self.bytes.len() - TAG_LEN..]
    }

    /// Ciphertext followed by tag, as the AEAD ciphers expect it
    fn ciphertext_and_tag(&self) -> &[u8] {
        &self.bytes[NONCE_LEN..]
    }
}

impl fmt::Debug for SealedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedMessage")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// SHA-256 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Digest bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Authenticated encryption engine
///
/// Stateless apart from the algorithm choice; safe to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptionEngine {
    algorithm: EncryptionAlgorithm,
}

impl EncryptionEngine {
    /// Create engine for an algorithm
    pub fn new(algorithm: EncryptionAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Configured algorithm
    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    /// Generate a fresh 256-bit key from the OS CSPRNG
    pub fn generate_key(&self) -> SecretKey {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        SecretKey { key }
    }

    /// Seal plaintext under a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8], key: &SecretKey) -> CryptoResult<SealedMessage> {
        self.encrypt_with_aad(plaintext, &[], key)
    }

    /// Seal plaintext, binding additional authenticated data
    pub fn encrypt_with_aad(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        key: &SecretKey,
    ) -> CryptoResult<SealedMessage> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad,
        };

        let sealed = match self.algorithm {
            EncryptionAlgorithm::Aes256Gcm => {
                let cipher = Aes256Gcm::new(key.as_bytes().into());
                cipher.encrypt(Nonce::from_slice(&nonce_bytes), payload)
            }
            EncryptionAlgorithm::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
                cipher.encrypt(chacha20poly1305::Nonce::from_slice(&nonce_bytes), payload)
            }
        }
        .map_err(|e| CryptoError::Encoding(e.to_string()))?;

        let mut bytes = Vec::with_capacity(NONCE_LEN + sealed.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&sealed);

        Ok(SealedMessage { bytes })
    }

    /// Verify the tag and open a sealed message
    ///
    /// Returns plaintext only after successful verification; any failure is
    /// [`CryptoError::AuthenticationFailed`].
    pub fn decrypt(&self, sealed: &SealedMessage, key: &SecretKey) -> CryptoResult<Vec<u8>> {
        self.decrypt_with_aad(sealed, &[], key)
    }

    /// Open a sealed message bound to additional authenticated data
    pub fn decrypt_with_aad(
        &self,
        sealed: &SealedMessage,
        aad: &[u8],
        key: &SecretKey,
    ) -> CryptoResult<Vec<u8>> {
        let payload = Payload {
            msg: sealed.ciphertext_and_tag(),
            aad,
        };

        let opened = match self.algorithm {
            EncryptionAlgorithm::Aes256Gcm => {
                let cipher = Aes256Gcm::new(key.as_bytes().into());
                cipher.decrypt(Nonce::from_slice(sealed.nonce()), payload)
            }
            EncryptionAlgorithm::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
                cipher.decrypt(chacha20poly1305::Nonce::from_slice(sealed.nonce()), payload)
            }
        };

        opened.map_err(|_| {
            tracing::debug!(
                "{} verification failed for {}-byte message",
                self.algorithm.name(),
                sealed.as_bytes().len()
            );
            CryptoError::AuthenticationFailed
        })
    }

    /// Seal a UTF-8 string
    pub fn encrypt_string(&self, plaintext: &str, key: &SecretKey) -> CryptoResult<SealedMessage> {
        self.encrypt(plaintext.as_bytes(), key)
    }

    /// Open a sealed message and decode it as UTF-8
    ///
    /// Tampering or a wrong key yields `AuthenticationFailed`; a verified
    /// payload that is not UTF-8 yields `Decoding`.
    pub fn decrypt_string(&self, sealed: &SealedMessage, key: &SecretKey) -> CryptoResult<String> {
        let plaintext = self.decrypt(sealed, key)?;
        String::from_utf8(plaintext).map_err(|e| {
            let mut bytes = e.into_bytes();
            zeroize::Zeroize::zeroize(&mut bytes);
            CryptoError::Decoding("Decrypted payload is not valid UTF-8".to_string())
        })
    }

    /// SHA-256 of `data`. Not a password hash.
    pub fn hash(&self, data: &[u8]) -> Digest {
        hash_sha256(data)
    }
}

/// Hash data with SHA-256
pub fn hash_sha256(data: &[u8]) -> Digest {
    use sha2::Digest as _;
    let mut hasher = Sha256::new();
    hasher.update(data);
    Digest(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let engine = EncryptionEngine::default();
        let key1 = engine.generate_key();
        let key2 = engine.generate_key();
        assert_eq!(key1.as_bytes().len(), KEY_LEN);
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_encryption_decryption_aes_gcm() {
        let engine = EncryptionEngine::new(EncryptionAlgorithm::Aes256Gcm);
        let key = engine.generate_key();
        let plaintext = b"Hello, Keyward!";

        let sealed = engine.encrypt(plaintext, &key).unwrap();
        assert_eq!(sealed.as_bytes().len(), NONCE_LEN + plaintext.len() + TAG_LEN);
        assert_ne!(sealed.ciphertext(), plaintext);

        let decrypted = engine.decrypt(&sealed, &key).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn test_encryption_decryption_chacha20() {
        let engine = EncryptionEngine::new(EncryptionAlgorithm::ChaCha20Poly1305);
        let key = engine.generate_key();
        let plaintext = b"Secret message";

        let sealed = engine.encrypt(plaintext, &key).unwrap();
        let decrypted = engine.decrypt(&sealed, &key).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn test_fresh_nonce_per_message() {
        let engine = EncryptionEngine::default();
        let key = engine.generate_key();

        let a = engine.encrypt(b"same", &key).unwrap();
        let b = engine.encrypt(b"same", &key).unwrap();
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_wrong_key_decryption() {
        let engine = EncryptionEngine::default();
        let key1 = engine.generate_key();
        let key2 = engine.generate_key();

        let sealed = engine.encrypt(b"Secret", &key1).unwrap();
        assert_eq!(
            engine.decrypt(&sealed, &key2).unwrap_err(),
            CryptoError::AuthenticationFailed
        );
    }

    #[test]
    fn test_algorithm_mismatch_fails_closed() {
        let aes = EncryptionEngine::new(EncryptionAlgorithm::Aes256Gcm);
        let chacha = EncryptionEngine::new(EncryptionAlgorithm::ChaCha20Poly1305);
        let key = aes.generate_key();

        let sealed = aes.encrypt(b"bound to AES", &key).unwrap();
        assert!(chacha.decrypt(&sealed, &key).is_err());
    }

    #[test]
    fn test_tampered_tag_rejected() {
        let engine = EncryptionEngine::default();
        let key = engine.generate_key();
        let sealed = engine.encrypt(b"integrity", &key).unwrap();

        let mut bytes = sealed.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = SealedMessage::from_bytes(&bytes).unwrap();

        assert_eq!(
            engine.decrypt(&tampered, &key).unwrap_err(),
            CryptoError::AuthenticationFailed
        );
    }

    #[test]
    fn test_aad_binding() {
        let engine = EncryptionEngine::default();
        let key = engine.generate_key();

        let sealed = engine.encrypt_with_aad(b"payload", b"vault:alice", &key).unwrap();
        assert!(engine.decrypt_with_aad(&sealed, b"vault:alice", &key).is_ok());
        assert!(engine.decrypt_with_aad(&sealed, b"vault:bob", &key).is_err());
        assert!(engine.decrypt(&sealed, &key).is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let engine = EncryptionEngine::default();
        let key = engine.generate_key();

        let sealed = engine.encrypt(b"", &key).unwrap();
        assert_eq!(sealed.as_bytes().len(), SealedMessage::MIN_LEN);
        assert!(sealed.ciphertext().is_empty());
        assert!(engine.decrypt(&sealed, &key).unwrap().is_empty());
    }

    #[test]
    fn test_short_blob_rejected() {
        let err = SealedMessage::from_bytes(&[0u8; SealedMessage::MIN_LEN - 1]).unwrap_err();
        assert!(matches!(err, CryptoError::Malformed(_)));
        assert!(SealedMessage::from_base64("not base64!!").is_err());
    }

    #[test]
    fn test_string_roundtrip_and_decoding_error() {
        let engine = EncryptionEngine::default();
        let key = engine.generate_key();

        let sealed = engine.encrypt_string("pässwörd ✓", &key).unwrap();
        assert_eq!(engine.decrypt_string(&sealed, &key).unwrap(), "pässwörd ✓");

        let invalid_utf8 = engine.encrypt(&[0xff, 0xfe, 0xfd], &key).unwrap();
        assert!(matches!(
            engine.decrypt_string(&invalid_utf8, &key),
            Err(CryptoError::Decoding(_))
        ));
    }

    #[test]
    fn test_key_length_and_base64() {
        assert_eq!(
            SecretKey::from_bytes(&[0u8; 31]).unwrap_err(),
            CryptoError::InvalidKeyLength(31)
        );

        let key = EncryptionEngine::default().generate_key();
        let restored = SecretKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(restored.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_secret_key_debug_is_redacted() {
        let key = SecretKey::from_bytes(&[0xAB; KEY_LEN]).unwrap();
        let debug = format!("{:?}", key);
        assert!(!debug.to_lowercase().contains("ab"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_sha256_known_vector() {
        let digest = hash_sha256(b"abc");
        assert_eq!(
            digest.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(EncryptionEngine::default().hash(b"abc"), digest);
    }
}
