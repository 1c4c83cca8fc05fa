//! Keyward vault
//!
//! Local protection of secrets at rest:
//! - AEAD sealing (AES-256-GCM, ChaCha20-Poly1305) and SHA-256 hashing
//! - OS-protected secret storage behind the [`SecretVault`] capability
//! - A biometric gate that authorizes sensitive operations
//!
//! Enable the `native-keystore` feature for the platform credential store
//! adapter ([`KeyringVault`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod biometric;
pub mod error;
pub mod keystore;
pub mod security;

#[cfg(feature = "native-keystore")]
pub mod keyring_vault;

pub use biometric::{
    AuthenticationSession, Availability, BiometricChallenger, BiometricGate, BiometricKind,
    ChallengeOutcome, GateState, MockChallenger, SessionPolicy, MAX_FAILED_ATTEMPTS,
};
pub use error::{
    AuthError, AuthResult, CryptoError, CryptoResult, ErrorCategory, StorageError, StorageResult,
};
#[cfg(feature = "native-keystore")]
pub use keyring_vault::KeyringVault;
pub use keystore::{
    Accessibility, MemoryVault, SecretVault, SecureKeyStore, VaultItem, VaultOp, VaultSettings,
    DEFAULT_SERVICE,
};
pub use security::{
    hash_sha256, Digest, EncryptionAlgorithm, EncryptionEngine, SealedMessage, SecretKey,
};
