//! Security service
//!
//! Wires the five components together for a UI or CLI caller. Protecting a
//! named secret runs, in order: biometric gate, key lookup (or creation),
//! encryption, vault write. Each protected name `n` owns a data key stored
//! under `n.key`.
//!
//! Value and key are two vault items, so every operation on a name holds that
//! name's lock for the whole read-modify-write.

use crate::{Error, Result, ServiceConfig};
use keyward_core::{CredentialValidator, ValidationVerdict};
use keyward_net::{HttpMethod, PinnedConnector, TrustedTransport};
use keyward_vault::{
    AuthError, BiometricChallenger, BiometricGate, EncryptionEngine, SealedMessage, SecretVault,
    SecureKeyStore,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

/// Name of the data key that protects `name`
pub fn key_name(name: &str) -> String {
    format!("{}.key", name)
}

/// Facade over the credential subsystem
pub struct SecurityService {
    config: ServiceConfig,
    engine: EncryptionEngine,
    store: SecureKeyStore,
    gate: BiometricGate,
    transport: TrustedTransport,
    validator: CredentialValidator,
    name_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SecurityService {
    /// Assemble the service from platform capabilities
    pub fn new(
        config: ServiceConfig,
        vault: Arc<dyn SecretVault>,
        challenger: Arc<dyn BiometricChallenger>,
        connector: Arc<dyn PinnedConnector>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Starting security service ({}, vault service {})",
            config.algorithm.name(),
            config.vault.service
        );

        Ok(Self {
            engine: EncryptionEngine::new(config.algorithm),
            store: SecureKeyStore::new(vault, config.vault.clone()),
            gate: BiometricGate::new(challenger, config.session.clone()),
            transport: TrustedTransport::new(&config.transport, connector)?,
            validator: CredentialValidator::new(),
            name_locks: Mutex::new(HashMap::new()),
            config,
        })
    }

    /// Assemble the service with the native HTTPS connector
    pub fn with_https(
        config: ServiceConfig,
        vault: Arc<dyn SecretVault>,
        challenger: Arc<dyn BiometricChallenger>,
    ) -> Result<Self> {
        let connector = keyward_net::HttpsConnector::new(&config.transport)?;
        Self::new(config, vault, challenger, Arc::new(connector))
    }

    /// Active configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Encryption engine
    pub fn engine(&self) -> &EncryptionEngine {
        &self.engine
    }

    /// Secure key store
    pub fn key_store(&self) -> &SecureKeyStore {
        &self.store
    }

    /// Biometric gate
    pub fn gate(&self) -> &BiometricGate {
        &self.gate
    }

    /// Trusted transport
    pub fn transport(&self) -> &TrustedTransport {
        &self.transport
    }

    /// Credential validator
    pub fn validator(&self) -> &CredentialValidator {
        &self.validator
    }

    /// Serialize operations on `name`
    async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .name_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Require a live session, prompting if there is none
    pub async fn authorize(&self, reason: &str) -> Result<()> {
        if self.gate.is_authenticated() {
            return Ok(());
        }

        if self.gate.authenticate(reason).await? {
            Ok(())
        } else {
            let error = self.gate.last_failure().unwrap_or_else(|| {
                AuthError::AuthenticationFailed("Challenge did not match".to_string())
            });
            Err(error.into())
        }
    }

    /// Encrypt `plaintext` and store it under `name`
    ///
    /// The name is bound as associated data, so a sealed value copied to a
    /// different name fails to open.
    pub async fn protect(&self, name: &str, plaintext: &[u8], reason: &str) -> Result<()> {
        self.authorize(reason).await?;
        let _name_guard = self.lock_name(name).await;

        let store = self.store.clone();
        let engine = self.engine;
        let name = name.to_string();
        let plaintext = plaintext.to_vec();
        run_blocking(move || {
            let key = store.load_or_create_key(&key_name(&name), &engine)?;
            let sealed = engine.encrypt_with_aad(&plaintext, name.as_bytes(), &key)?;
            store.store_string(&name, &sealed.to_base64())?;
            debug!("Protected {} ({} bytes)", name, plaintext.len());
            Ok(())
        })
        .await
    }

    /// Decrypt the value stored under `name`, `None` if absent
    pub async fn reveal(&self, name: &str, reason: &str) -> Result<Option<Vec<u8>>> {
        self.authorize(reason).await?;
        let _name_guard = self.lock_name(name).await;

        let store = self.store.clone();
        let engine = self.engine;
        let name = name.to_string();
        run_blocking(move || {
            let encoded = match store.retrieve_string(&name)? {
                Some(encoded) => encoded,
                None => return Ok(None),
            };
            let key = store.retrieve_key(&key_name(&name))?.ok_or_else(|| {
                keyward_vault::StorageError::Corrupted(format!("Data key for {} is missing", name))
            })?;
            let sealed = SealedMessage::from_base64(&encoded)?;
            let plaintext = engine.decrypt_with_aad(&sealed, name.as_bytes(), &key)?;
            debug!("Revealed {}", name);
            Ok(Some(plaintext))
        })
        .await
    }

    /// Protect a UTF-8 string
    pub async fn protect_string(&self, name: &str, value: &str, reason: &str) -> Result<()> {
        self.protect(name, value.as_bytes(), reason).await
    }

    /// Reveal a UTF-8 string
    pub async fn reveal_string(&self, name: &str, reason: &str) -> Result<Option<String>> {
        match self.reveal(name, reason).await? {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| {
                keyward_vault::CryptoError::Decoding(format!("{} is not valid UTF-8", name)).into()
            }),
            None => Ok(None),
        }
    }

    /// Delete the value under `name` and its data key. Idempotent.
    ///
    /// Destroying a secret needs the same live session as reading it.
    pub async fn forget(&self, name: &str, reason: &str) -> Result<()> {
        self.authorize(reason).await?;
        let _name_guard = self.lock_name(name).await;

        let store = self.store.clone();
        let name = name.to_string();
        run_blocking(move || {
            store.delete(&name)?;
            store.delete(&key_name(&name))?;
            info!("Forgot {}", name);
            Ok(())
        })
        .await
    }

    /// See [`CredentialValidator::validate_email`]
    pub fn validate_email(&self, email: &str) -> bool {
        self.validator.validate_email(email)
    }

    /// See [`CredentialValidator::validate_password`]
    pub fn validate_password(&self, password: &str) -> ValidationVerdict {
        self.validator.validate_password(password)
    }

    /// See [`CredentialValidator::sanitize_input`]
    pub fn sanitize_input(&self, input: &str) -> String {
        self.validator.sanitize_input(input)
    }

    /// See [`TrustedTransport::secure_request`]
    pub async fn secure_request<T: DeserializeOwned>(
        &self,
        url: &str,
        method: HttpMethod,
        params: &Map<String, Value>,
        headers: &[(String, String)],
    ) -> Result<T> {
        Ok(self
            .transport
            .secure_request(url, method, params, headers)
            .await?)
    }
}

/// Run vault work off the async executor
async fn run_blocking<F, T>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Error::Internal(format!("Vault task join error: {}", e)))?
}
