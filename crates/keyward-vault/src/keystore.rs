//! Platform keystore integration for secret storage
//!
//! Provides a unified interface to OS-protected credential vaults:
//! - iOS/macOS: Keychain generic passwords
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! Vault items are keyed by `(service, account)`. A [`SecureKeyStore`] owns one
//! service namespace and maps logical names onto accounts inside it, so
//! several isolated stores can share one platform vault.

use crate::security::{EncryptionEngine, SecretKey};
use crate::{StorageError, StorageResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Default service namespace for vault items
pub const DEFAULT_SERVICE: &str = "com.keyward.secure";

/// When a vault item may be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    /// Readable once the device has been unlocked since boot; never migrated
    /// to backups or other devices
    #[default]
    AfterFirstUnlockThisDeviceOnly,
    /// Readable only while the device is unlocked; never migrated
    WhenUnlockedThisDeviceOnly,
    /// Readable only while unlocked and a passcode is set; never migrated
    WhenPasscodeSetThisDeviceOnly,
}

impl Accessibility {
    /// Whether items with this policy may leave the device
    pub fn is_exportable(&self) -> bool {
        false
    }
}

/// A single item handed to a vault backend
pub struct VaultItem {
    /// Service namespace
    pub service: String,
    /// Account name (logical key)
    pub account: String,
    /// Opaque secret bytes
    pub data: Zeroizing<Vec<u8>>,
    /// Access policy
    pub accessibility: Accessibility,
}

/// Vault backend abstraction
///
/// Mirrors the add/query/delete operations of platform credential stores.
/// Implementations are blocking and must be callable from any thread.
pub trait SecretVault: Send + Sync {
    /// Insert a new item. May fail if an item with the same key exists.
    fn add(&self, item: VaultItem) -> StorageResult<()>;

    /// Look up an item. A missing item is `Ok(None)`.
    fn query(&self, service: &str, account: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Remove an item. Removing a missing item succeeds.
    fn delete(&self, service: &str, account: &str) -> StorageResult<()>;
}

/// Vault settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    /// Service namespace for every item in this store
    pub service: String,
    /// Access policy applied to new items
    pub accessibility: Accessibility,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            accessibility: Accessibility::default(),
        }
    }
}

/// Durable secret storage keyed by logical name
///
/// There is no per-entry locking: concurrent writers to the same name race
/// with last-writer-wins semantics.
#[derive(Clone)]
pub struct SecureKeyStore {
    vault: Arc<dyn SecretVault>,
    settings: VaultSettings,
}

impl SecureKeyStore {
    /// Create a store over a vault backend
    pub fn new(vault: Arc<dyn SecretVault>, settings: VaultSettings) -> Self {
        info!(
            "Creating secure key store (service={}, accessibility={:?})",
            settings.service, settings.accessibility
        );
        Self { vault, settings }
    }

    /// Service namespace
    pub fn service(&self) -> &str {
        &self.settings.service
    }

    /// Upsert `bytes` under `name`
    ///
    /// Any existing entry is deleted first so that stale access-control
    /// metadata from an earlier item never survives.
    pub fn store(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        debug!("Storing {} bytes under {}", bytes.len(), name);

        self.vault.delete(&self.settings.service, name)?;
        self.vault.add(VaultItem {
            service: self.settings.service.clone(),
            account: name.to_string(),
            data: Zeroizing::new(bytes.to_vec()),
            accessibility: self.settings.accessibility,
        })
    }

    /// Read the entry under `name`, `None` if absent
    pub fn retrieve(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let data = self.vault.query(&self.settings.service, name)?;
        debug!("Retrieved {} (present={})", name, data.is_some());
        Ok(data)
    }

    /// Remove the entry under `name`. Idempotent.
    pub fn delete(&self, name: &str) -> StorageResult<()> {
        debug!("Deleting {}", name);
        self.vault.delete(&self.settings.service, name)
    }

    /// Check whether an entry exists
    pub fn contains(&self, name: &str) -> StorageResult<bool> {
        Ok(self.retrieve(name)?.is_some())
    }

    /// Store a string as UTF-8
    ///
    /// `&str` is UTF-8 by construction, so encoding cannot fail here; the
    /// fallible direction is [`SecureKeyStore::retrieve_string`].
    pub fn store_string(&self, name: &str, value: &str) -> StorageResult<()> {
        self.store(name, value.as_bytes())
    }

    /// Read an entry as a UTF-8 string
    pub fn retrieve_string(&self, name: &str) -> StorageResult<Option<String>> {
        match self.retrieve(name)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StorageError::Encoding(format!("{} is not valid UTF-8", name))),
            None => Ok(None),
        }
    }

    /// Store a symmetric key
    pub fn store_key(&self, name: &str, key: &SecretKey) -> StorageResult<()> {
        self.store(name, key.as_bytes())
    }

    /// Read a symmetric key, `None` if absent
    pub fn retrieve_key(&self, name: &str) -> StorageResult<Option<SecretKey>> {
        match self.retrieve(name)? {
            Some(bytes) => {
                let bytes = Zeroizing::new(bytes);
                SecretKey::from_bytes(&bytes)
                    .map(Some)
                    .map_err(|e| StorageError::Corrupted(format!("{}: {}", name, e)))
            }
            None => Ok(None),
        }
    }

    /// Fetch the key under `name`, generating and persisting one on first use
    pub fn load_or_create_key(
        &self,
        name: &str,
        engine: &EncryptionEngine,
    ) -> StorageResult<SecretKey> {
        if let Some(key) = self.retrieve_key(name)? {
            return Ok(key);
        }

        info!("No key found for {}, generating new one", name);
        let key = engine.generate_key();
        self.store_key(name, &key)?;
        Ok(key)
    }
}

/// Recorded vault operation (for inspecting call order in tests)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultOp {
    /// `add` was called
    Add(String),
    /// `query` was called
    Query(String),
    /// `delete` was called
    Delete(String),
}

struct MemoryItem {
    data: Zeroizing<Vec<u8>>,
    accessibility: Accessibility,
}

/// In-memory vault for tests and platforms without a native store
///
/// Behaves like a platform vault: `add` refuses duplicates, and a simulated
/// device lock makes every call fail with [`StorageError::Unavailable`].
#[derive(Default)]
pub struct MemoryVault {
    items: RwLock<HashMap<(String, String), MemoryItem>>,
    locked: RwLock<bool>,
    ops: RwLock<Vec<VaultOp>>,
}

impl MemoryVault {
    /// Create empty vault
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate device lock state
    pub fn set_locked(&self, locked: bool) {
        *self.locked.write() = locked;
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Check if vault is empty
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Access policy recorded for an item
    pub fn accessibility_of(&self, service: &str, account: &str) -> Option<Accessibility> {
        self.items
            .read()
            .get(&(service.to_string(), account.to_string()))
            .map(|item| item.accessibility)
    }

    /// Operations performed so far, in order
    pub fn operations(&self) -> Vec<VaultOp> {
        self.ops.read().clone()
    }

    fn check_unlocked(&self) -> StorageResult<()> {
        if *self.locked.read() {
            return Err(StorageError::Unavailable("Device is locked".to_string()));
        }
        Ok(())
    }
}

impl SecretVault for MemoryVault {
    fn add(&self, item: VaultItem) -> StorageResult<()> {
        self.ops.write().push(VaultOp::Add(item.account.clone()));
        self.check_unlocked()?;

        let key = (item.service, item.account);
        let mut items = self.items.write();
        if items.contains_key(&key) {
            return Err(StorageError::Backend("Duplicate item".to_string()));
        }
        items.insert(
            key,
            MemoryItem {
                data: item.data,
                accessibility: item.accessibility,
            },
        );
        Ok(())
    }

    fn query(&self, service: &str, account: &str) -> StorageResult<Option<Vec<u8>>> {
        self.ops.write().push(VaultOp::Query(account.to_string()));
        self.check_unlocked()?;

        Ok(self
            .items
            .read()
            .get(&(service.to_string(), account.to_string()))
            .map(|item| item.data.to_vec()))
    }

    fn delete(&self, service: &str, account: &str) -> StorageResult<()> {
        self.ops.write().push(VaultOp::Delete(account.to_string()));
        self.check_unlocked()?;

        self.items
            .write()
            .remove(&(service.to_string(), account.to_string()));
        Ok(())
    }
}
