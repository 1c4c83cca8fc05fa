//! OS credential store backend
//!
//! Apple platforms write generic passwords through Security.framework with
//! the item's [`Accessibility`] mapped onto the matching
//! `kSecAttrAccessible*ThisDeviceOnly` protection class.
//!
//! Elsewhere the `keyring` crate is used: Credential Manager on Windows and
//! Secret Service on Linux. Those stores have no lock-state policy; an item
//! is readable whenever the user's session is. Only the default policy is
//! accepted there, and stricter policies fail with
//! [`StorageError::Unavailable`] instead of being dropped.

use crate::keystore::{Accessibility, SecretVault, VaultItem};
use crate::{StorageError, StorageResult};
use tracing::debug;

/// Vault backed by the platform credential store
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringVault;

impl KeyringVault {
    /// Create keyring vault
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_vendor = "apple")]
mod backend {
    use super::*;
    use security_framework::access_control::{ProtectionMode, SecAccessControl};
    use security_framework::base::Error as SecError;
    use security_framework::passwords::{
        delete_generic_password, get_generic_password, set_generic_password_options,
        PasswordOptions,
    };

    /// errSecItemNotFound
    const ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;
    /// errSecInteractionNotAllowed (device locked)
    const ERR_SEC_INTERACTION_NOT_ALLOWED: i32 = -25308;

    pub(super) fn protection_mode(accessibility: Accessibility) -> ProtectionMode {
        match accessibility {
            Accessibility::AfterFirstUnlockThisDeviceOnly => {
                ProtectionMode::AccessibleAfterFirstUnlockThisDeviceOnly
            }
            Accessibility::WhenUnlockedThisDeviceOnly => {
                ProtectionMode::AccessibleWhenUnlockedThisDeviceOnly
            }
            Accessibility::WhenPasscodeSetThisDeviceOnly => {
                ProtectionMode::AccessibleWhenPasscodeSetThisDeviceOnly
            }
        }
    }

    fn map_error(error: SecError) -> StorageError {
        match error.code() {
            ERR_SEC_INTERACTION_NOT_ALLOWED => StorageError::Unavailable(error.to_string()),
            _ => StorageError::Backend(error.to_string()),
        }
    }

    pub(super) fn add(item: &VaultItem) -> StorageResult<()> {
        let access = SecAccessControl::create_with_protection(
            Some(protection_mode(item.accessibility)),
            0,
        )
        .map_err(map_error)?;

        let mut options = PasswordOptions::new_generic_password(&item.service, &item.account);
        options.set_access_control(access);
        set_generic_password_options(&item.data, options).map_err(map_error)
    }

    pub(super) fn query(service: &str, account: &str) -> StorageResult<Option<Vec<u8>>> {
        match get_generic_password(service, account) {
            Ok(secret) => Ok(Some(secret)),
            Err(e) if e.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(None),
            Err(e) => Err(map_error(e)),
        }
    }

    /// Returns false when there was nothing to delete
    pub(super) fn delete(service: &str, account: &str) -> StorageResult<bool> {
        match delete_generic_password(service, account) {
            Ok(()) => Ok(true),
            Err(e) if e.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(false),
            Err(e) => Err(map_error(e)),
        }
    }
}

#[cfg(not(target_vendor = "apple"))]
mod backend {
    use super::*;

    fn entry(service: &str, account: &str) -> StorageResult<keyring::Entry> {
        keyring::Entry::new(service, account).map_err(map_error)
    }

    fn map_error(error: keyring::Error) -> StorageError {
        match error {
            keyring::Error::NoStorageAccess(e) => StorageError::Unavailable(e.to_string()),
            keyring::Error::BadEncoding(_) => {
                StorageError::Corrupted("Credential has an unexpected encoding".to_string())
            }
            other => StorageError::Backend(other.to_string()),
        }
    }

    /// Refuse policies this store cannot honor
    pub(super) fn check_policy(accessibility: Accessibility) -> StorageResult<()> {
        if accessibility == Accessibility::default() {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!(
                "{:?} is not supported by this credential store",
                accessibility
            )))
        }
    }

    pub(super) fn add(item: &VaultItem) -> StorageResult<()> {
        check_policy(item.accessibility)?;
        entry(&item.service, &item.account)?
            .set_secret(&item.data)
            .map_err(map_error)
    }

    pub(super) fn query(service: &str, account: &str) -> StorageResult<Option<Vec<u8>>> {
        match entry(service, account)?.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_error(e)),
        }
    }

    pub(super) fn delete(service: &str, account: &str) -> StorageResult<bool> {
        match entry(service, account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(map_error(e)),
        }
    }
}

impl SecretVault for KeyringVault {
    fn add(&self, item: VaultItem) -> StorageResult<()> {
        debug!(
            "Keyring add {}/{} (accessibility={:?})",
            item.service, item.account, item.accessibility
        );
        backend::add(&item)
    }

    fn query(&self, service: &str, account: &str) -> StorageResult<Option<Vec<u8>>> {
        backend::query(service, account)
    }

    fn delete(&self, service: &str, account: &str) -> StorageResult<()> {
        if !backend::delete(service, account)? {
            debug!("Keyring delete {}/{}: nothing to delete", service, account);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroize::Zeroizing;

    #[cfg(not(target_vendor = "apple"))]
    #[test]
    fn test_stricter_policy_is_refused_not_dropped() {
        assert!(backend::check_policy(Accessibility::AfterFirstUnlockThisDeviceOnly).is_ok());

        for accessibility in [
            Accessibility::WhenUnlockedThisDeviceOnly,
            Accessibility::WhenPasscodeSetThisDeviceOnly,
        ] {
            let item = VaultItem {
                service: "com.keyward.test".to_string(),
                account: "policy".to_string(),
                data: Zeroizing::new(b"secret".to_vec()),
                accessibility,
            };
            // Refused before the platform store is touched
            assert!(matches!(
                KeyringVault::new().add(item),
                Err(StorageError::Unavailable(_))
            ));
        }
    }

    #[cfg(target_vendor = "apple")]
    #[test]
    fn test_every_policy_maps_to_device_only_class() {
        use security_framework::access_control::ProtectionMode;

        for (accessibility, expected) in [
            (
                Accessibility::AfterFirstUnlockThisDeviceOnly,
                ProtectionMode::AccessibleAfterFirstUnlockThisDeviceOnly,
            ),
            (
                Accessibility::WhenUnlockedThisDeviceOnly,
                ProtectionMode::AccessibleWhenUnlockedThisDeviceOnly,
            ),
            (
                Accessibility::WhenPasscodeSetThisDeviceOnly,
                ProtectionMode::AccessibleWhenPasscodeSetThisDeviceOnly,
            ),
        ] {
            assert_eq!(
                std::mem::discriminant(&backend::protection_mode(accessibility)),
                std::mem::discriminant(&expected)
            );
        }
    }
}
