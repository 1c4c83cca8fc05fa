//! Service configuration
//!
//! One JSON document configures every component:
//!
//! ```json
//! {
//!   "algorithm": "aes256_gcm",
//!   "vault": { "service": "com.example.app", "accessibility": "when_unlocked_this_device_only" },
//!   "session": { "timeout_secs": 300, "expire_on_background": true },
//!   "transport": {
//!     "pins": [{ "host": "api.example.com", "spki_sha256": "..." }],
//!     "connect_timeout_secs": 30,
//!     "request_timeout_secs": 60
//!   }
//! }
//! ```
//!
//! Every section is optional and falls back to its defaults.

use crate::{Error, Result};
use keyward_net::TransportSettings;
use keyward_vault::{EncryptionAlgorithm, SessionPolicy, VaultSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Aggregate configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Cipher for data protected by the service
    pub algorithm: EncryptionAlgorithm,
    /// Secure storage namespace and access policy
    pub vault: VaultSettings,
    /// Biometric session policy
    pub session: SessionPolicy,
    /// Pinned hosts and timeouts
    pub transport: TransportSettings,
}

impl ServiceConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.vault.service.trim().is_empty() {
            return Err(Error::Config("Vault service name is empty".to_string()));
        }
        if self.session.timeout_secs == Some(0) {
            return Err(Error::Config(
                "Session timeout must be positive; use null to disable it".to_string(),
            ));
        }
        self.transport.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_vault::Accessibility;

    #[test]
    fn test_empty_document_is_default() {
        let config = ServiceConfig::from_json("{}").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.vault.service, keyward_vault::DEFAULT_SERVICE);
        assert_eq!(config.algorithm, EncryptionAlgorithm::Aes256Gcm);
    }

    #[test]
    fn test_sections_parse() {
        let config = ServiceConfig::from_json(
            r#"{
                "algorithm": "chacha20_poly1305",
                "vault": {"service": "com.example.app",
                          "accessibility": "when_unlocked_this_device_only"},
                "session": {"timeout_secs": null, "expire_on_background": false}
            }"#,
        )
        .unwrap();

        assert_eq!(config.algorithm, EncryptionAlgorithm::ChaCha20Poly1305);
        assert_eq!(config.vault.accessibility, Accessibility::WhenUnlockedThisDeviceOnly);
        assert_eq!(config.session.timeout(), None);
        assert!(!config.session.expire_on_background);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ServiceConfig::from_json(r#"{"vault": {"service": " "}}"#).is_err());
        assert!(ServiceConfig::from_json(r#"{"session": {"timeout_secs": 0}}"#).is_err());
        assert!(matches!(
            ServiceConfig::from_json(r#"{"transport": {"request_timeout_secs": 0}}"#),
            Err(Error::Network(_))
        ));
    }

    #[test]
    fn test_round_trip() {
        let config = ServiceConfig::default();
        let restored = ServiceConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
    }
}
