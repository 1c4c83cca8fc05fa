//! Transport settings
//!
//! Serializable configuration for [`TrustedTransport`](crate::TrustedTransport).
//! Trust anchors are fixed at construction; there is no way to add a pin
//! to a live transport.

use crate::tls::{CertificatePin, TrustAnchors};
use crate::{NetworkError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TCP + TLS connect deadline
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default deadline for a whole request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Trust anchors
    pub pins: Vec<CertificatePin>,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds
    pub request_timeout_secs: u64,
    /// User-Agent header
    pub user_agent: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            pins: Vec::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: concat!("keyward/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TransportSettings {
    /// Parse settings from JSON and validate them
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json).map_err(|e| {
            NetworkError::InvalidConfig(format!("Failed to parse transport settings: {}", e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings as JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            NetworkError::InvalidConfig(format!("Failed to serialize transport settings: {}", e))
        })
    }

    /// Check timeouts and pin formats
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(NetworkError::InvalidConfig(
                "Timeouts must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout_secs > self.request_timeout_secs {
            return Err(NetworkError::InvalidConfig(format!(
                "Connect timeout ({}s) exceeds request timeout ({}s)",
                self.connect_timeout_secs, self.request_timeout_secs
            )));
        }
        for pin in &self.pins {
            pin.validate()?;
        }
        Ok(())
    }

    /// Build the anchor set
    pub fn anchors(&self) -> Result<TrustAnchors> {
        TrustAnchors::from_pins(self.pins.iter().cloned())
    }

    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Total request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
