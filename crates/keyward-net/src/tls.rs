//! TLS certificate pinning
//!
//! Provides MITM protection through SPKI pinning. A pin is the base64
//! SHA-256 of the certificate's DER-encoded SubjectPublicKeyInfo, the same
//! value produced by:
//!
//! ```bash
//! openssl x509 -in cert.pem -pubkey -noout | \
//!   openssl pkey -pubin -outform der | \
//!   openssl dgst -sha256 -binary | \
//!   base64
//! ```
//!
//! Pinning the key rather than the certificate lets a server renew its
//! certificate without breaking clients as long as the key is kept.

use crate::{NetworkError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use rustls_pki_types::CertificateDer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Length of a base64 SHA-256 pin
pub const PIN_LEN: usize = 44;

/// Certificate pin (SHA256 fingerprint of SPKI)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePin {
    /// Host this pin applies to
    pub host: String,
    /// SHA256 hash of Subject Public Key Info (SPKI)
    pub spki_sha256: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Expiry date (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

impl CertificatePin {
    /// Create new certificate pin
    pub fn new(host: &str, spki_sha256: &str, description: &str) -> Self {
        Self {
            host: normalize_host(host),
            spki_sha256: spki_sha256.to_string(),
            description: description.to_string(),
            expires: None,
        }
    }

    /// Validate pin format (base64 SHA256)
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(NetworkError::InvalidConfig(
                "Pin has an empty host".to_string(),
            ));
        }
        if self.spki_sha256.len() != PIN_LEN {
            return Err(NetworkError::InvalidConfig(format!(
                "Invalid pin format for {}: expected {} chars, got {}",
                self.host,
                PIN_LEN,
                self.spki_sha256.len()
            )));
        }
        match STANDARD.decode(&self.spki_sha256) {
            Ok(digest) if digest.len() == 32 => Ok(()),
            _ => Err(NetworkError::InvalidConfig(format!(
                "Invalid pin format for {}: not a base64 SHA-256 digest",
                self.host
            ))),
        }
    }
}

/// Canonical form of a host name for anchor lookups
///
/// Lowercased, with a single trailing dot removed.
pub fn normalize_host(host: &str) -> String {
    host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase()
}

/// Pin of a DER-encoded SubjectPublicKeyInfo
pub fn pin_from_spki(spki_der: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(spki_der))
}

/// Compute the SPKI pin of a DER-encoded X.509 certificate
pub fn spki_pin_from_der(cert_der: &[u8]) -> Result<String> {
    let der = CertificateDer::from(cert_der);
    let cert = webpki::EndEntityCert::try_from(&der)
        .map_err(|e| NetworkError::Tls(format!("Failed to parse certificate: {:?}", e)))?;
    let spki = cert.subject_public_key_info();
    Ok(pin_from_spki(spki.as_ref()))
}

/// Host to pin-set mapping
///
/// Trust is explicit: a host with no pins is untrusted, and verification
/// always enforces.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    pins: HashMap<String, Vec<CertificatePin>>,
}

impl TrustAnchors {
    /// Create empty anchor set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of pins, validating each
    pub fn from_pins(pins: impl IntoIterator<Item = CertificatePin>) -> Result<Self> {
        let mut anchors = Self::new();
        for pin in pins {
            anchors.add_pin(pin)?;
        }
        Ok(anchors)
    }

    /// Add certificate pin for a host
    pub fn add_pin(&mut self, mut pin: CertificatePin) -> Result<()> {
        pin.host = normalize_host(&pin.host);
        pin.validate()?;

        let pins = self.pins.entry(pin.host.clone()).or_default();
        if pins.iter().any(|p| p.spki_sha256 == pin.spki_sha256) {
            debug!("Pin for {} already present", pin.host);
            return Ok(());
        }

        info!("Adding TLS pin for {}: {}", pin.host, pin.description);
        pins.push(pin);
        Ok(())
    }

    /// Remove all pins for a host
    pub fn remove_pins(&mut self, host: &str) {
        let host = normalize_host(host);
        info!("Removing all TLS pins for {}", host);
        self.pins.remove(&host);
    }

    /// Get pins for a host
    pub fn pins_for(&self, host: &str) -> &[CertificatePin] {
        self.pins
            .get(&normalize_host(host))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Hosts with at least one pin
    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self.pins.keys().map(String::as_str).collect();
        hosts.sort_unstable();
        hosts
    }

    /// Check if a host has trust anchors
    pub fn is_trusted(&self, host: &str) -> bool {
        !self.pins_for(host).is_empty()
    }

    /// Check if no host is trusted
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Verify a presented SPKI pin against the host's anchors
    pub fn verify(&self, host: &str, cert_spki_sha256: &str) -> Result<()> {
        let pins = self.pins_for(host);
        if pins.is_empty() {
            warn!("Refusing connection to untrusted host {}", host);
            return Err(NetworkError::UntrustedHost(host.to_string()));
        }

        debug!("Verifying {} pins for {}", pins.len(), host);
        if pins.iter().any(|pin| pin.spki_sha256 == cert_spki_sha256) {
            debug!("Certificate pin verified for {}", host);
            Ok(())
        } else {
            warn!("Certificate pin mismatch for {}", host);
            Err(NetworkError::PinMismatch {
                host: host.to_string(),
            })
        }
    }

    /// Start a pin rotation
    ///
    /// Certificate rotation workflow:
    /// 1. Add new pin alongside old pin (both valid)
    /// 2. Deploy new key to server
    /// 3. Wait for grace period
    /// 4. [`TrustAnchors::complete_rotation`] removes the old pin
    pub fn rotate_pin(
        &mut self,
        host: &str,
        old_spki: &str,
        new_spki: &str,
        description: &str,
    ) -> Result<()> {
        if !self.pins_for(host).iter().any(|p| p.spki_sha256 == old_spki) {
            return Err(NetworkError::InvalidConfig(format!(
                "Old pin not found for {}. Cannot rotate.",
                host
            )));
        }

        self.add_pin(CertificatePin::new(
            host,
            new_spki,
            &format!("{} (rotated)", description),
        ))?;

        info!(
            "Certificate rotation initiated for {}. Both old and new pins valid during grace period.",
            host
        );
        Ok(())
    }

    /// Finish a rotation by dropping the old pin
    ///
    /// Refuses to remove the last pin of a host, which would silently turn
    /// it untrusted.
    pub fn complete_rotation(&mut self, host: &str, old_spki: &str) -> Result<()> {
        let host = normalize_host(host);
        let pins = self.pins.get_mut(&host).ok_or_else(|| {
            NetworkError::InvalidConfig(format!("No pins configured for {}", host))
        })?;

        if !pins.iter().any(|p| p.spki_sha256 == old_spki) {
            return Err(NetworkError::InvalidConfig(format!(
                "Old pin not found for {}",
                host
            )));
        }
        if pins.len() == 1 {
            return Err(NetworkError::InvalidConfig(format!(
                "Refusing to remove the only pin for {}",
                host
            )));
        }

        pins.retain(|p| p.spki_sha256 != old_spki);
        info!("Certificate rotation completed for {}. Old pin removed.", host);
        Ok(())
    }

    /// All pins, sorted by host
    pub fn all_pins(&self) -> Vec<&CertificatePin> {
        let mut pins: Vec<&CertificatePin> = self.pins.values().flatten().collect();
        pins.sort_by(|a, b| a.host.cmp(&b.host));
        pins
    }

    /// Export pins as JSON
    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.all_pins())
            .map_err(|e| NetworkError::InvalidConfig(format!("Failed to export pins: {}", e)))
    }

    /// Import pins from JSON, adding to the current set
    pub fn import(&mut self, json: &str) -> Result<()> {
        let pins: Vec<CertificatePin> = serde_json::from_str(json)
            .map_err(|e| NetworkError::InvalidConfig(format!("Failed to parse pins: {}", e)))?;

        for pin in pins {
            self.add_pin(pin)?;
        }
        Ok(())
    }
}
