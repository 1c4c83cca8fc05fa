//! Keyward network layer
//!
//! JSON-over-HTTPS transport that only talks to hosts with configured
//! SPKI pins. Certificates are validated against the system trust store
//! and then against the pin set; any mismatch aborts the connection before
//! the request is written.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connector;
pub mod error;
pub mod tls;
pub mod transport;
pub mod transport_config;

pub use connector::HttpsConnector;
pub use error::{ErrorCategory, NetworkError, Result};
pub use tls::{normalize_host, pin_from_spki, spki_pin_from_der, CertificatePin, TrustAnchors};
pub use transport::{
    HttpMethod, PinnedConnector, PreparedRequest, RawResponse, TrustedTransport,
    DEFENSIVE_HEADERS, RESERVED_HEADERS,
};
pub use transport_config::TransportSettings;
