//! Keyward service
//!
//! Composition root for the credential subsystem. A [`SecurityService`] is
//! built from explicit platform capabilities (vault, biometric challenger,
//! network connector) and a [`ServiceConfig`]; nothing is global.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use error::{Error, ErrorCategory, Result};
pub use service::{key_name, SecurityService};
