//! Keyward command line
//!
//! Operator tool for the credential subsystem:
//! - Validate emails and passwords, sanitize text
//! - Hash, generate keys, seal and open messages
//! - Inspect the OS keyring (with `native-keystore`)
//! - Check whether a URL is covered by configured trust anchors

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use keyward_core::{evaluate_strength, CredentialValidator};
use keyward_net::TrustedTransport;
use keyward_service::ServiceConfig;
use keyward_vault::{EncryptionAlgorithm, EncryptionEngine, SealedMessage, SecretKey};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "keyward")]
#[command(about = "Credential protection toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    /// AES-256-GCM
    Aes256Gcm,
    /// ChaCha20-Poly1305
    Chacha20Poly1305,
}

impl From<Algorithm> for EncryptionAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Aes256Gcm => EncryptionAlgorithm::Aes256Gcm,
            Algorithm::Chacha20Poly1305 => EncryptionAlgorithm::ChaCha20Poly1305,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check an email address
    ValidateEmail {
        /// Address to check
        email: String,
    },

    /// Check a password against every rule (reads stdin if omitted)
    ValidatePassword {
        /// Password
        password: Option<String>,
    },

    /// HTML-escape text
    Sanitize {
        /// Text to escape
        text: String,
    },

    /// SHA-256 of a string, hex encoded
    Hash {
        /// Input text
        text: String,
    },

    /// Generate a random 256-bit key, base64 encoded
    Keygen,

    /// Seal text under a key
    Encrypt {
        /// Base64 key
        #[arg(short, long)]
        key: String,

        /// Cipher
        #[arg(short, long, value_enum, default_value = "aes256-gcm")]
        algorithm: Algorithm,

        /// Plaintext
        text: String,
    },

    /// Open a sealed message
    Decrypt {
        /// Base64 key
        #[arg(short, long)]
        key: String,

        /// Cipher
        #[arg(short, long, value_enum, default_value = "aes256-gcm")]
        algorithm: Algorithm,

        /// Base64 sealed message
        blob: String,
    },

    /// OS keyring access
    Vault {
        /// Service namespace
        #[arg(short, long, default_value = keyward_vault::DEFAULT_SERVICE)]
        service: String,

        #[command(subcommand)]
        action: VaultAction,
    },

    /// Report whether a URL's host has trust anchors
    CheckHost {
        /// Service configuration JSON
        #[arg(short, long)]
        config: PathBuf,

        /// URL to check
        url: String,
    },
}

#[derive(Subcommand)]
enum VaultAction {
    /// Store a string
    Store {
        /// Entry name
        name: String,
        /// Value
        value: String,
    },
    /// Print a string
    Get {
        /// Entry name
        name: String,
    },
    /// Delete an entry
    Delete {
        /// Entry name
        name: String,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateEmail { email } => run_validate_email(&email),
        Commands::ValidatePassword { password } => run_validate_password(password),
        Commands::Sanitize { text } => {
            println!("{}", keyward_core::sanitize_input(&text));
            Ok(())
        }
        Commands::Hash { text } => {
            println!("{}", keyward_vault::hash_sha256(text.as_bytes()));
            Ok(())
        }
        Commands::Keygen => {
            let key = EncryptionEngine::default().generate_key();
            println!("{}", key.to_base64().as_str());
            Ok(())
        }
        Commands::Encrypt {
            key,
            algorithm,
            text,
        } => run_encrypt(&key, algorithm, &text),
        Commands::Decrypt {
            key,
            algorithm,
            blob,
        } => run_decrypt(&key, algorithm, &blob),
        Commands::Vault { service, action } => run_vault(service, action),
        Commands::CheckHost { config, url } => run_check_host(config, &url),
    }
}

fn run_validate_email(email: &str) -> anyhow::Result<()> {
    if CredentialValidator::new().validate_email(email) {
        println!("valid");
        Ok(())
    } else {
        bail!("invalid email address")
    }
}

fn run_validate_password(password: Option<String>) -> anyhow::Result<()> {
    let password = match password {
        Some(password) => password,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    let verdict = CredentialValidator::new().validate_password(&password);
    println!("strength: {:?}", evaluate_strength(&password));
    if verdict.is_valid() {
        println!("valid");
        return Ok(());
    }

    for rule in verdict.violations() {
        println!("missing: {}", rule);
    }
    bail!("password violates {} rule(s)", verdict.violations().len())
}

fn run_encrypt(key: &str, algorithm: Algorithm, text: &str) -> anyhow::Result<()> {
    let key = SecretKey::from_base64(key).map_err(|e| anyhow!("Invalid key: {}", e))?;
    let engine = EncryptionEngine::new(algorithm.into());
    let sealed = engine.encrypt_string(text, &key)?;
    println!("{}", sealed.to_base64());
    Ok(())
}

fn run_decrypt(key: &str, algorithm: Algorithm, blob: &str) -> anyhow::Result<()> {
    let key = SecretKey::from_base64(key).map_err(|e| anyhow!("Invalid key: {}", e))?;
    let engine = EncryptionEngine::new(algorithm.into());
    let sealed = SealedMessage::from_base64(blob)?;
    let plaintext = engine
        .decrypt_string(&sealed, &key)
        .map_err(|e| anyhow!(e.user_message()))?;
    println!("{}", plaintext);
    Ok(())
}

#[cfg(feature = "native-keystore")]
fn run_vault(service: String, action: VaultAction) -> anyhow::Result<()> {
    use keyward_vault::{KeyringVault, SecureKeyStore, VaultSettings};
    use std::sync::Arc;

    let store = SecureKeyStore::new(
        Arc::new(KeyringVault::new()),
        VaultSettings {
            service,
            ..Default::default()
        },
    );

    match action {
        VaultAction::Store { name, value } => {
            store.store_string(&name, &value)?;
            println!("stored {}", name);
        }
        VaultAction::Get { name } => match store.retrieve_string(&name)? {
            Some(value) => println!("{}", value),
            None => bail!("no entry named {}", name),
        },
        VaultAction::Delete { name } => {
            store.delete(&name)?;
            println!("deleted {}", name);
        }
    }
    Ok(())
}

#[cfg(not(feature = "native-keystore"))]
fn run_vault(_service: String, _action: VaultAction) -> anyhow::Result<()> {
    bail!("keyward was built without the native-keystore feature")
}

fn run_check_host(config: PathBuf, url: &str) -> anyhow::Result<()> {
    let config = ServiceConfig::load(&config)?;
    let transport = TrustedTransport::with_https(&config.transport)?;
    debug!("Anchored hosts: {:?}", transport.anchors().hosts());

    if transport.is_trusted_url(url) {
        println!("trusted");
        Ok(())
    } else {
        bail!("{} is not covered by any trust anchor", url)
    }
}
