//! Security service integration tests
//!
//! Tests cover:
//! - Protect/reveal/forget through the gate, engine and vault
//! - Nothing is written or read when the gate refuses
//! - Sealed values are bound to their name
//! - Overlapping writes to one name stay decryptable
//! - Configuration loading from disk
//! - Transport passthrough honors trust anchors

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use keyward_net::{
    CertificatePin, HttpMethod, NetworkError, PinnedConnector, PreparedRequest, RawResponse,
    TrustAnchors,
};
use keyward_service::{key_name, Error, SecurityService, ServiceConfig};
use keyward_vault::{
    AuthError, BiometricKind, ChallengeOutcome, CryptoError, MemoryVault, MockChallenger,
    SecretVault, StorageResult, VaultItem, DEFAULT_SERVICE,
};
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn pin() -> String {
    STANDARD.encode([3u8; 32])
}

struct EchoConnector {
    calls: AtomicUsize,
}

#[async_trait]
impl PinnedConnector for EchoConnector {
    async fn execute(
        &self,
        request: PreparedRequest,
        anchors: &TrustAnchors,
    ) -> keyward_net::Result<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anchors.verify(&request.host, &pin())?;
        Ok(RawResponse {
            status: 200,
            headers: Vec::new(),
            body: format!(r#"{{"path": "{}"}}"#, request.url.path()).into_bytes(),
        })
    }
}

/// Vault whose data-key lookups are slow, widening the window between
/// reading a key and writing the value
struct SlowKeyVault {
    inner: MemoryVault,
}

impl SecretVault for SlowKeyVault {
    fn add(&self, item: VaultItem) -> StorageResult<()> {
        self.inner.add(item)
    }

    fn query(&self, service: &str, account: &str) -> StorageResult<Option<Vec<u8>>> {
        if account.ends_with(".key") {
            std::thread::sleep(Duration::from_millis(50));
        }
        self.inner.query(service, account)
    }

    fn delete(&self, service: &str, account: &str) -> StorageResult<()> {
        self.inner.delete(service, account)
    }
}

struct Harness {
    vault: Arc<MemoryVault>,
    challenger: Arc<MockChallenger>,
    connector: Arc<EchoConnector>,
    service: SecurityService,
}

fn harness_with(challenger: MockChallenger) -> Harness {
    let mut config = ServiceConfig::default();
    config
        .transport
        .pins
        .push(CertificatePin::new("api.example.com", &pin(), "test"));

    let vault = Arc::new(MemoryVault::new());
    let challenger = Arc::new(challenger);
    let connector = Arc::new(EchoConnector {
        calls: AtomicUsize::new(0),
    });
    let service = SecurityService::new(
        config,
        vault.clone(),
        challenger.clone(),
        connector.clone(),
    )
    .unwrap();

    Harness {
        vault,
        challenger,
        connector,
        service,
    }
}

fn harness() -> Harness {
    harness_with(MockChallenger::new(BiometricKind::Face))
}

// ============================================================================
// Protect / reveal / forget
// ============================================================================

#[tokio::test]
async fn test_protect_then_reveal() {
    let h = harness();

    h.service
        .protect_string("api.token", "s3cr3t", "Save token")
        .await
        .unwrap();

    // Stored value is ciphertext, and a data key exists beside it
    let stored = h.service.key_store().retrieve_string("api.token").unwrap().unwrap();
    assert!(!stored.contains("s3cr3t"));
    assert!(h.service.key_store().contains(&key_name("api.token")).unwrap());

    let revealed = h
        .service
        .reveal_string("api.token", "Show token")
        .await
        .unwrap();
    assert_eq!(revealed.as_deref(), Some("s3cr3t"));

    // Second call reused the live session
    assert_eq!(h.challenger.prompt_count(), 1);
}

#[tokio::test]
async fn test_reveal_missing_is_none() {
    let h = harness();
    assert_eq!(h.service.reveal("nothing", "Show").await.unwrap(), None);
}

#[tokio::test]
async fn test_forget_removes_value_and_key() {
    let h = harness();
    h.service.protect("note", b"hello", "Save").await.unwrap();
    assert_eq!(h.vault.len(), 2);

    h.service.forget("note", "Delete").await.unwrap();
    h.service.forget("note", "Delete").await.unwrap();
    assert!(h.vault.is_empty());
    assert_eq!(h.service.reveal("note", "Show").await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_first_protects_stay_consistent() {
    let service = SecurityService::new(
        ServiceConfig::default(),
        Arc::new(SlowKeyVault {
            inner: MemoryVault::new(),
        }),
        Arc::new(MockChallenger::new(BiometricKind::Face)),
        Arc::new(EchoConnector {
            calls: AtomicUsize::new(0),
        }),
    )
    .unwrap();
    service.authorize("Unlock").await.unwrap();

    let (first, second) = tokio::join!(
        service.protect("x", b"first", "Save"),
        service.protect("x", b"second", "Save"),
    );
    first.unwrap();
    second.unwrap();

    let revealed = service.reveal("x", "Show").await.unwrap().unwrap();
    assert!(revealed == b"first" || revealed == b"second");
}

#[tokio::test]
async fn test_sealed_value_bound_to_name() {
    let h = harness();
    h.service.protect("a", b"alpha", "Save").await.unwrap();
    h.service.protect("b", b"beta", "Save").await.unwrap();

    // Move a's ciphertext and key under b
    let store = h.service.key_store();
    let sealed_a = store.retrieve("a").unwrap().unwrap();
    let key_a = store.retrieve(&key_name("a")).unwrap().unwrap();
    store.store("b", &sealed_a).unwrap();
    store.store(&key_name("b"), &key_a).unwrap();

    let result = h.service.reveal("b", "Show").await;
    assert!(matches!(
        result,
        Err(Error::Crypto(CryptoError::AuthenticationFailed))
    ));
}

#[tokio::test]
async fn test_tampered_value_never_yields_plaintext() {
    let h = harness();
    h.service.protect("note", b"hello", "Save").await.unwrap();

    let store = h.service.key_store();
    let encoded = store.retrieve_string("note").unwrap().unwrap();
    let mut blob = STANDARD.decode(encoded).unwrap();
    let last = blob.len() - 1;
    blob[last] ^= 0x01;
    store.store_string("note", &STANDARD.encode(blob)).unwrap();

    let err = h.service.reveal("note", "Show").await.unwrap_err();
    assert!(matches!(err, Error::Crypto(CryptoError::AuthenticationFailed)));
    assert_eq!(err.user_message(), CryptoError::AuthenticationFailed.user_message());
}

// ============================================================================
// Gate refusal
// ============================================================================

#[tokio::test]
async fn test_failed_challenge_blocks_protect() {
    let challenger = MockChallenger::new(BiometricKind::Fingerprint);
    challenger.push_outcome(ChallengeOutcome::Failed("No match".to_string()));
    let h = harness_with(challenger);

    let err = h.service.protect("note", b"hello", "Save").await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::AuthenticationFailed(_))));
    assert!(h.vault.is_empty());
}

#[tokio::test]
async fn test_unavailable_biometrics_block_reveal() {
    let h = harness_with(MockChallenger::unavailable("No hardware"));

    let err = h.service.reveal("note", "Show").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::ConfigurationUnavailable(_))
    ));
    assert!(h.vault.operations().is_empty());
}

#[tokio::test]
async fn test_failed_challenge_blocks_forget() {
    let challenger = MockChallenger::new(BiometricKind::Face);
    challenger.push_outcome(ChallengeOutcome::Success);
    challenger.push_outcome(ChallengeOutcome::Failed("No match".to_string()));
    let h = harness_with(challenger);

    h.service.protect("note", b"hello", "Save").await.unwrap();
    h.service.gate().logout();

    let err = h.service.forget("note", "Delete").await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::AuthenticationFailed(_))));
    assert_eq!(h.vault.len(), 2);
}

#[tokio::test]
async fn test_background_requires_new_challenge() {
    let h = harness();
    h.service.protect("note", b"hello", "Save").await.unwrap();

    h.service.gate().enter_background();
    h.service.reveal("note", "Show").await.unwrap();
    assert_eq!(h.challenger.prompt_count(), 2);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"vault": {{"service": "com.example.notes"}},
             "transport": {{"pins": [{{"host": "api.example.com", "spki_sha256": "{}"}}]}}}}"#,
        pin()
    )
    .unwrap();

    let config = ServiceConfig::load(file.path()).unwrap();
    assert_eq!(config.vault.service, "com.example.notes");
    assert_eq!(config.transport.pins.len(), 1);
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        ServiceConfig::load(dir.path().join("absent.json")),
        Err(Error::Config(_))
    ));
}

#[tokio::test]
async fn test_vault_namespace_from_config() {
    let config = ServiceConfig::from_json(r#"{"vault": {"service": "com.example.notes"}}"#).unwrap();
    let vault = Arc::new(MemoryVault::new());
    let service = SecurityService::new(
        config,
        vault.clone(),
        Arc::new(MockChallenger::new(BiometricKind::Face)),
        Arc::new(EchoConnector {
            calls: AtomicUsize::new(0),
        }),
    )
    .unwrap();

    service.protect("note", b"x", "Save").await.unwrap();
    assert!(vault.query("com.example.notes", "note").unwrap().is_some());
    assert!(vault.query(DEFAULT_SERVICE, "note").unwrap().is_none());
}

// ============================================================================
// Validation and transport passthrough
// ============================================================================

#[tokio::test]
async fn test_secure_request_passthrough() {
    let h = harness();

    let response: Value = h
        .service
        .secure_request("https://api.example.com/v1/ping", HttpMethod::Get, &Map::new(), &[])
        .await
        .unwrap();
    assert_eq!(response["path"], "/v1/ping");

    let blocked: keyward_service::Result<Value> = h
        .service
        .secure_request("https://elsewhere.example.com/", HttpMethod::Get, &Map::new(), &[])
        .await;
    assert!(matches!(
        blocked,
        Err(Error::Network(NetworkError::UntrustedHost(_)))
    ));
    assert_eq!(h.connector.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_validation_passthrough() {
    let h = harness();
    assert!(h.service.validate_email("a@b.co"));
    assert!(!h.service.validate_password("abc").is_valid());
    assert_eq!(h.service.sanitize_input("<b>"), "&lt;b&gt;");
}
