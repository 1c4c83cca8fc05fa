//! Biometric gate
//!
//! Requires a live user-presence check before sensitive operations. The
//! platform prompt sits behind [`BiometricChallenger`]; the gate owns the
//! session, the failure counter and the one-prompt-at-a-time rule.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Maximum consecutive failed challenges before lockout
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Default session lifetime in seconds
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 300;

/// Enrolled biometric modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricKind {
    /// Face ID / face unlock
    Face,
    /// Touch ID / fingerprint
    Fingerprint,
    /// Iris scan
    Iris,
    /// Device passcode only
    None,
}

impl BiometricKind {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            BiometricKind::Face => "Face",
            BiometricKind::Fingerprint => "Fingerprint",
            BiometricKind::Iris => "Iris",
            BiometricKind::None => "None",
        }
    }
}

/// Result of a capability query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// Hardware present and enrolled
    Available(BiometricKind),
    /// No hardware, or nothing enrolled
    Unavailable(String),
}

impl Availability {
    /// Check if a challenge can be presented
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }

    /// Enrolled modality, `None` when unavailable
    pub fn kind(&self) -> Option<BiometricKind> {
        match self {
            Availability::Available(kind) => Some(*kind),
            Availability::Unavailable(_) => None,
        }
    }
}

/// How a platform challenge resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// User verified
    Success,
    /// Challenge ran and did not match
    Failed(String),
    /// User dismissed the prompt
    Cancelled,
    /// Platform could not present a challenge
    Unavailable(String),
}

/// Platform biometric capability
///
/// One production adapter per target platform; [`MockChallenger`] for tests.
#[async_trait]
pub trait BiometricChallenger: Send + Sync {
    /// Query hardware and enrollment. Must not be cached by the implementation.
    fn availability(&self) -> Availability;

    /// Present the system prompt and wait for it to resolve
    async fn evaluate(&self, reason: &str) -> ChallengeOutcome;
}

/// Session expiry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Seconds a session stays valid; `None` disables the timeout
    pub timeout_secs: Option<u64>,
    /// End the session when the app moves to the background
    pub expire_on_background: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: Some(DEFAULT_SESSION_TIMEOUT_SECS),
            expire_on_background: true,
        }
    }
}

impl SessionPolicy {
    /// Session lifetime
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Proof that the user passed a challenge
#[derive(Debug, Clone)]
pub struct AuthenticationSession {
    /// Modality that was used
    pub kind: BiometricKind,
    /// Wall-clock time of the challenge
    pub authenticated_at: DateTime<Utc>,
    started: Instant,
}

impl AuthenticationSession {
    fn new(kind: BiometricKind) -> Self {
        Self {
            kind,
            authenticated_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Time since the challenge passed
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    fn is_expired(&self, policy: &SessionPolicy) -> bool {
        policy.timeout().is_some_and(|timeout| self.age() >= timeout)
    }
}

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Capability not queried yet
    Unevaluated,
    /// Hardware present and enrolled
    Available,
    /// No hardware or enrollment
    Unavailable,
    /// A prompt is on screen
    AuthenticationInFlight,
    /// Session is live
    Authenticated,
    /// Last challenge did not match
    Failed,
    /// Last challenge was dismissed
    Cancelled,
    /// Too many failures
    LockedOut,
}

struct GateInner {
    state: GateState,
    availability: Option<Availability>,
    session: Option<AuthenticationSession>,
    failed_attempts: u32,
    last_failure: Option<AuthError>,
}

impl GateInner {
    fn idle_state(&self) -> GateState {
        match self.availability {
            Some(Availability::Available(_)) => GateState::Available,
            Some(Availability::Unavailable(_)) => GateState::Unavailable,
            None => GateState::Unevaluated,
        }
    }

    fn end_session(&mut self) {
        if self.session.take().is_some() && self.state == GateState::Authenticated {
            self.state = self.idle_state();
        }
    }

    fn expire_if_stale(&mut self, policy: &SessionPolicy) {
        if self.session.as_ref().is_some_and(|s| s.is_expired(policy)) {
            debug!("Authentication session timed out");
            self.end_session();
        }
    }
}

/// Restores the gate when an `authenticate` future is dropped mid-challenge
struct AbandonedChallenge<'a> {
    inner: &'a Mutex<GateInner>,
    armed: bool,
}

impl Drop for AbandonedChallenge<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.state == GateState::AuthenticationInFlight {
            debug!("Challenge abandoned by caller");
            inner.state = GateState::Cancelled;
            inner.last_failure = Some(AuthError::Cancelled);
        }
    }
}

/// Biometric gate
///
/// At most one challenge is in flight per gate; a concurrent `authenticate`
/// is rejected with [`AuthError::InProgress`] rather than queued.
pub struct BiometricGate {
    challenger: Arc<dyn BiometricChallenger>,
    policy: SessionPolicy,
    inner: Mutex<GateInner>,
    in_flight: tokio::sync::Mutex<()>,
    cancel: Notify,
}

impl BiometricGate {
    /// Create gate over a platform challenger
    pub fn new(challenger: Arc<dyn BiometricChallenger>, policy: SessionPolicy) -> Self {
        Self {
            challenger,
            policy,
            inner: Mutex::new(GateInner {
                state: GateState::Unevaluated,
                availability: None,
                session: None,
                failed_attempts: 0,
                last_failure: None,
            }),
            in_flight: tokio::sync::Mutex::new(()),
            cancel: Notify::new(),
        }
    }

    /// Session policy
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Query the platform and refresh the cached capability
    ///
    /// Enrollment can change between launches, so this always asks the
    /// platform. Use [`BiometricGate::cached_availability`] for the last answer.
    pub fn check_availability(&self) -> Availability {
        let availability = self.challenger.availability();
        debug!("Biometric availability: {:?}", availability);

        let mut inner = self.inner.lock();
        inner.availability = Some(availability.clone());
        if matches!(
            inner.state,
            GateState::Unevaluated | GateState::Available | GateState::Unavailable
        ) {
            inner.state = inner.idle_state();
        }
        availability
    }

    /// Last capability answer, if any
    pub fn cached_availability(&self) -> Option<Availability> {
        self.inner.lock().availability.clone()
    }

    /// Run a challenge
    ///
    /// Returns `Ok(true)` when the user passed and `Ok(false)` when the
    /// challenge ran and did not match. Missing hardware or enrollment,
    /// dismissal, lockout and a concurrent prompt are errors. Every failure
    /// is recorded and readable through [`BiometricGate::last_failure`].
    pub async fn authenticate(&self, reason: &str) -> AuthResult<bool> {
        let _guard = self.in_flight.try_lock().map_err(|_| {
            debug!("Rejecting authenticate: challenge already in flight");
            AuthError::InProgress
        })?;

        if self.is_locked_out() {
            warn!("Biometric gate locked out, not prompting");
            self.inner.lock().last_failure = Some(AuthError::LockedOut);
            return Err(AuthError::LockedOut);
        }

        let kind = match self.check_availability() {
            Availability::Available(kind) => kind,
            Availability::Unavailable(why) => {
                let error = AuthError::ConfigurationUnavailable(why);
                self.inner.lock().last_failure = Some(error.clone());
                return Err(error);
            }
        };

        // Register for cancel() before the in-flight state is visible
        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        self.inner.lock().state = GateState::AuthenticationInFlight;
        let mut abandoned = AbandonedChallenge {
            inner: &self.inner,
            armed: true,
        };
        info!("Presenting {} challenge", kind.name());

        let outcome = tokio::select! {
            outcome = self.challenger.evaluate(reason) => outcome,
            _ = &mut cancelled => ChallengeOutcome::Cancelled,
        };
        abandoned.armed = false;

        let mut inner = self.inner.lock();
        match outcome {
            ChallengeOutcome::Success => {
                info!("Biometric challenge passed");
                inner.failed_attempts = 0;
                inner.last_failure = None;
                inner.session = Some(AuthenticationSession::new(kind));
                inner.state = GateState::Authenticated;
                Ok(true)
            }
            ChallengeOutcome::Failed(why) => {
                inner.session = None;
                inner.failed_attempts += 1;
                inner.last_failure = Some(AuthError::AuthenticationFailed(why));
                if inner.failed_attempts >= MAX_FAILED_ATTEMPTS {
                    warn!(
                        "Biometric gate locked out after {} failures",
                        inner.failed_attempts
                    );
                    inner.state = GateState::LockedOut;
                } else {
                    debug!("Biometric challenge failed ({})", inner.failed_attempts);
                    inner.state = GateState::Failed;
                }
                Ok(false)
            }
            ChallengeOutcome::Cancelled => {
                debug!("Biometric challenge cancelled");
                inner.state = GateState::Cancelled;
                inner.last_failure = Some(AuthError::Cancelled);
                Err(AuthError::Cancelled)
            }
            ChallengeOutcome::Unavailable(why) => {
                warn!("Biometric capability disappeared during challenge");
                inner.availability = Some(Availability::Unavailable(why.clone()));
                inner.state = GateState::Unavailable;
                let error = AuthError::ConfigurationUnavailable(why);
                inner.last_failure = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Resolve the in-flight challenge as cancelled. No-op when idle.
    pub fn cancel(&self) {
        self.cancel.notify_waiters();
    }

    /// Check for a live session, expiring it first if it timed out
    pub fn is_authenticated(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.expire_if_stale(&self.policy);
        inner.session.is_some()
    }

    /// Current session, if live
    pub fn session(&self) -> Option<AuthenticationSession> {
        let mut inner = self.inner.lock();
        inner.expire_if_stale(&self.policy);
        inner.session.clone()
    }

    /// Clear the session. Safe from any state.
    pub fn logout(&self) {
        info!("Logging out of biometric session");
        self.inner.lock().end_session();
    }

    /// App moved to the background
    pub fn enter_background(&self) {
        if self.policy.expire_on_background {
            debug!("Ending session on background");
            self.inner.lock().end_session();
        }
    }

    /// Reason for the most recent failure
    pub fn last_failure(&self) -> Option<AuthError> {
        self.inner.lock().last_failure.clone()
    }

    /// Consecutive failed challenges
    pub fn failed_attempts(&self) -> u32 {
        self.inner.lock().failed_attempts
    }

    /// Check if locked out
    pub fn is_locked_out(&self) -> bool {
        self.inner.lock().failed_attempts >= MAX_FAILED_ATTEMPTS
    }

    /// Clear the failure counter (after a passcode fallback, for example)
    pub fn reset_lockout(&self) {
        let mut inner = self.inner.lock();
        inner.failed_attempts = 0;
        if inner.state == GateState::LockedOut {
            inner.state = inner.idle_state();
        }
    }

    /// Current state
    pub fn state(&self) -> GateState {
        let mut inner = self.inner.lock();
        inner.expire_if_stale(&self.policy);
        inner.state
    }
}

/// Scripted challenger for tests and headless builds
///
/// Outcomes are consumed in order; once the script is empty every challenge
/// succeeds.
pub struct MockChallenger {
    availability: Mutex<Availability>,
    outcomes: Mutex<VecDeque<ChallengeOutcome>>,
    delay: Duration,
    prompts: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: AtomicUsize,
}

struct ActivePrompt(Arc<AtomicUsize>);

impl Drop for ActivePrompt {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockChallenger {
    /// Challenger with the given enrolled modality
    pub fn new(kind: BiometricKind) -> Self {
        Self::with_availability(Availability::Available(kind))
    }

    /// Challenger on a device without usable biometrics
    pub fn unavailable(reason: &str) -> Self {
        Self::with_availability(Availability::Unavailable(reason.to_string()))
    }

    fn with_availability(availability: Availability) -> Self {
        Self {
            availability: Mutex::new(availability),
            outcomes: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            prompts: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Keep each prompt on screen for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue the outcome of a future challenge
    pub fn push_outcome(&self, outcome: ChallengeOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Simulate enrollment changes
    pub fn set_availability(&self, availability: Availability) {
        *self.availability.lock() = availability;
    }

    /// Number of prompts presented
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Highest number of prompts that were on screen at once
    pub fn max_concurrent_prompts(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BiometricChallenger for MockChallenger {
    fn availability(&self) -> Availability {
        self.availability.lock().clone()
    }

    async fn evaluate(&self, _reason: &str) -> ChallengeOutcome {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _active = ActivePrompt(self.active.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or(ChallengeOutcome::Success)
    }
}
