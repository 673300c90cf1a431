//! Credential pool with health tracking, rotation, temporary disablement,
//! and auto-recovery.
//!
//! All mutable state lives behind one `Mutex`; every operation takes the
//! lock once, so counters cannot lose updates under concurrent reporting.
//! Disable windows are keyed off the injectable [`Clock`] so tests simulate
//! elapsed time instead of sleeping.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::core::clock::Clock;
use crate::core::config::PoolConfig;
use crate::error::{AbexError, Result};

// =============================================================================
// Keys and identity
// =============================================================================

/// A credential handed out by the pool. Cloneable; the secret is only
/// reachable through [`ApiKey::secret`] and never printed.
#[derive(Clone)]
pub struct ApiKey {
    index: usize,
    id: String,
    secret: String,
}

impl ApiKey {
    /// Slot index within the pool.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Stable identifier (`key_1`, `key_2`, ...).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The raw secret, for the `Authorization` header only.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Non-reversible fingerprint for logs and statistics.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.secret)
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// SHA-256 of the secret, first 8 bytes, hex encoded.
#[must_use]
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(&digest[..8])
}

/// Why a call against a credential failed, for health bookkeeping and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimit,
    AuthError,
    ServerError,
    Timeout,
    Network,
    Malformed,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RateLimit => "rate_limit",
            Self::AuthError => "auth_error",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Malformed => "malformed",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Pool state
// =============================================================================

#[derive(Debug, Default)]
struct KeyState {
    consecutive_failures: u32,
    total_attempts: u64,
    total_successes: u64,
    disabled_until: Option<Instant>,
    last_used_at: Option<DateTime<Utc>>,
}

impl KeyState {
    fn is_available(&mut self, now: Instant) -> bool {
        match self.disabled_until {
            None => true,
            Some(until) if now >= until => {
                // Auto-recovery: the window elapsed, trust is restored.
                self.disabled_until = None;
                self.consecutive_failures = 0;
                true
            }
            Some(_) => false,
        }
    }
}

#[derive(Debug)]
struct PoolInner {
    cursor: usize,
    states: Vec<KeyState>,
}

/// Read-only health snapshot for one credential. Carries the fingerprint,
/// never the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    pub id: String,
    pub fingerprint: String,
    pub disabled: bool,
    pub consecutive_failures: u32,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl KeyStats {
    /// Successes over attempts, 0.0 when unused.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.total_successes as f64 / self.total_attempts as f64
        }
    }
}

/// Pool of API credentials with rotation and per-key health state.
pub struct KeyPool {
    keys: Vec<ApiKey>,
    inner: Mutex<PoolInner>,
    config: PoolConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPool")
            .field("keys", &self.keys.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KeyPool {
    /// Build a pool from raw secrets, in rotation order.
    ///
    /// # Errors
    ///
    /// Returns [`AbexError::NoCredentials`] for an empty list.
    pub fn new(secrets: Vec<String>, config: PoolConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if secrets.is_empty() {
            return Err(AbexError::NoCredentials);
        }
        let keys: Vec<ApiKey> = secrets
            .into_iter()
            .enumerate()
            .map(|(i, secret)| ApiKey {
                index: i,
                id: format!("key_{}", i + 1),
                secret,
            })
            .collect();
        let states = keys.iter().map(|_| KeyState::default()).collect();
        info!(count = keys.len(), "credential pool initialized");
        Ok(Self {
            keys,
            inner: Mutex::new(PoolInner { cursor: 0, states }),
            config,
            clock,
        })
    }

    /// Number of credentials in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false: construction rejects empty pools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Select the next available credential.
    ///
    /// Scans from the cursor, skipping disabled slots (clearing any whose
    /// window has elapsed), and leaves the cursor one past the returned
    /// slot. With rotation off, always serves the first available slot
    /// without moving the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`AbexError::PoolExhausted`] when every credential is
    /// currently disabled.
    pub fn select_key(&self) -> Result<ApiKey> {
        let now = self.clock.now();
        let n = self.keys.len();
        let mut inner = self.lock();
        let start = if self.config.rotation_enabled {
            inner.cursor
        } else {
            0
        };
        for offset in 0..n {
            let pos = (start + offset) % n;
            if inner.states[pos].is_available(now) {
                if self.config.rotation_enabled {
                    inner.cursor = (pos + 1) % n;
                }
                debug!(key = %self.keys[pos].id, "credential selected");
                return Ok(self.keys[pos].clone());
            }
        }
        warn!("all credentials disabled");
        Err(AbexError::PoolExhausted)
    }

    /// Record a successful call. Consecutive failures decay by one per
    /// success rather than resetting, so a flapping credential regains
    /// trust gradually.
    pub fn report_success(&self, key: &ApiKey) {
        let mut inner = self.lock();
        let state = &mut inner.states[key.index];
        state.total_attempts += 1;
        state.total_successes += 1;
        state.consecutive_failures = state.consecutive_failures.saturating_sub(1);
        state.last_used_at = Some(Utc::now());
        debug!(key = %key.id, "success reported");
    }

    /// Record a failed call; disables the credential once its consecutive
    /// failures reach the configured threshold.
    pub fn report_failure(&self, key: &ApiKey, kind: FailureKind) {
        let now = self.clock.now();
        let mut inner = self.lock();
        let state = &mut inner.states[key.index];
        state.total_attempts += 1;
        state.consecutive_failures += 1;
        state.last_used_at = Some(Utc::now());
        debug!(key = %key.id, %kind, failures = state.consecutive_failures, "failure reported");
        if state.consecutive_failures >= self.config.max_failure_count
            && state.disabled_until.is_none()
        {
            state.disabled_until = Some(now + self.config.disable_duration());
            warn!(
                key = %key.id,
                fingerprint = %key.fingerprint(),
                duration_secs = self.config.disable_duration_secs,
                "credential disabled after repeated failures"
            );
        }
    }

    /// Advance the cursor one slot unconditionally. Used to force variety
    /// across successive attempts even when no failure occurred.
    pub fn rotate(&self) {
        let n = self.keys.len();
        let mut inner = self.lock();
        inner.cursor = (inner.cursor + 1) % n;
    }

    /// Health snapshot for every credential, in slot order.
    #[must_use]
    pub fn statistics(&self) -> Vec<KeyStats> {
        let now = self.clock.now();
        let inner = self.lock();
        self.keys
            .iter()
            .zip(&inner.states)
            .map(|(key, state)| KeyStats {
                id: key.id.clone(),
                fingerprint: key.fingerprint(),
                disabled: state.disabled_until.is_some_and(|until| now < until),
                consecutive_failures: state.consecutive_failures,
                total_attempts: state.total_attempts,
                total_successes: state.total_successes,
                last_used_at: state.last_used_at,
            })
            .collect()
    }

    /// Zero every counter while leaving disable windows intact.
    pub fn reset_statistics(&self) {
        let mut inner = self.lock();
        for state in &mut inner.states {
            state.consecutive_failures = 0;
            state.total_attempts = 0;
            state.total_successes = 0;
            state.last_used_at = None;
        }
        info!("credential statistics reset");
    }

    /// Clear every disable window immediately.
    pub fn enable_all_keys(&self) {
        let mut inner = self.lock();
        for state in &mut inner.states {
            state.disabled_until = None;
            state.consecutive_failures = 0;
        }
        info!("all credentials re-enabled");
    }
}

// =============================================================================
// Tests
// =============================================================================
