//! Retry/fallback orchestrator.
//!
//! For one task: iterate catalog entries outer-loop, attempts inner-loop,
//! selecting a credential before every call and reporting the outcome back.
//! Rate limiting is the only outcome that sleeps, auth failures force a
//! different credential immediately, and malformed responses retry the same
//! (endpoint, model) entry. Exhaustion degrades to a sentinel-filled record;
//! `extract` always returns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::core::clock::Clock;
use crate::core::config::{DispatchConfig, ExtractorConfig, ModelEndpoint};
use crate::core::decode::decode_record;
use crate::core::http::{CallOutcome, ChatRequest, build_client, execute_chat};
use crate::core::pool::{FailureKind, KeyPool, KeyStats};
use crate::core::prompt::SYSTEM_PROMPT;
use crate::core::record::{ExtractField, ExtractedRecord, UNTITLED};
use crate::error::Result;

// =============================================================================
// Cancellation
// =============================================================================

/// Shared cancellation signal, checked between attempts. In-flight calls are
/// bounded by the per-call timeout and not killed early.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// One unit of work: a prompt plus per-field overrides that always win over
/// decoded values.
#[derive(Debug, Clone)]
pub struct ExtractTask {
    pub prompt: String,
    pub overrides: BTreeMap<ExtractField, String>,
}

impl ExtractTask {
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            overrides: BTreeMap::new(),
        }
    }

    /// Pin the original title from caller input. Blank titles are ignored
    /// and fall back to the untitled sentinel.
    #[must_use]
    pub fn with_title(mut self, title: &str) -> Self {
        if !title.trim().is_empty() {
            self.overrides
                .insert(ExtractField::OriginalTitle, title.trim().to_string());
        }
        self
    }

    #[must_use]
    pub fn with_override(mut self, field: ExtractField, value: impl Into<String>) -> Self {
        self.overrides.insert(field, value.into());
        self
    }

    /// Overrides with the original-title slot guaranteed present. The title
    /// is never taken from a provider payload.
    fn effective_overrides(&self) -> BTreeMap<ExtractField, String> {
        let mut overrides = self.overrides.clone();
        overrides
            .entry(ExtractField::OriginalTitle)
            .or_insert_with(|| UNTITLED.to_string());
        overrides
    }

    /// The review-sentinel record for this task, with overrides applied.
    /// Used when the task is skipped without any attempt, for example an
    /// empty prompt source.
    #[must_use]
    pub fn fallback_record(&self) -> ExtractedRecord {
        ExtractedRecord::fallback(&self.effective_overrides())
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Drives extraction tasks across the credential pool and the catalog.
pub struct Dispatcher {
    client: Client,
    pool: Arc<KeyPool>,
    catalog: Vec<ModelEndpoint>,
    config: DispatchConfig,
    cancel: CancelFlag,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build a dispatcher from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid config, or
    /// [`crate::AbexError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &ExtractorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(KeyPool::new(
            config.api_keys.clone(),
            config.pool.clone(),
            clock,
        )?);
        let client = build_client(config.dispatch.call_timeout())?;
        Ok(Self {
            client,
            pool,
            catalog: config.catalog.clone(),
            config: config.dispatch.clone(),
            cancel: CancelFlag::new(),
        })
    }

    /// Handle for cancelling in-progress extractions from another task.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Per-credential health snapshots.
    #[must_use]
    pub fn pool_statistics(&self) -> Vec<KeyStats> {
        self.pool.statistics()
    }

    /// The underlying credential pool, for administrative operations.
    #[must_use]
    pub fn pool(&self) -> &KeyPool {
        &self.pool
    }

    /// Run one extraction to completion.
    ///
    /// Always returns a total record. Network, auth, rate-limit, and
    /// malformed-response failures are recovered internally; exhausting
    /// every config and retry yields the review-sentinel record.
    pub async fn extract(&self, task: &ExtractTask) -> ExtractedRecord {
        let overrides = task.effective_overrides();
        let mut total_attempts: u32 = 0;

        'catalog: for entry in &self.catalog {
            debug!(config = %entry, "trying catalog entry");
            for attempt in 0..self.config.max_retries_per_config {
                if self.cancel.is_cancelled() {
                    info!("extraction cancelled");
                    break 'catalog;
                }
                if total_attempts >= self.config.max_total_attempts {
                    debug!(total_attempts, "total attempt budget spent");
                    break 'catalog;
                }
                let Ok(key) = self.pool.select_key() else {
                    warn!("no usable credential anywhere");
                    break 'catalog;
                };

                // Courtesy delay, independent of the 429 backoff.
                tokio::time::sleep(self.config.request_delay()).await;
                total_attempts += 1;

                let request = ChatRequest::extraction(&entry.model, SYSTEM_PROMPT, &task.prompt);
                let outcome = execute_chat(&self.client, &entry.endpoint, &key, &request).await;
                match outcome {
                    CallOutcome::Success(text) => {
                        self.pool.report_success(&key);
                        if let Some(record) = decode_record(&text, &overrides) {
                            info!(config = %entry, total_attempts, "extraction succeeded");
                            return record;
                        }
                        // Formatting fluke, not a service problem: stay on
                        // this config.
                        debug!(config = %entry, "response decoded to no JSON object");
                        self.pool.report_failure(&key, FailureKind::Malformed);
                    }
                    CallOutcome::RateLimited => {
                        self.pool.report_failure(&key, FailureKind::RateLimit);
                        let delay = backoff_delay(&self.config, attempt);
                        debug!(?delay, "rate limited, backing off");
                        tokio::time::sleep(delay).await;
                    }
                    CallOutcome::AuthFailed(status) => {
                        self.pool.report_failure(&key, FailureKind::AuthError);
                        self.pool.rotate();
                        warn!(key = %key.id(), status, "auth failure, forcing rotation");
                    }
                    other => {
                        if let Some(kind) = other.failure_kind() {
                            debug!(config = %entry, %kind, "attempt failed");
                            self.pool.report_failure(&key, kind);
                        }
                    }
                }
            }
        }

        warn!(total_attempts, "extraction exhausted, returning review record");
        ExtractedRecord::fallback(&overrides)
    }
}

/// Exponential backoff for rate limiting: `base * 2^attempt` plus up to one
/// extra base interval of jitter, capped.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn backoff_delay(config: &DispatchConfig, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(16);
    let exponential = config.base_backoff_ms.saturating_mul(factor);
    let jitter = (rand::random::<f64>() * config.base_backoff_ms as f64) as u64;
    let total = exponential.saturating_add(jitter).min(config.max_backoff_ms);
    Duration::from_millis(total)
}

// =============================================================================
// Tests
// =============================================================================
