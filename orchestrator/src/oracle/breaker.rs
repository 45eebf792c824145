//! Per-oracle circuit breakers and the retry/tier fallback walk.
//!
//! Breaker state lives in a service object owned by the run context, never a
//! process-wide singleton, so concurrent runs cannot cross-contaminate
//! failure counters. The fallback chain is an explicit ordered tier list
//! walked iteratively with a visited set.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::oracle::error::OracleError;

/// The oracle a breaker guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    Research,
    Planning,
    Critique,
    Assets,
    Render,
}

/// Retry and breaker policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per tier before falling through to the next one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Consecutive failures before the breaker opens.
    pub breaker_threshold: u32,
    /// Cooldown for breakers opened by transient failures. Breakers tripped
    /// by `Unavailable` stay open for the whole run.
    pub breaker_cooldown_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
            breaker_threshold: 3,
            breaker_cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BreakerState {
    consecutive_failures: u32,
    /// `Some(None)`: open for the run. `Some(Some(t))`: open until `t`.
    open: Option<Option<Instant>>,
}

/// Failure counters and cooldowns for every oracle, one instance per run.
#[derive(Debug, Default)]
pub struct BreakerSet {
    states: Mutex<HashMap<OracleKind, BreakerState>>,
}

impl BreakerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether calls to `kind` are currently short-circuited.
    pub fn is_open(&self, kind: OracleKind) -> bool {
        let mut states = self.lock();
        let state = states.entry(kind).or_default();
        match state.open {
            None => false,
            Some(None) => true,
            Some(Some(until)) => {
                if Instant::now() >= until {
                    // Cooldown elapsed: half-open, let the next call probe.
                    state.open = None;
                    state.consecutive_failures = 0;
                    false
                } else {
                    true
                }
            }
        }
    }

    pub fn record_success(&self, kind: OracleKind) {
        let mut states = self.lock();
        let state = states.entry(kind).or_default();
        state.consecutive_failures = 0;
        state.open = None;
    }

    /// Record a transient failure; opens with a cooldown at the threshold.
    pub fn record_failure(&self, kind: OracleKind, config: &RetryConfig) {
        let mut states = self.lock();
        let state = states.entry(kind).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= config.breaker_threshold && state.open.is_none() {
            warn!(oracle = ?kind, failures = state.consecutive_failures, "breaker opened");
            state.open = Some(Some(
                Instant::now() + Duration::from_millis(config.breaker_cooldown_ms),
            ));
        }
    }

    /// Open the breaker for the rest of the run (unavailable oracle).
    pub fn trip(&self, kind: OracleKind) {
        let mut states = self.lock();
        let state = states.entry(kind).or_default();
        warn!(oracle = ?kind, "breaker tripped for the run");
        state.open = Some(None);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<OracleKind, BreakerState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Call an oracle through the breaker, retry, and tier fallback policy.
///
/// Walks `tiers` in order (duplicates skipped via a visited set). Transient
/// failures retry with exponential backoff and jitter before falling through
/// to the next tier. `Unavailable` trips the breaker and returns immediately;
/// `Malformed` returns immediately for the caller's normalization pass.
pub fn call_with_retries<T>(
    breakers: &BreakerSet,
    kind: OracleKind,
    config: &RetryConfig,
    tiers: &[String],
    mut call: impl FnMut(&str) -> Result<T, OracleError>,
) -> Result<T, OracleError> {
    if breakers.is_open(kind) {
        return Err(OracleError::Unavailable(format!(
            "breaker open for {kind:?}"
        )));
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut last_error = OracleError::Transient("no tiers configured".to_string());

    for tier in tiers {
        if !visited.insert(tier.as_str()) {
            continue;
        }
        for attempt in 1..=config.max_attempts.max(1) {
            match call(tier) {
                Ok(value) => {
                    breakers.record_success(kind);
                    return Ok(value);
                }
                Err(OracleError::Transient(message)) => {
                    debug!(oracle = ?kind, tier = %tier, attempt, %message, "transient failure");
                    breakers.record_failure(kind, config);
                    last_error = OracleError::Transient(message);
                    if attempt < config.max_attempts.max(1) {
                        thread::sleep(backoff_delay(config, attempt));
                    }
                }
                Err(OracleError::Unavailable(message)) => {
                    breakers.trip(kind);
                    return Err(OracleError::Unavailable(message));
                }
                Err(err @ OracleError::Malformed(_)) => return Err(err),
            }
        }
        warn!(oracle = ?kind, tier = %tier, "tier exhausted, falling through");
    }

    Err(last_error)
}

fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config
        .base_delay_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    let capped = base.min(config.max_delay_ms);
    let jitter = if capped > 1 {
        rand::thread_rng().gen_range(0..=capped / 2)
    } else {
        0
    };
    Duration::from_millis(capped.saturating_add(jitter))
}
