//! Circuit breaker guarding the metered extraction service.
//!
//! Extraction calls are rate-limited and costly, so after a run of
//! failures the breaker rejects calls outright instead of burning quota
//! on a service that is down.
//!
//! # States
//!
//! ```text
//! CLOSED (healthy) --[N failures]--> OPEN (rejecting) --[timeout]--> HALF_OPEN (probing)
//!                                                                         |
//!                                       <--[failure]--                    |
//!                                                                         |
//! CLOSED <---------------------------[success]----------------------------+
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::MonitorError;

/// Current state of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker thresholds and timeouts.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Successful probes in half-open state to close it again.
    pub success_threshold: u32,
    /// Wait before transitioning Open to HalfOpen.
    pub recovery_timeout: Duration,
    /// On a rate-limit failure, multiply the recovery timeout by this.
    pub rate_limit_backoff_multiplier: f32,
    /// Ceiling for the backed-off recovery timeout.
    pub max_recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
            rate_limit_backoff_multiplier: 2.0,
            max_recovery_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    current_recovery_timeout: Duration,
}

/// Error surface of a guarded call.
#[derive(Debug)]
pub enum CircuitError {
    /// Rejected without calling the service.
    Open { retry_after: Duration },
    /// The inner operation failed.
    Inner(MonitorError),
}

impl std::fmt::Display for CircuitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitError::Open { retry_after } => write!(
                f,
                "extraction circuit is open, retry after {} seconds",
                retry_after.as_secs()
            ),
            CircuitError::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CircuitError {}

/// Thread-safe circuit breaker.
#[derive(Clone)]
pub struct Circuit {
    config: CircuitConfig,
    inner: Arc<Mutex<CircuitInner>>,
}

impl Circuit {
    pub fn new(config: CircuitConfig) -> Self {
        let inner = CircuitInner {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            current_recovery_timeout: config.recovery_timeout,
        };
        Self {
            config,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned circuit mutex");
            poisoned.into_inner()
        })
    }

    /// Current state, handling lazy Open to HalfOpen transitions.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock_inner();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    /// Run the operation through the breaker.
    ///
    /// Only errors classified by [`MonitorError::should_trip_circuit`]
    /// count as failures; validation discards pass through without
    /// touching the failure count.
    pub async fn call<F, T, Fut>(&self, operation: F) -> Result<T, CircuitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MonitorError>>,
    {
        {
            let mut inner = self.lock_inner();
            self.maybe_half_open(&mut inner);

            if inner.state == CircuitState::Open {
                let retry_after = inner
                    .last_failure_time
                    .map(|t| {
                        inner
                            .current_recovery_timeout
                            .saturating_sub(t.elapsed())
                    })
                    .unwrap_or(inner.current_recovery_timeout);
                return Err(CircuitError::Open { retry_after });
            }
        }

        let result = operation().await;

        match &result {
            Ok(_) => self.record_success(),
            Err(e) if e.should_trip_circuit() => self.record_failure(e),
            Err(_) => {}
        }

        result.map_err(CircuitError::Inner)
    }

    pub fn record_success(&self) {
        let mut inner = self.lock_inner();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    tracing::info!(
                        probes = inner.success_count,
                        "Extraction circuit closing after successful probes"
                    );
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.current_recovery_timeout = self.config.recovery_timeout;
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, error: &MonitorError) {
        let mut inner = self.lock_inner();

        let is_rate_limit = matches!(error, MonitorError::RateLimited)
            || matches!(
                error,
                MonitorError::Extraction {
                    status_code: 429,
                    ..
                }
            );

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = inner.failure_count,
                        error = %error,
                        "Extraction circuit opening"
                    );
                    inner.state = CircuitState::Open;
                    if is_rate_limit {
                        self.extend_recovery(&mut inner);
                    }
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(error = %error, "Extraction circuit probe failed, reopening");
                inner.state = CircuitState::Open;
                inner.last_failure_time = Some(Instant::now());
                inner.success_count = 0;
                if is_rate_limit {
                    self.extend_recovery(&mut inner);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn extend_recovery(&self, inner: &mut CircuitInner) {
        inner.current_recovery_timeout = std::cmp::min(
            Duration::from_secs_f32(
                inner.current_recovery_timeout.as_secs_f32()
                    * self.config.rate_limit_backoff_multiplier,
            ),
            self.config.max_recovery_timeout,
        );
        tracing::info!(
            recovery_timeout_secs = inner.current_recovery_timeout.as_secs(),
            "Extended recovery timeout after rate limit"
        );
    }

    fn maybe_half_open(&self, inner: &mut CircuitInner) {
        if inner.state == CircuitState::Open
            && let Some(last_failure) = inner.last_failure_time
            && last_failure.elapsed() >= inner.current_recovery_timeout
        {
            tracing::info!("Extraction circuit transitioning to half-open");
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
        }
    }
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}
