//! Circuit Breaker (§4.4), grounded on the original's `CircuitBreaker`:
//! `closed` → `open` → `half_open` → `closed`, with an RPC-level timeout
//! wrapping every call.

use parking_lot::Mutex;
use serde::Serialize;
use sp_domain::{CircuitBreakerConfig, Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

#[derive(Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time_secs_ago: Option<f64>,
    pub threshold: u32,
    pub recovery_timeout_secs: u64,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner { state: CircuitState::Closed, failure_count: 0, last_failure_time: None }),
        }
    }

    /// Execute `f` under circuit-breaker protection and an RPC-level
    /// timeout. Returns `Error::CircuitOpen` without invoking `f` at all
    /// when the circuit is open and the recovery timeout hasn't elapsed.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Open => {
                    if self.should_attempt_reset(&inner) {
                        inner.state = CircuitState::HalfOpen;
                        tracing::info!("circuit breaker entering half-open state");
                    } else {
                        return Err(Error::CircuitOpen("AI service unavailable".into()));
                    }
                }
                CircuitState::Closed | CircuitState::HalfOpen => {}
            }
        }

        let timeout = Duration::from_secs(self.config.call_timeout_secs);
        match tokio::time::timeout(timeout, f()).await {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.on_failure();
                Err(e)
            }
            Err(_) => {
                self.on_failure();
                Err(Error::AIServiceTimeout(format!("call timed out after {}s", self.config.call_timeout_secs)))
            }
        }
    }

    fn should_attempt_reset(&self, inner: &Inner) -> bool {
        match inner.last_failure_time {
            None => true,
            Some(t) => t.elapsed() >= Duration::from_secs(self.config.recovery_timeout_secs),
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!("circuit breaker reset to closed state");
        }
        inner.failure_count = 0;
        inner.state = CircuitState::Closed;
        inner.last_failure_time = None;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());

        if inner.failure_count >= self.config.failure_threshold {
            inner.state = CircuitState::Open;
            tracing::warn!(failures = inner.failure_count, "circuit breaker opened");
        } else if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            tracing::warn!("circuit breaker returned to open state");
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_time_secs_ago: inner.last_failure_time.map(|t| t.elapsed().as_secs_f64()),
            threshold: self.config.failure_threshold,
            recovery_timeout_secs: self.config.recovery_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CircuitBreakerConfig {
        CircuitBreakerConfig { failure_threshold: 2, recovery_timeout_secs: 0, call_timeout_secs: 10 }
    }

    async fn fail() -> Result<()> {
        Err(Error::Provider { provider: "test".into(), message: "boom".into() })
    }
    async fn ok() -> Result<u32> {
        Ok(42)
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(cfg());
        assert!(cb.call(|| fail()).await.is_err());
        assert_eq!(cb.snapshot().state, CircuitState::Closed);
        assert!(cb.call(|| fail()).await.is_err());
        assert_eq!(cb.snapshot().state, CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_calling() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { recovery_timeout_secs: 9999, ..cfg() });
        let _ = cb.call(|| fail()).await;
        let _ = cb.call(|| fail()).await;
        assert_eq!(cb.snapshot().state, CircuitState::Open);
        let result = cb.call(|| ok()).await;
        assert!(matches!(result, Err(Error::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn half_open_success_resets_to_closed() {
        let cb = CircuitBreaker::new(cfg());
        let _ = cb.call(|| fail()).await;
        let _ = cb.call(|| fail()).await;
        assert_eq!(cb.snapshot().state, CircuitState::Open);

        // recovery_timeout_secs == 0, so the next call transitions to half-open immediately.
        let result = cb.call(|| ok()).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(cb.snapshot().state, CircuitState::Closed);
        assert_eq!(cb.snapshot().failure_count, 0);
    }

    #[tokio::test]
    async fn half_open_failure_returns_to_open() {
        let cb = CircuitBreaker::new(cfg());
        let _ = cb.call(|| fail()).await;
        let _ = cb.call(|| fail()).await;
        let _ = cb.call(|| fail()).await; // half-open attempt, fails again
        assert_eq!(cb.snapshot().state, CircuitState::Open);
    }

    #[tokio::test]
    async fn call_timeout_yields_ai_service_timeout() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { call_timeout_secs: 0, ..cfg() });
        async fn slow() -> Result<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
        let result = cb.call(|| slow()).await;
        assert!(matches!(result, Err(Error::AIServiceTimeout(_))));
    }
}
