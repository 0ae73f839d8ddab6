// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consecutive-failure circuit breaker guarding the notification sender.
//!
//! ```text
//! CLOSED --(threshold failures)--> OPEN --(cooldown)--> HALF_OPEN
//!   ^                                ^                      |
//!   +-------(probe success)----------|----------------------+
//!                                    +---(probe failure)----+
//! ```
//!
//! Only one probe runs while half-open. Callers take a [`CallPermit`] before
//! each call and report its outcome through it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bday_config::model::BreakerConfig;
use tokio::time::Instant;
use tracing::{info, warn};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Numeric encoding for gauges: closed 0, half-open 1, open 2.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change, reported to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Returned by [`CircuitBreaker::try_acquire`] while the breaker is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    /// Time until the breaker will admit a probe.
    pub retry_after: Duration,
}

type Observer = Arc<dyn Fn(Transition) + Send + Sync>;

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Shared breaker handle. Clones observe and drive the same state.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<Inner>>,
    failure_threshold: u32,
    cooldown: Duration,
    observer: Option<Observer>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failure_threshold", &self.failure_threshold)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            })),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            observer: None,
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.cooldown())
    }

    /// Call `observer` on every state change.
    pub fn with_observer(mut self, observer: impl Fn(Transition) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state. An open breaker whose cooldown has passed still reports
    /// `Open` until the next caller turns it half-open.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask to make a call. Fails fast while open.
    pub fn try_acquire(&self) -> Result<CallPermit, Rejected> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(self.permit(false)),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed < self.cooldown {
                    return Err(Rejected {
                        retry_after: self.cooldown - elapsed,
                    });
                }
                inner.probe_in_flight = true;
                let transition = Self::set_state(&mut inner, CircuitState::HalfOpen);
                drop(inner);
                self.notify(transition);
                Ok(self.permit(true))
            }
            CircuitState::HalfOpen if inner.probe_in_flight => Err(Rejected {
                retry_after: self.cooldown,
            }),
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Ok(self.permit(true))
            }
        }
    }

    fn permit(&self, probe: bool) -> CallPermit {
        CallPermit {
            breaker: self.clone(),
            probe,
            settled: false,
        }
    }

    fn set_state(inner: &mut Inner, to: CircuitState) -> Option<Transition> {
        let from = inner.state;
        if from == to {
            return None;
        }
        inner.state = to;
        match to {
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {}
        }
        Some(Transition { from, to })
    }

    fn notify(&self, transition: Option<Transition>) {
        let Some(transition) = transition else {
            return;
        };
        match transition.to {
            CircuitState::Open => warn!(
                from = %transition.from,
                cooldown_secs = self.cooldown.as_secs(),
                "circuit breaker opened"
            ),
            _ => info!(from = %transition.from, to = %transition.to, "circuit breaker transition"),
        }
        if let Some(observer) = &self.observer {
            observer(transition);
        }
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        let transition = match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen if probe => {
                inner.probe_in_flight = false;
                Self::set_state(&mut inner, CircuitState::Closed)
            }
            // A call admitted before the breaker opened; its late success proves nothing.
            _ => None,
        };
        drop(inner);
        self.notify(transition);
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.lock();
        let transition = match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.failure_threshold {
                    Self::set_state(&mut inner, CircuitState::Open)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen if probe => {
                inner.probe_in_flight = false;
                Self::set_state(&mut inner, CircuitState::Open)
            }
            _ => None,
        };
        drop(inner);
        self.notify(transition);
    }

    fn on_abandon(&self, probe: bool) {
        if probe {
            self.lock().probe_in_flight = false;
        }
    }
}

/// Admission for one call. Report the outcome with [`success`](Self::success)
/// or [`failure`](Self::failure); dropping it unreported frees the probe slot.
#[must_use = "report the call outcome through the permit"]
pub struct CallPermit {
    breaker: CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl fmt::Debug for CallPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPermit")
            .field("probe", &self.probe)
            .finish()
    }
}

impl CallPermit {
    /// Whether this call is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandon(self.probe);
        }
    }
}
