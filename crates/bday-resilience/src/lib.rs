// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fault-tolerance primitives for the delivery path: a circuit breaker in
//! front of the notification sender and the retry backoff schedule.

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{ExponentialBackoff, retry};
pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitState, Rejected, Transition};
