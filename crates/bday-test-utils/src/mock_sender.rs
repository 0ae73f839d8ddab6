// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock notification sender for deterministic testing.
//!
//! `MockSender` replays scripted outcomes in order and records every request
//! it receives. Once the script runs out, every send succeeds.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use bday_core::{
    AdapterType, BdayError, HealthStatus, NotificationSender, PluginAdapter, SendError,
    SendRequest,
};

/// A sender that returns pre-configured outcomes.
pub struct MockSender {
    script: Arc<Mutex<VecDeque<Result<(), SendError>>>>,
    fallback: Arc<Mutex<Result<(), SendError>>>,
    requests: Arc<Mutex<Vec<SendRequest>>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    latency: Duration,
}

impl MockSender {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(Ok(()))),
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            latency: Duration::ZERO,
        }
    }

    /// Replay `outcomes` in order, then succeed.
    pub fn with_outcomes(outcomes: Vec<Result<(), SendError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(outcomes))),
            ..Self::new()
        }
    }

    /// Every send sleeps for `latency` first.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn push_outcome(&self, outcome: Result<(), SendError>) {
        self.script.lock().await.push_back(outcome);
    }

    /// Outcome used once the script is empty.
    pub async fn set_fallback(&self, outcome: Result<(), SendError>) {
        *self.fallback.lock().await = outcome;
    }

    /// Number of times `send` was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `send` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<SendRequest> {
        self.requests.lock().await.clone()
    }

    /// Requests for one message id.
    pub async fn requests_for(&self, message_id: &str) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.message_id == message_id)
            .count()
    }
}

impl Default for MockSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockSender {
    fn name(&self) -> &str {
        "mock-sender"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sender
    }

    async fn health_check(&self) -> Result<HealthStatus, BdayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BdayError> {
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for MockSender {
    async fn send(&self, request: &SendRequest) -> Result<(), SendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let scripted = self.script.lock().await.pop_front();
        let outcome = match scripted {
            Some(outcome) => outcome,
            None => self.fallback.lock().await.clone(),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
