// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery queue trait: durable, at-least-once, broker-agnostic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BdayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DeadLetter, NackOutcome, QueueDepth, QueueEnvelope};

/// At-least-once queue with visibility timeouts and dead-lettering.
///
/// Enqueued envelopes must survive a process restart. No ordering is
/// guaranteed beyond "not visible before `visible_at`".
#[async_trait]
pub trait DeliveryQueue: PluginAdapter {
    /// Add an envelope for `message_id` that stays hidden until `visible_at`.
    async fn enqueue(
        &self,
        message_id: &str,
        visible_at: DateTime<Utc>,
    ) -> Result<QueueEnvelope, BdayError>;

    /// Lease up to `batch_size` visible envelopes, hiding each for `visibility_timeout`.
    async fn dequeue(
        &self,
        batch_size: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueEnvelope>, BdayError>;

    /// Restart the lease on `envelope` so it stays hidden for another
    /// `visibility_timeout`. `false` once another consumer has leased it or
    /// it is gone.
    async fn extend_lease(
        &self,
        envelope: &QueueEnvelope,
        visibility_timeout: Duration,
    ) -> Result<bool, BdayError>;

    /// Permanently remove a leased envelope. `false` if the lease was lost.
    async fn ack(&self, envelope: &QueueEnvelope) -> Result<bool, BdayError>;

    /// Return a leased envelope for redelivery after `redeliver_after`,
    /// counting one attempt. Dead-letters it once attempts reach the limit.
    async fn nack(
        &self,
        envelope: &QueueEnvelope,
        redeliver_after: Duration,
    ) -> Result<NackOutcome, BdayError>;

    /// Return a leased envelope after `delay` without counting an attempt.
    async fn release(&self, envelope: &QueueEnvelope, delay: Duration) -> Result<bool, BdayError>;

    /// Move a leased envelope straight to the dead-letter channel.
    async fn dead_letter(&self, envelope: &QueueEnvelope, reason: &str) -> Result<(), BdayError>;

    /// Whether any pending or leased envelope references `message_id`.
    async fn has_live_entry(&self, message_id: &str) -> Result<bool, BdayError>;

    async fn depth(&self) -> Result<QueueDepth, BdayError>;

    /// Most recent dead letters first.
    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, BdayError>;
}
