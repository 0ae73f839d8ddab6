// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pool: consumes the delivery queue and calls the notification sender.
//!
//! Per envelope:
//!
//! 1. Load the message; ack envelopes whose message is gone or final.
//! 2. Resolve the strategy and the user; a deleted or ineligible user
//!    cancels the message.
//! 3. Ask the circuit breaker; while open, release the envelope without
//!    spending an attempt.
//! 4. Renew the lease, then claim the message with `ENQUEUED -> SENDING`.
//!    A lease that another worker has taken over is left alone; losing the
//!    claim means another worker has the message, so the envelope is acked.
//! 5. Send under a timeout and record the outcome: `SENT`, `FAILED`, a
//!    rollback to `ENQUEUED` plus a nack with backoff, or the exhausted
//!    status plus dead-lettering.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bday_config::model::WorkerConfig;
use bday_core::{
    BdayError, DeliveryQueue, MessageStatus, NackOutcome, NotificationSender, QueueEnvelope,
    ScheduledMessage, SchedulingStore, SendError, SendRequest, UserDirectory,
};
use bday_resilience::{CircuitBreaker, ExponentialBackoff};
use bday_schedule::{FailureClass, StrategyRegistry};
use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::later;

/// What happened to one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    /// Permanent failure, or retries exhausted with `exhausted_status = failed`.
    Failed,
    DeadLettered,
    /// Rolled back to `ENQUEUED` and redelivered later.
    Retrying,
    Cancelled,
    /// The breaker was open; the envelope was released untouched.
    Deferred,
    /// Nothing to do: the message was already handled elsewhere.
    Skipped,
}

/// Everything a worker needs; shared by the whole pool.
pub struct DeliveryContext {
    pub store: Arc<dyn SchedulingStore>,
    pub queue: Arc<dyn DeliveryQueue>,
    pub directory: Arc<dyn UserDirectory>,
    pub sender: Arc<dyn NotificationSender>,
    pub registry: Arc<StrategyRegistry>,
    pub breaker: CircuitBreaker,
    pub backoff: ExponentialBackoff,
    pub config: WorkerConfig,
    pub visibility_timeout: Duration,
}

pub struct Worker {
    id: usize,
    ctx: Arc<DeliveryContext>,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<DeliveryContext>) -> Self {
        Self { id, ctx }
    }

    /// Lease one batch and process it. Returns the number of envelopes leased.
    pub async fn poll_once(&self) -> Result<usize, BdayError> {
        self.poll(&CancellationToken::new()).await
    }

    async fn poll(&self, token: &CancellationToken) -> Result<usize, BdayError> {
        let batch = self
            .ctx
            .queue
            .dequeue(self.ctx.config.batch_size, self.ctx.visibility_timeout)
            .await?;
        let leased = batch.len();

        let mut envelopes = batch.into_iter();
        for envelope in envelopes.by_ref() {
            if token.is_cancelled() {
                self.release_quietly(&envelope).await;
                break;
            }
            if let Err(e) = self.process(&envelope).await {
                // The lease expires and the envelope is redelivered.
                error!(
                    worker = self.id,
                    message_id = %envelope.message_id,
                    error = %e,
                    "envelope processing failed"
                );
            }
        }
        for envelope in envelopes {
            self.release_quietly(&envelope).await;
        }
        Ok(leased)
    }

    async fn release_quietly(&self, envelope: &QueueEnvelope) {
        if let Err(e) = self.ctx.queue.release(envelope, Duration::ZERO).await {
            warn!(envelope_id = envelope.id, error = %e, "release on shutdown failed");
        }
    }

    /// Drive one envelope to its next resting state.
    pub async fn process(&self, envelope: &QueueEnvelope) -> Result<Outcome, BdayError> {
        let ctx = &self.ctx;
        let Some(message) = ctx.store.get(&envelope.message_id).await? else {
            warn!(message_id = %envelope.message_id, "envelope for unknown message, dropping");
            ctx.queue.ack(envelope).await?;
            return Ok(Outcome::Skipped);
        };
        if message.status != MessageStatus::Enqueued {
            debug!(
                message_id = %message.id,
                status = %message.status,
                "message not enqueued, dropping envelope"
            );
            ctx.queue.ack(envelope).await?;
            return Ok(Outcome::Skipped);
        }

        let strategy = match ctx.registry.resolve(&message.message_type) {
            Ok(strategy) => strategy,
            Err(e) => {
                error!(message_id = %message.id, error = %e, "cannot deliver message");
                return self
                    .finish(envelope, &message, MessageStatus::Failed, &e.to_string())
                    .await;
            }
        };

        let user = match ctx.directory.get_user(&message.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                info!(
                    message_id = %message.id,
                    user_id = %message.user_id,
                    "user gone, cancelling"
                );
                return self
                    .finish(envelope, &message, MessageStatus::Cancelled, "user no longer exists")
                    .await;
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "directory lookup failed");
                let delay = ctx.backoff.delay(envelope.attempt_count + 1);
                return self.redeliver(envelope, &message, delay).await;
            }
        };
        if let Err(e) = strategy.validate(&user) {
            return self
                .finish(envelope, &message, MessageStatus::Cancelled, &e.to_string())
                .await;
        }
        if !strategy.should_send(&user, message.due_at_utc) {
            return self
                .finish(envelope, &message, MessageStatus::Cancelled, "no longer eligible")
                .await;
        }

        let permit = match ctx.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(rejected) => {
                debug!(
                    message_id = %message.id,
                    retry_after_ms = rejected.retry_after.as_millis() as u64,
                    "circuit open, deferring"
                );
                ctx.queue.release(envelope, rejected.retry_after).await?;
                return Ok(Outcome::Deferred);
            }
        };

        // Envelopes later in a batch may have outlived the lease taken at
        // dequeue time. The send must finish inside a lease this worker holds.
        if !ctx.queue.extend_lease(envelope, ctx.visibility_timeout).await? {
            debug!(message_id = %message.id, "lease taken over by another worker");
            drop(permit);
            return Ok(Outcome::Skipped);
        }

        if !ctx
            .store
            .transition(&message.id, MessageStatus::Enqueued, MessageStatus::Sending, None)
            .await?
        {
            debug!(message_id = %message.id, "claimed by another worker");
            drop(permit);
            ctx.queue.ack(envelope).await?;
            return Ok(Outcome::Skipped);
        }
        let attempt = message.attempt_count + 1;

        let request = SendRequest {
            message_id: message.id.clone(),
            user_id: user.id.clone(),
            message_type: message.message_type.clone(),
            idempotency_key: message.idempotency_key.clone(),
            content: strategy.compose_content(&user),
        };
        let started = Instant::now();
        let send_timeout = ctx.config.send_timeout();
        let result = tokio::time::timeout(send_timeout, ctx.sender.send(&request))
            .await
            .unwrap_or(Err(SendError::Timeout(send_timeout)));
        bday_prometheus::record_send_duration(started.elapsed().as_secs_f64());

        let error = match result {
            Ok(()) => {
                permit.success();
                if !ctx
                    .store
                    .transition(&message.id, MessageStatus::Sending, MessageStatus::Sent, None)
                    .await?
                {
                    warn!(message_id = %message.id, "sent, but status changed during the send");
                }
                ctx.queue.ack(envelope).await?;
                info!(
                    message_id = %message.id,
                    user_id = %message.user_id,
                    attempt,
                    "message sent"
                );
                bday_prometheus::record_sent(&message.message_type);
                bday_prometheus::record_delivery_attempts(&message.message_type, attempt);
                return Ok(Outcome::Sent);
            }
            Err(error) => error,
        };

        match strategy.classify_failure(&error) {
            FailureClass::Permanent => {
                // The downstream answered; it is healthy even if the request was bad.
                permit.success();
                warn!(message_id = %message.id, error = %error, "permanent send failure");
                ctx.store
                    .transition(
                        &message.id,
                        MessageStatus::Sending,
                        MessageStatus::Failed,
                        Some(&error.to_string()),
                    )
                    .await?;
                ctx.queue.ack(envelope).await?;
                bday_prometheus::record_failed(&message.message_type, error.kind());
                bday_prometheus::record_delivery_attempts(&message.message_type, attempt);
                Ok(Outcome::Failed)
            }
            FailureClass::Retryable if attempt >= ctx.config.max_attempts => {
                permit.failure();
                let status = ctx.config.exhausted_status.as_status();
                warn!(
                    message_id = %message.id,
                    attempt,
                    status = %status,
                    error = %error,
                    "retries exhausted"
                );
                let reason = format!("retries exhausted after {attempt} attempts: {error}");
                ctx.store
                    .transition(&message.id, MessageStatus::Sending, status, Some(&reason))
                    .await?;
                ctx.queue.dead_letter(envelope, &reason).await?;
                bday_prometheus::record_delivery_attempts(&message.message_type, attempt);
                if status == MessageStatus::DeadLettered {
                    bday_prometheus::record_dead_lettered(&message.message_type);
                    Ok(Outcome::DeadLettered)
                } else {
                    bday_prometheus::record_failed(&message.message_type, error.kind());
                    Ok(Outcome::Failed)
                }
            }
            FailureClass::Retryable => {
                permit.failure();
                let mut delay = ctx.backoff.delay(attempt);
                if let SendError::RateLimited {
                    retry_after: Some(retry_after),
                } = &error
                {
                    delay = delay.max(*retry_after);
                }
                warn!(
                    message_id = %message.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "send failed, retrying"
                );
                ctx.store
                    .transition(
                        &message.id,
                        MessageStatus::Sending,
                        MessageStatus::Enqueued,
                        Some(&error.to_string()),
                    )
                    .await?;
                self.redeliver(envelope, &message, delay).await
            }
        }
    }

    /// Record a final status for a message that never reached `SENDING`.
    async fn finish(
        &self,
        envelope: &QueueEnvelope,
        message: &ScheduledMessage,
        status: MessageStatus,
        reason: &str,
    ) -> Result<Outcome, BdayError> {
        self.ctx
            .store
            .transition(&message.id, MessageStatus::Enqueued, status, Some(reason))
            .await?;
        self.ctx.queue.ack(envelope).await?;
        if status == MessageStatus::Failed {
            bday_prometheus::record_failed(&message.message_type, "undeliverable");
            Ok(Outcome::Failed)
        } else {
            Ok(Outcome::Cancelled)
        }
    }

    /// Nack with `delay`. When the queue runs out of attempts it dead-letters
    /// the envelope and the message follows.
    async fn redeliver(
        &self,
        envelope: &QueueEnvelope,
        message: &ScheduledMessage,
        delay: Duration,
    ) -> Result<Outcome, BdayError> {
        match self.ctx.queue.nack(envelope, delay).await? {
            NackOutcome::Requeued { visible_at } => {
                debug!(message_id = %message.id, visible_at = %visible_at, "envelope requeued");
                Ok(Outcome::Retrying)
            }
            NackOutcome::DeadLettered => {
                warn!(message_id = %message.id, "queue attempts exhausted, dead-lettering");
                self.ctx
                    .store
                    .transition(
                        &message.id,
                        MessageStatus::Enqueued,
                        MessageStatus::DeadLettered,
                        Some("max attempts exceeded"),
                    )
                    .await?;
                bday_prometheus::record_dead_lettered(&message.message_type);
                Ok(Outcome::DeadLettered)
            }
            NackOutcome::Stale => {
                // The message is back in `ENQUEUED`; it needs an envelope.
                if self.ctx.queue.has_live_entry(&message.id).await? {
                    debug!(
                        message_id = %message.id,
                        "lease lost before nack, envelope held elsewhere"
                    );
                } else {
                    warn!(message_id = %message.id, "lease lost before nack, re-enqueuing");
                    self.ctx
                        .queue
                        .enqueue(&message.id, later(Utc::now(), delay))
                        .await?;
                }
                Ok(Outcome::Retrying)
            }
        }
    }

    /// Poll until cancelled, sleeping `poll_interval` after an empty poll or an error.
    pub async fn run(&self, token: CancellationToken) {
        debug!(worker = self.id, "worker started");
        while !token.is_cancelled() {
            let idle = match self.poll(&token).await {
                Ok(leased) => leased == 0,
                Err(e) => {
                    error!(worker = self.id, error = %e, "dequeue failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.ctx.config.poll_interval()) => {}
                }
            }
        }
        debug!(worker = self.id, "worker stopped");
    }
}

/// `concurrency` workers sharing one [`DeliveryContext`].
pub struct WorkerPool {
    ctx: Arc<DeliveryContext>,
}

impl WorkerPool {
    pub fn new(ctx: DeliveryContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &Arc<DeliveryContext> {
        &self.ctx
    }

    pub fn worker(&self, id: usize) -> Worker {
        Worker::new(id, Arc::clone(&self.ctx))
    }

    /// Run every worker until `token` is cancelled and all have drained.
    pub async fn run(&self, token: CancellationToken) {
        let concurrency = self.ctx.config.concurrency.max(1);
        info!(concurrency, "worker pool started");
        let mut workers = JoinSet::new();
        for id in 0..concurrency {
            let worker = self.worker(id);
            let token = token.clone();
            workers.spawn(async move { worker.run(token).await });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("worker pool stopped");
    }
}
