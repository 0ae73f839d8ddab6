// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatcher: moves due messages from the store into the delivery queue.
//!
//! The store transition `SCHEDULED -> ENQUEUED` and the queue push are two
//! separate commits. A failed push is reverted immediately; a crash between
//! the two is repaired by [`Dispatcher::reconcile_at`], which re-enqueues
//! `ENQUEUED` messages that have no live queue entry and recovers `SENDING`
//! messages abandoned by a dead worker.
//!
//! Several dispatchers may run at once. Every step is a compare-and-swap, so
//! a lost race is a no-op rather than a duplicate.

use std::sync::Arc;

use bday_config::model::DispatcherConfig;
use bday_core::{BdayError, DeliveryQueue, MessageStatus, ScheduledMessage, SchedulingStore};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{earlier, later};

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub scanned: usize,
    pub enqueued: usize,
    /// Candidates another dispatcher claimed first.
    pub lost_race: usize,
    /// Claimed candidates whose queue push failed and were set back to `SCHEDULED`.
    pub reverted: usize,
    pub errors: usize,
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Stale `ENQUEUED` messages that had lost their queue entry.
    pub reenqueued: usize,
    /// Stale `ENQUEUED` messages still waiting in the queue.
    pub confirmed: usize,
    /// Stale `SENDING` messages returned to `ENQUEUED`.
    pub recovered: usize,
    pub errors: usize,
}

pub struct Dispatcher {
    store: Arc<dyn SchedulingStore>,
    queue: Arc<dyn DeliveryQueue>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        queue: Arc<dyn DeliveryQueue>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    pub async fn dispatch(&self) -> Result<DispatchReport, BdayError> {
        self.dispatch_at(Utc::now()).await
    }

    /// Enqueue every `SCHEDULED` message due before `now + lookahead`, one
    /// page at a time, up to `max_pages_per_tick` pages.
    pub async fn dispatch_at(&self, now: DateTime<Utc>) -> Result<DispatchReport, BdayError> {
        let horizon = later(now, self.config.lookahead());
        let mut report = DispatchReport::default();

        for _ in 0..self.config.max_pages_per_tick {
            let page = self
                .store
                .find_due_before(horizon, self.config.page_size)
                .await?;
            let fetched = page.len();
            report.scanned += fetched;

            let mut progressed = 0;
            for message in page {
                match self.dispatch_one(&message).await {
                    Ok(Dispatched::Enqueued) => {
                        report.enqueued += 1;
                        progressed += 1;
                    }
                    Ok(Dispatched::LostRace) => {
                        report.lost_race += 1;
                        progressed += 1;
                    }
                    Ok(Dispatched::Reverted) => report.reverted += 1,
                    Err(e) => {
                        report.errors += 1;
                        error!(message_id = %message.id, error = %e, "dispatch failed");
                    }
                }
            }

            // A short page is the last one. A page where nothing moved would
            // be fetched again unchanged.
            if fetched < self.config.page_size || progressed == 0 {
                break;
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                enqueued = report.enqueued,
                lost_race = report.lost_race,
                reverted = report.reverted,
                errors = report.errors,
                "dispatch pass complete"
            );
        }
        bday_prometheus::record_dispatched(report.enqueued as u64);
        Ok(report)
    }

    async fn dispatch_one(&self, message: &ScheduledMessage) -> Result<Dispatched, BdayError> {
        if !self
            .store
            .transition(&message.id, MessageStatus::Scheduled, MessageStatus::Enqueued, None)
            .await?
        {
            debug!(message_id = %message.id, "already claimed by another dispatcher");
            return Ok(Dispatched::LostRace);
        }

        match self.queue.enqueue(&message.id, message.due_at_utc).await {
            Ok(envelope) => {
                debug!(
                    message_id = %message.id,
                    envelope_id = envelope.id,
                    visible_at = %envelope.visible_at,
                    "message enqueued"
                );
                Ok(Dispatched::Enqueued)
            }
            Err(push_err) => {
                warn!(message_id = %message.id, error = %push_err, "queue push failed, reverting");
                let reason = push_err.to_string();
                match self
                    .store
                    .transition(
                        &message.id,
                        MessageStatus::Enqueued,
                        MessageStatus::Scheduled,
                        Some(&reason),
                    )
                    .await
                {
                    Ok(true) => Ok(Dispatched::Reverted),
                    Ok(false) => {
                        warn!(message_id = %message.id, "revert lost: status changed meanwhile");
                        Ok(Dispatched::Reverted)
                    }
                    // Reconciliation picks the message up once it goes stale.
                    Err(revert_err) => Err(revert_err),
                }
            }
        }
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, BdayError> {
        self.reconcile_at(Utc::now()).await
    }

    /// Repair the gap between store and queue commits.
    ///
    /// `ENQUEUED` messages untouched for `enqueued_grace` are re-enqueued when
    /// the queue holds no live entry for them, and touched either way so they
    /// are not re-examined every pass. `SENDING` messages untouched for
    /// `sending_grace` belong to a worker that died mid-send; they go back to
    /// `ENQUEUED` with a live queue entry.
    pub async fn reconcile_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport, BdayError> {
        let mut report = ReconcileReport::default();

        let stale_enqueued = self
            .store
            .find_stale(
                MessageStatus::Enqueued,
                earlier(now, self.config.enqueued_grace()),
                self.config.page_size,
            )
            .await?;
        for message in stale_enqueued {
            match self.reconcile_enqueued(&message, now).await {
                Ok(true) => report.reenqueued += 1,
                Ok(false) => report.confirmed += 1,
                Err(e) => {
                    report.errors += 1;
                    error!(message_id = %message.id, error = %e, "reconcile failed");
                }
            }
        }

        let stale_sending = self
            .store
            .find_stale(
                MessageStatus::Sending,
                earlier(now, self.config.sending_grace()),
                self.config.page_size,
            )
            .await?;
        for message in stale_sending {
            match self.recover_sending(&message, now).await {
                Ok(true) => report.recovered += 1,
                Ok(false) => {}
                Err(e) => {
                    report.errors += 1;
                    error!(message_id = %message.id, error = %e, "stale send recovery failed");
                }
            }
        }

        if report.reenqueued > 0 || report.recovered > 0 || report.errors > 0 {
            info!(
                reenqueued = report.reenqueued,
                recovered = report.recovered,
                confirmed = report.confirmed,
                errors = report.errors,
                "reconciliation pass complete"
            );
        }
        bday_prometheus::record_reconciled("enqueued", report.reenqueued as u64);
        bday_prometheus::record_reconciled("sending", report.recovered as u64);
        Ok(report)
    }

    /// Returns `true` if a new queue entry was created.
    async fn reconcile_enqueued(
        &self,
        message: &ScheduledMessage,
        now: DateTime<Utc>,
    ) -> Result<bool, BdayError> {
        let reenqueued = if self.queue.has_live_entry(&message.id).await? {
            false
        } else {
            warn!(
                message_id = %message.id,
                updated_at = %message.updated_at,
                "enqueued message has no queue entry, re-enqueuing"
            );
            self.queue.enqueue(&message.id, message.due_at_utc.max(now)).await?;
            true
        };
        self.store.touch(&message.id, MessageStatus::Enqueued).await?;
        Ok(reenqueued)
    }

    async fn recover_sending(
        &self,
        message: &ScheduledMessage,
        now: DateTime<Utc>,
    ) -> Result<bool, BdayError> {
        if !self
            .store
            .transition(
                &message.id,
                MessageStatus::Sending,
                MessageStatus::Enqueued,
                Some("send abandoned by worker"),
            )
            .await?
        {
            return Ok(false);
        }
        warn!(
            message_id = %message.id,
            attempt_count = message.attempt_count,
            "recovered message stuck in SENDING"
        );
        if !self.queue.has_live_entry(&message.id).await? {
            self.queue.enqueue(&message.id, now).await?;
        }
        Ok(true)
    }

    /// Dispatch every `interval` and reconcile every `reconcile_interval`
    /// until cancelled.
    pub async fn run(&self, token: CancellationToken) {
        let mut dispatch_tick = tokio::time::interval(self.config.interval());
        dispatch_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut reconcile_tick = tokio::time::interval(self.config.reconcile_interval());
        reconcile_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = dispatch_tick.tick() => {
                    if let Err(e) = self.dispatch().await {
                        error!(error = %e, "dispatch pass failed");
                    }
                }
                _ = reconcile_tick.tick() => {
                    if let Err(e) = self.reconcile().await {
                        error!(error = %e, "reconciliation pass failed");
                    }
                }
            }
        }
        debug!("dispatcher stopped");
    }
}

enum Dispatched {
    Enqueued,
    LostRace,
    Reverted,
}
