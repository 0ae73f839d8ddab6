// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator-facing queries and remediation actions.

use std::collections::BTreeMap;
use std::sync::Arc;

use bday_core::{
    BdayError, DeadLetter, DeliveryQueue, MessageStatus, QueueDepth, ScheduledMessage,
    SchedulingStore,
};
use serde::Serialize;
use tracing::info;

/// Snapshot of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub messages: BTreeMap<MessageStatus, u64>,
    pub queue: QueueDepth,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn SchedulingStore>,
    queue: Arc<dyn DeliveryQueue>,
}

impl AdminService {
    pub fn new(store: Arc<dyn SchedulingStore>, queue: Arc<dyn DeliveryQueue>) -> Self {
        Self { store, queue }
    }

    pub async fn stats(&self) -> Result<Stats, BdayError> {
        Ok(Stats {
            messages: self.store.count_by_status().await?,
            queue: self.queue.depth().await?,
        })
    }

    /// Refresh the status and queue gauges.
    pub async fn publish_metrics(&self) -> Result<Stats, BdayError> {
        let stats = self.stats().await?;
        bday_prometheus::set_message_counts(&stats.messages);
        bday_prometheus::set_queue_depth(&stats.queue);
        Ok(stats)
    }

    pub async fn get(&self, id: &str) -> Result<ScheduledMessage, BdayError> {
        self.store.get(id).await?.ok_or_else(|| not_found(id))
    }

    pub async fn find(
        &self,
        user_id: &str,
        message_type: &str,
        occurrence_year: i32,
    ) -> Result<ScheduledMessage, BdayError> {
        self.store
            .get_by_occurrence(user_id, message_type, occurrence_year)
            .await?
            .ok_or_else(|| not_found(&format!("{user_id}/{message_type}/{occurrence_year}")))
    }

    pub async fn list(
        &self,
        status: MessageStatus,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, BdayError> {
        self.store.list_by_status(status, limit).await
    }

    /// Send a `FAILED` or `DEAD_LETTERED` message through the pipeline again
    /// with a fresh attempt budget. The dispatcher picks it up on its next pass.
    pub async fn requeue(&self, id: &str) -> Result<ScheduledMessage, BdayError> {
        let message = self.get(id).await?;
        if !message.status.is_requeueable() || !self.store.force_reschedule(id).await? {
            return Err(BdayError::InvalidTransition {
                from: message.status,
                to: MessageStatus::Scheduled,
            });
        }
        info!(message_id = %id, from = %message.status, "message requeued by operator");
        self.get(id).await
    }

    /// Cancel a message that has not started sending.
    pub async fn cancel(&self, id: &str) -> Result<ScheduledMessage, BdayError> {
        let message = self.get(id).await?;
        let cancellable = message.status.can_transition_to(MessageStatus::Cancelled);
        if !cancellable
            || !self
                .store
                .transition(
                    id,
                    message.status,
                    MessageStatus::Cancelled,
                    Some("cancelled by operator"),
                )
                .await?
        {
            return Err(BdayError::InvalidTransition {
                from: message.status,
                to: MessageStatus::Cancelled,
            });
        }
        info!(message_id = %id, from = %message.status, "message cancelled by operator");
        self.get(id).await
    }

    pub async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, BdayError> {
        self.queue.dead_letters(limit).await
    }
}

fn not_found(id: &str) -> BdayError {
    BdayError::NotFound {
        kind: "message",
        id: id.to_string(),
    }
}
