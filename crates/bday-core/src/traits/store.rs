// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduling store trait: the single source of truth for idempotency.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BdayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MessageStatus, NewScheduledMessage, ScheduledMessage};

/// Durable record of every scheduled message and its lifecycle state.
///
/// All coordination between dispatchers and workers flows through the atomic
/// [`create_if_absent`](Self::create_if_absent) and
/// [`transition`](Self::transition) primitives.
#[async_trait]
pub trait SchedulingStore: PluginAdapter {
    /// Persist the message unless its idempotency key already exists.
    ///
    /// Returns the persisted record and `true` if this call created it.
    /// Concurrent callers with the same key observe exactly one creation.
    async fn create_if_absent(
        &self,
        message: &NewScheduledMessage,
    ) -> Result<(ScheduledMessage, bool), BdayError>;

    /// `SCHEDULED` messages due strictly before `before`, earliest first.
    async fn find_due_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, BdayError>;

    /// Compare-and-swap status update.
    ///
    /// Returns `Ok(false)` when the current status is not `expected`.
    /// Fails with [`BdayError::InvalidTransition`] for edges the lifecycle
    /// never allows. Entering `SENDING` increments `attempt_count`.
    async fn transition(
        &self,
        id: &str,
        expected: MessageStatus,
        next: MessageStatus,
        error: Option<&str>,
    ) -> Result<bool, BdayError>;

    /// Refresh `updated_at` if the message is still in `expected`.
    async fn touch(&self, id: &str, expected: MessageStatus) -> Result<bool, BdayError>;

    async fn get(&self, id: &str) -> Result<Option<ScheduledMessage>, BdayError>;

    async fn get_by_occurrence(
        &self,
        user_id: &str,
        message_type: &str,
        occurrence_year: i32,
    ) -> Result<Option<ScheduledMessage>, BdayError>;

    async fn list_by_status(
        &self,
        status: MessageStatus,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, BdayError>;

    /// Message counts per status. Statuses with no messages map to zero.
    async fn count_by_status(&self) -> Result<BTreeMap<MessageStatus, u64>, BdayError>;

    /// Messages in `status` whose `updated_at` is at or before `updated_before`.
    async fn find_stale(
        &self,
        status: MessageStatus,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, BdayError>;

    /// Operator action: move a `FAILED` or `DEAD_LETTERED` message back to
    /// `SCHEDULED` with a fresh attempt budget. Returns `false` for any other status.
    async fn force_reschedule(&self, id: &str) -> Result<bool, BdayError>;
}
