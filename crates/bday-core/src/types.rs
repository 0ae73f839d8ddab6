// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and the scheduling engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the role an adapter plays in the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Store,
    Queue,
    Sender,
    Directory,
    Observability,
}

/// A user as seen by the scheduler. Owned by the external directory; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: String,
    /// Display name used when composing content.
    pub name: String,
    /// IANA timezone name, e.g. `Europe/Berlin`.
    pub timezone: String,
    /// Calendar date of birth. The year may be synthetic.
    pub birthday_date: NaiveDate,
    /// Optional anniversary date.
    #[serde(default)]
    pub anniversary_date: Option<NaiveDate>,
    /// Remaining profile fields, opaque to the scheduler.
    #[serde(default, flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        timezone: impl Into<String>,
        birthday_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            timezone: timezone.into(),
            birthday_date,
            anniversary_date: None,
            profile: serde_json::Map::new(),
        }
    }

    pub fn with_anniversary(mut self, date: NaiveDate) -> Self {
        self.anniversary_date = Some(date);
        self
    }
}

/// Lifecycle status of a [`ScheduledMessage`].
///
/// ```text
/// SCHEDULED -> ENQUEUED -> SENDING -> SENT | FAILED | DEAD_LETTERED
/// ```
///
/// `CANCELLED` is reachable before a send starts. Moving a `FAILED` or
/// `DEAD_LETTERED` message back to `SCHEDULED` is an operator action and is
/// never a regular transition.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Scheduled,
    Enqueued,
    Sending,
    Sent,
    Failed,
    DeadLettered,
    Cancelled,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 7] = [
        MessageStatus::Scheduled,
        MessageStatus::Enqueued,
        MessageStatus::Sending,
        MessageStatus::Sent,
        MessageStatus::Failed,
        MessageStatus::DeadLettered,
        MessageStatus::Cancelled,
    ];

    /// Stored representation, identical to `Display`.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Scheduled => "SCHEDULED",
            MessageStatus::Enqueued => "ENQUEUED",
            MessageStatus::Sending => "SENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Failed => "FAILED",
            MessageStatus::DeadLettered => "DEAD_LETTERED",
            MessageStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageStatus::Sent
                | MessageStatus::Failed
                | MessageStatus::DeadLettered
                | MessageStatus::Cancelled
        )
    }

    /// Edges of the lifecycle graph.
    ///
    /// `ENQUEUED -> SCHEDULED` is the dispatcher reverting a failed queue push.
    /// `ENQUEUED -> FAILED` covers messages that cannot be delivered at all.
    /// `SENDING -> ENQUEUED` is a retry rollback (or stale-send recovery).
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (Scheduled, Enqueued)
                | (Scheduled, Cancelled)
                | (Enqueued, Sending)
                | (Enqueued, Scheduled)
                | (Enqueued, Cancelled)
                | (Enqueued, Failed)
                | (Enqueued, DeadLettered)
                | (Sending, Sent)
                | (Sending, Enqueued)
                | (Sending, Failed)
                | (Sending, DeadLettered)
                | (Failed, DeadLettered)
        )
    }

    /// Statuses an operator may force back to `SCHEDULED`.
    pub fn is_requeueable(self) -> bool {
        matches!(self, MessageStatus::Failed | MessageStatus::DeadLettered)
    }
}

/// Deterministic idempotency key for one occurrence of one message type for one user.
///
/// Fields are NUL-separated before hashing so `("a:b", "c")` and `("a", "b:c")`
/// never collide.
pub fn idempotency_key(user_id: &str, message_type: &str, occurrence_year: i32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(message_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(occurrence_year.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// One annual instance of a recurring event, resolved to an absolute instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// The annual cycle this instance belongs to.
    pub year: i32,
    /// When the message must be sent.
    pub due_at_utc: DateTime<Utc>,
}

/// Input to [`SchedulingStore::create_if_absent`](crate::SchedulingStore::create_if_absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScheduledMessage {
    pub user_id: String,
    pub message_type: String,
    pub occurrence_year: i32,
    pub due_at_utc: DateTime<Utc>,
}

impl NewScheduledMessage {
    pub fn new(user_id: &str, message_type: &str, occurrence: Occurrence) -> Self {
        Self {
            user_id: user_id.to_string(),
            message_type: message_type.to_string(),
            occurrence_year: occurrence.year,
            due_at_utc: occurrence.due_at_utc,
        }
    }

    pub fn idempotency_key(&self) -> String {
        idempotency_key(&self.user_id, &self.message_type, self.occurrence_year)
    }

    /// Build the full record as it is first persisted.
    pub fn into_record(self, now: DateTime<Utc>) -> ScheduledMessage {
        let idempotency_key = self.idempotency_key();
        ScheduledMessage {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id,
            message_type: self.message_type,
            occurrence_year: self.occurrence_year,
            due_at_utc: self.due_at_utc,
            idempotency_key,
            status: MessageStatus::Scheduled,
            attempt_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The central persisted entity: one message for one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: String,
    pub user_id: String,
    pub message_type: String,
    pub occurrence_year: i32,
    pub due_at_utc: DateTime<Utc>,
    pub idempotency_key: String,
    pub status: MessageStatus,
    /// Incremented each time the message enters `SENDING`.
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message reference held by the delivery queue between enqueue and ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEnvelope {
    /// Queue-assigned entry identifier.
    pub id: i64,
    /// The [`ScheduledMessage`] this envelope delivers.
    pub message_id: String,
    /// Lease token issued on dequeue. Ack/nack with a stale receipt are no-ops.
    pub receipt: Option<String>,
    /// Number of nacks so far.
    pub attempt_count: u32,
    /// The envelope is hidden from consumers until this instant.
    pub visible_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of a negative acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Redelivery scheduled at or after `visible_at`.
    Requeued { visible_at: DateTime<Utc> },
    /// Attempts exhausted; the envelope moved to the dead-letter channel.
    DeadLettered,
    /// The lease expired and another consumer owns the envelope now.
    Stale,
}

/// Envelope counts per queue state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub pending: u64,
    pub in_flight: u64,
    pub dead_lettered: u64,
}

/// An envelope that left circulation and awaits manual remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: i64,
    pub message_id: String,
    pub attempt_count: u32,
    pub reason: String,
    pub enqueued_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
}

/// A request handed to the notification sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub message_id: String,
    pub user_id: String,
    pub message_type: String,
    /// Forwarded to the remote so it can drop replays of the same occurrence.
    pub idempotency_key: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_display_and_from_str() {
        for status in MessageStatus::ALL {
            let s = status.to_string();
            assert_eq!(s, status.as_str());
            assert_eq!(MessageStatus::from_str(&s).unwrap(), status);
        }
        assert_eq!(
            MessageStatus::from_str("dead_lettered").unwrap(),
            MessageStatus::DeadLettered
        );
    }

    #[test]
    fn failed_never_transitions_back_to_scheduled() {
        assert!(!MessageStatus::Failed.can_transition_to(MessageStatus::Scheduled));
        assert!(!MessageStatus::DeadLettered.can_transition_to(MessageStatus::Scheduled));
        assert!(MessageStatus::Failed.can_transition_to(MessageStatus::DeadLettered));
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges_except_failed() {
        for from in MessageStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in MessageStatus::ALL {
                if from == MessageStatus::Failed && to == MessageStatus::DeadLettered {
                    continue;
                }
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn cancellation_only_before_sending() {
        assert!(MessageStatus::Scheduled.can_transition_to(MessageStatus::Cancelled));
        assert!(MessageStatus::Enqueued.can_transition_to(MessageStatus::Cancelled));
        assert!(!MessageStatus::Sending.can_transition_to(MessageStatus::Cancelled));
    }

    #[test]
    fn idempotency_key_is_deterministic_and_field_separated() {
        let a = idempotency_key("user-1", "birthday", 2025);
        let b = idempotency_key("user-1", "birthday", 2025);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, idempotency_key("user-1", "birthday", 2026));
        assert_ne!(a, idempotency_key("user-1", "anniversary", 2025));
        assert_ne!(
            idempotency_key("a:b", "c", 2025),
            idempotency_key("a", "b:c", 2025)
        );
    }

    #[test]
    fn new_message_record_starts_scheduled() {
        let now = Utc::now();
        let occurrence = Occurrence {
            year: 2025,
            due_at_utc: now,
        };
        let record = NewScheduledMessage::new("u1", "birthday", occurrence).into_record(now);
        assert_eq!(record.status, MessageStatus::Scheduled);
        assert_eq!(record.attempt_count, 0);
        assert_eq!(record.idempotency_key, idempotency_key("u1", "birthday", 2025));
        assert!(record.last_error.is_none());
    }

    #[test]
    fn user_deserializes_with_opaque_profile_fields() {
        let json = r#"{
            "id": "u1",
            "name": "Ada",
            "timezone": "Europe/London",
            "birthday_date": "1990-12-10",
            "email": "ada@example.com"
        }"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.birthday_date, NaiveDate::from_ymd_opt(1990, 12, 10).unwrap());
        assert!(user.anniversary_date.is_none());
        assert_eq!(user.profile["email"], "ada@example.com");
    }
}
