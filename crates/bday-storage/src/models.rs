// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the core domain types.
//!
//! Timestamps are stored as fixed-width UTC text so that lexical order in
//! SQL equals chronological order.

use std::str::FromStr;
use std::time::Duration;

use bday_core::{DeadLetter, MessageStatus, QueueEnvelope, ScheduledMessage};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Column list matching [`message_from_row`].
pub(crate) const MESSAGE_COLUMNS: &str = "id, user_id, message_type, occurrence_year, due_at_utc, \
     idempotency_key, status, attempt_count, last_error, created_at, updated_at";

/// Column list matching [`envelope_from_row`].
pub(crate) const ENVELOPE_COLUMNS: &str =
    "id, message_id, receipt, attempts, visible_at, enqueued_at";

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_ts(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.fZ").map(|naive| naive.and_utc())
}

/// Longest delay honoured; keeps four-digit years in stored timestamps.
const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// `now + delay`, with `delay` capped at a century.
pub(crate) fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let capped = chrono::Duration::from_std(delay.min(MAX_DELAY)).unwrap_or_default();
    now + capped
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<MessageStatus> {
    let raw: String = row.get(idx)?;
    MessageStatus::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledMessage> {
    Ok(ScheduledMessage {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message_type: row.get(2)?,
        occurrence_year: row.get(3)?,
        due_at_utc: ts_column(row, 4)?,
        idempotency_key: row.get(5)?,
        status: status_column(row, 6)?,
        attempt_count: row.get(7)?,
        last_error: row.get(8)?,
        created_at: ts_column(row, 9)?,
        updated_at: ts_column(row, 10)?,
    })
}

pub(crate) fn envelope_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEnvelope> {
    Ok(QueueEnvelope {
        id: row.get(0)?,
        message_id: row.get(1)?,
        receipt: row.get(2)?,
        attempt_count: row.get(3)?,
        visible_at: ts_column(row, 4)?,
        enqueued_at: ts_column(row, 5)?,
    })
}

pub(crate) fn dead_letter_from_row(row: &Row<'_>) -> rusqlite::Result<DeadLetter> {
    Ok(DeadLetter {
        id: row.get(0)?,
        message_id: row.get(1)?,
        attempt_count: row.get(2)?,
        reason: row.get(3)?,
        enqueued_at: ts_column(row, 4)?,
        dead_lettered_at: ts_column(row, 5)?,
    })
}
