// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable delivery queue with visibility timeouts and dead-lettering.
//!
//! A dequeued envelope is leased: it gets a fresh receipt and its
//! `visible_at` moves to the end of the lease. If the consumer never acks,
//! the row simply becomes visible again. Ack, nack and release all require the
//! receipt of the current lease.

use std::time::Duration;

use bday_core::{BdayError, DeadLetter, NackOutcome, QueueDepth, QueueEnvelope};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Transaction, params};

use crate::database::{Database, map_queue_err};
use crate::models::{
    ENVELOPE_COLUMNS, after, dead_letter_from_row, envelope_from_row, format_ts,
};

/// Add an envelope for `message_id`, hidden until `visible_at`.
pub async fn enqueue(
    db: &Database,
    message_id: &str,
    visible_at: DateTime<Utc>,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<QueueEnvelope, BdayError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO delivery_queue (message_id, state, attempts, max_attempts, \
                 visible_at, enqueued_at, updated_at) VALUES (?1, 'pending', 0, ?2, ?3, ?4, ?4)",
                params![message_id, max_attempts, format_ts(visible_at), format_ts(now)],
            )?;
            Ok(QueueEnvelope {
                id: conn.last_insert_rowid(),
                message_id,
                receipt: None,
                attempt_count: 0,
                visible_at,
                enqueued_at: now,
            })
        })
        .await
        .map_err(map_queue_err)
}

/// Lease up to `batch_size` envelopes whose `visible_at` has passed.
pub async fn dequeue(
    db: &Database,
    batch_size: usize,
    visibility_timeout: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<QueueEnvelope>, BdayError> {
    let limit = batch_size as i64;
    let lease_until = after(now, visibility_timeout);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let candidates = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {ENVELOPE_COLUMNS} FROM delivery_queue \
                     WHERE visible_at <= ?1 ORDER BY visible_at ASC, id ASC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![format_ts(now), limit], envelope_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let mut leased = Vec::with_capacity(candidates.len());
            for envelope in candidates {
                let receipt = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "UPDATE delivery_queue SET state = 'in_flight', receipt = ?1, \
                     visible_at = ?2, updated_at = ?3 WHERE id = ?4",
                    params![receipt, format_ts(lease_until), format_ts(now), envelope.id],
                )?;
                leased.push(QueueEnvelope {
                    receipt: Some(receipt),
                    visible_at: lease_until,
                    ..envelope
                });
            }
            tx.commit()?;
            Ok(leased)
        })
        .await
        .map_err(map_queue_err)
}

/// Move the end of a held lease to `now + visibility_timeout`. An expired
/// lease can still be renewed as long as nobody has dequeued the envelope since.
pub async fn extend_lease(
    db: &Database,
    envelope: &QueueEnvelope,
    visibility_timeout: Duration,
    now: DateTime<Utc>,
) -> Result<bool, BdayError> {
    let id = envelope.id;
    let receipt = envelope.receipt.clone();
    let lease_until = after(now, visibility_timeout);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE delivery_queue SET visible_at = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND receipt = ?4 AND state = 'in_flight'",
                params![format_ts(lease_until), format_ts(now), id, receipt],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_queue_err)
}

/// Delete a leased envelope. `false` when the receipt no longer matches.
pub async fn ack(db: &Database, envelope: &QueueEnvelope) -> Result<bool, BdayError> {
    let id = envelope.id;
    let receipt = envelope.receipt.clone();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM delivery_queue WHERE id = ?1 AND receipt = ?2",
                params![id, receipt],
            )?;
            Ok(deleted == 1)
        })
        .await
        .map_err(map_queue_err)
}

/// Count one failed attempt. The envelope is redelivered after `redeliver_after`,
/// or dead-lettered once its attempts reach `max_attempts`.
pub async fn nack(
    db: &Database,
    envelope: &QueueEnvelope,
    redeliver_after: Duration,
    now: DateTime<Utc>,
) -> Result<NackOutcome, BdayError> {
    let id = envelope.id;
    let receipt = envelope.receipt.clone();
    let visible_at = after(now, redeliver_after);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let current: Option<(u32, u32)> = tx
                .query_row(
                    "SELECT attempts, max_attempts FROM delivery_queue \
                     WHERE id = ?1 AND receipt = ?2",
                    params![id, receipt],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let outcome = match current {
                None => NackOutcome::Stale,
                Some((attempts, max_attempts)) if attempts + 1 >= max_attempts => {
                    tx.execute(
                        "UPDATE delivery_queue SET attempts = attempts + 1 WHERE id = ?1",
                        params![id],
                    )?;
                    move_to_dead_letters(&tx, id, "max attempts exceeded", now)?;
                    NackOutcome::DeadLettered
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE delivery_queue SET state = 'pending', receipt = NULL, \
                         attempts = attempts + 1, visible_at = ?1, updated_at = ?2 WHERE id = ?3",
                        params![format_ts(visible_at), format_ts(now), id],
                    )?;
                    NackOutcome::Requeued { visible_at }
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_queue_err)
}

/// Hand a leased envelope back after `delay` without counting an attempt.
pub async fn release(
    db: &Database,
    envelope: &QueueEnvelope,
    delay: Duration,
    now: DateTime<Utc>,
) -> Result<bool, BdayError> {
    let id = envelope.id;
    let receipt = envelope.receipt.clone();
    let visible_at = after(now, delay);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE delivery_queue SET state = 'pending', receipt = NULL, \
                 visible_at = ?1, updated_at = ?2 WHERE id = ?3 AND receipt = ?4",
                params![format_ts(visible_at), format_ts(now), id, receipt],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_queue_err)
}

/// Take a leased envelope out of circulation. `false` when the lease was lost.
pub async fn dead_letter(
    db: &Database,
    envelope: &QueueEnvelope,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<bool, BdayError> {
    let id = envelope.id;
    let receipt = envelope.receipt.clone();
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let owned: bool = tx
                .query_row(
                    "SELECT 1 FROM delivery_queue WHERE id = ?1 AND receipt = ?2",
                    params![id, receipt],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if owned {
                move_to_dead_letters(&tx, id, &reason, now)?;
            }
            tx.commit()?;
            Ok(owned)
        })
        .await
        .map_err(map_queue_err)
}

fn move_to_dead_letters(
    tx: &Transaction<'_>,
    id: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO dead_letters \
         (id, message_id, attempts, reason, enqueued_at, dead_lettered_at) \
         SELECT id, message_id, attempts, ?1, enqueued_at, ?2 FROM delivery_queue WHERE id = ?3",
        params![reason, format_ts(now), id],
    )?;
    tx.execute("DELETE FROM delivery_queue WHERE id = ?1", params![id])?;
    Ok(())
}

/// Whether any envelope, pending or leased, references `message_id`.
pub async fn has_live_entry(db: &Database, message_id: &str) -> Result<bool, BdayError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM delivery_queue WHERE message_id = ?1)",
                params![message_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_queue_err)
}

/// Envelope counts. A lease that has expired counts as pending again.
pub async fn depth(db: &Database, now: DateTime<Utc>) -> Result<QueueDepth, BdayError> {
    let now = format_ts(now);
    db.connection()
        .call(move |conn| {
            let (pending, in_flight): (i64, i64) = conn.query_row(
                "SELECT COUNT(*) - COALESCE(SUM(leased), 0), COALESCE(SUM(leased), 0) \
                 FROM (SELECT (state = 'in_flight' AND visible_at > ?1) AS leased \
                       FROM delivery_queue)",
                params![now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let dead_lettered: i64 =
                conn.query_row("SELECT COUNT(*) FROM dead_letters", [], |row| row.get(0))?;
            Ok(QueueDepth {
                pending: pending.max(0) as u64,
                in_flight: in_flight.max(0) as u64,
                dead_lettered: dead_lettered.max(0) as u64,
            })
        })
        .await
        .map_err(map_queue_err)
}

/// Most recent dead letters first.
pub async fn dead_letters(db: &Database, limit: usize) -> Result<Vec<DeadLetter>, BdayError> {
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, attempts, reason, enqueued_at, dead_lettered_at \
                 FROM dead_letters ORDER BY dead_lettered_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], dead_letter_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_queue_err)
}
