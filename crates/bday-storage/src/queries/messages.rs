// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled message operations. Every status change is a compare-and-swap.

use std::collections::BTreeMap;
use std::str::FromStr;

use bday_core::{BdayError, MessageStatus, NewScheduledMessage, ScheduledMessage};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{MESSAGE_COLUMNS, format_ts, message_from_row};

/// Insert the message unless an occurrence with the same idempotency key exists.
///
/// The insert and the read-back run in one closure on the writer thread, so
/// concurrent callers never see a unique-constraint error.
pub async fn create_if_absent(
    db: &Database,
    message: &NewScheduledMessage,
    now: DateTime<Utc>,
) -> Result<(ScheduledMessage, bool), BdayError> {
    let record = message.clone().into_record(now);
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO scheduled_messages (id, user_id, message_type, occurrence_year, \
                 due_at_utc, idempotency_key, status, attempt_count, last_error, created_at, \
                 updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL, ?8, ?8) \
                 ON CONFLICT DO NOTHING",
                params![
                    record.id,
                    record.user_id,
                    record.message_type,
                    record.occurrence_year,
                    format_ts(record.due_at_utc),
                    record.idempotency_key,
                    record.status.as_str(),
                    format_ts(now),
                ],
            )?;
            let stored = conn.query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM scheduled_messages WHERE idempotency_key = ?1"
                ),
                params![record.idempotency_key],
                message_from_row,
            )?;
            Ok((stored, inserted == 1))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<ScheduledMessage>, BdayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM scheduled_messages WHERE id = ?1"),
                params![id],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_by_occurrence(
    db: &Database,
    user_id: &str,
    message_type: &str,
    occurrence_year: i32,
) -> Result<Option<ScheduledMessage>, BdayError> {
    let user_id = user_id.to_string();
    let message_type = message_type.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM scheduled_messages \
                     WHERE user_id = ?1 AND message_type = ?2 AND occurrence_year = ?3"
                ),
                params![user_id, message_type, occurrence_year],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// `SCHEDULED` messages with `due_at_utc < before`, earliest first.
pub async fn find_due_before(
    db: &Database,
    before: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<ScheduledMessage>, BdayError> {
    let before = format_ts(before);
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM scheduled_messages \
                 WHERE status = 'SCHEDULED' AND due_at_utc < ?1 \
                 ORDER BY due_at_utc ASC, id ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![before, limit], message_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_by_status(
    db: &Database,
    status: MessageStatus,
    limit: usize,
) -> Result<Vec<ScheduledMessage>, BdayError> {
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM scheduled_messages \
                 WHERE status = ?1 ORDER BY due_at_utc ASC, id ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![status.as_str(), limit], message_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Messages in `status` whose last update is at or before `updated_before`.
pub async fn find_stale(
    db: &Database,
    status: MessageStatus,
    updated_before: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<ScheduledMessage>, BdayError> {
    let updated_before = format_ts(updated_before);
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM scheduled_messages \
                 WHERE status = ?1 AND updated_at <= ?2 \
                 ORDER BY updated_at ASC, id ASC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(
                params![status.as_str(), updated_before, limit],
                message_from_row,
            )?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-swap status change. Entering `SENDING` counts one attempt.
///
/// `error` replaces `last_error` when given; otherwise it is left as is.
pub async fn transition(
    db: &Database,
    id: &str,
    expected: MessageStatus,
    next: MessageStatus,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, BdayError> {
    if !expected.can_transition_to(next) {
        return Err(BdayError::InvalidTransition {
            from: expected,
            to: next,
        });
    }
    let id = id.to_string();
    let error = error.map(str::to_string);
    let increment = i64::from(next == MessageStatus::Sending);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE scheduled_messages \
                 SET status = ?1, attempt_count = attempt_count + ?2, \
                     last_error = COALESCE(?3, last_error), updated_at = ?4 \
                 WHERE id = ?5 AND status = ?6",
                params![
                    next.as_str(),
                    increment,
                    error,
                    format_ts(now),
                    id,
                    expected.as_str()
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn touch(
    db: &Database,
    id: &str,
    expected: MessageStatus,
    now: DateTime<Utc>,
) -> Result<bool, BdayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE scheduled_messages SET updated_at = ?1 WHERE id = ?2 AND status = ?3",
                params![format_ts(now), id, expected.as_str()],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Put a `FAILED` or `DEAD_LETTERED` message back to `SCHEDULED` with a fresh budget.
pub async fn force_reschedule(
    db: &Database,
    id: &str,
    now: DateTime<Utc>,
) -> Result<bool, BdayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE scheduled_messages \
                 SET status = 'SCHEDULED', attempt_count = 0, updated_at = ?1 \
                 WHERE id = ?2 AND status IN ('FAILED', 'DEAD_LETTERED')",
                params![format_ts(now), id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_by_status(db: &Database) -> Result<BTreeMap<MessageStatus, u64>, BdayError> {
    let rows: Vec<(String, i64)> = db
        .connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM scheduled_messages GROUP BY status")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;

    let mut counts: BTreeMap<MessageStatus, u64> =
        MessageStatus::ALL.into_iter().map(|s| (s, 0)).collect();
    for (status, count) in rows {
        let status = MessageStatus::from_str(&status)
            .map_err(|_| BdayError::Internal(format!("unknown status in store: {status}")))?;
        counts.insert(status, u64::try_from(count).unwrap_or_default());
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bday_core::Occurrence;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn new_message(user: &str, year: i32, due: DateTime<Utc>) -> NewScheduledMessage {
        NewScheduledMessage::new(
            user,
            "birthday",
            Occurrence {
                year,
                due_at_utc: due,
            },
        )
    }

    #[tokio::test]
    async fn create_if_absent_returns_existing_record() {
        let (db, _dir) = setup_db().await;
        let msg = new_message("u1", 2025, t0());

        let (first, created) = create_if_absent(&db, &msg, t0()).await.unwrap();
        assert!(created);
        assert_eq!(first.status, MessageStatus::Scheduled);

        // Different due instant (timezone edited since) must not replace the original.
        let moved = new_message("u1", 2025, t0() + Duration::hours(3));
        let (second, created) = create_if_absent(&db, &moved, t0()).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.due_at_utc, t0());
    }

    #[tokio::test]
    async fn concurrent_creates_yield_one_record() {
        let (db, _dir) = setup_db().await;
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let db = db.clone();
            tasks.spawn(async move {
                create_if_absent(&db, &new_message("u1", 2025, t0()), t0())
                    .await
                    .unwrap()
            });
        }

        let mut created = 0;
        let mut ids = std::collections::HashSet::new();
        while let Some(result) = tasks.join_next().await {
            let (record, was_created) = result.unwrap();
            created += usize::from(was_created);
            ids.insert(record.id);
        }
        assert_eq!(created, 1);
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn find_due_before_orders_and_filters() {
        let (db, _dir) = setup_db().await;
        let later_message = new_message("u2", 2025, t0() + Duration::hours(2));
        let later = create_if_absent(&db, &later_message, t0()).await.unwrap().0;
        let early = create_if_absent(&db, &new_message("u1", 2025, t0()), t0())
            .await
            .unwrap()
            .0;
        create_if_absent(&db, &new_message("u3", 2025, t0() + Duration::days(5)), t0())
            .await
            .unwrap();

        let due = find_due_before(&db, t0() + Duration::hours(3), 10)
            .await
            .unwrap();
        let ids: Vec<_> = due.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![early.id.as_str(), later.id.as_str()]);

        let page = find_due_before(&db, t0() + Duration::hours(3), 1)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);

        let claimed = transition(
            &db,
            &early.id,
            MessageStatus::Scheduled,
            MessageStatus::Enqueued,
            None,
            t0(),
        )
        .await
        .unwrap();
        assert!(claimed);
        let due = find_due_before(&db, t0() + Duration::hours(3), 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn transition_is_compare_and_swap() {
        let (db, _dir) = setup_db().await;
        let (msg, _) = create_if_absent(&db, &new_message("u1", 2025, t0()), t0())
            .await
            .unwrap();

        assert!(
            transition(&db, &msg.id, MessageStatus::Scheduled, MessageStatus::Enqueued, None, t0())
                .await
                .unwrap()
        );
        // Second dispatcher loses the race.
        assert!(
            !transition(&db, &msg.id, MessageStatus::Scheduled, MessageStatus::Enqueued, None, t0())
                .await
                .unwrap()
        );

        assert!(
            transition(&db, &msg.id, MessageStatus::Enqueued, MessageStatus::Sending, None, t0())
                .await
                .unwrap()
        );
        assert!(
            transition(
                &db,
                &msg.id,
                MessageStatus::Sending,
                MessageStatus::Enqueued,
                Some("remote error 503"),
                t0()
            )
            .await
            .unwrap()
        );
        let stored = get(&db, &msg.id).await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some("remote error 503"));
    }

    #[tokio::test]
    async fn illegal_edges_are_rejected() {
        let (db, _dir) = setup_db().await;
        let (msg, _) = create_if_absent(&db, &new_message("u1", 2025, t0()), t0())
            .await
            .unwrap();
        let err = transition(
            &db,
            &msg.id,
            MessageStatus::Failed,
            MessageStatus::Scheduled,
            None,
            t0(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BdayError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn force_reschedule_only_from_failed_or_dead_lettered() {
        let (db, _dir) = setup_db().await;
        let (msg, _) = create_if_absent(&db, &new_message("u1", 2025, t0()), t0())
            .await
            .unwrap();
        assert!(!force_reschedule(&db, &msg.id, t0()).await.unwrap());

        for (from, to) in [
            (MessageStatus::Scheduled, MessageStatus::Enqueued),
            (MessageStatus::Enqueued, MessageStatus::Sending),
            (MessageStatus::Sending, MessageStatus::Failed),
        ] {
            assert!(transition(&db, &msg.id, from, to, None, t0()).await.unwrap());
        }
        assert!(force_reschedule(&db, &msg.id, t0()).await.unwrap());
        let stored = get(&db, &msg.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Scheduled);
        assert_eq!(stored.attempt_count, 0);
    }

    #[tokio::test]
    async fn stale_and_counts() {
        let (db, _dir) = setup_db().await;
        let (a, _) = create_if_absent(&db, &new_message("u1", 2025, t0()), t0())
            .await
            .unwrap();
        create_if_absent(&db, &new_message("u2", 2025, t0()), t0())
            .await
            .unwrap();
        transition(&db, &a.id, MessageStatus::Scheduled, MessageStatus::Enqueued, None, t0())
            .await
            .unwrap();

        let stale = find_stale(&db, MessageStatus::Enqueued, t0(), 10).await.unwrap();
        assert_eq!(stale.len(), 1);

        let touched = touch(&db, &a.id, MessageStatus::Enqueued, t0() + Duration::minutes(5))
            .await
            .unwrap();
        assert!(touched);
        let stale = find_stale(&db, MessageStatus::Enqueued, t0(), 10).await.unwrap();
        assert!(stale.is_empty());

        let counts = count_by_status(&db).await.unwrap();
        assert_eq!(counts[&MessageStatus::Scheduled], 1);
        assert_eq!(counts[&MessageStatus::Enqueued], 1);
        assert_eq!(counts[&MessageStatus::Sent], 0);

        let by_occurrence = get_by_occurrence(&db, "u2", "birthday", 2025).await.unwrap();
        assert!(by_occurrence.is_some());
        assert!(get_by_occurrence(&db, "u2", "birthday", 2026).await.unwrap().is_none());
        assert_eq!(
            list_by_status(&db, MessageStatus::Scheduled, 10).await.unwrap().len(),
            1
        );
    }
}
