// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use bday_core::{BdayError, MessageStatus, Occurrence, SendError, User};
use bday_test_utils::TestHarness;
use chrono::{NaiveDate, Utc};

fn ada() -> User {
    User::new("u1", "Ada", "UTC", NaiveDate::from_ymd_opt(1990, 3, 14).unwrap())
}

fn due_now(year: i32) -> Occurrence {
    Occurrence {
        year,
        due_at_utc: Utc::now() - chrono::Duration::minutes(5),
    }
}

async fn harness() -> TestHarness {
    TestHarness::builder().with_users([ada()]).build().await.unwrap()
}

#[tokio::test]
async fn lookups_by_id_and_occurrence() {
    let h = harness().await;
    let message = h.schedule("u1", "birthday", due_now(2025)).await.unwrap();
    let admin = h.scheduler.admin();

    assert_eq!(admin.get(&message.id).await.unwrap().id, message.id);
    assert_eq!(admin.find("u1", "birthday", 2025).await.unwrap().id, message.id);
    assert!(matches!(
        admin.find("u1", "birthday", 2024).await.unwrap_err(),
        BdayError::NotFound { kind: "message", .. }
    ));
    assert!(matches!(
        admin.get("missing").await.unwrap_err(),
        BdayError::NotFound { .. }
    ));

    let listed = admin.list(MessageStatus::Scheduled, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn stats_cover_every_status_and_the_queue() {
    let h = harness().await;
    h.schedule("u1", "birthday", due_now(2024)).await.unwrap();
    h.schedule("u1", "birthday", due_now(2025)).await.unwrap();
    h.scheduler.dispatcher().dispatch().await.unwrap();
    h.drain().await.unwrap();

    let stats = h.scheduler.admin().stats().await.unwrap();
    assert_eq!(stats.messages.len(), MessageStatus::ALL.len());
    assert_eq!(stats.messages[&MessageStatus::Sent], 2);
    assert_eq!(stats.messages[&MessageStatus::Scheduled], 0);
    assert_eq!(stats.queue.pending, 0);
}

#[tokio::test]
async fn dead_lettered_message_can_be_requeued_and_sent() {
    let h = TestHarness::builder()
        .with_users([ada()])
        .with_config(|c| c.worker.max_attempts = 1)
        .with_send_outcomes(vec![Err(SendError::Timeout(std::time::Duration::from_secs(10)))])
        .build()
        .await
        .unwrap();
    let message = h.schedule("u1", "birthday", due_now(2025)).await.unwrap();
    h.scheduler.dispatcher().dispatch().await.unwrap();
    h.drain().await.unwrap();
    assert_eq!(h.message(&message.id).await.unwrap().status, MessageStatus::DeadLettered);

    let letters = h.scheduler.admin().dead_letters(10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert!(letters[0].reason.contains("retries exhausted"));

    let requeued = h.scheduler.admin().requeue(&message.id).await.unwrap();
    assert_eq!(requeued.status, MessageStatus::Scheduled);
    assert_eq!(requeued.attempt_count, 0);

    h.scheduler.dispatcher().dispatch().await.unwrap();
    h.drain().await.unwrap();
    assert_eq!(h.message(&message.id).await.unwrap().status, MessageStatus::Sent);
    assert_eq!(h.sender.calls(), 2);
}

#[tokio::test]
async fn requeue_rejects_live_messages() {
    let h = harness().await;
    let message = h.schedule("u1", "birthday", due_now(2025)).await.unwrap();

    let err = h.scheduler.admin().requeue(&message.id).await.unwrap_err();
    assert!(matches!(
        err,
        BdayError::InvalidTransition {
            from: MessageStatus::Scheduled,
            to: MessageStatus::Scheduled
        }
    ));
}

#[tokio::test]
async fn cancel_only_before_sending() {
    let h = harness().await;
    let pending = h.schedule("u1", "birthday", due_now(2025)).await.unwrap();
    let cancelled = h.scheduler.admin().cancel(&pending.id).await.unwrap();
    assert_eq!(cancelled.status, MessageStatus::Cancelled);
    assert_eq!(cancelled.last_error.as_deref(), Some("cancelled by operator"));

    let other = h.schedule("u1", "birthday", due_now(2024)).await.unwrap();
    h.scheduler.dispatcher().dispatch().await.unwrap();
    h.drain().await.unwrap();
    let err = h.scheduler.admin().cancel(&other.id).await.unwrap_err();
    assert!(matches!(
        err,
        BdayError::InvalidTransition {
            from: MessageStatus::Sent,
            ..
        }
    ));
    assert_eq!(h.sender.calls(), 1);
}
