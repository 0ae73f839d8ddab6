// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use bday_core::{MessageStatus, SchedulingStore, User};
use bday_test_utils::TestHarness;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn born(id: &str, tz: &str, y: i32, m: u32, d: u32) -> User {
    User::new(id, format!("User {id}"), tz, NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

#[tokio::test]
async fn creates_occurrences_inside_the_lookahead_only() {
    let h = TestHarness::builder()
        .with_users([
            born("today", "UTC", 1990, 6, 1),
            born("tomorrow", "Asia/Tokyo", 1990, 6, 2),
            born("next-week", "UTC", 1990, 6, 8),
        ])
        .build()
        .await
        .unwrap();

    let report = h.scheduler.seeder().seed_at(now()).await.unwrap();
    assert_eq!(report.users, 3);
    assert_eq!(report.created, 2);
    assert_eq!(report.skipped, 1);

    let today = h.store.get_by_occurrence("today", "birthday", 2025).await.unwrap().unwrap();
    assert_eq!(today.due_at_utc, Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
    assert_eq!(today.status, MessageStatus::Scheduled);
    let tokyo = h.store.get_by_occurrence("tomorrow", "birthday", 2025).await.unwrap().unwrap();
    assert_eq!(tokyo.due_at_utc, Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap());
    assert!(h.store.get_by_occurrence("next-week", "birthday", 2025).await.unwrap().is_none());
}

#[tokio::test]
async fn repeated_passes_are_idempotent() {
    let h = TestHarness::builder()
        .with_users([born("u1", "UTC", 1990, 6, 1)])
        .build()
        .await
        .unwrap();

    let first = h.scheduler.seeder().seed_at(now()).await.unwrap();
    let second = h.scheduler.seeder().seed_at(now()).await.unwrap();
    assert_eq!((first.created, first.existing), (1, 0));
    assert_eq!((second.created, second.existing), (0, 1));

    let counts = h.store.count_by_status().await.unwrap();
    assert_eq!(counts[&MessageStatus::Scheduled], 1);
}

#[tokio::test]
async fn missed_occurrence_within_catch_up_is_still_created() {
    let h = TestHarness::builder()
        .with_users([born("u1", "UTC", 1990, 5, 31)])
        .build()
        .await
        .unwrap();

    // Due 2025-05-31T09:00Z, fifteen hours before `now`.
    let report = h.scheduler.seeder().seed_at(now()).await.unwrap();
    assert_eq!(report.created, 1);

    let h = TestHarness::builder()
        .with_users([born("u1", "UTC", 1990, 5, 31)])
        .with_config(|c| c.seeder.catch_up_hours = 0)
        .build()
        .await
        .unwrap();
    let report = h.scheduler.seeder().seed_at(now()).await.unwrap();
    assert_eq!(report.created, 0);
}

#[tokio::test]
async fn leap_day_birthday_uses_the_fallback_day() {
    let h = TestHarness::builder()
        .with_users([born("leap", "UTC", 2000, 2, 29)])
        .build()
        .await
        .unwrap();
    let feb_27 = Utc.with_ymd_and_hms(2023, 2, 27, 12, 0, 0).unwrap();

    h.scheduler.seeder().seed_at(feb_27).await.unwrap();

    let message = h.store.get_by_occurrence("leap", "birthday", 2023).await.unwrap().unwrap();
    assert_eq!(message.due_at_utc, Utc.with_ymd_and_hms(2023, 2, 28, 9, 0, 0).unwrap());
}

#[tokio::test]
async fn ineligible_users_are_skipped() {
    let h = TestHarness::builder()
        .with_users([
            // Born on the day: no "birthday" yet.
            born("newborn", "UTC", 2025, 6, 1),
            User::new("blank", "   ", "UTC", NaiveDate::from_ymd_opt(1990, 6, 1).unwrap()),
        ])
        .build()
        .await
        .unwrap();

    let report = h.scheduler.seeder().seed_at(now()).await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.skipped, 2);
}

#[tokio::test]
async fn unknown_timezone_falls_back_to_utc() {
    let h = TestHarness::builder()
        .with_users([born("u1", "Mars/Olympus_Mons", 1990, 6, 1)])
        .build()
        .await
        .unwrap();

    let report = h.scheduler.seeder().seed_at(now()).await.unwrap();
    assert_eq!(report.created, 1);
    let message = h.store.get_by_occurrence("u1", "birthday", 2025).await.unwrap().unwrap();
    assert_eq!(message.due_at_utc, Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
}

#[tokio::test]
async fn anniversary_strategy_registers_alongside_birthday() {
    let user = born("u1", "UTC", 1990, 6, 1)
        .with_anniversary(NaiveDate::from_ymd_opt(2015, 6, 2).unwrap());
    let h = TestHarness::builder()
        .with_users([user, born("single", "UTC", 1991, 6, 1)])
        .with_config(|c| {
            c.messages.anniversary.enabled = true;
            c.messages.anniversary.send_time = Some("18:30".to_string());
        })
        .build()
        .await
        .unwrap();

    let report = h.scheduler.seeder().seed_at(now()).await.unwrap();
    // Two birthdays plus one anniversary; the single user has no anniversary.
    assert_eq!(report.created, 3);
    assert_eq!(report.skipped, 1);
    let anniversary = h.store.get_by_occurrence("u1", "anniversary", 2025).await.unwrap().unwrap();
    assert_eq!(anniversary.due_at_utc, Utc.with_ymd_and_hms(2025, 6, 2, 18, 30, 0).unwrap());
}

#[tokio::test]
async fn directory_outage_aborts_the_pass() {
    let h = TestHarness::builder()
        .with_users([born("u1", "UTC", 1990, 6, 1)])
        .build()
        .await
        .unwrap();
    h.directory.fail_next(1);

    assert!(h.scheduler.seeder().seed_at(now()).await.is_err());
    assert_eq!(h.scheduler.seeder().seed_at(now()).await.unwrap().created, 1);
}
