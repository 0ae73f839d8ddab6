// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The scheduling and delivery core.
//!
//! ```text
//! directory -> Seeder -> store -> Dispatcher -> queue -> WorkerPool -> sender
//!                          ^                                  |
//!                          +---------- final status ----------+
//! ```
//!
//! Each stage is safe to run more than once concurrently: coordination goes
//! through the store's compare-and-swap transitions and the queue's leases.

pub mod admin;
pub mod dispatcher;
pub mod scheduler;
pub mod seeder;
pub mod shutdown;
pub mod worker;

use std::time::Duration;

use chrono::{DateTime, Utc};

pub use admin::{AdminService, Stats};
pub use dispatcher::{DispatchReport, Dispatcher, ReconcileReport};
pub use scheduler::{Collaborators, Scheduler};
pub use seeder::{SeedReport, Seeder};
pub use worker::{DeliveryContext, Outcome, Worker, WorkerPool};

pub(crate) fn later(now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) fn earlier(now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn shifting_saturates_instead_of_panicking() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(
            later(now, Duration::from_secs(3600)),
            Utc.with_ymd_and_hms(2025, 6, 1, 1, 0, 0).unwrap()
        );
        assert_eq!(earlier(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(later(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
