// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Occurrence seeding: turns directory users into scheduled messages.
//!
//! Each pass resolves the next occurrence of every registered message type
//! for every candidate user, starting `catch_up` in the past so a short
//! outage still produces a (late) message, and persists the ones due within
//! the lookahead window. Creation goes through `create_if_absent`, so
//! repeated or concurrent passes never duplicate an occurrence.

use std::sync::Arc;
use std::time::Duration;

use bday_config::model::SeederConfig;
use bday_core::{BdayError, NewScheduledMessage, SchedulingStore, User, UserDirectory};
use bday_resilience::{ExponentialBackoff, retry};
use bday_schedule::{MessageStrategy, OccurrenceResolver, StrategyRegistry};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{earlier, later};

const CREATE_ATTEMPTS: u32 = 4;

/// Counts from one seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub created: usize,
    pub existing: usize,
    /// Occurrences outside the window or not eligible.
    pub skipped: usize,
    pub errors: usize,
}

pub struct Seeder {
    store: Arc<dyn SchedulingStore>,
    directory: Arc<dyn UserDirectory>,
    registry: Arc<StrategyRegistry>,
    resolver: OccurrenceResolver,
    config: SeederConfig,
    store_backoff: ExponentialBackoff,
}

impl Seeder {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        directory: Arc<dyn UserDirectory>,
        registry: Arc<StrategyRegistry>,
        resolver: OccurrenceResolver,
        config: SeederConfig,
    ) -> Self {
        Self {
            store,
            directory,
            registry,
            resolver,
            config,
            store_backoff: ExponentialBackoff::new(
                Duration::from_millis(200),
                Duration::from_secs(5),
                0.2,
            ),
        }
    }

    pub async fn seed(&self) -> Result<SeedReport, BdayError> {
        self.seed_at(Utc::now()).await
    }

    /// One pass as of `now`. Directory failures abort the pass; per-user
    /// failures are counted and logged.
    pub async fn seed_at(&self, now: DateTime<Utc>) -> Result<SeedReport, BdayError> {
        let window = self.config.lookahead().max(self.config.catch_up());
        let users = self
            .directory
            .list_users_with_upcoming_occurrences(window)
            .await?;

        let mut report = SeedReport {
            users: users.len(),
            ..SeedReport::default()
        };
        for user in &users {
            for strategy in self.registry.strategies() {
                match self.seed_one(strategy.as_ref(), user, now).await {
                    Ok(Seeded::Created) => report.created += 1,
                    Ok(Seeded::Existing) => report.existing += 1,
                    Ok(Seeded::Skipped) => report.skipped += 1,
                    Err(e) => {
                        report.errors += 1;
                        error!(
                            user_id = %user.id,
                            message_type = strategy.message_type(),
                            error = %e,
                            "failed to seed occurrence"
                        );
                    }
                }
            }
        }

        info!(
            users = report.users,
            created = report.created,
            existing = report.existing,
            skipped = report.skipped,
            errors = report.errors,
            "seeding pass complete"
        );
        Ok(report)
    }

    async fn seed_one(
        &self,
        strategy: &dyn MessageStrategy,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Seeded, BdayError> {
        if let Err(e) = strategy.validate(user) {
            debug!(user_id = %user.id, error = %e, "user not eligible");
            return Ok(Seeded::Skipped);
        }

        let from = earlier(now, self.config.catch_up());
        let horizon = later(now, self.config.lookahead());
        let Some(occurrence) = strategy.next_occurrence(&self.resolver, user, from)? else {
            return Ok(Seeded::Skipped);
        };
        if occurrence.due_at_utc > horizon {
            return Ok(Seeded::Skipped);
        }
        if !strategy.should_send(user, occurrence.due_at_utc) {
            debug!(
                user_id = %user.id,
                message_type = strategy.message_type(),
                year = occurrence.year,
                "occurrence not eligible"
            );
            return Ok(Seeded::Skipped);
        }

        let message = NewScheduledMessage::new(&user.id, strategy.message_type(), occurrence);
        let (record, created) = retry(
            &self.store_backoff,
            CREATE_ATTEMPTS,
            BdayError::is_transient,
            || self.store.create_if_absent(&message),
        )
        .await?;

        if created {
            if record.due_at_utc < now {
                warn!(
                    message_id = %record.id,
                    due_at = %record.due_at_utc,
                    "scheduled a missed occurrence; it will be sent late"
                );
            }
            debug!(
                message_id = %record.id,
                user_id = %record.user_id,
                message_type = %record.message_type,
                due_at = %record.due_at_utc,
                "message scheduled"
            );
            bday_prometheus::record_scheduled(&record.message_type);
            Ok(Seeded::Created)
        } else {
            Ok(Seeded::Existing)
        }
    }

    /// Seed every `interval` until cancelled.
    pub async fn run(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.seed().await {
                        error!(error = %e, "seeding pass failed");
                    }
                }
            }
        }
        debug!("seeder stopped");
    }
}

enum Seeded {
    Created,
    Existing,
    Skipped,
}
