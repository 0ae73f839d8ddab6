// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline tests.
//!
//! `TestHarness` assembles a complete scheduler over a temp SQLite database
//! with a [`MockDirectory`] and a [`MockSender`]. [`TestHarness::restart`]
//! drops the engine and reopens the same database, which is how tests
//! simulate a process crash.

use std::sync::Arc;
use std::time::Duration;

use bday_config::BdayConfig;
use bday_core::{
    BdayError, NewScheduledMessage, Occurrence, ScheduledMessage, SchedulingStore, SendError,
    User,
};
use bday_engine::{Collaborators, Scheduler};
use bday_storage::{SqliteQueue, SqliteStore};

use crate::mock_directory::MockDirectory;
use crate::mock_sender::MockSender;

type ConfigHook = Box<dyn FnOnce(&mut BdayConfig) + Send>;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    users: Vec<User>,
    outcomes: Vec<Result<(), SendError>>,
    latency: Duration,
    hooks: Vec<ConfigHook>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            users: Vec::new(),
            outcomes: Vec::new(),
            latency: Duration::ZERO,
            hooks: Vec::new(),
        }
    }

    pub fn with_users(mut self, users: impl IntoIterator<Item = User>) -> Self {
        self.users.extend(users);
        self
    }

    /// Outcomes the mock sender replays before it starts succeeding.
    pub fn with_send_outcomes(mut self, outcomes: Vec<Result<(), SendError>>) -> Self {
        self.outcomes = outcomes;
        self
    }

    /// Every send sleeps for `latency` before answering.
    pub fn with_send_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Adjust the configuration before the engine is built.
    pub fn with_config(mut self, hook: impl FnOnce(&mut BdayConfig) + Send + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, BdayError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| BdayError::StoreUnavailable {
            source: Box::new(e),
        })?;

        let mut config = BdayConfig::default();
        config.storage.database_path = temp_dir
            .path()
            .join("bday.db")
            .to_string_lossy()
            .into_owned();
        // Retries become visible immediately.
        config.worker.base_backoff_ms = 0;
        config.worker.jitter_factor = 0.0;
        for hook in self.hooks {
            hook(&mut config);
        }

        let directory = MockDirectory::with_users(self.users);
        let sender = Arc::new(MockSender::with_outcomes(self.outcomes).with_latency(self.latency));
        let (store, queue, scheduler) = assemble(&config, &directory, &sender).await?;

        Ok(TestHarness {
            store,
            queue,
            directory,
            sender,
            scheduler,
            config,
            _temp_dir: temp_dir,
        })
    }
}

async fn assemble(
    config: &BdayConfig,
    directory: &MockDirectory,
    sender: &Arc<MockSender>,
) -> Result<(Arc<SqliteStore>, Arc<SqliteQueue>, Scheduler), BdayError> {
    let store = Arc::new(SqliteStore::open(&config.storage).await?);
    let queue = Arc::new(
        SqliteQueue::open(store.database(), &config.queue, config.storage.wal_mode).await?,
    );
    let scheduler = Scheduler::new(
        config,
        Collaborators {
            store: store.clone(),
            queue: queue.clone(),
            directory: Arc::new(directory.clone()),
            sender: sender.clone(),
        },
    )?;
    Ok((store, queue, scheduler))
}

/// A complete test environment with mock collaborators and temp storage.
pub struct TestHarness {
    /// SQLite scheduling store (temp DB, cleaned up on drop).
    pub store: Arc<SqliteStore>,
    /// Durable queue sharing the store's database.
    pub queue: Arc<SqliteQueue>,
    pub directory: MockDirectory,
    pub sender: Arc<MockSender>,
    pub scheduler: Scheduler,
    pub config: BdayConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Drop the engine and its connection, then reopen the same database.
    pub async fn restart(&mut self) -> Result<(), BdayError> {
        let (store, queue, scheduler) =
            assemble(&self.config, &self.directory, &self.sender).await?;
        self.store = store;
        self.queue = queue;
        self.scheduler = scheduler;
        Ok(())
    }

    /// Persist a message directly, bypassing the seeder.
    pub async fn schedule(
        &self,
        user_id: &str,
        message_type: &str,
        occurrence: Occurrence,
    ) -> Result<ScheduledMessage, BdayError> {
        let (record, _) = self
            .store
            .create_if_absent(&NewScheduledMessage::new(user_id, message_type, occurrence))
            .await?;
        Ok(record)
    }

    /// Poll with a single worker until the queue has nothing visible.
    /// Returns the number of envelopes processed.
    pub async fn drain(&self) -> Result<usize, BdayError> {
        let worker = self.scheduler.pool().worker(0);
        let mut total = 0;
        // Bounded so a misbehaving test cannot spin forever.
        for _ in 0..100 {
            let leased = worker.poll_once().await?;
            if leased == 0 {
                break;
            }
            total += leased;
        }
        Ok(total)
    }

    pub async fn message(&self, id: &str) -> Result<ScheduledMessage, BdayError> {
        self.scheduler.admin().get(id).await
    }
}
