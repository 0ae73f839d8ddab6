// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementations of the scheduling store and delivery queue traits.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use bday_config::model::{QueueConfig, StorageConfig};
use bday_core::{
    AdapterType, BdayError, DeadLetter, DeliveryQueue, HealthStatus, MessageStatus, NackOutcome,
    NewScheduledMessage, PluginAdapter, QueueDepth, QueueEnvelope, ScheduledMessage,
    SchedulingStore,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

async fn ping(db: &Database) -> Result<HealthStatus, BdayError> {
    let probe = db
        .connection()
        .call(|conn| conn.execute_batch("SELECT 1;"))
        .await;
    Ok(match probe {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => HealthStatus::Unhealthy(map_tr_err(e).to_string()),
    })
}

/// SQLite-backed [`SchedulingStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn open(config: &StorageConfig) -> Result<Self, BdayError> {
        let db = Database::open_with(&config.database_path, config.wal_mode).await?;
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, BdayError> {
        ping(&self.db).await
    }

    async fn shutdown(&self) -> Result<(), BdayError> {
        self.db.checkpoint().await?;
        debug!("store shutdown: WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl SchedulingStore for SqliteStore {
    async fn create_if_absent(
        &self,
        message: &NewScheduledMessage,
    ) -> Result<(ScheduledMessage, bool), BdayError> {
        queries::messages::create_if_absent(&self.db, message, Utc::now()).await
    }

    async fn find_due_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, BdayError> {
        queries::messages::find_due_before(&self.db, before, limit).await
    }

    async fn transition(
        &self,
        id: &str,
        expected: MessageStatus,
        next: MessageStatus,
        error: Option<&str>,
    ) -> Result<bool, BdayError> {
        queries::messages::transition(&self.db, id, expected, next, error, Utc::now()).await
    }

    async fn touch(&self, id: &str, expected: MessageStatus) -> Result<bool, BdayError> {
        queries::messages::touch(&self.db, id, expected, Utc::now()).await
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledMessage>, BdayError> {
        queries::messages::get(&self.db, id).await
    }

    async fn get_by_occurrence(
        &self,
        user_id: &str,
        message_type: &str,
        occurrence_year: i32,
    ) -> Result<Option<ScheduledMessage>, BdayError> {
        queries::messages::get_by_occurrence(&self.db, user_id, message_type, occurrence_year)
            .await
    }

    async fn list_by_status(
        &self,
        status: MessageStatus,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, BdayError> {
        queries::messages::list_by_status(&self.db, status, limit).await
    }

    async fn count_by_status(&self) -> Result<BTreeMap<MessageStatus, u64>, BdayError> {
        queries::messages::count_by_status(&self.db).await
    }

    async fn find_stale(
        &self,
        status: MessageStatus,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, BdayError> {
        queries::messages::find_stale(&self.db, status, updated_before, limit).await
    }

    async fn force_reschedule(&self, id: &str) -> Result<bool, BdayError> {
        queries::messages::force_reschedule(&self.db, id, Utc::now()).await
    }
}

/// SQLite-backed [`DeliveryQueue`]. Survives process restarts.
#[derive(Debug, Clone)]
pub struct SqliteQueue {
    db: Database,
    max_attempts: u32,
}

impl SqliteQueue {
    pub fn new(db: Database, max_attempts: u32) -> Self {
        Self { db, max_attempts }
    }

    /// Open the queue on the store's connection unless `queue.database_path`
    /// points at a different file.
    pub async fn open(
        shared: &Database,
        queue: &QueueConfig,
        wal_mode: bool,
    ) -> Result<Self, BdayError> {
        let db = match queue.database_path.as_deref() {
            Some(path) if path != shared.path() => Database::open_with(path, wal_mode).await?,
            _ => shared.clone(),
        };
        Ok(Self::new(db, queue.max_attempts))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[async_trait]
impl PluginAdapter for SqliteQueue {
    fn name(&self) -> &str {
        "sqlite-queue"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, BdayError> {
        ping(&self.db).await
    }

    async fn shutdown(&self) -> Result<(), BdayError> {
        self.db.checkpoint().await
    }
}

#[async_trait]
impl DeliveryQueue for SqliteQueue {
    async fn enqueue(
        &self,
        message_id: &str,
        visible_at: DateTime<Utc>,
    ) -> Result<QueueEnvelope, BdayError> {
        queries::queue::enqueue(&self.db, message_id, visible_at, self.max_attempts, Utc::now())
            .await
    }

    async fn dequeue(
        &self,
        batch_size: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueEnvelope>, BdayError> {
        queries::queue::dequeue(&self.db, batch_size, visibility_timeout, Utc::now()).await
    }

    async fn extend_lease(
        &self,
        envelope: &QueueEnvelope,
        visibility_timeout: Duration,
    ) -> Result<bool, BdayError> {
        queries::queue::extend_lease(&self.db, envelope, visibility_timeout, Utc::now()).await
    }

    async fn ack(&self, envelope: &QueueEnvelope) -> Result<bool, BdayError> {
        queries::queue::ack(&self.db, envelope).await
    }

    async fn nack(
        &self,
        envelope: &QueueEnvelope,
        redeliver_after: Duration,
    ) -> Result<NackOutcome, BdayError> {
        queries::queue::nack(&self.db, envelope, redeliver_after, Utc::now()).await
    }

    async fn release(&self, envelope: &QueueEnvelope, delay: Duration) -> Result<bool, BdayError> {
        queries::queue::release(&self.db, envelope, delay, Utc::now()).await
    }

    async fn dead_letter(&self, envelope: &QueueEnvelope, reason: &str) -> Result<(), BdayError> {
        if !queries::queue::dead_letter(&self.db, envelope, reason, Utc::now()).await? {
            warn!(
                envelope_id = envelope.id,
                message_id = %envelope.message_id,
                "dead-letter skipped: lease no longer held"
            );
        }
        Ok(())
    }

    async fn has_live_entry(&self, message_id: &str) -> Result<bool, BdayError> {
        queries::queue::has_live_entry(&self.db, message_id).await
    }

    async fn depth(&self) -> Result<QueueDepth, BdayError> {
        queries::queue::depth(&self.db, Utc::now()).await
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, BdayError> {
        queries::queue::dead_letters(&self.db, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bday_core::Occurrence;
    use tempfile::tempdir;

    #[tokio::test]
    async fn store_and_queue_share_one_connection_by_default() {
        let dir = tempdir().unwrap();
        let storage = StorageConfig {
            database_path: dir.path().join("bday.db").to_string_lossy().into_owned(),
            wal_mode: true,
        };
        let store = SqliteStore::open(&storage).await.unwrap();
        let queue = SqliteQueue::open(store.database(), &QueueConfig::default(), true)
            .await
            .unwrap();
        assert_eq!(store.database().path(), storage.database_path);
        assert_eq!(queue.database().path(), storage.database_path);
        assert_eq!(queue.max_attempts(), 5);

        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        assert_eq!(queue.health_check().await.unwrap(), HealthStatus::Healthy);
        assert_eq!(store.adapter_type(), AdapterType::Store);
        assert_eq!(queue.adapter_type(), AdapterType::Queue);

        let (msg, created) = store
            .create_if_absent(&NewScheduledMessage::new(
                "u1",
                "birthday",
                Occurrence {
                    year: 2025,
                    due_at_utc: Utc::now(),
                },
            ))
            .await
            .unwrap();
        assert!(created);
        queue
            .enqueue(&msg.id, Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();
        let leased = queue.dequeue(5, Duration::from_secs(30)).await.unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].message_id, msg.id);

        store.shutdown().await.unwrap();
        queue.shutdown().await.unwrap();
    }
}
