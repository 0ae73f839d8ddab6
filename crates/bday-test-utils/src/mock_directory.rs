// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory user directory.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use bday_core::{AdapterType, BdayError, HealthStatus, PluginAdapter, User, UserDirectory};

/// Users held in memory. `fail_next` makes the next lookups error out.
#[derive(Clone, Default)]
pub struct MockDirectory {
    users: Arc<RwLock<BTreeMap<String, User>>>,
    failures: Arc<AtomicUsize>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users.into_iter().map(|u| (u.id.clone(), u)).collect();
        Self {
            users: Arc::new(RwLock::new(users)),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn remove(&self, id: &str) -> Option<User> {
        self.users.write().await.remove(id)
    }

    /// Fail the next `count` calls with a directory error.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Result<(), BdayError> {
        let took = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err(BdayError::Directory {
                message: "directory unavailable".to_string(),
                source: None,
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PluginAdapter for MockDirectory {
    fn name(&self) -> &str {
        "mock-directory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Directory
    }

    async fn health_check(&self) -> Result<HealthStatus, BdayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BdayError> {
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MockDirectory {
    async fn get_user(&self, id: &str) -> Result<Option<User>, BdayError> {
        self.take_failure()?;
        Ok(self.users.read().await.get(id).cloned())
    }

    /// No prefiltering: every user is a candidate.
    async fn list_users_with_upcoming_occurrences(
        &self,
        _window: Duration,
    ) -> Result<Vec<User>, BdayError> {
        self.take_failure()?;
        Ok(self.users.read().await.values().cloned().collect())
    }
}
