// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User directory backed by a JSON file.
//!
//! The file holds an array of [`User`] records. It is re-read on every call
//! so edits show up on the next seeding pass without a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bday_config::model::DirectoryConfig;
use bday_core::{AdapterType, BdayError, HealthStatus, PluginAdapter, User, UserDirectory};
use chrono::{Datelike, NaiveDate, Utc};
use tracing::debug;

/// Extra days around the window. A local calendar date can be a day off the
/// UTC date in either direction, and Feb 29 moves to a neighbouring day.
const SLACK_DAYS: i64 = 2;

#[derive(Debug, Clone)]
pub struct JsonFileDirectory {
    path: PathBuf,
}

impl JsonFileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(&config.users_path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<User>, BdayError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| BdayError::Directory {
                message: format!("failed to read {}", self.path.display()),
                source: Some(Box::new(e)),
            })?;
        serde_json::from_slice(&raw).map_err(|e| BdayError::Directory {
            message: format!("failed to parse {}", self.path.display()),
            source: Some(Box::new(e)),
        })
    }
}

/// Whether any of the user's event dates falls within `window` of `today`.
pub fn is_near(user: &User, today: NaiveDate, window: Duration) -> bool {
    let reach = i64::try_from(window.as_secs() / 86_400)
        .unwrap_or(i64::MAX / 2)
        .saturating_add(SLACK_DAYS);
    std::iter::once(user.birthday_date)
        .chain(user.anniversary_date)
        .any(|date| days_to_nearest(date, today) <= reach)
}

/// Distance in days from `today` to the closest anniversary of `date`.
fn days_to_nearest(date: NaiveDate, today: NaiveDate) -> i64 {
    (today.year() - 1..=today.year() + 1)
        .filter_map(|year| {
            NaiveDate::from_ymd_opt(year, date.month(), date.day())
                .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
        })
        .map(|candidate| (candidate - today).num_days().abs())
        .min()
        .unwrap_or(i64::MAX)
}

#[async_trait]
impl PluginAdapter for JsonFileDirectory {
    fn name(&self) -> &str {
        "json-file-directory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Directory
    }

    async fn health_check(&self) -> Result<HealthStatus, BdayError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), BdayError> {
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for JsonFileDirectory {
    async fn get_user(&self, id: &str) -> Result<Option<User>, BdayError> {
        Ok(self.load().await?.into_iter().find(|u| u.id == id))
    }

    async fn list_users_with_upcoming_occurrences(
        &self,
        window: Duration,
    ) -> Result<Vec<User>, BdayError> {
        let today = Utc::now().date_naive();
        let users = self.load().await?;
        let total = users.len();
        let near: Vec<User> = users
            .into_iter()
            .filter(|u| is_near(u, today, window))
            .collect();
        debug!(total, selected = near.len(), "directory prefilter");
        Ok(near)
    }
}
