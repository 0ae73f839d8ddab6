// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User directory trait: the read-only source of users.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BdayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::User;

/// Read interface onto the external user-management collaborator.
#[async_trait]
pub trait UserDirectory: PluginAdapter {
    /// Fetch a single user. `Ok(None)` means the user no longer exists.
    async fn get_user(&self, id: &str) -> Result<Option<User>, BdayError>;

    /// Users that may have an occurrence within `window` of now, in either
    /// direction, so missed occurrences can be caught up.
    ///
    /// This is a coarse prefilter; the seeder computes exact instants and may
    /// discard some of the returned users.
    async fn list_users_with_upcoming_occurrences(
        &self,
        window: Duration,
    ) -> Result<Vec<User>, BdayError>;
}
