// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification sender trait. The scheduler treats it as a black box.

use async_trait::async_trait;

use crate::error::SendError;
use crate::traits::adapter::PluginAdapter;
use crate::types::SendRequest;

/// Delivers composed content to the end recipient.
#[async_trait]
pub trait NotificationSender: PluginAdapter {
    /// Send one message. Callers bound the call with their own timeout.
    async fn send(&self, request: &SendRequest) -> Result<(), SendError>;
}
