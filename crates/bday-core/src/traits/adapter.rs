// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::BdayError;
use crate::types::{AdapterType, HealthStatus};

/// Identity and lifecycle shared by every collaborator adapter.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Short identifier used in logs, e.g. `"sqlite-store"`.
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    /// Probe the backing resource. Errors are reserved for failing to run the
    /// probe at all; an unreachable resource reports [`HealthStatus::Unhealthy`].
    async fn health_check(&self) -> Result<HealthStatus, BdayError>;

    /// Flush and release resources. Called once when the service stops.
    async fn shutdown(&self) -> Result<(), BdayError>;
}
