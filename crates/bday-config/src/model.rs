// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the bday message scheduler.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use bday_core::MessageStatus;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BdayConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Scheduling store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Delivery queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Occurrence resolution settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Occurrence seeding settings.
    #[serde(default)]
    pub seeder: SeederConfig,

    /// Dispatcher and reconciliation settings.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Circuit breaker guarding the sender.
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// HTTP notification sender settings.
    #[serde(default)]
    pub sender: SenderConfig,

    /// User directory settings.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Per message type settings.
    #[serde(default)]
    pub messages: MessagesConfig,

    /// Metrics hook settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name, used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "bday".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Scheduling store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("bday").join("bday.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("bday.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Delivery queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Separate database file for the queue. Defaults to `storage.database_path`.
    #[serde(default)]
    pub database_path: Option<String>,

    /// Nacks before an envelope is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How long a dequeued envelope stays hidden from other consumers.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_attempts: default_max_attempts(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_visibility_timeout_secs() -> u64 {
    60
}

/// What to do with a Feb 29 event in a year without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeapDayPolicy {
    /// Celebrate on Feb 28.
    #[default]
    Feb28,
    /// Celebrate on Mar 1.
    Mar1,
}

/// Occurrence resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Default local send time, `HH:MM`.
    #[serde(default = "default_send_time")]
    pub send_time: String,

    /// Feb 29 handling in non-leap years.
    #[serde(default)]
    pub leap_day_policy: LeapDayPolicy,

    /// Zone used when a user's timezone cannot be resolved.
    #[serde(default = "default_fallback_timezone")]
    pub fallback_timezone: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            send_time: default_send_time(),
            leap_day_policy: LeapDayPolicy::default(),
            fallback_timezone: default_fallback_timezone(),
        }
    }
}

fn default_send_time() -> String {
    "09:00".to_string()
}

fn default_fallback_timezone() -> String {
    "UTC".to_string()
}

/// Occurrence seeding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SeederConfig {
    /// Seconds between seeding passes.
    #[serde(default = "default_seeder_interval_secs")]
    pub interval_secs: u64,

    /// Create messages for occurrences due within this many hours.
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: u64,

    /// Also create occurrences that fell due this many hours ago and were missed.
    #[serde(default = "default_catch_up_hours")]
    pub catch_up_hours: u64,
}

impl SeederConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn lookahead(&self) -> Duration {
        Duration::from_secs(self.lookahead_hours * 3600)
    }

    pub fn catch_up(&self) -> Duration {
        Duration::from_secs(self.catch_up_hours * 3600)
    }
}

impl Default for SeederConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_seeder_interval_secs(),
            lookahead_hours: default_lookahead_hours(),
            catch_up_hours: default_catch_up_hours(),
        }
    }
}

fn default_seeder_interval_secs() -> u64 {
    300
}

fn default_lookahead_hours() -> u64 {
    48
}

fn default_catch_up_hours() -> u64 {
    24
}

/// Dispatcher and reconciliation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Seconds between dispatch scans.
    #[serde(default = "default_dispatch_interval_secs")]
    pub interval_secs: u64,

    /// Enqueue messages due within this many seconds.
    #[serde(default = "default_dispatch_lookahead_secs")]
    pub lookahead_secs: u64,

    /// Rows fetched per scan page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Upper bound on pages per tick.
    #[serde(default = "default_max_pages_per_tick")]
    pub max_pages_per_tick: usize,

    /// Seconds between reconciliation passes.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// An `ENQUEUED` message untouched this long without a queue entry is re-enqueued.
    #[serde(default = "default_enqueued_grace_secs")]
    pub enqueued_grace_secs: u64,

    /// A `SENDING` message untouched this long is returned to `ENQUEUED`.
    #[serde(default = "default_sending_grace_secs")]
    pub sending_grace_secs: u64,
}

impl DispatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn lookahead(&self) -> Duration {
        Duration::from_secs(self.lookahead_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn enqueued_grace(&self) -> Duration {
        Duration::from_secs(self.enqueued_grace_secs)
    }

    pub fn sending_grace(&self) -> Duration {
        Duration::from_secs(self.sending_grace_secs)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_dispatch_interval_secs(),
            lookahead_secs: default_dispatch_lookahead_secs(),
            page_size: default_page_size(),
            max_pages_per_tick: default_max_pages_per_tick(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            enqueued_grace_secs: default_enqueued_grace_secs(),
            sending_grace_secs: default_sending_grace_secs(),
        }
    }
}

fn default_dispatch_interval_secs() -> u64 {
    30
}

fn default_dispatch_lookahead_secs() -> u64 {
    60
}

fn default_page_size() -> usize {
    500
}

fn default_max_pages_per_tick() -> usize {
    10
}

fn default_reconcile_interval_secs() -> u64 {
    120
}

fn default_enqueued_grace_secs() -> u64 {
    600
}

fn default_sending_grace_secs() -> u64 {
    300
}

/// Terminal status for a message whose retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedStatus {
    #[default]
    DeadLettered,
    Failed,
}

impl ExhaustedStatus {
    pub fn as_status(self) -> MessageStatus {
        match self {
            ExhaustedStatus::DeadLettered => MessageStatus::DeadLettered,
            ExhaustedStatus::Failed => MessageStatus::Failed,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of concurrent consumers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Envelopes leased per dequeue.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sleep between empty polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delivery attempts before a message is given up on.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay, in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Cap on the retry delay, in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Random spread applied to each delay (0.2 = ±20%).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    /// Upper bound on a single sender call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Where a message goes once its retry budget is spent.
    #[serde(default)]
    pub exhausted_status: ExhaustedStatus,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            jitter_factor: default_jitter_factor(),
            send_timeout_secs: default_send_timeout_secs(),
            exhausted_status: ExhaustedStatus::default(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}

fn default_batch_size() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    3600
}

fn default_jitter_factor() -> f64 {
    0.2
}

fn default_send_timeout_secs() -> u64 {
    10
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before allowing a probe.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    30
}

/// HTTP notification sender configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SenderConfig {
    /// Endpoint that accepts `POST` send requests. `None` disables sending.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// HTTP client timeout in seconds.
    #[serde(default = "default_send_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_send_timeout_secs(),
        }
    }
}

/// User directory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    /// JSON file holding an array of users.
    #[serde(default = "default_users_path")]
    pub users_path: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            users_path: default_users_path(),
        }
    }
}

fn default_users_path() -> String {
    "users.json".to_string()
}

/// Settings for the built-in message types.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessagesConfig {
    #[serde(default = "default_birthday")]
    pub birthday: MessageTypeConfig,

    #[serde(default = "default_anniversary")]
    pub anniversary: MessageTypeConfig,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            birthday: default_birthday(),
            anniversary: default_anniversary(),
        }
    }
}

fn default_birthday() -> MessageTypeConfig {
    MessageTypeConfig {
        enabled: true,
        send_time: None,
        template: None,
    }
}

fn default_anniversary() -> MessageTypeConfig {
    MessageTypeConfig {
        enabled: false,
        send_time: None,
        template: None,
    }
}

/// One message type's settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessageTypeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local send time override, `HH:MM`. Falls back to `resolver.send_time`.
    #[serde(default)]
    pub send_time: Option<String>,

    /// Content template. `{name}` is replaced with the user's name.
    /// `None` uses the message type's built-in wording.
    #[serde(default)]
    pub template: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Metrics hook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder at startup.
    #[serde(default)]
    pub enabled: bool,

    /// Socket address the `/metrics` scrape endpoint binds to.
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

fn default_metrics_listen() -> String {
    "127.0.0.1:9464".to_string()
}
