// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as `HH:MM` send times, IANA zone names and timeout ordering.

use std::net::SocketAddr;

use chrono::NaiveTime;

use crate::diagnostic::ConfigError;
use crate::model::BdayConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BdayConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }
    if let Some(path) = &config.queue.database_path {
        if path.trim().is_empty() {
            fail("queue.database_path must not be empty when set".to_string());
        }
    }
    if config.directory.users_path.trim().is_empty() {
        fail("directory.users_path must not be empty".to_string());
    }

    if !is_valid_send_time(&config.resolver.send_time) {
        fail(format!(
            "resolver.send_time `{}` is not a valid HH:MM time",
            config.resolver.send_time
        ));
    }
    for (name, message) in [
        ("birthday", &config.messages.birthday),
        ("anniversary", &config.messages.anniversary),
    ] {
        if let Some(send_time) = &message.send_time {
            if !is_valid_send_time(send_time) {
                fail(format!(
                    "messages.{name}.send_time `{send_time}` is not a valid HH:MM time"
                ));
            }
        }
    }

    if config
        .resolver
        .fallback_timezone
        .parse::<chrono_tz::Tz>()
        .is_err()
    {
        fail(format!(
            "resolver.fallback_timezone `{}` is not a known IANA timezone",
            config.resolver.fallback_timezone
        ));
    }

    for (key, value) in [
        ("queue.max_attempts", u64::from(config.queue.max_attempts)),
        ("queue.visibility_timeout_secs", config.queue.visibility_timeout_secs),
        ("seeder.interval_secs", config.seeder.interval_secs),
        ("dispatcher.interval_secs", config.dispatcher.interval_secs),
        ("dispatcher.page_size", config.dispatcher.page_size as u64),
        (
            "dispatcher.max_pages_per_tick",
            config.dispatcher.max_pages_per_tick as u64,
        ),
        (
            "dispatcher.reconcile_interval_secs",
            config.dispatcher.reconcile_interval_secs,
        ),
        ("worker.concurrency", config.worker.concurrency as u64),
        ("worker.batch_size", config.worker.batch_size as u64),
        ("worker.poll_interval_ms", config.worker.poll_interval_ms),
        ("worker.max_attempts", u64::from(config.worker.max_attempts)),
        ("worker.send_timeout_secs", config.worker.send_timeout_secs),
        (
            "breaker.failure_threshold",
            u64::from(config.breaker.failure_threshold),
        ),
        ("sender.timeout_secs", config.sender.timeout_secs),
    ] {
        if value == 0 {
            fail(format!("{key} must be greater than zero"));
        }
    }

    let jitter = config.worker.jitter_factor;
    if !(0.0..=1.0).contains(&jitter) {
        fail(format!(
            "worker.jitter_factor must be between 0.0 and 1.0, got {jitter}"
        ));
    }

    if config.worker.base_backoff() > config.worker.max_backoff() {
        fail(format!(
            "worker.base_backoff_ms ({}) must not exceed worker.max_backoff_secs ({}s)",
            config.worker.base_backoff_ms, config.worker.max_backoff_secs
        ));
    }

    // Workers renew the lease right before each send, so one send must fit in one lease.
    if config.worker.send_timeout_secs >= config.queue.visibility_timeout_secs {
        fail(format!(
            "worker.send_timeout_secs ({}) must be less than queue.visibility_timeout_secs ({})",
            config.worker.send_timeout_secs, config.queue.visibility_timeout_secs
        ));
    }

    if config.dispatcher.sending_grace_secs <= config.worker.send_timeout_secs {
        fail(format!(
            "dispatcher.sending_grace_secs ({}) must exceed worker.send_timeout_secs ({})",
            config.dispatcher.sending_grace_secs, config.worker.send_timeout_secs
        ));
    }

    if let Some(endpoint) = &config.sender.endpoint {
        if !is_valid_endpoint(endpoint) {
            fail(format!(
                "sender.endpoint `{endpoint}` must be an http:// or https:// URL"
            ));
        }
    }

    if config.metrics.enabled && config.metrics.listen.parse::<SocketAddr>().is_err() {
        fail(format!(
            "metrics.listen `{}` must be a socket address such as 127.0.0.1:9464",
            config.metrics.listen
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `HH:MM`, 24-hour clock.
pub fn is_valid_send_time(value: &str) -> bool {
    value.len() == 5 && NaiveTime::parse_from_str(value, "%H:%M").is_ok()
}

fn is_valid_endpoint(endpoint: &str) -> bool {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !host.contains(char::is_whitespace)
        }
        None => false,
    }
}
