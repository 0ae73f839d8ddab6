// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the bday configuration system.

use bday_config::diagnostic::ConfigError;
use bday_config::model::{ExhaustedStatus, LeapDayPolicy};
use bday_config::{load_and_validate_str, load_config_from_str};
use bday_core::MessageStatus;

/// Valid TOML with all sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_bday_config() {
    let toml = r#"
[service]
name = "bday-eu"
log_level = "debug"

[storage]
database_path = "/tmp/bday.db"
wal_mode = false

[queue]
database_path = "/tmp/queue.db"
max_attempts = 7
visibility_timeout_secs = 120

[resolver]
send_time = "08:30"
leap_day_policy = "mar1"
fallback_timezone = "Europe/Berlin"

[worker]
concurrency = 2
jitter_factor = 0.0
exhausted_status = "failed"

[sender]
endpoint = "https://notify.example.com/send"

[messages.birthday]
template = "Happy birthday, {name}!"

[messages.anniversary]
enabled = true
send_time = "18:00"
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should load");
    assert_eq!(config.service.name, "bday-eu");
    assert_eq!(config.service.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/bday.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.queue.database_path.as_deref(), Some("/tmp/queue.db"));
    assert_eq!(config.queue.max_attempts, 7);
    assert_eq!(config.resolver.send_time, "08:30");
    assert_eq!(config.resolver.leap_day_policy, LeapDayPolicy::Mar1);
    assert_eq!(config.resolver.fallback_timezone, "Europe/Berlin");
    assert_eq!(config.worker.concurrency, 2);
    assert_eq!(config.worker.exhausted_status, ExhaustedStatus::Failed);
    assert_eq!(
        config.worker.exhausted_status.as_status(),
        MessageStatus::Failed
    );
    assert_eq!(
        config.messages.birthday.template.as_deref(),
        Some("Happy birthday, {name}!")
    );
    assert!(config.messages.birthday.enabled);
    assert!(config.messages.anniversary.enabled);
    assert_eq!(config.messages.anniversary.send_time.as_deref(), Some("18:00"));
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_and_validate_str("").expect("empty TOML should use defaults");

    assert_eq!(config.service.name, "bday");
    assert_eq!(config.resolver.send_time, "09:00");
    assert_eq!(config.resolver.leap_day_policy, LeapDayPolicy::Feb28);
    assert_eq!(config.resolver.fallback_timezone, "UTC");
    assert_eq!(config.worker.max_attempts, 5);
    assert_eq!(config.worker.exhausted_status, ExhaustedStatus::DeadLettered);
    assert_eq!(config.breaker.failure_threshold, 5);
    assert_eq!(config.seeder.catch_up_hours, 24);
    assert!(config.messages.birthday.enabled);
    assert!(!config.messages.anniversary.enabled);
    assert!(config.sender.endpoint.is_none());
    assert!(!config.metrics.enabled);
}

#[test]
fn unknown_key_gets_a_suggestion() {
    let toml = "[worker]\nmax_attemps = 3\n";
    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            span,
            ..
        } => {
            assert_eq!(key, "max_attemps");
            assert_eq!(suggestion.as_deref(), Some("max_attempts"));
            assert!(span.is_some(), "inline source should be located");
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_key_in_nested_message_section() {
    let toml = "[messages.birthday]\ntempalte = \"hi\"\n";
    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    assert!(format!("{err}").contains("tempalte"));
}

#[test]
fn unknown_leap_policy_is_rejected() {
    let toml = "[resolver]\nleap_day_policy = \"feb29\"\n";
    let errors = load_and_validate_str(toml).expect_err("should reject unknown variant");
    assert!(matches!(
        errors[0],
        ConfigError::UnknownValue { .. } | ConfigError::Other(_)
    ));
}

#[test]
fn wrong_type_is_reported() {
    let toml = "[worker]\nconcurrency = \"eight\"\n";
    let errors = load_and_validate_str(toml).expect_err("should reject wrong type");
    assert!(matches!(errors[0], ConfigError::InvalidType { .. }));
}

#[test]
fn semantic_validation_runs_after_parse() {
    let toml = r#"
[resolver]
fallback_timezone = "Atlantis/Capital"

[worker]
send_timeout_secs = 90
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert_eq!(errors.len(), 2);
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}

#[test]
fn env_var_overrides_nested_message_setting() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("bday.toml", "[messages.birthday]\nsend_time = \"07:00\"\n")?;
        jail.set_env("BDAY_MESSAGES_BIRTHDAY_SEND_TIME", "10:15");
        jail.set_env("BDAY_SEEDER_LOOKAHEAD_HOURS", "72");
        let config = bday_config::load_and_validate().expect("config should load");
        assert_eq!(config.messages.birthday.send_time.as_deref(), Some("10:15"));
        assert_eq!(config.seeder.lookahead_hours, 72);
        Ok(())
    });
}
