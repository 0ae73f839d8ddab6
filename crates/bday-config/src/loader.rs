// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./bday.toml` > `~/.config/bday/bday.toml` > `/etc/bday/bday.toml`
//! with environment variable overrides via `BDAY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed here

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::BdayConfig;

/// Config sections, longest first so `messages_birthday_` wins over `messages_`.
const SECTIONS: &[&str] = &[
    "messages_anniversary",
    "messages_birthday",
    "dispatcher",
    "directory",
    "resolver",
    "service",
    "storage",
    "breaker",
    "metrics",
    "seeder",
    "sender",
    "worker",
    "queue",
];

/// Paths searched for config files, lowest precedence first.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/bday/bday.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("bday/bday.toml"));
    }
    paths.push(PathBuf::from("bday.toml"));
    paths
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/bday/bday.toml` (system-wide)
/// 3. `~/.config/bday/bday.toml` (user XDG config)
/// 4. `./bday.toml` (local directory)
/// 5. `BDAY_*` environment variables
pub fn load_config() -> Result<BdayConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<BdayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BdayConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BdayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BdayConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    config_paths().into_iter().fold(
        Figment::new().merge(Serialized::defaults(BdayConfig::default())),
        |figment, path| figment.merge(Toml::file(path)),
    )
    .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env key onto its dotted config path.
///
/// Uses explicit section names rather than splitting on `_`, so
/// `BDAY_WORKER_MAX_ATTEMPTS` maps to `worker.max_attempts` and
/// `BDAY_MESSAGES_BIRTHDAY_SEND_TIME` maps to `messages.birthday.send_time`.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{}.{rest}", section.replacen('_', ".", 1));
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("BDAY_").map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}
