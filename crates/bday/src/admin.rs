// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `bday admin` subcommands. Output is pretty-printed JSON for scripting.

use bday_config::BdayConfig;
use bday_core::{BdayError, PluginAdapter};
use bday_engine::AdminService;
use serde::Serialize;

use crate::AdminCommand;
use crate::serve::open_storage;

pub async fn run_admin(config: &BdayConfig, action: AdminCommand) -> Result<(), BdayError> {
    let (store, queue) = open_storage(config).await?;
    let admin = AdminService::new(store.clone(), queue);

    let outcome = execute(&admin, action).await;
    store.shutdown().await?;
    println!("{}", outcome?);
    Ok(())
}

async fn execute(admin: &AdminService, action: AdminCommand) -> Result<String, BdayError> {
    match action {
        AdminCommand::Stats => to_json(&admin.stats().await?),
        AdminCommand::Get { id } => to_json(&admin.get(&id).await?),
        AdminCommand::Find {
            user_id,
            message_type,
            year,
        } => to_json(&admin.find(&user_id, &message_type, year).await?),
        AdminCommand::List { status, limit } => to_json(&admin.list(status, limit).await?),
        AdminCommand::Requeue { id } => to_json(&admin.requeue(&id).await?),
        AdminCommand::Cancel { id } => to_json(&admin.cancel(&id).await?),
        AdminCommand::DeadLetters { limit } => to_json(&admin.dead_letters(limit).await?),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, BdayError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| BdayError::Internal(format!("failed to serialize output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bday_core::{MessageStatus, NewScheduledMessage, Occurrence, SchedulingStore};
    use chrono::{TimeZone, Utc};

    async fn setup() -> (tempfile::TempDir, BdayConfig, String) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BdayConfig::default();
        config.storage.database_path = dir.path().join("bday.db").to_string_lossy().into_owned();

        let (store, _queue) = open_storage(&config).await.unwrap();
        let occurrence = Occurrence {
            year: 2025,
            due_at_utc: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        };
        let (message, _) = store
            .create_if_absent(&NewScheduledMessage::new("u1", "birthday", occurrence))
            .await
            .unwrap();
        (dir, config, message.id)
    }

    async fn run(
        config: &BdayConfig,
        action: AdminCommand,
    ) -> Result<serde_json::Value, BdayError> {
        let (store, queue) = open_storage(config).await?;
        let out = execute(&AdminService::new(store, queue), action).await?;
        Ok(serde_json::from_str(&out).unwrap())
    }

    #[tokio::test]
    async fn stats_and_lookups_print_json() {
        let (_dir, config, id) = setup().await;

        let stats = run(&config, AdminCommand::Stats).await.unwrap();
        assert_eq!(stats["messages"]["SCHEDULED"], 1);
        assert_eq!(stats["queue"]["pending"], 0);

        let message = run(&config, AdminCommand::Get { id: id.clone() }).await.unwrap();
        assert_eq!(message["user_id"], "u1");
        assert_eq!(message["status"], "SCHEDULED");

        let found = run(
            &config,
            AdminCommand::Find {
                user_id: "u1".into(),
                message_type: "birthday".into(),
                year: 2025,
            },
        )
        .await
        .unwrap();
        assert_eq!(found["id"], id.as_str());

        let listed = run(
            &config,
            AdminCommand::List {
                status: MessageStatus::Scheduled,
                limit: 10,
            },
        )
        .await
        .unwrap();
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn cancel_then_requeue_is_rejected() {
        let (_dir, config, id) = setup().await;

        let cancelled = run(&config, AdminCommand::Cancel { id: id.clone() }).await.unwrap();
        assert_eq!(cancelled["status"], "CANCELLED");

        let err = run(&config, AdminCommand::Requeue { id }).await.unwrap_err();
        assert!(matches!(err, BdayError::InvalidTransition { .. }));

        let letters = run(&config, AdminCommand::DeadLetters { limit: 10 }).await.unwrap();
        assert_eq!(letters, serde_json::json!([]));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let (_dir, config, _id) = setup().await;
        let err = run(&config, AdminCommand::Get { id: "nope".into() }).await.unwrap_err();
        assert!(matches!(err, BdayError::NotFound { .. }));
    }
}
