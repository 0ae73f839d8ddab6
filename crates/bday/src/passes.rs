// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `bday seed` and `bday dispatch`: single passes for cron-style operation.

use std::sync::Arc;

use bday_config::BdayConfig;
use bday_core::{BdayError, PluginAdapter};
use bday_directory::JsonFileDirectory;
use bday_engine::{Dispatcher, Seeder};
use bday_schedule::{OccurrenceResolver, registry_from_config};

use crate::serve::open_storage;

pub async fn run_seed(config: &BdayConfig) -> Result<(), BdayError> {
    let (store, _queue) = open_storage(config).await?;
    let seeder = Seeder::new(
        store.clone(),
        Arc::new(JsonFileDirectory::from_config(&config.directory)),
        Arc::new(registry_from_config(config)?),
        OccurrenceResolver::from_config(&config.resolver)?,
        config.seeder.clone(),
    );

    let report = seeder.seed().await;
    store.shutdown().await?;
    let report = report?;
    println!(
        "seeded: {} users, {} created, {} existing, {} skipped, {} errors",
        report.users, report.created, report.existing, report.skipped, report.errors
    );
    Ok(())
}

pub async fn run_dispatch(config: &BdayConfig, reconcile: bool) -> Result<(), BdayError> {
    let (store, queue) = open_storage(config).await?;
    let dispatcher = Dispatcher::new(store.clone(), queue.clone(), config.dispatcher.clone());

    let outcome = async {
        if reconcile {
            let report = dispatcher.reconcile().await?;
            println!(
                "reconciled: {} re-enqueued, {} recovered from SENDING, {} errors",
                report.reenqueued, report.recovered, report.errors
            );
        }
        let report = dispatcher.dispatch().await?;
        println!(
            "dispatched: {} scanned, {} enqueued, {} reverted, {} errors",
            report.scanned, report.enqueued, report.reverted, report.errors
        );
        Ok::<_, BdayError>(())
    }
    .await;

    store.shutdown().await?;
    outcome
}
