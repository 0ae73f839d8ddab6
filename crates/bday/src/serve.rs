// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `bday serve` command implementation.
//!
//! Opens the SQLite store and queue, the JSON user directory and the HTTP
//! sender, then runs the scheduler until SIGINT or SIGTERM. On shutdown the
//! loops get a bounded grace period to finish in-flight sends before the
//! adapters checkpoint and close.

use std::sync::Arc;
use std::time::Duration;

use bday_config::BdayConfig;
use bday_core::{BdayError, HealthStatus, PluginAdapter};
use bday_directory::JsonFileDirectory;
use bday_engine::{Collaborators, Scheduler, shutdown};
use bday_prometheus::PrometheusAdapter;
use bday_sender::HttpSender;
use bday_storage::{SqliteQueue, SqliteStore};
use tracing::{error, info, warn};

/// Extra time on top of the send timeout before shutdown gives up waiting.
const DRAIN_MARGIN: Duration = Duration::from_secs(5);

/// Open the store and the queue that shares its database.
pub(crate) async fn open_storage(
    config: &BdayConfig,
) -> Result<(Arc<SqliteStore>, Arc<SqliteQueue>), BdayError> {
    let store = SqliteStore::open(&config.storage).await?;
    let queue = SqliteQueue::open(store.database(), &config.queue, config.storage.wal_mode).await?;
    Ok((Arc::new(store), Arc::new(queue)))
}

/// Runs the `bday serve` command.
pub async fn run_serve(config: BdayConfig) -> Result<(), BdayError> {
    info!(service = %config.service.name, "starting bday serve");

    let metrics = if config.metrics.enabled {
        let listen = config.metrics.listen.parse().map_err(|e| {
            BdayError::Config(format!("metrics.listen `{}`: {e}", config.metrics.listen))
        })?;
        Some(PrometheusAdapter::serve(listen)?)
    } else {
        None
    };

    let (store, queue) = open_storage(&config).await?;
    let directory = Arc::new(JsonFileDirectory::from_config(&config.directory));
    let sender = Arc::new(HttpSender::from_config(&config.sender)?);

    let adapters: Vec<Arc<dyn PluginAdapter>> = vec![
        store.clone(),
        queue.clone(),
        directory.clone(),
        sender.clone(),
    ];
    for adapter in &adapters {
        match adapter.health_check().await? {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                warn!(adapter = adapter.name(), %reason, "adapter degraded")
            }
            HealthStatus::Unhealthy(reason) => {
                warn!(adapter = adapter.name(), %reason, "adapter unhealthy at startup")
            }
        }
    }

    let scheduler = Scheduler::new(
        &config,
        Collaborators {
            store: store.clone(),
            queue: queue.clone(),
            directory,
            sender: sender.clone(),
        },
    )?;
    info!(
        endpoint = sender.endpoint(),
        workers = config.worker.concurrency,
        metrics = metrics.is_some(),
        "scheduler assembled"
    );

    let cancel = shutdown::install_signal_handler();
    let run = scheduler.run(cancel.clone());
    tokio::pin!(run);
    tokio::select! {
        _ = &mut run => {}
        _ = cancel.cancelled() => {
            let grace = config.worker.send_timeout() + DRAIN_MARGIN;
            shutdown::drain(run.as_mut(), grace).await;
        }
    }

    for adapter in adapters.iter().rev() {
        if let Err(e) = adapter.shutdown().await {
            error!(adapter = adapter.name(), error = %e, "adapter shutdown failed");
        }
    }
    if let Some(metrics) = &metrics {
        metrics.shutdown().await?;
    }

    info!("bday serve shutdown complete");
    Ok(())
}
