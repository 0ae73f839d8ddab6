// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wires the seeder, dispatcher, worker pool and admin service together.

use std::sync::Arc;
use std::time::Duration;

use bday_config::BdayConfig;
use bday_core::{BdayError, DeliveryQueue, NotificationSender, SchedulingStore, UserDirectory};
use bday_resilience::{CircuitBreaker, ExponentialBackoff};
use bday_schedule::{OccurrenceResolver, StrategyRegistry, registry_from_config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admin::AdminService;
use crate::dispatcher::Dispatcher;
use crate::seeder::Seeder;
use crate::worker::{DeliveryContext, WorkerPool};

/// The external systems the engine runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn SchedulingStore>,
    pub queue: Arc<dyn DeliveryQueue>,
    pub directory: Arc<dyn UserDirectory>,
    pub sender: Arc<dyn NotificationSender>,
}

pub struct Scheduler {
    seeder: Seeder,
    dispatcher: Dispatcher,
    pool: WorkerPool,
    admin: AdminService,
    breaker: CircuitBreaker,
    metrics_interval: Option<Duration>,
}

impl Scheduler {
    /// Build with the message types enabled in `config`.
    pub fn new(config: &BdayConfig, collaborators: Collaborators) -> Result<Self, BdayError> {
        let registry = registry_from_config(config)?;
        Self::with_registry(config, collaborators, registry)
    }

    /// Build with a caller-assembled registry, e.g. one holding custom strategies.
    pub fn with_registry(
        config: &BdayConfig,
        collaborators: Collaborators,
        registry: StrategyRegistry,
    ) -> Result<Self, BdayError> {
        if registry.is_empty() {
            warn!("no message types enabled; nothing will be scheduled");
        }
        let registry = Arc::new(registry);
        let resolver = OccurrenceResolver::from_config(&config.resolver)?;
        let breaker = CircuitBreaker::from_config(&config.breaker).with_observer(|t| {
            let (from, to) = (t.from.as_str(), t.to.as_str());
            bday_prometheus::record_breaker_transition(from, to, t.to.as_gauge())
        });

        let Collaborators {
            store,
            queue,
            directory,
            sender,
        } = collaborators;

        let seeder = Seeder::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&registry),
            resolver,
            config.seeder.clone(),
        );
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            config.dispatcher.clone(),
        );
        let pool = WorkerPool::new(DeliveryContext {
            store: Arc::clone(&store),
            queue: Arc::clone(&queue),
            directory,
            sender,
            registry,
            breaker: breaker.clone(),
            backoff: ExponentialBackoff::from_config(&config.worker),
            config: config.worker.clone(),
            visibility_timeout: config.queue.visibility_timeout(),
        });
        let admin = AdminService::new(store, queue);

        Ok(Self {
            seeder,
            dispatcher,
            pool,
            admin,
            breaker,
            metrics_interval: config.metrics.enabled.then(|| config.dispatcher.interval()),
        })
    }

    pub fn seeder(&self) -> &Seeder {
        &self.seeder
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn admin(&self) -> &AdminService {
        &self.admin
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run every loop until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!("scheduler started");
        tokio::join!(
            self.seeder.run(token.clone()),
            self.dispatcher.run(token.clone()),
            self.pool.run(token.clone()),
            self.publish_metrics(token.clone()),
        );
        info!("scheduler stopped");
    }

    async fn publish_metrics(&self, token: CancellationToken) {
        let Some(interval) = self.metrics_interval else {
            return;
        };
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.admin.publish_metrics().await {
                        debug!(error = %e, "metrics refresh failed");
                    }
                }
            }
        }
    }
}
