// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metrics hooks for the bday scheduler.
//!
//! The engine records through the metrics-rs facade. [`PrometheusAdapter`]
//! installs a Prometheus recorder and serves the text format on an HTTP
//! listener for scrapers.

pub mod recording;

use std::net::SocketAddr;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;

use bday_core::{AdapterType, BdayError, HealthStatus, PluginAdapter};

pub use recording::{
    record_breaker_transition, record_dead_lettered, record_delivery_attempts, record_dispatched,
    record_failed, record_reconciled, record_scheduled, record_send_duration, record_sent,
    register_metrics, set_message_counts, set_queue_depth,
};

/// Prometheus metrics adapter.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
    listen: SocketAddr,
    exporter: JoinHandle<()>,
}

impl PrometheusAdapter {
    /// Install the Prometheus recorder globally and serve it on `listen`.
    ///
    /// Must be called inside a Tokio runtime. Only one recorder can be
    /// installed per process; a second call fails.
    pub fn serve(listen: SocketAddr) -> Result<Self, BdayError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(listen)
            .build()
            .map_err(|e| {
                BdayError::Internal(format!("failed to start Prometheus exporter on {listen}: {e}"))
            })?;
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|_| {
            BdayError::Internal("a metrics recorder is already installed".to_string())
        })?;

        recording::register_metrics();

        let exporter = tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "prometheus exporter stopped");
            }
        });
        tracing::info!(%listen, "prometheus metrics endpoint listening");

        Ok(Self {
            handle,
            listen,
            exporter,
        })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, BdayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BdayError> {
        self.exporter.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use bday_core::{MessageStatus, QueueDepth};

    fn render_with(record: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            record();
        });
        handle.render()
    }

    #[test]
    fn status_gauges_carry_the_status_label() {
        let mut counts = BTreeMap::new();
        counts.insert(MessageStatus::Sent, 7u64);
        counts.insert(MessageStatus::DeadLettered, 1u64);
        let output = render_with(|| set_message_counts(&counts));
        assert!(output.contains(r#"birthday_scheduler_messages{status="SENT"} 7"#));
        assert!(output.contains(r#"birthday_scheduler_messages{status="DEAD_LETTERED"} 1"#));
    }

    #[test]
    fn queue_depth_is_labelled_by_queue() {
        let depth = QueueDepth {
            pending: 3,
            in_flight: 2,
            dead_lettered: 4,
        };
        let output = render_with(|| set_queue_depth(&depth));
        assert!(output.contains(r#"birthday_scheduler_queue_depth{queue_name="delivery"} 5"#));
        assert!(output.contains(r#"birthday_scheduler_queue_depth{queue_name="dead_letter"} 4"#));
    }

    #[test]
    fn breaker_transitions_count_per_edge() {
        let output = render_with(|| {
            record_breaker_transition("closed", "open", 2.0);
            record_breaker_transition("closed", "open", 2.0);
        });
        assert!(output.contains(
            r#"birthday_scheduler_circuit_breaker_transitions_total{from="closed",to="open"} 2"#
        ));
        assert!(output.contains("birthday_scheduler_circuit_breaker_state 2"));
    }

    #[test]
    fn attempts_histogram_is_rendered() {
        let output = render_with(|| record_delivery_attempts("birthday", 3));
        assert!(output.contains("birthday_scheduler_delivery_attempts"));
        assert!(output.contains(r#"message_type="birthday""#));
    }
}
