// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The exporter installs the global recorder, so this file holds a single test.

use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpListener};

use bday_core::{MessageStatus, PluginAdapter, QueueDepth};
use bday_prometheus::{PrometheusAdapter, set_message_counts, set_queue_depth};

fn free_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scrape_returns_recorded_gauges() {
    let addr = free_port();
    let adapter = PrometheusAdapter::serve(addr).unwrap();
    assert_eq!(adapter.listen_addr(), addr);

    let mut counts = BTreeMap::new();
    counts.insert(MessageStatus::Sent, 3u64);
    set_message_counts(&counts);
    set_queue_depth(&QueueDepth {
        pending: 2,
        in_flight: 0,
        dead_lettered: 1,
    });

    let body = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains(r#"birthday_scheduler_messages{status="SENT"} 3"#));
    assert!(body.contains(r#"birthday_scheduler_queue_depth{queue_name="dead_letter"} 1"#));
    assert!(adapter.render().contains("birthday_scheduler_messages"));

    adapter.shutdown().await.unwrap();
}
