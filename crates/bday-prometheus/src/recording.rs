// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder collects these.
//! Without a recorder every call is a no-op.

use std::collections::BTreeMap;

use bday_core::{MessageStatus, QueueDepth};
use metrics::{describe_counter, describe_gauge, describe_histogram};

pub const MESSAGES: &str = "birthday_scheduler_messages";
pub const QUEUE_DEPTH: &str = "birthday_scheduler_queue_depth";
pub const BREAKER_TRANSITIONS: &str = "birthday_scheduler_circuit_breaker_transitions_total";
pub const BREAKER_STATE: &str = "birthday_scheduler_circuit_breaker_state";
pub const DELIVERY_ATTEMPTS: &str = "birthday_scheduler_delivery_attempts";
pub const SEND_DURATION: &str = "birthday_scheduler_send_duration_seconds";
pub const SCHEDULED_TOTAL: &str = "birthday_scheduler_messages_scheduled_total";
pub const DISPATCHED_TOTAL: &str = "birthday_scheduler_messages_dispatched_total";
pub const SENT_TOTAL: &str = "birthday_scheduler_messages_sent_total";
pub const FAILED_TOTAL: &str = "birthday_scheduler_messages_failed_total";
pub const DEAD_LETTERED_TOTAL: &str = "birthday_scheduler_messages_dead_lettered_total";
pub const RECONCILED_TOTAL: &str = "birthday_scheduler_messages_reconciled_total";

/// Register all metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_gauge!(MESSAGES, "Scheduled messages per lifecycle status");
    describe_gauge!(QUEUE_DEPTH, "Envelopes per delivery queue");
    describe_counter!(BREAKER_TRANSITIONS, "Circuit breaker state changes");
    describe_gauge!(
        BREAKER_STATE,
        "Circuit breaker state (0 closed, 1 half-open, 2 open)"
    );
    describe_histogram!(
        DELIVERY_ATTEMPTS,
        "Delivery attempts a message needed to reach a final status"
    );
    describe_histogram!(SEND_DURATION, "Notification sender call latency in seconds");
    describe_counter!(SCHEDULED_TOTAL, "Messages created by the seeder");
    describe_counter!(DISPATCHED_TOTAL, "Messages handed to the delivery queue");
    describe_counter!(SENT_TOTAL, "Messages delivered");
    describe_counter!(FAILED_TOTAL, "Messages that failed permanently");
    describe_counter!(DEAD_LETTERED_TOTAL, "Messages dead-lettered");
    describe_counter!(RECONCILED_TOTAL, "Messages repaired by reconciliation");
}

/// Publish the per-status message counts.
pub fn set_message_counts(counts: &BTreeMap<MessageStatus, u64>) {
    for (status, count) in counts {
        metrics::gauge!(MESSAGES, "status" => status.as_str()).set(*count as f64);
    }
}

/// Publish queue depth. The live queue counts pending and leased envelopes.
pub fn set_queue_depth(depth: &QueueDepth) {
    metrics::gauge!(QUEUE_DEPTH, "queue_name" => "delivery")
        .set((depth.pending + depth.in_flight) as f64);
    metrics::gauge!(QUEUE_DEPTH, "queue_name" => "in_flight").set(depth.in_flight as f64);
    metrics::gauge!(QUEUE_DEPTH, "queue_name" => "dead_letter").set(depth.dead_lettered as f64);
}

pub fn record_breaker_transition(from: &'static str, to: &'static str, state_gauge: f64) {
    metrics::counter!(BREAKER_TRANSITIONS, "from" => from, "to" => to).increment(1);
    metrics::gauge!(BREAKER_STATE).set(state_gauge);
}

pub fn record_delivery_attempts(message_type: &str, attempts: u32) {
    metrics::histogram!(DELIVERY_ATTEMPTS, "message_type" => message_type.to_string())
        .record(f64::from(attempts));
}

pub fn record_send_duration(seconds: f64) {
    metrics::histogram!(SEND_DURATION).record(seconds);
}

pub fn record_scheduled(message_type: &str) {
    metrics::counter!(SCHEDULED_TOTAL, "message_type" => message_type.to_string()).increment(1);
}

pub fn record_dispatched(count: u64) {
    metrics::counter!(DISPATCHED_TOTAL).increment(count);
}

pub fn record_sent(message_type: &str) {
    metrics::counter!(SENT_TOTAL, "message_type" => message_type.to_string()).increment(1);
}

/// `reason` is a short label such as a send error kind.
pub fn record_failed(message_type: &str, reason: &'static str) {
    metrics::counter!(
        FAILED_TOTAL,
        "message_type" => message_type.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_dead_lettered(message_type: &str) {
    metrics::counter!(DEAD_LETTERED_TOTAL, "message_type" => message_type.to_string())
        .increment(1);
}

/// `kind` is `enqueued` or `sending`, the status the repaired message was stuck in.
pub fn record_reconciled(kind: &'static str, count: u64) {
    metrics::counter!(RECONCILED_TOTAL, "kind" => kind).increment(count);
}
