// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types, errors and collaborator traits for the bday scheduler.
//!
//! Every other crate in the workspace depends on this one; it has no
//! knowledge of SQLite, HTTP or the engine loops.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{BdayError, SendError};
pub use types::{
    AdapterType, DeadLetter, HealthStatus, MessageStatus, NackOutcome, NewScheduledMessage,
    Occurrence, QueueDepth, QueueEnvelope, ScheduledMessage, SendRequest, User, idempotency_key,
};

pub use traits::{DeliveryQueue, NotificationSender, PluginAdapter, SchedulingStore, UserDirectory};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn adapter_types_parse_from_their_names() {
        for name in ["Store", "Queue", "Sender", "Directory", "Observability"] {
            let parsed = AdapterType::from_str(name).unwrap();
            assert_eq!(parsed.to_string(), name);
        }
        assert!(AdapterType::from_str("Channel").is_err());
    }

    #[test]
    fn degraded_and_unhealthy_carry_reasons() {
        assert_ne!(HealthStatus::Degraded("slow".into()), HealthStatus::Healthy);
        assert_eq!(
            HealthStatus::Unhealthy("db locked".into()),
            HealthStatus::Unhealthy("db locked".into())
        );
    }

    #[test]
    fn adapter_traits_are_object_safe() {
        fn _store(_: &dyn SchedulingStore) {}
        fn _queue(_: &dyn DeliveryQueue) {}
        fn _sender(_: &dyn NotificationSender) {}
        fn _directory(_: &dyn UserDirectory) {}
        fn _adapter(_: &dyn PluginAdapter) {}
    }
}
