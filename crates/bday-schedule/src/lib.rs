// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Occurrence resolution and message type strategies.
//!
//! [`OccurrenceResolver`] turns a calendar date, a timezone and a local send
//! time into the UTC instant a message is due. [`StrategyRegistry`] maps each
//! message type to the [`MessageStrategy`] that decides eligibility and content.

pub mod builtin;
pub mod occurrence;
pub mod strategy;

pub use builtin::{ANNIVERSARY, AnnualGreeting, BIRTHDAY, registry_from_config};
pub use occurrence::{OccurrenceResolver, local_to_utc, parse_send_time, parse_timezone};
pub use strategy::{FailureClass, MessageStrategy, StrategyRegistry, StrategyRegistryBuilder};
