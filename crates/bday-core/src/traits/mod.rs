// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the pipeline's collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod directory;
pub mod queue;
pub mod sender;
pub mod store;

pub use adapter::PluginAdapter;
pub use directory::UserDirectory;
pub use queue::DeliveryQueue;
pub use sender::NotificationSender;
pub use store::SchedulingStore;
