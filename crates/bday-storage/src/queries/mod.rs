// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the scheduling store and the delivery queue.

pub mod messages;
pub mod queue;
