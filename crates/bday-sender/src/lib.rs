// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP notification sender.
//!
//! [`HttpSender`] posts each [`SendRequest`](bday_core::SendRequest) as JSON
//! to a configured endpoint and maps the response onto
//! [`SendError`](bday_core::SendError). It makes exactly one attempt per
//! call; retries, backoff and circuit breaking belong to the delivery worker.

pub mod client;

pub use client::{HttpSender, IDEMPOTENCY_HEADER};
