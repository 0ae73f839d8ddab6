// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the bday message scheduler.

use std::time::Duration;

use thiserror::Error;

use crate::types::MessageStatus;

/// The primary error type used across all bday adapter traits and core operations.
#[derive(Debug, Error)]
pub enum BdayError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The scheduling store could not complete the operation. Callers retry with backoff.
    #[error("scheduling store unavailable: {source}")]
    StoreUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The delivery queue could not complete the operation.
    #[error("delivery queue error: {source}")]
    Queue {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An IANA timezone identifier could not be resolved.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// No strategy is registered for the requested message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A strategy was registered twice under the same message type.
    #[error("message type already registered: {0}")]
    DuplicateMessageType(String),

    /// A status change that the lifecycle never allows.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: MessageStatus, to: MessageStatus },

    /// A user record is not eligible for the given message type.
    #[error("user {user_id} is not valid for {message_type}: {reason}")]
    InvalidUser {
        user_id: String,
        message_type: String,
        reason: String,
    },

    /// A requested record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The user directory collaborator failed.
    #[error("user directory error: {message}")]
    Directory {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The notification sender collaborator failed.
    #[error("sender error: {0}")]
    Sender(#[from] SendError),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BdayError {
    /// Whether the failure is worth retrying (storage hiccups, timeouts, transient sends).
    pub fn is_transient(&self) -> bool {
        match self {
            BdayError::StoreUnavailable { .. }
            | BdayError::Queue { .. }
            | BdayError::Directory { .. }
            | BdayError::Timeout { .. } => true,
            BdayError::Sender(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Failure reported by the notification sender collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The send did not complete within the configured timeout.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    /// The remote endpoint answered with a non-success status code.
    #[error("remote error {code}: {body}")]
    RemoteError { code: u16, body: String },

    /// The remote endpoint is throttling us.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The request never reached the remote endpoint.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SendError {
    /// 4xx responses other than 408 and 429 describe a bad request that will
    /// fail again no matter how often it is retried.
    pub fn is_transient(&self) -> bool {
        match self {
            SendError::RemoteError { code, .. } => {
                !(400..500).contains(code) || *code == 408 || *code == 429
            }
            SendError::Timeout(_) | SendError::RateLimited { .. } | SendError::Transport(_) => {
                true
            }
        }
    }

    /// Short machine-friendly label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SendError::Timeout(_) => "timeout",
            SendError::RemoteError { .. } => "remote_error",
            SendError::RateLimited { .. } => "rate_limited",
            SendError::Transport(_) => "transport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_permanent_except_timeout_and_throttle() {
        let bad_request = SendError::RemoteError {
            code: 400,
            body: "invalid recipient".into(),
        };
        assert!(!bad_request.is_transient());

        for code in [408u16, 429, 500, 502, 503] {
            let err = SendError::RemoteError {
                code,
                body: String::new(),
            };
            assert!(err.is_transient(), "{code} should be retried");
        }
    }

    #[test]
    fn store_and_timeout_errors_are_transient() {
        let store = BdayError::StoreUnavailable {
            source: Box::new(std::io::Error::other("disk full")),
        };
        assert!(store.is_transient());
        assert!(
            BdayError::Timeout {
                duration: Duration::from_secs(1)
            }
            .is_transient()
        );
        assert!(!BdayError::UnknownMessageType("x".into()).is_transient());
        assert!(!BdayError::InvalidTimezone("Mars/Olympus".into()).is_transient());
    }

    #[test]
    fn invalid_transition_displays_both_states() {
        let err = BdayError::InvalidTransition {
            from: MessageStatus::Failed,
            to: MessageStatus::Scheduled,
        };
        assert_eq!(err.to_string(), "invalid status transition FAILED -> SCHEDULED");
    }
}
