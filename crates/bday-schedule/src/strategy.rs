// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message type strategies and the registry that maps type identifiers to them.
//!
//! The registry is assembled once at startup through [`StrategyRegistryBuilder`]
//! and is immutable afterwards; the engine shares it behind an `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use bday_core::{BdayError, Occurrence, SendError, User};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::occurrence::OccurrenceResolver;

/// How a sender failure affects the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth another attempt after backoff.
    Retryable,
    /// Will fail again; the message goes straight to `FAILED`.
    Permanent,
}

/// Policy for one message type.
pub trait MessageStrategy: Send + Sync {
    /// Registry key, e.g. `"birthday"`.
    fn message_type(&self) -> &str;

    /// The recurring calendar date this type celebrates, if the user has one.
    fn event_date(&self, user: &User) -> Option<NaiveDate>;

    /// Local wall-clock time the message goes out.
    fn send_time(&self) -> NaiveTime;

    /// Whether `user` should receive this message for an occurrence due at `as_of`.
    fn should_send(&self, user: &User, as_of: DateTime<Utc>) -> bool;

    /// Message body for `user`.
    fn compose_content(&self, user: &User) -> String;

    /// Reject users whose data cannot produce a correct message.
    fn validate(&self, user: &User) -> Result<(), BdayError>;

    /// Next occurrence at or after `from`, or `None` when the user has no event date.
    ///
    /// An unknown user timezone falls back to the resolver's fallback zone.
    fn next_occurrence(
        &self,
        resolver: &OccurrenceResolver,
        user: &User,
        from: DateTime<Utc>,
    ) -> Result<Option<Occurrence>, BdayError> {
        self.event_date(user)
            .map(|date| {
                resolver.next_occurrence_or_fallback(date, &user.timezone, self.send_time(), from)
            })
            .transpose()
    }

    /// Client errors other than 408/429 are permanent; everything else is retried.
    fn classify_failure(&self, error: &SendError) -> FailureClass {
        if error.is_transient() {
            FailureClass::Retryable
        } else {
            FailureClass::Permanent
        }
    }
}

/// Immutable map from message type to strategy.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn MessageStrategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("message_types", &self.strategies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StrategyRegistry {
    pub fn builder() -> StrategyRegistryBuilder {
        StrategyRegistryBuilder::default()
    }

    /// Look up the strategy for `message_type`.
    pub fn resolve(&self, message_type: &str) -> Result<Arc<dyn MessageStrategy>, BdayError> {
        self.strategies
            .get(message_type)
            .cloned()
            .ok_or_else(|| BdayError::UnknownMessageType(message_type.to_string()))
    }

    /// Registered message types in sorted order.
    pub fn message_types(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn strategies(&self) -> impl Iterator<Item = &Arc<dyn MessageStrategy>> {
        self.strategies.values()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Collects strategies before the registry is frozen.
#[derive(Default)]
pub struct StrategyRegistryBuilder {
    strategies: BTreeMap<String, Arc<dyn MessageStrategy>>,
}

impl StrategyRegistryBuilder {
    /// Register `strategy` under `message_type`. Registering a type twice is an error.
    pub fn register(
        mut self,
        message_type: impl Into<String>,
        strategy: Arc<dyn MessageStrategy>,
    ) -> Result<Self, BdayError> {
        let message_type = message_type.into();
        if self.strategies.contains_key(&message_type) {
            return Err(BdayError::DuplicateMessageType(message_type));
        }
        self.strategies.insert(message_type, strategy);
        Ok(self)
    }

    pub fn build(self) -> StrategyRegistry {
        StrategyRegistry {
            strategies: self.strategies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl MessageStrategy for Fixed {
        fn message_type(&self) -> &str {
            "fixed"
        }

        fn event_date(&self, _user: &User) -> Option<NaiveDate> {
            NaiveDate::from_ymd_opt(2000, 1, 1)
        }

        fn send_time(&self) -> NaiveTime {
            NaiveTime::MIN
        }

        fn should_send(&self, _user: &User, _as_of: DateTime<Utc>) -> bool {
            true
        }

        fn compose_content(&self, user: &User) -> String {
            format!("hello {}", user.name)
        }

        fn validate(&self, _user: &User) -> Result<(), BdayError> {
            Ok(())
        }
    }

    #[test]
    fn resolve_registered_and_unknown_types() {
        let registry = StrategyRegistry::builder()
            .register("fixed", Arc::new(Fixed))
            .unwrap()
            .build();

        assert_eq!(registry.resolve("fixed").unwrap().message_type(), "fixed");
        let err = registry.resolve("wedding").err().unwrap();
        assert!(matches!(err, BdayError::UnknownMessageType(t) if t == "wedding"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let result = StrategyRegistry::builder()
            .register("fixed", Arc::new(Fixed))
            .unwrap()
            .register("fixed", Arc::new(Fixed));
        assert!(matches!(result, Err(BdayError::DuplicateMessageType(_))));
    }

    #[test]
    fn default_classification_follows_send_error() {
        let permanent = SendError::RemoteError {
            code: 404,
            body: "no such user".into(),
        };
        assert_eq!(Fixed.classify_failure(&permanent), FailureClass::Permanent);
        assert_eq!(
            Fixed.classify_failure(&SendError::RateLimited { retry_after: None }),
            FailureClass::Retryable
        );
    }

    #[test]
    fn default_next_occurrence_delegates_to_resolver() {
        let user = User::new("u1", "Ada", "UTC", NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
        let from = DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let occurrence = Fixed
            .next_occurrence(&OccurrenceResolver::default(), &user, from)
            .unwrap()
            .unwrap();
        assert_eq!(occurrence.year, 2026);
    }
}
