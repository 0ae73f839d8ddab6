// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in birthday and anniversary strategies.

use std::sync::Arc;

use bday_config::{BdayConfig, MessageTypeConfig};
use bday_core::{BdayError, User};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use tracing::debug;

use crate::occurrence::{parse_send_time, parse_timezone};
use crate::strategy::{MessageStrategy, StrategyRegistry};

pub const BIRTHDAY: &str = "birthday";
pub const ANNIVERSARY: &str = "anniversary";

const BIRTHDAY_TEMPLATE: &str = "Hey, {name} it's your birthday";
const ANNIVERSARY_TEMPLATE: &str = "Hey, {name} happy anniversary!";

/// Which user field a strategy reads its event date from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateField {
    Birthday,
    Anniversary,
}

/// A yearly greeting keyed off one of the user's dates.
#[derive(Debug, Clone)]
pub struct AnnualGreeting {
    message_type: &'static str,
    field: DateField,
    send_time: NaiveTime,
    template: String,
}

impl AnnualGreeting {
    pub fn birthday(send_time: NaiveTime) -> Self {
        Self {
            message_type: BIRTHDAY,
            field: DateField::Birthday,
            send_time,
            template: BIRTHDAY_TEMPLATE.to_string(),
        }
    }

    pub fn anniversary(send_time: NaiveTime) -> Self {
        Self {
            message_type: ANNIVERSARY,
            field: DateField::Anniversary,
            send_time,
            template: ANNIVERSARY_TEMPLATE.to_string(),
        }
    }

    /// Replace the content template. `{name}` expands to the user's name.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    fn configured(mut self, config: &MessageTypeConfig) -> Self {
        if let Some(template) = &config.template {
            self.template = template.clone();
        }
        self
    }
}

impl MessageStrategy for AnnualGreeting {
    fn message_type(&self) -> &str {
        self.message_type
    }

    fn event_date(&self, user: &User) -> Option<NaiveDate> {
        match self.field {
            DateField::Birthday => Some(user.birthday_date),
            DateField::Anniversary => user.anniversary_date,
        }
    }

    fn send_time(&self) -> NaiveTime {
        self.send_time
    }

    /// Only for events that already happened in an earlier year, counted in
    /// the user's own zone. An unknown zone counts in UTC.
    fn should_send(&self, user: &User, as_of: DateTime<Utc>) -> bool {
        let local_year = parse_timezone(&user.timezone)
            .map(|tz| as_of.with_timezone(&tz).year())
            .unwrap_or_else(|_| as_of.year());
        self.event_date(user)
            .is_some_and(|date| date.year() < local_year)
    }

    fn compose_content(&self, user: &User) -> String {
        self.template.replace("{name}", user.name.trim())
    }

    fn validate(&self, user: &User) -> Result<(), BdayError> {
        let invalid = |reason: &str| BdayError::InvalidUser {
            user_id: user.id.clone(),
            message_type: self.message_type.to_string(),
            reason: reason.to_string(),
        };
        if user.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.event_date(user).is_none() {
            return Err(invalid("no event date"));
        }
        Ok(())
    }
}

/// Build the registry for the message types enabled in `config`.
pub fn registry_from_config(config: &BdayConfig) -> Result<StrategyRegistry, BdayError> {
    let default_send_time = parse_send_time(&config.resolver.send_time)?;
    let send_time_for = |message: &MessageTypeConfig| -> Result<NaiveTime, BdayError> {
        message
            .send_time
            .as_deref()
            .map(parse_send_time)
            .transpose()
            .map(|t| t.unwrap_or(default_send_time))
    };

    let mut builder = StrategyRegistry::builder();
    let birthday = &config.messages.birthday;
    if birthday.enabled {
        let strategy = AnnualGreeting::birthday(send_time_for(birthday)?).configured(birthday);
        builder = builder.register(BIRTHDAY, Arc::new(strategy))?;
    }
    let anniversary = &config.messages.anniversary;
    if anniversary.enabled {
        let strategy =
            AnnualGreeting::anniversary(send_time_for(anniversary)?).configured(anniversary);
        builder = builder.register(ANNIVERSARY, Arc::new(strategy))?;
    }

    let registry = builder.build();
    debug!(types = ?registry.message_types().collect::<Vec<_>>(), "strategy registry built");
    Ok(registry)
}
