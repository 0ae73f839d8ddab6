// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolves a recurring calendar event to the UTC instant its local send time occurs.
//!
//! The offset is always taken for the local date of the occurrence itself, never
//! for the instant the computation starts from. Wall-clock times that do not
//! exist (spring-forward gaps) move forward to the first valid minute; times that
//! exist twice (fall-back overlaps) resolve to the earlier instant.

use std::str::FromStr;

use bday_config::LeapDayPolicy;
use bday_config::model::ResolverConfig;
use bday_core::{BdayError, Occurrence};
use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use tracing::warn;

/// Longest wall-clock gap observed in the tz database (Pacific/Apia skipped
/// all of 2011-12-30), plus margin.
const MAX_GAP_MINUTES: i64 = 48 * 60;

/// Parse an IANA timezone identifier.
pub fn parse_timezone(name: &str) -> Result<Tz, BdayError> {
    Tz::from_str(name.trim()).map_err(|_| BdayError::InvalidTimezone(name.to_string()))
}

/// Parse a local send time in `HH:MM` form.
pub fn parse_send_time(value: &str) -> Result<NaiveTime, BdayError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| BdayError::Config(format!("invalid send time `{value}`: {e}")))
}

/// Convert a local wall-clock time to UTC.
///
/// Returns `None` only when no valid local time exists within two days of
/// `local`, which the tz database never produces.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    let mut candidate = local;
    for _ in 0..=MAX_GAP_MINUTES {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(first, second) => {
                return Some(first.with_timezone(&Utc).min(second.with_timezone(&Utc)));
            }
            LocalResult::None => candidate += Duration::minutes(1),
        }
    }
    None
}

/// Computes occurrences for a fixed leap-day policy and fallback zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccurrenceResolver {
    leap_day_policy: LeapDayPolicy,
    fallback_timezone: Tz,
}

impl Default for OccurrenceResolver {
    fn default() -> Self {
        Self::new(LeapDayPolicy::default(), Tz::UTC)
    }
}

impl OccurrenceResolver {
    pub fn new(leap_day_policy: LeapDayPolicy, fallback_timezone: Tz) -> Self {
        Self {
            leap_day_policy,
            fallback_timezone,
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Result<Self, BdayError> {
        Ok(Self::new(
            config.leap_day_policy,
            parse_timezone(&config.fallback_timezone)?,
        ))
    }

    pub fn leap_day_policy(&self) -> LeapDayPolicy {
        self.leap_day_policy
    }

    pub fn fallback_timezone(&self) -> Tz {
        self.fallback_timezone
    }

    /// The calendar date `event_date` falls on in `year`.
    ///
    /// Feb 29 maps to the configured fallback day in non-leap years.
    pub fn date_in_year(&self, event_date: NaiveDate, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, event_date.month(), event_date.day()).or_else(|| {
            match self.leap_day_policy {
                LeapDayPolicy::Feb28 => NaiveDate::from_ymd_opt(year, 2, 28),
                LeapDayPolicy::Mar1 => NaiveDate::from_ymd_opt(year, 3, 1),
            }
        })
    }

    /// The occurrence belonging to the annual cycle `year`.
    pub fn occurrence_in_year(
        &self,
        event_date: NaiveDate,
        tz: Tz,
        send_time: NaiveTime,
        year: i32,
    ) -> Option<Occurrence> {
        let date = self.date_in_year(event_date, year)?;
        let due_at_utc = local_to_utc(tz, date.and_time(send_time))?;
        Some(Occurrence { year, due_at_utc })
    }

    /// First occurrence due at or after `from`, in a zone that is already resolved.
    pub fn next_occurrence_in(
        &self,
        event_date: NaiveDate,
        tz: Tz,
        send_time: NaiveTime,
        from: DateTime<Utc>,
    ) -> Result<Occurrence, BdayError> {
        let local_year = from.with_timezone(&tz).year();
        (local_year..=local_year + 1)
            .filter_map(|year| self.occurrence_in_year(event_date, tz, send_time, year))
            .find(|occurrence| occurrence.due_at_utc >= from)
            .ok_or_else(|| {
                BdayError::Internal(format!(
                    "no occurrence of {event_date} in {tz} after {from}"
                ))
            })
    }

    /// First occurrence due at or after `from`.
    ///
    /// Fails with [`BdayError::InvalidTimezone`] for an unknown zone.
    pub fn compute_next_occurrence(
        &self,
        event_date: NaiveDate,
        timezone: &str,
        send_time: NaiveTime,
        from: DateTime<Utc>,
    ) -> Result<Occurrence, BdayError> {
        let tz = parse_timezone(timezone)?;
        self.next_occurrence_in(event_date, tz, send_time, from)
    }

    /// Like [`compute_next_occurrence`](Self::compute_next_occurrence), but an
    /// unknown zone falls back to the configured zone with a warning.
    pub fn next_occurrence_or_fallback(
        &self,
        event_date: NaiveDate,
        timezone: &str,
        send_time: NaiveTime,
        from: DateTime<Utc>,
    ) -> Result<Occurrence, BdayError> {
        match self.compute_next_occurrence(event_date, timezone, send_time, from) {
            Err(BdayError::InvalidTimezone(name)) => {
                warn!(
                    timezone = %name,
                    fallback = %self.fallback_timezone,
                    "unknown timezone, scheduling in fallback zone"
                );
                self.next_occurrence_in(event_date, self.fallback_timezone, send_time, from)
            }
            other => other,
        }
    }
}
