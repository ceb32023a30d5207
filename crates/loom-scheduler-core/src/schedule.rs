// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schedule expression parsing and next run calculation.
//!
//! Accepted forms:
//!
//! - standard 5-field Unix cron: `minute hour day-of-month month day-of-week`
//! - named shortcuts: `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
//!   `@midnight`, `@hourly` (the leading `@` is optional)
//! - fixed intervals: `@every 30m`, `every 1h30m`
//!
//! All cron schedules are evaluated in UTC.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerCoreError};

/// Shortest interval accepted by `every <duration>`.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// A parsed, validated schedule expression.
///
/// The original text is kept verbatim so that it can be displayed and
/// persisted exactly as the administrator typed it.
#[derive(Debug, Clone)]
pub struct Schedule {
	expression: String,
	kind: ScheduleKind,
}

#[derive(Debug, Clone)]
enum ScheduleKind {
	Cron {
		/// 7-field form handed to the `cron` crate.
		fields: String,
		schedule: Box<cron::Schedule>,
	},
	Every(Duration),
}

impl Schedule {
	/// Parse and validate a schedule expression.
	pub fn parse(expression: &str) -> Result<Self> {
		let trimmed = expression.trim();
		if trimmed.is_empty() {
			return Err(SchedulerCoreError::EmptySchedule);
		}

		let lowered = trimmed.to_ascii_lowercase();
		let body = lowered.strip_prefix('@').unwrap_or(&lowered);

		if let Some(rest) = body.strip_prefix("every") {
			if rest.starts_with(char::is_whitespace) {
				let interval = parse_interval(rest.trim())?;
				return Ok(Self {
					expression: trimmed.to_string(),
					kind: ScheduleKind::Every(interval),
				});
			}
		}

		if let Some(fields) = shortcut_fields(body) {
			return Ok(Self {
				expression: trimmed.to_string(),
				kind: parse_cron_fields(fields)?,
			});
		}

		if trimmed.starts_with('@') {
			return Err(SchedulerCoreError::UnknownShortcut(trimmed.to_string()));
		}

		let field_count = trimmed.split_whitespace().count();
		if field_count == 1 {
			return Err(SchedulerCoreError::UnknownShortcut(trimmed.to_string()));
		}
		if field_count != 5 {
			return Err(SchedulerCoreError::InvalidFieldCount { found: field_count });
		}

		Ok(Self {
			expression: trimmed.to_string(),
			kind: parse_cron_fields(trimmed)?,
		})
	}

	/// The expression as originally supplied (trimmed).
	pub fn expression(&self) -> &str {
		&self.expression
	}

	/// The fixed interval, for `every <duration>` schedules.
	pub fn interval(&self) -> Option<Duration> {
		match &self.kind {
			ScheduleKind::Every(interval) => Some(*interval),
			ScheduleKind::Cron { .. } => None,
		}
	}

	/// Next fire time strictly after `after`.
	///
	/// For interval schedules this is simply `after + interval`, so feeding
	/// back the previous fire time keeps the cadence free of drift.
	pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
		match &self.kind {
			ScheduleKind::Cron { schedule, .. } => schedule.after(&after).next(),
			ScheduleKind::Every(interval) => {
				let step = chrono::Duration::from_std(*interval).ok()?;
				after.checked_add_signed(step)
			}
		}
	}

	/// The next `count` fire times after `after`.
	pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
		let mut times = Vec::new();
		let mut cursor = after;
		while times.len() < count {
			match self.next_after(cursor) {
				Some(next) => {
					times.push(next);
					cursor = next;
				}
				None => break,
			}
		}
		times
	}
}

impl PartialEq for Schedule {
	fn eq(&self, other: &Self) -> bool {
		if self.expression != other.expression {
			return false;
		}
		match (&self.kind, &other.kind) {
			(ScheduleKind::Cron { fields: a, .. }, ScheduleKind::Cron { fields: b, .. }) => a == b,
			(ScheduleKind::Every(a), ScheduleKind::Every(b)) => a == b,
			_ => false,
		}
	}
}

impl Eq for Schedule {}

impl fmt::Display for Schedule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.expression)
	}
}

impl FromStr for Schedule {
	type Err = SchedulerCoreError;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}

/// Validate a schedule expression without keeping the parsed form.
pub fn validate_schedule(expression: &str) -> Result<()> {
	Schedule::parse(expression).map(|_| ())
}

fn shortcut_fields(name: &str) -> Option<&'static str> {
	match name {
		"yearly" | "annually" => Some("0 0 1 1 *"),
		"monthly" => Some("0 0 1 * *"),
		"weekly" => Some("0 0 * * 0"),
		"daily" | "midnight" => Some("0 0 * * *"),
		"hourly" => Some("0 * * * *"),
		_ => None,
	}
}

fn parse_interval(text: &str) -> Result<Duration> {
	if text.is_empty() {
		return Err(SchedulerCoreError::InvalidInterval(
			"missing duration after 'every'".to_string(),
		));
	}
	let interval = humantime::parse_duration(text)
		.map_err(|e| SchedulerCoreError::InvalidInterval(format!("{text}: {e}")))?;
	if interval < MIN_INTERVAL {
		return Err(SchedulerCoreError::InvalidInterval(format!(
			"{text}: interval must be at least one second"
		)));
	}
	Ok(interval)
}

/// Convert a standard 5-field Unix cron expression to the 7-field format
/// expected by the `cron` crate and parse it.
///
/// 7-field format: second minute hour day-of-month month day-of-week year
fn parse_cron_fields(expression: &str) -> Result<ScheduleKind> {
	let fields: Vec<&str> = expression.split_whitespace().collect();
	if fields.len() != 5 {
		return Err(SchedulerCoreError::InvalidFieldCount {
			found: fields.len(),
		});
	}

	let day_of_week = normalize_day_of_week(fields[4])?;
	let converted = format!(
		"0 {} {} {} {} {} *",
		fields[0], fields[1], fields[2], fields[3], day_of_week
	);

	let schedule = cron::Schedule::from_str(&converted)
		.map_err(|e| SchedulerCoreError::InvalidCronExpression(format!("{expression}: {e}")))?;

	Ok(ScheduleKind::Cron {
		fields: converted,
		schedule: Box::new(schedule),
	})
}

/// Map Unix day-of-week numbering (0-7, Sunday = 0 or 7) onto the `cron`
/// crate's numbering (1-7, Sunday = 1).
///
/// Wildcard items keep their meaning under both numberings and named days are
/// understood by the `cron` crate directly, so both pass through untouched.
/// Numeric ranges and steps are expanded into explicit lists.
fn normalize_day_of_week(field: &str) -> Result<String> {
	let mut items = Vec::new();

	for item in field.split(',') {
		if item.is_empty() || item.starts_with('*') || item.chars().any(|c| c.is_ascii_alphabetic())
		{
			items.push(item.to_string());
			continue;
		}

		let (range, step) = match item.split_once('/') {
			Some((range, step)) => {
				let step: usize = step.parse().map_err(|_| {
					SchedulerCoreError::InvalidCronExpression(format!("invalid day-of-week step: {item}"))
				})?;
				if step == 0 {
					return Err(SchedulerCoreError::InvalidCronExpression(format!(
						"day-of-week step must be positive: {item}"
					)));
				}
				(range, Some(step))
			}
			None => (item, None),
		};

		let (start, end) = match range.split_once('-') {
			Some((start, end)) => (parse_day_number(start)?, parse_day_number(end)?),
			None => {
				let day = parse_day_number(range)?;
				(day, if step.is_some() { 6 } else { day })
			}
		};
		if start > end {
			return Err(SchedulerCoreError::InvalidCronExpression(format!(
				"day-of-week range is reversed: {item}"
			)));
		}

		let mut days: Vec<u32> = (start..=end)
			.step_by(step.unwrap_or(1))
			.map(|day| day % 7 + 1)
			.collect();
		days.sort_unstable();
		days.dedup();
		items.push(
			days
				.iter()
				.map(|d| d.to_string())
				.collect::<Vec<_>>()
				.join(","),
		);
	}

	Ok(items.join(","))
}

fn parse_day_number(text: &str) -> Result<u32> {
	let day: u32 = text.parse().map_err(|_| {
		SchedulerCoreError::InvalidCronExpression(format!("invalid day-of-week value: {text}"))
	})?;
	if day > 7 {
		return Err(SchedulerCoreError::InvalidCronExpression(format!(
			"day-of-week value out of range (0-7): {day}"
		)));
	}
	Ok(day)
}
