// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistence for schedule overrides, scheduled tasks and task run history.

mod overrides;
mod tasks;

pub use overrides::{ScheduleOverrideStore, SqliteOverrideRepository};
pub use tasks::{SqliteTaskRepository, TaskRepository};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Result, SchedulerError};

/// Fixed-width RFC 3339 so stored timestamps sort and compare as text.
pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
	dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|_| SchedulerError::Internal(format!("Invalid {column}: {value}")))
}
