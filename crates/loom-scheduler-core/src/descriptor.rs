// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read models for the scheduler admin view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one registered job, as shown on the scheduler admin page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
	/// Namespace: "core", a module name, or "task".
	pub source: String,
	/// Unique within `source`.
	pub name: String,
	pub description: String,
	/// Schedule baked into the code (or the task row for tasks).
	pub default_schedule: String,
	/// Schedule currently driving the timer.
	pub schedule: String,
	pub is_overridden: bool,
	/// `None` until the job has run at least once in this process.
	pub last_run: Option<DateTime<Utc>>,
	/// `None` when no future fire time could be computed.
	pub next_run: Option<DateTime<Utc>>,
	pub can_trigger: bool,
}

/// An administrator's replacement schedule for a built-in job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOverride {
	pub source: String,
	pub name: String,
	pub schedule: String,
	pub updated_at: DateTime<Utc>,
}
