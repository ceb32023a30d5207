// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scheduled HTTP ping tasks and their run history.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerCoreError};
use crate::schedule::Schedule;
use crate::url_guard::check_task_url_format;

/// Registry namespace for built-in jobs.
pub const CORE_SOURCE: &str = "core";
/// Registry namespace for administrator-defined tasks.
pub const TASK_SOURCE: &str = "task";

pub const MIN_TASK_NAME_LEN: usize = 3;
pub const MAX_TASK_NAME_LEN: usize = 100;

pub const DEFAULT_TASK_TIMEOUT_SECS: u32 = 30;
pub const MIN_TASK_TIMEOUT_SECS: u32 = 1;
pub const MAX_TASK_TIMEOUT_SECS: u32 = 300;

/// Primary key of a scheduled task row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
	/// Name of the registry entry backing this task.
	pub fn job_name(&self) -> String {
		format!("task_{}", self.0)
	}

	/// Inverse of [`TaskId::job_name`].
	pub fn from_job_name(name: &str) -> Option<Self> {
		name.strip_prefix("task_")?.parse().ok().map(Self)
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for TaskId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(Self(s.parse()?))
	}
}

/// A persisted, administrator-defined HTTP ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
	pub id: TaskId,
	pub name: String,
	pub url: String,
	pub schedule: String,
	pub is_active: bool,
	pub timeout_seconds: u32,
	pub created_by: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl ScheduledTask {
	pub fn job_name(&self) -> String {
		self.id.job_name()
	}

	/// Request deadline, clamped even if the stored value was edited out of range.
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(u64::from(clamp_timeout(Some(self.timeout_seconds))))
	}
}

/// Task fields as submitted by an administrator, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInput {
	pub name: String,
	pub url: String,
	pub schedule: String,
	#[serde(default = "default_active")]
	pub is_active: bool,
	#[serde(default)]
	pub timeout_seconds: Option<u32>,
}

fn default_active() -> bool {
	true
}

/// Task fields that passed every check not requiring network access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTask {
	pub name: String,
	pub url: String,
	pub schedule: String,
	pub is_active: bool,
	pub timeout_seconds: u32,
}

impl TaskInput {
	/// Validate name, URL format and schedule, and clamp the timeout.
	///
	/// Destination checks are left to [`crate::UrlGuard::vet`].
	pub fn validate(&self) -> Result<ValidatedTask> {
		let name = validate_task_name(&self.name)?;
		let url = self.url.trim().to_string();
		check_task_url_format(&url)?;
		let schedule = Schedule::parse(&self.schedule)?;

		Ok(ValidatedTask {
			name,
			url,
			schedule: schedule.expression().to_string(),
			is_active: self.is_active,
			timeout_seconds: clamp_timeout(self.timeout_seconds),
		})
	}
}

/// Trim and length-check a task name.
pub fn validate_task_name(name: &str) -> Result<String> {
	let name = name.trim();
	let len = name.chars().count();
	if !(MIN_TASK_NAME_LEN..=MAX_TASK_NAME_LEN).contains(&len) {
		return Err(SchedulerCoreError::InvalidTaskName(format!(
			"name must be between {MIN_TASK_NAME_LEN} and {MAX_TASK_NAME_LEN} characters, got {len}"
		)));
	}
	Ok(name.to_string())
}

/// Clamp a request timeout into `[1, 300]` seconds; missing or zero means the default of 30.
pub fn clamp_timeout(timeout_seconds: Option<u32>) -> u32 {
	match timeout_seconds {
		None | Some(0) => DEFAULT_TASK_TIMEOUT_SECS,
		Some(secs) => secs.clamp(MIN_TASK_TIMEOUT_SECS, MAX_TASK_TIMEOUT_SECS),
	}
}

/// Outcome of a single task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
	/// The endpoint answered with a 2xx status.
	Success,
	/// The endpoint answered with a non-2xx status.
	Failed,
	/// No complete response within the task's timeout.
	Timeout,
	/// Connection or protocol error.
	Error,
	/// The URL failed the safety check right before execution.
	Blocked,
}

impl RunStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::Failed => "failed",
			Self::Timeout => "timeout",
			Self::Error => "error",
			Self::Blocked => "blocked",
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success)
	}
}

impl fmt::Display for RunStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for RunStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"success" => Ok(Self::Success),
			"failed" => Ok(Self::Failed),
			"timeout" => Ok(Self::Timeout),
			"error" => Ok(Self::Error),
			"blocked" => Ok(Self::Blocked),
			_ => Err(format!("unknown run status: {s}")),
		}
	}
}

/// What caused a job to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
	Schedule,
	Manual,
}

impl TriggerSource {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Schedule => "schedule",
			Self::Manual => "manual",
		}
	}
}

impl fmt::Display for TriggerSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for TriggerSource {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"schedule" => Ok(Self::Schedule),
			"manual" => Ok(Self::Manual),
			_ => Err(format!("unknown trigger source: {s}")),
		}
	}
}

/// One execution of a task, as recorded in the run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTaskRun {
	pub id: i64,
	pub task_id: TaskId,
	pub status: RunStatus,
	pub status_code: Option<u16>,
	pub duration_ms: Option<i64>,
	pub error_message: Option<String>,
	pub triggered_by: TriggerSource,
	pub started_at: DateTime<Utc>,
}

/// A run record before it has been assigned a row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaskRun {
	pub task_id: TaskId,
	pub status: RunStatus,
	pub status_code: Option<u16>,
	pub duration_ms: Option<i64>,
	pub error_message: Option<String>,
	pub triggered_by: TriggerSource,
	pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn input(name: &str, url: &str, schedule: &str, timeout: Option<u32>) -> TaskInput {
		TaskInput {
			name: name.to_string(),
			url: url.to_string(),
			schedule: schedule.to_string(),
			is_active: true,
			timeout_seconds: timeout,
		}
	}

	#[test]
	fn test_timeout_clamping() {
		assert_eq!(clamp_timeout(Some(0)), 30);
		assert_eq!(clamp_timeout(None), 30);
		assert_eq!(clamp_timeout(Some(10_000)), 300);
		assert_eq!(clamp_timeout(Some(1)), 1);
		assert_eq!(clamp_timeout(Some(45)), 45);
	}

	#[test]
	fn test_validate_clamps_timeout() {
		let task = input("Nightly ping", "https://example.com/hook", "@daily", Some(0))
			.validate()
			.unwrap();
		assert_eq!(task.timeout_seconds, 30);

		let task = input("Nightly ping", "https://example.com/hook", "@daily", Some(10_000))
			.validate()
			.unwrap();
		assert_eq!(task.timeout_seconds, 300);
	}

	#[test]
	fn test_validate_trims_fields() {
		let task = input("  Ping  ", " https://example.com/hook ", " */5 * * * * ", None)
			.validate()
			.unwrap();
		assert_eq!(task.name, "Ping");
		assert_eq!(task.url, "https://example.com/hook");
		assert_eq!(task.schedule, "*/5 * * * *");
	}

	#[test]
	fn test_validate_rejects_bad_name() {
		assert!(matches!(
			input("ab", "https://example.com/", "@daily", None).validate(),
			Err(SchedulerCoreError::InvalidTaskName(_))
		));
		assert!(matches!(
			input(&"x".repeat(101), "https://example.com/", "@daily", None).validate(),
			Err(SchedulerCoreError::InvalidTaskName(_))
		));
		assert!(input(&"x".repeat(100), "https://example.com/", "@daily", None)
			.validate()
			.is_ok());
	}

	#[test]
	fn test_validate_rejects_bad_url_and_schedule() {
		assert!(input("Ping", "ftp://example.com/x", "@daily", None)
			.validate()
			.is_err());
		assert!(input("Ping", "", "@daily", None).validate().is_err());
		assert!(input("Ping", "https://example.com/", "* * * *", None)
			.validate()
			.is_err());
	}

	#[test]
	fn test_validate_leaves_private_destinations_to_guard() {
		let task = input("Local ping", "http://127.0.0.1:8080/hook", "@daily", None)
			.validate()
			.unwrap();
		assert_eq!(task.url, "http://127.0.0.1:8080/hook");
	}

	#[test]
	fn test_job_name_roundtrip() {
		let id = TaskId(42);
		assert_eq!(id.job_name(), "task_42");
		assert_eq!(TaskId::from_job_name("task_42"), Some(id));
		assert_eq!(TaskId::from_job_name("cleanup"), None);
	}

	#[test]
	fn test_task_input_defaults_to_active() {
		let input: TaskInput = serde_json::from_str(
			r#"{"name":"Ping","url":"https://example.com","schedule":"@hourly"}"#,
		)
		.unwrap();
		assert!(input.is_active);
		assert_eq!(input.timeout_seconds, None);
	}

	proptest! {
		#[test]
		fn clamped_timeout_is_always_in_range(secs in any::<u32>()) {
			let clamped = clamp_timeout(Some(secs));
			prop_assert!((MIN_TASK_TIMEOUT_SECS..=MAX_TASK_TIMEOUT_SECS).contains(&clamped));
		}

		#[test]
		fn run_status_roundtrip(status in prop_oneof![
			Just(RunStatus::Success),
			Just(RunStatus::Failed),
			Just(RunStatus::Timeout),
			Just(RunStatus::Error),
			Just(RunStatus::Blocked),
		]) {
			let parsed: RunStatus = status.to_string().parse().unwrap();
			prop_assert_eq!(status, parsed);
		}
	}
}
