// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_scheduler_core::{SchedulerCoreError, TaskId};

/// Errors returned by a [`crate::Job`] run.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
	#[error("Job failed: {0}")]
	Failed(String),

	#[error("Job is already running")]
	AlreadyRunning,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
	#[error(transparent)]
	Validation(#[from] SchedulerCoreError),

	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("Job not found: {0}")]
	JobNotFound(String),

	#[error("Job {0} cannot be triggered manually")]
	NoTriggerJob(String),

	#[error("Job {0} is already running")]
	AlreadyRunning(String),

	#[error("Schedule overrides are not supported for {0}; edit the task instead")]
	OverrideNotAllowed(String),

	#[error("Task not found: {0}")]
	TaskNotFound(TaskId),

	#[error("Task {0} is not scheduled")]
	TaskNotScheduled(TaskId),

	#[error("Job {key} failed: {source}")]
	Job {
		key: String,
		#[source]
		source: JobError,
	},

	#[error("Internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Display form of a registry key, used in error messages and log fields.
pub(crate) fn job_key(source: &str, name: &str) -> String {
	format!("{source}/{name}")
}
