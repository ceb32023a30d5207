// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for scheduler validation.

use thiserror::Error;

/// Result type for scheduler core operations.
pub type Result<T> = std::result::Result<T, SchedulerCoreError>;

/// Validation errors raised before any schedule or task reaches the live scheduler.
///
/// The `Display` output is meant to be shown to an administrator as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerCoreError {
	#[error("schedule expression is empty")]
	EmptySchedule,

	#[error("expected 5 cron fields (minute hour day-of-month month day-of-week), found {found}")]
	InvalidFieldCount { found: usize },

	#[error("unknown schedule shortcut: {0}")]
	UnknownShortcut(String),

	#[error("invalid interval: {0}")]
	InvalidInterval(String),

	#[error("invalid cron expression: {0}")]
	InvalidCronExpression(String),

	#[error("invalid task name: {0}")]
	InvalidTaskName(String),

	#[error("URL is too long ({len} characters, maximum is {max})")]
	UrlTooLong { len: usize, max: usize },

	#[error("invalid URL: {0}")]
	InvalidUrl(String),

	#[error("unsafe URL: {0}")]
	UnsafeUrl(String),

	#[error("could not resolve host {host}: {message}")]
	ResolveFailed { host: String, message: String },
}
