// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom job scheduler.
//!
//! This crate has no database or runtime state. It provides:
//! - Schedule expression parsing (5-field cron, `@daily`-style shortcuts, `every <duration>`)
//! - SSRF protection for administrator-supplied task URLs
//! - Task, run and job descriptor types shared by the server and admin layers

pub mod descriptor;
pub mod error;
pub mod schedule;
pub mod task;
pub mod url_guard;

pub use descriptor::{JobDescriptor, ScheduleOverride};
pub use error::{Result, SchedulerCoreError};
pub use schedule::{validate_schedule, Schedule, MIN_INTERVAL};
pub use task::{
	clamp_timeout, validate_task_name, NewTaskRun, RunStatus, ScheduledTask, ScheduledTaskRun,
	TaskId, TaskInput, TriggerSource, ValidatedTask, CORE_SOURCE, DEFAULT_TASK_TIMEOUT_SECS,
	MAX_TASK_NAME_LEN, MAX_TASK_TIMEOUT_SECS, MIN_TASK_NAME_LEN, MIN_TASK_TIMEOUT_SECS,
	TASK_SOURCE,
};
pub use url_guard::{
	check_task_url_format, check_task_url_syntax, is_private_or_reserved, validate_task_url,
	HostResolver, SystemResolver, UrlGuard, VettedUrl, MAX_TASK_URL_LEN,
};
