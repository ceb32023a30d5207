// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dynamic job scheduler for Loom server.
//!
//! This crate merges compiled-in jobs and administrator-defined HTTP ping
//! tasks into one live schedule, with persisted schedule overrides, manual
//! triggering, SSRF-checked task execution and paginated run history in
//! SQLite.

pub mod bootstrap;
pub mod db;
pub mod error;
pub mod executor;
pub mod job;
pub mod jobs;
pub mod pagination;
pub mod registry;
pub mod repository;
pub mod service;
#[cfg(test)]
pub(crate) mod testing;
pub mod timer;

pub use bootstrap::{register_core_jobs, replay_overrides, schedule_active_tasks};
pub use db::{create_pool, run_migrations};
pub use error::{JobError, Result, SchedulerError};
pub use executor::{TaskExecutor, TaskPingJob, TaskRunner};
pub use job::{Job, JobContext, JobOutput};
pub use pagination::{Page, PageRequest};
pub use registry::{JobRegistration, JobRegistry};
pub use repository::{
	ScheduleOverrideStore, SqliteOverrideRepository, SqliteTaskRepository, TaskRepository,
};
pub use service::ScheduledTaskService;
pub use timer::{EntryId, EntryTimes, Timer};
