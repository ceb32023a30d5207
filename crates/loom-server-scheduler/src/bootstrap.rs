// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Startup wiring: built-in jobs, persisted overrides and active tasks.
//!
//! Order matters. Built-in jobs are registered on their defaults first, then
//! overrides are replayed over them, then active tasks are scheduled.

use std::sync::Arc;

use loom_scheduler_core::{Schedule, CORE_SOURCE, TASK_SOURCE};
use loom_server_config::SchedulerConfig;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::executor::TaskExecutor;
use crate::jobs::RunHistoryCleanupJob;
use crate::registry::{JobRegistration, JobRegistry};
use crate::repository::{ScheduleOverrideStore, TaskRepository};

/// Register every built-in job on its default schedule.
#[instrument(skip_all)]
pub async fn register_core_jobs(
	registry: &JobRegistry,
	tasks: Arc<dyn TaskRepository>,
	config: &SchedulerConfig,
) -> Result<()> {
	let cleanup_schedule = Schedule::parse(&config.run_history_cleanup_schedule)?;
	registry
		.register(
			JobRegistration::new(
				CORE_SOURCE,
				cleanup_schedule,
				Arc::new(RunHistoryCleanupJob::new(
					tasks,
					config.run_history_retention_days,
				)),
			)
			.triggerable(),
		)
		.await;

	Ok(())
}

/// Apply persisted overrides. Overrides for unknown jobs or with schedules
/// that no longer parse are skipped and left in storage.
#[instrument(skip_all)]
pub async fn replay_overrides(
	registry: &JobRegistry,
	store: &dyn ScheduleOverrideStore,
) -> Result<usize> {
	let mut applied = 0;
	for stored in store.list_overrides().await? {
		if stored.source == TASK_SOURCE {
			warn!(name = %stored.name, "Ignoring schedule override for a task");
			continue;
		}
		match registry
			.update_schedule(&stored.source, &stored.name, &stored.schedule)
			.await
		{
			Ok(()) => applied += 1,
			Err(e) => warn!(
				source = %stored.source,
				name = %stored.name,
				schedule = %stored.schedule,
				error = %e,
				"Skipping schedule override"
			),
		}
	}

	info!(applied, "Schedule overrides replayed");
	Ok(applied)
}

/// Schedule every active task. Tasks that fail to schedule are logged and skipped.
#[instrument(skip_all)]
pub async fn schedule_active_tasks(
	executor: &TaskExecutor,
	tasks: &dyn TaskRepository,
) -> Result<usize> {
	let mut scheduled = 0;
	for task in tasks.list_active_tasks().await? {
		match executor.add_task(&task).await {
			Ok(()) => scheduled += 1,
			Err(e) => warn!(task_id = %task.id, error = %e, "Skipping task that failed to schedule"),
		}
	}

	info!(scheduled, "Active tasks scheduled");
	Ok(scheduled)
}
