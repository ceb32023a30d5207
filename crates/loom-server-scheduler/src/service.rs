// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Task lifecycle operations for the admin layer.
//!
//! Input is fully validated, including DNS, before anything is written. The
//! row is written first and the live schedule changed second; if the live
//! change fails the row change is undone. Mutations run one at a time so the
//! stored row and the live entry always move together.

use std::sync::Arc;

use loom_scheduler_core::{ScheduledTask, ScheduledTaskRun, TaskId, TaskInput, UrlGuard, ValidatedTask};
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use crate::error::{Result, SchedulerError};
use crate::executor::TaskExecutor;
use crate::job::JobOutput;
use crate::pagination::{Page, PageRequest};
use crate::repository::TaskRepository;

pub struct ScheduledTaskService {
	tasks: Arc<dyn TaskRepository>,
	executor: Arc<TaskExecutor>,
	guard: UrlGuard,
	/// Held across the row write, the reschedule and any rollback.
	lifecycle: Mutex<()>,
}

impl ScheduledTaskService {
	pub fn new(tasks: Arc<dyn TaskRepository>, executor: Arc<TaskExecutor>, guard: UrlGuard) -> Self {
		Self {
			tasks,
			executor,
			guard,
			lifecycle: Mutex::new(()),
		}
	}

	/// Validate everything about a task, resolving the URL's host.
	pub async fn validate(&self, input: &TaskInput) -> Result<ValidatedTask> {
		let validated = input.validate()?;
		self.guard.vet(&validated.url).await?;
		Ok(validated)
	}

	#[instrument(skip(self, input), fields(name = %input.name))]
	pub async fn create_task(
		&self,
		input: &TaskInput,
		created_by: Option<&str>,
	) -> Result<ScheduledTask> {
		let validated = self.validate(input).await?;
		let _lifecycle = self.lifecycle.lock().await;
		let task = self.tasks.create_task(&validated, created_by).await?;

		if task.is_active {
			if let Err(e) = self.executor.add_task(&task).await {
				error!(task_id = %task.id, error = %e, "Scheduling new task failed, removing row");
				if let Err(rollback) = self.tasks.delete_task(task.id).await {
					error!(task_id = %task.id, error = %rollback, "Rollback of task creation failed");
				}
				return Err(e);
			}
		}

		info!(task_id = %task.id, active = task.is_active, "Scheduled task created");
		Ok(task)
	}

	#[instrument(skip(self, input), fields(task_id = %id))]
	pub async fn update_task(&self, id: TaskId, input: &TaskInput) -> Result<ScheduledTask> {
		let validated = self.validate(input).await?;
		let _lifecycle = self.lifecycle.lock().await;
		let previous = self.get_task(id).await?;
		let updated = self
			.tasks
			.update_task(id, &validated)
			.await?
			.ok_or(SchedulerError::TaskNotFound(id))?;

		if let Err(e) = self.executor.reschedule_task(&updated).await {
			error!(error = %e, "Rescheduling edited task failed, restoring previous row");
			self.restore(&previous).await;
			return Err(e);
		}

		info!(active = updated.is_active, "Scheduled task updated");
		Ok(updated)
	}

	#[instrument(skip(self), fields(task_id = %id))]
	pub async fn set_active(&self, id: TaskId, is_active: bool) -> Result<ScheduledTask> {
		let _lifecycle = self.lifecycle.lock().await;
		let previous = self.get_task(id).await?;
		let updated = self
			.tasks
			.set_active(id, is_active)
			.await?
			.ok_or(SchedulerError::TaskNotFound(id))?;

		if let Err(e) = self.executor.reschedule_task(&updated).await {
			error!(error = %e, "Toggling task failed, restoring previous row");
			self.restore(&previous).await;
			return Err(e);
		}

		info!(active = is_active, "Scheduled task toggled");
		Ok(updated)
	}

	/// Delete a task with its run history and take it off the timer.
	#[instrument(skip(self), fields(task_id = %id))]
	pub async fn delete_task(&self, id: TaskId) -> Result<()> {
		let _lifecycle = self.lifecycle.lock().await;
		if !self.tasks.delete_task(id).await? {
			return Err(SchedulerError::TaskNotFound(id));
		}
		self.executor.remove_task(id).await;

		info!("Scheduled task deleted");
		Ok(())
	}

	pub async fn trigger_task(&self, id: TaskId) -> Result<JobOutput> {
		self.get_task(id).await?;
		self.executor.trigger_task(id).await
	}

	pub async fn get_task(&self, id: TaskId) -> Result<ScheduledTask> {
		self
			.tasks
			.get_task(id)
			.await?
			.ok_or(SchedulerError::TaskNotFound(id))
	}

	pub async fn list_tasks(&self, page: PageRequest) -> Result<Page<ScheduledTask>> {
		self.tasks.list_tasks(page).await
	}

	pub async fn list_runs(&self, id: TaskId, page: PageRequest) -> Result<Page<ScheduledTaskRun>> {
		self.get_task(id).await?;
		self.tasks.list_runs(id, page).await
	}

	/// Put back a row and the live entry that matched it.
	async fn restore(&self, previous: &ScheduledTask) {
		if let Err(e) = self.tasks.restore_task(previous).await {
			error!(task_id = %previous.id, error = %e, "Restoring task row failed");
		}
		if let Err(e) = self.executor.reschedule_task(previous).await {
			error!(task_id = %previous.id, error = %e, "Restoring task schedule failed");
		}
	}
}
