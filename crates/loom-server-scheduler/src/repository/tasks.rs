// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loom_scheduler_core::{
	clamp_timeout, NewTaskRun, ScheduledTask, ScheduledTaskRun, TaskId, ValidatedTask,
};
use sqlx::SqlitePool;
use tracing::instrument;

use super::{format_timestamp, parse_timestamp};
use crate::error::{Result, SchedulerError};
use crate::pagination::{Page, PageRequest};

/// Durable store of scheduled task definitions and their run history.
#[async_trait]
pub trait TaskRepository: Send + Sync {
	async fn create_task(
		&self,
		task: &ValidatedTask,
		created_by: Option<&str>,
	) -> Result<ScheduledTask>;
	async fn get_task(&self, id: TaskId) -> Result<Option<ScheduledTask>>;
	async fn list_tasks(&self, page: PageRequest) -> Result<Page<ScheduledTask>>;
	async fn list_active_tasks(&self) -> Result<Vec<ScheduledTask>>;
	/// Returns `None` when the task does not exist.
	async fn update_task(&self, id: TaskId, task: &ValidatedTask) -> Result<Option<ScheduledTask>>;
	async fn set_active(&self, id: TaskId, is_active: bool) -> Result<Option<ScheduledTask>>;
	/// Write back every mutable column of a previously read row.
	async fn restore_task(&self, task: &ScheduledTask) -> Result<()>;
	/// Delete a task and its run history. Returns `false` when the task did not exist.
	async fn delete_task(&self, id: TaskId) -> Result<bool>;

	async fn record_run(&self, run: &NewTaskRun) -> Result<ScheduledTaskRun>;
	/// Newest first.
	async fn list_runs(&self, task_id: TaskId, page: PageRequest)
		-> Result<Page<ScheduledTaskRun>>;
	async fn delete_runs_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone)]
pub struct SqliteTaskRepository {
	pool: SqlitePool,
}

impl SqliteTaskRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

const TASK_COLUMNS: &str =
	"id, name, url, schedule, is_active, timeout_seconds, created_by, created_at, updated_at";

const RUN_COLUMNS: &str =
	"id, task_id, status, status_code, duration_ms, error_message, triggered_by, started_at";

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
	#[instrument(skip(self, task), fields(name = %task.name))]
	async fn create_task(
		&self,
		task: &ValidatedTask,
		created_by: Option<&str>,
	) -> Result<ScheduledTask> {
		let now = format_timestamp(Utc::now());
		let result = sqlx::query(
			r#"
			INSERT INTO scheduled_tasks (name, url, schedule, is_active, timeout_seconds, created_by, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&task.name)
		.bind(&task.url)
		.bind(&task.schedule)
		.bind(task.is_active)
		.bind(i64::from(task.timeout_seconds))
		.bind(created_by)
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		let id = TaskId(result.last_insert_rowid());
		self
			.get_task(id)
			.await?
			.ok_or(SchedulerError::TaskNotFound(id))
	}

	#[instrument(skip(self), fields(task_id = %id))]
	async fn get_task(&self, id: TaskId) -> Result<Option<ScheduledTask>> {
		let row = sqlx::query_as::<_, TaskRow>(&format!(
			"SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?"
		))
		.bind(id.0)
		.fetch_optional(&self.pool)
		.await?;

		row.map(ScheduledTask::try_from).transpose()
	}

	#[instrument(skip(self))]
	async fn list_tasks(&self, page: PageRequest) -> Result<Page<ScheduledTask>> {
		let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scheduled_tasks")
			.fetch_one(&self.pool)
			.await?;

		let rows = sqlx::query_as::<_, TaskRow>(&format!(
			"SELECT {TASK_COLUMNS} FROM scheduled_tasks ORDER BY name, id LIMIT ? OFFSET ?"
		))
		.bind(page.limit())
		.bind(page.offset())
		.fetch_all(&self.pool)
		.await?;

		let items = rows
			.into_iter()
			.map(ScheduledTask::try_from)
			.collect::<Result<Vec<_>>>()?;
		Ok(Page::new(items, total.max(0) as u64, page))
	}

	#[instrument(skip(self))]
	async fn list_active_tasks(&self) -> Result<Vec<ScheduledTask>> {
		let rows = sqlx::query_as::<_, TaskRow>(&format!(
			"SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE is_active = 1 ORDER BY id"
		))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(ScheduledTask::try_from).collect()
	}

	#[instrument(skip(self, task), fields(task_id = %id))]
	async fn update_task(&self, id: TaskId, task: &ValidatedTask) -> Result<Option<ScheduledTask>> {
		let result = sqlx::query(
			r#"
			UPDATE scheduled_tasks
			SET name = ?, url = ?, schedule = ?, is_active = ?, timeout_seconds = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&task.name)
		.bind(&task.url)
		.bind(&task.schedule)
		.bind(task.is_active)
		.bind(i64::from(task.timeout_seconds))
		.bind(format_timestamp(Utc::now()))
		.bind(id.0)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Ok(None);
		}
		self.get_task(id).await
	}

	#[instrument(skip(self), fields(task_id = %id))]
	async fn set_active(&self, id: TaskId, is_active: bool) -> Result<Option<ScheduledTask>> {
		let result =
			sqlx::query("UPDATE scheduled_tasks SET is_active = ?, updated_at = ? WHERE id = ?")
				.bind(is_active)
				.bind(format_timestamp(Utc::now()))
				.bind(id.0)
				.execute(&self.pool)
				.await?;

		if result.rows_affected() == 0 {
			return Ok(None);
		}
		self.get_task(id).await
	}

	#[instrument(skip(self, task), fields(task_id = %task.id))]
	async fn restore_task(&self, task: &ScheduledTask) -> Result<()> {
		sqlx::query(
			r#"
			UPDATE scheduled_tasks
			SET name = ?, url = ?, schedule = ?, is_active = ?, timeout_seconds = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&task.name)
		.bind(&task.url)
		.bind(&task.schedule)
		.bind(task.is_active)
		.bind(i64::from(task.timeout_seconds))
		.bind(format_timestamp(task.updated_at))
		.bind(task.id.0)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self), fields(task_id = %id))]
	async fn delete_task(&self, id: TaskId) -> Result<bool> {
		let mut tx = self.pool.begin().await?;

		sqlx::query("DELETE FROM scheduled_task_runs WHERE task_id = ?")
			.bind(id.0)
			.execute(&mut *tx)
			.await?;
		let result = sqlx::query("DELETE FROM scheduled_tasks WHERE id = ?")
			.bind(id.0)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;
		Ok(result.rows_affected() > 0)
	}

	#[instrument(skip(self, run), fields(task_id = %run.task_id, status = %run.status))]
	async fn record_run(&self, run: &NewTaskRun) -> Result<ScheduledTaskRun> {
		let result = sqlx::query(
			r#"
			INSERT INTO scheduled_task_runs (task_id, status, status_code, duration_ms, error_message, triggered_by, started_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(run.task_id.0)
		.bind(run.status.as_str())
		.bind(run.status_code.map(i64::from))
		.bind(run.duration_ms)
		.bind(&run.error_message)
		.bind(run.triggered_by.as_str())
		.bind(format_timestamp(run.started_at))
		.execute(&self.pool)
		.await?;

		Ok(ScheduledTaskRun {
			id: result.last_insert_rowid(),
			task_id: run.task_id,
			status: run.status,
			status_code: run.status_code,
			duration_ms: run.duration_ms,
			error_message: run.error_message.clone(),
			triggered_by: run.triggered_by,
			started_at: run.started_at,
		})
	}

	#[instrument(skip(self), fields(task_id = %task_id))]
	async fn list_runs(
		&self,
		task_id: TaskId,
		page: PageRequest,
	) -> Result<Page<ScheduledTaskRun>> {
		let (total,): (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM scheduled_task_runs WHERE task_id = ?")
				.bind(task_id.0)
				.fetch_one(&self.pool)
				.await?;

		let rows = sqlx::query_as::<_, RunRow>(&format!(
			"SELECT {RUN_COLUMNS} FROM scheduled_task_runs WHERE task_id = ? ORDER BY started_at DESC, id DESC LIMIT ? OFFSET ?"
		))
		.bind(task_id.0)
		.bind(page.limit())
		.bind(page.offset())
		.fetch_all(&self.pool)
		.await?;

		let items = rows
			.into_iter()
			.map(ScheduledTaskRun::try_from)
			.collect::<Result<Vec<_>>>()?;
		Ok(Page::new(items, total.max(0) as u64, page))
	}

	#[instrument(skip(self))]
	async fn delete_runs_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM scheduled_task_runs WHERE started_at < ?")
			.bind(format_timestamp(cutoff))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[derive(sqlx::FromRow)]
struct TaskRow {
	id: i64,
	name: String,
	url: String,
	schedule: String,
	is_active: bool,
	timeout_seconds: i64,
	created_by: Option<String>,
	created_at: String,
	updated_at: String,
}

impl TryFrom<TaskRow> for ScheduledTask {
	type Error = SchedulerError;

	fn try_from(row: TaskRow) -> Result<Self> {
		Ok(ScheduledTask {
			id: TaskId(row.id),
			name: row.name,
			url: row.url,
			schedule: row.schedule,
			is_active: row.is_active,
			timeout_seconds: clamp_timeout(u32::try_from(row.timeout_seconds).ok()),
			created_by: row.created_by,
			created_at: parse_timestamp(&row.created_at, "created_at")?,
			updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
		})
	}
}

#[derive(sqlx::FromRow)]
struct RunRow {
	id: i64,
	task_id: i64,
	status: String,
	status_code: Option<i64>,
	duration_ms: Option<i64>,
	error_message: Option<String>,
	triggered_by: String,
	started_at: String,
}

impl TryFrom<RunRow> for ScheduledTaskRun {
	type Error = SchedulerError;

	fn try_from(row: RunRow) -> Result<Self> {
		Ok(ScheduledTaskRun {
			id: row.id,
			task_id: TaskId(row.task_id),
			status: row.status.parse().map_err(SchedulerError::Internal)?,
			status_code: row.status_code.and_then(|c| u16::try_from(c).ok()),
			duration_ms: row.duration_ms,
			error_message: row.error_message,
			triggered_by: row.triggered_by.parse().map_err(SchedulerError::Internal)?,
			started_at: parse_timestamp(&row.started_at, "started_at")?,
		})
	}
}
