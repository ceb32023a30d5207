// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::error::JobError;
use crate::job::{Job, JobContext, JobOutput};
use crate::repository::TaskRepository;

pub const RUN_HISTORY_CLEANUP_JOB: &str = "task_run_cleanup";

pub struct RunHistoryCleanupJob {
	tasks: Arc<dyn TaskRepository>,
	retention_days: u32,
}

impl RunHistoryCleanupJob {
	pub fn new(tasks: Arc<dyn TaskRepository>, retention_days: u32) -> Self {
		Self {
			tasks,
			retention_days,
		}
	}
}

#[async_trait]
impl Job for RunHistoryCleanupJob {
	fn id(&self) -> &str {
		RUN_HISTORY_CLEANUP_JOB
	}

	fn name(&self) -> &str {
		"Task Run History Cleanup"
	}

	fn description(&self) -> &str {
		"Removes scheduled task run records older than the retention period"
	}

	async fn run(&self, _ctx: &JobContext) -> Result<JobOutput, JobError> {
		let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));

		match self.tasks.delete_runs_before(cutoff).await {
			Ok(count) => {
				tracing::info!(
					deleted = count,
					retention_days = self.retention_days,
					"Task run history cleanup completed"
				);
				Ok(JobOutput {
					message: format!("Cleaned up {count} old task run records"),
					metadata: Some(serde_json::json!({
						"deleted_count": count,
						"retention_days": self.retention_days
					})),
				})
			}
			Err(e) => Err(JobError::Failed(format!(
				"Task run history cleanup failed: {e}"
			))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::repository::SqliteTaskRepository;
	use crate::testing::create_test_pool;
	use loom_scheduler_core::{NewTaskRun, RunStatus, TriggerSource, ValidatedTask};

	#[tokio::test]
	async fn test_removes_only_expired_runs() {
		let repo = Arc::new(SqliteTaskRepository::new(create_test_pool().await));
		let task = repo
			.create_task(
				&ValidatedTask {
					name: "Ping".to_string(),
					url: "https://example.com/".to_string(),
					schedule: "@daily".to_string(),
					is_active: true,
					timeout_seconds: 30,
				},
				None,
			)
			.await
			.unwrap();

		for age_days in [120, 45, 2] {
			repo.record_run(&NewTaskRun {
				task_id: task.id,
				status: RunStatus::Success,
				status_code: Some(200),
				duration_ms: Some(5),
				error_message: None,
				triggered_by: TriggerSource::Schedule,
				started_at: Utc::now() - Duration::days(age_days),
			})
			.await
			.unwrap();
		}

		let job = RunHistoryCleanupJob::new(repo.clone(), 30);
		let output = job
			.run(&JobContext::new(TriggerSource::Manual))
			.await
			.unwrap();

		assert_eq!(output.message, "Cleaned up 2 old task run records");
		assert_eq!(output.metadata.unwrap()["deleted_count"], 2);
	}
}
