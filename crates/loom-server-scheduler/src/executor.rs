// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runs scheduled tasks as HTTP pings and records every outcome.
//!
//! Each active task is registered with the [`JobRegistry`] under the `task`
//! source as `task_<id>`. Scheduled fires and manual triggers run the same
//! job. The URL is vetted again right before every request and the HTTP client
//! is pinned to the vetted addresses, so a DNS answer that changed since the
//! task was saved cannot redirect the request to an internal host.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use loom_scheduler_core::{
	NewTaskRun, RunStatus, Schedule, ScheduledTask, ScheduledTaskRun, SchedulerCoreError, TaskId,
	TriggerSource, UrlGuard, VettedUrl, TASK_SOURCE,
};
use tracing::{error, info, instrument, warn};

use crate::error::{JobError, Result, SchedulerError};
use crate::job::{Job, JobContext, JobOutput};
use crate::registry::{JobRegistration, JobRegistry};
use crate::repository::TaskRepository;

/// Shared state for every task job: storage, URL guard and in-flight tracking.
pub struct TaskRunner {
	tasks: Arc<dyn TaskRepository>,
	guard: UrlGuard,
	user_agent: String,
	in_flight: Mutex<HashSet<TaskId>>,
}

struct PingOutcome {
	status: RunStatus,
	status_code: Option<u16>,
	error_message: Option<String>,
}

impl PingOutcome {
	fn error(status: RunStatus, message: impl Into<String>) -> Self {
		Self {
			status,
			status_code: None,
			error_message: Some(message.into()),
		}
	}
}

struct InFlight<'a> {
	runner: &'a TaskRunner,
	id: TaskId,
}

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self
			.runner
			.in_flight
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.remove(&self.id);
	}
}

impl TaskRunner {
	pub fn new(tasks: Arc<dyn TaskRepository>, guard: UrlGuard, user_agent: impl Into<String>) -> Self {
		Self {
			tasks,
			guard,
			user_agent: user_agent.into(),
			in_flight: Mutex::new(HashSet::new()),
		}
	}

	pub fn is_running(&self, id: TaskId) -> bool {
		self
			.in_flight
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.contains(&id)
	}

	fn begin(&self, id: TaskId) -> Option<InFlight<'_>> {
		let inserted = self
			.in_flight
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.insert(id);
		inserted.then_some(InFlight { runner: self, id })
	}

	/// Ping the task's URL once and append the outcome to its run history.
	///
	/// Fails with [`JobError::AlreadyRunning`] while another run of the same task is in flight.
	#[instrument(skip(self, task), fields(task_id = %task.id, triggered_by = %triggered_by))]
	pub async fn execute(
		&self,
		task: &ScheduledTask,
		triggered_by: TriggerSource,
	) -> std::result::Result<ScheduledTaskRun, JobError> {
		let _in_flight = self.begin(task.id).ok_or(JobError::AlreadyRunning)?;

		let started_at = Utc::now();
		let clock = Instant::now();
		let outcome = self.ping(task).await;
		let duration_ms = i64::try_from(clock.elapsed().as_millis()).unwrap_or(i64::MAX);

		let run = NewTaskRun {
			task_id: task.id,
			status: outcome.status,
			status_code: outcome.status_code,
			duration_ms: Some(duration_ms),
			error_message: outcome.error_message,
			triggered_by,
			started_at,
		};

		let recorded = self.tasks.record_run(&run).await.map_err(|e| {
			error!(error = %e, status = %run.status, "Failed to record task run");
			JobError::Failed(format!("could not record run: {e}"))
		})?;

		if recorded.status.is_success() {
			info!(
				status_code = ?recorded.status_code,
				duration_ms,
				"Task ping succeeded"
			);
		} else {
			warn!(
				status = %recorded.status,
				status_code = ?recorded.status_code,
				duration_ms,
				error = recorded.error_message.as_deref().unwrap_or_default(),
				"Task ping did not succeed"
			);
		}

		Ok(recorded)
	}

	/// Vet the URL and send the request, both under the task's deadline.
	async fn ping(&self, task: &ScheduledTask) -> PingOutcome {
		let timeout = task.timeout();
		match tokio::time::timeout(timeout, self.attempt(task, timeout)).await {
			Ok(outcome) => outcome,
			Err(_) => PingOutcome::error(
				RunStatus::Timeout,
				format!("no response within {}s", timeout.as_secs()),
			),
		}
	}

	async fn attempt(&self, task: &ScheduledTask, timeout: Duration) -> PingOutcome {
		let vetted = match self.guard.vet(&task.url).await {
			Ok(vetted) => vetted,
			Err(e @ SchedulerCoreError::ResolveFailed { .. }) => {
				return PingOutcome::error(RunStatus::Error, e.to_string());
			}
			Err(e) => return PingOutcome::error(RunStatus::Blocked, e.to_string()),
		};

		let client = match self.build_client(&vetted, timeout) {
			Ok(client) => client,
			Err(e) => {
				return PingOutcome::error(RunStatus::Error, format!("could not build HTTP client: {e}"))
			}
		};

		// The response body is never read; only the status line matters.
		match client.get(vetted.url.clone()).send().await {
			Err(e) if e.is_timeout() => PingOutcome::error(
				RunStatus::Timeout,
				format!("no response within {}s", timeout.as_secs()),
			),
			Err(e) => PingOutcome::error(RunStatus::Error, e.to_string()),
			Ok(response) => {
				let code = response.status();
				if code.is_success() {
					PingOutcome {
						status: RunStatus::Success,
						status_code: Some(code.as_u16()),
						error_message: None,
					}
				} else {
					PingOutcome {
						status: RunStatus::Failed,
						status_code: Some(code.as_u16()),
						error_message: Some(format!("HTTP {code}")),
					}
				}
			}
		}
	}

	fn build_client(
		&self,
		vetted: &VettedUrl,
		timeout: Duration,
	) -> std::result::Result<reqwest::Client, reqwest::Error> {
		let mut builder = reqwest::Client::builder()
			.user_agent(self.user_agent.as_str())
			.redirect(reqwest::redirect::Policy::none())
			.no_proxy()
			.connect_timeout(timeout)
			.timeout(timeout);
		if vetted.is_domain() {
			builder = builder.resolve_to_addrs(&vetted.host, &vetted.addrs);
		}
		builder.build()
	}
}

/// Registry job for one scheduled task.
pub struct TaskPingJob {
	id: String,
	description: String,
	task: ScheduledTask,
	runner: Arc<TaskRunner>,
}

impl TaskPingJob {
	pub fn new(task: ScheduledTask, runner: Arc<TaskRunner>) -> Self {
		Self {
			id: task.job_name(),
			description: format!("{}: GET {}", task.name, task.url),
			task,
			runner,
		}
	}
}

#[async_trait]
impl Job for TaskPingJob {
	fn id(&self) -> &str {
		&self.id
	}

	fn name(&self) -> &str {
		&self.task.name
	}

	fn description(&self) -> &str {
		&self.description
	}

	async fn run(&self, ctx: &JobContext) -> std::result::Result<JobOutput, JobError> {
		let run = self.runner.execute(&self.task, ctx.triggered_by).await?;

		let message = match (run.status, run.status_code) {
			(RunStatus::Success, Some(code)) | (RunStatus::Failed, Some(code)) => {
				format!("{} (HTTP {code})", run.status)
			}
			(status, _) => match &run.error_message {
				Some(error) => format!("{status}: {error}"),
				None => status.to_string(),
			},
		};

		Ok(JobOutput {
			message,
			metadata: Some(serde_json::json!({
				"run_id": run.id,
				"task_id": run.task_id,
				"status": run.status,
				"status_code": run.status_code,
				"duration_ms": run.duration_ms,
				"error_message": run.error_message,
			})),
		})
	}
}

/// Bridges task rows to live registry entries.
pub struct TaskExecutor {
	registry: Arc<JobRegistry>,
	runner: Arc<TaskRunner>,
}

impl TaskExecutor {
	pub fn new(
		registry: Arc<JobRegistry>,
		tasks: Arc<dyn TaskRepository>,
		guard: UrlGuard,
		user_agent: impl Into<String>,
	) -> Self {
		Self {
			registry,
			runner: Arc::new(TaskRunner::new(tasks, guard, user_agent)),
		}
	}

	pub fn registry(&self) -> &Arc<JobRegistry> {
		&self.registry
	}

	/// Put a task on its schedule. An existing entry for the same task is replaced.
	#[instrument(skip(self, task), fields(task_id = %task.id, schedule = %task.schedule))]
	pub async fn add_task(&self, task: &ScheduledTask) -> Result<()> {
		let schedule = Schedule::parse(&task.schedule)?;
		self.runner.guard.parse(&task.url)?;

		let job = Arc::new(TaskPingJob::new(task.clone(), Arc::clone(&self.runner)));
		self
			.registry
			.register(JobRegistration::new(TASK_SOURCE, schedule, job).triggerable())
			.await;
		Ok(())
	}

	/// Take a task off the timer. The row and its run history are untouched.
	#[instrument(skip(self))]
	pub async fn remove_task(&self, id: TaskId) -> bool {
		self.registry.unregister(TASK_SOURCE, &id.job_name()).await
	}

	/// Apply an edited row: inactive tasks are unscheduled, active ones are replaced in place.
	#[instrument(skip(self, task), fields(task_id = %task.id))]
	pub async fn reschedule_task(&self, task: &ScheduledTask) -> Result<()> {
		if !task.is_active {
			self.remove_task(task.id).await;
			return Ok(());
		}
		self.add_task(task).await
	}

	/// Run a scheduled task now and wait for the outcome.
	#[instrument(skip(self))]
	pub async fn trigger_task(&self, id: TaskId) -> Result<JobOutput> {
		match self.registry.trigger_now(TASK_SOURCE, &id.job_name()).await {
			Err(SchedulerError::JobNotFound(_)) => Err(SchedulerError::TaskNotScheduled(id)),
			other => other,
		}
	}

	pub async fn is_scheduled(&self, id: TaskId) -> bool {
		self.registry.contains(TASK_SOURCE, &id.job_name()).await
	}

	pub fn is_running(&self, id: TaskId) -> bool {
		self.runner.is_running(id)
	}
}
