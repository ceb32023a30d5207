// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The job registry: one catalogue of every scheduled job, built-in or task.
//!
//! Every mutation and every read goes through a single lock. Schedule swaps
//! hold the lock from the override write until the new timer entry is in
//! place, so the persisted and live schedules never disagree and a job is
//! never left with zero or two timer entries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use loom_scheduler_core::{JobDescriptor, Schedule, TriggerSource, TASK_SOURCE};
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::error::{job_key, JobError, Result, SchedulerError};
use crate::job::{Job, JobContext, JobOutput};
use crate::repository::ScheduleOverrideStore;
use crate::timer::{EntryId, Timer};

/// Everything needed to put a job on the timer.
pub struct JobRegistration {
	pub source: String,
	pub default_schedule: Schedule,
	pub job: Arc<dyn Job>,
	/// Run for manual "run now" requests. `None` disables manual triggering.
	pub trigger: Option<Arc<dyn Job>>,
}

impl JobRegistration {
	pub fn new(source: impl Into<String>, default_schedule: Schedule, job: Arc<dyn Job>) -> Self {
		Self {
			source: source.into(),
			default_schedule,
			job,
			trigger: None,
		}
	}

	/// Allow manual triggering by running the scheduled job itself.
	pub fn triggerable(mut self) -> Self {
		self.trigger = Some(Arc::clone(&self.job));
		self
	}

	pub fn with_trigger(mut self, trigger: Arc<dyn Job>) -> Self {
		self.trigger = Some(trigger);
		self
	}
}

struct RegisteredJob {
	job: Arc<dyn Job>,
	trigger: Option<Arc<dyn Job>>,
	default_schedule: Schedule,
	schedule: Schedule,
	is_overridden: bool,
	entry_id: EntryId,
	last_manual_run: Option<DateTime<Utc>>,
}

type JobKey = (String, String);

pub struct JobRegistry {
	jobs: Mutex<HashMap<JobKey, RegisteredJob>>,
	timer: Timer,
	overrides: Arc<dyn ScheduleOverrideStore>,
}

impl JobRegistry {
	pub fn new(overrides: Arc<dyn ScheduleOverrideStore>) -> Self {
		Self {
			jobs: Mutex::new(HashMap::new()),
			timer: Timer::new(),
			overrides,
		}
	}

	/// Install a job on its default schedule. Re-registering a source and name replaces the old entry.
	#[instrument(skip(self, registration), fields(source = %registration.source, name = registration.job.id()))]
	pub async fn register(&self, registration: JobRegistration) {
		let JobRegistration {
			source,
			default_schedule,
			job,
			trigger,
		} = registration;
		let key = (source, job.id().to_string());

		let mut jobs = self.jobs.lock().await;
		if let Some(previous) = jobs.remove(&key) {
			self.timer.remove(previous.entry_id).await;
			info!("Replacing existing registration");
		}

		let entry_id = self
			.timer
			.add(default_schedule.clone(), Arc::clone(&job))
			.await;
		info!(schedule = %default_schedule, can_trigger = trigger.is_some(), "Job registered");

		jobs.insert(
			key,
			RegisteredJob {
				job,
				trigger,
				schedule: default_schedule.clone(),
				default_schedule,
				is_overridden: false,
				entry_id,
				last_manual_run: None,
			},
		);
	}

	/// Stop and forget a job. Returns `false` if it was not registered.
	#[instrument(skip(self))]
	pub async fn unregister(&self, source: &str, name: &str) -> bool {
		let mut jobs = self.jobs.lock().await;
		match jobs.remove(&(source.to_string(), name.to_string())) {
			Some(entry) => {
				self.timer.remove(entry.entry_id).await;
				info!("Job unregistered");
				true
			}
			None => false,
		}
	}

	pub async fn contains(&self, source: &str, name: &str) -> bool {
		self
			.jobs
			.lock()
			.await
			.contains_key(&(source.to_string(), name.to_string()))
	}

	/// Snapshot of every job, ordered by source then name, with fire times read from the timer.
	pub async fn list(&self) -> Vec<JobDescriptor> {
		let jobs = self.jobs.lock().await;
		let mut descriptors = Vec::with_capacity(jobs.len());
		for ((source, name), entry) in jobs.iter() {
			descriptors.push(self.describe(source, name, entry).await);
		}
		descriptors.sort_by(|a, b| (&a.source, &a.name).cmp(&(&b.source, &b.name)));
		descriptors
	}

	pub async fn get(&self, source: &str, name: &str) -> Option<JobDescriptor> {
		let jobs = self.jobs.lock().await;
		let entry = jobs.get(&(source.to_string(), name.to_string()))?;
		Some(self.describe(source, name, entry).await)
	}

	/// Replace a built-in job's schedule and persist the override.
	#[instrument(skip(self))]
	pub async fn update_schedule(&self, source: &str, name: &str, expression: &str) -> Result<()> {
		let schedule = Schedule::parse(expression)?;
		if source == TASK_SOURCE {
			return Err(SchedulerError::OverrideNotAllowed(job_key(source, name)));
		}

		let mut jobs = self.jobs.lock().await;
		let entry = jobs
			.get_mut(&(source.to_string(), name.to_string()))
			.ok_or_else(|| SchedulerError::JobNotFound(job_key(source, name)))?;

		self
			.overrides
			.upsert_override(source, name, schedule.expression())
			.await?;
		self.swap_schedule(entry, schedule).await;
		entry.is_overridden = true;

		info!(schedule = %entry.schedule, "Job schedule overridden");
		Ok(())
	}

	/// Return a built-in job to its default schedule and drop the persisted override.
	#[instrument(skip(self))]
	pub async fn reset_schedule(&self, source: &str, name: &str) -> Result<()> {
		if source == TASK_SOURCE {
			return Err(SchedulerError::OverrideNotAllowed(job_key(source, name)));
		}

		let mut jobs = self.jobs.lock().await;
		let entry = jobs
			.get_mut(&(source.to_string(), name.to_string()))
			.ok_or_else(|| SchedulerError::JobNotFound(job_key(source, name)))?;

		self.overrides.delete_override(source, name).await?;
		let default_schedule = entry.default_schedule.clone();
		self.swap_schedule(entry, default_schedule).await;
		entry.is_overridden = false;

		info!(schedule = %entry.schedule, "Job schedule reset to default");
		Ok(())
	}

	/// Run a job's trigger now and wait for it to finish.
	///
	/// The registry lock is released while the job runs.
	#[instrument(skip(self))]
	pub async fn trigger_now(&self, source: &str, name: &str) -> Result<JobOutput> {
		let key = (source.to_string(), name.to_string());
		let trigger = {
			let jobs = self.jobs.lock().await;
			let entry = jobs
				.get(&key)
				.ok_or_else(|| SchedulerError::JobNotFound(job_key(source, name)))?;
			entry
				.trigger
				.clone()
				.ok_or_else(|| SchedulerError::NoTriggerJob(job_key(source, name)))?
		};

		let ctx = JobContext::new(TriggerSource::Manual);
		let started_at = Utc::now();
		info!(run_id = %ctx.run_id, "Manually triggering job");
		let result = trigger.run(&ctx).await;

		if !matches!(result, Err(JobError::AlreadyRunning)) {
			if let Some(entry) = self.jobs.lock().await.get_mut(&key) {
				entry.last_manual_run = Some(started_at);
			}
		}

		result.map_err(|e| match e {
			JobError::AlreadyRunning => SchedulerError::AlreadyRunning(job_key(source, name)),
			other => SchedulerError::Job {
				key: job_key(source, name),
				source: other,
			},
		})
	}

	/// Stop every timer entry.
	pub async fn shutdown(&self) {
		self.timer.shutdown().await;
	}

	async fn swap_schedule(&self, entry: &mut RegisteredJob, schedule: Schedule) {
		self.timer.remove(entry.entry_id).await;
		entry.entry_id = self
			.timer
			.add(schedule.clone(), Arc::clone(&entry.job))
			.await;
		entry.schedule = schedule;
	}

	async fn describe(&self, source: &str, name: &str, entry: &RegisteredJob) -> JobDescriptor {
		let times = self.timer.entry_times(entry.entry_id).await.unwrap_or_default();
		JobDescriptor {
			source: source.to_string(),
			name: name.to_string(),
			description: entry.job.description().to_string(),
			default_schedule: entry.default_schedule.expression().to_string(),
			schedule: entry.schedule.expression().to_string(),
			is_overridden: entry.is_overridden,
			last_run: times.prev.max(entry.last_manual_run),
			next_run: times.next,
			can_trigger: entry.trigger.is_some(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::repository::SqliteOverrideRepository;
	use crate::testing::create_test_pool;
	use async_trait::async_trait;
	use loom_scheduler_core::{ScheduleOverride, CORE_SOURCE};
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct CountingJob {
		id: String,
		runs: AtomicUsize,
	}

	impl CountingJob {
		fn new(id: &str) -> Arc<Self> {
			Arc::new(Self {
				id: id.to_string(),
				runs: AtomicUsize::new(0),
			})
		}

		fn runs(&self) -> usize {
			self.runs.load(Ordering::SeqCst)
		}
	}

	#[async_trait]
	impl Job for CountingJob {
		fn id(&self) -> &str {
			&self.id
		}

		fn name(&self) -> &str {
			"Counting job"
		}

		fn description(&self) -> &str {
			"Counts its runs"
		}

		async fn run(&self, _ctx: &JobContext) -> std::result::Result<JobOutput, JobError> {
			self.runs.fetch_add(1, Ordering::SeqCst);
			Ok(JobOutput::message("done"))
		}
	}

	struct FailingStore;

	#[async_trait]
	impl ScheduleOverrideStore for FailingStore {
		async fn upsert_override(&self, _: &str, _: &str, _: &str) -> Result<()> {
			Err(SchedulerError::Internal("disk full".to_string()))
		}

		async fn delete_override(&self, _: &str, _: &str) -> Result<bool> {
			Err(SchedulerError::Internal("disk full".to_string()))
		}

		async fn list_overrides(&self) -> Result<Vec<ScheduleOverride>> {
			Ok(vec![])
		}
	}

	async fn make_registry() -> (JobRegistry, Arc<SqliteOverrideRepository>) {
		let store = Arc::new(SqliteOverrideRepository::new(create_test_pool().await));
		(JobRegistry::new(store.clone()), store)
	}

	fn hourly(job: Arc<dyn Job>) -> JobRegistration {
		JobRegistration::new(CORE_SOURCE, Schedule::parse("every 1h").unwrap(), job)
	}

	#[tokio::test]
	async fn test_register_and_list() {
		let (registry, _) = make_registry().await;
		registry.register(hourly(CountingJob::new("cleanup"))).await;
		registry
			.register(hourly(CountingJob::new("audit")).triggerable())
			.await;

		let jobs = registry.list().await;
		assert_eq!(jobs.len(), 2);
		assert_eq!(jobs[0].name, "audit");
		assert!(jobs[0].can_trigger);
		assert_eq!(jobs[1].name, "cleanup");
		assert!(!jobs[1].can_trigger);
		assert_eq!(jobs[1].schedule, "every 1h");
		assert_eq!(jobs[1].default_schedule, "every 1h");
		assert!(!jobs[1].is_overridden);
		assert!(jobs[1].last_run.is_none());
		assert!(jobs[1].next_run.unwrap() > Utc::now());
	}

	#[tokio::test]
	async fn test_duplicate_registration_last_write_wins() {
		let (registry, _) = make_registry().await;
		registry.register(hourly(CountingJob::new("cleanup"))).await;
		registry
			.register(
				JobRegistration::new(
					CORE_SOURCE,
					Schedule::parse("@daily").unwrap(),
					CountingJob::new("cleanup"),
				)
				.triggerable(),
			)
			.await;

		let jobs = registry.list().await;
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].schedule, "@daily");
		assert!(jobs[0].can_trigger);
		assert_eq!(registry.timer.len().await, 1);
	}

	#[tokio::test]
	async fn test_update_and_reset_schedule() {
		let (registry, store) = make_registry().await;
		registry.register(hourly(CountingJob::new("cleanup"))).await;

		registry
			.update_schedule(CORE_SOURCE, "cleanup", "every 30m")
			.await
			.unwrap();
		let job = registry.get(CORE_SOURCE, "cleanup").await.unwrap();
		assert_eq!(job.schedule, "every 30m");
		assert!(job.is_overridden);
		let overrides = store.list_overrides().await.unwrap();
		assert_eq!(overrides.len(), 1);
		assert_eq!(overrides[0].schedule, "every 30m");

		registry
			.reset_schedule(CORE_SOURCE, "cleanup")
			.await
			.unwrap();
		let job = registry.get(CORE_SOURCE, "cleanup").await.unwrap();
		assert_eq!(job.schedule, "every 1h");
		assert!(!job.is_overridden);
		assert!(store.list_overrides().await.unwrap().is_empty());
		assert_eq!(registry.timer.len().await, 1);
	}

	#[tokio::test]
	async fn test_update_unknown_job_leaves_others_untouched() {
		let (registry, store) = make_registry().await;
		registry.register(hourly(CountingJob::new("cleanup"))).await;

		let err = registry
			.update_schedule(CORE_SOURCE, "missing", "every 30m")
			.await
			.unwrap_err();
		assert!(matches!(err, SchedulerError::JobNotFound(_)));
		let err = registry
			.reset_schedule(CORE_SOURCE, "missing")
			.await
			.unwrap_err();
		assert!(matches!(err, SchedulerError::JobNotFound(_)));

		let job = registry.get(CORE_SOURCE, "cleanup").await.unwrap();
		assert_eq!(job.schedule, "every 1h");
		assert!(!job.is_overridden);
		assert!(store.list_overrides().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_update_rejects_invalid_schedule() {
		let (registry, store) = make_registry().await;
		registry.register(hourly(CountingJob::new("cleanup"))).await;

		for bad in ["", "invalid cron", "* * * *"] {
			let err = registry
				.update_schedule(CORE_SOURCE, "cleanup", bad)
				.await
				.unwrap_err();
			assert!(matches!(err, SchedulerError::Validation(_)), "{bad:?}");
		}

		let job = registry.get(CORE_SOURCE, "cleanup").await.unwrap();
		assert_eq!(job.schedule, "every 1h");
		assert!(store.list_overrides().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_failed_persist_keeps_previous_schedule() {
		let registry = JobRegistry::new(Arc::new(FailingStore));
		registry.register(hourly(CountingJob::new("cleanup"))).await;
		let before = registry.get(CORE_SOURCE, "cleanup").await.unwrap();

		assert!(registry
			.update_schedule(CORE_SOURCE, "cleanup", "every 30m")
			.await
			.is_err());

		let after = registry.get(CORE_SOURCE, "cleanup").await.unwrap();
		assert_eq!(after.schedule, "every 1h");
		assert!(!after.is_overridden);
		assert_eq!(after.next_run, before.next_run);
	}

	#[tokio::test]
	async fn test_task_source_cannot_be_overridden() {
		let (registry, _) = make_registry().await;
		registry
			.register(JobRegistration::new(
				TASK_SOURCE,
				Schedule::parse("@hourly").unwrap(),
				CountingJob::new("task_1"),
			))
			.await;

		assert!(matches!(
			registry
				.update_schedule(TASK_SOURCE, "task_1", "@daily")
				.await,
			Err(SchedulerError::OverrideNotAllowed(_))
		));
		assert!(matches!(
			registry.reset_schedule(TASK_SOURCE, "task_1").await,
			Err(SchedulerError::OverrideNotAllowed(_))
		));
	}

	#[tokio::test]
	async fn test_trigger_without_trigger_job_fails() {
		let (registry, _) = make_registry().await;
		let job = CountingJob::new("cleanup");
		registry.register(hourly(job.clone())).await;

		let err = registry
			.trigger_now(CORE_SOURCE, "cleanup")
			.await
			.unwrap_err();
		assert!(matches!(err, SchedulerError::NoTriggerJob(_)));
		assert_eq!(job.runs(), 0);
	}

	#[tokio::test]
	async fn test_trigger_runs_trigger_job_once() {
		let (registry, _) = make_registry().await;
		let scheduled = CountingJob::new("reindex");
		let trigger = CountingJob::new("reindex-now");
		registry
			.register(hourly(scheduled.clone()).with_trigger(trigger.clone()))
			.await;

		let output = registry.trigger_now(CORE_SOURCE, "reindex").await.unwrap();
		assert_eq!(output.message, "done");
		assert_eq!(trigger.runs(), 1);
		assert_eq!(scheduled.runs(), 0);

		let job = registry.get(CORE_SOURCE, "reindex").await.unwrap();
		assert!(job.last_run.is_some());
	}

	#[tokio::test]
	async fn test_trigger_unknown_job() {
		let (registry, _) = make_registry().await;
		assert!(matches!(
			registry.trigger_now(CORE_SOURCE, "nope").await,
			Err(SchedulerError::JobNotFound(_))
		));
	}

	#[tokio::test]
	async fn test_unregister() {
		let (registry, _) = make_registry().await;
		registry.register(hourly(CountingJob::new("cleanup"))).await;

		assert!(registry.unregister(CORE_SOURCE, "cleanup").await);
		assert!(!registry.unregister(CORE_SOURCE, "cleanup").await);
		assert!(registry.list().await.is_empty());
		assert!(registry.timer.is_empty().await);
	}

	#[tokio::test]
	async fn test_concurrent_updates_stay_consistent() {
		let (registry, store) = make_registry().await;
		let registry = Arc::new(registry);
		registry.register(hourly(CountingJob::new("cleanup"))).await;

		let mut handles = Vec::new();
		for minutes in [5, 10, 15, 20, 25] {
			let registry = Arc::clone(&registry);
			handles.push(tokio::spawn(async move {
				registry
					.update_schedule(CORE_SOURCE, "cleanup", &format!("every {minutes}m"))
					.await
			}));
		}
		for handle in handles {
			handle.await.unwrap().unwrap();
		}

		let job = registry.get(CORE_SOURCE, "cleanup").await.unwrap();
		let overrides = store.list_overrides().await.unwrap();
		assert_eq!(overrides.len(), 1);
		assert_eq!(overrides[0].schedule, job.schedule);
		assert_eq!(registry.timer.len().await, 1);
	}
}
