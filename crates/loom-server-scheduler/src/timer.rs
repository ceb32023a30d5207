// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Timer engine driving scheduled jobs.
//!
//! Each entry owns a tokio task that sleeps until the schedule's next fire
//! time and then dispatches the job on a task of its own, so a slow run never
//! delays the next fire of the same entry or any other entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use loom_scheduler_core::{Schedule, TriggerSource};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::JobError;
use crate::job::{Job, JobContext};

/// Handle to a live timer entry.
pub type EntryId = u64;

/// Fire-time bookkeeping for one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryTimes {
	/// Last time the entry fired.
	pub prev: Option<DateTime<Utc>>,
	/// Next time the entry will fire; `None` once the schedule is exhausted.
	pub next: Option<DateTime<Utc>>,
}

struct Entry {
	handle: JoinHandle<()>,
	times: watch::Receiver<EntryTimes>,
}

pub struct Timer {
	entries: Mutex<HashMap<EntryId, Entry>>,
	next_id: AtomicU64,
	shutdown_tx: broadcast::Sender<()>,
}

impl Timer {
	pub fn new() -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			entries: Mutex::new(HashMap::new()),
			next_id: AtomicU64::new(1),
			shutdown_tx,
		}
	}

	/// Start firing `job` on `schedule`.
	#[instrument(skip(self, schedule, job), fields(job_id = job.id(), schedule = %schedule))]
	pub async fn add(&self, schedule: Schedule, job: Arc<dyn Job>) -> EntryId {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (times_tx, times_rx) = watch::channel(EntryTimes {
			prev: None,
			next: schedule.next_after(Utc::now()),
		});
		let shutdown_rx = self.shutdown_tx.subscribe();
		let handle = tokio::spawn(run_entry(schedule, job, times_tx, shutdown_rx));

		self.entries.lock().await.insert(
			id,
			Entry {
				handle,
				times: times_rx,
			},
		);
		debug!(entry_id = id, "timer entry added");
		id
	}

	/// Stop an entry. Runs already dispatched are left to finish.
	#[instrument(skip(self))]
	pub async fn remove(&self, id: EntryId) -> bool {
		match self.entries.lock().await.remove(&id) {
			Some(entry) => {
				entry.handle.abort();
				debug!("timer entry removed");
				true
			}
			None => false,
		}
	}

	pub async fn entry_times(&self, id: EntryId) -> Option<EntryTimes> {
		self
			.entries
			.lock()
			.await
			.get(&id)
			.map(|entry| *entry.times.borrow())
	}

	pub async fn len(&self) -> usize {
		self.entries.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.lock().await.is_empty()
	}

	/// Stop every entry and wait for the entry loops to exit.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut entries = self.entries.lock().await;
		for (_, entry) in entries.drain() {
			let _ = entry.handle.await;
		}

		info!("Timer shut down");
	}
}

impl Default for Timer {
	fn default() -> Self {
		Self::new()
	}
}

async fn run_entry(
	schedule: Schedule,
	job: Arc<dyn Job>,
	times_tx: watch::Sender<EntryTimes>,
	mut shutdown_rx: broadcast::Receiver<()>,
) {
	let mut cursor = Utc::now();
	loop {
		let Some(next) = schedule.next_after(cursor) else {
			times_tx.send_modify(|t| t.next = None);
			info!(job_id = job.id(), schedule = %schedule, "Schedule has no further fire times");
			return;
		};
		times_tx.send_modify(|t| t.next = Some(next));

		let wait = (next - Utc::now()).to_std().unwrap_or_default();
		tokio::select! {
			_ = tokio::time::sleep(wait) => {
				times_tx.send_modify(|t| t.prev = Some(next));
				tokio::spawn(dispatch(Arc::clone(&job)));

				// Fire times missed while the process was suspended are skipped, not replayed.
				let now = Utc::now();
				cursor = if now - next > chrono::Duration::seconds(1) { now } else { next };
			}
			_ = shutdown_rx.recv() => {
				debug!(job_id = job.id(), "Timer entry stopping");
				return;
			}
		}
	}
}

async fn dispatch(job: Arc<dyn Job>) {
	let ctx = JobContext::new(TriggerSource::Schedule);
	match job.run(&ctx).await {
		Ok(output) => {
			info!(
				job_id = job.id(),
				run_id = %ctx.run_id,
				message = %output.message,
				"Scheduled job completed"
			);
		}
		Err(JobError::AlreadyRunning) => {
			info!(
				job_id = job.id(),
				run_id = %ctx.run_id,
				"Previous run still in flight, skipping"
			);
		}
		Err(e) => {
			warn!(job_id = job.id(), run_id = %ctx.run_id, error = %e, "Scheduled job failed");
		}
	}
}
