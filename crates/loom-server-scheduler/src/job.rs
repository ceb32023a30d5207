// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use loom_scheduler_core::TriggerSource;

use crate::error::JobError;

/// Per-run information handed to a [`Job`].
#[derive(Debug, Clone)]
pub struct JobContext {
	pub run_id: String,
	pub triggered_by: TriggerSource,
}

impl JobContext {
	pub fn new(triggered_by: TriggerSource) -> Self {
		Self {
			run_id: uuid::Uuid::new_v4().to_string(),
			triggered_by,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
	pub message: String,
	pub metadata: Option<serde_json::Value>,
}

impl JobOutput {
	pub fn message(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			metadata: None,
		}
	}
}

/// A unit of work the registry can schedule or trigger.
///
/// `id` is the registry name and must be unique within its source.
#[async_trait]
pub trait Job: Send + Sync {
	fn id(&self) -> &str;
	fn name(&self) -> &str;
	fn description(&self) -> &str;
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError>;
}
