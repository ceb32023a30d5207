// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scheduler configuration section.

use serde::{Deserialize, Serialize};

fn default_user_agent() -> String {
	format!("loom-scheduler/{}", env!("CARGO_PKG_VERSION"))
}

const DEFAULT_RETENTION_DAYS: u32 = 90;
const DEFAULT_CLEANUP_SCHEDULE: &str = "@daily";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfigLayer {
	pub run_history_retention_days: Option<u32>,
	pub run_history_cleanup_schedule: Option<String>,
	pub user_agent: Option<String>,
	pub allow_private_targets: Option<bool>,
}

impl SchedulerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.run_history_retention_days.is_some() {
			self.run_history_retention_days = other.run_history_retention_days;
		}
		if other.run_history_cleanup_schedule.is_some() {
			self.run_history_cleanup_schedule = other.run_history_cleanup_schedule;
		}
		if other.user_agent.is_some() {
			self.user_agent = other.user_agent;
		}
		if other.allow_private_targets.is_some() {
			self.allow_private_targets = other.allow_private_targets;
		}
	}

	pub fn finalize(self) -> SchedulerConfig {
		SchedulerConfig {
			run_history_retention_days: self
				.run_history_retention_days
				.unwrap_or(DEFAULT_RETENTION_DAYS),
			run_history_cleanup_schedule: self
				.run_history_cleanup_schedule
				.unwrap_or_else(|| DEFAULT_CLEANUP_SCHEDULE.to_string()),
			user_agent: self.user_agent.unwrap_or_else(default_user_agent),
			allow_private_targets: self.allow_private_targets.unwrap_or(false),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
	/// Task run rows older than this are removed by the cleanup job.
	pub run_history_retention_days: u32,
	/// Default schedule of the built-in run history cleanup job.
	pub run_history_cleanup_schedule: String,
	/// User-Agent sent with every task ping.
	pub user_agent: String,
	/// Let tasks call loopback and private addresses. Development only.
	pub allow_private_targets: bool,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		SchedulerConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = SchedulerConfig::default();
		assert_eq!(config.run_history_retention_days, 90);
		assert_eq!(config.run_history_cleanup_schedule, "@daily");
		assert!(config.user_agent.starts_with("loom-scheduler/"));
		assert!(!config.allow_private_targets);
	}

	#[test]
	fn test_layer_finalize_with_values() {
		let layer = SchedulerConfigLayer {
			run_history_retention_days: Some(14),
			run_history_cleanup_schedule: Some("0 3 * * *".to_string()),
			user_agent: Some("pinger/1.0".to_string()),
			allow_private_targets: Some(true),
		};
		let config = layer.finalize();
		assert_eq!(config.run_history_retention_days, 14);
		assert_eq!(config.run_history_cleanup_schedule, "0 3 * * *");
		assert_eq!(config.user_agent, "pinger/1.0");
		assert!(config.allow_private_targets);
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let toml_str = r#"
run_history_retention_days = 30
"#;
		let layer: SchedulerConfigLayer = toml::from_str(toml_str).unwrap();
		assert_eq!(layer.run_history_retention_days, Some(30));
		assert!(layer.run_history_cleanup_schedule.is_none());
		assert!(layer.allow_private_targets.is_none());
	}
}
