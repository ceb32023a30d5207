// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{DatabaseConfigLayer, LoggingConfigLayer, SchedulerConfigLayer};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub scheduler: Option<SchedulerConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(
			&mut self.database,
			other.database,
			DatabaseConfigLayer::merge,
		);
		merge_option(
			&mut self.scheduler,
			other.scheduler,
			SchedulerConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_empty_layers() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer::default());
		assert!(base.database.is_none());
		assert!(base.scheduler.is_none());
	}

	#[test]
	fn test_merge_other_overwrites_field_by_field() {
		let mut base = ServerConfigLayer {
			scheduler: Some(SchedulerConfigLayer {
				run_history_retention_days: Some(30),
				user_agent: Some("base-agent".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		let other = ServerConfigLayer {
			scheduler: Some(SchedulerConfigLayer {
				run_history_retention_days: Some(7),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(other);

		let scheduler = base.scheduler.unwrap();
		assert_eq!(scheduler.run_history_retention_days, Some(7));
		assert_eq!(scheduler.user_agent.as_deref(), Some("base-agent"));
	}

	#[test]
	fn test_merge_adds_missing_sections() {
		let mut base = ServerConfigLayer::default();
		let other = ServerConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: Some("sqlite::memory:".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(other);
		assert_eq!(
			base.database.unwrap().url.as_deref(),
			Some("sqlite::memory:")
		);
	}
}
