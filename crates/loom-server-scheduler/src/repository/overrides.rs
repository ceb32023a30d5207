// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::Utc;
use loom_scheduler_core::ScheduleOverride;
use sqlx::SqlitePool;
use tracing::instrument;

use super::{format_timestamp, parse_timestamp};
use crate::error::Result;

/// Durable store of administrator schedule overrides for built-in jobs.
#[async_trait]
pub trait ScheduleOverrideStore: Send + Sync {
	async fn upsert_override(&self, source: &str, name: &str, schedule: &str) -> Result<()>;
	/// Returns `false` when no override existed.
	async fn delete_override(&self, source: &str, name: &str) -> Result<bool>;
	async fn list_overrides(&self) -> Result<Vec<ScheduleOverride>>;
}

#[derive(Clone)]
pub struct SqliteOverrideRepository {
	pool: SqlitePool,
}

impl SqliteOverrideRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl ScheduleOverrideStore for SqliteOverrideRepository {
	#[instrument(skip(self))]
	async fn upsert_override(&self, source: &str, name: &str, schedule: &str) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO schedule_overrides (source, name, schedule, updated_at)
			VALUES (?, ?, ?, ?)
			ON CONFLICT(source, name) DO UPDATE SET
				schedule = excluded.schedule,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(source)
		.bind(name)
		.bind(schedule)
		.bind(format_timestamp(Utc::now()))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self))]
	async fn delete_override(&self, source: &str, name: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM schedule_overrides WHERE source = ? AND name = ?")
			.bind(source)
			.bind(name)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[instrument(skip(self))]
	async fn list_overrides(&self) -> Result<Vec<ScheduleOverride>> {
		let rows = sqlx::query_as::<_, (String, String, String, String)>(
			"SELECT source, name, schedule, updated_at FROM schedule_overrides ORDER BY source, name",
		)
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|(source, name, schedule, updated_at)| {
				Ok(ScheduleOverride {
					source,
					name,
					schedule,
					updated_at: parse_timestamp(&updated_at, "updated_at")?,
				})
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	#[tokio::test]
	async fn test_upsert_and_list() {
		let repo = SqliteOverrideRepository::new(create_test_pool().await);

		repo.upsert_override("core", "cleanup", "every 30m")
			.await
			.unwrap();
		repo.upsert_override("core", "cleanup", "every 15m")
			.await
			.unwrap();
		repo.upsert_override("billing", "invoices", "@daily")
			.await
			.unwrap();

		let overrides = repo.list_overrides().await.unwrap();
		assert_eq!(overrides.len(), 2);
		assert_eq!(overrides[0].source, "billing");
		assert_eq!(overrides[1].name, "cleanup");
		assert_eq!(overrides[1].schedule, "every 15m");
	}

	#[tokio::test]
	async fn test_delete_override() {
		let repo = SqliteOverrideRepository::new(create_test_pool().await);

		repo.upsert_override("core", "cleanup", "every 30m")
			.await
			.unwrap();
		assert!(repo.delete_override("core", "cleanup").await.unwrap());
		assert!(!repo.delete_override("core", "cleanup").await.unwrap());
		assert!(repo.list_overrides().await.unwrap().is_empty());
	}
}
