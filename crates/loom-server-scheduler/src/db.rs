// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite pool creation and schema migrations.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::error::{Result, SchedulerError};

const MIGRATIONS: &[(&str, &str)] = &[
	(
		"001_schedule_overrides",
		include_str!("../migrations/001_schedule_overrides.sql"),
	),
	(
		"002_scheduled_tasks",
		include_str!("../migrations/002_scheduled_tasks.sql"),
	),
];

/// Create a SqlitePool with WAL mode and foreign keys enforced.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| SchedulerError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.foreign_keys(true)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(max_connections.max(1))
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Apply every migration. Statements are idempotent, so this runs on each start.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for (name, sql) in MIGRATIONS {
		for stmt in sql.split(';').filter(|s| !strip_comments(s).is_empty()) {
			sqlx::query(stmt).execute(pool).await?;
		}
		tracing::debug!(migration = name, "migration applied");
	}
	Ok(())
}

fn strip_comments(stmt: &str) -> String {
	stmt
		.lines()
		.filter(|line| !line.trim_start().starts_with("--"))
		.collect::<Vec<_>>()
		.join("\n")
		.trim()
		.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_migrations_are_idempotent() {
		let pool = crate::testing::create_test_pool().await;
		run_migrations(&pool).await.unwrap();

		let tables: Vec<(String,)> =
			sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
				.fetch_all(&pool)
				.await
				.unwrap();
		let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
		assert!(names.contains(&"schedule_overrides".to_string()));
		assert!(names.contains(&"scheduled_tasks".to_string()));
		assert!(names.contains(&"scheduled_task_runs".to_string()));
	}

	#[tokio::test]
	async fn test_create_pool_rejects_bad_url() {
		let result = create_pool("sqlite:scheduler.db?mode=bogus", 1).await;
		assert!(matches!(result, Err(SchedulerError::Internal(_))));
	}

	#[tokio::test]
	async fn test_create_pool_unreachable_path_is_database_error() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!(
			"sqlite:{}",
			dir.path().join("missing").join("scheduler.db").display()
		);
		let result = create_pool(&url, 1).await;
		assert!(matches!(result, Err(SchedulerError::Database(_))));
	}

	#[tokio::test]
	async fn test_create_pool_file_database() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("scheduler.db").display());

		let pool = create_pool(&url, 2).await.unwrap();
		run_migrations(&pool).await.unwrap();
		assert!(dir.path().join("scheduler.db").exists());
		pool.close().await;
	}

	#[test]
	fn test_strip_comments() {
		assert_eq!(strip_comments("-- header\n\n"), "");
		assert_eq!(
			strip_comments("-- header\nCREATE TABLE t (id INTEGER)"),
			"CREATE TABLE t (id INTEGER)"
		);
	}
}
