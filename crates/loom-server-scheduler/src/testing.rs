// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test helpers.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// In-memory database with the full schema applied.
///
/// Limited to one connection so every query sees the same database.
pub async fn create_test_pool() -> SqlitePool {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect("sqlite::memory:")
		.await
		.unwrap();
	crate::db::run_migrations(&pool).await.unwrap();
	pool
}
