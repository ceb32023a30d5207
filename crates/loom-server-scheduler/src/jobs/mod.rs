// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Built-in jobs.

mod run_history_cleanup;

pub use run_history_cleanup::{RunHistoryCleanupJob, RUN_HISTORY_CLEANUP_JOB};
