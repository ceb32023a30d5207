// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration management for the Loom scheduler server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`LOOM_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use loom_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Database at {}", config.database.url);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info, warn};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub scheduler: SchedulerConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`LOOM_SERVER_*`)
/// 2. Config file (`/etc/loom/scheduler.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let scheduler = layer.scheduler.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&scheduler)?;

	if scheduler.allow_private_targets {
		warn!("scheduler.allow_private_targets is enabled; tasks may call internal addresses");
	}

	info!(
		database = %database.url,
		retention_days = scheduler.run_history_retention_days,
		cleanup_schedule = %scheduler.run_history_cleanup_schedule,
		log_format = ?logging.format,
		"Scheduler configuration loaded"
	);

	Ok(ServerConfig {
		database,
		scheduler,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(scheduler: &SchedulerConfig) -> Result<(), ConfigError> {
	if scheduler.run_history_retention_days == 0 {
		return Err(ConfigError::Validation(
			"scheduler.run_history_retention_days must be at least 1".to_string(),
		));
	}

	loom_scheduler_core::validate_schedule(&scheduler.run_history_cleanup_schedule).map_err(
		|e| ConfigError::InvalidValue {
			key: "scheduler.run_history_cleanup_schedule".to_string(),
			message: e.to_string(),
		},
	)?;

	Ok(())
}
