// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{DatabaseConfigLayer, LogFormat, LoggingConfigLayer, SchedulerConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/loom/scheduler.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: LOOM_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			database: Some(load_database_from_env()?),
			scheduler: Some(load_scheduler_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u32 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("LOOM_SERVER_DATABASE_URL"),
		max_connections: env_u32("LOOM_SERVER_DATABASE_MAX_CONNECTIONS")?,
	})
}

fn load_scheduler_from_env() -> Result<SchedulerConfigLayer, ConfigError> {
	Ok(SchedulerConfigLayer {
		run_history_retention_days: env_u32("LOOM_SERVER_SCHEDULER_RUN_RETENTION_DAYS")?,
		run_history_cleanup_schedule: env_var("LOOM_SERVER_SCHEDULER_CLEANUP_SCHEDULE"),
		user_agent: env_var("LOOM_SERVER_SCHEDULER_USER_AGENT"),
		allow_private_targets: env_bool("LOOM_SERVER_SCHEDULER_ALLOW_PRIVATE_TARGETS"),
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env_var("LOOM_SERVER_LOG_FORMAT") {
		Some(v) => Some(
			v.parse::<LogFormat>()
				.map_err(|message| ConfigError::InvalidValue {
					key: "LOOM_SERVER_LOG_FORMAT".to_string(),
					message,
				})?,
		),
		None => None,
	};

	Ok(LoggingConfigLayer {
		level: env_var("LOOM_SERVER_LOG_LEVEL"),
		format,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.database.is_none());
		assert!(layer.scheduler.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let source = TomlSource::new("/nonexistent/scheduler.toml");
		let layer = source.load().unwrap();
		assert!(layer.database.is_none());
	}

	#[test]
	fn test_toml_source_reads_sections() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[database]
url = "sqlite:/tmp/scheduler.db"

[scheduler]
run_history_retention_days = 7
allow_private_targets = true

[logging]
format = "json"
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(
			layer.database.unwrap().url.as_deref(),
			Some("sqlite:/tmp/scheduler.db")
		);
		let scheduler = layer.scheduler.unwrap();
		assert_eq!(scheduler.run_history_retention_days, Some(7));
		assert_eq!(scheduler.allow_private_targets, Some(true));
		assert_eq!(layer.logging.unwrap().format, Some(LogFormat::Json));
	}

	#[test]
	fn test_toml_source_reports_parse_errors() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[scheduler\nbroken").unwrap();

		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}
}
