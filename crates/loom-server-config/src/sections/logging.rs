// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Logging configuration section.

use serde::{Deserialize, Serialize};

fn default_level() -> String {
	"info,sqlx=warn,hyper=info".to_string()
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Text,
	Json,
}

impl std::str::FromStr for LogFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"text" | "pretty" => Ok(Self::Text),
			"json" => Ok(Self::Json),
			_ => Err(format!("unknown log format '{s}', expected 'text' or 'json'")),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfigLayer {
	pub level: Option<String>,
	pub format: Option<LogFormat>,
}

impl LoggingConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.level.is_some() {
			self.level = other.level;
		}
		if other.format.is_some() {
			self.format = other.format;
		}
	}

	pub fn finalize(self) -> LoggingConfig {
		LoggingConfig {
			level: self.level.unwrap_or_else(default_level),
			format: self.format.unwrap_or_default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
	pub level: String,
	pub format: LogFormat,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: default_level(),
			format: LogFormat::Text,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_layer_finalize_defaults() {
		let config = LoggingConfigLayer::default().finalize();
		assert_eq!(config, LoggingConfig::default());
		assert_eq!(config.format, LogFormat::Text);
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = LoggingConfigLayer {
			level: Some("info".to_string()),
			format: Some(LogFormat::Text),
		};
		base.merge(LoggingConfigLayer {
			level: None,
			format: Some(LogFormat::Json),
		});
		assert_eq!(base.level.as_deref(), Some("info"));
		assert_eq!(base.format, Some(LogFormat::Json));
	}

	#[test]
	fn test_deserialize_format() {
		let layer: LoggingConfigLayer = toml::from_str("format = \"json\"").unwrap();
		assert_eq!(layer.format, Some(LogFormat::Json));
		assert!(layer.level.is_none());
	}

	#[test]
	fn test_parse_format() {
		assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
		assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Text);
		assert!("xml".parse::<LogFormat>().is_err());
	}
}
