// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database configuration.

use serde::Deserialize;

const DEFAULT_URL: &str = "sqlite:./loom-scheduler.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Database configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	pub url: String,
	pub max_connections: u32,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			url: DEFAULT_URL.to_string(),
			max_connections: DEFAULT_MAX_CONNECTIONS,
		}
	}
}

/// Database configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub max_connections: Option<u32>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.max_connections.is_some() {
			self.max_connections = other.max_connections;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		DatabaseConfig {
			url: self.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
			max_connections: self
				.max_connections
				.unwrap_or(DEFAULT_MAX_CONNECTIONS)
				.max(1),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_url() {
		let config = DatabaseConfigLayer::default().finalize();
		assert_eq!(config.url, "sqlite:./loom-scheduler.db");
		assert_eq!(config.max_connections, 5);
	}

	#[test]
	fn test_custom_values() {
		let layer = DatabaseConfigLayer {
			url: Some("sqlite:/var/lib/loom/scheduler.db".to_string()),
			max_connections: Some(0),
		};
		let config = layer.finalize();
		assert_eq!(config.url, "sqlite:/var/lib/loom/scheduler.db");
		assert_eq!(config.max_connections, 1);
	}
}
