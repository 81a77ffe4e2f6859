// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration management for Kiln server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`KILN_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use kiln_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub jobs: JobsConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`KILN_SERVER_*`)
/// 2. Config file (`/etc/kiln/server.toml`)
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

/// Merge `sources` in precedence order and resolve the result.
pub fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
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
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize();
	let jobs = layer.jobs.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&database, &jobs)?;

	info!(
		host = %http.host,
		port = http.port,
		database = %database.url,
		jobs_enabled = jobs.enabled,
		max_concurrency = jobs.max_concurrency,
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		database,
		jobs,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(database: &DatabaseConfig, jobs: &JobsConfig) -> Result<(), ConfigError> {
	if database.max_connections == 0 {
		return Err(ConfigError::Validation(
			"database.max_connections must be at least 1".to_string(),
		));
	}
	if jobs.max_concurrency == 0 {
		return Err(ConfigError::Validation(
			"jobs.max_concurrency must be at least 1".to_string(),
		));
	}
	if jobs.poll_interval_ms == 0 {
		return Err(ConfigError::Validation(
			"jobs.poll_interval_ms must be at least 1".to_string(),
		));
	}
	if jobs.execution_time_limit_secs == 0 {
		return Err(ConfigError::Validation(
			"jobs.execution_time_limit_secs must be at least 1".to_string(),
		));
	}
	if jobs.max_tries == Some(0) {
		return Err(ConfigError::Validation(
			"jobs.max_tries must be at least 1 when set".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::io::Write;

	struct FixedSource(Precedence, ServerConfigLayer);

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			self.0
		}

		fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
			Ok(self.1.clone())
		}
	}

	fn port_layer(port: u16) -> ServerConfigLayer {
		ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(port),
				..Default::default()
			}),
			..Default::default()
		}
	}

	#[test]
	fn test_socket_addr() {
		let config = ServerConfig {
			http: HttpConfig {
				host: "127.0.0.1".to_string(),
				port: 9000,
			},
			..Default::default()
		};
		assert_eq!(config.socket_addr(), "127.0.0.1:9000");
	}

	#[test]
	fn test_defaults_finalize() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config, ServerConfig::default());
	}

	#[test]
	fn test_higher_precedence_wins_regardless_of_order() {
		let config = load_from_sources(vec![
			Box::new(FixedSource(Precedence::Environment, port_layer(7000))),
			Box::new(FixedSource(Precedence::ConfigFile, port_layer(6000))),
			Box::new(DefaultsSource),
		])
		.unwrap();
		assert_eq!(config.http.port, 7000);
	}

	#[test]
	fn test_config_file_is_applied() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[database]
url = "sqlite:/tmp/kiln-test.db"

[jobs]
enabled = false
retry_backoff_secs = 5
"#
		)
		.unwrap();

		let config = load_from_sources(vec![
			Box::new(DefaultsSource),
			Box::new(TomlSource::new(file.path())),
		])
		.unwrap();
		assert_eq!(config.database.url, "sqlite:/tmp/kiln-test.db");
		assert!(!config.jobs.enabled);
		assert_eq!(config.jobs.retry_backoff_secs, 5);
		assert_eq!(config.http.port, 8080);
	}

	#[test]
	fn test_zero_concurrency_is_rejected() {
		let layer = ServerConfigLayer {
			jobs: Some(JobsConfigLayer {
				max_concurrency: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		let err = finalize(layer).unwrap_err();
		assert!(err.to_string().contains("max_concurrency"));
	}

	#[test]
	fn test_zero_max_tries_is_rejected() {
		let jobs = JobsConfig {
			max_tries: Some(0),
			..Default::default()
		};
		assert!(validate_config(&DatabaseConfig::default(), &jobs).is_err());
	}

	proptest! {
		#[test]
		fn positive_settings_always_validate(
			concurrency in 1usize..64,
			poll in 1u64..10_000,
			limit in 1u64..100_000,
			tries in proptest::option::of(1u32..100),
		) {
			let jobs = JobsConfig {
				max_concurrency: concurrency,
				poll_interval_ms: poll,
				execution_time_limit_secs: limit,
				max_tries: tries,
				..Default::default()
			};
			prop_assert!(validate_config(&DatabaseConfig::default(), &jobs).is_ok());
		}
	}
}
