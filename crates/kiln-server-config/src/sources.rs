// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, HttpConfigLayer, JobsConfigLayer, LogFormat, LoggingConfigLayer,
};

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

/// TOML file configuration source. A missing file is an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/kiln/server.toml")
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

type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Environment variable source.
///
/// Convention: KILN_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl EnvSource {
	/// Builds a layer from an arbitrary variable lookup. Empty values count as
	/// unset.
	pub fn load_with(
		&self,
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<ServerConfigLayer, ConfigError> {
		let env = Env { lookup: &lookup };
		Ok(ServerConfigLayer {
			http: Some(load_http(&env)?),
			database: Some(load_database(&env)?),
			jobs: Some(load_jobs(&env)?),
			logging: Some(load_logging(&env)?),
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		self.load_with(|name| std::env::var(name).ok())
	}
}

struct Env<'a> {
	lookup: &'a Lookup<'a>,
}

impl Env<'_> {
	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self.var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parse<T: std::str::FromStr>(&self, name: &str, type_name: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid {type_name} value '{v}'"),
			}),
			None => Ok(None),
		}
	}
}

fn load_http(env: &Env<'_>) -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env.var("KILN_SERVER_HOST"),
		port: env.parse("KILN_SERVER_PORT", "u16")?,
	})
}

fn load_database(env: &Env<'_>) -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env.var("KILN_SERVER_DATABASE_URL"),
		max_connections: env.parse("KILN_SERVER_DATABASE_MAX_CONNECTIONS", "u32")?,
	})
}

fn load_jobs(env: &Env<'_>) -> Result<JobsConfigLayer, ConfigError> {
	Ok(JobsConfigLayer {
		enabled: env.bool("KILN_SERVER_JOBS_ENABLED"),
		max_concurrency: env.parse("KILN_SERVER_JOBS_MAX_CONCURRENCY", "usize")?,
		execution_time_limit_secs: env.parse("KILN_SERVER_JOBS_EXECUTION_TIME_LIMIT_SECS", "u64")?,
		poll_interval_ms: env.parse("KILN_SERVER_JOBS_POLL_INTERVAL_MS", "u64")?,
		stale_sweep_interval_secs: env.parse("KILN_SERVER_JOBS_STALE_SWEEP_INTERVAL_SECS", "u64")?,
		default_expiry_secs: env.parse("KILN_SERVER_JOBS_DEFAULT_EXPIRY_SECS", "u64")?,
		retry_backoff_secs: env.parse("KILN_SERVER_JOBS_RETRY_BACKOFF_SECS", "u64")?,
		max_tries: env.parse("KILN_SERVER_JOBS_MAX_TRIES", "u32")?,
	})
}

fn load_logging(env: &Env<'_>) -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env.var("KILN_SERVER_LOG_FORMAT") {
		Some(v) => Some(v.parse::<LogFormat>().map_err(|message| ConfigError::InvalidValue {
			key: "KILN_SERVER_LOG_FORMAT".to_string(),
			message,
		})?),
		None => None,
	};

	Ok(LoggingConfigLayer {
		level: env.var("KILN_SERVER_LOG_LEVEL"),
		format,
	})
}
