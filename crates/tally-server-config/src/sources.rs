// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file, the environment.

use std::path::PathBuf;

use tally_common_config::load_secret_env;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{GitHubAppConfigLayer, LoggingConfigLayer, MirrorConfigLayer};

/// Higher values override lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		Ok(ServerConfigLayer::default())
	}
}

/// A TOML file. A missing file yields an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/tally/server.toml")
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

		let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::FileRead {
			path: self.path.clone(),
			source,
		})?;
		let layer = toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
			path: self.path.clone(),
			source,
		})?;
		trace!(path = %self.path.display(), "parsed config file");
		Ok(layer)
	}
}

/// `TALLY_SERVER_<SECTION>_<FIELD>` variables.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		Ok(ServerConfigLayer {
			github_app: Some(load_github_app_from_env()?),
			mirror: Some(load_mirror_from_env()?),
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

fn env_parse<T: std::str::FromStr>(name: &str, what: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {what} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_github_app_from_env() -> Result<GitHubAppConfigLayer, ConfigError> {
	Ok(GitHubAppConfigLayer {
		app_id: env_parse("TALLY_SERVER_GITHUB_APP_ID", "u64")?,
		private_key_pem: load_secret_env("TALLY_SERVER_GITHUB_APP_PRIVATE_KEY")?,
		private_key_path: env_var("TALLY_SERVER_GITHUB_APP_PRIVATE_KEY_PATH").map(PathBuf::from),
		base_url: env_var("TALLY_SERVER_GITHUB_APP_BASE_URL"),
	})
}

fn load_mirror_from_env() -> Result<MirrorConfigLayer, ConfigError> {
	Ok(MirrorConfigLayer {
		enabled: env_bool("TALLY_SERVER_MIRROR_ENABLED"),
		storage_path: env_var("TALLY_SERVER_MIRROR_STORAGE_PATH").map(PathBuf::from),
		lock_capacity: env_parse("TALLY_SERVER_MIRROR_LOCK_CAPACITY", "usize")?,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env_var("TALLY_SERVER_LOG_FORMAT") {
		Some(v) => Some(v.parse().map_err(|message| ConfigError::InvalidValue {
			key: "TALLY_SERVER_LOG_FORMAT".to_string(),
			message,
		})?),
		None => None,
	};
	Ok(LoggingConfigLayer {
		level: env_var("TALLY_SERVER_LOG_LEVEL"),
		format,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn precedence_orders_env_last() {
		assert!(Precedence::Defaults < Precedence::ConfigFile);
		assert!(Precedence::ConfigFile < Precedence::Environment);
	}

	#[test]
	fn missing_toml_file_is_empty_layer() {
		let layer = TomlSource::new("/nonexistent/tally.toml").load().unwrap();
		assert!(layer.github_app.is_none());
		assert!(layer.mirror.is_none());
	}

	#[test]
	fn malformed_toml_is_reported_with_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[mirror\nenabled = ").unwrap();
		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn bool_parsing_accepts_one_and_true() {
		std::env::set_var("TALLY_TEST_BOOL_ONE", "1");
		std::env::set_var("TALLY_TEST_BOOL_TRUE", "TRUE");
		std::env::set_var("TALLY_TEST_BOOL_NO", "no");
		assert_eq!(env_bool("TALLY_TEST_BOOL_ONE"), Some(true));
		assert_eq!(env_bool("TALLY_TEST_BOOL_TRUE"), Some(true));
		assert_eq!(env_bool("TALLY_TEST_BOOL_NO"), Some(false));
		assert_eq!(env_bool("TALLY_TEST_BOOL_UNSET"), None);
	}

	#[test]
	fn bad_number_is_invalid_value() {
		std::env::set_var("TALLY_TEST_BAD_NUMBER", "lots");
		let err = env_parse::<usize>("TALLY_TEST_BAD_NUMBER", "usize").unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TALLY_TEST_BAD_NUMBER"));
	}
}
