// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for tally services.
//!
//! Values come from three layers, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`/etc/tally/server.toml` unless overridden)
//! 3. `TALLY_SERVER_*` environment variables
//!
//! ```ignore
//! let config = tally_server_config::load_config()?;
//! if config.mirror.enabled {
//!     println!("mirrors live under {}", config.mirror.storage_path.display());
//! }
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;

use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	/// `None` when no GitHub App is configured.
	pub github_app: Option<GitHubAppConfig>,
	pub mirror: MirrorConfig,
	pub logging: LoggingConfig,
}

/// Load from defaults, the system config file and the environment.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Like [`load_config`] with an explicit config file path.
pub fn load_config_with_file(path: impl Into<PathBuf>) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(path)),
		Box::new(EnvSource),
	])
}

pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let github_app = match layer.github_app {
		Some(l) => l.build()?,
		None => None,
	};
	let mirror = layer.mirror.unwrap_or_default().finalize()?;
	let logging = layer.logging.unwrap_or_default().finalize();

	info!(
		github_app_configured = github_app.is_some(),
		mirror_enabled = mirror.enabled,
		mirror_storage = %mirror.storage_path.display(),
		"configuration loaded"
	);

	Ok(ServerConfig {
		github_app,
		mirror,
		logging,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	struct Fixed(Precedence, &'static str);

	impl ConfigSource for Fixed {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			self.0
		}

		fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
			Ok(toml::from_str(self.1).unwrap())
		}
	}

	#[test]
	fn higher_precedence_wins_regardless_of_order() {
		let config = load_from_sources(vec![
			Box::new(Fixed(Precedence::Environment, "[mirror]\nlock_capacity = 5")),
			Box::new(Fixed(Precedence::ConfigFile, "[mirror]\nlock_capacity = 9\nenabled = true")),
			Box::new(DefaultsSource),
		])
		.unwrap();
		assert_eq!(config.mirror.lock_capacity, 5);
		assert!(config.mirror.enabled);
	}

	#[test]
	fn file_config_without_env() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			"[github_app]\napp_id = 99\nprivate_key_path = \"/keys/app.pem\"\n\n[logging]\nformat = \"json\""
		)
		.unwrap();

		let config = load_from_sources(vec![
			Box::new(DefaultsSource),
			Box::new(TomlSource::new(file.path())),
		])
		.unwrap();

		let app = config.github_app.unwrap();
		assert_eq!(app.app_id, 99);
		assert!(matches!(app.private_key, PrivateKeySource::File(_)));
		assert_eq!(config.logging.format, LogFormat::Json);
		assert_eq!(config.mirror, MirrorConfig::default());
	}

	#[test]
	fn invalid_github_section_fails_load() {
		let result = load_from_sources(vec![Box::new(Fixed(
			Precedence::ConfigFile,
			"[github_app]\napp_id = 1",
		))]);
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}
}
