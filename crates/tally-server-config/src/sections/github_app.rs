// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub App credentials section.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tally_common_config::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubAppConfigLayer {
	pub app_id: Option<u64>,
	/// Inline PEM. May contain literal `\n` escapes when set through the environment.
	#[serde(skip_serializing)]
	pub private_key_pem: Option<SecretString>,
	/// Path to a PEM file, read when the credential manager starts.
	pub private_key_path: Option<PathBuf>,
	pub base_url: Option<String>,
}

impl GitHubAppConfigLayer {
	pub fn merge(&mut self, other: GitHubAppConfigLayer) {
		if other.app_id.is_some() {
			self.app_id = other.app_id;
		}
		if other.private_key_pem.is_some() {
			self.private_key_pem = other.private_key_pem;
		}
		if other.private_key_path.is_some() {
			self.private_key_path = other.private_key_path;
		}
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
	}

	/// `Ok(None)` when neither an app id nor key material is present.
	pub fn build(self) -> Result<Option<GitHubAppConfig>, ConfigError> {
		let has_key = self.private_key_pem.is_some() || self.private_key_path.is_some();
		if self.app_id.is_none() && !has_key {
			return Ok(None);
		}

		let app_id = self
			.app_id
			.ok_or_else(|| ConfigError::Validation("GitHub App app_id is required".to_string()))?;

		let private_key = match (self.private_key_pem, self.private_key_path) {
			(Some(_), Some(_)) => {
				return Err(ConfigError::Validation(
					"set only one of GitHub App private_key_pem and private_key_path".to_string(),
				))
			}
			(Some(pem), None) if pem.is_empty() => {
				return Err(ConfigError::Validation(
					"GitHub App private_key_pem cannot be empty".to_string(),
				))
			}
			(Some(pem), None) => PrivateKeySource::Pem(pem),
			(None, Some(path)) => PrivateKeySource::File(path),
			(None, None) => {
				return Err(ConfigError::Validation(
					"GitHub App private key is required when app_id is set".to_string(),
				))
			}
		};

		let base_url = self
			.base_url
			.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
		validate_base_url(&base_url)?;

		Ok(Some(GitHubAppConfig {
			app_id,
			private_key,
			base_url,
		}))
	}
}

fn validate_base_url(url: &str) -> Result<(), ConfigError> {
	if !url.starts_with("https://") {
		return Err(ConfigError::Validation(format!(
			"GitHub App base_url must use HTTPS, got: {url}"
		)));
	}
	if url.contains("localhost") || url.contains("127.0.0.1") || url.contains("[::1]") {
		return Err(ConfigError::Validation(
			"GitHub App base_url must not be localhost".to_string(),
		));
	}
	Ok(())
}

/// Where the app's RSA private key comes from.
#[derive(Debug, Clone)]
pub enum PrivateKeySource {
	Pem(SecretString),
	File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct GitHubAppConfig {
	pub app_id: u64,
	pub private_key: PrivateKeySource,
	pub base_url: String,
}
