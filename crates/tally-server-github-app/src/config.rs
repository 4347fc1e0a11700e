// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use reqwest::Url;
use tally_common_config::SecretString;

use crate::error::GithubAppError;

const DEFAULT_BASE_URL: &str = "https://api.github.com/";

/// Where the app's RSA private key comes from.
#[derive(Clone)]
pub enum KeySource {
	/// PEM text. Literal `\n` escape sequences are accepted in place of newlines.
	Inline(SecretString),
	/// Path to a PEM file.
	File(PathBuf),
}

impl std::fmt::Debug for KeySource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			KeySource::Inline(pem) => f.debug_tuple("Inline").field(pem).finish(),
			KeySource::File(path) => f.debug_tuple("File").field(path).finish(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct AppCredentials {
	pub app_id: u64,
	pub key: KeySource,
}

/// Settings for [`crate::InstallationCredentialManager`].
///
/// Without credentials the manager runs unconfigured: it starts, but every
/// operation that needs to sign fails with [`GithubAppError::Config`].
#[derive(Debug, Clone)]
pub struct GithubAppConfig {
	credentials: Option<AppCredentials>,
	base_url: Url,
}

impl GithubAppConfig {
	pub fn new(app_id: u64, key: KeySource) -> Self {
		Self {
			credentials: Some(AppCredentials { app_id, key }),
			base_url: default_base_url(),
		}
	}

	pub fn unconfigured() -> Self {
		Self {
			credentials: None,
			base_url: default_base_url(),
		}
	}

	/// Point API calls at a different host, e.g. GitHub Enterprise Server
	/// (`https://ghe.example.com/api/v3`).
	pub fn with_base_url(mut self, raw: &str) -> Result<Self, GithubAppError> {
		self.base_url = normalize_base_url(raw)?;
		Ok(self)
	}

	pub fn credentials(&self) -> Option<&AppCredentials> {
		self.credentials.as_ref()
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}
}

fn default_base_url() -> Url {
	Url::parse(DEFAULT_BASE_URL).expect("default URL is valid")
}

/// Relative joins replace the last path segment unless the base ends in `/`.
fn normalize_base_url(raw: &str) -> Result<Url, GithubAppError> {
	let mut url = Url::parse(raw)
		.map_err(|e| GithubAppError::Config(format!("Invalid GitHub base URL '{raw}': {e}")))?;
	if url.cannot_be_a_base() || url.host_str().is_none() {
		return Err(GithubAppError::Config(format!(
			"GitHub base URL '{raw}' must be an absolute http(s) URL"
		)));
	}
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());
		url.set_path(&path);
	}
	Ok(url)
}
