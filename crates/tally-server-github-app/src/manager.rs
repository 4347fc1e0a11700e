// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Installation access tokens for a GitHub App.

use reqwest::{Client, Response, StatusCode, Url};
use tally_common_config::SecretString;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::InstallationTokenCache;
use crate::config::GithubAppConfig;
use crate::error::GithubAppError;
use crate::jwt::AppAssertionSigner;
use crate::key::SigningKey;
use crate::suspension::SuspensionTracker;
use crate::types::{AccessTokenResponse, InstallationResponse, InstallationTokenView};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Mints, caches and tracks installation access tokens.
///
/// Share one instance behind an `Arc`; all methods take `&self`.
pub struct InstallationCredentialManager {
	http_client: Client,
	base_url: Url,
	signer: AppAssertionSigner,
	tokens: InstallationTokenCache,
	suspensions: SuspensionTracker,
}

impl InstallationCredentialManager {
	pub fn new(config: GithubAppConfig) -> Result<Self, GithubAppError> {
		let http_client = tally_common_http::new_client()
			.map_err(|e| GithubAppError::Config(format!("Failed to create HTTP client: {e}")))?;
		Self::with_client(config, http_client)
	}

	pub fn with_client(config: GithubAppConfig, http_client: Client) -> Result<Self, GithubAppError> {
		let credentials = config.credentials();
		let key = SigningKey::load(credentials.map(|c| &c.key))?;
		let signer = AppAssertionSigner::new(credentials.map(|c| c.app_id), key);

		info!(
			app_id = credentials.map(|c| c.app_id),
			base_url = %config.base_url(),
			configured = signer.is_configured(),
			"created installation credential manager"
		);

		Ok(Self {
			http_client,
			base_url: config.base_url().clone(),
			signer,
			tokens: InstallationTokenCache::new(),
			suspensions: SuspensionTracker::new(),
		})
	}

	/// True when real key material was provided.
	pub fn is_configured(&self) -> bool {
		self.signer.is_configured()
	}

	/// Shared handle to the suspended-installation set.
	pub fn suspension_tracker(&self) -> SuspensionTracker {
		self.suspensions.clone()
	}

	/// An app assertion JWT, reused until shortly before it expires.
	pub fn generate_app_assertion(&self) -> Result<SecretString, GithubAppError> {
		self.signer.assertion()
	}

	pub async fn get_installation_token(
		&self,
		installation_id: i64,
	) -> Result<SecretString, GithubAppError> {
		Ok(self
			.get_installation_token_details(installation_id)
			.await?
			.token)
	}

	/// Installation token with its expiry. Suspended installations fail
	/// before the cache or network is touched.
	#[instrument(skip(self))]
	pub async fn get_installation_token_details(
		&self,
		installation_id: i64,
	) -> Result<InstallationTokenView, GithubAppError> {
		if self.suspensions.is_suspended(installation_id) {
			debug!(installation_id, "refusing token for suspended installation");
			return Err(GithubAppError::InstallationSuspended { installation_id });
		}

		let result = self
			.tokens
			.get_or_load(installation_id, || {
				self.mint_installation_token(installation_id)
			})
			.await;

		if matches!(result, Err(GithubAppError::InstallationNotFound { .. })) {
			self.tokens.invalidate(installation_id);
		}
		result
	}

	pub fn mark_installation_suspended(&self, installation_id: i64) {
		self.suspensions.mark_suspended(installation_id);
		self.tokens.invalidate(installation_id);
	}

	pub fn mark_installation_active(&self, installation_id: i64) {
		self.suspensions.mark_active(installation_id);
	}

	pub fn evict_installation_token(&self, installation_id: i64) {
		self.tokens.invalidate(installation_id);
	}

	/// Ask GitHub whether the installation is suspended right now. Does not
	/// touch the local suspension set.
	#[instrument(skip(self))]
	pub async fn is_installation_suspended(
		&self,
		installation_id: i64,
	) -> Result<bool, GithubAppError> {
		let assertion = self.signer.assertion()?;
		let url = self.endpoint(&format!("app/installations/{installation_id}"))?;

		let response = self
			.send(self.http_client.get(url), &assertion)
			.await?;

		let status = response.status();
		if status == StatusCode::NOT_FOUND {
			return Err(GithubAppError::InstallationNotFound { installation_id });
		}
		if !status.is_success() {
			return Err(self.failure(status, response).await);
		}

		let installation: InstallationResponse = response.json().await.map_err(|e| {
			GithubAppError::InvalidResponse(format!("JSON parse error: {e}"))
		})?;
		debug!(
			installation_id = installation.id,
			suspended = installation.suspended_at.is_some(),
			"fetched installation status"
		);
		Ok(installation.suspended_at.is_some())
	}

	async fn mint_installation_token(
		&self,
		installation_id: i64,
	) -> Result<InstallationTokenView, GithubAppError> {
		let assertion = self.signer.assertion()?;
		let url = self.endpoint(&format!(
			"app/installations/{installation_id}/access_tokens"
		))?;

		let response = self
			.send(self.http_client.post(url), &assertion)
			.await?;

		let status = response.status();
		match status {
			StatusCode::NOT_FOUND => {
				warn!(installation_id, "installation not found while minting token");
				return Err(GithubAppError::InstallationNotFound { installation_id });
			}
			StatusCode::FORBIDDEN => {
				warn!(installation_id, "token mint forbidden, treating installation as suspended");
				self.mark_installation_suspended(installation_id);
				return Err(GithubAppError::InstallationSuspended { installation_id });
			}
			s if !s.is_success() => return Err(self.failure(s, response).await),
			_ => {}
		}

		let body: AccessTokenResponse = response.json().await.map_err(|e| {
			error!(error = %e, "failed to parse access token response");
			GithubAppError::InvalidResponse(format!("JSON parse error: {e}"))
		})?;

		info!(installation_id, expires_at = %body.expires_at, "minted installation token");
		Ok(InstallationTokenView {
			token: body.token,
			expires_at: body.expires_at,
		})
	}

	fn endpoint(&self, path: &str) -> Result<Url, GithubAppError> {
		self.base_url
			.join(path)
			.map_err(|e| GithubAppError::Config(format!("Invalid URL: {e}")))
	}

	async fn send(
		&self,
		request: reqwest::RequestBuilder,
		assertion: &SecretString,
	) -> Result<Response, GithubAppError> {
		request
			.bearer_auth(assertion.expose())
			.header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
			.header("X-GitHub-Api-Version", GITHUB_API_VERSION)
			.send()
			.await
			.map_err(|e| {
				if e.is_timeout() {
					error!("GitHub request timed out");
					GithubAppError::Timeout
				} else {
					error!(error = %e, "network error calling GitHub");
					GithubAppError::Network(e)
				}
			})
	}

	async fn failure(&self, status: StatusCode, response: Response) -> GithubAppError {
		let body = response.text().await.unwrap_or_default();
		let err = map_github_error(status, &body);
		if matches!(err, GithubAppError::Unauthorized) {
			self.signer.invalidate();
		}
		err
	}
}

pub(crate) fn map_github_error(status: StatusCode, body: &str) -> GithubAppError {
	match status {
		StatusCode::UNAUTHORIZED => {
			warn!(status = status.as_u16(), "GitHub rejected app credentials");
			GithubAppError::Unauthorized
		}
		StatusCode::FORBIDDEN => {
			warn!(status = status.as_u16(), "forbidden request to GitHub");
			GithubAppError::Forbidden
		}
		StatusCode::TOO_MANY_REQUESTS => {
			warn!(status = status.as_u16(), "GitHub rate limit exceeded");
			GithubAppError::RateLimited
		}
		_ => {
			error!(status = status.as_u16(), body = %body, "GitHub API error");
			GithubAppError::api_error(status.as_u16(), body)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn maps_statuses() {
		assert!(matches!(
			map_github_error(StatusCode::UNAUTHORIZED, "Bad credentials"),
			GithubAppError::Unauthorized
		));
		assert!(matches!(
			map_github_error(StatusCode::FORBIDDEN, "nope"),
			GithubAppError::Forbidden
		));
		assert!(matches!(
			map_github_error(StatusCode::TOO_MANY_REQUESTS, ""),
			GithubAppError::RateLimited
		));
		assert!(matches!(
			map_github_error(StatusCode::BAD_GATEWAY, "upstream"),
			GithubAppError::ApiError { status: 502, .. }
		));
	}

	#[tokio::test]
	async fn unconfigured_manager_starts_but_cannot_sign() {
		let manager = InstallationCredentialManager::new(GithubAppConfig::unconfigured()).unwrap();
		assert!(!manager.is_configured());
		assert!(matches!(
			manager.generate_app_assertion(),
			Err(GithubAppError::Config(_))
		));
		assert!(matches!(
			manager.get_installation_token(1).await,
			Err(GithubAppError::Config(_))
		));
	}

	#[tokio::test]
	async fn suspension_short_circuits_even_when_unconfigured() {
		let manager = InstallationCredentialManager::new(GithubAppConfig::unconfigured()).unwrap();
		manager.mark_installation_suspended(3);
		assert!(matches!(
			manager.get_installation_token(3).await,
			Err(GithubAppError::InstallationSuspended { installation_id: 3 })
		));
		assert!(manager.suspension_tracker().is_suspended(3));
	}
}
