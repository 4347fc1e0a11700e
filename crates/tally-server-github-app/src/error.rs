// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for installation credential management.

use tally_common_http::{is_transient_status, RetryableError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GithubAppError {
	#[error("Network error: {0}")]
	Network(#[from] reqwest::Error),

	#[error("Request timed out")]
	Timeout,

	/// GitHub rejected the app assertion.
	#[error("Unauthorized or invalid app configuration")]
	Unauthorized,

	#[error("Forbidden or insufficient permissions")]
	Forbidden,

	#[error("Rate limit exceeded")]
	RateLimited,

	#[error("GitHub API error: {status} - {message}")]
	ApiError { status: u16, message: String },

	#[error("Invalid response from GitHub: {0}")]
	InvalidResponse(String),

	/// Missing or unusable app id or key material.
	#[error("Configuration error: {0}")]
	Config(String),

	#[error("JWT error: {0}")]
	Jwt(String),

	#[error("GitHub App installation {installation_id} not found")]
	InstallationNotFound { installation_id: i64 },

	#[error("GitHub App installation {installation_id} is suspended")]
	InstallationSuspended { installation_id: i64 },
}

impl GithubAppError {
	pub fn api_error(status: u16, message: impl Into<String>) -> Self {
		Self::ApiError {
			status,
			message: message.into(),
		}
	}

	/// Failures of the remote provider, as opposed to local configuration
	/// or installation state.
	pub fn is_provider_error(&self) -> bool {
		matches!(
			self,
			GithubAppError::Network(_)
				| GithubAppError::Timeout
				| GithubAppError::Unauthorized
				| GithubAppError::Forbidden
				| GithubAppError::RateLimited
				| GithubAppError::ApiError { .. }
				| GithubAppError::InvalidResponse(_)
		)
	}

	pub fn is_configuration_error(&self) -> bool {
		matches!(self, GithubAppError::Config(_) | GithubAppError::Jwt(_))
	}
}

impl RetryableError for GithubAppError {
	fn is_retryable(&self) -> bool {
		match self {
			GithubAppError::Network(e) => e.is_retryable(),
			GithubAppError::Timeout | GithubAppError::RateLimited => true,
			GithubAppError::ApiError { status, .. } => reqwest::StatusCode::from_u16(*status)
				.map(is_transient_status)
				.unwrap_or(false),
			_ => false,
		}
	}
}
