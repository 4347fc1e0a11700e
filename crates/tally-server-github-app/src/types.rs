// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_common_config::SecretString;

/// An installation access token and when GitHub will stop accepting it.
#[derive(Debug, Clone, Serialize)]
pub struct InstallationTokenView {
	pub token: SecretString,
	pub expires_at: DateTime<Utc>,
}

/// `POST /app/installations/{id}/access_tokens`
#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenResponse {
	pub token: SecretString,
	pub expires_at: DateTime<Utc>,
}

/// `GET /app/installations/{id}`, trimmed to what we read.
#[derive(Debug, Deserialize)]
pub(crate) struct InstallationResponse {
	pub id: i64,
	#[serde(default)]
	pub suspended_at: Option<DateTime<Utc>>,
}
