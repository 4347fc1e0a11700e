// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Exponential backoff for fallible async operations.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(250),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

/// Classifies an error as transient.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

/// Statuses worth another attempt.
pub fn is_transient_status(status: StatusCode) -> bool {
	status == StatusCode::TOO_MANY_REQUESTS
		|| status == StatusCode::REQUEST_TIMEOUT
		|| status.is_server_error()
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}
		self.status().is_some_and(is_transient_status)
	}
}

fn backoff(cfg: &RetryConfig, retry_index: u32) -> Duration {
	let raw = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(retry_index as i32);
	let capped = raw.min(cfg.max_delay.as_secs_f64());
	let scaled = if cfg.jitter {
		// Uniform in [0.5, 1.5).
		capped * (0.5 + fastrand::f64())
	} else {
		capped
	};
	Duration::from_secs_f64(scaled)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `cfg.max_attempts` attempts have been made.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut op: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let mut attempt = 0u32;
	loop {
		attempt += 1;
		let err = match op().await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};

		if !err.is_retryable() || attempt >= cfg.max_attempts {
			return Err(err);
		}

		let delay = backoff(cfg, attempt - 1);
		warn!(
			error = %err,
			attempt,
			max_attempts = cfg.max_attempts,
			delay_ms = delay.as_millis() as u64,
			"transient failure, retrying"
		);
		tokio::time::sleep(delay).await;
	}
}
