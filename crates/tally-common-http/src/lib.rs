// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! HTTP plumbing shared by tally services.
//!
//! - [`builder`] / [`new_client`]: reqwest clients carrying the tally User-Agent
//! - [`retry`]: exponential backoff for operations whose errors implement
//!   [`RetryableError`]

mod client;
mod retry;

pub use client::{builder, new_client, user_agent, DEFAULT_TIMEOUT};
pub use retry::{is_transient_status, retry, RetryConfig, RetryableError};
