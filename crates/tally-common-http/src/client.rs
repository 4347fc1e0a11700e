// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

/// Request timeout applied by [`new_client`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A client builder preloaded with the tally User-Agent.
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Build a client with the tally User-Agent and [`DEFAULT_TIMEOUT`].
pub fn new_client() -> reqwest::Result<Client> {
	builder().timeout(DEFAULT_TIMEOUT).build()
}

/// `tally/{crate version}`. GitHub rejects API calls without a User-Agent.
pub fn user_agent() -> String {
	format!("tally/{}", env!("CARGO_PKG_VERSION"))
}
