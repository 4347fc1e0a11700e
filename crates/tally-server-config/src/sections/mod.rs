// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod github_app;
mod logging;
mod mirror;

pub use github_app::{GitHubAppConfig, GitHubAppConfigLayer, PrivateKeySource, DEFAULT_BASE_URL};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use mirror::{MirrorConfig, MirrorConfigLayer, DEFAULT_LOCK_CAPACITY, DEFAULT_STORAGE_PATH};
