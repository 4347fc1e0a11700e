// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub App installation credentials.
//!
//! [`InstallationCredentialManager`] turns the app's RSA key into short-lived
//! installation access tokens:
//!
//! - loads the key from PEM (PKCS#1 or PKCS#8), inline or from a file
//! - signs app assertions and reuses them until they near expiry
//! - caches one token per installation and mints at most one at a time
//! - remembers suspended installations and refuses them without a network call
//!
//! # Example
//!
//! ```ignore
//! use tally_server_github_app::{GithubAppConfig, InstallationCredentialManager, KeySource};
//!
//! let config = GithubAppConfig::new(12345, KeySource::File("/run/secrets/app.pem".into()));
//! let manager = InstallationCredentialManager::new(config)?;
//! let token = manager.get_installation_token(67890).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod jwt;
pub mod key;
pub mod manager;
pub mod suspension;
pub mod types;

pub use cache::{InstallationTokenCache, TOKEN_CACHE_CAPACITY, TOKEN_CACHE_TTL, TOKEN_REFRESH_MARGIN};
pub use config::{AppCredentials, GithubAppConfig, KeySource};
pub use error::GithubAppError;
pub use jwt::AppAssertionSigner;
pub use key::{pkcs1_to_pkcs8, SigningKey};
pub use manager::InstallationCredentialManager;
pub use suspension::SuspensionTracker;
pub use types::InstallationTokenView;
