// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Per-installation token cache with single-flight minting.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::GithubAppError;
use crate::types::InstallationTokenView;

/// Entries within this much of `expires_at` are treated as missing.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Entries are dropped this long after insertion, whatever GitHub said.
pub const TOKEN_CACHE_TTL: Duration = Duration::from_secs(55 * 60);
pub const TOKEN_CACHE_CAPACITY: usize = 10_000;
/// A freshly minted token with less life than this is minted once more.
const MIN_FRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(30);

struct CacheEntry {
	token: InstallationTokenView,
	inserted_at: Instant,
}

impl CacheEntry {
	fn is_usable(&self, ttl: Duration) -> bool {
		self.inserted_at.elapsed() < ttl && remaining(&self.token) > TOKEN_REFRESH_MARGIN
	}

	fn is_live(&self, ttl: Duration) -> bool {
		self.inserted_at.elapsed() < ttl && remaining(&self.token) > Duration::ZERO
	}
}

fn remaining(token: &InstallationTokenView) -> Duration {
	(token.expires_at - Utc::now())
		.to_std()
		.unwrap_or(Duration::ZERO)
}

pub struct InstallationTokenCache {
	entries: Mutex<HashMap<i64, CacheEntry>>,
	inflight: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
	ttl: Duration,
	capacity: usize,
}

impl Default for InstallationTokenCache {
	fn default() -> Self {
		Self::new()
	}
}

impl InstallationTokenCache {
	pub fn new() -> Self {
		Self::with_limits(TOKEN_CACHE_TTL, TOKEN_CACHE_CAPACITY)
	}

	pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
		Self {
			entries: Mutex::new(HashMap::new()),
			inflight: Mutex::new(HashMap::new()),
			ttl,
			capacity: capacity.max(1),
		}
	}

	/// The cached token if it is still comfortably valid.
	pub fn get(&self, installation_id: i64) -> Option<InstallationTokenView> {
		let entries = self.entries.lock();
		entries
			.get(&installation_id)
			.filter(|entry| entry.is_usable(self.ttl))
			.map(|entry| entry.token.clone())
	}

	/// Returns true if an entry was removed.
	pub fn invalidate(&self, installation_id: i64) -> bool {
		let removed = self.entries.lock().remove(&installation_id).is_some();
		if removed {
			debug!(installation_id, "evicted cached installation token");
		}
		removed
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Return the cached token or mint one with `load`.
	///
	/// At most one `load` runs per installation at a time; concurrent callers
	/// wait and then read what it stored. `load` may be called a second time
	/// if the first token it returns is about to expire.
	pub async fn get_or_load<F, Fut>(
		&self,
		installation_id: i64,
		load: F,
	) -> Result<InstallationTokenView, GithubAppError>
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<InstallationTokenView, GithubAppError>>,
	{
		if let Some(token) = self.get(installation_id) {
			trace!(installation_id, "using cached installation token");
			return Ok(token);
		}

		let lock = self.inflight_lock(installation_id);
		let result = self.load_serialized(installation_id, &lock, load).await;
		self.release_inflight(installation_id, &lock);
		result
	}

	async fn load_serialized<F, Fut>(
		&self,
		installation_id: i64,
		lock: &tokio::sync::Mutex<()>,
		load: F,
	) -> Result<InstallationTokenView, GithubAppError>
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<InstallationTokenView, GithubAppError>>,
	{
		let _guard = lock.lock().await;

		if let Some(token) = self.get(installation_id) {
			trace!(installation_id, "using cached installation token (post-lock)");
			return Ok(token);
		}

		let mut token = load().await?;
		if remaining(&token) < MIN_FRESH_TOKEN_LIFETIME {
			warn!(
				installation_id,
				expires_at = %token.expires_at,
				"minted token expires almost immediately, minting again"
			);
			token = load().await?;
		}

		self.insert(installation_id, token.clone());
		Ok(token)
	}

	fn insert(&self, installation_id: i64, token: InstallationTokenView) {
		let mut entries = self.entries.lock();
		if !entries.contains_key(&installation_id) && entries.len() >= self.capacity {
			let ttl = self.ttl;
			entries.retain(|_, entry| entry.is_live(ttl));
			if entries.len() >= self.capacity {
				let oldest = entries
					.iter()
					.min_by_key(|(_, entry)| entry.inserted_at)
					.map(|(id, _)| *id);
				if let Some(oldest) = oldest {
					entries.remove(&oldest);
					debug!(installation_id = oldest, "token cache full, evicted oldest entry");
				}
			}
		}
		entries.insert(
			installation_id,
			CacheEntry {
				token,
				inserted_at: Instant::now(),
			},
		);
	}

	fn inflight_lock(&self, installation_id: i64) -> Arc<tokio::sync::Mutex<()>> {
		self.inflight
			.lock()
			.entry(installation_id)
			.or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
			.clone()
	}

	/// Drop the per-installation mint lock once nobody else is waiting on it.
	fn release_inflight(&self, installation_id: i64, lock: &Arc<tokio::sync::Mutex<()>>) {
		let mut inflight = self.inflight.lock();
		// One reference in the map, one held by the caller.
		if Arc::strong_count(lock) <= 2 {
			if let Some(existing) = inflight.get(&installation_id) {
				if Arc::ptr_eq(existing, lock) {
					inflight.remove(&installation_id);
				}
			}
		}
	}
}
