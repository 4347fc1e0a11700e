// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Per-repository reader/writer locks.
//!
//! Clones and fetches take the write side; walks and lookups take the read
//! side. The registry is bounded: once it reaches capacity, locks that nobody
//! holds or waits on are swept before a new one is created. Held locks are
//! never evicted, so the map may briefly exceed capacity under load.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::RepositoryId;

pub const DEFAULT_LOCK_CAPACITY: usize = 1000;

pub struct RepositoryLockRegistry {
	locks: Mutex<HashMap<RepositoryId, Arc<RwLock<()>>>>,
	capacity: usize,
}

impl RepositoryLockRegistry {
	pub fn new(capacity: usize) -> Self {
		Self {
			locks: Mutex::new(HashMap::new()),
			capacity: capacity.max(1),
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Return the lock for `repo_id`, creating it if needed.
	pub fn get_lock(&self, repo_id: RepositoryId) -> Arc<RwLock<()>> {
		let mut locks = self.locks.lock();
		if let Some(lock) = locks.get(&repo_id) {
			return Arc::clone(lock);
		}

		if locks.len() >= self.capacity {
			let evicted = evict_idle(&mut locks);
			debug!(evicted, remaining = locks.len(), "swept idle repository locks");
			if locks.len() >= self.capacity {
				warn!(
					size = locks.len(),
					capacity = self.capacity,
					"repository lock registry over capacity, all locks in use"
				);
			}
		}

		let lock = Arc::new(RwLock::new(()));
		locks.insert(repo_id, Arc::clone(&lock));
		lock
	}

	/// Run `op` while holding the exclusive lock for `repo_id`.
	pub async fn with_write_lock<F, Fut, T>(&self, repo_id: RepositoryId, op: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let lock = self.get_lock(repo_id);
		let _guard = lock.write().await;
		op().await
	}

	/// Run `op` while holding the shared lock for `repo_id`.
	pub async fn with_read_lock<F, Fut, T>(&self, repo_id: RepositoryId, op: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let lock = self.get_lock(repo_id);
		let _guard = lock.read().await;
		op().await
	}

	pub fn remove_lock(&self, repo_id: RepositoryId) -> bool {
		self.locks.lock().remove(&repo_id).is_some()
	}

	/// Remove the entry for `repo_id` only if `lock` is that entry and nobody
	/// but the registry and the caller holds a reference to it. Call while
	/// still holding the lock so no waiter can slip in between.
	pub fn remove_if_unshared(&self, repo_id: RepositoryId, lock: &Arc<RwLock<()>>) -> bool {
		let mut locks = self.locks.lock();
		let removable = locks
			.get(&repo_id)
			.is_some_and(|existing| Arc::ptr_eq(existing, lock) && Arc::strong_count(lock) == 2);
		if removable {
			locks.remove(&repo_id);
		} else {
			debug!(repo_id, "repository lock still shared, keeping it");
		}
		removable
	}

	pub fn contains(&self, repo_id: RepositoryId) -> bool {
		self.locks.lock().contains_key(&repo_id)
	}

	pub fn len(&self) -> usize {
		self.locks.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Default for RepositoryLockRegistry {
	fn default() -> Self {
		Self::new(DEFAULT_LOCK_CAPACITY)
	}
}

fn is_idle(lock: &Arc<RwLock<()>>) -> bool {
	Arc::strong_count(lock) == 1 && lock.try_write().is_ok()
}

fn evict_idle(locks: &mut HashMap<RepositoryId, Arc<RwLock<()>>>) -> usize {
	let before = locks.len();
	locks.retain(|_, lock| !is_idle(lock));
	before - locks.len()
}
