// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

/// Installations known to be suspended. Clones share one set.
#[derive(Debug, Clone, Default)]
pub struct SuspensionTracker {
	suspended: Arc<RwLock<HashSet<i64>>>,
}

impl SuspensionTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true if the installation was not already marked.
	pub fn mark_suspended(&self, installation_id: i64) -> bool {
		let added = self.suspended.write().insert(installation_id);
		if added {
			info!(installation_id, "installation marked suspended");
		}
		added
	}

	/// Returns true if the installation had been marked suspended.
	pub fn mark_active(&self, installation_id: i64) -> bool {
		let removed = self.suspended.write().remove(&installation_id);
		if removed {
			info!(installation_id, "installation marked active");
		}
		removed
	}

	pub fn is_suspended(&self, installation_id: i64) -> bool {
		self.suspended.read().contains(&installation_id)
	}

	/// Sorted snapshot.
	pub fn suspended_ids(&self) -> Vec<i64> {
		let mut ids: Vec<i64> = self.suspended.read().iter().copied().collect();
		ids.sort_unstable();
		ids
	}

	pub fn len(&self) -> usize {
		self.suspended.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.suspended.read().is_empty()
	}
}
