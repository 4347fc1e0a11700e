// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Repository mirror section.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_STORAGE_PATH: &str = "/data/git-repos";
pub const DEFAULT_LOCK_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MirrorConfigLayer {
	pub enabled: Option<bool>,
	pub storage_path: Option<PathBuf>,
	pub lock_capacity: Option<usize>,
}

impl MirrorConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.storage_path.is_some() {
			self.storage_path = other.storage_path;
		}
		if other.lock_capacity.is_some() {
			self.lock_capacity = other.lock_capacity;
		}
	}

	pub fn finalize(self) -> Result<MirrorConfig, ConfigError> {
		let lock_capacity = self.lock_capacity.unwrap_or(DEFAULT_LOCK_CAPACITY);
		if lock_capacity == 0 {
			return Err(ConfigError::InvalidValue {
				key: "mirror.lock_capacity".to_string(),
				message: "must be greater than zero".to_string(),
			});
		}

		Ok(MirrorConfig {
			enabled: self.enabled.unwrap_or(false),
			storage_path: self
				.storage_path
				.unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH)),
			lock_capacity,
		})
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MirrorConfig {
	pub enabled: bool,
	pub storage_path: PathBuf,
	pub lock_capacity: usize,
}

impl Default for MirrorConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
			lock_capacity: DEFAULT_LOCK_CAPACITY,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_disabled() {
		let config = MirrorConfigLayer::default().finalize().unwrap();
		assert_eq!(config, MirrorConfig::default());
		assert!(!config.enabled);
	}

	#[test]
	fn zero_capacity_is_invalid() {
		let layer = MirrorConfigLayer {
			lock_capacity: Some(0),
			..Default::default()
		};
		assert!(matches!(
			layer.finalize(),
			Err(ConfigError::InvalidValue { .. })
		));
	}

	#[test]
	fn merge_keeps_unset_fields() {
		let mut base = MirrorConfigLayer {
			storage_path: Some(PathBuf::from("/srv/git")),
			lock_capacity: Some(10),
			..Default::default()
		};
		base.merge(MirrorConfigLayer {
			enabled: Some(true),
			..Default::default()
		});
		let config = base.finalize().unwrap();
		assert!(config.enabled);
		assert_eq!(config.storage_path, PathBuf::from("/srv/git"));
		assert_eq!(config.lock_capacity, 10);
	}
}
