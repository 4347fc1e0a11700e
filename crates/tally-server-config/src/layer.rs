// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration produced by a single source.

use serde::Deserialize;

use crate::sections::{GitHubAppConfigLayer, LoggingConfigLayer, MirrorConfigLayer};

/// Every section optional so sources can be stacked.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub github_app: Option<GitHubAppConfigLayer>,
	#[serde(default)]
	pub mirror: Option<MirrorConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	/// Overlay `other` onto `self`; set fields in `other` win.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(
			&mut self.github_app,
			other.github_app,
			GitHubAppConfigLayer::merge,
		);
		merge_option(&mut self.mirror, other.mirror, MirrorConfigLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(b), Some(o)) => merge(b, o),
		(None, Some(o)) => *base = Some(o),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_full_toml() {
		let layer: ServerConfigLayer = toml::from_str(
			r#"
[github_app]
app_id = 42
private_key_path = "/run/secrets/app.pem"

[mirror]
enabled = true
storage_path = "/srv/mirrors"
lock_capacity = 64

[logging]
level = "debug"
format = "json"
"#,
		)
		.unwrap();

		let gh = layer.github_app.unwrap();
		assert_eq!(gh.app_id, Some(42));
		assert_eq!(
			gh.private_key_path.as_deref(),
			Some(std::path::Path::new("/run/secrets/app.pem"))
		);
		let mirror = layer.mirror.unwrap();
		assert_eq!(mirror.enabled, Some(true));
		assert_eq!(mirror.lock_capacity, Some(64));
		assert_eq!(layer.logging.unwrap().level.as_deref(), Some("debug"));
	}

	#[test]
	fn merge_fills_missing_sections_and_overrides_fields() {
		let mut base: ServerConfigLayer = toml::from_str(
			r#"
[mirror]
enabled = false
storage_path = "/a"
"#,
		)
		.unwrap();
		let overlay: ServerConfigLayer = toml::from_str(
			r#"
[mirror]
enabled = true

[logging]
level = "warn"
"#,
		)
		.unwrap();

		base.merge(overlay);
		let mirror = base.mirror.unwrap();
		assert_eq!(mirror.enabled, Some(true));
		assert_eq!(mirror.storage_path.unwrap().to_str(), Some("/a"));
		assert_eq!(base.logging.unwrap().level.as_deref(), Some("warn"));
		assert!(base.github_app.is_none());
	}
}
