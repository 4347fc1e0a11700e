// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RepositoryId = i64;

/// What [`crate::RepositoryMirror::ensure_repository`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureOutcome {
	Cloned,
	Fetched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
	Added,
	Modified,
	Removed,
	Renamed,
	Copied,
	/// File type changed, e.g. regular file to symlink.
	Changed,
	Unknown,
}

impl ChangeType {
	/// Map a `git diff --raw` status letter.
	pub fn from_status(status: u8) -> Self {
		match status {
			b'A' => ChangeType::Added,
			b'M' => ChangeType::Modified,
			b'D' => ChangeType::Removed,
			b'R' => ChangeType::Renamed,
			b'C' => ChangeType::Copied,
			b'T' => ChangeType::Changed,
			_ => ChangeType::Unknown,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
	pub filename: String,
	pub change_type: ChangeType,
	pub additions: u32,
	pub deletions: u32,
	pub changes: u32,
	/// Source path for renames and copies.
	pub previous_filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
	pub sha: String,
	pub parent_shas: Vec<String>,
	/// Full commit message.
	pub message: String,
	/// Everything after the title paragraph, if anything.
	pub message_body: Option<String>,
	pub author_name: String,
	pub author_email: String,
	pub authored_at: DateTime<Utc>,
	pub committer_name: String,
	pub committer_email: String,
	pub committed_at: DateTime<Utc>,
	pub additions: u32,
	pub deletions: u32,
	pub changed_files: usize,
	pub file_changes: Vec<FileChange>,
}
