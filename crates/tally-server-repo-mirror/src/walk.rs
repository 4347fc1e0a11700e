// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Blocking history queries against a mirrored repository.
//!
//! Everything here runs inside `spawn_blocking` and reads the object database
//! through gix.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use gix::diff::blob::{diff, intern::InternedInput, sink::Counter, Algorithm};
use gix::object::tree::diff::ChangeDetached;
use gix::ObjectId;
use tracing::{debug, warn};

use crate::error::{MirrorError, Result};
use crate::types::{ChangeType, CommitInfo, FileChange};

/// Bytes inspected when deciding whether a blob is binary.
const BINARY_SNIFF_LEN: usize = 8000;

pub(crate) fn open(path: &Path) -> Result<gix::Repository> {
	gix::open(path).map_err(|e| MirrorError::git("failed to open repository", e))
}

/// Resolve a revision to a commit id. Anything that does not name a commit
/// yields `None`.
pub(crate) fn resolve_commit(repo: &gix::Repository, rev: &str) -> Option<ObjectId> {
	let peeled = format!("{rev}^{{commit}}");
	match repo.rev_parse_single(peeled.as_str()) {
		Ok(id) => Some(id.detach()),
		Err(e) => {
			debug!(rev, error = %e, "revision did not resolve");
			None
		}
	}
}

pub(crate) fn resolve_default_branch_head(path: &Path, branch: &str) -> Result<Option<String>> {
	let repo = open(path)?;

	let candidates = [
		format!("refs/remotes/origin/{branch}"),
		format!("refs/heads/{branch}"),
	];
	for name in &candidates {
		match repo.find_reference(name.as_str()) {
			Ok(mut reference) => match reference.peel_to_id_in_place() {
				Ok(id) => return Ok(Some(id.to_string())),
				Err(e) => debug!(reference = %name, error = %e, "reference did not peel"),
			},
			Err(e) => debug!(reference = %name, error = %e, "reference not found"),
		}
	}

	match repo.head_id() {
		Ok(id) => Ok(Some(id.to_string())),
		Err(e) => {
			debug!(error = %e, "HEAD did not resolve");
			Ok(None)
		}
	}
}

pub(crate) fn resolve_commit_emails(path: &Path, shas: &[String]) -> Result<HashMap<String, String>> {
	let repo = open(path)?;
	let mut emails = HashMap::with_capacity(shas.len());

	for sha in shas {
		match author_email(&repo, sha) {
			Ok(email) => {
				emails.insert(sha.clone(), email);
			}
			Err(e) => debug!(sha = %sha, error = %e, "skipping unresolvable commit"),
		}
	}

	Ok(emails)
}

fn author_email(repo: &gix::Repository, sha: &str) -> Result<String> {
	let id = ObjectId::from_hex(sha.as_bytes()).map_err(|e| MirrorError::git("invalid sha", e))?;
	let commit = repo
		.find_object(id)
		.map_err(|e| MirrorError::git("object not found", e))?
		.try_into_commit()
		.map_err(|e| MirrorError::git("not a commit", e))?;
	let decoded = commit
		.decode()
		.map_err(|e| MirrorError::git("failed to decode commit", e))?;
	Ok(decoded.author.email.to_string())
}

/// Commits reachable from `to` but not from `from`, newest first.
pub(crate) fn walk_commits(path: &Path, from: Option<&str>, to: &str) -> Result<Vec<CommitInfo>> {
	let repo = open(path)?;

	let Some(to_id) = resolve_commit(&repo, to) else {
		debug!(to, "upper bound did not resolve, nothing to walk");
		return Ok(Vec::new());
	};

	let from_id = match from {
		Some(rev) => Some(
			resolve_commit(&repo, rev)
				.ok_or_else(|| MirrorError::Git(format!("lower bound {rev} did not resolve")))?,
		),
		None => None,
	};

	let ids = reachable_commits(&repo, to_id, from_id)?;
	let mut commits = Vec::with_capacity(ids.len());
	for id in ids {
		commits.push(commit_info(&repo, id)?);
	}
	commits.sort_by(|a, b| b.committed_at.cmp(&a.committed_at));
	Ok(commits)
}

/// Ids reachable from `to`, with `from` and its ancestors hidden.
fn reachable_commits(
	repo: &gix::Repository,
	to: ObjectId,
	from: Option<ObjectId>,
) -> Result<Vec<ObjectId>> {
	let walk = repo
		.rev_walk([to])
		.with_hidden(from)
		.all()
		.map_err(|e| MirrorError::git("failed to start commit walk", e))?;

	walk.map(|info| {
		info.map(|info| info.id)
			.map_err(|e| MirrorError::git("commit walk failed", e))
	})
	.collect()
}

fn commit_info(repo: &gix::Repository, id: ObjectId) -> Result<CommitInfo> {
	let commit = repo
		.find_object(id)
		.map_err(|e| MirrorError::git("commit not found", e))?
		.try_into_commit()
		.map_err(|e| MirrorError::git("not a commit", e))?;
	let decoded = commit
		.decode()
		.map_err(|e| MirrorError::git("failed to decode commit", e))?;

	let parents: Vec<ObjectId> = decoded.parents().collect();
	let message = decoded.message.to_string();
	let author_name = decoded.author.name.to_string();
	let author_email = decoded.author.email.to_string();
	let authored_at = timestamp(
		decoded
			.author
			.time()
			.map_err(|e| MirrorError::git("failed to decode commit", e))?
			.seconds,
	);
	let committer_name = decoded.committer.name.to_string();
	let committer_email = decoded.committer.email.to_string();
	let committed_at = timestamp(
		decoded
			.committer
			.time()
			.map_err(|e| MirrorError::git("failed to decode commit", e))?
			.seconds,
	);

	let file_changes = file_changes(repo, &commit, parents.first().copied())?;
	let additions = file_changes.iter().map(|f| f.additions).sum();
	let deletions = file_changes.iter().map(|f| f.deletions).sum();
	let (_, message_body) = split_message(&message);

	Ok(CommitInfo {
		sha: id.to_string(),
		parent_shas: parents.iter().map(|p| p.to_string()).collect(),
		message_body,
		message,
		author_name,
		author_email,
		authored_at,
		committer_name,
		committer_email,
		committed_at,
		additions,
		deletions,
		changed_files: file_changes.len(),
		file_changes,
	})
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
	DateTime::from_timestamp(seconds, 0).unwrap_or_default()
}

/// Split a commit message into its title and optional body.
///
/// The title is the first paragraph with its lines joined by spaces. The body
/// is whatever follows the first blank line, trimmed; an empty body is `None`.
pub fn split_message(message: &str) -> (String, Option<String>) {
	let message = message.trim_start_matches(['\n', '\r']);
	let mut title_lines = Vec::new();
	let mut rest = "";

	let mut remaining = message;
	while !remaining.is_empty() {
		let (line, tail) = match remaining.find('\n') {
			Some(idx) => (&remaining[..idx], &remaining[idx + 1..]),
			None => (remaining, ""),
		};
		let line = line.trim_end_matches('\r');
		if line.trim().is_empty() {
			rest = tail;
			break;
		}
		title_lines.push(line.trim());
		remaining = tail;
	}

	let body = rest.trim();
	let body = (!body.is_empty()).then(|| body.to_string());
	(title_lines.join(" "), body)
}

/// A file-level entry of a tree-to-tree diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TreeChange {
	pub change_type: ChangeType,
	pub path: String,
	pub previous_path: Option<String>,
	pub old_id: Option<ObjectId>,
	pub new_id: Option<ObjectId>,
}

/// Diff a commit's tree against its first parent's tree, or the empty tree
/// for a root commit, with rename tracking.
pub(crate) fn tree_changes(
	repo: &gix::Repository,
	commit: &gix::Commit<'_>,
	first_parent: Option<ObjectId>,
) -> Result<Vec<TreeChange>> {
	let new_tree = commit
		.tree()
		.map_err(|e| MirrorError::git("failed to read commit tree", e))?;
	let old_tree = match first_parent {
		Some(parent) => repo
			.find_object(parent)
			.map_err(|e| MirrorError::git("parent commit not found", e))?
			.try_into_commit()
			.map_err(|e| MirrorError::git("parent is not a commit", e))?
			.tree()
			.map_err(|e| MirrorError::git("failed to read parent tree", e))?,
		None => repo.empty_tree(),
	};

	let mut options = gix::diff::Options::default();
	options
		.track_path()
		.with_rewrites(Some(gix::diff::Rewrites::default()));

	let changes = repo
		.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), options)
		.map_err(|e| MirrorError::git("tree diff failed", e))?;

	Ok(changes.into_iter().filter_map(classify).collect())
}

/// Map a gix change to a file change. Tree entries are dropped; their
/// contents show up as separate entries.
fn classify(change: ChangeDetached) -> Option<TreeChange> {
	match change {
		ChangeDetached::Addition {
			location,
			entry_mode,
			id,
			..
		} => (!entry_mode.is_tree()).then(|| TreeChange {
			change_type: ChangeType::Added,
			path: location.to_string(),
			previous_path: None,
			old_id: None,
			new_id: Some(id),
		}),
		ChangeDetached::Deletion {
			location,
			entry_mode,
			id,
			..
		} => (!entry_mode.is_tree()).then(|| TreeChange {
			change_type: ChangeType::Removed,
			path: location.to_string(),
			previous_path: None,
			old_id: Some(id),
			new_id: None,
		}),
		ChangeDetached::Modification {
			location,
			previous_entry_mode,
			previous_id,
			entry_mode,
			id,
			..
		} => {
			if entry_mode.is_tree() && previous_entry_mode.is_tree() {
				return None;
			}
			let change_type = if previous_entry_mode.kind() == entry_mode.kind() {
				ChangeType::Modified
			} else {
				ChangeType::Changed
			};
			Some(TreeChange {
				change_type,
				path: location.to_string(),
				previous_path: None,
				old_id: Some(previous_id),
				new_id: Some(id),
			})
		}
		ChangeDetached::Rewrite {
			source_location,
			source_id,
			entry_mode,
			id,
			location,
			copy,
			..
		} => (!entry_mode.is_tree()).then(|| TreeChange {
			change_type: if copy {
				ChangeType::Copied
			} else {
				ChangeType::Renamed
			},
			path: location.to_string(),
			previous_path: Some(source_location.to_string()),
			old_id: Some(source_id),
			new_id: Some(id),
		}),
	}
}

fn file_changes(
	repo: &gix::Repository,
	commit: &gix::Commit<'_>,
	first_parent: Option<ObjectId>,
) -> Result<Vec<FileChange>> {
	let changes = tree_changes(repo, commit, first_parent)?;

	Ok(changes
		.into_iter()
		.map(|change| {
			let (additions, deletions) = match line_counts(repo, change.old_id, change.new_id) {
				Ok(counts) => counts,
				Err(e) => {
					warn!(commit = %commit.id, file = %change.path, error = %e, "line counting failed");
					(0, 0)
				}
			};
			FileChange {
				filename: change.path,
				change_type: change.change_type,
				additions,
				deletions,
				changes: additions + deletions,
				previous_filename: change.previous_path,
			}
		})
		.collect())
}

fn blob_bytes(repo: &gix::Repository, id: Option<ObjectId>) -> Result<Vec<u8>> {
	let Some(id) = id else {
		return Ok(Vec::new());
	};
	let object = repo
		.find_object(id)
		.map_err(|e| MirrorError::git("blob not found", e))?;
	if object.kind != gix::object::Kind::Blob {
		return Err(MirrorError::Git(format!("{id} is not a blob")));
	}
	Ok(object.detach().data)
}

fn is_binary(data: &[u8]) -> bool {
	data.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

/// Lines added and removed between two blobs. Binary content counts as zero.
fn line_counts(
	repo: &gix::Repository,
	old: Option<ObjectId>,
	new: Option<ObjectId>,
) -> Result<(u32, u32)> {
	let old = blob_bytes(repo, old)?;
	let new = blob_bytes(repo, new)?;
	Ok(count_lines(&old, &new))
}

pub(crate) fn count_lines(old: &[u8], new: &[u8]) -> (u32, u32) {
	if is_binary(old) || is_binary(new) {
		return (0, 0);
	}
	let input = InternedInput::new(old, new);
	let counter = diff(Algorithm::Histogram, &input, Counter::default());
	(counter.insertions, counter.removals)
}
