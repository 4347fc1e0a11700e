// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tally_common_config::SecretString;
use tracing::{debug, info, instrument, warn};

use crate::error::{MirrorError, Result};
use crate::git::run_git;
use crate::lock::{RepositoryLockRegistry, DEFAULT_LOCK_CAPACITY};
use crate::types::{CommitInfo, EnsureOutcome, RepositoryId};
use crate::walk;

/// Local clones of remote repositories, one directory per repository id
/// under a storage root.
pub struct RepositoryMirror {
	storage_root: PathBuf,
	enabled: bool,
	locks: RepositoryLockRegistry,
}

impl RepositoryMirror {
	pub fn new(storage_root: impl Into<PathBuf>, enabled: bool) -> Self {
		Self {
			storage_root: storage_root.into(),
			enabled,
			locks: RepositoryLockRegistry::new(DEFAULT_LOCK_CAPACITY),
		}
	}

	pub fn with_lock_capacity(mut self, capacity: usize) -> Self {
		self.locks = RepositoryLockRegistry::new(capacity);
		self
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	pub fn storage_root(&self) -> &Path {
		&self.storage_root
	}

	pub fn lock_registry(&self) -> &RepositoryLockRegistry {
		&self.locks
	}

	pub fn repository_path(&self, repo_id: RepositoryId) -> PathBuf {
		self.storage_root.join(repo_id.to_string())
	}

	/// True when the repository directory holds a working-copy clone or a
	/// bare repository.
	pub fn is_repository_cloned(&self, repo_id: RepositoryId) -> bool {
		is_git_dir(&self.repository_path(repo_id))
	}

	/// Clone the repository if it is not present locally, otherwise fetch all
	/// remote branches and prune deleted ones.
	#[instrument(skip(self, clone_url, token))]
	pub async fn ensure_repository(
		&self,
		repo_id: RepositoryId,
		clone_url: &str,
		token: Option<&SecretString>,
	) -> Result<EnsureOutcome> {
		if !self.enabled {
			return Err(MirrorError::Disabled);
		}

		let path = self.repository_path(repo_id);
		let path = path.as_path();
		self.locks
			.with_write_lock(repo_id, move || async move {
				if is_git_dir(path) {
					fetch(path, token).await?;
					info!(repo_id, "fetched repository");
					Ok(EnsureOutcome::Fetched)
				} else {
					clone(path, clone_url, token).await?;
					info!(repo_id, path = %path.display(), "cloned repository");
					Ok(EnsureOutcome::Cloned)
				}
			})
			.await
	}

	/// Remove the local clone and forget its lock unless other callers are
	/// queued on it. Missing clones are not an error.
	#[instrument(skip(self))]
	pub async fn delete_clone(&self, repo_id: RepositoryId) -> Result<()> {
		if !self.enabled {
			return Err(MirrorError::Disabled);
		}

		let path = self.repository_path(repo_id);
		let lock = self.locks.get_lock(repo_id);
		let _guard = lock.write().await;

		match tokio::fs::remove_dir_all(&path).await {
			Ok(()) => info!(repo_id, "deleted clone"),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(MirrorError::Io(e)),
		}
		self.locks.remove_if_unshared(repo_id, &lock);
		Ok(())
	}

	/// Head commit of `branch`, preferring the remote-tracking ref, then a
	/// local branch, then `HEAD`.
	pub async fn resolve_default_branch_head(
		&self,
		repo_id: RepositoryId,
		branch: &str,
	) -> Result<Option<String>> {
		if !self.readable(repo_id) {
			return Ok(None);
		}

		let path = self.repository_path(repo_id);
		let branch = branch.to_string();
		self.locks
			.with_read_lock(repo_id, || {
				blocking(move || walk::resolve_default_branch_head(&path, &branch))
			})
			.await
	}

	/// Author email for each sha that resolves to a commit. Unknown shas are
	/// left out of the result.
	pub async fn resolve_commit_emails(
		&self,
		repo_id: RepositoryId,
		shas: &[String],
	) -> Result<HashMap<String, String>> {
		if shas.is_empty() || !self.readable(repo_id) {
			return Ok(HashMap::new());
		}

		let path = self.repository_path(repo_id);
		let shas = shas.to_vec();
		self.locks
			.with_read_lock(repo_id, || {
				blocking(move || walk::resolve_commit_emails(&path, &shas))
			})
			.await
	}

	/// Commits reachable from `to` and not from `from`, newest first, each
	/// with per-file changes against its first parent.
	#[instrument(skip(self))]
	pub async fn walk_commits(
		&self,
		repo_id: RepositoryId,
		from: Option<&str>,
		to: &str,
	) -> Result<Vec<CommitInfo>> {
		if !self.readable(repo_id) {
			return Ok(Vec::new());
		}

		let path = self.repository_path(repo_id);
		let from = from.map(str::to_string);
		let to = to.to_string();
		let commits = self
			.locks
			.with_read_lock(repo_id, || {
				blocking(move || walk::walk_commits(&path, from.as_deref(), &to))
			})
			.await?;
		debug!(repo_id, count = commits.len(), "walked commits");
		Ok(commits)
	}

	/// Ids of every repository with a clone under the storage root.
	pub async fn list_cloned_repositories(&self) -> Result<Vec<RepositoryId>> {
		if !self.enabled {
			return Ok(Vec::new());
		}

		let mut entries = match tokio::fs::read_dir(&self.storage_root).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(MirrorError::Io(e)),
		};

		let mut ids = Vec::new();
		while let Some(entry) = entries.next_entry().await? {
			let Some(id) = entry
				.file_name()
				.to_str()
				.and_then(|name| name.parse::<RepositoryId>().ok())
			else {
				continue;
			};
			if is_git_dir(&entry.path()) {
				ids.push(id);
			}
		}
		ids.sort_unstable();
		Ok(ids)
	}

	fn readable(&self, repo_id: RepositoryId) -> bool {
		if !self.enabled {
			return false;
		}
		let cloned = self.is_repository_cloned(repo_id);
		if !cloned {
			debug!(repo_id, "repository not cloned");
		}
		cloned
	}
}

fn is_git_dir(path: &Path) -> bool {
	path.join(".git").join("HEAD").exists() || path.join("HEAD").exists()
}

async fn blocking<T, F>(f: F) -> Result<T>
where
	F: FnOnce() -> Result<T> + Send + 'static,
	T: Send + 'static,
{
	tokio::task::spawn_blocking(f)
		.await
		.map_err(|e| MirrorError::git("blocking task failed", e))?
}

async fn clone(path: &Path, clone_url: &str, token: Option<&SecretString>) -> Result<()> {
	if path.exists() {
		warn!(path = %path.display(), "removing incomplete clone directory");
		tokio::fs::remove_dir_all(path).await?;
	}
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}

	let target = path.to_string_lossy();
	let result = run_git(None, &["clone", "--", clone_url, target.as_ref()], token).await;
	if result.is_err() && path.exists() {
		if let Err(e) = tokio::fs::remove_dir_all(path).await {
			warn!(path = %path.display(), error = %e, "failed to clean up after failed clone");
		}
	}
	result.map(|_| ())
}

async fn fetch(path: &Path, token: Option<&SecretString>) -> Result<()> {
	run_git(Some(path), &["fetch", "--prune", "origin"], token)
		.await
		.map(|_| ())
}
