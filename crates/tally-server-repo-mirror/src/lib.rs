// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Local mirrors of remote git repositories.
//!
//! Each repository lives at `{storage_root}/{repo_id}` and is guarded by a
//! reader/writer lock from a bounded registry. Clones and fetches authenticate
//! with an installation token sent as HTTP Basic credentials.

pub mod error;
pub mod git;
pub mod lock;
pub mod mirror;
pub mod types;
mod walk;

pub use error::{MirrorError, Result};
pub use git::{basic_auth_header, TOKEN_USERNAME};
pub use lock::{RepositoryLockRegistry, DEFAULT_LOCK_CAPACITY};
pub use mirror::RepositoryMirror;
pub use types::{ChangeType, CommitInfo, EnsureOutcome, FileChange, RepositoryId};
pub use walk::split_message;
