// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Error, Debug)]
pub enum MirrorError {
	#[error("repository mirroring is disabled")]
	Disabled,

	#[error("git not found in PATH")]
	GitNotInstalled,

	#[error("git operation failed: {0}")]
	Git(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

impl MirrorError {
	pub(crate) fn git(context: &str, err: impl std::fmt::Display) -> Self {
		MirrorError::Git(format!("{context}: {err}"))
	}
}
