// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `VAR` / `VAR_FILE` secret loading, as used by container secret mounts.

use std::path::PathBuf;
use std::{env, fs};

use thiserror::Error;

use crate::secret::SecretString;

#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("failed to read secret file at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("secret file path in {var} is empty")]
	EmptyPath { var: String },
}

/// Load `var` as a secret.
///
/// `{var}_FILE` wins over `{var}`. File contents lose exactly one trailing
/// newline (`\n` or `\r\n`). Returns `Ok(None)` when neither is set.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, SecretEnvError> {
	let file_var = format!("{var}_FILE");

	if let Ok(path) = env::var(&file_var) {
		if path.trim().is_empty() {
			return Err(SecretEnvError::EmptyPath { var: file_var });
		}
		let path = PathBuf::from(path);
		let mut contents = fs::read_to_string(&path).map_err(|source| SecretEnvError::Io {
			path: path.clone(),
			source,
		})?;
		strip_one_newline(&mut contents);
		tracing::debug!(var = %file_var, path = %path.display(), "loaded secret from file");
		return Ok(Some(SecretString::new(contents)));
	}

	match env::var(var) {
		Ok(value) => Ok(Some(SecretString::new(value))),
		Err(_) => Ok(None),
	}
}

fn strip_one_newline(value: &mut String) {
	if value.ends_with("\r\n") {
		value.truncate(value.len() - 2);
	} else if value.ends_with('\n') {
		value.truncate(value.len() - 1);
	}
}
