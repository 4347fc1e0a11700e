// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Thin wrapper around the `git` executable for clone and fetch.

use std::path::Path;
use std::process::{Command, Output, Stdio};

use base64::{engine::general_purpose::STANDARD, Engine};
use tally_common_config::SecretString;
use tracing::{debug, instrument};

use crate::error::{MirrorError, Result};

/// Username GitHub expects when an installation token is used for git over
/// HTTPS.
pub const TOKEN_USERNAME: &str = "x-access-token";

/// `Authorization` header value for an installation token.
pub fn basic_auth_header(token: &str) -> String {
	let encoded = STANDARD.encode(format!("{TOKEN_USERNAME}:{token}"));
	format!("Authorization: Basic {encoded}")
}

fn git_command(dir: Option<&Path>, args: &[&str], token: Option<&SecretString>) -> Command {
	let mut cmd = Command::new("git");
	if let Some(dir) = dir {
		cmd.arg("-C").arg(dir);
	}
	// Config from the environment stays out of the process argument list.
	if let Some(token) = token.filter(|t| !t.is_empty()) {
		cmd.env("GIT_CONFIG_COUNT", "1")
			.env("GIT_CONFIG_KEY_0", "http.extraHeader")
			.env("GIT_CONFIG_VALUE_0", basic_auth_header(token.expose()));
	}
	cmd.args(args)
		.env("GIT_TERMINAL_PROMPT", "0")
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped());
	cmd
}

fn check_output(subcommand: &str, output: std::io::Result<Output>) -> Result<Vec<u8>> {
	let output = output.map_err(|e| {
		if e.kind() == std::io::ErrorKind::NotFound {
			MirrorError::GitNotInstalled
		} else {
			MirrorError::Io(e)
		}
	})?;

	if output.status.success() {
		Ok(output.stdout)
	} else {
		let stderr = String::from_utf8_lossy(&output.stderr);
		Err(MirrorError::Git(format!(
			"git {subcommand} exited with {}: {}",
			output.status,
			stderr.trim()
		)))
	}
}

/// Run git asynchronously. The token, when present, is handed to git as an
/// extra HTTP header through its environment.
#[instrument(skip(args, token), fields(subcommand = args.first().copied().unwrap_or("")))]
pub(crate) async fn run_git(
	dir: Option<&Path>,
	args: &[&str],
	token: Option<&SecretString>,
) -> Result<Vec<u8>> {
	let subcommand = args.first().copied().unwrap_or("");
	debug!("running git");
	let cmd = git_command(dir, args, token);
	let output = tokio::process::Command::from(cmd).output().await;
	check_output(subcommand, output)
}
