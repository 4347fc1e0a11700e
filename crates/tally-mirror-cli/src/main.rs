// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Operator CLI for installation credentials and repository mirrors.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tally_common_http::{retry, RetryConfig};
use tally_server_config::{LogFormat, PrivateKeySource, ServerConfig};
use tally_server_github_app::{GithubAppConfig, InstallationCredentialManager, KeySource};
use tally_server_repo_mirror::RepositoryMirror;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
	name = "tally-mirror",
	about = "Manage GitHub App installation tokens and local repository mirrors",
	version
)]
struct Cli {
	/// Config file (defaults to /etc/tally/server.toml)
	#[arg(long, global = true, env = "TALLY_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print a signed app assertion JWT
	Assertion,
	/// Mint (or reuse) an installation access token
	Token {
		#[arg(long)]
		installation: i64,
	},
	/// Ask GitHub whether an installation is suspended
	Suspended {
		#[arg(long)]
		installation: i64,
	},
	/// Clone a repository, or fetch it if already mirrored
	Ensure {
		#[arg(long)]
		repo: i64,
		/// Clone URL, e.g. https://github.com/owner/name.git
		#[arg(long)]
		url: String,
		/// Authenticate with this installation's token
		#[arg(long)]
		installation: Option<i64>,
	},
	/// Resolve the head commit of a branch
	Head {
		#[arg(long)]
		repo: i64,
		#[arg(long, default_value = "main")]
		branch: String,
	},
	/// List commits reachable from --to and not from --from
	Walk {
		#[arg(long)]
		repo: i64,
		#[arg(long)]
		from: Option<String>,
		#[arg(long)]
		to: String,
	},
	/// Look up author emails for commits
	Emails {
		#[arg(long)]
		repo: i64,
		shas: Vec<String>,
	},
	/// Delete a local mirror
	Delete {
		#[arg(long)]
		repo: i64,
	},
	/// List mirrored repository ids
	List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let config = match &cli.config {
		Some(path) => tally_server_config::load_config_with_file(path)?,
		None => tally_server_config::load_config()?,
	};
	init_tracing(&config);

	let output = run(cli.command, &config).await?;
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}

fn init_tracing(config: &ServerConfig) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
	let registry = tracing_subscriber::registry().with(filter);

	match config.logging.format {
		LogFormat::Json => registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.with_writer(std::io::stderr),
			)
			.init(),
		LogFormat::Pretty => registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init(),
	}
}

async fn run(command: Command, config: &ServerConfig) -> anyhow::Result<serde_json::Value> {
	match command {
		Command::Assertion => {
			let manager = credential_manager(config)?;
			let assertion = manager.generate_app_assertion()?;
			Ok(json!({ "assertion": assertion.expose() }))
		}
		Command::Token { installation } => {
			let manager = credential_manager(config)?;
			let view = retry(&RetryConfig::default(), || {
				manager.get_installation_token_details(installation)
			})
			.await?;
			Ok(json!({
				"installation_id": installation,
				"token": view.token.expose(),
				"expires_at": view.expires_at,
			}))
		}
		Command::Suspended { installation } => {
			let manager = credential_manager(config)?;
			let suspended = manager.is_installation_suspended(installation).await?;
			Ok(json!({ "installation_id": installation, "suspended": suspended }))
		}
		Command::Ensure {
			repo,
			url,
			installation,
		} => {
			let token = match installation {
				Some(id) => {
					let manager = credential_manager(config)?;
					let token = retry(&RetryConfig::default(), || {
						manager.get_installation_token(id)
					})
					.await
					.with_context(|| format!("failed to get token for installation {id}"))?;
					Some(token)
				}
				None => None,
			};
			let outcome = mirror(config)
				.ensure_repository(repo, &url, token.as_ref())
				.await?;
			Ok(json!({ "repo_id": repo, "outcome": outcome }))
		}
		Command::Head { repo, branch } => {
			let head = mirror(config)
				.resolve_default_branch_head(repo, &branch)
				.await?;
			Ok(json!({ "repo_id": repo, "branch": branch, "sha": head }))
		}
		Command::Walk { repo, from, to } => {
			let commits = mirror(config)
				.walk_commits(repo, from.as_deref(), &to)
				.await?;
			Ok(serde_json::to_value(commits)?)
		}
		Command::Emails { repo, shas } => {
			let emails = mirror(config).resolve_commit_emails(repo, &shas).await?;
			Ok(serde_json::to_value(emails)?)
		}
		Command::Delete { repo } => {
			mirror(config).delete_clone(repo).await?;
			Ok(json!({ "repo_id": repo, "deleted": true }))
		}
		Command::List => {
			let ids = mirror(config).list_cloned_repositories().await?;
			Ok(serde_json::to_value(ids)?)
		}
	}
}

fn credential_manager(config: &ServerConfig) -> anyhow::Result<InstallationCredentialManager> {
	let github = match &config.github_app {
		Some(app) => {
			let key = match &app.private_key {
				PrivateKeySource::Pem(pem) => KeySource::Inline(pem.clone()),
				PrivateKeySource::File(path) => KeySource::File(path.clone()),
			};
			GithubAppConfig::new(app.app_id, key).with_base_url(&app.base_url)?
		}
		None => {
			tracing::warn!("no GitHub App configured, requests will be signed with an ephemeral key");
			GithubAppConfig::unconfigured()
		}
	};
	Ok(InstallationCredentialManager::new(github)?)
}

fn mirror(config: &ServerConfig) -> RepositoryMirror {
	RepositoryMirror::new(&config.mirror.storage_path, config.mirror.enabled)
		.with_lock_capacity(config.mirror.lock_capacity)
}
