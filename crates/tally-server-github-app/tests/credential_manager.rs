// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::RsaPrivateKey;
use serde::Deserialize;
use serde_json::json;
use tally_common_config::SecretString;
use tally_common_http::RetryableError;
use tally_server_github_app::{
	GithubAppConfig, GithubAppError, InstallationCredentialManager, KeySource,
};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APP_ID: u64 = 31337;

fn fixture_key() -> &'static RsaPrivateKey {
	static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
	KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
}

fn manager_for(server: &MockServer) -> InstallationCredentialManager {
	let pem = fixture_key().to_pkcs1_pem(LineEnding::LF).unwrap();
	let config = GithubAppConfig::new(APP_ID, KeySource::Inline(SecretString::new(pem.to_string())))
		.with_base_url(&server.uri())
		.unwrap();
	InstallationCredentialManager::new(config).unwrap()
}

fn expires_in(secs: i64) -> String {
	(Utc::now() + chrono::Duration::seconds(secs)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn token_body(token: &str, secs: i64) -> serde_json::Value {
	json!({
		"token": token,
		"expires_at": expires_in(secs),
		"permissions": {"contents": "read", "metadata": "read"},
		"repository_selection": "all"
	})
}

#[derive(Debug, Deserialize)]
struct Claims {
	iat: i64,
	exp: i64,
	iss: String,
}

#[tokio::test]
async fn mints_once_then_serves_from_cache() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/app/installations/42/access_tokens"))
		.and(header("accept", "application/vnd.github+json"))
		.and(header("x-github-api-version", "2022-11-28"))
		.and(header_exists("authorization"))
		.and(header_exists("user-agent"))
		.respond_with(ResponseTemplate::new(201).set_body_json(token_body("ghs_first", 3600)))
		.expect(1)
		.mount(&server)
		.await;

	let manager = manager_for(&server);
	let first = manager.get_installation_token(42).await.unwrap();
	let second = manager.get_installation_token(42).await.unwrap();
	assert_eq!(first.expose(), "ghs_first");
	assert_eq!(first, second);

	let details = manager.get_installation_token_details(42).await.unwrap();
	assert!(details.expires_at > Utc::now() + chrono::Duration::minutes(50));
}

#[tokio::test]
async fn mint_request_carries_a_verifiable_app_assertion() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/app/installations/7/access_tokens"))
		.respond_with(ResponseTemplate::new(201).set_body_json(token_body("ghs_x", 3600)))
		.mount(&server)
		.await;

	let manager = manager_for(&server);
	manager.get_installation_token(7).await.unwrap();

	let requests = server.received_requests().await.unwrap();
	assert_eq!(requests.len(), 1);
	let auth = requests[0]
		.headers
		.get("authorization")
		.unwrap()
		.to_str()
		.unwrap()
		.to_string();
	let jwt = auth.strip_prefix("Bearer ").unwrap();

	let public_pem = fixture_key()
		.to_public_key()
		.to_pkcs1_pem(LineEnding::LF)
		.unwrap();
	let mut validation = Validation::new(Algorithm::RS256);
	validation.required_spec_claims.clear();
	let claims = decode::<Claims>(
		jwt,
		&DecodingKey::from_rsa_pem(public_pem.as_bytes()).unwrap(),
		&validation,
	)
	.unwrap()
	.claims;
	assert_eq!(claims.iss, APP_ID.to_string());
	assert_eq!(claims.exp - claims.iat, 600);
}

#[tokio::test]
async fn not_found_is_reported_and_not_cached() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/app/installations/404/access_tokens"))
		.respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
		.expect(2)
		.mount(&server)
		.await;

	let manager = manager_for(&server);
	for _ in 0..2 {
		let err = manager.get_installation_token(404).await.unwrap_err();
		assert!(matches!(
			err,
			GithubAppError::InstallationNotFound {
				installation_id: 404
			}
		));
	}
	assert!(!manager.suspension_tracker().is_suspended(404));
}

#[tokio::test]
async fn forbidden_marks_suspended_and_stops_calling_github() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/app/installations/9/access_tokens"))
		.respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "suspended"})))
		.up_to_n_times(1)
		.expect(1)
		.mount(&server)
		.await;

	let manager = manager_for(&server);
	let err = manager.get_installation_token(9).await.unwrap_err();
	assert!(matches!(
		err,
		GithubAppError::InstallationSuspended { installation_id: 9 }
	));
	assert!(manager.suspension_tracker().is_suspended(9));

	let again = manager.get_installation_token(9).await.unwrap_err();
	assert!(matches!(again, GithubAppError::InstallationSuspended { .. }));
	assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn reactivated_installation_mints_again() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/app/installations/9/access_tokens"))
		.respond_with(ResponseTemplate::new(201).set_body_json(token_body("ghs_back", 3600)))
		.expect(1)
		.mount(&server)
		.await;

	let manager = manager_for(&server);
	manager.mark_installation_suspended(9);
	assert!(manager.get_installation_token(9).await.is_err());

	manager.mark_installation_active(9);
	let token = manager.get_installation_token(9).await.unwrap();
	assert_eq!(token.expose(), "ghs_back");
}

#[tokio::test]
async fn suspended_installation_never_reaches_the_network() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(201).set_body_json(token_body("ghs_never", 3600)))
		.expect(0)
		.mount(&server)
		.await;

	let manager = manager_for(&server);
	let tracker = manager.suspension_tracker();
	tracker.mark_suspended(55);

	let err = manager.get_installation_token(55).await.unwrap_err();
	assert!(matches!(
		err,
		GithubAppError::InstallationSuspended { installation_id: 55 }
	));
}

#[tokio::test]
async fn eviction_forces_a_new_mint() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/app/installations/5/access_tokens"))
		.respond_with(ResponseTemplate::new(201).set_body_json(token_body("ghs_t", 3600)))
		.expect(2)
		.mount(&server)
		.await;

	let manager = manager_for(&server);
	manager.get_installation_token(5).await.unwrap();
	manager.evict_installation_token(5);
	manager.get_installation_token(5).await.unwrap();
}

#[tokio::test]
async fn short_lived_response_is_minted_a_second_time() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/app/installations/6/access_tokens"))
		.respond_with(ResponseTemplate::new(201).set_body_json(token_body("ghs_dying", 10)))
		.up_to_n_times(1)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/app/installations/6/access_tokens"))
		.respond_with(ResponseTemplate::new(201).set_body_json(token_body("ghs_fresh", 3600)))
		.expect(1)
		.mount(&server)
		.await;

	let manager = manager_for(&server);
	let token = manager.get_installation_token(6).await.unwrap();
	assert_eq!(token.expose(), "ghs_fresh");
}

#[tokio::test]
async fn concurrent_requests_share_a_single_mint() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/app/installations/8/access_tokens"))
		.respond_with(
			ResponseTemplate::new(201)
				.set_body_json(token_body("ghs_shared", 3600))
				.set_delay(Duration::from_millis(100)),
		)
		.expect(1)
		.mount(&server)
		.await;

	let manager = Arc::new(manager_for(&server));
	let mut handles = Vec::new();
	for _ in 0..8 {
		let manager = manager.clone();
		handles.push(tokio::spawn(async move {
			manager.get_installation_token(8).await
		}));
	}
	for handle in handles {
		assert_eq!(handle.await.unwrap().unwrap().expose(), "ghs_shared");
	}
}

#[tokio::test]
async fn provider_failures_are_classified() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/app/installations/1/access_tokens"))
		.respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/app/installations/2/access_tokens"))
		.respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/app/installations/3/access_tokens"))
		.respond_with(ResponseTemplate::new(201).set_body_string("{not json"))
		.mount(&server)
		.await;

	let manager = manager_for(&server);

	let unauthorized = manager.get_installation_token(1).await.unwrap_err();
	assert!(matches!(unauthorized, GithubAppError::Unauthorized));
	assert!(unauthorized.is_provider_error());
	assert!(!unauthorized.is_retryable());

	let unavailable = manager.get_installation_token(2).await.unwrap_err();
	assert!(matches!(
		unavailable,
		GithubAppError::ApiError { status: 503, .. }
	));
	assert!(unavailable.is_retryable());

	let garbled = manager.get_installation_token(3).await.unwrap_err();
	assert!(matches!(garbled, GithubAppError::InvalidResponse(_)));
}

#[tokio::test]
async fn live_suspension_check_reads_installation_state() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/app/installations/10"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"id": 10,
			"suspended_at": "2024-05-01T12:00:00Z",
			"suspended_by": {"login": "octocat"}
		})))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/app/installations/11"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"id": 11,
			"suspended_at": null
		})))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/app/installations/12"))
		.respond_with(ResponseTemplate::new(404))
		.mount(&server)
		.await;

	let manager = manager_for(&server);
	assert!(manager.is_installation_suspended(10).await.unwrap());
	assert!(!manager.is_installation_suspended(11).await.unwrap());
	assert!(matches!(
		manager.is_installation_suspended(12).await,
		Err(GithubAppError::InstallationNotFound {
			installation_id: 12
		})
	));
	assert!(manager.suspension_tracker().is_empty());
}

#[tokio::test]
async fn app_assertion_is_reused_between_mints() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(201).set_body_json(token_body("ghs_any", 3600)))
		.mount(&server)
		.await;

	let manager = manager_for(&server);
	manager.get_installation_token(100).await.unwrap();
	manager.get_installation_token(101).await.unwrap();

	let requests = server.received_requests().await.unwrap();
	let auth: Vec<_> = requests
		.iter()
		.map(|r| r.headers.get("authorization").unwrap().to_str().unwrap().to_string())
		.collect();
	assert_eq!(auth.len(), 2);
	assert_eq!(auth[0], auth[1]);
	assert_eq!(
		manager.generate_app_assertion().unwrap().expose(),
		auth[0].strip_prefix("Bearer ").unwrap()
	);
}
