// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! App assertions: short-lived RS256 JWTs that authenticate the app itself.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tally_common_config::SecretString;
use tracing::{debug, instrument, trace};

use crate::error::GithubAppError;
use crate::key::SigningKey;

/// Issued-at is backdated to absorb clock skew against GitHub.
const ASSERTION_BACKDATE_SECS: i64 = 60;
/// GitHub caps assertions at ten minutes; stay under it.
const ASSERTION_LIFETIME_SECS: i64 = 9 * 60;
/// Re-sign when fewer than this many seconds remain.
const ASSERTION_REFRESH_MARGIN_SECS: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
	pub(crate) iat: i64,
	pub(crate) exp: i64,
	pub(crate) iss: String,
}

/// Sign an assertion for `app_id` as of `now` (unix seconds).
/// Returns the token and its `exp`.
pub(crate) fn sign_app_assertion(
	app_id: u64,
	key: &EncodingKey,
	now: i64,
) -> Result<(SecretString, i64), GithubAppError> {
	let claims = Claims {
		iat: now - ASSERTION_BACKDATE_SECS,
		exp: now + ASSERTION_LIFETIME_SECS,
		iss: app_id.to_string(),
	};

	let token = encode(&Header::new(Algorithm::RS256), &claims, key)
		.map_err(|e| GithubAppError::Jwt(format!("Failed to encode JWT: {e}")))?;

	Ok((SecretString::new(token), claims.exp))
}

struct CachedAssertion {
	token: SecretString,
	expires_at: i64,
}

/// Produces app assertions, reusing one until it is close to expiry.
pub struct AppAssertionSigner {
	app_id: Option<u64>,
	key: SigningKey,
	cached: Mutex<Option<CachedAssertion>>,
}

impl AppAssertionSigner {
	pub fn new(app_id: Option<u64>, key: SigningKey) -> Self {
		Self {
			app_id,
			key,
			cached: Mutex::new(None),
		}
	}

	pub fn is_configured(&self) -> bool {
		self.app_id.is_some() && self.key.is_configured()
	}

	/// A valid assertion; cached until 30 seconds before it expires.
	#[instrument(skip(self))]
	pub fn assertion(&self) -> Result<SecretString, GithubAppError> {
		let app_id = self.configured_app_id()?;
		let now = Utc::now().timestamp();

		let mut cached = self.cached.lock();
		if let Some(existing) = cached.as_ref() {
			if now + ASSERTION_REFRESH_MARGIN_SECS < existing.expires_at {
				trace!("using cached app assertion");
				return Ok(existing.token.clone());
			}
		}

		let (token, expires_at) = sign_app_assertion(app_id, self.key.encoding_key(), now)?;
		debug!(app_id, exp = expires_at, "signed new app assertion");
		*cached = Some(CachedAssertion {
			token: token.clone(),
			expires_at,
		});
		Ok(token)
	}

	/// Drop the cached assertion, e.g. after GitHub answered 401.
	pub fn invalidate(&self) {
		if self.cached.lock().take().is_some() {
			debug!("invalidated cached app assertion");
		}
	}

	fn configured_app_id(&self) -> Result<u64, GithubAppError> {
		match self.app_id {
			Some(app_id) if self.key.is_configured() => Ok(app_id),
			_ => Err(GithubAppError::Config(
				"GitHub App credentials are not configured".to_string(),
			)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::test_support::fixture_key;
	use jsonwebtoken::{decode, DecodingKey, Validation};
	use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};

	fn configured_signer(app_id: u64) -> AppAssertionSigner {
		let pem = fixture_key().to_pkcs1_pem(LineEnding::LF).unwrap();
		AppAssertionSigner::new(Some(app_id), SigningKey::from_pem(&pem).unwrap())
	}

	fn decode_claims(token: &str) -> Claims {
		let public_pem = fixture_key()
			.to_public_key()
			.to_pkcs1_pem(LineEnding::LF)
			.unwrap();
		let mut validation = Validation::new(Algorithm::RS256);
		validation.validate_exp = false;
		validation.required_spec_claims.clear();
		decode::<Claims>(
			token,
			&DecodingKey::from_rsa_pem(public_pem.as_bytes()).unwrap(),
			&validation,
		)
		.unwrap()
		.claims
	}

	#[test]
	fn claims_have_expected_window_and_issuer() {
		let signer = configured_signer(12345);
		let before = Utc::now().timestamp();
		let token = signer.assertion().unwrap();
		let after = Utc::now().timestamp();

		let claims = decode_claims(token.expose());
		assert_eq!(claims.iss, "12345");
		assert_eq!(claims.exp - claims.iat, 600);
		assert!(claims.iat >= before - 60 && claims.iat <= after - 60);
		assert!(claims.exp >= before + 540 && claims.exp <= after + 540);
	}

	#[test]
	fn header_is_rs256() {
		let token = configured_signer(1).assertion().unwrap();
		let header = jsonwebtoken::decode_header(token.expose()).unwrap();
		assert_eq!(header.alg, Algorithm::RS256);
	}

	#[test]
	fn cached_assertion_is_reused_until_invalidated() {
		let signer = configured_signer(7);
		let first = signer.assertion().unwrap();
		let second = signer.assertion().unwrap();
		assert_eq!(first, second);

		signer.invalidate();
		assert!(signer.cached.lock().is_none());
		signer.assertion().unwrap();
		assert!(signer.cached.lock().is_some());
	}

	#[test]
	fn near_expiry_assertion_is_replaced() {
		let signer = configured_signer(7);
		*signer.cached.lock() = Some(CachedAssertion {
			token: SecretString::new("stale".to_string()),
			expires_at: Utc::now().timestamp() + 10,
		});
		let token = signer.assertion().unwrap();
		assert_ne!(token.expose(), "stale");
	}

	#[test]
	fn unconfigured_signer_refuses() {
		let ephemeral = AppAssertionSigner::new(Some(1), SigningKey::ephemeral().unwrap());
		assert!(!ephemeral.is_configured());
		assert!(matches!(ephemeral.assertion(), Err(GithubAppError::Config(_))));

		let pem = fixture_key().to_pkcs1_pem(LineEnding::LF).unwrap();
		let no_app_id = AppAssertionSigner::new(None, SigningKey::from_pem(&pem).unwrap());
		assert!(matches!(no_app_id.assertion(), Err(GithubAppError::Config(_))));
	}

	#[test]
	fn signing_with_explicit_time() {
		let key = EncodingKey::from_rsa_der(fixture_key().to_pkcs1_der().unwrap().as_bytes());
		let (token, exp) = sign_app_assertion(99, &key, 1_700_000_000).unwrap();
		assert_eq!(exp, 1_700_000_540);
		let claims = decode_claims(token.expose());
		assert_eq!(claims.iat, 1_699_999_940);
		assert_eq!(claims.iss, "99");
	}
}
