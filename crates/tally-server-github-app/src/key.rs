// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! RSA key material used to sign app assertions.
//!
//! Keys arrive as PEM, either PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8
//! (`PRIVATE KEY`). PKCS#1 bodies are wrapped into a PKCS#8 `PrivateKeyInfo`
//! before parsing so both formats go through one validation path.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::EncodingKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use crate::config::KeySource;
use crate::error::GithubAppError;

const PKCS1_LABEL: &str = "RSA PRIVATE KEY";
const PKCS8_LABEL: &str = "PRIVATE KEY";
const EPHEMERAL_KEY_BITS: usize = 2048;

/// `SEQUENCE { OID 1.2.840.113549.1.1.1 (rsaEncryption), NULL }`
const RSA_ALGORITHM_IDENTIFIER: [u8; 15] = [
	0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00,
];
/// `INTEGER 0`
const PKCS8_VERSION: [u8; 3] = [0x02, 0x01, 0x00];

const DER_SEQUENCE: u8 = 0x30;
const DER_OCTET_STRING: u8 = 0x04;

/// A parsed app signing key.
pub struct SigningKey {
	encoding: EncodingKey,
	public: RsaPublicKey,
	configured: bool,
}

impl std::fmt::Debug for SigningKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SigningKey")
			.field("configured", &self.configured)
			.finish_non_exhaustive()
	}
}

impl SigningKey {
	/// Load key material, or generate a throwaway key when none is configured.
	pub fn load(source: Option<&KeySource>) -> Result<Self, GithubAppError> {
		match source {
			Some(KeySource::Inline(pem)) => Self::from_pem(pem.expose()),
			Some(KeySource::File(path)) => {
				let pem = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
					GithubAppError::Config(format!(
						"failed to read private key {}: {e}",
						path.display()
					))
				})?);
				info!(path = %path.display(), "loaded GitHub App private key from file");
				Self::from_pem(&pem)
			}
			None => {
				warn!("no GitHub App private key configured, using an ephemeral key");
				Self::ephemeral()
			}
		}
	}

	pub fn from_pem(pem: &str) -> Result<Self, GithubAppError> {
		let (label, der) = decode_pem(pem)?;
		let pkcs8 = match label.as_str() {
			PKCS1_LABEL => Zeroizing::new(pkcs1_to_pkcs8(&der)),
			PKCS8_LABEL => der,
			other => {
				return Err(GithubAppError::Config(format!(
					"unsupported private key type '{other}', expected '{PKCS1_LABEL}' or '{PKCS8_LABEL}'"
				)))
			}
		};

		let key = RsaPrivateKey::from_pkcs8_der(&pkcs8)
			.map_err(|e| GithubAppError::Config(format!("invalid RSA private key: {e}")))?;
		Self::from_private_key(&key, true)
	}

	/// A fresh 2048-bit key. Lets the service start without credentials; it is
	/// never used to talk to GitHub.
	#[instrument]
	pub fn ephemeral() -> Result<Self, GithubAppError> {
		let key = RsaPrivateKey::new(&mut rand::thread_rng(), EPHEMERAL_KEY_BITS)
			.map_err(|e| GithubAppError::Config(format!("failed to generate ephemeral key: {e}")))?;
		Self::from_private_key(&key, false)
	}

	fn from_private_key(key: &RsaPrivateKey, configured: bool) -> Result<Self, GithubAppError> {
		let pkcs1 = key
			.to_pkcs1_der()
			.map_err(|e| GithubAppError::Config(format!("failed to encode RSA key: {e}")))?;
		Ok(Self {
			encoding: EncodingKey::from_rsa_der(pkcs1.as_bytes()),
			public: key.to_public_key(),
			configured,
		})
	}

	/// True when the key came from configuration rather than [`SigningKey::ephemeral`].
	pub fn is_configured(&self) -> bool {
		self.configured
	}

	pub fn public_key(&self) -> &RsaPublicKey {
		&self.public
	}

	pub(crate) fn encoding_key(&self) -> &EncodingKey {
		&self.encoding
	}
}

/// Returns the PEM label and decoded body.
fn decode_pem(text: &str) -> Result<(String, Zeroizing<Vec<u8>>), GithubAppError> {
	let text = Zeroizing::new(text.replace("\\n", "\n"));

	let after_begin = text
		.split_once("-----BEGIN ")
		.map(|(_, rest)| rest)
		.ok_or_else(|| GithubAppError::Config("private key is not PEM encoded".to_string()))?;
	let (label, rest) = after_begin
		.split_once("-----")
		.ok_or_else(|| GithubAppError::Config("malformed PEM header".to_string()))?;
	let end_marker = format!("-----END {label}-----");
	let (body, _) = rest
		.split_once(end_marker.as_str())
		.ok_or_else(|| GithubAppError::Config(format!("missing PEM footer for '{label}'")))?;

	if body.contains(':') {
		return Err(GithubAppError::Config(
			"encrypted private keys are not supported".to_string(),
		));
	}

	let compact: Zeroizing<String> =
		Zeroizing::new(body.chars().filter(|c| !c.is_whitespace()).collect());
	let der = STANDARD
		.decode(compact.as_bytes())
		.map_err(|e| GithubAppError::Config(format!("invalid base64 in private key: {e}")))?;

	Ok((label.to_string(), Zeroizing::new(der)))
}

/// Wrap a PKCS#1 `RSAPrivateKey` in a PKCS#8 `PrivateKeyInfo`:
///
/// ```text
/// SEQUENCE {
///   INTEGER 0
///   SEQUENCE { OID rsaEncryption, NULL }
///   OCTET STRING { <pkcs1_der> }
/// }
/// ```
pub fn pkcs1_to_pkcs8(pkcs1_der: &[u8]) -> Vec<u8> {
	let octet_len = der_length(pkcs1_der.len());
	let body_len =
		PKCS8_VERSION.len() + RSA_ALGORITHM_IDENTIFIER.len() + 1 + octet_len.len() + pkcs1_der.len();
	let outer_len = der_length(body_len);

	let mut out = Vec::with_capacity(1 + outer_len.len() + body_len);
	out.push(DER_SEQUENCE);
	out.extend_from_slice(&outer_len);
	out.extend_from_slice(&PKCS8_VERSION);
	out.extend_from_slice(&RSA_ALGORITHM_IDENTIFIER);
	out.push(DER_OCTET_STRING);
	out.extend_from_slice(&octet_len);
	out.extend_from_slice(pkcs1_der);
	out
}

/// DER definite length: short form below 128, otherwise `0x80 | n` followed
/// by `n` big-endian bytes.
fn der_length(len: usize) -> Vec<u8> {
	if len < 0x80 {
		return vec![len as u8];
	}
	let bytes = len.to_be_bytes();
	let skip = bytes.iter().take_while(|b| **b == 0).count();
	let significant = &bytes[skip..];
	let mut out = Vec::with_capacity(1 + significant.len());
	out.push(0x80 | significant.len() as u8);
	out.extend_from_slice(significant);
	out
}
