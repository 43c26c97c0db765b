// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Raw bearer token format and fingerprinting.
//!
//! Tokens look like `wdn_<kind>_<credential-id>_<secret>`: `kind` is `at` or
//! `cs`, the id is the credential UUID in simple hex, and the secret is 32
//! random bytes in URL-safe base64. Only an Argon2 PHC hash of the secret is
//! stored.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use warden_common_secret::SecretString;
use warden_credentials_core::{CredentialId, CredentialKind};

use crate::argon2_config::argon2_instance;
use crate::error::AuthError;

pub const TOKEN_PREFIX: &str = "wdn";
const SECRET_BYTES: usize = 32;

/// A presented token split into its parts. Borrowed from the raw input.
#[derive(Debug)]
pub struct ParsedToken<'a> {
	pub kind: CredentialKind,
	pub credential_id: CredentialId,
	pub secret: &'a str,
}

/// Builds a fresh raw token for `credential_id`, returning it together with
/// the secret part that must be fingerprinted.
pub fn generate_token(kind: CredentialKind, credential_id: CredentialId) -> (SecretString, SecretString) {
	let mut bytes = [0u8; SECRET_BYTES];
	OsRng.fill_bytes(&mut bytes);
	let secret = URL_SAFE_NO_PAD.encode(bytes);
	let token = format!(
		"{TOKEN_PREFIX}_{}_{}_{secret}",
		kind.token_code(),
		credential_id.as_uuid().simple()
	);
	(SecretString::new(token), SecretString::new(secret))
}

/// Splits a presented token. Returns `None` for anything malformed.
pub fn parse_token(raw: &str) -> Option<ParsedToken<'_>> {
	let mut parts = raw.splitn(4, '_');
	if parts.next()? != TOKEN_PREFIX {
		return None;
	}
	let kind = CredentialKind::from_token_code(parts.next()?)?;
	let id = parts.next()?;
	if id.len() != 32 {
		return None;
	}
	let credential_id = id.parse::<CredentialId>().ok()?;
	let secret = parts.next()?;
	if secret.is_empty() {
		return None;
	}
	Some(ParsedToken {
		kind,
		credential_id,
		secret,
	})
}

/// Salted Argon2 fingerprint of a token secret.
pub fn fingerprint(secret: &str) -> Result<String, AuthError> {
	let salt = SaltString::generate(&mut OsRng);
	argon2_instance()
		.hash_password(secret.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Constant-time comparison of a secret against a stored fingerprint.
/// A malformed fingerprint never verifies.
pub fn verify_fingerprint(secret: &str, fingerprint: &str) -> bool {
	match PasswordHash::new(fingerprint) {
		Ok(parsed) => argon2_instance()
			.verify_password(secret.as_bytes(), &parsed)
			.is_ok(),
		Err(_) => false,
	}
}
