// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use warden_common_secret::SecretString;
use warden_credentials_core::{
	add_secs, AttemptOutcome, AuthCredential, CredentialId, CredentialKind, OwnerId, MAX_TTL_SECS,
};
use warden_server_db::now;

use super::repository::CredentialStore;
use crate::error::{AuthError, Result};
use crate::lockout::{scope_key, LockoutGuard};
use crate::token::{fingerprint, generate_token, parse_token, verify_fingerprint};

/// Lifetime and usage limits for a new credential.
///
/// `ttl_secs == 0` issues a non-expiring credential; `max_ttl_secs == 0`
/// removes the renewal ceiling; `uses_limit == 0` allows unlimited uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueRequest {
	pub ttl_secs: u64,
	pub max_ttl_secs: u64,
	pub uses_limit: u64,
}

/// A freshly issued credential and its raw token. The token is only ever
/// available here.
#[derive(Debug)]
pub struct IssuedCredential {
	pub credential: AuthCredential,
	pub token: SecretString,
}

/// Issues, authenticates, renews and revokes bearer credentials.
#[derive(Clone)]
pub struct CredentialManager {
	store: Arc<dyn CredentialStore>,
	guard: LockoutGuard,
}

impl CredentialManager {
	pub fn new(store: Arc<dyn CredentialStore>, guard: LockoutGuard) -> Self {
		Self { store, guard }
	}

	pub fn guard(&self) -> &LockoutGuard {
		&self.guard
	}

	#[tracing::instrument(skip(self, request), fields(owner_id = %owner_id, kind = %kind))]
	pub async fn issue(
		&self,
		owner_id: OwnerId,
		kind: CredentialKind,
		request: IssueRequest,
	) -> Result<IssuedCredential> {
		if request.max_ttl_secs > 0 && request.ttl_secs > request.max_ttl_secs {
			return Err(AuthError::InvalidRequest(format!(
				"ttl {}s exceeds max ttl {}s",
				request.ttl_secs, request.max_ttl_secs
			)));
		}
		if request.ttl_secs > MAX_TTL_SECS || request.max_ttl_secs > MAX_TTL_SECS {
			return Err(AuthError::InvalidRequest(format!(
				"ttl must not exceed {MAX_TTL_SECS}s"
			)));
		}

		let id = CredentialId::generate();
		let (token, secret) = generate_token(kind, id);
		let credential = AuthCredential {
			id,
			owner_id,
			kind,
			fingerprint: fingerprint(secret.expose())?,
			ttl_secs: request.ttl_secs,
			max_ttl_secs: request.max_ttl_secs,
			uses_count: 0,
			uses_limit: request.uses_limit,
			last_used_at: None,
			last_renewed_at: None,
			revoked: false,
			created_at: now(),
		};
		self.store.insert(&credential).await?;

		tracing::info!(credential_id = %id, "credential issued");
		Ok(IssuedCredential { credential, token })
	}

	/// Verifies a presented token and counts one use.
	///
	/// The lockout scope is taken from the id embedded in the token, so a
	/// locked scope is rejected before the credential is loaded and unknown
	/// ids count failures exactly like wrong secrets.
	#[tracing::instrument(skip_all)]
	pub async fn authenticate(&self, raw_token: &str) -> Result<AuthCredential> {
		let Some(parsed) = parse_token(raw_token) else {
			return Err(AuthError::InvalidCredential);
		};
		let scope = scope_key(&parsed.kind.to_string(), &parsed.credential_id.to_string());

		let decision = self.guard.check(&scope).await?;
		if let Some(retry_after_secs) = decision.retry_after_secs.filter(|_| !decision.allowed) {
			return Err(AuthError::Locked { retry_after_secs });
		}

		let stored = self.store.get(parsed.credential_id).await?;
		let credential = match stored {
			Some(c) if c.kind == parsed.kind && verify_fingerprint(parsed.secret, &c.fingerprint) => c,
			_ => {
				self.guard
					.check_and_record(&scope, AttemptOutcome::Failure)
					.await?;
				tracing::debug!("credential verification failed");
				return Err(AuthError::InvalidCredential);
			}
		};

		let decision = self
			.guard
			.check_and_record(&scope, AttemptOutcome::Success)
			.await?;
		if !decision.allowed {
			return Err(AuthError::Locked {
				retry_after_secs: decision.retry_after_secs.unwrap_or(1),
			});
		}

		let now = now();
		if credential.revoked {
			return Err(AuthError::Revoked);
		}
		if credential.is_expired(now) {
			return Err(AuthError::Expired);
		}
		if credential.uses_exhausted() {
			return Err(AuthError::UsesExceeded);
		}

		if !self.store.consume_use(credential.id, now).await? {
			// Lost a race with a concurrent use or revoke.
			let current = self.store.get(credential.id).await?;
			return Err(match current {
				Some(c) if c.revoked => AuthError::Revoked,
				Some(c) if c.is_expired(now) => AuthError::Expired,
				Some(_) => AuthError::UsesExceeded,
				None => AuthError::InvalidCredential,
			});
		}

		Ok(AuthCredential {
			uses_count: credential.uses_count + 1,
			last_used_at: Some(now),
			..credential
		})
	}

	/// Extends the credential by its incremental TTL from now, within the
	/// max-TTL budget. The secret does not change.
	#[tracing::instrument(skip(self), fields(credential_id = %id))]
	pub async fn renew(&self, id: CredentialId) -> Result<AuthCredential> {
		let credential = self.store.get(id).await?.ok_or(AuthError::NotFound(id))?;
		let now = now();

		if credential.revoked {
			return Err(AuthError::Revoked);
		}
		if credential.ttl_secs == 0 || credential.is_expired(now) {
			return Err(AuthError::NotRenewable);
		}

		let new_expiry = add_secs(now, credential.ttl_secs);
		if let Some(deadline) = credential.max_ttl_deadline() {
			if new_expiry > deadline {
				return Err(AuthError::MaxTtlExceeded);
			}
		}

		if !self.store.mark_renewed(id, now, new_expiry).await? {
			// Revoked or expired since it was loaded.
			let revoked = self.store.get(id).await?.map_or(true, |c| c.revoked);
			return Err(if revoked { AuthError::Revoked } else { AuthError::NotRenewable });
		}

		tracing::info!(expires_at = %new_expiry, "credential renewed");
		Ok(AuthCredential {
			last_renewed_at: Some(now),
			..credential
		})
	}

	#[tracing::instrument(skip(self), fields(credential_id = %id))]
	pub async fn revoke(&self, id: CredentialId) -> Result<()> {
		if !self.store.revoke(id, now()).await? {
			return Err(AuthError::NotFound(id));
		}
		tracing::info!("credential revoked");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(owner_id = %owner_id))]
	pub async fn revoke_all_for_owner(&self, owner_id: OwnerId) -> Result<u64> {
		let revoked = self.store.revoke_all_for_owner(owner_id, now()).await?;
		tracing::info!(revoked, "owner credentials revoked");
		Ok(revoked)
	}

	pub async fn get(&self, id: CredentialId) -> Result<Option<AuthCredential>> {
		Ok(self.store.get(id).await?)
	}

	pub async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<AuthCredential>> {
		Ok(self.store.list_for_owner(owner_id).await?)
	}
}
