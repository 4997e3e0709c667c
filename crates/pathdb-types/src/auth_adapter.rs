//! Authentication Adapter
//!
//! Seam for the authentication collaborator. Token issuance, password
//! hashing and revocation live in an external service; the server only
//! needs token verification and the admin user listing.

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::prelude::*;

/// Verified token claims.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Claims {
	/// Subject (user id)
	pub sub: Box<str>,

	#[serde(default)]
	pub tenant: Box<str>,

	#[serde(default)]
	pub roles: Vec<Box<str>>,

	/// Expiry (seconds epoch)
	pub exp: i64,
}

impl Claims {
	pub fn has_role(&self, role: &str) -> bool {
		self.roles.iter().any(|r| r.as_ref() == role)
	}
}

/// Admin-facing user record, owned by the auth collaborator.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
	pub id: Box<str>,
	pub username: Box<str>,
	#[serde(default)]
	pub roles: Vec<Box<str>>,
	#[serde(default)]
	pub disabled: bool,
}

#[async_trait]
pub trait AuthAdapter: Debug + Send + Sync {
	/// Verify a bearer token and return its claims.
	async fn verify_token(&self, token: &str) -> DbResult<Claims>;

	/// List users (admin surface).
	async fn list_users(&self, limit: usize, offset: usize) -> DbResult<Vec<UserInfo>>;
}

/// HS256 shared-secret token verification, for deployments where the auth
/// service signs with a static key.
pub struct StaticKeyAuthAdapter {
	key: DecodingKey,
	validation: Validation,
}

impl StaticKeyAuthAdapter {
	pub fn new(secret: &str) -> Self {
		Self {
			key: DecodingKey::from_secret(secret.as_bytes()),
			validation: Validation::default(),
		}
	}
}

impl Debug for StaticKeyAuthAdapter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StaticKeyAuthAdapter").finish()
	}
}

#[async_trait]
impl AuthAdapter for StaticKeyAuthAdapter {
	async fn verify_token(&self, token: &str) -> DbResult<Claims> {
		let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|err| {
			debug!("token verification failed: {}", err);
			Error::Unauthenticated
		})?;
		Ok(data.claims)
	}

	async fn list_users(&self, _limit: usize, _offset: usize) -> DbResult<Vec<UserInfo>> {
		// The static-key binding has no user store
		Ok(Vec::new())
	}
}

// vim: ts=4
