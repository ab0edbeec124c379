use std::time::{Duration, SystemTime};

use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst, TimestampSeconds};

#[serde_as]
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Claims {
	/// Either `access` or `refresh`.
	#[serde(rename = "token_type")]
	pub kind: Option<String>,

	/// The user the token was issued to.
	///
	/// Usually a number, but accepted as a string too.
	#[serde(rename = "user_id")]
	#[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
	pub user: Option<u64>,

	/// A unique ID, used by the backend to blacklist tokens on logout.
	#[serde(rename = "jti")]
	pub id: Option<String>,

	/// The expiration time of the token as a unix timestamp.
	#[serde(rename = "exp")]
	#[serde_as(as = "Option<TimestampSeconds<i64>>")]
	pub expires: Option<SystemTime>,

	/// The issued time of the token as a unix timestamp.
	#[serde(rename = "iat")]
	#[serde_as(as = "Option<TimestampSeconds<i64>>")]
	pub issued: Option<SystemTime>,
}

impl Claims {
	/// Read the claims without checking the signature.
	///
	/// Expiry isn't enforced either; use [Claims::is_expired] for that.
	pub fn decode(token: &str) -> anyhow::Result<Self> {
		let mut validation = Validation::default();
		validation.insecure_disable_signature_validation();
		validation.validate_exp = false;
		validation.validate_aud = false;
		validation.required_spec_claims = Default::default();

		let token = jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
		Ok(token.claims)
	}

	/// A token without an expiry is treated as expired.
	pub fn is_expired(&self, now: SystemTime) -> bool {
		match self.expires {
			Some(expires) => expires < now,
			None => true,
		}
	}

	/// How long until the token expires, if it hasn't already.
	pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
		self.expires?.duration_since(now).ok()
	}
}

/// Whether `token` is unusable at `now`: expired, missing `exp`, or not a JWT at all.
pub fn is_expired(token: &str, now: SystemTime) -> bool {
	match Claims::decode(token) {
		Ok(claims) => claims.is_expired(now),
		Err(err) => {
			tracing::debug!(%err, "undecodable token");
			true
		}
	}
}
