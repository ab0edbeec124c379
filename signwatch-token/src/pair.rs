use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};

use crate::Claims;

/// The access/refresh pair returned by login and registration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
	/// Short-lived; sent as `Authorization: Bearer` on every request.
	pub access: String,

	/// Long-lived; only ever sent to the refresh and logout endpoints.
	pub refresh: String,
}

impl TokenPair {
	pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
		Self {
			access: access.into(),
			refresh: refresh.into(),
		}
	}

	pub fn access_claims(&self) -> anyhow::Result<Claims> {
		Claims::decode(&self.access)
	}

	pub fn access_expired(&self, now: SystemTime) -> bool {
		crate::is_expired(&self.access, now)
	}

	pub fn refresh_expired(&self, now: SystemTime) -> bool {
		crate::is_expired(&self.refresh, now)
	}
}

// Never print the tokens themselves.
impl fmt::Debug for TokenPair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TokenPair")
			.field("access", &self.access_claims().ok())
			.finish_non_exhaustive()
	}
}
