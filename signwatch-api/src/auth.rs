use std::time::SystemTime;

use signwatch_token::{TokenPair, TokenStore};

use crate::{Result, User};

/// Who the client is talking as.
///
/// Passed explicitly to every call that may need credentials. When backed by a
/// [TokenStore], every change is written through so the next run picks it up.
#[derive(Debug, Default)]
pub struct AuthSession {
	tokens: Option<TokenPair>,
	user: Option<User>,
	store: Option<TokenStore>,
}

impl AuthSession {
	/// No credentials and nothing persisted.
	pub fn anonymous() -> Self {
		Self::default()
	}

	/// Restore whatever tokens were saved in `store`.
	pub fn restore(store: TokenStore) -> Result<Self> {
		let tokens = store.load()?;
		if tokens.is_some() {
			tracing::debug!(path = %store.path().display(), "restored tokens");
		}

		Ok(Self {
			tokens,
			user: None,
			store: Some(store),
		})
	}

	pub fn tokens(&self) -> Option<&TokenPair> {
		self.tokens.as_ref()
	}

	/// The user, once a login or profile fetch has told us.
	pub fn user(&self) -> Option<&User> {
		self.user.as_ref()
	}

	pub fn is_authenticated(&self) -> bool {
		self.tokens.is_some()
	}

	/// The current access token, if it's still valid at `now`.
	pub fn access_token(&self, now: SystemTime) -> Option<&str> {
		self.tokens
			.as_ref()
			.filter(|tokens| !tokens.access_expired(now))
			.map(|tokens| tokens.access.as_str())
	}

	pub(crate) fn login(&mut self, tokens: TokenPair, user: User) -> Result<()> {
		if let Some(store) = &self.store {
			store.save(&tokens)?;
		}

		self.tokens = Some(tokens);
		self.user = Some(user);

		Ok(())
	}

	pub(crate) fn set_user(&mut self, user: User) {
		self.user = Some(user);
	}

	/// Swap in a refreshed access token, and a rotated refresh token if there is one.
	pub(crate) fn refreshed(&mut self, access: String, refresh: Option<String>) -> Result<()> {
		let Some(tokens) = &mut self.tokens else {
			return Ok(());
		};

		tokens.access = access;
		if let Some(refresh) = refresh {
			tokens.refresh = refresh;
		}

		if let Some(store) = &self.store {
			store.save(tokens)?;
		}

		Ok(())
	}

	/// Forget everything, in memory and on disk.
	///
	/// A failure to clear the store is logged rather than returned; the session is cleared regardless.
	pub fn clear(&mut self) {
		self.tokens = None;
		self.user = None;

		if let Some(store) = &self.store {
			if let Err(err) = store.clear() {
				tracing::warn!(%err, "failed to clear saved tokens");
			}
		}
	}
}
