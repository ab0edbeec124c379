use std::time::SystemTime;

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use signwatch::EncodedFrame;
use url::Url;

use crate::{
	Authenticated, AuthSession, DetectResponse, DetectionRecord, DetectionStats, Error, PasswordChange, ProfileUpdate,
	Refreshed, Registration, Result, Updated, User, UserStats,
};

/// What a call needs in the way of credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
	/// Never send a token.
	Anonymous,

	/// Send a token if there is one; the backend answers either way.
	Optional,

	/// Fail with [Error::LoggedOut] if there is no token.
	Required,
}

/// A REST client rooted at the backend's `/api/` URL.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct Client {
	http: reqwest::Client,
	base: Url,
}

impl Client {
	pub fn new(base: Url) -> Self {
		Self::with_http(reqwest::Client::new(), base)
	}

	pub fn with_http(http: reqwest::Client, mut base: Url) -> Self {
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}

		Self { http, base }
	}

	pub fn base(&self) -> &Url {
		&self.base
	}

	pub async fn register(&self, auth: &mut AuthSession, form: &Registration) -> Result<User> {
		form.validate().map_err(Error::Invalid)?;

		let res: Authenticated = self
			.call(auth, Access::Anonymous, Method::POST, "auth/register/", Some(to_json(form)?))
			.await?;

		tracing::info!(username = %res.user.username, "registered");
		auth.login(res.tokens, res.user.clone())?;

		Ok(res.user)
	}

	pub async fn login(&self, auth: &mut AuthSession, username: &str, password: &str) -> Result<User> {
		let body = json!({ "username": username, "password": password });
		let res: Authenticated = self
			.call(auth, Access::Anonymous, Method::POST, "auth/login/", Some(body))
			.await?;

		tracing::info!(username = %res.user.username, "logged in");
		auth.login(res.tokens, res.user.clone())?;

		Ok(res.user)
	}

	/// Tell the backend to revoke the refresh token, then forget everything locally.
	///
	/// The local state is cleared even if the backend call fails.
	pub async fn logout(&self, auth: &mut AuthSession) {
		if let Some(tokens) = auth.tokens() {
			let body = json!({ "refresh_token": tokens.refresh });
			let res: Result<serde::de::IgnoredAny> = self
				.call(auth, Access::Required, Method::POST, "auth/logout/", Some(body))
				.await;

			if let Err(err) = res {
				tracing::warn!(%err, "logout failed");
			}
		}

		auth.clear();
		tracing::info!("logged out");
	}

	/// Swap the refresh token for a new access token.
	///
	/// If the refresh token has expired or is rejected, the session is cleared and
	/// [Error::SessionExpired] is returned.
	pub async fn refresh(&self, auth: &mut AuthSession) -> Result<()> {
		let Some(tokens) = auth.tokens() else {
			return Err(Error::LoggedOut);
		};

		if tokens.refresh_expired(SystemTime::now()) {
			tracing::info!("refresh token expired; logging out");
			auth.clear();
			return Err(Error::SessionExpired);
		}

		let refresh = tokens.refresh.clone();
		let refreshed = match self.exchange(&refresh).await {
			Ok(refreshed) => refreshed,
			Err(err) => {
				tracing::warn!(%err, "token refresh failed; logging out");
				auth.clear();

				return Err(match err {
					Error::Unauthorized | Error::Rejected(_) | Error::Status { .. } => Error::SessionExpired,
					err => err,
				});
			}
		};

		auth.refreshed(refreshed.access, refreshed.refresh)?;
		tracing::debug!("access token refreshed");

		Ok(())
	}

	// Not routed through `send`, so a refresh never triggers another refresh.
	async fn exchange(&self, refresh: &str) -> Result<Refreshed> {
		let url = self.base.join("auth/token/refresh/")?;
		let res = self.http.post(url).json(&json!({ "refresh": refresh })).send().await?;
		Ok(check(res).await?.json().await?)
	}

	pub async fn profile(&self, auth: &mut AuthSession) -> Result<User> {
		let user: User = self
			.call(auth, Access::Required, Method::GET, "auth/profile/", None)
			.await?;

		auth.set_user(user.clone());
		Ok(user)
	}

	pub async fn update_profile(&self, auth: &mut AuthSession, update: &ProfileUpdate) -> Result<User> {
		let res: Updated = self
			.call(
				auth,
				Access::Required,
				Method::PUT,
				"auth/profile/update/",
				Some(to_json(update)?),
			)
			.await?;

		auth.set_user(res.user.clone());
		Ok(res.user)
	}

	pub async fn user_stats(&self, auth: &mut AuthSession) -> Result<UserStats> {
		self.call(auth, Access::Required, Method::GET, "auth/profile/stats/", None)
			.await
	}

	pub async fn change_password(&self, auth: &mut AuthSession, change: &PasswordChange) -> Result<()> {
		change.validate().map_err(Error::Invalid)?;

		let _: serde::de::IgnoredAny = self
			.call(
				auth,
				Access::Required,
				Method::POST,
				"auth/change-password/",
				Some(to_json(change)?),
			)
			.await?;

		Ok(())
	}

	/// Delete the account for good, then forget the tokens.
	pub async fn delete_account(&self, auth: &mut AuthSession) -> Result<()> {
		let _: serde::de::IgnoredAny = self
			.call(auth, Access::Required, Method::DELETE, "auth/delete-account/", None)
			.await?;

		auth.clear();
		tracing::info!("account deleted");

		Ok(())
	}

	/// Run detection on one image, given as a base64 data URL.
	///
	/// Works anonymously; the result is only stored in the history when logged in.
	pub async fn detect(&self, auth: &mut AuthSession, image: &str) -> Result<DetectResponse> {
		self.call(auth, Access::Optional, Method::POST, "detect/", Some(json!({ "image": image })))
			.await
	}

	pub async fn detect_frame(&self, auth: &mut AuthSession, frame: &EncodedFrame) -> Result<DetectResponse> {
		self.detect(auth, &frame.to_data_url()).await
	}

	/// The most recent detections, newest first.
	pub async fn detections(&self, auth: &mut AuthSession) -> Result<Vec<DetectionRecord>> {
		self.call(auth, Access::Required, Method::GET, "detections/", None)
			.await
	}

	pub async fn detection_stats(&self, auth: &mut AuthSession) -> Result<DetectionStats> {
		self.call(auth, Access::Required, Method::GET, "stats/", None).await
	}

	/// Everyone's statistics when anonymous, the user's own when logged in.
	pub async fn global_stats(&self, auth: &mut AuthSession) -> Result<DetectionStats> {
		self.call(auth, Access::Optional, Method::GET, "global-stats/", None)
			.await
	}

	async fn call<T: DeserializeOwned>(
		&self,
		auth: &mut AuthSession,
		access: Access,
		method: Method,
		path: &str,
		body: Option<serde_json::Value>,
	) -> Result<T> {
		let res = self.send(auth, access, method, path, body).await?;
		Ok(res.json().await?)
	}

	// The refresh middleware: proactive refresh, then at most one retry on 401.
	async fn send(
		&self,
		auth: &mut AuthSession,
		access: Access,
		method: Method,
		path: &str,
		body: Option<serde_json::Value>,
	) -> Result<reqwest::Response> {
		let url = self.base.join(path)?;

		if access != Access::Anonymous {
			self.ensure_fresh(auth, access).await?;
		}

		let res = self.execute(auth, access, &method, &url, body.as_ref()).await?;

		let retry = res.status() == StatusCode::UNAUTHORIZED && access != Access::Anonymous && auth.is_authenticated();
		if !retry {
			return check(res).await;
		}

		tracing::debug!(%url, "unauthorized; refreshing and retrying once");
		self.refresh(auth).await?;

		let res = self.execute(auth, access, &method, &url, body.as_ref()).await?;
		check(res).await
	}

	async fn ensure_fresh(&self, auth: &mut AuthSession, access: Access) -> Result<()> {
		let Some(tokens) = auth.tokens() else {
			return match access {
				Access::Required => Err(Error::LoggedOut),
				_ => Ok(()),
			};
		};

		if !tokens.access_expired(SystemTime::now()) {
			return Ok(());
		}

		tracing::debug!("access token expired; refreshing");
		match self.refresh(auth).await {
			Ok(()) => Ok(()),
			Err(err) if access == Access::Optional => {
				tracing::warn!(%err, "continuing anonymously");
				Ok(())
			}
			Err(err) => Err(err),
		}
	}

	async fn execute(
		&self,
		auth: &AuthSession,
		access: Access,
		method: &Method,
		url: &Url,
		body: Option<&serde_json::Value>,
	) -> Result<reqwest::Response> {
		let mut req = self.http.request(method.clone(), url.clone());

		if access != Access::Anonymous {
			if let Some(tokens) = auth.tokens() {
				req = req.bearer_auth(&tokens.access);
			}
		}

		if let Some(body) = body {
			req = req.json(body);
		}

		tracing::trace!(%method, %url, "request");
		Ok(req.send().await?)
	}
}

async fn check(res: reqwest::Response) -> Result<reqwest::Response> {
	match res.status().is_success() {
		true => Ok(res),
		false => Err(Error::from_response(res).await),
	}
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
	Ok(serde_json::to_value(value)?)
}
