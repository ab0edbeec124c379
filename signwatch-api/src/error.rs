use reqwest::StatusCode;

use crate::FieldErrors;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("invalid url: {0}")]
	Url(#[from] url::ParseError),

	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),

	/// Client-side validation failed; nothing was sent.
	#[error("invalid input: {0}")]
	Invalid(FieldErrors),

	/// The backend rejected the input, field by field.
	#[error("rejected: {0}")]
	Rejected(FieldErrors),

	#[error("unexpected status {status}: {message}")]
	Status { status: StatusCode, message: String },

	/// Still unauthorized after the one refresh-and-retry.
	#[error("unauthorized")]
	Unauthorized,

	/// The call needs a login and there isn't one.
	#[error("not logged in")]
	LoggedOut,

	/// The refresh token expired or was rejected, so the user was logged out.
	#[error("session expired; log in again")]
	SessionExpired,

	/// The token file couldn't be read or written.
	#[error(transparent)]
	Store(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	/// Turn an unsuccessful response into an error, consuming the body.
	pub(crate) async fn from_response(res: reqwest::Response) -> Self {
		let status = res.status();
		let body = match res.text().await {
			Ok(body) => body,
			Err(err) => return err.into(),
		};

		if status == StatusCode::UNAUTHORIZED {
			return Self::Unauthorized;
		}

		if status == StatusCode::BAD_REQUEST {
			if let Some(fields) = FieldErrors::from_body(&body) {
				return Self::Rejected(fields);
			}
		}

		Self::Status {
			status,
			message: describe(&body),
		}
	}

	/// Whether a retry with a fresh access token could help.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::Unauthorized)
	}
}

// Error bodies are usually `{"error": ...}` or `{"detail": ...}`.
fn describe(body: &str) -> String {
	if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(body) {
		for key in ["error", "detail", "message"] {
			if let Some(serde_json::Value::String(message)) = map.get(key) {
				return message.clone();
			}
		}
	}

	let body = body.trim();
	match body.char_indices().nth(200) {
		Some((end, _)) => format!("{}…", &body[..end]),
		None => body.to_string(),
	}
}
