use std::{collections::BTreeMap, fmt, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Error messages keyed by form field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
		self.0.insert(field.into(), message.into());
	}

	pub fn get(&self, field: &str) -> Option<&str> {
		self.0.get(field).map(String::as_str)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	fn into_result(self) -> Result<(), Self> {
		match self.is_empty() {
			true => Ok(()),
			false => Err(self),
		}
	}

	/// Parse a `400` body shaped like `{"field": ["message", ...]}`.
	///
	/// Only the first message per field is kept.
	pub(crate) fn from_body(body: &str) -> Option<Self> {
		let serde_json::Value::Object(map) = serde_json::from_str::<serde_json::Value>(body).ok()? else {
			return None;
		};

		let mut errors = Self::new();
		for (field, value) in map {
			// A bare string is a general `{"error": ...}` reply, not a field.
			let serde_json::Value::Array(messages) = value else {
				continue;
			};
			let Some(serde_json::Value::String(message)) = messages.into_iter().next() else {
				continue;
			};

			errors.insert(field, message);
		}

		(!errors.is_empty()).then_some(errors)
	}
}

impl fmt::Display for FieldErrors {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, (field, message)) in self.iter().enumerate() {
			if i > 0 {
				write!(f, "; ")?;
			}
			write!(f, "{field}: {message}")?;
		}
		Ok(())
	}
}

impl std::error::Error for FieldErrors {}

fn email_pattern() -> &'static Regex {
	static EMAIL: OnceLock<Regex> = OnceLock::new();
	EMAIL.get_or_init(|| Regex::new(r"\S+@\S+\.\S+").unwrap())
}

/// The sign-up form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registration {
	pub username: String,
	pub email: String,

	#[serde(default)]
	pub first_name: String,

	#[serde(default)]
	pub last_name: String,

	pub password: String,
	pub password_confirm: String,
}

impl Registration {
	pub const MIN_USERNAME: usize = 3;
	pub const MIN_PASSWORD: usize = 8;

	/// Check the form before it is sent. Every failing field is reported, not just the first.
	pub fn validate(&self) -> Result<(), FieldErrors> {
		let mut errors = FieldErrors::new();

		if self.username.trim().is_empty() {
			errors.insert("username", "Username is required");
		} else if self.username.chars().count() < Self::MIN_USERNAME {
			errors.insert("username", "Username must be at least 3 characters");
		}

		if self.email.trim().is_empty() {
			errors.insert("email", "Email is required");
		} else if !email_pattern().is_match(&self.email) {
			errors.insert("email", "Email is invalid");
		}

		if self.password.is_empty() {
			errors.insert("password", "Password is required");
		} else if self.password.chars().count() < Self::MIN_PASSWORD {
			errors.insert("password", "Password must be at least 8 characters");
		}

		if self.password != self.password_confirm {
			errors.insert("password_confirm", "Passwords do not match");
		}

		errors.into_result()
	}
}

/// The change-password form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasswordChange {
	pub old_password: String,
	pub new_password: String,
	pub new_password_confirm: String,
}

impl PasswordChange {
	pub fn validate(&self) -> Result<(), FieldErrors> {
		let mut errors = FieldErrors::new();

		if self.new_password != self.new_password_confirm {
			errors.insert("new_password_confirm", "Passwords do not match");
		}

		errors.into_result()
	}
}
