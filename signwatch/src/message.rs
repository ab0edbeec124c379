//! JSON messages exchanged over the detection link.
//!
//! Every message is a text frame holding an object with a `type` tag.
use serde::{Deserialize, Serialize};

use crate::{DetectionBatch, Result};

/// Client → server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
	/// Ask for detection on one frame, encoded as a JPEG data URL.
	DetectFrame { image: String },
}

/// Server → client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
	/// Sent once after the connection is accepted.
	ConnectionEstablished {
		#[serde(default)]
		message: String,

		#[serde(default)]
		authenticated: bool,

		#[serde(default)]
		username: Option<String>,
	},

	DetectionResult(DetectionBatch),

	/// The backend could not process the last frame; the connection stays open.
	Error { message: String },
}

impl ClientMessage {
	pub fn detect_frame(image: impl Into<String>) -> Self {
		Self::DetectFrame { image: image.into() }
	}

	pub fn to_string(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}
}

impl ServerMessage {
	#[allow(clippy::should_implement_trait)]
	pub fn from_str(s: &str) -> Result<Self> {
		Ok(serde_json::from_str(s)?)
	}

	pub fn to_string(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}
}
