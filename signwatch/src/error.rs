use std::sync::Arc;

/// Why the camera could not be opened.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
	#[error("permission denied")]
	PermissionDenied,

	#[error("no capture device")]
	NotFound,

	/// The device is still held by another handle.
	#[error("device busy")]
	Busy,

	#[error("device error: {0}")]
	Other(String),
}

/// Why a snapshot could not be taken from an open device.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
	/// The device went away mid-session.
	#[error("device disconnected")]
	Disconnected,

	/// Snapshot was requested without an open handle.
	#[error("capture not active")]
	Inactive,

	#[error("invalid frame: {0}")]
	InvalidFrame(String),
}

/// Error types for live detection sessions.
///
/// Only [Error::Device] prevents a session from starting.
/// Everything else is surfaced and the session carries on.
#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
	#[error("device error: {0}")]
	Device(#[from] DeviceError),

	#[error("capture error: {0}")]
	Capture(#[from] CaptureError),

	/// The link failed to open or dropped.
	#[error("connection error: {0}")]
	Connection(String),

	/// A send was attempted outside the `Connected` state.
	#[error("not connected")]
	NotConnected,

	/// The previous session has not finished tearing down.
	#[error("session already active")]
	SessionActive,

	/// The session can't run with this configuration.
	#[error("invalid config: {0}")]
	InvalidConfig(&'static str),

	#[error("json error: {0}")]
	Json(Arc<serde_json::Error>),

	#[error("image error: {0}")]
	Image(Arc<image::ImageError>),

	#[error("base64 error: {0}")]
	Base64(#[from] base64::DecodeError),

	#[error("invalid data url")]
	InvalidDataUrl,
}

pub type Result<T> = std::result::Result<T, Error>;

// Wrap in an Arc so it is Clone
impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Json(Arc::new(err))
	}
}

impl From<image::ImageError> for Error {
	fn from(err: image::ImageError) -> Self {
		Error::Image(Arc::new(err))
	}
}
