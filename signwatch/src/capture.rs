//! Camera access and frame encoding.
//!
//! A [CaptureDevice] is opened into a [CaptureHandle], which hands out the most recent frame on demand.
//! [Capture] wraps the pair so the handle is always released: on [Capture::stop] and on drop.
use std::future::Future;

use base64::Engine;
use bytes::Bytes;
use derive_more::Debug;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::{CaptureError, DeviceError, Error, Result};

/// The JPEG quality used for detection requests.
pub const DEFAULT_QUALITY: u8 = 80;

/// Requested capture geometry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct Constraints {
	pub width: u32,
	pub height: u32,
}

impl Default for Constraints {
	fn default() -> Self {
		Self {
			width: 640,
			height: 480,
		}
	}
}

/// A source of frames, ie. a camera.
pub trait CaptureDevice: Send {
	type Handle: CaptureHandle;

	/// Acquire exclusive access to the device.
	fn open(&mut self, constraints: &Constraints) -> impl Future<Output = std::result::Result<Self::Handle, DeviceError>> + Send;
}

/// An open device.
pub trait CaptureHandle: Send {
	/// Return the most recent frame available right now.
	///
	/// Implementations must not queue frames; a slow caller simply misses some.
	fn snapshot(&mut self) -> std::result::Result<Frame, CaptureError>;

	/// Release the device. Calling this more than once is a no-op.
	fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum CaptureState {
	#[display("idle")]
	Idle,
	#[display("active")]
	Active,
}

/// A raw frame straight off the device.
#[derive(Clone, Debug)]
pub struct Frame {
	#[debug("{}x{}", image.width(), image.height())]
	pub image: RgbImage,
}

impl Frame {
	pub fn new(image: RgbImage) -> Self {
		Self { image }
	}

	pub fn width(&self) -> u32 {
		self.image.width()
	}

	pub fn height(&self) -> u32 {
		self.image.height()
	}

	/// Compress the frame as a JPEG.
	pub fn encode(&self, quality: u8) -> Result<EncodedFrame> {
		if self.image.width() == 0 || self.image.height() == 0 {
			return Err(CaptureError::InvalidFrame("empty frame".to_string()).into());
		}

		let mut jpeg = Vec::new();
		let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
		encoder.encode_image(&self.image)?;

		Ok(EncodedFrame { jpeg: jpeg.into() })
	}
}

/// A JPEG-compressed frame, ready to be put on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
	#[debug("{} bytes", jpeg.len())]
	pub jpeg: Bytes,
}

impl EncodedFrame {
	const PREFIX: &str = "data:image/jpeg;base64,";

	/// Encode as a `data:image/jpeg;base64,` URL, the format the backend expects.
	pub fn to_data_url(&self) -> String {
		let mut url = String::with_capacity(Self::PREFIX.len() + self.jpeg.len() * 4 / 3 + 4);
		url.push_str(Self::PREFIX);
		base64::engine::general_purpose::STANDARD.encode_string(&self.jpeg, &mut url);
		url
	}

	/// Parse any base64 data URL back into its raw bytes.
	pub fn from_data_url(url: &str) -> Result<Self> {
		let rest = url.strip_prefix("data:").ok_or(Error::InvalidDataUrl)?;
		let (media, payload) = rest.split_once(',').ok_or(Error::InvalidDataUrl)?;
		if !media.ends_with(";base64") {
			return Err(Error::InvalidDataUrl);
		}

		let jpeg = base64::engine::general_purpose::STANDARD.decode(payload)?;
		Ok(Self { jpeg: jpeg.into() })
	}
}

/// Owns a device and, while active, its open handle.
pub struct Capture<D: CaptureDevice> {
	device: D,
	handle: Option<D::Handle>,
}

impl<D: CaptureDevice> Capture<D> {
	pub fn new(device: D) -> Self {
		Self { device, handle: None }
	}

	pub fn state(&self) -> CaptureState {
		match self.handle {
			Some(_) => CaptureState::Active,
			None => CaptureState::Idle,
		}
	}

	/// Open the device, moving to [CaptureState::Active].
	pub async fn start(&mut self, constraints: &Constraints) -> std::result::Result<(), DeviceError> {
		if self.handle.is_some() {
			return Err(DeviceError::Busy);
		}

		let handle = self.device.open(constraints).await?;
		tracing::debug!(width = constraints.width, height = constraints.height, "capture started");

		self.handle = Some(handle);
		Ok(())
	}

	pub fn snapshot(&mut self) -> std::result::Result<Frame, CaptureError> {
		self.handle.as_mut().ok_or(CaptureError::Inactive)?.snapshot()
	}

	/// Release the device, moving to [CaptureState::Idle].
	pub fn stop(&mut self) {
		if let Some(mut handle) = self.handle.take() {
			handle.close();
			tracing::debug!("capture stopped");
		}
	}

	pub fn device(&self) -> &D {
		&self.device
	}
}

impl<D: CaptureDevice> Drop for Capture<D> {
	fn drop(&mut self) {
		self.stop();
	}
}
