use std::{
	future::Future,
	io,
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use image::{imageops::FilterType, RgbImage};
use signwatch::{CaptureDevice, CaptureError, CaptureHandle, Constraints, DeviceError, Frame};

/// A camera backed by an image file.
///
/// Every snapshot re-reads the file, so another process rewriting it acts as a live feed.
/// Frames are scaled to the requested constraints. Only one handle may be open at a time.
#[derive(Clone, Debug)]
pub struct ImageFileCamera {
	path: PathBuf,
	held: Arc<AtomicBool>,
}

impl ImageFileCamera {
	pub fn new<P: AsRef<Path>>(path: P) -> Self {
		Self {
			path: path.as_ref().to_path_buf(),
			held: Default::default(),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn is_open(&self) -> bool {
		self.held.load(Ordering::SeqCst)
	}
}

fn device_error(err: io::Error) -> DeviceError {
	match err.kind() {
		io::ErrorKind::NotFound => DeviceError::NotFound,
		io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied,
		_ => DeviceError::Other(err.to_string()),
	}
}

fn load(bytes: &[u8], constraints: &Constraints) -> Result<RgbImage, image::ImageError> {
	let image = image::load_from_memory(bytes)?.to_rgb8();
	if image.dimensions() == (constraints.width, constraints.height) {
		return Ok(image);
	}

	Ok(image::imageops::resize(
		&image,
		constraints.width,
		constraints.height,
		FilterType::Triangle,
	))
}

impl CaptureDevice for ImageFileCamera {
	type Handle = ImageFileHandle;

	fn open(&mut self, constraints: &Constraints) -> impl Future<Output = Result<Self::Handle, DeviceError>> + Send {
		let path = self.path.clone();
		let held = self.held.clone();
		let constraints = *constraints;

		async move {
			if constraints.width == 0 || constraints.height == 0 {
				return Err(DeviceError::Other("zero-sized constraints".to_string()));
			}

			let bytes = tokio::fs::read(&path).await.map_err(device_error)?;

			// Make sure the file is actually an image before claiming the device.
			load(&bytes, &constraints).map_err(|err| DeviceError::Other(err.to_string()))?;

			if held.swap(true, Ordering::SeqCst) {
				return Err(DeviceError::Busy);
			}

			tracing::debug!(path = %path.display(), "camera opened");

			Ok(ImageFileHandle {
				path,
				held,
				constraints,
				closed: false,
			})
		}
	}
}

pub struct ImageFileHandle {
	path: PathBuf,
	held: Arc<AtomicBool>,
	constraints: Constraints,
	closed: bool,
}

impl CaptureHandle for ImageFileHandle {
	fn snapshot(&mut self) -> Result<Frame, CaptureError> {
		if self.closed {
			return Err(CaptureError::Inactive);
		}

		let bytes = std::fs::read(&self.path).map_err(|err| {
			tracing::warn!(%err, path = %self.path.display(), "camera file unreadable");
			CaptureError::Disconnected
		})?;

		let image = load(&bytes, &self.constraints).map_err(|err| CaptureError::InvalidFrame(err.to_string()))?;
		Ok(Frame::new(image))
	}

	fn close(&mut self) {
		if self.closed {
			return;
		}

		self.closed = true;
		self.held.store(false, Ordering::SeqCst);
		tracing::debug!(path = %self.path.display(), "camera closed");
	}
}

impl Drop for ImageFileHandle {
	fn drop(&mut self) {
		self.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_png(dir: &tempfile::TempDir, name: &str, width: u32, height: u32) -> PathBuf {
		let path = dir.path().join(name);
		RgbImage::from_pixel(width, height, image::Rgb([10, 200, 10]))
			.save(&path)
			.unwrap();
		path
	}

	#[tokio::test]
	async fn snapshot_scales_to_constraints() {
		let dir = tempfile::tempdir().unwrap();
		let mut camera = ImageFileCamera::new(write_png(&dir, "sign.png", 32, 16));

		let mut handle = camera.open(&Constraints::default()).await.unwrap();
		let frame = handle.snapshot().unwrap();
		assert_eq!((frame.width(), frame.height()), (640, 480));
		assert_eq!(*frame.image.get_pixel(320, 240), image::Rgb([10, 200, 10]));
	}

	#[tokio::test]
	async fn exclusive() {
		let dir = tempfile::tempdir().unwrap();
		let mut camera = ImageFileCamera::new(write_png(&dir, "sign.png", 8, 8));
		let constraints = Constraints { width: 8, height: 8 };

		let mut handle = camera.open(&constraints).await.unwrap();
		assert!(camera.is_open());
		assert_eq!(camera.open(&constraints).await.err(), Some(DeviceError::Busy));

		handle.close();
		handle.close();
		assert!(!camera.is_open());
		assert!(matches!(handle.snapshot(), Err(CaptureError::Inactive)));

		// Dropping a handle releases it too.
		drop(camera.open(&constraints).await.unwrap());
		assert!(!camera.is_open());
		camera.open(&constraints).await.unwrap();
	}

	#[tokio::test]
	async fn missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let mut camera = ImageFileCamera::new(dir.path().join("nope.png"));
		assert_eq!(
			camera.open(&Constraints::default()).await.err(),
			Some(DeviceError::NotFound)
		);
		assert!(!camera.is_open());
	}

	#[tokio::test]
	async fn not_an_image() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("notes.txt");
		std::fs::write(&path, "hello").unwrap();

		let mut camera = ImageFileCamera::new(path);
		assert!(matches!(
			camera.open(&Constraints::default()).await,
			Err(DeviceError::Other(_))
		));
		assert!(!camera.is_open());
	}

	#[tokio::test]
	async fn disconnected_mid_session() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_png(&dir, "sign.png", 8, 8);
		let mut camera = ImageFileCamera::new(&path);

		let mut handle = camera.open(&Constraints { width: 8, height: 8 }).await.unwrap();
		handle.snapshot().unwrap();

		std::fs::remove_file(&path).unwrap();
		assert!(matches!(handle.snapshot(), Err(CaptureError::Disconnected)));

		// It comes back as soon as the file does.
		write_png(&dir, "sign.png", 8, 8);
		assert!(handle.snapshot().is_ok());
	}
}
