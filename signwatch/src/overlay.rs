//! Draws the latest detections over the video.
//!
//! Boxes arrive in fractional coordinates and are scaled to the surface at draw time,
//! since the surface may be resized while a request is in flight.
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::{DetectionBatch, DetectionBox, Frame};

/// A box in whole surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
	pub x: u32,
	pub y: u32,
	pub width: u32,
	pub height: u32,
}

impl PixelRect {
	/// Scale a fractional box to a `width`×`height` surface, clamping it inside.
	pub fn scale(detection: &DetectionBox, width: u32, height: u32) -> Self {
		let b = detection.clamped();

		let x = (b.x * width as f64).round() as u32;
		let y = (b.y * height as f64).round() as u32;

		Self {
			x: x.min(width),
			y: y.min(height),
			width: ((b.width * width as f64).round() as u32).min(width.saturating_sub(x)),
			height: ((b.height * height as f64).round() as u32).min(height.saturating_sub(y)),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.width == 0 || self.height == 0
	}
}

/// Something the overlay can be painted on.
pub trait Surface {
	/// The current displayed size, in pixels.
	fn size(&self) -> (u32, u32);

	/// Wipe the whole overlay.
	fn clear(&mut self);

	/// Outline one detection, with room for its `"{label}: {pct}%"` caption.
	///
	/// Rendering the caption text is up to the surface; [Raster] only paints a bar sized to it.
	fn draw(&mut self, rect: PixelRect, label: &str);

	/// The frame that was just sent for detection.
	fn present(&mut self, _frame: &Frame) {}
}

/// Holds the latest batch and paints it on demand.
#[derive(Debug, Default)]
pub struct OverlayRenderer {
	latest: Option<DetectionBatch>,
}

impl OverlayRenderer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn latest(&self) -> Option<&DetectionBatch> {
		self.latest.as_ref()
	}

	/// Replace the batch and repaint.
	pub fn update<S: Surface>(&mut self, batch: DetectionBatch, surface: &mut S) {
		self.latest = Some(batch);
		self.render(surface);
	}

	/// Repaint the latest batch at the surface's current size.
	///
	/// The previous overlay is cleared first. Boxes are painted in batch order, later on top.
	pub fn render<S: Surface>(&self, surface: &mut S) {
		surface.clear();

		let Some(batch) = &self.latest else {
			return;
		};

		let (width, height) = surface.size();
		for detection in &batch.boxes {
			surface.draw(PixelRect::scale(detection, width, height), &detection.label_text());
		}
	}

	/// Drop the batch and wipe the surface.
	pub fn clear<S: Surface>(&mut self, surface: &mut S) {
		self.latest = None;
		surface.clear();
	}
}

/// An in-memory RGB surface that paints outlines and label bars.
///
/// Glyphs are not rendered; the bar width follows the label length.
pub struct Raster {
	background: Option<RgbImage>,
	canvas: RgbImage,
}

impl Raster {
	const COLOR: Rgb<u8> = Rgb([0x22, 0xc5, 0x5e]);
	const LABEL_HEIGHT: u32 = 20;
	const LABEL_OFFSET: i32 = 25;
	const GLYPH_WIDTH: u32 = 8;

	pub fn new(width: u32, height: u32) -> Self {
		Self {
			background: None,
			canvas: RgbImage::new(width, height),
		}
	}

	pub fn image(&self) -> &RgbImage {
		&self.canvas
	}

	/// Change the displayed size, dropping the background.
	pub fn resize(&mut self, width: u32, height: u32) {
		self.background = None;
		self.canvas = RgbImage::new(width, height);
	}
}

impl Surface for Raster {
	fn size(&self) -> (u32, u32) {
		self.canvas.dimensions()
	}

	fn clear(&mut self) {
		match &self.background {
			Some(background) => self.canvas.clone_from(background),
			None => self.canvas.pixels_mut().for_each(|p| *p = Rgb([0, 0, 0])),
		}
	}

	fn draw(&mut self, rect: PixelRect, label: &str) {
		if rect.is_empty() {
			return;
		}

		let (x, y) = (rect.x as i32, rect.y as i32);

		// Two pixels wide.
		draw_hollow_rect_mut(&mut self.canvas, Rect::at(x, y).of_size(rect.width, rect.height), Self::COLOR);
		if rect.width > 2 && rect.height > 2 {
			draw_hollow_rect_mut(
				&mut self.canvas,
				Rect::at(x + 1, y + 1).of_size(rect.width - 2, rect.height - 2),
				Self::COLOR,
			);
		}

		let bar = label.chars().count() as u32 * Self::GLYPH_WIDTH + 10;
		draw_filled_rect_mut(
			&mut self.canvas,
			Rect::at(x, y - Self::LABEL_OFFSET).of_size(bar, Self::LABEL_HEIGHT),
			Self::COLOR,
		);
	}

	fn present(&mut self, frame: &Frame) {
		let mut background = frame.image.clone();
		if background.dimensions() != self.canvas.dimensions() {
			let (width, height) = self.canvas.dimensions();
			background = image::imageops::resize(&background, width, height, image::imageops::FilterType::Triangle);
		}

		self.background = Some(background);
	}
}
