use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One detected sign in a frame.
///
/// Geometry is fractional: every coordinate is a ratio of the frame size in `[0, 1]`.
/// The backend does not enforce that the box stays inside the frame; see [DetectionBox::clamped].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectionBox {
	/// The sign category.
	#[serde(rename = "class_name")]
	pub label: String,

	/// 0.0 to 1.0
	pub confidence: f64,

	#[serde(rename = "bbox_x")]
	pub x: f64,

	#[serde(rename = "bbox_y")]
	pub y: f64,

	#[serde(rename = "bbox_width")]
	pub width: f64,

	#[serde(rename = "bbox_height")]
	pub height: f64,
}

impl DetectionBox {
	/// The overlay label, ie. `stop: 87.5%`.
	pub fn label_text(&self) -> String {
		format!("{}: {:.1}%", self.label, self.confidence * 100.0)
	}

	/// Force the box inside the unit square.
	///
	/// The origin is clamped first, then the size is clamped to whatever room is left.
	/// NaN collapses to zero.
	pub fn clamped(&self) -> Self {
		let x = unit(self.x);
		let y = unit(self.y);

		Self {
			label: self.label.clone(),
			confidence: unit(self.confidence),
			x,
			y,
			width: unit(self.width).min(1.0 - x),
			height: unit(self.height).min(1.0 - y),
		}
	}

	pub fn level(&self) -> ConfidenceLevel {
		ConfidenceLevel::from(self.confidence)
	}
}

fn unit(v: f64) -> f64 {
	if v.is_nan() {
		return 0.0;
	}
	v.clamp(0.0, 1.0)
}

/// The result of one inference request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DetectionBatch {
	/// In backend order, which carries no meaning for the client.
	#[serde(rename = "detections", default)]
	pub boxes: Vec<DetectionBox>,

	/// Expected to equal `boxes.len()`.
	#[serde(rename = "detections_count")]
	pub count: usize,

	/// Mean confidence across `boxes`.
	#[serde(rename = "confidence_avg")]
	pub avg_confidence: f64,

	/// Backend-reported latency in seconds.
	#[serde(rename = "processing_time")]
	pub processing_time: f64,

	/// Whether the backend stored this batch in the user's history.
	#[serde(default)]
	pub saved: bool,
}

impl DetectionBatch {
	/// Build a batch, computing the aggregate fields from the boxes.
	pub fn new(boxes: Vec<DetectionBox>, processing_time: Duration) -> Self {
		Self {
			count: boxes.len(),
			avg_confidence: Self::mean_confidence(&boxes),
			processing_time: processing_time.as_secs_f64(),
			boxes,
			saved: false,
		}
	}

	/// Mean confidence, or zero for an empty slice.
	pub fn mean_confidence(boxes: &[DetectionBox]) -> f64 {
		if boxes.is_empty() {
			return 0.0;
		}

		boxes.iter().map(|b| b.confidence).sum::<f64>() / boxes.len() as f64
	}

	/// Whether the reported count matches the boxes we actually got.
	pub fn is_consistent(&self) -> bool {
		self.count == self.boxes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.boxes.is_empty()
	}

	/// The reported latency, treating garbage as zero.
	pub fn processing_time(&self) -> Duration {
		Duration::try_from_secs_f64(self.processing_time).unwrap_or_default()
	}
}

/// The coarse confidence tiers shown next to each detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, derive_more::Display)]
pub enum ConfidenceLevel {
	#[display("low")]
	Low,
	#[display("medium")]
	Medium,
	#[display("high")]
	High,
}

impl From<f64> for ConfidenceLevel {
	fn from(confidence: f64) -> Self {
		if confidence > 0.8 {
			Self::High
		} else if confidence > 0.6 {
			Self::Medium
		} else {
			Self::Low
		}
	}
}
