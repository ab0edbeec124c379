use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signwatch::{ConfidenceLevel, DetectionBox};
use signwatch_token::TokenPair;

fn yes() -> bool {
	true
}

fn default_threshold() -> f64 {
	0.25
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
	pub id: u64,
	pub username: String,

	#[serde(default)]
	pub email: String,

	#[serde(default)]
	pub first_name: String,

	#[serde(default)]
	pub last_name: String,

	#[serde(default)]
	pub date_joined: Option<DateTime<Utc>>,

	#[serde(default)]
	pub profile: Option<Profile>,
}

/// Per-user preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
	#[serde(default)]
	pub bio: String,

	#[serde(default)]
	pub location: String,

	#[serde(default = "default_threshold")]
	pub preferred_confidence_threshold: f64,

	#[serde(default = "yes")]
	pub email_notifications: bool,
}

impl Default for Profile {
	fn default() -> Self {
		Self {
			bio: String::new(),
			location: String::new(),
			preferred_confidence_threshold: default_threshold(),
			email_notifications: true,
		}
	}
}

/// A partial profile update; only the fields that are set are sent.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileUpdate {
	pub username: Option<String>,
	pub email: Option<String>,
	pub first_name: Option<String>,
	pub last_name: Option<String>,
	pub bio: Option<String>,
	pub location: Option<String>,
	pub preferred_confidence_threshold: Option<f64>,
	pub email_notifications: Option<bool>,
}

/// The body of a successful login or registration.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Authenticated {
	pub user: User,
	pub tokens: TokenPair,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Refreshed {
	pub access: String,

	/// Only present when the backend rotates refresh tokens.
	#[serde(default)]
	pub refresh: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Updated {
	pub user: User,
}

/// Totals for the logged-in account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStats {
	pub total_sessions: u64,
	pub total_signs_detected: u64,
	pub avg_confidence: f64,
	pub avg_processing_time: f64,
	pub member_since: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignCount {
	pub class_name: String,
	pub count: u64,
}

/// Aggregate detection statistics, either for one user or everyone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectionStats {
	pub total_detections: u64,
	pub avg_processing_time: f64,
	pub avg_confidence: f64,

	/// The most frequent signs, most frequent first.
	#[serde(default)]
	pub most_detected_signs: Vec<SignCount>,
}

/// One stored detection from the user's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionRecord {
	pub id: u64,
	pub timestamp: DateTime<Utc>,

	/// A URL to the stored image, if one was kept.
	#[serde(default)]
	pub image: Option<String>,

	pub detections_count: usize,
	pub confidence_avg: f64,

	/// Seconds.
	pub processing_time: f64,

	#[serde(default)]
	pub results: Vec<DetectionBox>,
}

impl DetectionRecord {
	pub fn level(&self) -> ConfidenceLevel {
		ConfidenceLevel::from(self.confidence_avg)
	}

	/// Whether any result's class name contains `term`, ignoring case.
	pub fn mentions(&self, term: &str) -> bool {
		let term = term.to_lowercase();
		self.results.iter().any(|r| r.label.to_lowercase().contains(&term))
	}
}

/// The reply to a single-image detection request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectResponse {
	/// The stored record.
	pub detection: DetectionRecord,

	pub detections: Vec<DetectionBox>,
	pub processing_time: f64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn record() {
		let record: DetectionRecord = serde_json::from_str(
			r#"{
				"id": 12,
				"timestamp": "2024-05-01T10:30:00.123456Z",
				"image": null,
				"detections_count": 1,
				"confidence_avg": 0.82,
				"processing_time": 0.041,
				"results": [{
					"class_name": "Speed Limit 30",
					"confidence": 0.82,
					"bbox_x": 0.1,
					"bbox_y": 0.1,
					"bbox_width": 0.2,
					"bbox_height": 0.2
				}]
			}"#,
		)
		.unwrap();

		assert_eq!(record.level(), ConfidenceLevel::High);
		assert!(record.mentions("speed"));
		assert!(record.mentions("LIMIT 3"));
		assert!(!record.mentions("stop"));
	}

	#[test]
	fn user_without_profile() {
		let user: User = serde_json::from_str(r#"{"id": 1, "username": "ada"}"#).unwrap();
		assert!(user.profile.is_none());
		assert_eq!(user.email, "");
	}

	#[test]
	fn profile_defaults() {
		let profile: Profile = serde_json::from_str("{}").unwrap();
		assert_eq!(profile, Profile::default());
		assert!(profile.email_notifications);
	}

	#[test]
	fn partial_update() {
		let update = ProfileUpdate {
			bio: Some("Cyclist".to_string()),
			email_notifications: Some(false),
			..Default::default()
		};

		assert_eq!(
			serde_json::to_value(&update).unwrap(),
			serde_json::json!({ "bio": "Cyclist", "email_notifications": false })
		);
	}
}
