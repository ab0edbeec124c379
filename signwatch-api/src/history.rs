use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::DetectionRecord;

/// How to order the detection history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
	/// Newest first.
	#[default]
	Timestamp,

	/// Most detections first.
	DetectionsCount,

	/// Most confident first.
	ConfidenceAvg,

	/// Fastest first.
	ProcessingTime,
}

impl SortKey {
	pub const ALL: [SortKey; 4] = [
		SortKey::Timestamp,
		SortKey::DetectionsCount,
		SortKey::ConfidenceAvg,
		SortKey::ProcessingTime,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Timestamp => "timestamp",
			Self::DetectionsCount => "detections_count",
			Self::ConfidenceAvg => "confidence_avg",
			Self::ProcessingTime => "processing_time",
		}
	}

	pub fn compare(&self, a: &DetectionRecord, b: &DetectionRecord) -> Ordering {
		match self {
			Self::Timestamp => b.timestamp.cmp(&a.timestamp),
			Self::DetectionsCount => b.detections_count.cmp(&a.detections_count),
			Self::ConfidenceAvg => b.confidence_avg.total_cmp(&a.confidence_avg),
			Self::ProcessingTime => a.processing_time.total_cmp(&b.processing_time),
		}
	}
}

impl fmt::Display for SortKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort key: {0}")]
pub struct UnknownSortKey(String);

impl FromStr for SortKey {
	type Err = UnknownSortKey;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|key| key.as_str() == s)
			.ok_or_else(|| UnknownSortKey(s.to_string()))
	}
}

/// Filter the history by sign name, then sort it.
///
/// An empty `search` keeps everything. Records that compare equal keep their original order.
pub fn query<'a>(records: &'a [DetectionRecord], search: &str, sort: SortKey) -> Vec<&'a DetectionRecord> {
	let search = search.trim();

	let mut matched: Vec<_> = records
		.iter()
		.filter(|record| search.is_empty() || record.mentions(search))
		.collect();

	matched.sort_by(|a, b| sort.compare(a, b));
	matched
}
