//! Plain-text output on stdout. Logs go to stderr.
use signwatch_api::{DetectionRecord, DetectionStats, User, UserStats};
use signwatch_native::signwatch::{DetectionBatch, DetectionBox};

pub fn detections(boxes: &[DetectionBox], processing_time: f64) {
	if boxes.is_empty() {
		println!("no signs ({:.0} ms)", processing_time * 1000.0);
		return;
	}

	println!("{} sign(s) ({:.0} ms)", boxes.len(), processing_time * 1000.0);
	for detection in boxes {
		let b = detection.clamped();
		println!(
			"  {:<32} {:>6} at x={:.3} y={:.3} w={:.3} h={:.3}",
			detection.label_text(),
			detection.level().to_string(),
			b.x,
			b.y,
			b.width,
			b.height
		);
	}
}

pub fn batch(batch: &DetectionBatch) {
	if !batch.is_consistent() {
		tracing::warn!(count = batch.count, boxes = batch.boxes.len(), "backend count disagrees");
	}

	detections(&batch.boxes, batch.processing_time);
}

pub fn user(user: &User) {
	println!("{} <{}>", user.username, user.email);

	let name = format!("{} {}", user.first_name, user.last_name);
	if !name.trim().is_empty() {
		println!("  name:       {}", name.trim());
	}

	if let Some(joined) = user.date_joined {
		println!("  joined:     {}", joined.format("%Y-%m-%d"));
	}

	if let Some(profile) = &user.profile {
		if !profile.bio.is_empty() {
			println!("  bio:        {}", profile.bio);
		}
		if !profile.location.is_empty() {
			println!("  location:   {}", profile.location);
		}
		println!("  threshold:  {:.0}%", profile.preferred_confidence_threshold * 100.0);
		println!("  email:      {}", if profile.email_notifications { "on" } else { "off" });
	}
}

pub fn history(records: &[&DetectionRecord], limit: Option<usize>) {
	if records.is_empty() {
		println!("no detections");
		return;
	}

	let shown = limit.unwrap_or(records.len()).min(records.len());
	for record in &records[..shown] {
		let signs: Vec<_> = record.results.iter().map(|r| r.label.as_str()).collect();
		println!(
			"#{:<6} {}  {:>2} sign(s)  {:>5.1}% {:<6}  {:>4.0} ms  {}",
			record.id,
			record.timestamp.format("%Y-%m-%d %H:%M:%S"),
			record.detections_count,
			record.confidence_avg * 100.0,
			record.level().to_string(),
			record.processing_time * 1000.0,
			signs.join(", ")
		);
	}

	if shown < records.len() {
		println!("... {} more", records.len() - shown);
	}
}

pub fn stats(stats: &DetectionStats) {
	println!("detections:       {}", stats.total_detections);
	println!("avg confidence:   {:.1}%", stats.avg_confidence * 100.0);
	println!("avg processing:   {:.0} ms", stats.avg_processing_time * 1000.0);

	if !stats.most_detected_signs.is_empty() {
		println!("most detected:");
		for sign in &stats.most_detected_signs {
			println!("  {:<32} {}", sign.class_name, sign.count);
		}
	}
}

pub fn user_stats(stats: &UserStats) {
	println!("sessions:         {}", stats.total_sessions);
	println!("signs detected:   {}", stats.total_signs_detected);
	println!("avg confidence:   {:.1}%", stats.avg_confidence * 100.0);
	println!("avg processing:   {:.0} ms", stats.avg_processing_time * 1000.0);
	println!("member since:     {}", stats.member_since.format("%Y-%m-%d"));
}
