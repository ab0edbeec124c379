use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// The outcome of asking whether a cycle may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
	/// Go ahead: capture, encode and send. The request is now in flight.
	Capture,

	/// A request is already outstanding.
	Busy,

	/// The link isn't connected, so sends are suppressed.
	Disconnected,

	/// The scheduler was stopped.
	Inactive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
	pub sent: u64,
	pub skipped: u64,
	pub results: u64,
	pub errors: u64,
	pub failures: u64,
	pub discarded: u64,
}

/// Drives the capture cadence and guards the single outstanding request.
///
/// The wire protocol has no correlation id. Results are matched to requests by arrival order,
/// which only holds while at most one request is in flight.
/// Removing the in-flight gate reintroduces that ambiguity.
pub struct FrameScheduler {
	period: Duration,
	timer: Option<Interval>,
	generation: u64,
	active: bool,
	in_flight: bool,
	stats: SchedulerStats,
}

impl FrameScheduler {
	pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

	pub fn new(period: Duration) -> Self {
		Self {
			period,
			timer: None,
			generation: 0,
			active: false,
			in_flight: false,
			stats: Default::default(),
		}
	}

	pub fn period(&self) -> Duration {
		self.period
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn is_active(&self) -> bool {
		self.active
	}

	pub fn in_flight(&self) -> bool {
		self.in_flight
	}

	pub fn stats(&self) -> SchedulerStats {
		self.stats
	}

	/// Arm the timer for a new session. The first tick fires one period from now.
	pub fn start(&mut self, generation: u64) {
		let mut timer = time::interval_at(Instant::now() + self.period, self.period);
		// A slow cycle shouldn't cause a burst of catch-up ticks.
		timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

		self.timer = Some(timer);
		self.generation = generation;
		self.active = true;
		self.in_flight = false;
		self.stats = Default::default();
	}

	/// Cancel the timer, even if a request is in flight.
	pub fn stop(&mut self) {
		self.timer = None;
		self.active = false;
		self.in_flight = false;
	}

	/// Wait for the next tick. Never resolves while stopped.
	pub async fn tick(&mut self) {
		match self.timer.as_mut() {
			Some(timer) => {
				timer.tick().await;
			}
			None => std::future::pending().await,
		}
	}

	/// Decide whether this tick may issue a request, marking it in flight if so.
	pub fn begin(&mut self, connected: bool) -> Cycle {
		if !self.active {
			return Cycle::Inactive;
		}

		if !connected {
			self.stats.skipped += 1;
			return Cycle::Disconnected;
		}

		if self.in_flight {
			self.stats.skipped += 1;
			return Cycle::Busy;
		}

		self.in_flight = true;
		Cycle::Capture
	}

	/// The request left; now we wait for a reply.
	pub fn sent(&mut self) {
		self.stats.sent += 1;
	}

	/// Capture, encode or send failed before anything was outstanding.
	pub fn abort(&mut self) {
		self.stats.failures += 1;
		self.in_flight = false;
	}

	/// A reply arrived. Returns false if it belongs to a stopped or older session and must be ignored.
	///
	/// Errors count as replies: a backend error must not stall the scheduler.
	pub fn complete(&mut self, generation: u64, ok: bool) -> bool {
		if !self.accepts(generation) {
			self.stats.discarded += 1;
			return false;
		}

		self.in_flight = false;

		match ok {
			true => self.stats.results += 1,
			false => self.stats.errors += 1,
		}

		true
	}

	/// The link dropped, so whatever was in flight will never be answered.
	pub fn disconnected(&mut self, generation: u64) -> bool {
		if !self.accepts(generation) {
			return false;
		}

		self.in_flight = false;
		true
	}

	fn accepts(&self, generation: u64) -> bool {
		self.active && generation == self.generation
	}
}

impl Default for FrameScheduler {
	fn default() -> Self {
		Self::new(Self::DEFAULT_PERIOD)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn single_outstanding() {
		let mut scheduler = FrameScheduler::default();
		scheduler.start(1);

		assert_eq!(scheduler.begin(true), Cycle::Capture);
		scheduler.sent();

		// Every tick until the reply lands is skipped.
		assert_eq!(scheduler.begin(true), Cycle::Busy);
		assert_eq!(scheduler.begin(true), Cycle::Busy);
		assert!(scheduler.in_flight());

		assert!(scheduler.complete(1, true));
		assert!(!scheduler.in_flight());
		assert_eq!(scheduler.begin(true), Cycle::Capture);

		let stats = scheduler.stats();
		assert_eq!(stats.sent, 1);
		assert_eq!(stats.skipped, 2);
		assert_eq!(stats.results, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn error_reply_unblocks() {
		let mut scheduler = FrameScheduler::default();
		scheduler.start(1);

		assert_eq!(scheduler.begin(true), Cycle::Capture);
		assert!(scheduler.complete(1, false));
		assert_eq!(scheduler.begin(true), Cycle::Capture);
		assert_eq!(scheduler.stats().errors, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn abort_unblocks() {
		let mut scheduler = FrameScheduler::default();
		scheduler.start(1);

		assert_eq!(scheduler.begin(true), Cycle::Capture);
		scheduler.abort();
		assert!(!scheduler.in_flight());
		assert_eq!(scheduler.begin(true), Cycle::Capture);
		assert_eq!(scheduler.stats().failures, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn disconnected_suppresses() {
		let mut scheduler = FrameScheduler::default();
		scheduler.start(1);

		assert_eq!(scheduler.begin(false), Cycle::Disconnected);
		assert!(!scheduler.in_flight());
	}

	#[tokio::test(start_paused = true)]
	async fn stale_replies() {
		let mut scheduler = FrameScheduler::default();
		scheduler.start(1);
		assert_eq!(scheduler.begin(true), Cycle::Capture);

		scheduler.stop();
		assert_eq!(scheduler.begin(true), Cycle::Inactive);
		assert!(!scheduler.complete(1, true));

		// A new session ignores replies meant for the old one.
		scheduler.start(2);
		assert_eq!(scheduler.begin(true), Cycle::Capture);
		assert!(!scheduler.complete(1, true));
		assert!(scheduler.in_flight());
		assert!(!scheduler.disconnected(1));
		assert!(scheduler.in_flight());

		assert!(scheduler.complete(2, true));
		assert_eq!(scheduler.stats().discarded, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn ticks_at_period() {
		let mut scheduler = FrameScheduler::new(Duration::from_millis(500));
		scheduler.start(1);

		let start = Instant::now();
		scheduler.tick().await;
		assert_eq!(start.elapsed(), Duration::from_millis(500));

		scheduler.tick().await;
		assert_eq!(start.elapsed(), Duration::from_secs(1));
	}

	#[tokio::test(start_paused = true)]
	async fn stopped_never_ticks() {
		let mut scheduler = FrameScheduler::default();
		scheduler.start(1);
		scheduler.stop();

		let res = time::timeout(Duration::from_secs(10), scheduler.tick()).await;
		assert!(res.is_err());
	}
}
