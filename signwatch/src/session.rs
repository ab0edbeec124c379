use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tokio::sync::broadcast;
use url::Url;

use crate::{
	capture::DEFAULT_QUALITY, Capture, CaptureDevice, CaptureState, ClientMessage, Connector, Constraints, Cycle,
	DetectionBatch, DeviceError, Error, FrameScheduler, Incoming, LinkEvent, OverlayRenderer, Result,
	SchedulerStats, SessionLink, SessionState, Surface,
};

/// Tunables for a [LiveSession].
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
	/// The requested camera geometry.
	pub constraints: Constraints,

	/// How often a frame is captured and sent.
	#[serde(rename = "period_ms")]
	#[serde_as(as = "DurationMilliSeconds<u64>")]
	pub period: Duration,

	/// JPEG quality, 1 to 100.
	pub quality: u8,
}

impl SessionConfig {
	/// Catch values that would otherwise fail later, mid-session.
	pub fn validate(&self) -> Result<()> {
		if self.period.is_zero() {
			return Err(Error::InvalidConfig("period must be positive"));
		}

		if !(1..=100).contains(&self.quality) {
			return Err(Error::InvalidConfig("quality must be between 1 and 100"));
		}

		if self.constraints.width == 0 || self.constraints.height == 0 {
			return Err(Error::InvalidConfig("frame size must be positive"));
		}

		Ok(())
	}
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			constraints: Constraints::default(),
			period: FrameScheduler::DEFAULT_PERIOD,
			quality: DEFAULT_QUALITY,
		}
	}
}

/// Everything worth telling the user about.
#[derive(Debug, Clone)]
pub enum Notice {
	Started { generation: u64 },
	Connected,
	Established { authenticated: bool, username: Option<String> },
	Result(DetectionBatch),

	/// The backend rejected a frame.
	Backend(String),

	/// The camera could not be opened; the session did not start.
	Device(DeviceError),

	/// The link could not be opened. Capture continues but nothing is sent.
	Connection(Error),

	/// One capture/encode/send cycle failed. The next tick tries again.
	CycleFailed(Error),

	/// The link dropped. Nothing more is sent until a restart.
	Disconnected(Option<Error>),

	Stopped,
}

/// One camera, one link, one scheduler and one overlay.
///
/// All state lives on the task that drives [LiveSession::run] (or [LiveSession::step]).
/// The only other task is the link's I/O task, reached through channels.
pub struct LiveSession<D: CaptureDevice, C: Connector, S: Surface> {
	// Declared in teardown order so dropping mirrors stop():
	// timer, then link, then camera.
	scheduler: FrameScheduler,
	link: SessionLink,
	capture: Capture<D>,

	renderer: OverlayRenderer,
	surface: S,

	connector: C,
	endpoint: Url,
	config: SessionConfig,
	generation: u64,
	notices: broadcast::Sender<Notice>,
}

impl<D: CaptureDevice, C: Connector, S: Surface> LiveSession<D, C, S> {
	pub fn new(config: SessionConfig, endpoint: Url, device: D, connector: C, surface: S) -> Self {
		Self {
			scheduler: FrameScheduler::new(config.period),
			link: SessionLink::new(0),
			capture: Capture::new(device),
			renderer: OverlayRenderer::new(),
			surface,
			connector,
			endpoint,
			config,
			generation: 0,
			notices: broadcast::channel(64).0,
		}
	}

	/// Receive every [Notice] published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
		self.notices.subscribe()
	}

	pub fn is_active(&self) -> bool {
		self.scheduler.is_active() || self.capture.state() == CaptureState::Active
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn link_state(&self) -> SessionState {
		self.link.state()
	}

	pub fn capture_state(&self) -> CaptureState {
		self.capture.state()
	}

	pub fn in_flight(&self) -> bool {
		self.scheduler.in_flight()
	}

	pub fn stats(&self) -> SchedulerStats {
		self.scheduler.stats()
	}

	pub fn latest(&self) -> Option<&DetectionBatch> {
		self.renderer.latest()
	}

	pub fn surface(&self) -> &S {
		&self.surface
	}

	pub fn device(&self) -> &D {
		self.capture.device()
	}

	/// Repaint the latest batch, ie. after the surface was resized.
	pub fn redraw(&mut self) {
		self.renderer.render(&mut self.surface);
	}

	/// Open the camera, connect the link and arm the timer.
	///
	/// Fails only if a session is already running, the config is invalid or the camera can't be opened.
	/// A connection failure is published as [Notice::Connection] and leaves the link faulted;
	/// capture keeps running with sends suppressed until the next restart.
	pub async fn start(&mut self) -> Result<()> {
		if self.is_active() {
			return Err(Error::SessionActive);
		}

		self.config.validate()?;

		self.generation += 1;
		let generation = self.generation;

		if let Err(err) = self.capture.start(&self.config.constraints).await {
			tracing::warn!(%err, "failed to open camera");
			self.notify(Notice::Device(err.clone()));
			return Err(err.into());
		}

		self.link = SessionLink::new(generation);
		match self.link.connect(&self.connector, &self.endpoint).await {
			Ok(()) => self.notify(Notice::Connected),
			Err(err) => self.notify(Notice::Connection(err)),
		}

		self.scheduler.start(generation);

		tracing::info!(generation, period = ?self.config.period, "session started");
		self.notify(Notice::Started { generation });

		Ok(())
	}

	/// Tear everything down: timer, link, camera, overlay. In that order.
	///
	/// Safe to call at any time, any number of times.
	pub async fn stop(&mut self) {
		let active = self.is_active();

		self.scheduler.stop();
		self.link.close().await;
		self.capture.stop();
		self.renderer.clear(&mut self.surface);

		if active {
			tracing::info!(generation = self.generation, stats = ?self.scheduler.stats(), "session stopped");
			self.notify(Notice::Stopped);
		}
	}

	/// Drive the session until `shutdown` resolves, then stop it.
	pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) {
		tokio::pin!(shutdown);

		loop {
			tokio::select! {
				_ = &mut shutdown => break,
				_ = self.step() => {},
			}
		}

		self.stop().await;
	}

	/// Wait for the next timer tick or link event and handle it.
	///
	/// Cancel-safe: nothing happens until one of them fires, and handling doesn't await.
	pub async fn step(&mut self) {
		tokio::select! {
			_ = self.scheduler.tick() => self.cycle(),
			Some(incoming) = self.link.next() => self.handle(incoming),
		}
	}

	/// Run one capture cycle, unless a request is already in flight.
	pub fn cycle(&mut self) {
		match self.scheduler.begin(self.link.is_connected()) {
			Cycle::Capture => {}
			Cycle::Busy => {
				tracing::trace!("request in flight; skipping cycle");
				return;
			}
			Cycle::Disconnected => {
				tracing::trace!(state = %self.link.state(), "not connected; skipping cycle");
				return;
			}
			Cycle::Inactive => return,
		}

		match self.capture_and_send() {
			Ok(()) => self.scheduler.sent(),
			Err(err) => {
				tracing::warn!(%err, "capture cycle failed");
				self.scheduler.abort();
				self.notify(Notice::CycleFailed(err));
			}
		}
	}

	fn capture_and_send(&mut self) -> Result<()> {
		let frame = self.capture.snapshot()?;
		let encoded = frame.encode(self.config.quality)?;

		tracing::debug!(?frame, ?encoded, "sending frame");
		self.link.send(&ClientMessage::detect_frame(encoded.to_data_url()))?;

		// Single outstanding request, so the next result belongs to this frame.
		self.surface.present(&frame);

		Ok(())
	}

	/// Apply one link event, discarding it if it belongs to a stopped or older session.
	pub fn handle(&mut self, incoming: Incoming) {
		let Incoming { generation, event } = incoming;

		match event {
			LinkEvent::Established {
				authenticated,
				username,
			} => {
				if generation != self.generation {
					return;
				}

				tracing::info!(authenticated, ?username, "backend ready");
				self.notify(Notice::Established {
					authenticated,
					username,
				});
			}
			LinkEvent::Result(batch) => {
				if !self.scheduler.complete(generation, true) {
					tracing::debug!(generation, "discarding stale result");
					return;
				}

				tracing::debug!(
					count = batch.count,
					confidence = batch.avg_confidence,
					processing = batch.processing_time,
					"detection result"
				);

				self.renderer.update(batch.clone(), &mut self.surface);
				self.notify(Notice::Result(batch));
			}
			LinkEvent::Error(message) => {
				if !self.scheduler.complete(generation, false) {
					tracing::debug!(generation, "discarding stale error");
					return;
				}

				tracing::warn!(%message, "backend error");
				self.notify(Notice::Backend(message));
			}
			LinkEvent::Closed(err) => {
				if !self.scheduler.disconnected(generation) {
					return;
				}

				self.notify(Notice::Disconnected(err));
			}
		}
	}

	fn notify(&self, notice: Notice) {
		// No subscribers is fine.
		self.notices.send(notice).ok();
	}
}
