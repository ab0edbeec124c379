use std::{
	path::{Path, PathBuf},
	time::{Duration, SystemTime},
};

use anyhow::Context;
use serde::Deserialize;
use signwatch_api::{AuthSession, Client};
use signwatch_native::{
	signwatch::{DetectionBatch, Frame, LiveSession, Notice, OverlayRenderer, Raster, SessionConfig, Surface},
	ImageFileCamera, WebSocketConnector,
};
use tokio::sync::broadcast::{self, error::TryRecvError};
use url::Url;

use crate::report;

#[derive(clap::Args, Clone, Debug)]
pub struct Args {
	/// The image file that stands in for the camera.
	///
	/// It is re-read for every frame, so rewriting it acts as a live feed.
	#[arg(long)]
	pub camera: PathBuf,

	/// A TOML file with a [session] table.
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// Frame width, overriding the config file.
	#[arg(long)]
	pub width: Option<u32>,

	/// Frame height, overriding the config file.
	#[arg(long)]
	pub height: Option<u32>,

	/// Milliseconds between frames, overriding the config file.
	#[arg(long)]
	pub period_ms: Option<u64>,

	/// JPEG quality, 1 to 100, overriding the config file.
	#[arg(long)]
	pub quality: Option<u8>,

	/// Stop after this many seconds instead of waiting for ctrl-c.
	#[arg(long)]
	pub duration: Option<u64>,

	/// Write the annotated frame here after every result.
	#[arg(long)]
	pub annotate: Option<PathBuf>,

	/// Connect without the saved login, so nothing is stored in the history.
	#[arg(long)]
	pub anonymous: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
struct File {
	session: SessionConfig,
}

impl Args {
	fn session(&self) -> anyhow::Result<SessionConfig> {
		let mut config = match &self.config {
			Some(path) => {
				let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
				let file: File = toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;
				file.session
			}
			None => SessionConfig::default(),
		};

		if let Some(width) = self.width {
			config.constraints.width = width;
		}
		if let Some(height) = self.height {
			config.constraints.height = height;
		}
		if let Some(period) = self.period_ms {
			config.period = Duration::from_millis(period);
		}
		if let Some(quality) = self.quality {
			config.quality = quality;
		}

		config.validate()?;

		Ok(config)
	}
}

// The saved access token, refreshed if it has expired.
async fn token(client: &Client, auth: &mut AuthSession) -> Option<String> {
	if !auth.is_authenticated() {
		return None;
	}

	if auth.access_token(SystemTime::now()).is_none() {
		if let Err(err) = client.refresh(auth).await {
			tracing::warn!(%err, "continuing anonymously");
			return None;
		}
	}

	auth.access_token(SystemTime::now()).map(str::to_string)
}

async fn shutdown(duration: Option<Duration>) {
	let ctrl_c = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!(%err, "failed to listen for ctrl-c");
		}
	};

	match duration {
		Some(duration) => tokio::select! {
			_ = tokio::time::sleep(duration) => {},
			_ = ctrl_c => {},
		},
		None => ctrl_c.await,
	}
}

fn save(raster: &Raster, path: &Path) {
	if let Err(err) = raster.image().save(path) {
		tracing::warn!(%err, path = %path.display(), "failed to write annotated frame");
	}
}

pub async fn run(args: Args, client: &Client, auth: &mut AuthSession, endpoint: Url) -> anyhow::Result<()> {
	let config = args.session()?;

	let mut connector = WebSocketConnector::new();
	if !args.anonymous {
		if let Some(token) = token(client, auth).await {
			connector = connector.with_token(token);
		}
	}

	let camera = ImageFileCamera::new(&args.camera);
	let surface = Raster::new(config.constraints.width, config.constraints.height);

	tracing::info!(camera = %args.camera.display(), %endpoint, "starting live session");

	let mut session = LiveSession::new(config, endpoint, camera, connector, surface);
	let mut notices = session.subscribe();

	session.start().await.context("failed to start the live session")?;

	let shutdown = shutdown(args.duration.map(Duration::from_secs));
	tokio::pin!(shutdown);

	let lost = loop {
		if let Some(reason) = drain(&mut notices, &session, args.annotate.as_deref()) {
			break Some(reason);
		}

		tokio::select! {
			_ = &mut shutdown => break None,
			_ = session.step() => {},
		}
	};

	session.stop().await;
	drain(&mut notices, &session, None);

	let stats = session.stats();
	tracing::info!(
		sent = stats.sent,
		skipped = stats.skipped,
		results = stats.results,
		errors = stats.errors,
		failures = stats.failures,
		"live session finished"
	);

	match lost {
		Some(reason) => Err(anyhow::anyhow!(reason)),
		None => Ok(()),
	}
}

type Session = LiveSession<ImageFileCamera, WebSocketConnector, Raster>;

// Report every pending notice. Returns why the link is gone, if it is.
fn drain(
	notices: &mut broadcast::Receiver<Notice>,
	session: &Session,
	annotate: Option<&Path>,
) -> Option<String> {
	let mut lost = None;

	loop {
		let notice = match notices.try_recv() {
			Ok(notice) => notice,
			Err(TryRecvError::Lagged(missed)) => {
				tracing::warn!(missed, "dropped notices");
				continue;
			}
			Err(TryRecvError::Empty | TryRecvError::Closed) => return lost,
		};

		match notice {
			Notice::Started { generation } => tracing::debug!(generation, "started"),
			Notice::Connected => tracing::info!("connected"),
			Notice::Established {
				authenticated,
				username,
			} => match username.filter(|_| authenticated) {
				Some(username) => tracing::info!(%username, "detecting; results are saved to your history"),
				None => tracing::info!("detecting anonymously"),
			},
			Notice::Result(batch) => {
				report::batch(&batch);
				if let Some(path) = annotate {
					save(session.surface(), path);
				}
			}
			Notice::Backend(message) => tracing::warn!(%message, "backend rejected a frame"),
			Notice::Device(err) => tracing::error!(%err, "camera unavailable"),
			Notice::CycleFailed(err) => tracing::warn!(%err, "frame skipped"),
			Notice::Connection(err) => {
				tracing::error!(%err, "failed to connect");
				lost = Some(format!("failed to connect: {err}"));
			}
			Notice::Disconnected(err) => {
				match &err {
					Some(err) => tracing::error!(%err, "connection lost"),
					None => tracing::info!("backend closed the connection"),
				}
				lost = Some(match err {
					Some(err) => format!("connection lost: {err}"),
					None => "backend closed the connection".to_string(),
				});
			}
			Notice::Stopped => tracing::debug!("stopped"),
		}
	}
}

/// Run detection once on an image file, over REST.
pub async fn detect(
	client: &Client,
	auth: &mut AuthSession,
	path: &Path,
	annotate: Option<&Path>,
	quality: u8,
) -> anyhow::Result<()> {
	let image = image::open(path)
		.with_context(|| format!("failed to open {}", path.display()))?
		.to_rgb8();

	let frame = Frame::new(image);
	let encoded = frame.encode(quality).context("failed to encode image")?;

	let res = client.detect_frame(auth, &encoded).await?;
	report::detections(&res.detections, res.processing_time);

	if let Some(out) = annotate {
		let mut raster = Raster::new(frame.width(), frame.height());
		raster.present(&frame);

		let batch = DetectionBatch {
			count: res.detections.len(),
			avg_confidence: DetectionBatch::mean_confidence(&res.detections),
			processing_time: res.processing_time,
			boxes: res.detections,
			saved: auth.is_authenticated(),
		};

		OverlayRenderer::new().update(batch, &mut raster);
		raster
			.image()
			.save(out)
			.with_context(|| format!("failed to write {}", out.display()))?;
	}

	Ok(())
}
