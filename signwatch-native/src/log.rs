use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(clap::Args, Clone, Debug)]
pub struct Log {
	/// The default log level, overridden per target by RUST_LOG.
	#[arg(id = "log-level", long = "log-level", default_value = "info", env = "SIGNWATCH_LOG_LEVEL")]
	pub level: tracing::Level,
}

impl Default for Log {
	fn default() -> Self {
		Self {
			level: tracing::Level::INFO,
		}
	}
}

impl Log {
	pub fn filter(&self) -> EnvFilter {
		let mut filter = EnvFilter::builder()
			.with_default_directive(LevelFilter::from_level(self.level).into())
			.from_env_lossy(); // Allow overriding with RUST_LOG

		// The HTTP and WebSocket stacks are far too chatty below info.
		for directive in [
			"hyper_util=info",
			"reqwest=info",
			"rustls=info",
			"tungstenite=info",
			"tokio_tungstenite=info",
			"tracing::span=off",
			"tracing::span::active=off",
		] {
			if let Ok(directive) = directive.parse() {
				filter = filter.add_directive(directive);
			}
		}

		filter
	}

	/// Install the global subscriber, writing to stderr.
	///
	/// Does nothing if a subscriber is already installed.
	pub fn init(&self) {
		let logger = tracing_subscriber::FmtSubscriber::builder()
			.with_writer(std::io::stderr)
			.with_env_filter(self.filter())
			.finish();

		if tracing::subscriber::set_global_default(logger).is_err() {
			tracing::debug!("tracing subscriber already installed");
		}
	}
}
