use anyhow::Context;
use url::Url;

#[derive(clap::Args, Clone, Debug)]
pub struct ClientConfig {
	/// The backend's base URL, starting with http:// or https://
	#[arg(long, env = "SIGNWATCH_SERVER", default_value = "http://localhost:8000")]
	pub server: Url,
}

impl ClientConfig {
	pub fn endpoints(&self) -> anyhow::Result<Endpoints> {
		Endpoints::new(&self.server)
	}
}

/// The two places the backend listens, derived from its base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
	/// The streaming detection link, ie. `wss://host/ws/detect/`.
	pub detect: Url,

	/// The REST root, ie. `https://host/api/`.
	pub api: Url,
}

impl Endpoints {
	pub fn new(server: &Url) -> anyhow::Result<Self> {
		let ws = match server.scheme() {
			"http" => "ws",
			"https" => "wss",
			scheme => anyhow::bail!("unsupported scheme: {scheme}"),
		};

		// Treat the path as a directory so joins append rather than replace.
		let mut base = server.clone();
		base.set_query(None);
		base.set_fragment(None);
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}

		let api = base.join("api/").context("invalid server url")?;

		let mut detect = base.join("ws/detect/").context("invalid server url")?;
		detect
			.set_scheme(ws)
			.map_err(|_| anyhow::anyhow!("failed to derive websocket url from {server}"))?;

		Ok(Self { detect, api })
	}
}
