use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use signwatch_api::{AuthSession, SortKey};
use signwatch_native::{ClientConfig, Log};
use signwatch_token::TokenStore;

mod account;
mod live;
mod report;

#[derive(Parser, Clone, Debug)]
#[command(name = "signwatch")]
#[command(about = "Detect traffic signs with a signwatch backend", long_about = None)]
pub struct Cli {
	/// The backend to talk to.
	#[command(flatten)]
	pub client: ClientConfig,

	/// The log configuration.
	#[command(flatten)]
	pub log: Log,

	/// Where the login is kept between runs.
	///
	/// Defaults to ~/.config/signwatch/tokens.json
	#[arg(long, env = "SIGNWATCH_TOKEN_FILE")]
	pub token_file: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Command,
}

impl Cli {
	fn token_file(&self) -> PathBuf {
		if let Some(path) = &self.token_file {
			return path.clone();
		}

		match std::env::var_os("HOME") {
			Some(home) => PathBuf::from(home).join(".config/signwatch/tokens.json"),
			None => PathBuf::from(".signwatch-tokens.json"),
		}
	}
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
	/// Stream frames from an image file to the backend and print what it sees.
	Live(live::Args),

	/// Log in and keep the tokens for later runs.
	Login {
		username: String,

		/// Read from stdin if not given.
		#[arg(long, env = "SIGNWATCH_PASSWORD", hide_env_values = true)]
		password: Option<String>,
	},

	/// Create an account and log in.
	Register(account::Register),

	/// Revoke the saved login and forget it.
	Logout,

	/// Show the logged-in user.
	Profile,

	/// Change profile fields; only the ones given are sent.
	UpdateProfile(account::UpdateProfile),

	ChangePassword(account::ChangePassword),

	/// Delete the account for good.
	DeleteAccount {
		/// Required, since there is no undo.
		#[arg(long)]
		yes: bool,
	},

	/// List past detections.
	History {
		/// Only records with a sign whose name contains this, ignoring case.
		#[arg(long, default_value = "")]
		search: String,

		/// One of timestamp, detections_count, confidence_avg, processing_time.
		#[arg(long, default_value = "timestamp")]
		sort: SortKey,

		/// Show at most this many records.
		#[arg(long)]
		limit: Option<usize>,
	},

	/// Show detection statistics, your own by default.
	Stats {
		/// Everyone's detections instead of your own.
		#[arg(long, conflicts_with = "account")]
		global: bool,

		/// Account totals: sessions, signs, member since.
		#[arg(long)]
		account: bool,
	},

	/// Run detection once on an image file.
	Detect {
		image: PathBuf,

		/// Write the image with the detections drawn on it.
		#[arg(long)]
		annotate: Option<PathBuf>,

		/// JPEG quality of the upload, 1 to 100.
		#[arg(long, default_value_t = signwatch_native::signwatch::capture::DEFAULT_QUALITY)]
		quality: u8,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	cli.log.init();

	let endpoints = cli.client.endpoints()?;
	let store = TokenStore::new(cli.token_file());
	let mut auth = AuthSession::restore(store).context("failed to load the saved login")?;
	let client = signwatch_api::Client::new(endpoints.api);

	tracing::debug!(api = %client.base(), detect = %endpoints.detect, "using backend");

	match cli.command {
		Command::Live(args) => live::run(args, &client, &mut auth, endpoints.detect).await,
		Command::Login { username, password } => account::login(&client, &mut auth, &username, password).await,
		Command::Register(form) => account::register(&client, &mut auth, form).await,
		Command::Logout => {
			client.logout(&mut auth).await;
			Ok(())
		}
		Command::Profile => {
			let user = client.profile(&mut auth).await?;
			report::user(&user);
			Ok(())
		}
		Command::UpdateProfile(update) => account::update_profile(&client, &mut auth, update).await,
		Command::ChangePassword(change) => account::change_password(&client, &mut auth, change).await,
		Command::DeleteAccount { yes } => account::delete(&client, &mut auth, yes).await,
		Command::History { search, sort, limit } => {
			let records = client.detections(&mut auth).await?;
			let matched = signwatch_api::query(&records, &search, sort);
			report::history(&matched, limit);
			Ok(())
		}
		Command::Stats { global, account } => {
			if account {
				report::user_stats(&client.user_stats(&mut auth).await?);
			} else if global {
				report::stats(&client.global_stats(&mut auth).await?);
			} else {
				report::stats(&client.detection_stats(&mut auth).await?);
			}
			Ok(())
		}
		Command::Detect {
			image,
			annotate,
			quality,
		} => live::detect(&client, &mut auth, &image, annotate.as_deref(), quality).await,
	}
}
