use std::io::{self, BufRead, IsTerminal};

use signwatch_api::{AuthSession, Client, Error, FieldErrors, PasswordChange, ProfileUpdate, Registration};

use crate::report;

#[derive(clap::Args, Clone, Debug)]
pub struct Register {
	#[arg(long)]
	pub username: String,

	#[arg(long)]
	pub email: String,

	#[arg(long, default_value = "")]
	pub first_name: String,

	#[arg(long, default_value = "")]
	pub last_name: String,

	/// Read from stdin, twice, if not given.
	#[arg(long, env = "SIGNWATCH_PASSWORD", hide_env_values = true)]
	pub password: Option<String>,
}

#[derive(clap::Args, Clone, Debug)]
pub struct UpdateProfile {
	#[arg(long)]
	pub username: Option<String>,

	#[arg(long)]
	pub email: Option<String>,

	#[arg(long)]
	pub first_name: Option<String>,

	#[arg(long)]
	pub last_name: Option<String>,

	#[arg(long)]
	pub bio: Option<String>,

	#[arg(long)]
	pub location: Option<String>,

	/// The minimum confidence worth showing, 0 to 1.
	#[arg(long)]
	pub threshold: Option<f64>,

	#[arg(long)]
	pub email_notifications: Option<bool>,
}

impl From<UpdateProfile> for ProfileUpdate {
	fn from(args: UpdateProfile) -> Self {
		Self {
			username: args.username,
			email: args.email,
			first_name: args.first_name,
			last_name: args.last_name,
			bio: args.bio,
			location: args.location,
			preferred_confidence_threshold: args.threshold,
			email_notifications: args.email_notifications,
		}
	}
}

#[derive(clap::Args, Clone, Debug)]
pub struct ChangePassword {
	/// Read from stdin if not given.
	#[arg(long)]
	pub old: Option<String>,

	/// Read from stdin, twice, if not given.
	#[arg(long)]
	pub new: Option<String>,
}

// Passwords aren't echoed when typed at a terminal. Piped input is read as a plain line.
fn prompt(label: &str) -> anyhow::Result<String> {
	if io::stdin().is_terminal() {
		return Ok(rpassword::prompt_password(format!("{label}: "))?);
	}

	read_line(&mut io::stdin().lock())
}

fn read_line(input: &mut impl BufRead) -> anyhow::Result<String> {
	let mut line = String::new();
	if input.read_line(&mut line)? == 0 {
		anyhow::bail!("no password given");
	}

	Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Given on the command line, or typed twice.
fn confirmed(given: Option<String>, label: &str) -> anyhow::Result<(String, String)> {
	if let Some(password) = given {
		return Ok((password.clone(), password));
	}

	let password = prompt(label)?;
	let confirm = prompt("confirm")?;
	Ok((password, confirm))
}

// Field errors read better one per line.
fn explain(err: Error) -> anyhow::Error {
	if let Error::Invalid(fields) | Error::Rejected(fields) = &err {
		print_fields(fields);
	}

	err.into()
}

fn print_fields(fields: &FieldErrors) {
	for (field, message) in fields.iter() {
		eprintln!("  {field}: {message}");
	}
}

pub async fn login(
	client: &Client,
	auth: &mut AuthSession,
	username: &str,
	password: Option<String>,
) -> anyhow::Result<()> {
	let password = match password {
		Some(password) => password,
		None => prompt("password")?,
	};

	let user = client.login(auth, username, &password).await.map_err(explain)?;
	println!("logged in as {}", user.username);

	Ok(())
}

pub async fn register(client: &Client, auth: &mut AuthSession, args: Register) -> anyhow::Result<()> {
	let (password, password_confirm) = confirmed(args.password, "password")?;

	let form = Registration {
		username: args.username,
		email: args.email,
		first_name: args.first_name,
		last_name: args.last_name,
		password,
		password_confirm,
	};

	let user = client.register(auth, &form).await.map_err(explain)?;
	println!("registered and logged in as {}", user.username);

	Ok(())
}

pub async fn update_profile(client: &Client, auth: &mut AuthSession, args: UpdateProfile) -> anyhow::Result<()> {
	let update = ProfileUpdate::from(args);
	if update == ProfileUpdate::default() {
		anyhow::bail!("nothing to update");
	}

	let user = client.update_profile(auth, &update).await.map_err(explain)?;
	report::user(&user);

	Ok(())
}

pub async fn change_password(client: &Client, auth: &mut AuthSession, args: ChangePassword) -> anyhow::Result<()> {
	let old_password = match args.old {
		Some(old) => old,
		None => prompt("current password")?,
	};
	let (new_password, new_password_confirm) = confirmed(args.new, "new password")?;

	let change = PasswordChange {
		old_password,
		new_password,
		new_password_confirm,
	};

	client.change_password(auth, &change).await.map_err(explain)?;
	println!("password changed");

	Ok(())
}

pub async fn delete(client: &Client, auth: &mut AuthSession, yes: bool) -> anyhow::Result<()> {
	if !yes {
		anyhow::bail!("refusing to delete the account without --yes");
	}

	client.delete_account(auth).await?;
	println!("account deleted");

	Ok(())
}
