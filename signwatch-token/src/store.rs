use std::{
	io,
	path::{Path, PathBuf},
};

use anyhow::Context;

use crate::TokenPair;

/// Keeps a [TokenPair] on disk between runs, as JSON.
#[derive(Clone, Debug)]
pub struct TokenStore {
	path: PathBuf,
}

impl TokenStore {
	pub fn new<P: AsRef<Path>>(path: P) -> Self {
		Self {
			path: path.as_ref().to_path_buf(),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns `None` if nothing was saved.
	pub fn load(&self) -> anyhow::Result<Option<TokenPair>> {
		let contents = match std::fs::read_to_string(&self.path) {
			Ok(contents) => contents,
			Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(err).with_context(|| format!("failed to read {}", self.path.display())),
		};

		let tokens = serde_json::from_str(&contents).with_context(|| format!("corrupt token file {}", self.path.display()))?;
		Ok(Some(tokens))
	}

	pub fn save(&self, tokens: &TokenPair) -> anyhow::Result<()> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
		}

		// Write then rename, so a crash never leaves half a file behind.
		let tmp = self.path.with_extension("tmp");
		std::fs::write(&tmp, serde_json::to_vec_pretty(tokens)?)
			.with_context(|| format!("failed to write {}", tmp.display()))?;
		std::fs::rename(&tmp, &self.path).with_context(|| format!("failed to write {}", self.path.display()))?;

		tracing::debug!(path = %self.path.display(), "tokens saved");
		Ok(())
	}

	/// Forget the saved tokens. Clearing an empty store is fine.
	pub fn clear(&self) -> anyhow::Result<()> {
		match std::fs::remove_file(&self.path) {
			Ok(()) => {
				tracing::debug!(path = %self.path.display(), "tokens cleared");
				Ok(())
			}
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(err) => Err(err).with_context(|| format!("failed to remove {}", self.path.display())),
		}
	}
}
