//! Sender configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::{fs, io};
use tracing::{info, warn};

use super::{
	error::ConfigError,
	orchestrator::{DEFAULT_BRANCH, DEFAULT_COMMIT_MESSAGE},
};

pub const CONFIG_FILE_NAME: &str = "sender.json";

/// Defaults applied to every send node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
	/// Config schema version
	pub version: u32,

	/// Branch used when a node has none
	pub default_branch: String,

	/// Commit message used when a node has none
	pub default_message: String,

	/// Whether new nodes also write to the local object cache
	pub use_default_cache: bool,

	/// Whether new nodes send on every input change
	pub auto_send: bool,

	/// Local object cache directory, the cache is disabled when unset
	pub cache_dir: Option<PathBuf>,

	/// Conversion profile of new nodes, the registry default when unset
	pub conversion_profile: Option<String>,

	/// Tracing filter used when `RUST_LOG` isn't set
	pub log_filter: String,
}

impl Default for SenderConfig {
	fn default() -> Self {
		Self {
			version: Self::TARGET_VERSION,
			default_branch: DEFAULT_BRANCH.to_string(),
			default_message: DEFAULT_COMMIT_MESSAGE.to_string(),
			use_default_cache: true,
			auto_send: false,
			cache_dir: None,
			conversion_profile: None,
			log_filter: "ns_sender=info,ns_transport=info".to_string(),
		}
	}
}

impl SenderConfig {
	pub const TARGET_VERSION: u32 = 1;

	/// Loads the config at `path`, writing the default one there if there is none yet
	pub async fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		match fs::read(path).await {
			Ok(bytes) => {
				info!(path = %path.display(), "Loading sender config");
				let mut config: Self =
					serde_json::from_slice(&bytes).map_err(|e| ConfigError::json(path, e))?;

				if config.version < Self::TARGET_VERSION {
					info!(
						from = config.version,
						to = Self::TARGET_VERSION,
						"Migrating sender config"
					);
					config.migrate()?;
					config.save(path).await?;
				}

				config.migrate()?;

				Ok(config)
			}

			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				warn!(path = %path.display(), "No sender config found, creating default");
				let config = Self::default();
				config.save(path).await?;
				Ok(config)
			}

			Err(e) => Err(ConfigError::io(path, e)),
		}
	}

	pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
		let path = path.as_ref();

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| ConfigError::io(parent, e))?;
		}

		let json = serde_json::to_vec_pretty(self).map_err(|e| ConfigError::json(path, e))?;

		fs::write(path, json)
			.await
			.map_err(|e| ConfigError::io(path, e))
	}

	fn migrate(&mut self) -> Result<(), ConfigError> {
		match self.version {
			0 => {
				// v0 configs had no branch default
				if self.default_branch.trim().is_empty() {
					self.default_branch = DEFAULT_BRANCH.to_string();
				}
				self.version = 1;
				Ok(())
			}
			Self::TARGET_VERSION => Ok(()),
			found => Err(ConfigError::UnsupportedVersion {
				found,
				supported: Self::TARGET_VERSION,
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use tempfile::tempdir;
	use tracing_test::traced_test;

	use super::*;

	#[tokio::test]
	#[traced_test]
	async fn creates_default_config_when_missing() {
		let dir = tempdir().expect("failed to create temp dir");
		let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

		let config = SenderConfig::load_or_create(&path)
			.await
			.expect("failed to load config");

		assert_eq!(config, SenderConfig::default());
		assert!(path.exists());
	}

	#[tokio::test]
	#[traced_test]
	async fn migrates_old_versions() {
		let dir = tempdir().expect("failed to create temp dir");
		let path = dir.path().join(CONFIG_FILE_NAME);
		fs::write(&path, r#"{ "version": 0, "default_branch": "", "auto_send": true }"#)
			.await
			.expect("failed to write config");

		let config = SenderConfig::load_or_create(&path)
			.await
			.expect("failed to load config");

		assert_eq!(config.version, SenderConfig::TARGET_VERSION);
		assert_eq!(config.default_branch, DEFAULT_BRANCH);
		assert!(config.auto_send);

		let saved: SenderConfig =
			serde_json::from_slice(&fs::read(&path).await.expect("failed to read config"))
				.expect("invalid saved config");
		assert_eq!(saved, config);
	}

	#[tokio::test]
	#[traced_test]
	async fn rejects_newer_versions() {
		let dir = tempdir().expect("failed to create temp dir");
		let path = dir.path().join(CONFIG_FILE_NAME);
		fs::write(&path, r#"{ "version": 7 }"#)
			.await
			.expect("failed to write config");

		assert!(matches!(
			SenderConfig::load_or_create(&path).await,
			Err(ConfigError::UnsupportedVersion { found: 7, .. })
		));
	}
}
