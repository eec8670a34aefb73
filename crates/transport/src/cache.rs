use std::{
	path::{Path, PathBuf},
	sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::{fs, io};
use tracing::{debug, trace};

use super::{
	error::TransportError,
	object::{ObjectId, SerializedObject},
	transport::Transport,
};

pub const CACHE_TRANSPORT_NAME: &str = "Cache";

// Cache directory have the following structure:
// objects/
// └── <object_id>[0..2]/ # sharding
//    └── <object_id>
#[derive(Debug)]
pub struct LocalCache {
	name: String,
	directory: PathBuf,
	sent_bytes: AtomicU64,
}

impl LocalCache {
	pub async fn open(directory: impl AsRef<Path>) -> Result<Self, TransportError> {
		let directory = directory.as_ref().to_path_buf();

		fs::create_dir_all(&directory)
			.await
			.map_err(|e| TransportError::from_std_io_err(&directory, e))?;

		debug!(directory = %directory.display(), "Local object cache ready");

		Ok(Self {
			name: CACHE_TRANSPORT_NAME.to_string(),
			directory,
			sent_bytes: AtomicU64::new(0),
		})
	}

	#[must_use]
	pub fn object_path(&self, id: &ObjectId) -> PathBuf {
		self.directory.join(id.shard()).join(id.as_str())
	}

	pub async fn get(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, TransportError> {
		let path = self.object_path(id);

		match fs::read(&path).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(TransportError::from_std_io_err(path, e)),
		}
	}
}

#[async_trait]
impl Transport for LocalCache {
	fn name(&self) -> &str {
		&self.name
	}

	fn set_name(&mut self, name: String) {
		self.name = name;
	}

	async fn save_batch(&self, batch: &[SerializedObject]) -> Result<(), TransportError> {
		for SerializedObject { id, bytes } in batch {
			let path = self.object_path(id);

			if fs::try_exists(&path)
				.await
				.map_err(|e| TransportError::from_std_io_err(&path, e))?
			{
				trace!(%id, "Object already cached");
				continue;
			}

			if let Some(shard_dir) = path.parent() {
				fs::create_dir_all(shard_dir)
					.await
					.map_err(|e| TransportError::from_std_io_err(shard_dir, e))?;
			}

			fs::write(&path, bytes)
				.await
				.map_err(|e| TransportError::from_std_io_err(&path, e))?;

			self.sent_bytes
				.fetch_add(bytes.len() as u64, Ordering::Relaxed);
		}

		Ok(())
	}

	fn sent_bytes(&self) -> u64 {
		self.sent_bytes.load(Ordering::Relaxed)
	}
}
