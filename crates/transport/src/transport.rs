use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{
	error::TransportError,
	object::{SerializedObject, SerializedTree},
};

/// Objects handed to [`Transport::save_batch`] at once by the default [`Transport::persist`]
pub const BATCH_SIZE: usize = 64;

/// Progress callback, receives the total count of objects written so far
pub type ProgressFn<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// How a [`Transport::persist`] call ended, when it didn't fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStatus {
	Done,
	Canceled,
}

/// A persistence backend able to store content-addressed objects.
///
/// Implementors only need to know how to store a batch of objects, the default
/// [`persist`](Transport::persist) takes care of batching, progress reporting and checking
/// the cancellation token between batches. Transports that can do better (streaming,
/// parallel uploads) can override it, as long as they stop issuing new work once the token
/// is cancelled and return [`PersistStatus::Canceled`] in that case.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug + 'static {
	fn name(&self) -> &str;

	/// Names this transport for the current run, used on progress and diagnostics
	fn set_name(&mut self, name: String);

	async fn save_batch(&self, batch: &[SerializedObject]) -> Result<(), TransportError>;

	/// Bytes effectively sent to the backend since this transport was created
	fn sent_bytes(&self) -> u64 {
		0
	}

	async fn persist(
		&self,
		tree: &SerializedTree,
		on_progress: ProgressFn<'_>,
		cancel: &CancellationToken,
	) -> Result<PersistStatus, TransportError> {
		let mut sent = 0;

		for batch in tree.objects().chunks(BATCH_SIZE) {
			if cancel.is_cancelled() {
				trace!(transport = self.name(), %sent, "Persist canceled between batches");
				return Ok(PersistStatus::Canceled);
			}

			self.save_batch(batch).await?;

			sent += batch.len() as u64;
			on_progress(sent);
		}

		Ok(PersistStatus::Done)
	}
}
