use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
	error::TransportError,
	object::{ObjectId, SerializedObject},
	transport::Transport,
};

/// Keeps objects in memory. Clones share the same storage, so a clone kept aside can be used
/// to inspect what was written through another one.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
	name: String,
	objects: Arc<RwLock<HashMap<ObjectId, Vec<u8>>>>,
	sent_bytes: Arc<AtomicU64>,
}

impl MemoryTransport {
	#[must_use]
	pub fn new() -> Self {
		Self {
			name: "Memory".to_string(),
			..Default::default()
		}
	}

	pub async fn get(&self, id: &ObjectId) -> Option<Vec<u8>> {
		self.objects.read().await.get(id).cloned()
	}

	pub async fn len(&self) -> usize {
		self.objects.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.objects.read().await.is_empty()
	}
}

#[async_trait]
impl Transport for MemoryTransport {
	fn name(&self) -> &str {
		&self.name
	}

	fn set_name(&mut self, name: String) {
		self.name = name;
	}

	async fn save_batch(&self, batch: &[SerializedObject]) -> Result<(), TransportError> {
		let mut objects = self.objects.write().await;

		for SerializedObject { id, bytes } in batch {
			self.sent_bytes
				.fetch_add(bytes.len() as u64, Ordering::Relaxed);
			objects.insert(id.clone(), bytes.clone());
		}

		Ok(())
	}

	fn sent_bytes(&self) -> u64 {
		self.sent_bytes.load(Ordering::Relaxed)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use serde_json::json;
	use tokio_util::sync::CancellationToken;
	use tracing_test::traced_test;

	use crate::{DataObject, PersistStatus, BATCH_SIZE};

	use super::*;

	fn many_points(count: usize) -> DataObject {
		DataObject::new(json!((0..count)
			.map(|i| json!({ "x": i, "y": i * 2 }))
			.collect::<Vec<_>>()))
	}

	#[tokio::test]
	#[traced_test]
	async fn persists_every_object_and_reports_progress() {
		let tree = many_points(150).serialize().expect("serialization failed");
		let transport = MemoryTransport::new();
		let reports = Mutex::new(Vec::new());

		let status = transport
			.persist(
				&tree,
				&|sent| reports.lock().expect("poisoned").push(sent),
				&CancellationToken::new(),
			)
			.await
			.expect("persist failed");

		assert_eq!(status, PersistStatus::Done);
		assert_eq!(transport.len().await, tree.len());
		assert!(transport.get(tree.root_id()).await.is_some());
		assert_eq!(transport.sent_bytes(), tree.total_bytes());
		assert_eq!(
			reports.into_inner().expect("poisoned"),
			vec![BATCH_SIZE as u64, 2 * BATCH_SIZE as u64, tree.len() as u64]
		);
	}

	#[tokio::test]
	#[traced_test]
	async fn stops_when_canceled() {
		let tree = many_points(10).serialize().expect("serialization failed");
		let transport = MemoryTransport::new();
		let cancel = CancellationToken::new();
		cancel.cancel();

		let status = transport
			.persist(&tree, &|_| {}, &cancel)
			.await
			.expect("persist failed");

		assert_eq!(status, PersistStatus::Canceled);
		assert!(transport.is_empty().await);
	}
}
