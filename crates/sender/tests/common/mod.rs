#![allow(dead_code)]

use ns_sender::{ConverterRegistry, SendEnvironment, SenderConfig, SendNode};
use ns_transport::{
	Account, CommitRequest, PersistStatus, ProgressFn, RemoteApi, SerializedObject,
	SerializedTree, StaticAccounts, Transport, TransportError,
};

use std::{
	collections::HashSet,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::{sync::Notify, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const HOST: &str = "https://host.example";

pub fn stream_url(stream_id: &str) -> String {
	format!("{HOST}/streams/{stream_id}")
}

pub fn accounts() -> StaticAccounts {
	StaticAccounts::new(vec![Account {
		server_url: format!("{HOST}/"),
		token: "secret".to_string(),
		email: Some("someone@host.example".to_string()),
	}])
}

/// Four object nodes once wrapped: the root, the payload, the beam and its section
pub fn payload() -> Value {
	json!({
		"beam": { "length": 4.2, "section": { "name": "IPE200" } },
		"tags": ["steel", "primary"],
	})
}

pub fn environment(remote: &Arc<MockRemote>) -> Arc<SendEnvironment> {
	Arc::new(SendEnvironment::new(
		Arc::new(accounts()),
		Arc::clone(remote) as Arc<dyn RemoteApi>,
	))
}

pub fn manual_node() -> SendNode {
	SendNode::new(
		&SenderConfig {
			use_default_cache: false,
			..Default::default()
		},
		Arc::new(ConverterRegistry::default()),
	)
}

/// Remote store keeping every request in memory
#[derive(Debug, Default)]
pub struct MockRemote {
	uploaded: Mutex<Vec<(String, usize)>>,
	commits: Mutex<Vec<CommitRequest>>,
	failing_commits: Mutex<HashSet<String>>,
	hold_commits: AtomicBool,
	commit_started: Notify,
}

impl MockRemote {
	pub fn new() -> Arc<Self> {
		Arc::default()
	}

	/// Makes every commit on `stream_id` fail
	pub fn fail_commits_on(&self, stream_id: &str) {
		self.failing_commits
			.lock()
			.expect("lock poisoned")
			.insert(stream_id.to_string());
	}

	/// Makes every later commit hang until the caller gives up on it
	pub fn hold_commits(&self) {
		self.hold_commits.store(true, Ordering::SeqCst);
	}

	/// Resolves once a held commit reached the remote
	pub async fn commit_started(&self) {
		self.commit_started.notified().await;
	}

	pub fn commits(&self) -> Vec<CommitRequest> {
		self.commits.lock().expect("lock poisoned").clone()
	}

	pub fn uploaded_to(&self, stream_id: &str) -> usize {
		self.uploaded
			.lock()
			.expect("lock poisoned")
			.iter()
			.filter(|(stream, _)| stream == stream_id)
			.map(|(_, count)| count)
			.sum()
	}
}

#[async_trait]
impl RemoteApi for MockRemote {
	async fn upload_objects(
		&self,
		_account: &Account,
		stream_id: &str,
		batch: &[SerializedObject],
	) -> Result<u64, TransportError> {
		self.uploaded
			.lock()
			.expect("lock poisoned")
			.push((stream_id.to_string(), batch.len()));

		Ok(batch.iter().map(|object| object.bytes.len() as u64).sum())
	}

	async fn create_commit(
		&self,
		_account: &Account,
		request: &CommitRequest,
	) -> Result<String, TransportError> {
		if self.hold_commits.load(Ordering::SeqCst) {
			self.commit_started.notify_one();
			info!(stream_id = %request.stream_id, "Holding commit");
			std::future::pending::<()>().await;
		}

		if self
			.failing_commits
			.lock()
			.expect("lock poisoned")
			.contains(&request.stream_id)
		{
			return Err(TransportError::Rejected {
				status: 500,
				message: "stream is locked".to_string(),
			});
		}

		let mut commits = self.commits.lock().expect("lock poisoned");
		commits.push(request.clone());

		Ok(format!("commit-{}", commits.len()))
	}
}

/// Fails its first batch after a short delay, once the other transports got going
#[derive(Debug)]
pub struct FailingTransport {
	name: String,
}

impl Default for FailingTransport {
	fn default() -> Self {
		Self {
			name: "Failing".to_string(),
		}
	}
}

#[async_trait]
impl Transport for FailingTransport {
	fn name(&self) -> &str {
		&self.name
	}

	fn set_name(&mut self, name: String) {
		self.name = name;
	}

	async fn save_batch(&self, _batch: &[SerializedObject]) -> Result<(), TransportError> {
		sleep(Duration::from_millis(20)).await;
		Err(TransportError::Other("disk full".to_string()))
	}
}

/// Never writes anything, only waits for its cancellation token
#[derive(Debug, Clone)]
pub struct BlockingTransport {
	name: String,
	started: Arc<Notify>,
	observed_cancellations: Arc<AtomicUsize>,
}

impl Default for BlockingTransport {
	fn default() -> Self {
		Self {
			name: "Blocking".to_string(),
			started: Arc::default(),
			observed_cancellations: Arc::default(),
		}
	}
}

impl BlockingTransport {
	pub async fn started(&self) {
		self.started.notified().await;
	}

	pub fn observed_cancellations(&self) -> usize {
		self.observed_cancellations.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Transport for BlockingTransport {
	fn name(&self) -> &str {
		&self.name
	}

	fn set_name(&mut self, name: String) {
		self.name = name;
	}

	async fn save_batch(&self, _batch: &[SerializedObject]) -> Result<(), TransportError> {
		unreachable!("blocking transport never saves")
	}

	async fn persist(
		&self,
		_tree: &SerializedTree,
		_on_progress: ProgressFn<'_>,
		cancel: &CancellationToken,
	) -> Result<PersistStatus, TransportError> {
		self.started.notify_one();

		cancel.cancelled().await;
		self.observed_cancellations.fetch_add(1, Ordering::SeqCst);
		info!(transport = %self.name, "Blocking transport observed cancellation");

		Ok(PersistStatus::Canceled)
	}
}
