use std::{
	fmt,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};
use url::Url;

use super::{
	error::TransportError,
	object::{ObjectId, SerializedObject},
	reference::{normalize_endpoint, StreamReference},
	transport::Transport,
};

/// Credentials for one remote store
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
	pub server_url: String,
	pub token: String,
	#[serde(default)]
	pub email: Option<String>,
}

impl fmt::Debug for Account {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Account")
			.field("server_url", &self.server_url)
			.field("email", &self.email)
			.finish_non_exhaustive()
	}
}

/// Looks up credentials able to reach a referenced stream
pub trait AccountProvider: Send + Sync {
	fn account_for(&self, reference: &StreamReference) -> Option<Account>;
}

/// Fixed list of accounts, matched on the origin of their server url
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticAccounts(Vec<Account>);

impl StaticAccounts {
	#[must_use]
	pub const fn new(accounts: Vec<Account>) -> Self {
		Self(accounts)
	}
}

impl AccountProvider for StaticAccounts {
	fn account_for(&self, reference: &StreamReference) -> Option<Account> {
		let target = Url::parse(reference.endpoint()).ok()?.origin();

		self.0
			.iter()
			.find(|account| {
				Url::parse(account.server_url.trim())
					.is_ok_and(|server_url| server_url.origin() == target)
			})
			.cloned()
	}
}

/// Input to create a new commit on a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
	pub branch_name: String,
	pub message: String,
	pub object_id: ObjectId,
	pub stream_id: String,
	pub previous_commit_ids: Vec<String>,
}

/// Operations a remote versioned store offers to a send
#[async_trait]
pub trait RemoteApi: Send + Sync + fmt::Debug {
	/// Uploads a batch of objects to a stream, returning how many bytes went over the wire
	async fn upload_objects(
		&self,
		account: &Account,
		stream_id: &str,
		batch: &[SerializedObject],
	) -> Result<u64, TransportError>;

	/// Creates a commit, returning its id
	async fn create_commit(
		&self,
		account: &Account,
		request: &CommitRequest,
	) -> Result<String, TransportError>;
}

/// Transport writing to a stream on a remote store
#[derive(Debug)]
pub struct ServerTransport {
	name: String,
	account: Account,
	endpoint: String,
	stream_id: String,
	api: Arc<dyn RemoteApi>,
	sent_bytes: AtomicU64,
}

impl ServerTransport {
	#[must_use]
	pub fn new(account: Account, stream_id: impl Into<String>, api: Arc<dyn RemoteApi>) -> Self {
		Self {
			name: "Server".to_string(),
			endpoint: normalize_endpoint(&account.server_url),
			account,
			stream_id: stream_id.into(),
			api,
			sent_bytes: AtomicU64::new(0),
		}
	}

	#[must_use]
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	#[must_use]
	pub fn stream_id(&self) -> &str {
		&self.stream_id
	}

	#[must_use]
	pub const fn account(&self) -> &Account {
		&self.account
	}

	#[instrument(skip_all, fields(transport = %self.name, stream_id = %self.stream_id), err)]
	pub async fn create_commit(&self, request: &CommitRequest) -> Result<String, TransportError> {
		self.api.create_commit(&self.account, request).await
	}
}

#[async_trait]
impl Transport for ServerTransport {
	fn name(&self) -> &str {
		&self.name
	}

	fn set_name(&mut self, name: String) {
		self.name = name;
	}

	async fn save_batch(&self, batch: &[SerializedObject]) -> Result<(), TransportError> {
		let sent = self
			.api
			.upload_objects(&self.account, &self.stream_id, batch)
			.await?;

		trace!(transport = %self.name, objects = batch.len(), %sent, "Uploaded batch");

		self.sent_bytes.fetch_add(sent, Ordering::Relaxed);

		Ok(())
	}

	fn sent_bytes(&self) -> u64 {
		self.sent_bytes.load(Ordering::Relaxed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn account(server_url: &str) -> Account {
		Account {
			server_url: server_url.to_string(),
			token: "secret".to_string(),
			email: None,
		}
	}

	#[test]
	fn accounts_match_on_origin() {
		let accounts = StaticAccounts::new(vec![
			account("https://other.example"),
			account("https://host.example/"),
		]);

		for url in [
			"https://host.example/streams/s1",
			"HTTPS://Host.Example/streams/s1",
			"https://HOST.EXAMPLE:443/streams/s1/commits/c1",
		] {
			let reference: StreamReference = url.parse().expect("valid url");
			let found = accounts.account_for(&reference).expect("account for host");
			assert_eq!(found.server_url, "https://host.example/");
		}

		let elsewhere: StreamReference = "https://host.example:8443/streams/s1"
			.parse()
			.expect("valid url");
		assert!(accounts.account_for(&elsewhere).is_none());

		let plain_http: StreamReference =
			"http://host.example/streams/s1".parse().expect("valid url");
		assert!(accounts.account_for(&plain_http).is_none());
	}

	#[test]
	fn server_endpoint_is_normalized() {
		#[derive(Debug)]
		struct Unreachable;

		#[async_trait]
		impl RemoteApi for Unreachable {
			async fn upload_objects(
				&self,
				_account: &Account,
				_stream_id: &str,
				_batch: &[SerializedObject],
			) -> Result<u64, TransportError> {
				unreachable!()
			}

			async fn create_commit(
				&self,
				_account: &Account,
				_request: &CommitRequest,
			) -> Result<String, TransportError> {
				unreachable!()
			}
		}

		let transport =
			ServerTransport::new(account("HTTPS://Host.Example/"), "s1", Arc::new(Unreachable));

		assert_eq!(transport.endpoint(), "https://host.example");
		assert!(StreamReference::new(transport.endpoint(), "s1", None)
			.is_same_stream("https://host.example", "s1"));
	}
}
