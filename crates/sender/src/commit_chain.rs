use ns_transport::StreamReference;

/// Previous commits known by a node, looked up by endpoint and stream so a new commit can be
/// linked to the one it supersedes. Only the most recent reference of each stream counts,
/// older history lives on the remote store.
#[derive(Debug, Clone, Default)]
pub struct CommitChain {
	previous: Vec<StreamReference>,
}

impl CommitChain {
	#[must_use]
	pub const fn new(previous: Vec<StreamReference>) -> Self {
		Self { previous }
	}

	#[must_use]
	pub fn previous_commit(&self, endpoint: &str, stream_id: &str) -> Option<&str> {
		self.previous
			.iter()
			.rev()
			.find(|reference| reference.is_same_stream(endpoint, stream_id))
			.and_then(StreamReference::commit_id)
	}

	/// Parents for a new commit on the stream, zero or one of them
	#[must_use]
	pub fn parents_for(&self, endpoint: &str, stream_id: &str) -> Vec<String> {
		self.previous_commit(endpoint, stream_id)
			.map(ToString::to_string)
			.into_iter()
			.collect()
	}
}
