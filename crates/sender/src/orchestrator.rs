use ns_transport::{
	AccountProvider, CommitRequest, DataObject, ObjectId, PersistStatus, RemoteApi,
	SerializedTree, ServerTransport, StreamReference, Transport, TransportError,
};

use std::{
	fmt,
	sync::Arc,
	time::{Duration, Instant},
};

use futures::FutureExt;
use futures_concurrency::future::{Join, Race};
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use super::{
	cancel::CancellationCoordinator,
	commit_chain::CommitChain,
	convert::Converter,
	diagnostics::Diagnostics,
	error::SendError,
	progress::ProgressAggregator,
	resolver::{TransportHandle, TransportInput, TransportResolver},
};

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Pushed from a node graph.";

/// What a node feeds into one run
#[derive(Debug, Default)]
pub struct SendInputs {
	pub payload: Value,
	pub transports: Vec<TransportInput>,
	/// Blank means the configured default branch
	pub branch: String,
	/// Blank means the configured default message
	pub message: String,
}

impl SendInputs {
	#[must_use]
	pub fn new(payload: Value, transports: Vec<TransportInput>) -> Self {
		Self {
			payload,
			transports,
			..Default::default()
		}
	}

	#[must_use]
	pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
		self.branch = branch.into();
		self
	}

	#[must_use]
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = message.into();
		self
	}
}

/// Collaborators and defaults shared by every run of every node
pub struct SendEnvironment {
	pub accounts: Arc<dyn AccountProvider>,
	pub remote: Arc<dyn RemoteApi>,
	/// Local object cache, added to runs of nodes using the default cache
	pub cache: Option<Arc<dyn Transport>>,
	pub default_branch: String,
	pub default_message: String,
}

impl fmt::Debug for SendEnvironment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SendEnvironment")
			.field("remote", &self.remote)
			.field("cache", &self.cache)
			.field("default_branch", &self.default_branch)
			.field("default_message", &self.default_message)
			.finish_non_exhaustive()
	}
}

impl SendEnvironment {
	#[must_use]
	pub fn new(accounts: Arc<dyn AccountProvider>, remote: Arc<dyn RemoteApi>) -> Self {
		Self {
			accounts,
			remote,
			cache: None,
			default_branch: DEFAULT_BRANCH.to_string(),
			default_message: DEFAULT_COMMIT_MESSAGE.to_string(),
		}
	}

	#[must_use]
	pub fn with_cache(mut self, cache: Arc<dyn Transport>) -> Self {
		self.cache = Some(cache);
		self
	}

	#[must_use]
	pub fn with_defaults(
		mut self,
		default_branch: impl Into<String>,
		default_message: impl Into<String>,
	) -> Self {
		self.default_branch = default_branch.into();
		self.default_message = default_message.into();
		self
	}
}

/// Everything a run needs, captured when it starts
#[derive(Debug)]
pub struct RunContext {
	pub run_id: Uuid,
	pub inputs: SendInputs,
	/// Outputs of the node when the run started, the parents of the new commits
	pub previous_outputs: Vec<StreamReference>,
	pub converter: Arc<dyn Converter>,
	pub env: Arc<SendEnvironment>,
	pub use_cache: bool,
	/// The node was just loaded and only needs to re-emit its stored outputs
	pub replay: bool,
}

/// Results of a successful run, applied by the node
#[derive(Debug)]
pub struct SendReport {
	pub outputs: Vec<StreamReference>,
	pub object_id: ObjectId,
	pub diagnostics: Diagnostics,
	pub total_objects: u64,
	/// Resolved transports, the local cache excluded
	pub transport_count: usize,
	pub elapsed: Duration,
}

#[derive(Debug)]
pub enum RunOutcome {
	Replayed,
	Done(SendReport),
	Cancelled(Diagnostics),
	Failed(Diagnostics),
}

/// Drives one send: conversion, transport resolution, concurrent persistence and then
/// sequential commit creation on every remote stream.
///
/// The orchestrator never touches node state, it hands a [`RunOutcome`] back and the node
/// decides what to keep from it.
#[derive(Debug)]
pub struct SendOrchestrator {
	ctx: RunContext,
	coordinator: CancellationCoordinator,
	progress: Arc<ProgressAggregator>,
}

impl SendOrchestrator {
	#[must_use]
	pub const fn new(
		ctx: RunContext,
		coordinator: CancellationCoordinator,
		progress: Arc<ProgressAggregator>,
	) -> Self {
		Self {
			ctx,
			coordinator,
			progress,
		}
	}

	#[instrument(skip_all, fields(run_id = %self.ctx.run_id))]
	pub async fn run(self) -> RunOutcome {
		let started = Instant::now();

		let Self {
			ctx:
				RunContext {
					inputs,
					previous_outputs,
					converter,
					env,
					use_cache,
					replay,
					..
				},
			coordinator,
			progress,
		} = self;

		if replay {
			debug!("Replaying stored outputs");
			return RunOutcome::Replayed;
		}

		let mut diagnostics = Diagnostics::default();

		if coordinator.is_cancelled() {
			return RunOutcome::Cancelled(diagnostics);
		}

		let SendInputs {
			payload,
			transports,
			branch,
			message,
		} = inputs;

		let converted = match converter.convert(&payload) {
			Ok(converted) => converted,
			Err(e) => {
				warn!(profile = converter.name(), ?e, "Failed to convert payload");
				diagnostics.error(SendError::from(e).to_string());
				return RunOutcome::Failed(diagnostics);
			}
		};

		if coordinator.is_cancelled() {
			debug!("Run cancelled after conversion");
			return RunOutcome::Cancelled(diagnostics);
		}

		let object = DataObject::new(converted);
		let total_objects = object.total_children_count();

		let handles = TransportResolver::new(env.accounts.as_ref(), &env.remote)
			.resolve(transports, &mut diagnostics);

		if handles.is_empty() {
			warn!("No valid transports to send to");
			diagnostics.error(SendError::NoValidTransports.to_string());
			return RunOutcome::Failed(diagnostics);
		}

		let tree = match object.serialize() {
			Ok(tree) => tree,
			Err(e) => {
				warn!(?e, "Failed to serialize data object");
				diagnostics.error(SendError::from(e).to_string());
				return RunOutcome::Failed(diagnostics);
			}
		};

		progress.set_total(total_objects);

		let mut targets: Vec<&dyn Transport> = Vec::with_capacity(handles.len() + 1);
		if let Some(cache) = env.cache.as_ref().filter(|_| use_cache) {
			targets.push(&**cache);
		}
		targets.extend(handles.iter().map(TransportHandle::transport));

		debug!(
			objects = total_objects,
			transports = targets.len(),
			"Persisting data object"
		);

		let results = targets
			.iter()
			.map(|transport| persist_one(*transport, &tree, &progress, &coordinator))
			.collect::<Vec<_>>()
			.join()
			.await;

		for (transport, result) in targets.iter().zip(results) {
			if let Err(e) = result {
				diagnostics.warning(format!("{}: {e}", transport.name()));
			}
		}

		if coordinator.is_cancelled() {
			debug!(cause = ?coordinator.cause(), "Run cancelled while persisting");
			return RunOutcome::Cancelled(diagnostics);
		}

		let object_id = tree.root_id().clone();
		let chain = CommitChain::new(previous_outputs);
		let branch_name = first_non_blank(
			&[branch.as_str(), env.default_branch.as_str()],
			DEFAULT_BRANCH,
		);
		let message = first_non_blank(
			&[message.as_str(), env.default_message.as_str()],
			DEFAULT_COMMIT_MESSAGE,
		);

		let mut outputs = Vec::new();

		for server in handles.iter().filter_map(TransportHandle::as_server) {
			if coordinator.is_cancelled() {
				debug!("Run cancelled while committing");
				return RunOutcome::Cancelled(diagnostics);
			}

			let request = CommitRequest {
				branch_name: branch_name.to_string(),
				message: message.to_string(),
				object_id: object_id.clone(),
				stream_id: server.stream_id().to_string(),
				previous_commit_ids: chain.parents_for(server.endpoint(), server.stream_id()),
			};

			let commit = (
				server.create_commit(&request).map(Some),
				coordinator.cancelled().map(|()| None),
			)
				.race()
				.await;

			match commit {
				Some(Ok(commit_id)) => {
					trace!(transport = server.name(), %commit_id, "Created commit");
					outputs.push(StreamReference::new(
						server.endpoint(),
						server.stream_id(),
						Some(commit_id),
					));
				}
				Some(Err(e)) => {
					warn!(transport = server.name(), ?e, "Failed to create commit");
					diagnostics.warning(format!("{}: failed to create commit: {e}", server.name()));
				}
				None => {
					debug!("Run cancelled during commit creation");
					return RunOutcome::Cancelled(diagnostics);
				}
			}
		}

		let elapsed = started.elapsed();

		if !diagnostics.has_problems() {
			add_success_remarks(&mut diagnostics, total_objects, &handles, elapsed);
		}

		RunOutcome::Done(SendReport {
			outputs,
			object_id,
			diagnostics,
			total_objects,
			transport_count: handles.len(),
			elapsed,
		})
	}
}

#[instrument(skip_all, fields(transport = %transport.name()))]
async fn persist_one(
	transport: &dyn Transport,
	tree: &SerializedTree,
	progress: &ProgressAggregator,
	coordinator: &CancellationCoordinator,
) -> Result<PersistStatus, TransportError> {
	let cancel = coordinator.child_token();

	if cancel.is_cancelled() {
		return Ok(PersistStatus::Canceled);
	}

	let name = transport.name();
	let on_progress = |sent| progress.report(name, sent);

	match transport.persist(tree, &on_progress, &cancel).await {
		Ok(status) => {
			trace!(?status, "Persist finished");
			Ok(status)
		}
		Err(e) => {
			warn!(?e, "Persist failed, cancelling the other transports");
			coordinator.trip(format!("{name}: {e}"));
			Err(e)
		}
	}
}

fn first_non_blank<'a>(candidates: &[&'a str], fallback: &'a str) -> &'a str {
	candidates
		.iter()
		.copied()
		.find(|candidate| !candidate.trim().is_empty())
		.unwrap_or(fallback)
}

fn add_success_remarks(
	diagnostics: &mut Diagnostics,
	total_objects: u64,
	handles: &[TransportHandle],
	elapsed: Duration,
) {
	diagnostics.remark(format!(
		"Successfully pushed {total_objects} objects to {} transports.",
		handles.len()
	));
	diagnostics.remark(format!("Send duration: {:.3}s", elapsed.as_secs_f64()));

	let seconds = elapsed.as_secs_f64().max(f64::EPSILON);

	for server in handles.iter().filter_map(TransportHandle::as_server) {
		diagnostics.remark(format!(
			"{} avg {:.2} MB/s",
			server.name(),
			megabytes(server) / seconds
		));
	}
}

#[allow(clippy::cast_precision_loss)]
fn megabytes(server: &ServerTransport) -> f64 {
	server.sent_bytes() as f64 / 1_000_000.0
}
