use ns_transport::{ObjectId, StreamReference};

use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, instrument, trace, warn};
use uuid::Uuid;

use super::{
	cancel::CancellationCoordinator,
	config::SenderConfig,
	convert::{Converter, ConverterRegistry},
	diagnostics::{DiagnosticEntry, Diagnostics},
	error::ConversionError,
	orchestrator::{RunContext, RunOutcome, SendEnvironment, SendInputs, SendOrchestrator},
	progress::{ProgressAggregator, ProgressSnapshot},
	state::{decode_references, encode_references, NodeSnapshot, RunState},
};

/// What a solve of the node did
#[derive(Debug)]
pub enum Solve {
	/// A run was spawned, hand its outcome back through [`SendNode::complete`]
	Started(RunTicket),
	/// The node isn't primed, its current outputs are re-emitted as stale
	Stale(Vec<StreamReference>),
}

/// A spawned run
#[derive(Debug)]
pub struct RunTicket {
	id: Uuid,
	handle: JoinHandle<RunOutcome>,
}

impl RunTicket {
	#[must_use]
	pub const fn id(&self) -> Uuid {
		self.id
	}

	/// Waits for the run to end. A panicking run ends as a failed one.
	pub async fn wait(self) -> RunOutcome {
		self.handle.await.unwrap_or_else(|e| {
			error!(run_id = %self.id, ?e, "Send run task failed");
			let mut diagnostics = Diagnostics::default();
			diagnostics.error(format!("send run failed: {e}"));
			RunOutcome::Failed(diagnostics)
		})
	}
}

/// The node outputs after a run outcome was handed back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
	pub outputs: Vec<StreamReference>,
	/// Every diagnostic queued since the last flush
	pub diagnostics: Vec<DiagnosticEntry>,
	/// Whether the outcome was applied, outcomes of superseded runs aren't
	pub applied: bool,
}

#[derive(Debug)]
struct ActiveRun {
	id: Uuid,
	coordinator: CancellationCoordinator,
	progress: watch::Receiver<ProgressSnapshot>,
}

/// A send node instance of the host graph.
///
/// The node owns the lifecycle state and the outputs. Runs never write to it, each one is
/// spawned with a snapshot of what it needs and the host hands its [`RunOutcome`] back
/// through [`SendNode::complete`], where the node decides what to keep.
#[derive(Debug)]
pub struct SendNode {
	state: RunState,
	auto_send: bool,
	use_default_cache: bool,
	just_pasted: bool,
	outputs: Vec<StreamReference>,
	object_id: Option<ObjectId>,
	converter: Arc<dyn Converter>,
	registry: Arc<ConverterRegistry>,
	active: Option<ActiveRun>,
	pending: Diagnostics,
	cancel_token: CancellationToken,
	_cancel_runs: DropGuard,
}

impl SendNode {
	#[must_use]
	pub fn new(config: &SenderConfig, registry: Arc<ConverterRegistry>) -> Self {
		let mut pending = Diagnostics::default();
		let converter = pick_converter(
			&registry,
			config.conversion_profile.as_deref(),
			&mut pending,
		);

		Self::with_parts(
			RunState::NeedsInput,
			config.auto_send,
			config.use_default_cache,
			converter,
			registry,
			pending,
		)
	}

	/// Rebuilds a node from what the host document stored.
	///
	/// Stored outputs are replayed once by the next solve without sending anything.
	#[must_use]
	pub fn restore(snapshot: &NodeSnapshot, registry: Arc<ConverterRegistry>) -> Self {
		let mut pending = Diagnostics::default();
		let converter = pick_converter(
			&registry,
			snapshot.conversion_profile.as_deref(),
			&mut pending,
		);

		let state = match snapshot.run_state() {
			// Saved mid run, that run is gone
			RunState::Sending => RunState::Expired,
			state => state,
		};

		let mut node = Self::with_parts(
			state,
			snapshot.auto_send,
			snapshot.use_default_cache,
			converter,
			registry,
			pending,
		);

		node.outputs = decode_references(&snapshot.output_references);
		node.object_id = snapshot.object_id.clone().map(ObjectId::from);
		node.just_pasted = !node.outputs.is_empty();

		debug!(
			%state,
			outputs = node.outputs.len(),
			"Restored send node"
		);

		node
	}

	fn with_parts(
		state: RunState,
		auto_send: bool,
		use_default_cache: bool,
		converter: Arc<dyn Converter>,
		registry: Arc<ConverterRegistry>,
		pending: Diagnostics,
	) -> Self {
		let cancel_token = CancellationToken::new();

		Self {
			state,
			auto_send,
			use_default_cache,
			just_pasted: false,
			outputs: Vec::new(),
			object_id: None,
			converter,
			registry,
			active: None,
			pending,
			_cancel_runs: cancel_token.clone().drop_guard(),
			cancel_token,
		}
	}

	#[must_use]
	pub fn snapshot(&self) -> NodeSnapshot {
		NodeSnapshot {
			use_default_cache: self.use_default_cache,
			auto_send: self.auto_send,
			current_state: self.state.to_string(),
			object_id: self.object_id.as_ref().map(ToString::to_string),
			conversion_profile: Some(self.converter.name().to_string()),
			output_references: encode_references(&self.outputs),
		}
	}

	#[must_use]
	pub const fn state(&self) -> RunState {
		self.state
	}

	#[must_use]
	pub fn outputs(&self) -> &[StreamReference] {
		&self.outputs
	}

	#[must_use]
	pub const fn object_id(&self) -> Option<&ObjectId> {
		self.object_id.as_ref()
	}

	/// Whether the next solve only re-emits outputs restored from a snapshot
	#[must_use]
	pub const fn needs_replay(&self) -> bool {
		self.just_pasted
	}

	#[must_use]
	pub const fn auto_send(&self) -> bool {
		self.auto_send
	}

	#[must_use]
	pub const fn use_default_cache(&self) -> bool {
		self.use_default_cache
	}

	#[must_use]
	pub fn conversion_profile(&self) -> &str {
		self.converter.name()
	}

	/// Commit pages of the current outputs, for "view online" menus
	pub fn commit_urls(&self) -> impl Iterator<Item = String> + '_ {
		self.outputs.iter().filter_map(StreamReference::commit_url)
	}

	pub fn set_auto_send(&mut self, auto_send: bool) {
		trace!(auto_send, "Toggled automatic sending");
		self.auto_send = auto_send;
	}

	pub fn set_use_default_cache(&mut self, use_default_cache: bool) {
		self.use_default_cache = use_default_cache;
	}

	/// Switches the conversion profile, the current outputs no longer match the inputs
	pub fn set_profile(&mut self, name: &str) -> Result<(), ConversionError> {
		self.converter = self.registry.get(name)?;

		if self.state != RunState::Sending {
			self.state = RunState::Expired;
		}

		Ok(())
	}

	/// Single click on the node. Only a manual node waiting for a send gets primed.
	pub fn trigger(&mut self) -> bool {
		if self.auto_send || !matches!(self.state, RunState::Expired | RunState::NeedsInput) {
			return false;
		}

		self.prime();

		true
	}

	/// Double click on the node. Primes from any idle state, or turns automatic sending off.
	pub fn force_trigger(&mut self) -> bool {
		if self.state == RunState::Sending {
			return false;
		}

		if self.auto_send {
			debug!("Automatic sending turned off");
			self.auto_send = false;
			return false;
		}

		self.prime();

		true
	}

	fn prime(&mut self) {
		debug!(from = %self.state, "Send node primed");
		self.state = RunState::PrimedToSend;
	}

	/// Handles a solve of the node: starts a run when the node is primed, sending or in
	/// automatic mode, replays stored outputs right after a load, or marks outputs stale.
	///
	/// Starting a run cancels the one in flight, whose outcome will then be ignored.
	#[instrument(skip_all, fields(state = %self.state, auto_send = self.auto_send))]
	pub fn solve(&mut self, inputs: SendInputs, env: &Arc<SendEnvironment>) -> Solve {
		let replay = self.just_pasted;

		if !replay
			&& !self.auto_send
			&& !matches!(self.state, RunState::PrimedToSend | RunState::Sending)
		{
			debug!("Solve without a trigger, outputs are stale");
			self.state = RunState::Expired;
			return Solve::Stale(self.outputs.clone());
		}

		if let Some(previous) = self.active.take() {
			debug!(run_id = %previous.id, "Cancelling superseded run");
			previous.coordinator.cancel();
		}

		if !replay {
			self.state = RunState::Sending;
		}

		let run_id = Uuid::new_v4();
		let coordinator = CancellationCoordinator::child_of(&self.cancel_token);
		let progress = Arc::new(ProgressAggregator::new());

		let ctx = RunContext {
			run_id,
			inputs,
			previous_outputs: self.outputs.clone(),
			converter: Arc::clone(&self.converter),
			env: Arc::clone(env),
			use_cache: self.use_default_cache,
			replay,
		};

		self.active = Some(ActiveRun {
			id: run_id,
			coordinator: coordinator.clone(),
			progress: progress.subscribe(),
		});

		debug!(%run_id, replay, "Starting send run");

		let handle = tokio::spawn(SendOrchestrator::new(ctx, coordinator, progress).run());

		Solve::Started(RunTicket { id: run_id, handle })
	}

	/// Applies the outcome of a run, flushing every queued diagnostic
	#[instrument(skip(self, outcome))]
	pub fn complete(&mut self, run_id: Uuid, outcome: RunOutcome) -> Completion {
		if self.active.as_ref().map(|active| active.id) != Some(run_id) {
			debug!("Ignoring outcome of a superseded run");
			return Completion {
				outputs: self.outputs.clone(),
				diagnostics: Vec::new(),
				applied: false,
			};
		}

		self.active = None;
		let mut diagnostics = std::mem::take(&mut self.pending);

		match outcome {
			RunOutcome::Replayed => {
				self.just_pasted = false;
			}

			RunOutcome::Done(report) => {
				debug!(
					outputs = report.outputs.len(),
					objects = report.total_objects,
					elapsed = ?report.elapsed,
					"Send run done"
				);
				self.state = RunState::UpToDate;
				self.outputs = report.outputs;
				self.object_id = Some(report.object_id);
				diagnostics.extend(report.diagnostics);
			}

			RunOutcome::Cancelled(run_diagnostics) => {
				debug!("Send run cancelled");
				self.state = RunState::Expired;
				diagnostics.extend(run_diagnostics);
			}

			RunOutcome::Failed(run_diagnostics) => {
				warn!("Send run failed");
				self.state = RunState::Expired;
				diagnostics.extend(run_diagnostics);
			}
		}

		Completion {
			outputs: self.outputs.clone(),
			diagnostics: diagnostics.into_vec(),
			applied: true,
		}
	}

	/// Solves the node and, when a run starts, waits for it and applies its outcome
	pub async fn send(&mut self, inputs: SendInputs, env: &Arc<SendEnvironment>) -> Completion {
		match self.solve(inputs, env) {
			Solve::Started(ticket) => {
				let run_id = ticket.id();
				let outcome = ticket.wait().await;
				self.complete(run_id, outcome)
			}

			Solve::Stale(outputs) => Completion {
				outputs,
				diagnostics: std::mem::take(&mut self.pending).into_vec(),
				applied: true,
			},
		}
	}

	/// Requests the cancellation of the run in flight, if any
	pub fn cancel(&self) -> bool {
		self.active
			.as_ref()
			.is_some_and(|active| active.coordinator.cancel())
	}

	#[must_use]
	pub fn is_sending(&self) -> bool {
		self.active.is_some()
	}

	/// Latest progress of the run in flight
	#[must_use]
	pub fn progress(&self) -> Option<ProgressSnapshot> {
		self.active
			.as_ref()
			.map(|active| active.progress.borrow().clone())
	}

	#[must_use]
	pub fn overall_progress(&self) -> f64 {
		self.progress()
			.map_or(0.0, |snapshot| snapshot.overall())
	}
}

fn pick_converter(
	registry: &ConverterRegistry,
	profile: Option<&str>,
	diagnostics: &mut Diagnostics,
) -> Arc<dyn Converter> {
	let Some(profile) = profile else {
		return registry.default_converter();
	};

	registry.get(profile).unwrap_or_else(|e| {
		let fallback = registry.default_converter();
		warn!(?e, fallback = fallback.name(), "Unknown conversion profile");
		diagnostics.warning(format!(
			"Conversion profile '{profile}' not found, using '{}' instead",
			fallback.name()
		));
		fallback
	})
}

#[cfg(test)]
mod tests {
	use crate::diagnostics::Severity;

	use super::*;

	fn node() -> SendNode {
		SendNode::new(&SenderConfig::default(), Arc::default())
	}

	#[test]
	fn single_click_primes_idle_manual_nodes_only() {
		let mut node = node();
		assert_eq!(node.state(), RunState::NeedsInput);

		assert!(node.trigger());
		assert_eq!(node.state(), RunState::PrimedToSend);
		assert!(!node.trigger());

		let mut auto = self::node();
		auto.set_auto_send(true);
		assert!(!auto.trigger());
		assert_eq!(auto.state(), RunState::NeedsInput);
	}

	#[test]
	fn double_click_in_auto_mode_turns_it_off() {
		let mut node = node();
		node.set_auto_send(true);

		assert!(!node.force_trigger());
		assert!(!node.auto_send());
		assert_eq!(node.state(), RunState::NeedsInput);

		assert!(node.force_trigger());
		assert_eq!(node.state(), RunState::PrimedToSend);
	}

	#[test]
	fn switching_profile_expires_the_node() {
		let mut node = node();

		assert!(node.set_profile("Passthrough").is_ok());
		assert_eq!(node.state(), RunState::Expired);
		assert!(matches!(
			node.set_profile("Missing"),
			Err(ConversionError::UnknownProfile(_))
		));
	}

	#[test]
	fn unknown_stored_profile_falls_back_with_a_warning() {
		let snapshot = NodeSnapshot {
			conversion_profile: Some("Gone".to_string()),
			current_state: RunState::Sending.to_string(),
			..Default::default()
		};

		let node = SendNode::restore(&snapshot, Arc::default());

		assert_eq!(node.conversion_profile(), "Passthrough");
		assert_eq!(node.state(), RunState::Expired);
		assert_eq!(node.pending.count(Severity::Warning), 1);
	}
}
