//!
//! # Sender
//!
//! Send orchestration for node graph hosts.
//!
//! A [`SendNode`] is one send node of the host graph. Whenever the host solves it, the node
//! either re-emits its current outputs as stale or spawns a run: a [`SendOrchestrator`]
//! converting the payload, resolving the transports input, persisting the object tree to
//! every transport at once and finally creating one commit per remote stream, chained to
//! the commit the node sent there last time.
//!
//! A single [`CancellationCoordinator`] is shared by all the operations of a run. The first
//! transport to fail trips it, so every other transport stops at its next batch and the run
//! ends without creating any commit. Starting a new run cancels the one in flight the same
//! way.
//!
//! Runs never mutate the node, their [`RunOutcome`] is handed back to
//! [`SendNode::complete`], which only replaces the outputs of a node on success.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod cancel;
mod commit_chain;
mod config;
mod convert;
mod diagnostics;
mod error;
mod node;
mod orchestrator;
mod progress;
mod resolver;
mod state;

pub use cancel::CancellationCoordinator;
pub use commit_chain::CommitChain;
pub use config::{SenderConfig, CONFIG_FILE_NAME};
pub use convert::{Converter, ConverterRegistry, PassthroughConverter, PASSTHROUGH_PROFILE};
pub use diagnostics::{DiagnosticEntry, Diagnostics, Severity};
pub use error::{ConfigError, ConversionError, SendError, StateError};
pub use node::{Completion, RunTicket, SendNode, Solve};
pub use orchestrator::{
	RunContext, RunOutcome, SendEnvironment, SendInputs, SendOrchestrator, SendReport,
	DEFAULT_BRANCH, DEFAULT_COMMIT_MESSAGE,
};
pub use progress::{ProgressAggregator, ProgressSnapshot};
pub use resolver::{TransportHandle, TransportInput, TransportResolver};
pub use state::{decode_references, encode_references, NodeSnapshot, RunState};
