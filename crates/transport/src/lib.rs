//!
//! # Transports
//!
//! Persistence backends for content-addressed object trees.
//!
//! A [`DataObject`] is serialized once into a flat list of [`SerializedObject`]s, children
//! first, each one identified by the blake3 hash of its canonical JSON. Any [`Transport`] can
//! then persist that list, reporting how many objects it has written so far and stopping at
//! the next batch boundary once its cancellation token fires.
//!
//! Two transports ship with the crate:
//! - [`LocalCache`], a sharded on-disk object store used as the default cache;
//! - [`ServerTransport`], which uploads objects to a stream on a remote store through a
//!   [`RemoteApi`] and is the only kind of transport able to create commits.
//!
//! [`HttpRemote`] is the `reqwest` backed [`RemoteApi`], [`MemoryTransport`] is an in-memory
//! store handy for tests and dry runs.

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

mod cache;
mod error;
mod http;
mod memory;
mod object;
mod reference;
mod server;
mod transport;

pub use cache::{LocalCache, CACHE_TRANSPORT_NAME};
pub use error::{ParseReferenceError, TransportError};
pub use http::HttpRemote;
pub use memory::MemoryTransport;
pub use object::{DataObject, ObjectId, SerializedObject, SerializedTree, DATA_FIELD};
pub use reference::StreamReference;
pub use server::{
	Account, AccountProvider, CommitRequest, RemoteApi, ServerTransport, StaticAccounts,
};
pub use transport::{PersistStatus, ProgressFn, Transport, BATCH_SIZE};

// Re-exports
pub use tokio_util::sync::CancellationToken;
