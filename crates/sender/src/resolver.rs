use ns_transport::{AccountProvider, RemoteApi, ServerTransport, StreamReference, Transport};

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::diagnostics::Diagnostics;

/// One entry of the transports input of a node
#[derive(Debug)]
pub enum TransportInput {
	/// Text that may hold a stream reference
	Text(String),
	/// A transport built elsewhere, used as is
	Transport(Box<dyn Transport>),
}

impl TransportInput {
	#[must_use]
	pub fn text(text: impl Into<String>) -> Self {
		Self::Text(text.into())
	}

	#[must_use]
	pub fn transport(transport: impl Transport) -> Self {
		Self::Transport(Box::new(transport))
	}
}

/// A transport resolved for the current run
#[derive(Debug)]
pub enum TransportHandle {
	Server(ServerTransport),
	Other(Box<dyn Transport>),
}

impl TransportHandle {
	#[must_use]
	pub fn name(&self) -> &str {
		self.transport().name()
	}

	#[must_use]
	pub fn transport(&self) -> &dyn Transport {
		match self {
			Self::Server(server) => server,
			Self::Other(transport) => transport.as_ref(),
		}
	}

	#[must_use]
	pub const fn as_server(&self) -> Option<&ServerTransport> {
		match self {
			Self::Server(server) => Some(server),
			Self::Other(_) => None,
		}
	}
}

/// Turns the transports input of a node into named transports
pub struct TransportResolver<'a> {
	accounts: &'a dyn AccountProvider,
	remote: &'a Arc<dyn RemoteApi>,
}

impl<'a> TransportResolver<'a> {
	#[must_use]
	pub fn new(accounts: &'a dyn AccountProvider, remote: &'a Arc<dyn RemoteApi>) -> Self {
		Self { accounts, remote }
	}

	/// Resolves every input in order, naming each transport after its input position.
	///
	/// Names are `T<index>` with the index of the input, not of the resolved transport: a
	/// skipped input still uses up its index, so the input after it is named `T1` even when it
	/// is the first transport returned.
	///
	/// Text that isn't a stream reference is skipped silently, optional inputs are often left
	/// with junk in them. A reference without an account is skipped with an error diagnostic.
	pub fn resolve(
		&self,
		inputs: Vec<TransportInput>,
		diagnostics: &mut Diagnostics,
	) -> Vec<TransportHandle> {
		inputs
			.into_iter()
			.enumerate()
			.filter_map(|(index, input)| {
				let name = format!("T{index}");

				match input {
					TransportInput::Transport(mut transport) => {
						transport.set_name(name);
						Some(TransportHandle::Other(transport))
					}

					TransportInput::Text(text) => {
						let reference = match text.parse::<StreamReference>() {
							Ok(reference) => reference,
							Err(e) => {
								trace!(%index, ?e, "Skipping input that isn't a stream reference");
								return None;
							}
						};

						let Some(account) = self.accounts.account_for(&reference) else {
							warn!(%reference, "No account found for stream reference");
							diagnostics.error(format!("Could not get an account for {reference}"));
							return None;
						};

						let mut server = ServerTransport::new(
							account,
							reference.stream_id(),
							Arc::clone(self.remote),
						);
						server.set_name(name);

						debug!(
							transport = server.name(),
							endpoint = server.endpoint(),
							stream_id = server.stream_id(),
							"Resolved stream transport"
						);

						Some(TransportHandle::Server(server))
					}
				}
			})
			.collect()
	}
}
