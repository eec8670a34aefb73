use std::sync::{Arc, OnceLock};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

/// The cancellation signal of one run.
///
/// Every transport operation of the run gets a child of the run token, so tripping the
/// coordinator reaches all of them at once. The coordinator itself is usually a child of the
/// owning node's token, which lets the node cancel whatever is still running when dropped.
#[derive(Debug, Clone)]
pub struct CancellationCoordinator {
	token: CancellationToken,
	first_cause: Arc<OnceLock<String>>,
}

impl Default for CancellationCoordinator {
	fn default() -> Self {
		Self::new()
	}
}

impl CancellationCoordinator {
	#[must_use]
	pub fn new() -> Self {
		Self::with_token(CancellationToken::new())
	}

	#[must_use]
	pub fn child_of(parent: &CancellationToken) -> Self {
		Self::with_token(parent.child_token())
	}

	fn with_token(token: CancellationToken) -> Self {
		Self {
			token,
			first_cause: Arc::default(),
		}
	}

	/// Token for one concurrent operation of this run
	#[must_use]
	pub fn child_token(&self) -> CancellationToken {
		self.token.child_token()
	}

	/// Cancels the run recording why. Only the first call has any effect, returning `true`.
	pub fn trip(&self, cause: impl Into<String>) -> bool {
		let cause = cause.into();
		let first = self.first_cause.set(cause.clone()).is_ok();

		if first {
			debug!(%cause, "Run cancellation tripped");
			self.token.cancel();
		}

		first
	}

	/// Requests the cancellation of a run that was superseded or abandoned
	pub fn cancel(&self) -> bool {
		self.trip("run was superseded")
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}

	/// What tripped the coordinator. A parent token cancellation leaves no cause behind.
	#[must_use]
	pub fn cause(&self) -> Option<&str> {
		self.first_cause.get().map(String::as_str)
	}

	pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
		self.token.cancelled()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_first_trip_counts() {
		let coordinator = CancellationCoordinator::new();
		let child = coordinator.child_token();

		assert!(!coordinator.is_cancelled());
		assert!(coordinator.trip("T1: connection reset"));
		assert!(!coordinator.trip("T2: timeout"));

		assert!(coordinator.is_cancelled());
		assert!(child.is_cancelled());
		assert_eq!(coordinator.cause(), Some("T1: connection reset"));
	}

	#[test]
	fn parent_cancellation_cascades() {
		let node_token = CancellationToken::new();
		let coordinator = CancellationCoordinator::child_of(&node_token);
		let child = coordinator.child_token();

		node_token.cancel();

		assert!(coordinator.is_cancelled());
		assert!(child.is_cancelled());
		assert_eq!(coordinator.cause(), None);
	}
}
