use ns_transport::StreamReference;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::warn;

use super::error::StateError;

/// Lifecycle of a send node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
	#[default]
	NeedsInput,
	PrimedToSend,
	Sending,
	Expired,
	UpToDate,
}

/// What a node persists in the host document.
///
/// The sent object itself is never stored, it can be arbitrarily big, only the references to
/// the commits created from it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeSnapshot {
	pub use_default_cache: bool,
	pub auto_send: bool,
	pub current_state: String,
	pub object_id: Option<String>,
	pub conversion_profile: Option<String>,
	/// One `endpoint\tstream_id\tcommit_id` line per output reference
	pub output_references: String,
}

impl NodeSnapshot {
	pub fn to_json(&self) -> Result<String, StateError> {
		serde_json::to_string(self).map_err(Into::into)
	}

	pub fn from_json(json: &str) -> Result<Self, StateError> {
		serde_json::from_str(json).map_err(Into::into)
	}

	/// Lifecycle state, unknown labels fall back to [`RunState::NeedsInput`]
	#[must_use]
	pub fn run_state(&self) -> RunState {
		self.current_state.parse().unwrap_or_else(|_| {
			if !self.current_state.is_empty() {
				warn!(label = %self.current_state, "Unknown stored node state");
			}
			RunState::default()
		})
	}
}

#[must_use]
pub fn encode_references(references: &[StreamReference]) -> String {
	references
		.iter()
		.map(StreamReference::to_line)
		.collect::<Vec<_>>()
		.join("\n")
}

/// Decodes stored output references. A garbled list yields no references at all, as a
/// partial list could chain new commits to the wrong parents.
#[must_use]
pub fn decode_references(encoded: &str) -> Vec<StreamReference> {
	if encoded.trim().is_empty() {
		return Vec::new();
	}

	encoded
		.lines()
		.map(StreamReference::from_line)
		.collect::<Result<Vec<_>, _>>()
		.unwrap_or_else(|e| {
			warn!(?e, "Discarding garbled stored output references");
			Vec::new()
		})
}
