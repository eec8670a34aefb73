use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
pub enum Severity {
	Remark,
	Warning,
	Error,
}

/// A message for the host, shown next to the node once a run ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
	pub severity: Severity,
	pub text: String,
}

impl fmt::Display for DiagnosticEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}] {}", self.severity, self.text)
	}
}

/// Diagnostics queued during a run, in the order they were recorded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<DiagnosticEntry>);

impl Diagnostics {
	pub fn push(&mut self, severity: Severity, text: impl Into<String>) {
		self.0.push(DiagnosticEntry {
			severity,
			text: text.into(),
		});
	}

	pub fn remark(&mut self, text: impl Into<String>) {
		self.push(Severity::Remark, text);
	}

	pub fn warning(&mut self, text: impl Into<String>) {
		self.push(Severity::Warning, text);
	}

	pub fn error(&mut self, text: impl Into<String>) {
		self.push(Severity::Error, text);
	}

	/// Whether any warning or error was recorded
	#[must_use]
	pub fn has_problems(&self) -> bool {
		self.0
			.iter()
			.any(|entry| entry.severity >= Severity::Warning)
	}

	#[must_use]
	pub fn count(&self, severity: Severity) -> usize {
		self.0
			.iter()
			.filter(|entry| entry.severity == severity)
			.count()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &DiagnosticEntry> {
		self.0.iter()
	}

	pub fn extend(&mut self, other: Self) {
		self.0.extend(other.0);
	}

	#[must_use]
	pub fn into_vec(self) -> Vec<DiagnosticEntry> {
		self.0
	}
}
