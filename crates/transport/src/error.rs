use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
	#[error("failed to serialize object: {0}")]
	Serialize(#[from] serde_json::Error),
	#[error("file I/O error: {source}; path: '{}'", .path.display())]
	FileIO {
		path: Box<Path>,
		#[source]
		source: std::io::Error,
	},
	#[error("request to remote failed: {0}")]
	Request(#[from] reqwest::Error),
	#[error("remote rejected request <status='{status}'>: {message}")]
	Rejected { status: u16, message: String },
	#[error("remote response is missing the commit id <stream_id='{0}'>")]
	MissingCommitId(String),
	#[error("{0}")]
	Other(String),
}

impl TransportError {
	pub fn from_std_io_err(path: impl AsRef<Path>, source: std::io::Error) -> Self {
		Self::FileIO {
			path: path.as_ref().into(),
			source,
		}
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseReferenceError {
	#[error("reference is not an http(s) url <input='{0}'>")]
	NotAUrl(String),
	#[error("reference has no stream segment <input='{0}'>")]
	MissingStream(String),
	#[error("reference has an empty stream id <input='{0}'>")]
	EmptyStreamId(String),
	#[error("malformed stored reference line <line='{0}'>")]
	MalformedLine(String),
}
