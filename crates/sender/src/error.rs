use std::path::Path;

use ns_transport::TransportError;

use thiserror::Error;

/// Errors that end a run before anything gets persisted
#[derive(Debug, Error)]
pub enum SendError {
	#[error("could not identify any valid transports to send to")]
	NoValidTransports,
	#[error(transparent)]
	Conversion(#[from] ConversionError),
	#[error("failed to serialize the data object: {0}")]
	Serialize(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ConversionError {
	#[error("conversion profile not found <name='{0}'>")]
	UnknownProfile(String),
	#[error("unsupported value <path='{path}'>: {reason}")]
	Unsupported { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("config file I/O error: {source}; path: '{}'", .path.display())]
	FileIO {
		path: Box<Path>,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid config file <path='{}'>: {source}", .path.display())]
	Json {
		path: Box<Path>,
		#[source]
		source: serde_json::Error,
	},
	#[error("config version is newer than supported <found='{found}', supported='{supported}'>")]
	UnsupportedVersion { found: u32, supported: u32 },
}

impl ConfigError {
	pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
		Self::FileIO {
			path: path.as_ref().into(),
			source,
		}
	}

	pub(crate) fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
		Self::Json {
			path: path.as_ref().into(),
			source,
		}
	}
}

#[derive(Debug, Error)]
pub enum StateError {
	#[error("failed to encode or decode node state: {0}")]
	Json(#[from] serde_json::Error),
}
