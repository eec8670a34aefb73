use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::ParseReferenceError;

const STREAMS_SEGMENT: &str = "streams";
const COMMITS_SEGMENT: &str = "commits";

/// Pointer to one stream on a remote store and, optionally, to one commit on it.
///
/// Textual form is `<endpoint>/streams/<stream_id>[/commits/<commit_id>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamReference {
	endpoint: String,
	stream_id: String,
	commit_id: Option<String>,
}

impl StreamReference {
	#[must_use]
	pub fn new(
		endpoint: impl Into<String>,
		stream_id: impl Into<String>,
		commit_id: Option<String>,
	) -> Self {
		Self {
			endpoint: normalize_endpoint(&endpoint.into()),
			stream_id: stream_id.into(),
			commit_id,
		}
	}

	#[must_use]
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	#[must_use]
	pub fn stream_id(&self) -> &str {
		&self.stream_id
	}

	#[must_use]
	pub fn commit_id(&self) -> Option<&str> {
		self.commit_id.as_deref()
	}

	#[must_use]
	pub fn with_commit(self, commit_id: impl Into<String>) -> Self {
		Self {
			commit_id: Some(commit_id.into()),
			..self
		}
	}

	/// Whether this reference points to the same stream on the same endpoint
	#[must_use]
	pub fn is_same_stream(&self, endpoint: &str, stream_id: &str) -> bool {
		self.stream_id == stream_id && self.endpoint == normalize_endpoint(endpoint)
	}

	/// Url to view the referenced commit online
	#[must_use]
	pub fn commit_url(&self) -> Option<String> {
		self.commit_id.as_ref().map(|commit_id| {
			format!(
				"{}/{STREAMS_SEGMENT}/{}/{COMMITS_SEGMENT}/{commit_id}",
				self.endpoint, self.stream_id
			)
		})
	}

	/// Storage form, `endpoint\tstream_id\tcommit_id`
	#[must_use]
	pub fn to_line(&self) -> String {
		format!(
			"{}\t{}\t{}",
			self.endpoint,
			self.stream_id,
			self.commit_id.as_deref().unwrap_or_default()
		)
	}

	pub fn from_line(line: &str) -> Result<Self, ParseReferenceError> {
		let mut pieces = line.split('\t');

		match (pieces.next(), pieces.next(), pieces.next(), pieces.next()) {
			(Some(endpoint), Some(stream_id), Some(commit_id), None)
				if !endpoint.is_empty() && !stream_id.is_empty() =>
			{
				Ok(Self::new(
					endpoint,
					stream_id,
					(!commit_id.is_empty()).then(|| commit_id.to_string()),
				))
			}
			_ => Err(ParseReferenceError::MalformedLine(line.to_string())),
		}
	}
}

/// Web origin of an endpoint, `scheme://host[:port]` with scheme and host lowercased.
/// Anything that isn't an http(s) url is only trimmed.
pub(crate) fn normalize_endpoint(endpoint: &str) -> String {
	let endpoint = endpoint.trim();

	match Url::parse(endpoint) {
		Ok(url) if is_web_url(&url) => url.origin().ascii_serialization(),
		_ => endpoint.trim_end_matches('/').to_string(),
	}
}

pub(crate) fn is_web_url(url: &Url) -> bool {
	matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|host| !host.is_empty())
}

impl FromStr for StreamReference {
	type Err = ParseReferenceError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let input = s.trim();

		let url = Url::parse(input)
			.ok()
			.filter(is_web_url)
			.ok_or_else(|| ParseReferenceError::NotAUrl(input.to_string()))?;

		let mut segments = url
			.path_segments()
			.ok_or_else(|| ParseReferenceError::NotAUrl(input.to_string()))?
			.filter(|segment| !segment.is_empty());

		if segments.next() != Some(STREAMS_SEGMENT) {
			return Err(ParseReferenceError::MissingStream(input.to_string()));
		}

		let Some(stream_id) = segments.next() else {
			return Err(ParseReferenceError::EmptyStreamId(input.to_string()));
		};

		let commit_id = match (segments.next(), segments.next()) {
			(Some(COMMITS_SEGMENT), Some(commit_id)) => Some(commit_id.to_string()),
			_ => None,
		};

		Ok(Self {
			endpoint: url.origin().ascii_serialization(),
			stream_id: stream_id.to_string(),
			commit_id,
		})
	}
}

impl fmt::Display for StreamReference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.commit_id {
			Some(commit_id) => write!(
				f,
				"{}/{STREAMS_SEGMENT}/{}/{COMMITS_SEGMENT}/{commit_id}",
				self.endpoint, self.stream_id
			),
			None => write!(f, "{}/{STREAMS_SEGMENT}/{}", self.endpoint, self.stream_id),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_stream_url() {
		let reference: StreamReference = "https://host/streams/abc123".parse().expect("valid url");

		assert_eq!(reference.endpoint(), "https://host");
		assert_eq!(reference.stream_id(), "abc123");
		assert_eq!(reference.commit_id(), None);
	}

	#[test]
	fn parses_commit_url() {
		let reference: StreamReference = "http://store.local:3000/streams/s1/commits/c9"
			.parse()
			.expect("valid url");

		assert_eq!(reference.endpoint(), "http://store.local:3000");
		assert_eq!(reference.stream_id(), "s1");
		assert_eq!(reference.commit_id(), Some("c9"));
		assert_eq!(
			reference.commit_url().as_deref(),
			Some("http://store.local:3000/streams/s1/commits/c9")
		);
	}

	#[test]
	fn rejects_non_references() {
		assert_eq!(
			"not-a-url".parse::<StreamReference>(),
			Err(ParseReferenceError::NotAUrl("not-a-url".to_string()))
		);
		assert!(matches!(
			"https://host/projects/abc".parse::<StreamReference>(),
			Err(ParseReferenceError::MissingStream(_))
		));
		assert!(matches!(
			"https://host/streams/".parse::<StreamReference>(),
			Err(ParseReferenceError::EmptyStreamId(_))
		));
		assert!(matches!(
			"ftp://host/streams/abc".parse::<StreamReference>(),
			Err(ParseReferenceError::NotAUrl(_))
		));
		assert!("https:///streams/abc".parse::<StreamReference>().is_err());
	}

	#[test]
	fn scheme_and_host_are_case_insensitive() {
		let reference: StreamReference = "HTTPS://Host.Example/streams/s1?tab=commits"
			.parse()
			.expect("valid url");

		assert_eq!(reference.endpoint(), "https://host.example");
		assert_eq!(reference.stream_id(), "s1");
		assert!(reference.is_same_stream("https://HOST.example/", "s1"));
		assert_eq!(
			StreamReference::new("HTTP://Store.Local:3000/", "s1", None).endpoint(),
			"http://store.local:3000"
		);
	}

	#[test]
	fn storage_lines() {
		let reference = StreamReference::new("https://host/", "abc", Some("c1".to_string()));
		let line = reference.to_line();

		assert_eq!(line, "https://host\tabc\tc1");
		assert_eq!(StreamReference::from_line(&line), Ok(reference));
		assert!(StreamReference::from_line("garbage").is_err());
		assert!(StreamReference::from_line("a\tb\tc\td").is_err());
	}

	#[test]
	fn same_stream_ignores_trailing_slash() {
		let reference = StreamReference::new("https://host", "abc", None);

		assert!(reference.is_same_stream("https://host/", "abc"));
		assert!(!reference.is_same_stream("https://other", "abc"));
		assert!(!reference.is_same_stream("https://host", "abd"));
	}
}
