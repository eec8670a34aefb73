use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::{
	error::TransportError,
	object::SerializedObject,
	server::{Account, CommitRequest, RemoteApi},
};

const COMMIT_CREATE_MUTATION: &str =
	"mutation commitCreate($commit: CommitCreateInput!) { commitCreate(commit: $commit) }";

/// [`RemoteApi`] over http, objects go through the REST upload endpoint and commits through
/// the GraphQL api of the server.
#[derive(Debug, Clone)]
pub struct HttpRemote {
	client: reqwest::Client,
	source_application: String,
}

impl HttpRemote {
	#[must_use]
	pub fn new(source_application: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			source_application: source_application.into(),
		}
	}
}

trait WithAuth {
	fn with_auth(self, account: &Account) -> Self;
}

impl WithAuth for reqwest::RequestBuilder {
	fn with_auth(self, account: &Account) -> Self {
		self.bearer_auth(&account.token)
	}
}

#[derive(Deserialize)]
struct GraphQlResponse {
	data: Option<Value>,
	#[serde(default)]
	errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
	message: String,
}

/// Upload body, a JSON array of `{ "id": <object id>, "data": <object> }` entries
fn batch_body(batch: &[SerializedObject]) -> Vec<u8> {
	let mut body = Vec::with_capacity(
		batch
			.iter()
			.map(|object| object.bytes.len() + object.id.as_str().len() + 20)
			.sum::<usize>()
			+ 2,
	);

	body.push(b'[');
	for (i, object) in batch.iter().enumerate() {
		if i > 0 {
			body.push(b',');
		}
		// Ids are hex, nothing in them needs escaping
		body.extend_from_slice(br#"{"id":""#);
		body.extend_from_slice(object.id.as_str().as_bytes());
		body.extend_from_slice(br#"","data":"#);
		body.extend_from_slice(&object.bytes);
		body.push(b'}');
	}
	body.push(b']');

	body
}

async fn rejection(response: reqwest::Response) -> TransportError {
	let status = response.status().as_u16();
	let message = response.text().await.unwrap_or_default();

	TransportError::Rejected { status, message }
}

#[async_trait]
impl RemoteApi for HttpRemote {
	#[instrument(skip(self, account, batch), fields(objects = batch.len()), err)]
	async fn upload_objects(
		&self,
		account: &Account,
		stream_id: &str,
		batch: &[SerializedObject],
	) -> Result<u64, TransportError> {
		let body = batch_body(batch);
		let sent = body.len() as u64;

		let response = self
			.client
			.post(format!(
				"{}/objects/{stream_id}",
				account.server_url.trim_end_matches('/')
			))
			.with_auth(account)
			.header(reqwest::header::CONTENT_TYPE, "application/json")
			.body(body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(rejection(response).await);
		}

		Ok(sent)
	}

	#[instrument(skip(self, account), fields(stream_id = %request.stream_id), err)]
	async fn create_commit(
		&self,
		account: &Account,
		request: &CommitRequest,
	) -> Result<String, TransportError> {
		let response = self
			.client
			.post(format!(
				"{}/graphql",
				account.server_url.trim_end_matches('/')
			))
			.with_auth(account)
			.json(&json!({
				"query": COMMIT_CREATE_MUTATION,
				"variables": {
					"commit": {
						"streamId": request.stream_id,
						"branchName": request.branch_name,
						"objectId": request.object_id,
						"message": request.message,
						"previousCommitIds": request.previous_commit_ids,
						"sourceApplication": self.source_application,
					}
				}
			}))
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(rejection(response).await);
		}

		let GraphQlResponse { data, errors } = response.json().await?;

		if let Some(error) = errors.into_iter().next() {
			return Err(TransportError::Rejected {
				status: 200,
				message: error.message,
			});
		}

		let commit_id = data
			.as_ref()
			.and_then(|data| data.get("commitCreate"))
			.and_then(Value::as_str)
			.map(ToString::to_string)
			.ok_or_else(|| TransportError::MissingCommitId(request.stream_id.clone()))?;

		debug!(%commit_id, "Commit created");

		Ok(commit_id)
	}
}

#[cfg(test)]
mod tests {
	use crate::ObjectId;

	use super::*;

	#[test]
	fn batch_body_pairs_ids_with_objects() {
		let first = br#"{"a":1}"#.to_vec();
		let second = br#"{"id":"beam-7"}"#.to_vec();
		let batch = [
			SerializedObject {
				id: ObjectId::from_content(&first),
				bytes: first.clone(),
			},
			SerializedObject {
				id: ObjectId::from_content(&second),
				bytes: second.clone(),
			},
		];

		let body: Value = serde_json::from_slice(&batch_body(&batch)).expect("invalid json");
		assert_eq!(
			body,
			json!([
				{ "id": ObjectId::from_content(&first).as_str(), "data": { "a": 1 } },
				{ "id": ObjectId::from_content(&second).as_str(), "data": { "id": "beam-7" } },
			])
		);
		assert_eq!(batch_body(&[]), b"[]".to_vec());
	}
}
