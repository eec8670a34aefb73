use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::TransportError;

/// Field of the root object holding the converted payload
pub const DATA_FIELD: &str = "@data";

const REFERENCE_FIELD: &str = "referencedId";

/// Content derived identifier of a serialized object, the hex encoded blake3 hash of its
/// canonical JSON bytes. Ids travel next to the bytes, never inside them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
	#[must_use]
	pub fn from_content(bytes: &[u8]) -> Self {
		Self(blake3::hash(bytes).to_hex().to_string())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Two chars prefix used to shard objects on disk
	#[must_use]
	pub fn shard(&self) -> &str {
		self.0.get(..2).unwrap_or(&self.0)
	}
}

impl fmt::Display for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<String> for ObjectId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

/// One object of a tree, ready to be written to any transport
#[derive(Debug, Clone)]
pub struct SerializedObject {
	pub id: ObjectId,
	pub bytes: Vec<u8>,
}

/// The whole object tree flattened in write order: children always come before the objects
/// referencing them, so the root object is the last one.
#[derive(Debug, Clone)]
pub struct SerializedTree {
	root_id: ObjectId,
	objects: Vec<SerializedObject>,
}

impl SerializedTree {
	#[must_use]
	pub const fn root_id(&self) -> &ObjectId {
		&self.root_id
	}

	#[must_use]
	pub fn objects(&self) -> &[SerializedObject] {
		&self.objects
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.objects.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	#[must_use]
	pub fn total_bytes(&self) -> u64 {
		self.objects.iter().map(|object| object.bytes.len() as u64).sum()
	}
}

/// Root of the data sent on a run, wrapping the converted payload under [`DATA_FIELD`].
///
/// Every JSON object in the payload is a node of the tree and gets detached into its own
/// [`SerializedObject`] on serialization, its parent keeping only a reference to its id.
#[derive(Debug, Clone, PartialEq)]
pub struct DataObject {
	root: Map<String, Value>,
}

impl DataObject {
	#[must_use]
	pub fn new(converted: Value) -> Self {
		let mut root = Map::new();
		root.insert(DATA_FIELD.to_string(), converted);

		Self { root }
	}

	#[must_use]
	pub fn data(&self) -> &Value {
		self.root.get(DATA_FIELD).unwrap_or(&Value::Null)
	}

	/// Count of object nodes in the tree, root included
	#[must_use]
	pub fn total_children_count(&self) -> u64 {
		1 + self.root.values().map(count_objects).sum::<u64>()
	}

	pub fn serialize(&self) -> Result<SerializedTree, TransportError> {
		let mut objects = Vec::new();
		let root_id = serialize_object(&self.root, &mut objects)?;

		Ok(SerializedTree { root_id, objects })
	}
}

fn count_objects(value: &Value) -> u64 {
	match value {
		Value::Object(map) => 1 + map.values().map(count_objects).sum::<u64>(),
		Value::Array(items) => items.iter().map(count_objects).sum(),
		_ => 0,
	}
}

fn serialize_object(
	map: &Map<String, Value>,
	out: &mut Vec<SerializedObject>,
) -> Result<ObjectId, TransportError> {
	let mut detached = Map::new();
	for (key, value) in map {
		detached.insert(key.clone(), detach(value, out)?);
	}

	// `Map` keeps keys sorted, so this encoding is canonical
	let bytes = serde_json::to_vec(&detached)?;
	let id = ObjectId::from_content(&bytes);

	out.push(SerializedObject {
		id: id.clone(),
		bytes,
	});

	Ok(id)
}

fn detach(value: &Value, out: &mut Vec<SerializedObject>) -> Result<Value, TransportError> {
	match value {
		Value::Object(map) => {
			let id = serialize_object(map, out)?;
			let mut reference = Map::new();
			reference.insert(REFERENCE_FIELD.to_string(), Value::String(id.to_string()));

			Ok(Value::Object(reference))
		}
		Value::Array(items) => items
			.iter()
			.map(|item| detach(item, out))
			.collect::<Result<Vec<_>, _>>()
			.map(Value::Array),
		other => Ok(other.clone()),
	}
}
