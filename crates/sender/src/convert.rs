use std::{fmt, sync::Arc};

use serde_json::Value;

use super::error::ConversionError;

pub const PASSTHROUGH_PROFILE: &str = "Passthrough";

/// Turns the host native payload into the generic nested structure that gets sent
pub trait Converter: Send + Sync + fmt::Debug {
	fn name(&self) -> &str;

	fn convert(&self, payload: &Value) -> Result<Value, ConversionError>;
}

/// Sends the payload as it is
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughConverter;

impl Converter for PassthroughConverter {
	fn name(&self) -> &str {
		PASSTHROUGH_PROFILE
	}

	fn convert(&self, payload: &Value) -> Result<Value, ConversionError> {
		Ok(payload.clone())
	}
}

/// Conversion profiles available to nodes, by name
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
	converters: Vec<Arc<dyn Converter>>,
	default_profile: String,
}

impl Default for ConverterRegistry {
	fn default() -> Self {
		Self::new(Arc::new(PassthroughConverter))
	}
}

impl ConverterRegistry {
	#[must_use]
	pub fn new(default: Arc<dyn Converter>) -> Self {
		Self {
			default_profile: default.name().to_string(),
			converters: vec![default],
		}
	}

	/// Registers a profile, replacing any other with the same name
	pub fn register(&mut self, converter: Arc<dyn Converter>) {
		self.converters
			.retain(|existing| existing.name() != converter.name());
		self.converters.push(converter);
	}

	/// Makes an already registered profile the default one
	pub fn set_default(&mut self, name: &str) -> Result<(), ConversionError> {
		self.get(name)?;
		self.default_profile = name.to_string();

		Ok(())
	}

	pub fn get(&self, name: &str) -> Result<Arc<dyn Converter>, ConversionError> {
		self.converters
			.iter()
			.find(|converter| converter.name() == name)
			.cloned()
			.ok_or_else(|| ConversionError::UnknownProfile(name.to_string()))
	}

	#[must_use]
	pub fn default_converter(&self) -> Arc<dyn Converter> {
		self.get(&self.default_profile)
			.unwrap_or_else(|_| Arc::new(PassthroughConverter))
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.converters.iter().map(|converter| converter.name())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[derive(Debug)]
	struct Upper;

	impl Converter for Upper {
		fn name(&self) -> &str {
			"Upper"
		}

		fn convert(&self, payload: &Value) -> Result<Value, ConversionError> {
			payload
				.as_str()
				.map(|text| Value::String(text.to_uppercase()))
				.ok_or_else(|| ConversionError::Unsupported {
					path: "$".to_string(),
					reason: "expected text".to_string(),
				})
		}
	}

	#[test]
	fn looks_up_profiles_by_name() {
		let mut registry = ConverterRegistry::default();
		registry.register(Arc::new(Upper));

		assert_eq!(registry.default_converter().name(), PASSTHROUGH_PROFILE);
		assert_eq!(
			registry
				.get("Upper")
				.and_then(|converter| converter.convert(&json!("beam")))
				.ok(),
			Some(json!("BEAM"))
		);
		assert!(matches!(
			registry.get("Missing"),
			Err(ConversionError::UnknownProfile(name)) if name == "Missing"
		));

		registry.set_default("Upper").expect("profile is registered");
		assert_eq!(registry.default_converter().name(), "Upper");
		assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Passthrough", "Upper"]);
	}
}
