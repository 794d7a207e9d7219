//! Loading island metadata from a marker node's attributes.

use crate::{config::IslandConfig, document::MarkerNode, version::Version, Props};
use serde_json::Value;
use thiserror::Error;

/// Everything a marker node says about the island it hosts.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandMarker {
	pub component: String,
	pub params: Props,
	pub props: Props,
	pub version: Version,
	pub instance: Option<String>,
	pub stream: Option<String>,
}

#[derive(Debug, Error)]
pub enum MarkerError {
	#[error("Marker has no (or an empty) component name")]
	MissingComponent,
	#[error("`{attribute}` is not valid JSON: {source}")]
	InvalidJson { attribute: String, source: serde_json::Error },
	#[error("`{attribute}` is not a JSON object")]
	NotAnObject { attribute: String },
}

/// Reads the component name only, which is enough to decide whether the node can be mounted at all.
#[must_use]
pub fn load_component_name(node: &impl MarkerNode, config: &IslandConfig) -> Option<String> {
	node.attribute(&config.component_attribute).filter(|name| !name.is_empty())
}

/// # Errors
///
/// Iff the component name is missing or the params or props attribute isn't a JSON object.
pub fn load_marker(node: &impl MarkerNode, config: &IslandConfig) -> Result<IslandMarker, MarkerError> {
	let component = load_component_name(node, config).ok_or(MarkerError::MissingComponent)?;
	Ok(IslandMarker {
		component,
		params: load_json_object(&config.params_attribute, node.attribute(&config.params_attribute).as_deref())?,
		props: load_json_object(&config.props_attribute, node.attribute(&config.props_attribute).as_deref())?,
		version: load_version(node.attribute(&config.version_attribute).as_deref()),
		instance: node.attribute(&config.instance_attribute),
		stream: node.attribute(&config.stream_attribute).filter(|stream| !stream.is_empty()),
	})
}

/// A missing or blank attribute is an empty object.
///
/// # Errors
///
/// Iff `value` is present, not blank, and not a JSON object.
pub fn load_json_object(attribute: &str, value: Option<&str>) -> Result<Props, MarkerError> {
	let value = match value {
		Some(value) if !value.trim().is_empty() => value,
		_ => return Ok(Props::new()),
	};

	match serde_json::from_str(value) {
		Ok(Value::Object(object)) => Ok(object),
		Ok(_) => Err(MarkerError::NotAnObject { attribute: attribute.to_owned() }),
		Err(source) => Err(MarkerError::InvalidJson {
			attribute: attribute.to_owned(),
			source,
		}),
	}
}

/// Missing, non-numeric, negative or non-finite versions are `0`. Fractions are truncated.
#[must_use]
pub fn load_version(value: Option<&str>) -> Version {
	let value = match value.map(str::trim) {
		Some(value) if !value.is_empty() => value,
		_ => return 0,
	};

	if let Ok(version) = value.parse::<Version>() {
		return version;
	}
	match value.parse::<f64>() {
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		Ok(version) if version.is_finite() && version >= 0.0 => version as Version,
		_ => 0,
	}
}
