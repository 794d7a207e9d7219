//! Attribute names, host event names and the cable channel, overridable from JSON.

use crate::document::HostEvent;
use serde::Deserialize;
use thiserror::Error;

/// Attribute names, request context keys and host event names.
///
/// Every field has a default, so a partial JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IslandConfig {
	/// Flags an element as an island marker.
	pub marker_attribute: String,
	pub component_attribute: String,
	/// JSON object, immutable for the island's lifetime.
	pub params_attribute: String,
	/// JSON object seeding the island's props.
	pub props_attribute: String,
	/// Numeric string seeding the island's version.
	pub version_attribute: String,
	pub instance_attribute: String,
	pub stream_attribute: String,
	/// Set to `"true"` once an island is attached, removed on teardown.
	pub mounted_attribute: String,

	/// Request context key that carries the island's stream name.
	pub stream_param: String,
	/// Payload key that carries the HTTP method of non-POST submissions.
	pub method_param: String,
	/// Error key of form-wide (not field-specific) errors.
	pub base_error_key: String,
	pub forbidden_message: String,

	/// Channel named in live-update subscriptions.
	pub channel: String,

	/// Host event: a page navigation completed.
	pub navigation_event: String,
	/// Host event: the page body was (re-)rendered.
	pub render_event: String,
	/// Host event: a sub-frame finished loading.
	pub frame_load_event: String,
	/// Host event: the page is about to be cached. Every island is torn down synchronously.
	pub teardown_event: String,
}
impl Default for IslandConfig {
	fn default() -> Self {
		Self {
			marker_attribute: "data-island".to_owned(),
			component_attribute: "data-component".to_owned(),
			params_attribute: "data-params".to_owned(),
			props_attribute: "data-props".to_owned(),
			version_attribute: "data-version".to_owned(),
			instance_attribute: "data-instance".to_owned(),
			stream_attribute: "data-stream".to_owned(),
			mounted_attribute: "data-mounted".to_owned(),
			stream_param: "__stream".to_owned(),
			method_param: "_method".to_owned(),
			base_error_key: "_base".to_owned(),
			forbidden_message: "forbidden".to_owned(),
			channel: "Archipelago::IslandChannel".to_owned(),
			navigation_event: "turbo:load".to_owned(),
			render_event: "turbo:render".to_owned(),
			frame_load_event: "turbo:frame-load".to_owned(),
			teardown_event: "turbo:before-cache".to_owned(),
		}
	}
}

#[derive(Debug, Error)]
#[error("Invalid island configuration: {0}")]
pub struct ConfigError(#[from] serde_json::Error);

impl IslandConfig {
	/// # Errors
	///
	/// Iff `json` isn't a JSON object matching [`IslandConfig`]'s fields.
	pub fn from_json(json: &str) -> Result<Self, ConfigError> {
		Ok(serde_json::from_str(json)?)
	}

	/// CSS selector matching every island marker.
	#[must_use]
	pub fn marker_selector(&self) -> String {
		format!("[{}]", self.marker_attribute)
	}

	/// Names of the host events that map onto [`HostEvent`]s, in no particular order.
	#[must_use]
	pub fn lifecycle_events(&self) -> [&str; 4] {
		[&self.navigation_event, &self.render_event, &self.frame_load_event, &self.teardown_event]
	}

	/// Maps a host event name to the [`HostEvent`] it signals.
	#[must_use]
	pub fn host_event<N>(&self, name: &str) -> Option<HostEvent<N>> {
		if name == self.navigation_event {
			Some(HostEvent::NavigationCompleted)
		} else if name == self.render_event {
			Some(HostEvent::Rendered)
		} else if name == self.frame_load_event {
			Some(HostEvent::FrameLoaded)
		} else if name == self.teardown_event {
			Some(HostEvent::BeforeCache)
		} else {
			None
		}
	}
}
