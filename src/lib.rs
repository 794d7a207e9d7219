#![doc(html_root_url = "https://docs.rs/island-dom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Mounts independent, server-rendered UI islands into a host document and keeps each island's
//! `{props, version}` cell consistent across form submissions and pushed live updates.
//!
//! The crate does not render anything itself. Renderers, request execution and the live-update
//! transport are plugged in through [`registry::Renderer`], [`request::RequestExecutor`] and
//! [`stream::StreamTransport`] respectively.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod config;
pub mod discovery;
pub mod document;
pub mod island;
pub mod load;
pub mod memory;
pub mod mount;
pub mod registry;
pub mod request;
pub mod response;
pub mod stream;
pub mod version;
pub mod watch;
pub mod web;

pub use config::IslandConfig;
pub use discovery::Archipelago;
pub use island::Island;
pub use response::IslandResponse;
pub use version::{IslandState, StateCell, Version};

/// An island's props or params: a JSON object.
pub type Props = serde_json::Map<String, serde_json::Value>;

/// Describes a JSON object for logging without leaking its values,
/// unless the `dangerous-logging` feature is enabled.
pub(crate) fn describe(props: &Props) -> String {
	if cfg!(feature = "dangerous-logging") {
		serde_json::Value::Object(props.clone()).to_string()
	} else {
		let keys: Vec<&str> = props.keys().map(String::as_str).collect();
		format!("{{{}}}", keys.join(", "))
	}
}
