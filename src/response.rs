//! The structured response wire contract shared by request responses and live-update messages.

use crate::{version::Version, Props};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Field name → list of error messages.
pub type FieldErrors = HashMap<String, Vec<String>>;

/// `{status: "ok", props, version?}` | `{status: "validation-error", errors}` | `{status: "forbidden"}`.
///
/// The legacy `"error"` status tag is accepted as an alias of `"validation-error"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum IslandResponse {
	Ok {
		props: Props,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		version: Option<Version>,
	},
	#[serde(alias = "error")]
	ValidationError { errors: FieldErrors },
	Forbidden,
}

#[derive(Debug, Error)]
#[error("Malformed island response: {0}")]
pub struct ResponseError(#[from] serde_json::Error);

impl IslandResponse {
	/// Validates an arbitrary JSON value against the wire contract.
	///
	/// # Errors
	///
	/// Iff `value` has any shape other than the three response variants.
	pub fn parse(value: Value) -> Result<Self, ResponseError> {
		Ok(serde_json::from_value(value)?)
	}

	/// # Errors
	///
	/// Iff `json` isn't JSON or has any shape other than the three response variants.
	pub fn parse_str(json: &str) -> Result<Self, ResponseError> {
		Ok(serde_json::from_str(json)?)
	}

	#[must_use]
	pub fn is_ok(&self) -> bool {
		matches!(self, IslandResponse::Ok { .. })
	}

	#[must_use]
	pub fn status(&self) -> &'static str {
		match self {
			IslandResponse::Ok { .. } => "ok",
			IslandResponse::ValidationError { .. } => "validation-error",
			IslandResponse::Forbidden => "forbidden",
		}
	}
}
