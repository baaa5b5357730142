// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the authorization engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Errors that can occur while building or using an enforcer.
///
/// Configuration and compile errors abort enforcer construction. Errors raised
/// during [`crate::Enforcer::enforce`] are returned to the caller and are never
/// folded into a deny decision.
#[derive(Debug, Error)]
pub enum AuthzError {
	/// Malformed model text or a missing mandatory section.
	#[error("model parse error: {message}")]
	ConfigParse {
		line: Option<usize>,
		message: String,
	},

	/// A request or rule supplied the wrong number of fields.
	#[error("arity mismatch for `{key}`: expected {expected} fields, got {actual}")]
	ArityMismatch {
		key: String,
		expected: usize,
		actual: usize,
	},

	/// The matcher expression is malformed or references unknown identifiers.
	#[error("matcher compile error: {0}")]
	Compile(String),

	/// The effect expression does not match any supported combination mode.
	#[error("unsupported effect expression: `{0}`")]
	UnsupportedEffect(String),

	/// Opaque failure reported by a storage adapter.
	#[error("adapter error: {0}")]
	Adapter(String),

	/// A role-check function does not fit its role definition.
	#[error("role graph error: {0}")]
	RoleGraph(String),

	/// A rule or context references an assertion the model does not define.
	#[error("unknown assertion `{0}`")]
	UnknownAssertion(String),

	/// A pattern builtin received a pattern it cannot interpret.
	#[error("{function}: invalid pattern `{pattern}`: {message}")]
	InvalidPattern {
		function: &'static str,
		pattern: String,
		message: String,
	},

	/// A `priority` field holds a non-numeric value.
	#[error("invalid rule priority `{value}`")]
	InvalidPriority { value: String },

	/// An enforcer option could not be interpreted.
	#[error("invalid configuration value for {key}: {message}")]
	Config { key: String, message: String },

	/// An enforcer options file is not valid TOML.
	#[error("failed to parse {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

impl AuthzError {
	pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
		Self::ConfigParse {
			line: Some(line),
			message: format!("line {line}: {}", message.into()),
		}
	}

	pub(crate) fn model(message: impl Into<String>) -> Self {
		Self::ConfigParse {
			line: None,
			message: message.into(),
		}
	}

	pub(crate) fn arity(key: &str, expected: usize, actual: usize) -> Self {
		Self::ArityMismatch {
			key: key.to_string(),
			expected,
			actual,
		}
	}
}
