// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::Result;

use super::{PolicyLine, PolicyLoader};

/// Read-only adapter over CSV policy text.
#[derive(Debug, Clone, Default)]
pub struct StringAdapter {
	text: String,
}

impl StringAdapter {
	pub fn new(text: impl Into<String>) -> Self {
		Self { text: text.into() }
	}
}

impl PolicyLoader for StringAdapter {
	fn load_policy(&mut self) -> Result<Vec<PolicyLine>> {
		PolicyLine::parse_lines(&self.text)
	}
}

/// Adapter that stores nothing. Policy lives only in the enforcer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAdapter;

impl PolicyLoader for NullAdapter {
	fn load_policy(&mut self) -> Result<Vec<PolicyLine>> {
		Ok(Vec::new())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn string_adapter_loads_csv() {
		let mut adapter = StringAdapter::new("p, alice, data1, read\n\n# comment\ng, alice, admin\n");
		let lines = adapter.load_policy().unwrap();
		assert_eq!(lines.len(), 2);
		assert_eq!(lines[0].key, "p");
		assert_eq!(lines[1].rule, ["alice", "admin"]);
	}

	#[test]
	fn string_adapter_reports_bad_lines() {
		let mut adapter = StringAdapter::new("p, \"unterminated\n");
		assert!(adapter.load_policy().is_err());
	}

	#[test]
	fn null_adapter_is_empty() {
		assert!(NullAdapter.load_policy().unwrap().is_empty());
	}
}
