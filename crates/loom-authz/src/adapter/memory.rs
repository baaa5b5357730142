// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::Result;

use super::{PolicyLine, PolicyLoader, PolicyPersister};

/// Read/write adapter backed by a vector. Useful for tests and for hosts that
/// manage persistence themselves.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
	lines: Vec<PolicyLine>,
}

impl MemoryAdapter {
	pub fn new(lines: Vec<PolicyLine>) -> Self {
		Self { lines }
	}

	pub fn lines(&self) -> &[PolicyLine] {
		&self.lines
	}

	fn position(&self, key: &str, rule: &[String]) -> Option<usize> {
		self.lines
			.iter()
			.position(|line| line.key == key && line.rule == rule)
	}
}

impl PolicyLoader for MemoryAdapter {
	fn load_policy(&mut self) -> Result<Vec<PolicyLine>> {
		Ok(self.lines.clone())
	}
}

impl PolicyPersister for MemoryAdapter {
	fn save_policy(&mut self, lines: &[PolicyLine]) -> Result<()> {
		self.lines = lines.to_vec();
		Ok(())
	}

	fn add_policy(&mut self, key: &str, rule: &[String]) -> Result<()> {
		self.lines.push(PolicyLine::new(key, rule.to_vec()));
		Ok(())
	}

	fn add_policies(&mut self, key: &str, rules: &[Vec<String>]) -> Result<()> {
		self.lines
			.extend(rules.iter().map(|rule| PolicyLine::new(key, rule.clone())));
		Ok(())
	}

	fn remove_policy(&mut self, key: &str, rule: &[String]) -> Result<()> {
		if let Some(pos) = self.position(key, rule) {
			self.lines.remove(pos);
		}
		Ok(())
	}

	fn remove_filtered_policy(&mut self, key: &str, field_index: usize, values: &[String]) -> Result<()> {
		self.lines
			.retain(|line| !line.matches_filter(key, field_index, values));
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rule(fields: &[&str]) -> Vec<String> {
		fields.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn add_and_remove() {
		let mut adapter = MemoryAdapter::default();
		adapter.add_policy("p", &rule(&["alice", "data1", "read"])).unwrap();
		adapter
			.add_policies("p", &[rule(&["bob", "data2", "write"]), rule(&["carol", "data2", "read"])])
			.unwrap();
		assert_eq!(adapter.load_policy().unwrap().len(), 3);

		adapter.remove_policy("p", &rule(&["bob", "data2", "write"])).unwrap();
		adapter
			.remove_filtered_policy("p", 1, &rule(&["data2"]))
			.unwrap();
		assert_eq!(adapter.lines(), [PolicyLine::new("p", rule(&["alice", "data1", "read"]))]);
	}

	#[test]
	fn save_replaces_contents() {
		let mut adapter = MemoryAdapter::new(vec![PolicyLine::new("p", rule(&["a"]))]);
		adapter
			.save_policy(&[PolicyLine::new("g", rule(&["alice", "admin"]))])
			.unwrap();
		assert_eq!(adapter.lines().len(), 1);
		assert_eq!(adapter.lines()[0].key, "g");
	}
}
