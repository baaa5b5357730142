// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory policy storage.
//!
//! Rules are grouped by assertion key (`p`, `p2`, `g`, ...) and keep the order
//! they were loaded or added in. Evaluation order, and therefore the outcome
//! of priority effects, follows this order.

use std::collections::{BTreeMap, HashSet};

/// Rules for every policy and role assertion, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyStore {
	rules: BTreeMap<String, Vec<Vec<String>>>,
}

impl PolicyStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Rules stored under `key`, in insertion order.
	pub fn rules(&self, key: &str) -> &[Vec<String>] {
		self.rules.get(key).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Keys that currently hold at least one rule.
	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.rules
			.iter()
			.filter(|(_, rules)| !rules.is_empty())
			.map(|(key, _)| key.as_str())
	}

	pub fn len(&self, key: &str) -> usize {
		self.rules(key).len()
	}

	pub fn is_empty(&self) -> bool {
		self.rules.values().all(Vec::is_empty)
	}

	pub fn has_rule(&self, key: &str, rule: &[String]) -> bool {
		self.rules(key).iter().any(|r| r == rule)
	}

	/// Appends a rule. Returns `false` without storing anything when the exact
	/// rule is already present.
	pub fn add_rule(&mut self, key: &str, rule: Vec<String>) -> bool {
		if self.has_rule(key, &rule) {
			return false;
		}
		self.rules.entry(key.to_string()).or_default().push(rule);
		true
	}

	/// Appends all rules, or none of them if any is already present.
	pub fn add_rules(&mut self, key: &str, rules: Vec<Vec<String>>) -> bool {
		let conflict = {
			let mut seen = HashSet::new();
			rules
				.iter()
				.any(|rule| self.has_rule(key, rule) || !seen.insert(rule.as_slice()))
		};
		if conflict {
			return false;
		}
		self.rules.entry(key.to_string()).or_default().extend(rules);
		true
	}

	/// Appends rules exactly as an adapter produced them, duplicates included.
	pub fn extend_unchecked(&mut self, key: &str, rules: impl IntoIterator<Item = Vec<String>>) {
		self.rules.entry(key.to_string()).or_default().extend(rules);
	}

	pub fn remove_rule(&mut self, key: &str, rule: &[String]) -> bool {
		let Some(rules) = self.rules.get_mut(key) else {
			return false;
		};
		match rules.iter().position(|r| r == rule) {
			Some(pos) => {
				rules.remove(pos);
				true
			}
			None => false,
		}
	}

	/// Removes all rules, or none of them if any is missing.
	pub fn remove_rules(&mut self, key: &str, rules: &[Vec<String>]) -> bool {
		if rules.is_empty() || !rules.iter().all(|rule| self.has_rule(key, rule)) {
			return false;
		}
		for rule in rules {
			self.remove_rule(key, rule);
		}
		true
	}

	/// Rules whose fields starting at `field_index` equal `values`. An empty
	/// string in `values` matches any field value.
	pub fn filtered(&self, key: &str, field_index: usize, values: &[String]) -> Vec<Vec<String>> {
		self.rules(key)
			.iter()
			.filter(|rule| matches_filter(rule, field_index, values))
			.cloned()
			.collect()
	}

	/// Removes the rules [`PolicyStore::filtered`] would return and hands them
	/// back. An all-empty filter removes nothing.
	pub fn remove_filtered(
		&mut self,
		key: &str,
		field_index: usize,
		values: &[String],
	) -> Vec<Vec<String>> {
		if values.iter().all(String::is_empty) {
			return Vec::new();
		}
		let Some(rules) = self.rules.get_mut(key) else {
			return Vec::new();
		};
		let mut removed = Vec::new();
		rules.retain(|rule| {
			if matches_filter(rule, field_index, values) {
				removed.push(rule.clone());
				false
			} else {
				true
			}
		});
		removed
	}

	/// Distinct values of one field, in first-seen order.
	pub fn values_for_field(&self, key: &str, field_index: usize) -> Vec<String> {
		let mut seen = HashSet::new();
		self.rules(key)
			.iter()
			.filter_map(|rule| rule.get(field_index))
			.filter(|value| seen.insert(value.as_str()))
			.cloned()
			.collect()
	}

	pub fn clear(&mut self) {
		self.rules.clear();
	}

	/// Every `(key, rule)` pair, grouped by key.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
		self.rules
			.iter()
			.flat_map(|(key, rules)| rules.iter().map(move |rule| (key.as_str(), rule.as_slice())))
	}
}

/// Whether the fields of `rule` from `field_index` on equal `values`, where an
/// empty value matches anything.
pub(crate) fn matches_filter(rule: &[String], field_index: usize, values: &[String]) -> bool {
	values.iter().enumerate().all(|(i, value)| {
		value.is_empty()
			|| rule
				.get(field_index + i)
				.is_some_and(|field| field == value)
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rule(fields: &[&str]) -> Vec<String> {
		fields.iter().map(|s| s.to_string()).collect()
	}

	fn sample_store() -> PolicyStore {
		let mut store = PolicyStore::new();
		store.add_rule("p", rule(&["alice", "data1", "read"]));
		store.add_rule("p", rule(&["bob", "data2", "write"]));
		store.add_rule("p", rule(&["alice", "data2", "read"]));
		store.add_rule("g", rule(&["alice", "admin"]));
		store
	}

	#[test]
	fn preserves_insertion_order() {
		let store = sample_store();
		let subjects: Vec<&str> = store.rules("p").iter().map(|r| r[0].as_str()).collect();
		assert_eq!(subjects, ["alice", "bob", "alice"]);
	}

	#[test]
	fn add_rule_rejects_duplicates() {
		let mut store = sample_store();
		assert!(!store.add_rule("p", rule(&["alice", "data1", "read"])));
		assert_eq!(store.len("p"), 3);
	}

	#[test]
	fn add_rules_is_all_or_nothing() {
		let mut store = sample_store();
		assert!(!store.add_rules(
			"p",
			vec![rule(&["carol", "data3", "read"]), rule(&["bob", "data2", "write"])]
		));
		assert_eq!(store.len("p"), 3);

		assert!(!store.add_rules(
			"p",
			vec![rule(&["carol", "data3", "read"]), rule(&["carol", "data3", "read"])]
		));

		assert!(store.add_rules(
			"p",
			vec![rule(&["carol", "data3", "read"]), rule(&["dave", "data3", "read"])]
		));
		assert_eq!(store.len("p"), 5);
	}

	#[test]
	fn remove_rule_reports_presence() {
		let mut store = sample_store();
		assert!(store.remove_rule("p", &rule(&["bob", "data2", "write"])));
		assert!(!store.remove_rule("p", &rule(&["bob", "data2", "write"])));
		assert!(!store.remove_rule("p9", &rule(&["bob"])));
		assert_eq!(store.len("p"), 2);
	}

	#[test]
	fn remove_rules_is_all_or_nothing() {
		let mut store = sample_store();
		assert!(!store.remove_rules(
			"p",
			&[rule(&["alice", "data1", "read"]), rule(&["nobody", "x", "y"])]
		));
		assert_eq!(store.len("p"), 3);
		assert!(store.remove_rules(
			"p",
			&[rule(&["alice", "data1", "read"]), rule(&["alice", "data2", "read"])]
		));
		assert_eq!(store.len("p"), 1);
	}

	#[test]
	fn filtered_treats_empty_as_wildcard() {
		let store = sample_store();
		let alice = store.filtered("p", 0, &rule(&["alice"]));
		assert_eq!(alice.len(), 2);

		let reads = store.filtered("p", 1, &rule(&["", "read"]));
		assert_eq!(reads.len(), 2);

		assert!(store.filtered("p", 5, &rule(&["x"])).is_empty());
	}

	#[test]
	fn remove_filtered_returns_removed_rules() {
		let mut store = sample_store();
		let removed = store.remove_filtered("p", 0, &rule(&["alice"]));
		assert_eq!(removed.len(), 2);
		assert_eq!(store.rules("p"), [rule(&["bob", "data2", "write"])]);

		assert!(store.remove_filtered("p", 0, &rule(&[""])).is_empty());
	}

	#[test]
	fn values_for_field_are_distinct() {
		let store = sample_store();
		assert_eq!(store.values_for_field("p", 0), ["alice", "bob"]);
		assert_eq!(store.values_for_field("p", 2), ["read", "write"]);
	}

	#[test]
	fn extend_unchecked_keeps_duplicates() {
		let mut store = PolicyStore::new();
		store.extend_unchecked("p", vec![rule(&["a"]), rule(&["a"])]);
		assert_eq!(store.len("p"), 2);
	}

	#[test]
	fn iter_and_keys() {
		let store = sample_store();
		assert_eq!(store.iter().count(), 4);
		assert_eq!(store.keys().collect::<Vec<_>>(), ["g", "p"]);
		assert!(!store.is_empty());
	}
}
