// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy and grouping management on [`Enforcer`].
//!
//! The unnamed calls operate on `p` and `g`; the `named` variants take the
//! assertion key. Mutations return whether the stored policy changed.

use crate::enforcer::Enforcer;
use crate::error::Result;
use crate::model::Section;

pub(crate) fn owned<S: AsRef<str>>(fields: &[S]) -> Vec<String> {
	fields.iter().map(|f| f.as_ref().to_string()).collect()
}

fn owned_all<S: AsRef<str>>(rules: &[Vec<S>]) -> Vec<Vec<String>> {
	rules.iter().map(|r| owned(r)).collect()
}

impl Enforcer {
	pub fn add_policy<S: AsRef<str>>(&self, rule: &[S]) -> Result<bool> {
		self.add_named_policy("p", rule)
	}

	pub fn add_named_policy<S: AsRef<str>>(&self, key: &str, rule: &[S]) -> Result<bool> {
		self.add_rules(Section::Policy, key, vec![owned(rule)])
	}

	/// Adds every rule or none. Returns `false` if any rule already exists.
	pub fn add_policies<S: AsRef<str>>(&self, rules: &[Vec<S>]) -> Result<bool> {
		self.add_named_policies("p", rules)
	}

	pub fn add_named_policies<S: AsRef<str>>(&self, key: &str, rules: &[Vec<S>]) -> Result<bool> {
		self.add_rules(Section::Policy, key, owned_all(rules))
	}

	pub fn remove_policy<S: AsRef<str>>(&self, rule: &[S]) -> Result<bool> {
		self.remove_named_policy("p", rule)
	}

	pub fn remove_named_policy<S: AsRef<str>>(&self, key: &str, rule: &[S]) -> Result<bool> {
		self.remove_rules(Section::Policy, key, vec![owned(rule)])
	}

	/// Removes every rule or none. Returns `false` if any rule is missing.
	pub fn remove_policies<S: AsRef<str>>(&self, rules: &[Vec<S>]) -> Result<bool> {
		self.remove_named_policies("p", rules)
	}

	pub fn remove_named_policies<S: AsRef<str>>(&self, key: &str, rules: &[Vec<S>]) -> Result<bool> {
		self.remove_rules(Section::Policy, key, owned_all(rules))
	}

	/// Removes the `p` rules whose fields from `field_index` on equal
	/// `values`. An empty value matches any field.
	pub fn remove_filtered_policy<S: AsRef<str>>(&self, field_index: usize, values: &[S]) -> Result<bool> {
		self.remove_filtered_named_policy("p", field_index, values)
	}

	pub fn remove_filtered_named_policy<S: AsRef<str>>(
		&self,
		key: &str,
		field_index: usize,
		values: &[S],
	) -> Result<bool> {
		self.remove_filtered(Section::Policy, key, field_index, owned(values))
	}

	pub fn get_policy(&self) -> Vec<Vec<String>> {
		self.get_named_policy("p")
	}

	pub fn get_named_policy(&self, key: &str) -> Vec<Vec<String>> {
		self.view(|s| s.policy.store.rules(key).to_vec())
	}

	pub fn get_filtered_policy<S: AsRef<str>>(&self, field_index: usize, values: &[S]) -> Vec<Vec<String>> {
		self.get_filtered_named_policy("p", field_index, values)
	}

	pub fn get_filtered_named_policy<S: AsRef<str>>(
		&self,
		key: &str,
		field_index: usize,
		values: &[S],
	) -> Vec<Vec<String>> {
		let values = owned(values);
		self.view(|s| s.policy.store.filtered(key, field_index, &values))
	}

	pub fn has_policy<S: AsRef<str>>(&self, rule: &[S]) -> bool {
		self.has_named_policy("p", rule)
	}

	pub fn has_named_policy<S: AsRef<str>>(&self, key: &str, rule: &[S]) -> bool {
		let rule = owned(rule);
		self.view(|s| s.policy.store.has_rule(key, &rule))
	}

	/// Distinct subjects (first field) of `p` rules.
	pub fn get_all_subjects(&self) -> Vec<String> {
		self.values_for_field("p", 0)
	}

	pub fn get_all_named_subjects(&self, key: &str) -> Vec<String> {
		self.values_for_field(key, 0)
	}

	pub fn get_all_objects(&self) -> Vec<String> {
		self.values_for_field("p", 1)
	}

	pub fn get_all_named_objects(&self, key: &str) -> Vec<String> {
		self.values_for_field(key, 1)
	}

	pub fn get_all_actions(&self) -> Vec<String> {
		self.values_for_field("p", 2)
	}

	pub fn get_all_named_actions(&self, key: &str) -> Vec<String> {
		self.values_for_field(key, 2)
	}

	/// Distinct roles (second field) of `g` rules.
	pub fn get_all_roles(&self) -> Vec<String> {
		self.values_for_field("g", 1)
	}

	fn values_for_field(&self, key: &str, field_index: usize) -> Vec<String> {
		self.view(|s| s.policy.store.values_for_field(key, field_index))
	}

	pub fn add_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> Result<bool> {
		self.add_named_grouping_policy("g", rule)
	}

	pub fn add_named_grouping_policy<S: AsRef<str>>(&self, key: &str, rule: &[S]) -> Result<bool> {
		self.add_rules(Section::Role, key, vec![owned(rule)])
	}

	pub fn add_grouping_policies<S: AsRef<str>>(&self, rules: &[Vec<S>]) -> Result<bool> {
		self.add_rules(Section::Role, "g", owned_all(rules))
	}

	pub fn remove_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> Result<bool> {
		self.remove_named_grouping_policy("g", rule)
	}

	pub fn remove_named_grouping_policy<S: AsRef<str>>(&self, key: &str, rule: &[S]) -> Result<bool> {
		self.remove_rules(Section::Role, key, vec![owned(rule)])
	}

	pub fn remove_grouping_policies<S: AsRef<str>>(&self, rules: &[Vec<S>]) -> Result<bool> {
		self.remove_rules(Section::Role, "g", owned_all(rules))
	}

	pub fn remove_filtered_grouping_policy<S: AsRef<str>>(&self, field_index: usize, values: &[S]) -> Result<bool> {
		self.remove_filtered_named_grouping_policy("g", field_index, values)
	}

	pub fn remove_filtered_named_grouping_policy<S: AsRef<str>>(
		&self,
		key: &str,
		field_index: usize,
		values: &[S],
	) -> Result<bool> {
		self.remove_filtered(Section::Role, key, field_index, owned(values))
	}

	pub fn get_grouping_policy(&self) -> Vec<Vec<String>> {
		self.get_named_grouping_policy("g")
	}

	pub fn get_named_grouping_policy(&self, key: &str) -> Vec<Vec<String>> {
		self.get_named_policy(key)
	}

	pub fn get_filtered_grouping_policy<S: AsRef<str>>(&self, field_index: usize, values: &[S]) -> Vec<Vec<String>> {
		self.get_filtered_named_policy("g", field_index, values)
	}

	pub fn has_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> bool {
		self.has_named_policy("g", rule)
	}

	pub fn has_named_grouping_policy<S: AsRef<str>>(&self, key: &str, rule: &[S]) -> bool {
		self.has_named_policy(key, rule)
	}
}
