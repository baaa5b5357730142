// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role graphs for every role definition of a model.

mod graph;

pub use graph::RoleGraph;

use std::collections::HashMap;

use crate::error::Result;
use crate::model::{Assertion, Model, Section};
use crate::policy::PolicyStore;

/// One role graph per role definition key (`g`, `g2`, ...).
#[derive(Debug, Clone, Default)]
pub struct RoleManager {
	graphs: HashMap<String, RoleGraph>,
	max_depth: Option<usize>,
}

impl RoleManager {
	/// Creates an empty graph for each role definition in `model`.
	pub fn new(model: &Model, max_depth: Option<usize>) -> Self {
		let graphs = model
			.section(Section::Role)
			.map(|a| (a.key().to_string(), RoleGraph::new(max_depth)))
			.collect();
		Self { graphs, max_depth }
	}

	/// Builds graphs from the role rules held in `store`.
	pub fn build(model: &Model, store: &PolicyStore, max_depth: Option<usize>) -> Result<Self> {
		let mut manager = Self::new(model, max_depth);
		for assertion in model.section(Section::Role) {
			for rule in store.rules(assertion.key()) {
				manager.add_link(assertion, rule)?;
			}
		}
		Ok(manager)
	}

	pub fn graph(&self, key: &str) -> Option<&RoleGraph> {
		self.graphs.get(key)
	}

	pub fn max_depth(&self) -> Option<usize> {
		self.max_depth
	}

	/// Adds the link described by a role rule.
	pub fn add_link(&mut self, assertion: &Assertion, rule: &[String]) -> Result<bool> {
		let link = RoleLink::from_rule(assertion, rule)?;
		let max_depth = self.max_depth;
		let graph = self
			.graphs
			.entry(assertion.key().to_string())
			.or_insert_with(|| RoleGraph::new(max_depth));
		Ok(graph.add_link(link.child, link.parent, link.domain))
	}

	/// Removes the link described by a role rule.
	pub fn remove_link(&mut self, assertion: &Assertion, rule: &[String]) -> Result<bool> {
		let link = RoleLink::from_rule(assertion, rule)?;
		Ok(self
			.graphs
			.get_mut(assertion.key())
			.is_some_and(|graph| graph.remove_link(link.child, link.parent, link.domain)))
	}
}

/// A role rule viewed as an edge.
struct RoleLink<'a> {
	child: &'a str,
	parent: &'a str,
	domain: Option<&'a str>,
}

impl<'a> RoleLink<'a> {
	/// An empty domain field is treated as a global link.
	fn from_rule(assertion: &Assertion, rule: &'a [String]) -> Result<Self> {
		assertion.check_arity(rule.len())?;
		Ok(Self {
			child: &rule[0],
			parent: &rule[1],
			domain: rule.get(2).map(String::as_str).filter(|d| !d.is_empty()),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::AuthzError;

	const MODEL: &str = r#"
[request_definition]
r = sub, dom, obj, act

[policy_definition]
p = sub, dom, obj, act

[role_definition]
g = _, _, _
g2 = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub, r.dom) && r.obj == p.obj && r.act == p.act
"#;

	fn rule(fields: &[&str]) -> Vec<String> {
		fields.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn builds_one_graph_per_definition() {
		let model: Model = MODEL.parse().unwrap();
		let mut store = PolicyStore::new();
		store.add_rule("g", rule(&["alice", "admin", "tenant1"]));
		store.add_rule("g2", rule(&["data1", "data_group"]));

		let roles = RoleManager::build(&model, &store, None).unwrap();
		let g = roles.graph("g").unwrap();
		assert!(g.has_link("alice", "admin", Some("tenant1")));
		assert!(!g.has_link("alice", "admin", Some("tenant2")));

		let g2 = roles.graph("g2").unwrap();
		assert!(g2.has_link("data1", "data_group", None));
		assert!(!g2.has_link("alice", "admin", None));
	}

	#[test]
	fn rule_arity_must_match_definition() {
		let model: Model = MODEL.parse().unwrap();
		let mut store = PolicyStore::new();
		store.add_rule("g", rule(&["alice", "admin"]));
		let err = RoleManager::build(&model, &store, None).unwrap_err();
		assert!(matches!(err, AuthzError::ArityMismatch { .. }));
	}

	#[test]
	fn empty_domain_is_global() {
		let model: Model = MODEL.parse().unwrap();
		let mut roles = RoleManager::new(&model, None);
		let g = model.get("g").unwrap();
		roles.add_link(g, &rule(&["alice", "admin", ""])).unwrap();
		assert!(roles.graph("g").unwrap().has_link("alice", "admin", Some("any")));
		assert!(roles.remove_link(g, &rule(&["alice", "admin", ""])).unwrap());
		assert_eq!(roles.graph("g").unwrap().link_count(), 0);
	}
}
