// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Directed role graph for a single role definition.
//!
//! Entity names are interned into an arena and edges are stored as index
//! adjacency lists, partitioned by domain. Edges without a domain are global
//! and are followed by every query; domain edges are only followed by queries
//! for that domain.
//!
//! All traversals are breadth-first with a visited set, so cyclic and
//! diamond-shaped hierarchies terminate and never report an entity twice.

use std::collections::{HashMap, HashSet, VecDeque};

type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
	/// child -> parent
	Up,
	/// parent -> child
	Down,
}

#[derive(Debug, Clone, Default)]
struct Scope {
	parents: HashMap<NodeId, Vec<NodeId>>,
	children: HashMap<NodeId, Vec<NodeId>>,
}

impl Scope {
	fn edges(&self, node: NodeId, direction: Direction) -> &[NodeId] {
		let map = match direction {
			Direction::Up => &self.parents,
			Direction::Down => &self.children,
		};
		map.get(&node).map(Vec::as_slice).unwrap_or(&[])
	}

	fn insert(&mut self, child: NodeId, parent: NodeId) -> bool {
		let parents = self.parents.entry(child).or_default();
		if parents.contains(&parent) {
			return false;
		}
		parents.push(parent);
		self.children.entry(parent).or_default().push(child);
		true
	}

	fn remove(&mut self, child: NodeId, parent: NodeId) -> bool {
		let removed = remove_edge(&mut self.parents, child, parent);
		if removed {
			remove_edge(&mut self.children, parent, child);
		}
		removed
	}
}

fn remove_edge(map: &mut HashMap<NodeId, Vec<NodeId>>, from: NodeId, to: NodeId) -> bool {
	let Some(targets) = map.get_mut(&from) else {
		return false;
	};
	let Some(pos) = targets.iter().position(|&t| t == to) else {
		return false;
	};
	targets.remove(pos);
	if targets.is_empty() {
		map.remove(&from);
	}
	true
}

/// Role hierarchy for one role definition (`g`, `g2`, ...).
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
	names: Vec<String>,
	ids: HashMap<String, NodeId>,
	global: Scope,
	domains: HashMap<String, Scope>,
	max_depth: Option<usize>,
	links: usize,
}

impl RoleGraph {
	/// Creates an empty graph. `max_depth` bounds how many links a query
	/// follows; `None` means unbounded.
	pub fn new(max_depth: Option<usize>) -> Self {
		Self {
			max_depth,
			..Self::default()
		}
	}

	/// Number of distinct links across all domains.
	pub fn link_count(&self) -> usize {
		self.links
	}

	/// Adds `child -> parent`. Returns `false` if the link already existed.
	pub fn add_link(&mut self, child: &str, parent: &str, domain: Option<&str>) -> bool {
		let child = self.intern(child);
		let parent = self.intern(parent);
		let scope = match domain {
			None => &mut self.global,
			Some(domain) => self.domains.entry(domain.to_string()).or_default(),
		};
		let added = scope.insert(child, parent);
		if added {
			self.links += 1;
		}
		added
	}

	/// Removes `child -> parent`. Returns `false` if there was no such link.
	pub fn remove_link(&mut self, child: &str, parent: &str, domain: Option<&str>) -> bool {
		let (Some(&child), Some(&parent)) = (self.ids.get(child), self.ids.get(parent)) else {
			return false;
		};
		let scope = match domain {
			None => Some(&mut self.global),
			Some(domain) => self.domains.get_mut(domain),
		};
		let removed = scope.is_some_and(|scope| scope.remove(child, parent));
		if removed {
			self.links -= 1;
		}
		removed
	}

	/// Whether `parent` is reachable from `child` in zero or more steps.
	///
	/// Every entity has itself, whether or not it appears in the graph.
	pub fn has_link(&self, child: &str, parent: &str, domain: Option<&str>) -> bool {
		if child == parent {
			return true;
		}
		let (Some(&start), Some(&target)) = (self.ids.get(child), self.ids.get(parent)) else {
			return false;
		};
		let mut found = false;
		self.walk(start, domain, Direction::Up, |node| {
			found = node == target;
			found
		});
		found
	}

	/// All direct and inherited roles of `entity`, nearest first.
	///
	/// The entity itself is only included when a cycle leads back to it.
	pub fn roles(&self, entity: &str, domain: Option<&str>) -> Vec<String> {
		self.collect(entity, domain, Direction::Up)
	}

	/// All entities that hold `role` directly or through inheritance.
	pub fn users(&self, role: &str, domain: Option<&str>) -> Vec<String> {
		self.collect(role, domain, Direction::Down)
	}

	/// Roles linked to `entity` by a single edge.
	pub fn direct_roles(&self, entity: &str, domain: Option<&str>) -> Vec<String> {
		self.neighbours(entity, domain, Direction::Up)
	}

	/// Entities linked to `role` by a single edge.
	pub fn direct_users(&self, role: &str, domain: Option<&str>) -> Vec<String> {
		self.neighbours(role, domain, Direction::Down)
	}

	pub fn clear(&mut self) {
		let max_depth = self.max_depth;
		*self = Self::new(max_depth);
	}

	fn intern(&mut self, name: &str) -> NodeId {
		if let Some(&id) = self.ids.get(name) {
			return id;
		}
		let id = self.names.len();
		self.names.push(name.to_string());
		self.ids.insert(name.to_string(), id);
		id
	}

	fn scopes<'a>(&'a self, domain: Option<&str>) -> impl Iterator<Item = &'a Scope> + 'a {
		let tenant = domain.and_then(|d| self.domains.get(d));
		std::iter::once(&self.global).chain(tenant)
	}

	fn collect(&self, name: &str, domain: Option<&str>, direction: Direction) -> Vec<String> {
		let Some(&start) = self.ids.get(name) else {
			return Vec::new();
		};
		let mut found = Vec::new();
		self.walk(start, domain, direction, |node| {
			found.push(self.names[node].clone());
			false
		});
		found
	}

	fn neighbours(&self, name: &str, domain: Option<&str>, direction: Direction) -> Vec<String> {
		let Some(&node) = self.ids.get(name) else {
			return Vec::new();
		};
		let mut seen = HashSet::new();
		self.scopes(domain)
			.flat_map(|scope| scope.edges(node, direction).iter().copied())
			.filter(|&n| seen.insert(n))
			.map(|n| self.names[n].clone())
			.collect()
	}

	/// Breadth-first traversal from `start`. `visit` sees every newly reached
	/// node once and stops the walk by returning `true`.
	fn walk(
		&self,
		start: NodeId,
		domain: Option<&str>,
		direction: Direction,
		mut visit: impl FnMut(NodeId) -> bool,
	) {
		let mut seen: HashSet<NodeId> = HashSet::new();
		let mut queue: VecDeque<(NodeId, usize)> = VecDeque::from([(start, 0)]);

		while let Some((node, depth)) = queue.pop_front() {
			if self.max_depth.is_some_and(|max| depth >= max) {
				continue;
			}
			for scope in self.scopes(domain) {
				for &next in scope.edges(node, direction) {
					if !seen.insert(next) {
						continue;
					}
					if visit(next) {
						return;
					}
					queue.push_back((next, depth + 1));
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn sorted(mut v: Vec<String>) -> Vec<String> {
		v.sort();
		v
	}

	fn hierarchy() -> RoleGraph {
		let mut g = RoleGraph::new(None);
		g.add_link("u1", "g1", None);
		g.add_link("u2", "g1", None);
		g.add_link("u3", "g2", None);
		g.add_link("u4", "g2", None);
		g.add_link("u4", "g3", None);
		g.add_link("g1", "g3", None);
		g
	}

	#[test]
	fn transitive_reachability() {
		let g = hierarchy();
		assert!(g.has_link("u1", "g1", None));
		assert!(!g.has_link("u1", "g2", None));
		assert!(g.has_link("u1", "g3", None));
		assert!(!g.has_link("u3", "g1", None));
		assert!(g.has_link("u4", "g3", None));
		assert!(!g.has_link("g3", "u1", None));
	}

	#[test]
	fn reflexive_even_for_unknown_entities() {
		let g = hierarchy();
		assert!(g.has_link("u1", "u1", None));
		assert!(g.has_link("nobody", "nobody", Some("tenant")));
		assert!(!g.has_link("nobody", "g1", None));
	}

	#[test]
	fn add_link_is_idempotent() {
		let mut g = RoleGraph::new(None);
		assert!(g.add_link("alice", "admin", None));
		assert!(!g.add_link("alice", "admin", None));
		assert_eq!(g.link_count(), 1);
		assert_eq!(g.direct_roles("alice", None), ["admin"]);
	}

	#[test]
	fn remove_link_reports_presence() {
		let mut g = hierarchy();
		assert!(g.remove_link("g1", "g3", None));
		assert!(!g.remove_link("g1", "g3", None));
		assert!(!g.remove_link("ghost", "g3", None));
		assert!(!g.has_link("u1", "g3", None));
		assert!(g.has_link("u1", "g1", None));
		assert_eq!(g.link_count(), 5);
	}

	#[test]
	fn roles_and_users_are_transitive() {
		let g = hierarchy();
		assert_eq!(g.roles("u1", None), ["g1", "g3"]);
		assert_eq!(sorted(g.users("g3", None)), ["g1", "u1", "u2", "u4"]);
		assert_eq!(sorted(g.direct_users("g3", None)), ["g1", "u4"]);
		assert!(g.roles("unknown", None).is_empty());
	}

	#[test]
	fn cycles_terminate() {
		let mut g = RoleGraph::new(None);
		g.add_link("a", "b", None);
		g.add_link("b", "a", None);

		assert!(g.has_link("a", "b", None));
		assert!(g.has_link("b", "a", None));
		assert!(!g.has_link("a", "c", None));
		assert_eq!(sorted(g.roles("a", None)), ["a", "b"]);
		assert_eq!(sorted(g.users("a", None)), ["a", "b"]);
	}

	#[test]
	fn diamond_reports_each_role_once() {
		let mut g = RoleGraph::new(None);
		g.add_link("u", "left", None);
		g.add_link("u", "right", None);
		g.add_link("left", "top", None);
		g.add_link("right", "top", None);
		assert_eq!(g.roles("u", None), ["left", "right", "top"]);
	}

	#[test]
	fn global_links_are_visible_in_every_domain() {
		let mut g = RoleGraph::new(None);
		g.add_link("alice", "admin", Some("tenant1"));
		g.add_link("admin", "superuser", None);
		g.add_link("bob", "admin", Some("tenant2"));

		assert!(g.has_link("alice", "admin", Some("tenant1")));
		assert!(g.has_link("alice", "superuser", Some("tenant1")));
		assert!(!g.has_link("alice", "admin", Some("tenant2")));
		assert!(!g.has_link("alice", "admin", None));
		assert!(g.has_link("admin", "superuser", Some("anything")));

		assert_eq!(g.roles("alice", Some("tenant1")), ["admin", "superuser"]);
		assert_eq!(g.users("admin", Some("tenant2")), ["bob"]);
		assert!(g.roles("alice", Some("tenant2")).is_empty());
	}

	#[test]
	fn remove_link_respects_domain() {
		let mut g = RoleGraph::new(None);
		g.add_link("alice", "admin", Some("tenant1"));
		assert!(!g.remove_link("alice", "admin", None));
		assert!(!g.remove_link("alice", "admin", Some("tenant2")));
		assert!(g.remove_link("alice", "admin", Some("tenant1")));
		assert_eq!(g.link_count(), 0);
	}

	#[test]
	fn max_depth_bounds_traversal() {
		let mut g = RoleGraph::new(Some(1));
		g.add_link("a", "b", None);
		g.add_link("b", "c", None);
		assert!(g.has_link("a", "b", None));
		assert!(!g.has_link("a", "c", None));
		assert_eq!(g.roles("a", None), ["b"]);
	}

	#[test]
	fn clear_keeps_depth_limit() {
		let mut g = RoleGraph::new(Some(1));
		g.add_link("a", "b", None);
		g.add_link("b", "c", None);
		g.clear();
		assert_eq!(g.link_count(), 0);
		assert!(!g.has_link("a", "b", None));
		g.add_link("a", "b", None);
		g.add_link("b", "c", None);
		assert!(!g.has_link("a", "c", None));
	}

	proptest! {
		#[test]
		fn has_link_is_reflexive(name in "[a-z]{1,12}", edges in proptest::collection::vec(("[a-d]", "[a-d]"), 0..16)) {
			let mut g = RoleGraph::new(None);
			for (child, parent) in &edges {
				g.add_link(child, parent, None);
			}
			prop_assert!(g.has_link(&name, &name, None));
		}

		#[test]
		fn roles_are_finite_and_unique(edges in proptest::collection::vec(("[a-f]", "[a-f]"), 0..40)) {
			let mut g = RoleGraph::new(None);
			for (child, parent) in &edges {
				g.add_link(child, parent, None);
			}
			for start in ["a", "b", "c", "d", "e", "f"] {
				let roles = g.roles(start, None);
				let unique: HashSet<&String> = roles.iter().collect();
				prop_assert_eq!(unique.len(), roles.len());
				for role in &roles {
					prop_assert!(g.has_link(start, role, None));
				}
			}
		}
	}
}
