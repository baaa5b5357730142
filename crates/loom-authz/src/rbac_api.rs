// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role-based access control helpers over the `g` role definition and the `p`
//! policy definition.

use crate::enforcer::Enforcer;
use crate::error::Result;

impl Enforcer {
	/// The `g` rule for `child -> parent`. On a domain-scoped `g` a missing
	/// domain becomes the empty field, which links globally.
	fn link_rule<'a>(&self, child: &'a str, parent: &'a str, domain: Option<&'a str>) -> Vec<&'a str> {
		let scoped = self.view(|s| s.model.get("g").is_some_and(|g| g.has_domain()));
		let mut rule = vec![child, parent];
		match domain {
			Some(domain) => rule.push(domain),
			None if scoped => rule.push(""),
			None => {}
		}
		rule
	}

	/// Adds `child -> parent` to `g`, scoped to `domain` when given and global
	/// otherwise.
	pub fn add_role_link(&self, child: &str, parent: &str, domain: Option<&str>) -> Result<bool> {
		self.add_grouping_policy(&self.link_rule(child, parent, domain))
	}

	pub fn remove_role_link(&self, child: &str, parent: &str, domain: Option<&str>) -> Result<bool> {
		self.remove_grouping_policy(&self.link_rule(child, parent, domain))
	}

	/// Roles `name` holds directly or through other roles.
	pub fn get_roles_for_user(&self, name: &str, domain: Option<&str>) -> Vec<String> {
		self.view(|s| {
			s.policy
				.roles
				.graph("g")
				.map(|g| g.roles(name, domain))
				.unwrap_or_default()
		})
	}

	/// Roles linked to `name` by a single `g` rule.
	pub fn get_direct_roles_for_user(&self, name: &str, domain: Option<&str>) -> Vec<String> {
		self.view(|s| {
			s.policy
				.roles
				.graph("g")
				.map(|g| g.direct_roles(name, domain))
				.unwrap_or_default()
		})
	}

	/// Entities holding `role` directly or through other roles.
	pub fn get_users_for_role(&self, role: &str, domain: Option<&str>) -> Vec<String> {
		self.view(|s| {
			s.policy
				.roles
				.graph("g")
				.map(|g| g.users(role, domain))
				.unwrap_or_default()
		})
	}

	pub fn has_role_for_user(&self, name: &str, role: &str, domain: Option<&str>) -> bool {
		self.get_roles_for_user(name, domain).iter().any(|r| r == role)
	}

	pub fn add_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
		self.add_role_link(user, role, domain)
	}

	pub fn delete_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
		self.remove_role_link(user, role, domain)
	}

	/// Removes every `g` rule with `user` as the child.
	pub fn delete_roles_for_user(&self, user: &str, domain: Option<&str>) -> Result<bool> {
		match domain {
			Some(domain) => self.remove_filtered_grouping_policy(0, &[user, "", domain]),
			None => self.remove_filtered_grouping_policy(0, &[user]),
		}
	}

	/// Removes `user` from all role links.
	pub fn delete_user(&self, user: &str) -> Result<bool> {
		self.remove_filtered_grouping_policy(0, &[user])
	}

	/// Removes `role` from all role links and drops the rules granted to it.
	pub fn delete_role(&self, role: &str) -> Result<bool> {
		let unlinked = self.remove_filtered_grouping_policy(1, &[role])?;
		let revoked = self.remove_filtered_policy(0, &[role])?;
		Ok(unlinked || revoked)
	}

	/// Adds a `p` rule with `user` as its first field.
	pub fn add_permission_for_user(&self, user: &str, permission: &[&str]) -> Result<bool> {
		let mut rule = vec![user];
		rule.extend_from_slice(permission);
		self.add_policy(&rule)
	}

	pub fn delete_permission_for_user(&self, user: &str, permission: &[&str]) -> Result<bool> {
		let mut rule = vec![user];
		rule.extend_from_slice(permission);
		self.remove_policy(&rule)
	}

	/// Removes every `p` rule granted directly to `user`.
	pub fn delete_permissions_for_user(&self, user: &str) -> Result<bool> {
		self.remove_filtered_policy(0, &[user])
	}

	/// `p` rules granted directly to `user`. With a domain, the second field
	/// must equal it.
	pub fn get_permissions_for_user(&self, user: &str, domain: Option<&str>) -> Vec<Vec<String>> {
		match domain {
			Some(domain) => self.get_filtered_policy(0, &[user, domain]),
			None => self.get_filtered_policy(0, &[user]),
		}
	}

	pub fn has_permission_for_user(&self, user: &str, permission: &[&str]) -> bool {
		let mut rule = vec![user];
		rule.extend_from_slice(permission);
		self.has_policy(&rule)
	}

	/// `p` rules granted to `user` or to any role it reaches, the user's own
	/// rules first.
	pub fn get_implicit_permissions_for_user(&self, user: &str, domain: Option<&str>) -> Vec<Vec<String>> {
		self.view(|s| {
			let mut subjects = vec![user.to_string()];
			if let Some(graph) = s.policy.roles.graph("g") {
				subjects.extend(graph.roles(user, domain).into_iter().filter(|r| r != user));
			}
			subjects
				.iter()
				.flat_map(|subject| {
					let mut filter = vec![subject.clone()];
					filter.extend(domain.map(str::to_string));
					s.policy.store.filtered("p", 0, &filter)
				})
				.collect()
		})
	}
}
