// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::borrow::Cow;

use super::compile::{Node, Operand};
use super::functions::PatternCache;
use crate::error::{AuthzError, Result};
use crate::rbac::RoleManager;

/// Everything a compiled matcher reads while deciding one `(request, rule)` pair.
pub(crate) struct Frame<'a> {
	pub request: &'a [&'a str],
	pub rule: &'a [String],
	pub roles: &'a RoleManager,
	pub patterns: &'a PatternCache,
	pub wildcard: Option<&'a str>,
}

impl Frame<'_> {
	pub(crate) fn eval(&self, node: &Node) -> Result<bool> {
		match node {
			Node::Const(b) => Ok(*b),
			Node::Not(inner) => Ok(!self.eval(inner)?),
			Node::And(left, right) => Ok(self.eval(left)? && self.eval(right)?),
			Node::Or(left, right) => Ok(self.eval(left)? || self.eval(right)?),
			Node::StrEq { left, right, negate } => {
				let equal = self.is_wildcard(left)
					|| self.is_wildcard(right)
					|| self.value(left)? == self.value(right)?;
				Ok(equal != *negate)
			}
			Node::BoolEq { left, right, negate } => {
				Ok((self.eval(left)? == self.eval(right)?) != *negate)
			}
			Node::In { element, set } => {
				let element = self.value(element)?;
				for candidate in set {
					if self.value(candidate)? == element {
						return Ok(true);
					}
				}
				Ok(false)
			}
			Node::Role { key, args } => {
				let graph = self
					.roles
					.graph(key)
					.ok_or_else(|| AuthzError::RoleGraph(format!("no role graph for `{key}`")))?;
				let child = self.value(&args[0])?;
				let parent = self.value(&args[1])?;
				let domain = match args.get(2) {
					Some(domain) => Some(self.value(domain)?),
					None => None,
				};
				let domain = domain.as_deref().filter(|d| !d.is_empty());
				Ok(graph.has_link(&child, &parent, domain))
			}
			Node::Predicate { func, args } => {
				let values = self.values(args)?;
				let refs: Vec<&str> = values.iter().map(|v| v.as_ref()).collect();
				func(self.patterns, &refs)
			}
			Node::Custom { func, args } => {
				let left = self.value(&args[0])?;
				let right = self.value(&args[1])?;
				Ok(func(&left, &right))
			}
		}
	}

	fn value<'n>(&'n self, operand: &'n Operand) -> Result<Cow<'n, str>> {
		Ok(match operand {
			Operand::Literal(s) => Cow::Borrowed(s.as_str()),
			Operand::Request(i) => Cow::Borrowed(self.request[*i]),
			Operand::Policy(i) => Cow::Borrowed(self.rule[*i].as_str()),
			Operand::Extract { func, args } => {
				let values = self.values(args)?;
				let refs: Vec<&str> = values.iter().map(|v| v.as_ref()).collect();
				Cow::Owned(func(self.patterns, &refs)?)
			}
		})
	}

	fn values<'n>(&'n self, operands: &'n [Operand]) -> Result<Vec<Cow<'n, str>>> {
		operands.iter().map(|o| self.value(o)).collect()
	}

	/// A rule field holding the wildcard sentinel equals any value.
	fn is_wildcard(&self, operand: &Operand) -> bool {
		match (operand, self.wildcard) {
			(Operand::Policy(i), Some(wildcard)) => self.rule[*i] == wildcard,
			_ => false,
		}
	}
}
