// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Matcher expressions.
//!
//! A matcher is parsed and type checked once per model and then evaluated
//! against every candidate rule of a request:
//!
//! ```text
//! m = g(r.sub, p.sub) && keyMatch2(r.obj, p.obj) && r.act in ('GET', p.act)
//! ```
//!
//! `m2` binds to `r2`/`p2` when the model defines them and to `r`/`p`
//! otherwise.

mod compile;
mod eval;
pub mod functions;
mod lexer;
mod parser;

use std::collections::HashMap;

use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::model::{Model, Section};
use crate::rbac::RoleManager;
use compile::{Bindings, Node};
use eval::Frame;
use functions::PatternCache;

/// A host-supplied boolean function of two strings, callable from matchers.
pub type CustomFn = fn(&str, &str) -> bool;

/// Host-registered matcher functions by name. A registered name shadows a
/// builtin of the same name; role definitions shadow both.
#[derive(Debug, Clone, Default)]
pub struct FunctionMap {
	functions: HashMap<String, CustomFn>,
}

impl FunctionMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `func` under `name`, replacing any earlier registration.
	pub fn add(&mut self, name: &str, func: CustomFn) -> Result<()> {
		let mut chars = name.chars();
		let valid = chars
			.next()
			.is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
			&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
		if !valid {
			return Err(AuthzError::Compile(format!("invalid function name `{name}`")));
		}
		self.functions.insert(name.to_string(), func);
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<CustomFn> {
		self.functions.get(name).copied()
	}

	pub fn len(&self) -> usize {
		self.functions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.functions.is_empty()
	}
}

/// Compile-time options for matchers.
#[derive(Debug, Clone)]
pub struct MatcherOptions {
	/// Rule value that equals any request value in `==`. `None` disables it.
	pub wildcard: Option<String>,
	pub functions: FunctionMap,
}

impl Default for MatcherOptions {
	fn default() -> Self {
		Self {
			wildcard: Some("*".to_string()),
			functions: FunctionMap::default(),
		}
	}
}

/// A matcher ready for evaluation.
#[derive(Debug)]
pub struct CompiledMatcher {
	key: String,
	request_key: String,
	request_arity: usize,
	policy_key: String,
	policy_arity: usize,
	root: Node,
	wildcard: Option<String>,
	patterns: PatternCache,
}

impl CompiledMatcher {
	pub fn compile(model: &Model, matcher_key: &str, options: &MatcherOptions) -> Result<Self> {
		let matcher = model.require(matcher_key)?;
		let suffix = matcher.suffix();
		let request = model.resolve(Section::Request, suffix)?;
		let policy = model.resolve(Section::Policy, suffix)?;

		let expr = parser::parse(matcher.value())?;
		let root = Bindings {
			model,
			request,
			policy,
			functions: &options.functions,
		}
		.compile(&expr)?;

		debug!(
			matcher = matcher_key,
			request = request.key(),
			policy = policy.key(),
			"compiled matcher"
		);
		Ok(Self {
			key: matcher_key.to_string(),
			request_key: request.key().to_string(),
			request_arity: request.arity(),
			policy_key: policy.key().to_string(),
			policy_arity: policy.arity(),
			root,
			wildcard: options.wildcard.clone().filter(|w| !w.is_empty()),
			patterns: PatternCache::new(),
		})
	}

	pub fn key(&self) -> &str {
		&self.key
	}

	/// Request assertion this matcher reads `r.*` fields from.
	pub fn request_key(&self) -> &str {
		&self.request_key
	}

	/// Policy assertion whose rules this matcher is evaluated against.
	pub fn policy_key(&self) -> &str {
		&self.policy_key
	}

	/// Evaluates the matcher for one request and one rule. Either one having
	/// too few fields for the matcher is an arity error.
	pub fn evaluate(&self, request: &[&str], rule: &[String], roles: &RoleManager) -> Result<bool> {
		if request.len() < self.request_arity {
			return Err(AuthzError::arity(&self.request_key, self.request_arity, request.len()));
		}
		if rule.len() < self.policy_arity {
			return Err(AuthzError::arity(&self.policy_key, self.policy_arity, rule.len()));
		}
		Frame {
			request,
			rule,
			roles,
			patterns: &self.patterns,
			wildcard: self.wildcard.as_deref(),
		}
		.eval(&self.root)
	}
}
