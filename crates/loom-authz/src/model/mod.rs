// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access-control model.
//!
//! A model declares the shape of requests (`r`), policy rules (`p`), role
//! links (`g`), how matched rules combine (`e`), and the matcher expression
//! (`m`). Each section may define several assertions distinguished by a
//! numeric suffix (`p2`, `g2`, ...).
//!
//! ```text
//! [request_definition]
//! r = sub, obj, act
//!
//! [policy_definition]
//! p = sub, obj, act, eft
//!
//! [role_definition]
//! g = _, _
//!
//! [policy_effect]
//! e = some(where (p.eft == allow)) && !some(where (p.eft == deny))
//!
//! [matchers]
//! m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
//! ```
//!
//! The model is immutable once parsed and never holds policy data.

pub mod conf;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::{AuthzError, Result};
use conf::{ConfEntry, ConfFile};

/// Token name carrying a rule's effect.
pub const EFFECT_TOKEN: &str = "eft";
/// Token name carrying a rule's evaluation priority.
pub const PRIORITY_TOKEN: &str = "priority";

/// The five model sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
	Request,
	Policy,
	Role,
	Effect,
	Matcher,
}

impl Section {
	pub const ALL: [Section; 5] = [
		Section::Request,
		Section::Policy,
		Section::Role,
		Section::Effect,
		Section::Matcher,
	];

	pub fn name(self) -> &'static str {
		match self {
			Section::Request => "request_definition",
			Section::Policy => "policy_definition",
			Section::Role => "role_definition",
			Section::Effect => "policy_effect",
			Section::Matcher => "matchers",
		}
	}

	/// The letter every assertion key in this section starts with.
	pub fn prefix(self) -> char {
		match self {
			Section::Request => 'r',
			Section::Policy => 'p',
			Section::Role => 'g',
			Section::Effect => 'e',
			Section::Matcher => 'm',
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|s| s.name() == name)
	}

	/// Section owning a key such as `p2` or `g`.
	pub fn of_key(key: &str) -> Option<Self> {
		let prefix = key.chars().next()?;
		let suffix = &key[prefix.len_utf8()..];
		if !suffix.chars().all(|c| c.is_ascii_digit()) {
			return None;
		}
		Self::ALL.into_iter().find(|s| s.prefix() == prefix)
	}

	fn is_mandatory(self) -> bool {
		!matches!(self, Section::Role)
	}
}

impl fmt::Display for Section {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// One named definition inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
	key: String,
	section: Section,
	tokens: Vec<String>,
	value: String,
}

impl Assertion {
	pub fn key(&self) -> &str {
		&self.key
	}

	pub fn section(&self) -> Section {
		self.section
	}

	/// Field names for request/policy definitions, `_` placeholders for role
	/// definitions, empty for effects and matchers.
	pub fn tokens(&self) -> &[String] {
		&self.tokens
	}

	pub fn value(&self) -> &str {
		&self.value
	}

	pub fn arity(&self) -> usize {
		self.tokens.len()
	}

	pub fn token_index(&self, name: &str) -> Option<usize> {
		self.tokens.iter().position(|t| t == name)
	}

	/// Key suffix: `""` for `p`, `"2"` for `p2`.
	pub fn suffix(&self) -> &str {
		&self.key[1..]
	}

	/// Whether a role definition carries a domain placeholder.
	pub fn has_domain(&self) -> bool {
		self.section == Section::Role && self.tokens.len() == 3
	}

	/// Fails unless `fields` has exactly this assertion's arity.
	pub fn check_arity(&self, fields: usize) -> Result<()> {
		if fields != self.tokens.len() {
			return Err(AuthzError::arity(&self.key, self.tokens.len(), fields));
		}
		Ok(())
	}

	fn from_entry(section: Section, entry: &ConfEntry) -> Result<Self> {
		let key = entry.key.as_str();
		if Section::of_key(key) != Some(section) {
			return Err(AuthzError::parse(
				entry.line,
				format!(
					"key `{key}` is not valid in [{section}] (expected `{}` with an optional number)",
					section.prefix()
				),
			));
		}

		let value = entry.value.trim();
		if value.is_empty() {
			return Err(AuthzError::parse(entry.line, format!("`{key}` is empty")));
		}

		let tokens = match section {
			Section::Request | Section::Policy => parse_field_tokens(entry)?,
			Section::Role => parse_role_tokens(entry)?,
			Section::Effect | Section::Matcher => Vec::new(),
		};

		Ok(Self {
			key: key.to_string(),
			section,
			tokens,
			value: value.to_string(),
		})
	}
}

fn parse_field_tokens(entry: &ConfEntry) -> Result<Vec<String>> {
	let mut tokens: Vec<String> = Vec::new();
	for raw in entry.value.split(',') {
		let token = raw.trim();
		if token.is_empty() {
			return Err(AuthzError::parse(
				entry.line,
				format!("`{}` has an empty field name", entry.key),
			));
		}
		if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
			return Err(AuthzError::parse(
				entry.line,
				format!("`{}` has an invalid field name `{token}`", entry.key),
			));
		}
		if tokens.iter().any(|t| t == token) {
			return Err(AuthzError::parse(
				entry.line,
				format!("`{}` declares field `{token}` twice", entry.key),
			));
		}
		tokens.push(token.to_string());
	}
	Ok(tokens)
}

fn parse_role_tokens(entry: &ConfEntry) -> Result<Vec<String>> {
	let tokens: Vec<String> = entry
		.value
		.split(',')
		.map(|t| t.trim().to_string())
		.collect();
	if tokens.iter().any(|t| t != "_") {
		return Err(AuthzError::parse(
			entry.line,
			format!("role definition `{}` must be a list of `_`", entry.key),
		));
	}
	if !(2..=3).contains(&tokens.len()) {
		return Err(AuthzError::parse(
			entry.line,
			format!(
				"role definition `{}` needs 2 or 3 placeholders, found {}",
				entry.key,
				tokens.len()
			),
		));
	}
	Ok(tokens)
}

/// A parsed access-control model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
	assertions: Vec<Assertion>,
}

impl Model {
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		debug!(path = %path.display(), "loading model file");
		let text = std::fs::read_to_string(path)?;
		text.parse()
	}

	/// Looks up an assertion by key, e.g. `"p"` or `"g2"`.
	pub fn get(&self, key: &str) -> Option<&Assertion> {
		self.assertions.iter().find(|a| a.key == key)
	}

	/// Like [`Model::get`] but fails with [`AuthzError::UnknownAssertion`].
	pub fn require(&self, key: &str) -> Result<&Assertion> {
		self.get(key)
			.ok_or_else(|| AuthzError::UnknownAssertion(key.to_string()))
	}

	/// Assertions of one section in definition order.
	pub fn section(&self, section: Section) -> impl Iterator<Item = &Assertion> {
		self.assertions.iter().filter(move |a| a.section == section)
	}

	/// Resolves `{prefix}{suffix}`, falling back to the unsuffixed key.
	pub fn resolve(&self, section: Section, suffix: &str) -> Result<&Assertion> {
		let key = format!("{}{suffix}", section.prefix());
		self.get(&key)
			.or_else(|| self.get(&section.prefix().to_string()))
			.ok_or(AuthzError::UnknownAssertion(key))
	}

	/// Whether `key` names a policy or role assertion that can hold rules.
	pub fn holds_rules(&self, key: &str) -> bool {
		self.get(key)
			.is_some_and(|a| matches!(a.section, Section::Policy | Section::Role))
	}

	fn insert(&mut self, assertion: Assertion, line: usize) -> Result<()> {
		if let Some(existing) = self.assertions.iter_mut().find(|a| a.key == assertion.key) {
			if existing.tokens.len() != assertion.tokens.len() {
				return Err(AuthzError::parse(
					line,
					format!(
						"`{}` redefined with {} fields, previously {}",
						assertion.key,
						assertion.tokens.len(),
						existing.tokens.len()
					),
				));
			}
			*existing = assertion;
			return Ok(());
		}
		self.assertions.push(assertion);
		Ok(())
	}
}

impl FromStr for Model {
	type Err = AuthzError;

	fn from_str(text: &str) -> Result<Self> {
		let conf = ConfFile::parse(text)?;
		let mut model = Model {
			assertions: Vec::new(),
		};

		for section in &conf.sections {
			let kind = Section::from_name(&section.name).ok_or_else(|| {
				AuthzError::parse(section.line, format!("unknown section [{}]", section.name))
			})?;
			for entry in &section.entries {
				model.insert(Assertion::from_entry(kind, entry)?, entry.line)?;
			}
		}

		for section in Section::ALL.into_iter().filter(|s| s.is_mandatory()) {
			let base = section.prefix().to_string();
			if model.get(&base).is_none() {
				return Err(AuthzError::model(format!(
					"missing `{base}` in [{section}]"
				)));
			}
		}

		debug!(
			assertions = model.assertions.len(),
			roles = model.section(Section::Role).count(),
			"parsed model"
		);
		Ok(model)
	}
}
