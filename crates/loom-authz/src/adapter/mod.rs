// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy storage adapters.
//!
//! An adapter is the enforcer's only contact with persistent storage. Every
//! adapter can load rules ([`PolicyLoader`]); adapters that can also write
//! implement [`PolicyPersister`]. The enforcer holds either kind through the
//! [`Adapter`] enum and only calls write methods on the read/write variant.
//!
//! Rules travel as [`PolicyLine`]s, which have a CSV text form:
//!
//! ```text
//! p, alice, data1, read
//! g, alice, admin
//! p, bob, "/path, with comma", write
//! ```

mod file;
mod memory;
mod string;

pub use file::FileAdapter;
pub use memory::MemoryAdapter;
pub use string::{NullAdapter, StringAdapter};

use std::fmt;
use std::str::FromStr;

use crate::error::{AuthzError, Result};
use crate::policy;

/// One stored rule and the assertion key it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyLine {
	pub key: String,
	pub rule: Vec<String>,
}

impl PolicyLine {
	pub fn new(key: impl Into<String>, rule: Vec<String>) -> Self {
		Self {
			key: key.into(),
			rule,
		}
	}

	/// Parses CSV policy text, skipping blank lines and `#` comments.
	pub fn parse_lines(text: &str) -> Result<Vec<Self>> {
		let mut lines = Vec::new();
		for (idx, line) in text.lines().enumerate() {
			let trimmed = line.trim();
			if trimmed.is_empty() || trimmed.starts_with('#') {
				continue;
			}
			let parsed = trimmed
				.parse()
				.map_err(|e| AuthzError::Adapter(format!("line {}: {e}", idx + 1)))?;
			lines.push(parsed);
		}
		Ok(lines)
	}

	/// Whether the rule matches a field filter where empty values match anything.
	pub fn matches_filter(&self, key: &str, field_index: usize, values: &[String]) -> bool {
		self.key == key && policy::matches_filter(&self.rule, field_index, values)
	}
}

impl FromStr for PolicyLine {
	type Err = String;

	fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
		let mut fields = split_csv(line)?.into_iter();
		let key = fields
			.next()
			.filter(|key| !key.is_empty())
			.ok_or_else(|| "missing assertion key".to_string())?;
		let rule: Vec<String> = fields.collect();
		if rule.is_empty() {
			return Err(format!("`{key}` rule has no fields"));
		}
		Ok(Self { key, rule })
	}
}

impl fmt::Display for PolicyLine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.key)?;
		for field in &self.rule {
			f.write_str(", ")?;
			write_csv_field(f, field)?;
		}
		Ok(())
	}
}

fn split_csv(line: &str) -> std::result::Result<Vec<String>, String> {
	let mut fields = Vec::new();
	let mut chars = line.chars().peekable();

	loop {
		while chars.next_if(|c| *c == ' ' || *c == '\t').is_some() {}

		let mut field = String::new();
		if chars.next_if_eq(&'"').is_some() {
			loop {
				match chars.next() {
					Some('"') if chars.next_if_eq(&'"').is_some() => field.push('"'),
					Some('"') => break,
					Some(c) => field.push(c),
					None => return Err("unterminated quoted field".to_string()),
				}
			}
			while chars.next_if(|c| *c == ' ' || *c == '\t').is_some() {}
			match chars.peek() {
				None | Some(',') => {}
				Some(c) => return Err(format!("unexpected `{c}` after quoted field")),
			}
		} else {
			while let Some(c) = chars.next_if(|c| *c != ',') {
				field.push(c);
			}
			field.truncate(field.trim_end().len());
		}
		fields.push(field);

		if chars.next().is_none() {
			return Ok(fields);
		}
	}
}

fn write_csv_field(f: &mut fmt::Formatter<'_>, field: &str) -> fmt::Result {
	let needs_quotes = field.contains([',', '"'])
		|| field.starts_with(char::is_whitespace)
		|| field.ends_with(char::is_whitespace);
	if !needs_quotes {
		return f.write_str(field);
	}
	f.write_str("\"")?;
	f.write_str(&field.replace('"', "\"\""))?;
	f.write_str("\"")
}

/// Field values selecting a subset of stored policy.
///
/// `p` applies to rules of keys starting with `p` and `g` to keys starting
/// with `g`, both from the first field on. An empty value matches anything,
/// as does an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
	pub p: Vec<String>,
	pub g: Vec<String>,
}

impl Filter {
	pub fn new<S: Into<String>>(p: impl IntoIterator<Item = S>, g: impl IntoIterator<Item = S>) -> Self {
		Self {
			p: p.into_iter().map(Into::into).collect(),
			g: g.into_iter().map(Into::into).collect(),
		}
	}

	pub fn matches(&self, line: &PolicyLine) -> bool {
		let values = match line.key.as_bytes().first() {
			Some(b'p') => &self.p,
			Some(b'g') => &self.g,
			_ => return true,
		};
		policy::matches_filter(&line.rule, 0, values)
	}
}

/// Read access to stored policy.
pub trait PolicyLoader: Send + Sync {
	/// Returns every stored rule in storage order.
	fn load_policy(&mut self) -> Result<Vec<PolicyLine>>;

	/// Returns the stored rules `filter` selects. Storage that can filter
	/// natively should override this.
	fn load_filtered_policy(&mut self, filter: &Filter) -> Result<Vec<PolicyLine>> {
		let mut lines = self.load_policy()?;
		lines.retain(|line| filter.matches(line));
		Ok(lines)
	}
}

/// Read/write access to stored policy.
///
/// The enforcer calls the incremental methods before it changes its in-memory
/// state; an error leaves that state untouched.
pub trait PolicyPersister: PolicyLoader {
	/// Replaces everything in storage with `lines`.
	fn save_policy(&mut self, lines: &[PolicyLine]) -> Result<()>;

	fn add_policy(&mut self, key: &str, rule: &[String]) -> Result<()>;

	fn add_policies(&mut self, key: &str, rules: &[Vec<String>]) -> Result<()> {
		for rule in rules {
			self.add_policy(key, rule)?;
		}
		Ok(())
	}

	fn remove_policy(&mut self, key: &str, rule: &[String]) -> Result<()>;

	fn remove_policies(&mut self, key: &str, rules: &[Vec<String>]) -> Result<()> {
		for rule in rules {
			self.remove_policy(key, rule)?;
		}
		Ok(())
	}

	fn remove_filtered_policy(&mut self, key: &str, field_index: usize, values: &[String]) -> Result<()>;
}

/// The storage collaborator of an enforcer.
pub enum Adapter {
	ReadOnly(Box<dyn PolicyLoader>),
	ReadWrite(Box<dyn PolicyPersister>),
}

impl Adapter {
	pub fn read_only(loader: impl PolicyLoader + 'static) -> Self {
		Self::ReadOnly(Box::new(loader))
	}

	pub fn read_write(persister: impl PolicyPersister + 'static) -> Self {
		Self::ReadWrite(Box::new(persister))
	}

	pub fn load_policy(&mut self) -> Result<Vec<PolicyLine>> {
		match self {
			Self::ReadOnly(loader) => loader.load_policy(),
			Self::ReadWrite(persister) => persister.load_policy(),
		}
	}

	pub fn load_filtered_policy(&mut self, filter: &Filter) -> Result<Vec<PolicyLine>> {
		match self {
			Self::ReadOnly(loader) => loader.load_filtered_policy(filter),
			Self::ReadWrite(persister) => persister.load_filtered_policy(filter),
		}
	}

	/// The write side, if this adapter has one.
	pub fn persister(&mut self) -> Option<&mut dyn PolicyPersister> {
		match self {
			Self::ReadOnly(_) => None,
			Self::ReadWrite(persister) => Some(persister.as_mut()),
		}
	}

	pub fn is_writable(&self) -> bool {
		matches!(self, Self::ReadWrite(_))
	}
}

impl fmt::Debug for Adapter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ReadOnly(_) => f.write_str("Adapter::ReadOnly"),
			Self::ReadWrite(_) => f.write_str("Adapter::ReadWrite"),
		}
	}
}

impl Default for Adapter {
	fn default() -> Self {
		Self::read_only(NullAdapter)
	}
}

impl From<MemoryAdapter> for Adapter {
	fn from(adapter: MemoryAdapter) -> Self {
		Self::read_write(adapter)
	}
}

impl From<FileAdapter> for Adapter {
	fn from(adapter: FileAdapter) -> Self {
		Self::read_write(adapter)
	}
}

impl From<StringAdapter> for Adapter {
	fn from(adapter: StringAdapter) -> Self {
		Self::read_only(adapter)
	}
}

impl From<NullAdapter> for Adapter {
	fn from(adapter: NullAdapter) -> Self {
		Self::read_only(adapter)
	}
}
