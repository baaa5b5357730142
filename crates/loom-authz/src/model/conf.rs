// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reader for the INI-like model configuration text.
//!
//! The grammar is deliberately small:
//!
//! ```text
//! # comment
//! [section]
//! key = value            # trailing comment
//! long = first part \
//!        second part
//! ```
//!
//! Only the first `=` splits a line, so values may contain `==`.

use crate::error::{AuthzError, Result};

/// A `key = value` line inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfEntry {
	pub key: String,
	pub value: String,
	/// 1-based line where the entry starts.
	pub line: usize,
}

/// A `[section]` and its entries in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfSection {
	pub name: String,
	pub line: usize,
	pub entries: Vec<ConfEntry>,
}

/// Parsed configuration text. Sections keep their first-seen order; a section
/// header that appears twice continues the earlier section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfFile {
	pub sections: Vec<ConfSection>,
}

impl ConfFile {
	pub fn parse(text: &str) -> Result<Self> {
		let mut conf = ConfFile::default();
		let mut current: Option<usize> = None;
		let mut lines = text.lines().enumerate().peekable();

		while let Some((idx, raw)) = lines.next() {
			let line_no = idx + 1;
			let line = raw.trim();
			if is_blank_or_comment(line) {
				continue;
			}

			if line.starts_with('[') {
				let name = parse_header(line, line_no)?;
				current = Some(conf.section_index(name, line_no));
				continue;
			}

			let mut logical = strip_trailing_comment(line).to_string();
			while logical.ends_with('\\') {
				logical.pop();
				logical.truncate(logical.trim_end().len());
				let next = loop {
					match lines.next() {
						Some((_, next)) if is_blank_or_comment(next.trim()) => continue,
						Some((_, next)) => break Some(next.trim()),
						None => break None,
					}
				};
				let Some(next) = next else {
					break;
				};
				logical.push(' ');
				logical.push_str(strip_trailing_comment(next));
			}

			let Some((key, value)) = logical.split_once('=') else {
				return Err(AuthzError::parse(
					line_no,
					format!("expected `key = value`, found `{line}`"),
				));
			};
			let key = key.trim();
			if key.is_empty() {
				return Err(AuthzError::parse(line_no, "empty key"));
			}
			let Some(section) = current else {
				return Err(AuthzError::parse(
					line_no,
					format!("`{key}` appears before any [section] header"),
				));
			};

			conf.sections[section].entries.push(ConfEntry {
				key: key.to_string(),
				value: value.trim().to_string(),
				line: line_no,
			});
		}

		Ok(conf)
	}

	pub fn section(&self, name: &str) -> Option<&ConfSection> {
		self.sections.iter().find(|s| s.name == name)
	}

	fn section_index(&mut self, name: String, line: usize) -> usize {
		if let Some(pos) = self.sections.iter().position(|s| s.name == name) {
			return pos;
		}
		self.sections.push(ConfSection {
			name,
			line,
			entries: Vec::new(),
		});
		self.sections.len() - 1
	}
}

fn is_blank_or_comment(line: &str) -> bool {
	line.is_empty() || line.starts_with('#') || line.starts_with(';')
}

fn parse_header(line: &str, line_no: usize) -> Result<String> {
	let inner = line
		.strip_prefix('[')
		.and_then(|rest| rest.strip_suffix(']'))
		.ok_or_else(|| AuthzError::parse(line_no, format!("malformed section header `{line}`")))?
		.trim();
	if inner.is_empty() {
		return Err(AuthzError::parse(line_no, "empty section name"));
	}
	Ok(inner.to_string())
}

/// Cuts a `# comment` off the end of a value, ignoring `#` inside quotes.
fn strip_trailing_comment(line: &str) -> &str {
	let mut quote: Option<char> = None;
	for (i, c) in line.char_indices() {
		match (quote, c) {
			(None, '"' | '\'') => quote = Some(c),
			(Some(q), c) if c == q => quote = None,
			(None, '#') => return line[..i].trim_end(),
			_ => {}
		}
	}
	line
}
