// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

use super::{PolicyLine, PolicyLoader, PolicyPersister};

/// Read/write adapter over a CSV policy file.
///
/// Every write rewrites the whole file through a temporary sibling that is
/// renamed into place. Readers never see a partial file. A missing
/// file loads as empty.
#[derive(Debug, Clone)]
pub struct FileAdapter {
	path: PathBuf,
}

impl FileAdapter {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn read(&self) -> Result<Vec<PolicyLine>> {
		if !self.path.exists() {
			return Ok(Vec::new());
		}
		let text = std::fs::read_to_string(&self.path)?;
		PolicyLine::parse_lines(&text)
	}

	fn write(&self, lines: &[PolicyLine]) -> Result<()> {
		let temp_path = self.path.with_extension("tmp");
		{
			let file = File::create(&temp_path)?;
			let mut writer = BufWriter::new(file);
			for line in lines {
				writeln!(writer, "{line}")?;
			}
			writer.flush()?;
		}
		std::fs::rename(&temp_path, &self.path)?;
		debug!(path = %self.path.display(), lines = lines.len(), "wrote policy file");
		Ok(())
	}

	fn update(&self, change: impl FnOnce(&mut Vec<PolicyLine>)) -> Result<()> {
		let mut lines = self.read()?;
		change(&mut lines);
		self.write(&lines)
	}
}

impl PolicyLoader for FileAdapter {
	fn load_policy(&mut self) -> Result<Vec<PolicyLine>> {
		let lines = self.read()?;
		debug!(path = %self.path.display(), lines = lines.len(), "read policy file");
		Ok(lines)
	}
}

impl PolicyPersister for FileAdapter {
	fn save_policy(&mut self, lines: &[PolicyLine]) -> Result<()> {
		self.write(lines)
	}

	fn add_policy(&mut self, key: &str, rule: &[String]) -> Result<()> {
		self.update(|lines| lines.push(PolicyLine::new(key, rule.to_vec())))
	}

	fn add_policies(&mut self, key: &str, rules: &[Vec<String>]) -> Result<()> {
		self.update(|lines| {
			lines.extend(rules.iter().map(|rule| PolicyLine::new(key, rule.clone())));
		})
	}

	fn remove_policy(&mut self, key: &str, rule: &[String]) -> Result<()> {
		self.update(|lines| {
			if let Some(pos) = lines.iter().position(|l| l.key == key && l.rule == rule) {
				lines.remove(pos);
			}
		})
	}

	fn remove_policies(&mut self, key: &str, rules: &[Vec<String>]) -> Result<()> {
		self.update(|lines| {
			for rule in rules {
				if let Some(pos) = lines.iter().position(|l| l.key == key && &l.rule == rule) {
					lines.remove(pos);
				}
			}
		})
	}

	fn remove_filtered_policy(&mut self, key: &str, field_index: usize, values: &[String]) -> Result<()> {
		self.update(|lines| lines.retain(|line| !line.matches_filter(key, field_index, values)))
	}
}
