// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Enforcer options.
//!
//! Options are assembled from layered sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. a TOML file (skipped when missing)
//! 3. environment variables (`LOOM_AUTHZ_*`)
//!
//! ```toml
//! wildcard = "*"
//! max_role_depth = 10
//! auto_save = true
//! cache_capacity = 4096
//! log_decisions = false
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{AuthzError, Result};
use crate::matcher::{FunctionMap, MatcherOptions};

const DEFAULT_WILDCARD: &str = "*";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnforcerConfigLayer {
	pub wildcard: Option<String>,
	pub max_role_depth: Option<usize>,
	pub auto_save: Option<bool>,
	pub cache_capacity: Option<usize>,
	pub log_decisions: Option<bool>,
}

impl EnforcerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.wildcard.is_some() {
			self.wildcard = other.wildcard;
		}
		if other.max_role_depth.is_some() {
			self.max_role_depth = other.max_role_depth;
		}
		if other.auto_save.is_some() {
			self.auto_save = other.auto_save;
		}
		if other.cache_capacity.is_some() {
			self.cache_capacity = other.cache_capacity;
		}
		if other.log_decisions.is_some() {
			self.log_decisions = other.log_decisions;
		}
	}

	pub fn finalize(self) -> EnforcerConfig {
		EnforcerConfig {
			wildcard: self
				.wildcard
				.unwrap_or_else(|| DEFAULT_WILDCARD.to_string()),
			max_role_depth: self.max_role_depth,
			auto_save: self.auto_save.unwrap_or(true),
			cache_capacity: self.cache_capacity.filter(|c| *c > 0),
			log_decisions: self.log_decisions.unwrap_or(false),
		}
	}
}

/// Resolved enforcer options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnforcerConfig {
	/// Rule value that equals any request value. Empty disables wildcards.
	pub wildcard: String,
	/// Maximum role links followed per query; `None` is unbounded.
	pub max_role_depth: Option<usize>,
	/// Write mutations through to a read/write adapter.
	pub auto_save: bool,
	/// Decision cache size; `None` disables caching.
	pub cache_capacity: Option<usize>,
	/// Log every decision at `info` instead of `debug`.
	pub log_decisions: bool,
}

impl Default for EnforcerConfig {
	fn default() -> Self {
		EnforcerConfigLayer::default().finalize()
	}
}

impl EnforcerConfig {
	/// Matcher options for these settings with the given registered functions.
	pub fn matcher_options(&self, functions: &FunctionMap) -> MatcherOptions {
		MatcherOptions {
			wildcard: Some(self.wildcard.clone()).filter(|w| !w.is_empty()),
			functions: functions.clone(),
		}
	}
}

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<EnforcerConfigLayer>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<EnforcerConfigLayer> {
		Ok(EnforcerConfigLayer::default())
	}
}

pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<EnforcerConfigLayer> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(EnforcerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path)?;
		let layer = toml::from_str(&content).map_err(|e| AuthzError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;
		trace!("parsed enforcer config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `LOOM_AUTHZ_<FIELD>`.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<EnforcerConfigLayer> {
		debug!("loading environment variables");
		layer_from_vars(|name| std::env::var(name).ok())
	}
}

fn layer_from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<EnforcerConfigLayer> {
	let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
	let bool_var = |name: &str| var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1");
	let usize_var = |name: &str| -> Result<Option<usize>> {
		match var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| AuthzError::Config {
				key: name.to_string(),
				message: format!("invalid integer value '{v}'"),
			}),
			None => Ok(None),
		}
	};

	Ok(EnforcerConfigLayer {
		wildcard: var("LOOM_AUTHZ_WILDCARD"),
		max_role_depth: usize_var("LOOM_AUTHZ_MAX_ROLE_DEPTH")?,
		auto_save: bool_var("LOOM_AUTHZ_AUTO_SAVE"),
		cache_capacity: usize_var("LOOM_AUTHZ_CACHE_CAPACITY")?,
		log_decisions: bool_var("LOOM_AUTHZ_LOG_DECISIONS"),
	})
}

/// Loads options from defaults, the TOML file at `path`, and the environment.
pub fn load_config(path: impl Into<PathBuf>) -> Result<EnforcerConfig> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(path)),
		Box::new(EnvSource),
	];
	load_from_sources(&mut sources)
}

/// Loads options from defaults and the environment only.
pub fn load_config_from_env() -> Result<EnforcerConfig> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource), Box::new(EnvSource)];
	load_from_sources(&mut sources)
}

fn load_from_sources(sources: &mut [Box<dyn ConfigSource>]) -> Result<EnforcerConfig> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = EnforcerConfigLayer::default();
	for source in sources.iter() {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}
	Ok(merged.finalize())
}
