// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Builtin matcher functions.
//!
//! | function      | arguments                 | result |
//! |---------------|---------------------------|--------|
//! | `keyMatch`    | key, pattern with `*`     | bool   |
//! | `keyMatch2`   | key, pattern with `:name` | bool   |
//! | `keyMatch3`   | key, pattern with `{name}`| bool   |
//! | `keyMatch4`   | key, pattern, repeated `{name}` must agree | bool |
//! | `keyMatch5`   | key with `?query`, pattern with `{name}` | bool |
//! | `keyGet`      | key, pattern with `*`     | string |
//! | `keyGet2`     | key, pattern, name        | string |
//! | `keyGet3`     | key, pattern, name        | string |
//! | `regexMatch`  | value, regex              | bool   |
//! | `globMatch`   | path, glob                | bool   |
//! | `ipMatch`     | address, address or CIDR  | bool   |
//!
//! A pattern that cannot be compiled is an [`AuthzError::InvalidPattern`],
//! never a silent mismatch.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::LazyLock;

use glob::{MatchOptions, Pattern};
use ipnet::IpNet;
use parking_lot::RwLock;
use regex::Regex;

use crate::error::{AuthzError, Result};

const MAX_CACHED_PATTERNS: usize = 1024;

static COLON_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":[^/]*").unwrap());
static COLON_NAMED_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":[^/]+").unwrap());
static BRACE_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^/]*\}").unwrap());
static BRACE_NAMED_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^/]+?\}").unwrap());

/// Compiled regexes keyed by source pattern.
#[derive(Debug, Default)]
pub struct PatternCache {
	regexes: RwLock<HashMap<String, Regex>>,
}

impl PatternCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the compiled form of `pattern`, compiling it on first use.
	pub fn regex(&self, function: &'static str, pattern: &str) -> Result<Regex> {
		if let Some(re) = self.regexes.read().get(pattern) {
			return Ok(re.clone());
		}
		let re = Regex::new(pattern).map_err(|e| AuthzError::InvalidPattern {
			function,
			pattern: pattern.to_string(),
			message: e.to_string(),
		})?;
		let mut regexes = self.regexes.write();
		if regexes.len() >= MAX_CACHED_PATTERNS {
			regexes.clear();
		}
		regexes.insert(pattern.to_string(), re.clone());
		Ok(re)
	}

	pub fn len(&self) -> usize {
		self.regexes.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// `"/foo/bar"` matches `"/foo/*"`.
pub fn key_match(key: &str, pattern: &str) -> bool {
	match pattern.find('*') {
		Some(i) => key.starts_with(&pattern[..i]),
		None => key == pattern,
	}
}

/// The part of `key` covered by the `*` of `pattern`, or `""`.
pub fn key_get(key: &str, pattern: &str) -> String {
	match pattern.find('*') {
		Some(i) if key.len() > i && key.starts_with(&pattern[..i]) => key[i..].to_string(),
		_ => String::new(),
	}
}

/// `"/resource1"` matches `"/:resource"`; `/*` matches any suffix.
pub fn key_match2(cache: &PatternCache, key: &str, pattern: &str) -> Result<bool> {
	let pattern = pattern.replace("/*", "/.*");
	let pattern = COLON_PARAM.replace_all(&pattern, "[^/]+");
	anchored_match(cache, "keyMatch2", key, &pattern)
}

/// `"/resource1"` matches `"/{resource}"`.
pub fn key_match3(cache: &PatternCache, key: &str, pattern: &str) -> Result<bool> {
	let pattern = pattern.replace("/*", "/.*");
	let pattern = BRACE_PARAM.replace_all(&pattern, "[^/]+");
	anchored_match(cache, "keyMatch3", key, &pattern)
}

/// Like [`key_match3`], but every occurrence of the same `{name}` must
/// capture the same value.
pub fn key_match4(cache: &PatternCache, key: &str, pattern: &str) -> Result<bool> {
	let pattern = pattern.replace("/*", "/.*");
	let mut names = Vec::new();
	let pattern = BRACE_NAMED_PARAM.replace_all(&pattern, |caps: &regex::Captures<'_>| {
		let token = &caps[0];
		names.push(token[1..token.len() - 1].to_string());
		"([^/]+)"
	});
	let re = cache.regex("keyMatch4", &format!("^{pattern}$"))?;
	let Some(caps) = re.captures(key) else {
		return Ok(false);
	};

	let mut seen: HashMap<&str, &str> = HashMap::new();
	for (name, value) in names.iter().zip(caps.iter().skip(1)) {
		let value = value.map(|m| m.as_str()).unwrap_or_default();
		match seen.get(name.as_str()) {
			Some(existing) if *existing != value => return Ok(false),
			Some(_) => {}
			None => {
				seen.insert(name.as_str(), value);
			}
		}
	}
	Ok(true)
}

/// Like [`key_match3`], ignoring any `?query` part of `key`.
pub fn key_match5(cache: &PatternCache, key: &str, pattern: &str) -> Result<bool> {
	let key = key.split_once('?').map_or(key, |(path, _)| path);
	let pattern = pattern.replace("/*", "/.*");
	let pattern = BRACE_NAMED_PARAM.replace_all(&pattern, "[^/]+");
	anchored_match(cache, "keyMatch5", key, &pattern)
}

/// The value bound to `:name` when `key` matches `pattern`, or `""`.
pub fn key_get2(cache: &PatternCache, key: &str, pattern: &str, name: &str) -> Result<String> {
	let pattern = pattern.replace("/*", "/.*");
	let names: Vec<&str> = COLON_NAMED_PARAM
		.find_iter(&pattern)
		.map(|m| &m.as_str()[1..])
		.collect();
	let regex = COLON_NAMED_PARAM.replace_all(&pattern, "([^/]+)");
	let re = cache.regex("keyGet2", &format!("^{regex}$"))?;
	Ok(capture_named(&re, key, &names, name))
}

/// The value bound to `{name}` when `key` matches `pattern`, or `""`.
pub fn key_get3(cache: &PatternCache, key: &str, pattern: &str, name: &str) -> Result<String> {
	let pattern = pattern.replace("/*", "/.*");
	let names: Vec<&str> = BRACE_NAMED_PARAM
		.find_iter(&pattern)
		.map(|m| {
			let token = m.as_str();
			&token[1..token.len() - 1]
		})
		.collect();
	let regex = BRACE_NAMED_PARAM
		.replace_all(&pattern, "([^/]+?)")
		.replace('{', "\\{");
	let re = cache.regex("keyGet3", &format!("^{regex}$"))?;
	Ok(capture_named(&re, key, &names, name))
}

pub fn regex_match(cache: &PatternCache, value: &str, pattern: &str) -> Result<bool> {
	Ok(cache.regex("regexMatch", pattern)?.is_match(value))
}

/// Shell-style glob where `*` stops at `/` and `**` crosses it.
pub fn glob_match(path: &str, pattern: &str) -> Result<bool> {
	let glob = Pattern::new(pattern).map_err(|e| AuthzError::InvalidPattern {
		function: "globMatch",
		pattern: pattern.to_string(),
		message: e.to_string(),
	})?;
	let options = MatchOptions {
		require_literal_separator: true,
		..MatchOptions::new()
	};
	Ok(glob.matches_with(path, options))
}

/// Whether `address` equals `pattern` or lies inside the `pattern` network.
/// IPv4-mapped IPv6 addresses compare equal to their IPv4 form.
pub fn ip_match(address: &str, pattern: &str) -> Result<bool> {
	let invalid = |value: &str, message: String| AuthzError::InvalidPattern {
		function: "ipMatch",
		pattern: value.to_string(),
		message,
	};

	let addr: IpAddr = address
		.trim()
		.parse()
		.map_err(|e: std::net::AddrParseError| invalid(address, e.to_string()))?;
	let addr = addr.to_canonical();

	if pattern.contains('/') {
		let net: IpNet = pattern
			.trim()
			.parse()
			.map_err(|e: ipnet::AddrParseError| invalid(pattern, e.to_string()))?;
		return Ok(net.contains(&addr));
	}

	let other: IpAddr = pattern
		.trim()
		.parse()
		.map_err(|e: std::net::AddrParseError| invalid(pattern, e.to_string()))?;
	Ok(addr == other.to_canonical())
}

fn anchored_match(cache: &PatternCache, function: &'static str, key: &str, pattern: &str) -> Result<bool> {
	Ok(cache.regex(function, &format!("^{pattern}$"))?.is_match(key))
}

fn capture_named(re: &Regex, key: &str, names: &[&str], name: &str) -> String {
	let Some(caps) = re.captures(key) else {
		return String::new();
	};
	names
		.iter()
		.position(|n| *n == name)
		.and_then(|i| caps.get(i + 1))
		.map(|m| m.as_str().to_string())
		.unwrap_or_default()
}

/// Boolean or string-valued builtin, stored in compiled matchers.
#[derive(Clone, Copy)]
pub(crate) enum BuiltinFn {
	Predicate(fn(&PatternCache, &[&str]) -> Result<bool>),
	Extractor(fn(&PatternCache, &[&str]) -> Result<String>),
}

pub(crate) struct Builtin {
	pub name: &'static str,
	pub arity: usize,
	pub func: BuiltinFn,
}

static BUILTINS: &[Builtin] = &[
	Builtin {
		name: "keyMatch",
		arity: 2,
		func: BuiltinFn::Predicate(|_, a| Ok(key_match(a[0], a[1]))),
	},
	Builtin {
		name: "keyMatch2",
		arity: 2,
		func: BuiltinFn::Predicate(|c, a| key_match2(c, a[0], a[1])),
	},
	Builtin {
		name: "keyMatch3",
		arity: 2,
		func: BuiltinFn::Predicate(|c, a| key_match3(c, a[0], a[1])),
	},
	Builtin {
		name: "keyMatch4",
		arity: 2,
		func: BuiltinFn::Predicate(|c, a| key_match4(c, a[0], a[1])),
	},
	Builtin {
		name: "keyMatch5",
		arity: 2,
		func: BuiltinFn::Predicate(|c, a| key_match5(c, a[0], a[1])),
	},
	Builtin {
		name: "keyGet",
		arity: 2,
		func: BuiltinFn::Extractor(|_, a| Ok(key_get(a[0], a[1]))),
	},
	Builtin {
		name: "keyGet2",
		arity: 3,
		func: BuiltinFn::Extractor(|c, a| key_get2(c, a[0], a[1], a[2])),
	},
	Builtin {
		name: "keyGet3",
		arity: 3,
		func: BuiltinFn::Extractor(|c, a| key_get3(c, a[0], a[1], a[2])),
	},
	Builtin {
		name: "regexMatch",
		arity: 2,
		func: BuiltinFn::Predicate(|c, a| regex_match(c, a[0], a[1])),
	},
	Builtin {
		name: "globMatch",
		arity: 2,
		func: BuiltinFn::Predicate(|_, a| glob_match(a[0], a[1])),
	},
	Builtin {
		name: "ipMatch",
		arity: 2,
		func: BuiltinFn::Predicate(|_, a| ip_match(a[0], a[1])),
	},
];

pub(crate) fn lookup(name: &str) -> Option<&'static Builtin> {
	BUILTINS.iter().find(|b| b.name == name)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key_match_prefix() {
		assert!(key_match("/foo/bar", "/foo/*"));
		assert!(!key_match("/bar/foo", "/foo/*"));
		assert!(key_match("/bar", "/ba*"));
		assert!(key_match("/foo", "/foo"));
		assert!(!key_match("/fo", "/foo*"));
	}

	#[test]
	fn key_get_suffix() {
		assert_eq!(key_get("/foo", "/foo"), "");
		assert_eq!(key_get("/foo", "/foo*"), "");
		assert_eq!(key_get("/foo/bar", "/foo*"), "/bar");
		assert_eq!(key_get("/foo/bar", "/foo/*"), "bar");
		assert_eq!(key_get("/foobar", "/foo*"), "bar");
		assert_eq!(key_get("/foobar", "/foo/*"), "");
	}

	#[test]
	fn key_match2_colon_params() {
		let c = PatternCache::new();
		assert!(key_match2(&c, "/foo/bar", "/foo/*").unwrap());
		assert!(key_match2(&c, "/foo/bar/baz", "/foo/*").unwrap());
		assert!(key_match2(&c, "/foo/baz", "/foo/:bar").unwrap());
		assert!(key_match2(&c, "/foo/baz", "/:foo/:bar").unwrap());
		assert!(key_match2(&c, "/foo/baz/foo", "/foo/:bar/foo").unwrap());
		assert!(!key_match2(&c, "/baz", "/foo").unwrap());
		assert!(key_match2(&c, "/foo/bar", "/foo/:").unwrap());
		assert!(!key_match2(&c, "/foo/bar/baz", "/foo/:").unwrap());
		assert!(key_match2(&c, "/foo/bar/baz", "/foo/:/baz").unwrap());
	}

	#[test]
	fn key_match3_brace_params() {
		let c = PatternCache::new();
		assert!(key_match3(&c, "/foo/bar", "/foo/*").unwrap());
		assert!(key_match3(&c, "/foo/baz", "/foo/{bar}").unwrap());
		assert!(key_match3(&c, "/foo/baz/foo", "/foo/{bar}/foo").unwrap());
		assert!(!key_match3(&c, "/baz", "/foo").unwrap());
		assert!(key_match3(&c, "/foo/{}", "/foo/{}").unwrap());
		assert!(!key_match3(&c, "/foo/bar/baz", "/foo/{}").unwrap());
		assert!(key_match3(&c, "/foo/bar/baz", "/foo/{}/baz").unwrap());
	}

	#[test]
	fn key_match4_repeated_params_agree() {
		let c = PatternCache::new();
		assert!(key_match4(&c, "/parent/123/child/123", "/parent/{id}/child/{id}").unwrap());
		assert!(!key_match4(&c, "/parent/123/child/456", "/parent/{id}/child/{id}").unwrap());
		assert!(key_match4(&c, "/parent/123/child/456", "/parent/{id}/child/{another_id}").unwrap());
		assert!(
			!key_match4(&c, "/parent/123/child/123/book/456", "/parent/{id}/child/{id}/book/{id}")
				.unwrap()
		);
		assert!(!key_match4(&c, "/parent/123/child/456", "/parent/{id}/child/{id}/book/{id}").unwrap());
	}

	#[test]
	fn key_match5_ignores_query() {
		let c = PatternCache::new();
		assert!(key_match5(&c, "/foo/bar?status=1&type=2", "/foo/bar").unwrap());
		assert!(key_match5(&c, "/parent/child1", "/parent/*").unwrap());
		assert!(key_match5(&c, "/parent/child1?status=1", "/parent/*").unwrap());
		assert!(key_match5(&c, "/parent/child1?status=1", "/parent/{id}").unwrap());
		assert!(!key_match5(&c, "/parent/child1/x", "/parent/{id}").unwrap());
	}

	#[test]
	fn key_get2_named_values() {
		let c = PatternCache::new();
		assert_eq!(key_get2(&c, "/foo", "/foo", "id").unwrap(), "");
		assert_eq!(key_get2(&c, "/resource1", "/:resource", "resource").unwrap(), "resource1");
		assert_eq!(key_get2(&c, "/myid", "/:id/using/:resId", "id").unwrap(), "");
		assert_eq!(key_get2(&c, "/myid/using/myresid", "/:id/using/:resId", "resId").unwrap(), "myresid");
		assert_eq!(key_get2(&c, "/proxy/myid/res/res2", "/proxy/:id/*", "id").unwrap(), "myid");
		assert_eq!(key_get2(&c, "/proxy/", "/proxy/:id/*", "id").unwrap(), "");
		assert_eq!(key_get2(&c, "/alice/all", "/:/all", "").unwrap(), "");
	}

	#[test]
	fn key_get3_named_values() {
		let c = PatternCache::new();
		assert_eq!(key_get3(&c, "/resource1", "/{resource}", "resource").unwrap(), "resource1");
		assert_eq!(key_get3(&c, "/myid/using/myresid", "/{id}/using/{resId}", "id").unwrap(), "myid");
		assert_eq!(key_get3(&c, "/proxy/myid/res/res2/res3", "/proxy/{id}/*/{res}", "res").unwrap(), "res3");
		assert_eq!(key_get3(&c, "/api/project1_admin/info", "/api/{proj}_admin/info", "proj").unwrap(), "project1");
		assert_eq!(
			key_get3(&c, "/api/group1_group_name/project1_admin/info", "/api/{g}_{gn}/{proj}_admin/info", "gn")
				.unwrap(),
			"group_name"
		);
		assert_eq!(key_get3(&c, "/{id/using/myresid", "/{id/using/{resId}", "resId").unwrap(), "myresid");
	}

	#[test]
	fn regex_match_and_cache() {
		let c = PatternCache::new();
		assert!(regex_match(&c, "foobar", "^foo*").unwrap());
		assert!(!regex_match(&c, "barfoo", "^foo*").unwrap());
		assert_eq!(c.len(), 1);
		assert!(regex_match(&c, "foo", "^foo*").unwrap());
		assert_eq!(c.len(), 1);
	}

	#[test]
	fn invalid_regex_is_an_error() {
		let c = PatternCache::new();
		let err = regex_match(&c, "x", "(unclosed").unwrap_err();
		assert!(matches!(err, AuthzError::InvalidPattern { function: "regexMatch", .. }));
		assert!(c.is_empty());
	}

	#[test]
	fn glob_matching() {
		assert!(glob_match("/abc/123", "/abc/*").unwrap());
		assert!(!glob_match("/abc/123/456", "/abc/*").unwrap());
		assert!(glob_match("/abc/123/456", "/abc/**").unwrap());
		assert!(glob_match_error("[unclosed"));
	}

	fn glob_match_error(pattern: &str) -> bool {
		matches!(glob_match("x", pattern), Err(AuthzError::InvalidPattern { .. }))
	}

	#[test]
	fn ip_matching() {
		assert!(ip_match("::1", "::0:1").unwrap());
		assert!(ip_match("192.168.1.1", "192.168.1.1").unwrap());
		assert!(ip_match("127.0.0.1", "::ffff:127.0.0.1").unwrap());
		assert!(ip_match("192.168.2.123", "192.168.2.0/24").unwrap());
		assert!(!ip_match("::1", "127.0.0.2").unwrap());
		assert!(!ip_match("192.168.2.189", "192.168.1.134/26").unwrap());
	}

	#[test]
	fn ip_match_rejects_garbage() {
		assert!(ip_match("I am alice", "127.0.0.1").is_err());
		assert!(ip_match("127.0.0.1", "I am alice").is_err());
		assert!(ip_match("127.0.0.1", "10.0.0.0/99").is_err());
	}

	#[test]
	fn builtin_table() {
		assert_eq!(lookup("keyGet2").map(|b| b.arity), Some(3));
		assert!(matches!(lookup("keyGet").map(|b| b.func), Some(BuiltinFn::Extractor(_))));
		assert!(lookup("nope").is_none());
	}
}
