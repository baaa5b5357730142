// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded memo of enforcement decisions.
//!
//! Entries are keyed by the matcher family and the request values. The
//! enforcer clears the cache whenever policy, roles or the model change, so a
//! cached decision is always the one a fresh evaluation would produce.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
	matcher: String,
	request: Vec<String>,
}

#[derive(Debug, Default)]
struct Entries {
	decisions: HashMap<CacheKey, bool>,
	order: VecDeque<CacheKey>,
}

/// First-in first-out decision cache.
#[derive(Debug)]
pub struct DecisionCache {
	capacity: usize,
	entries: Mutex<Entries>,
}

impl DecisionCache {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			entries: Mutex::new(Entries::default()),
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn get(&self, matcher: &str, request: &[&str]) -> Option<bool> {
		let key = CacheKey::new(matcher, request);
		self.entries.lock().decisions.get(&key).copied()
	}

	pub fn insert(&self, matcher: &str, request: &[&str], allowed: bool) {
		let key = CacheKey::new(matcher, request);
		let mut entries = self.entries.lock();
		if entries.decisions.insert(key.clone(), allowed).is_some() {
			return;
		}
		entries.order.push_back(key);
		while entries.order.len() > self.capacity {
			if let Some(oldest) = entries.order.pop_front() {
				entries.decisions.remove(&oldest);
			}
		}
	}

	pub fn clear(&self) {
		let mut entries = self.entries.lock();
		entries.decisions.clear();
		entries.order.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.lock().decisions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl CacheKey {
	fn new(matcher: &str, request: &[&str]) -> Self {
		Self {
			matcher: matcher.to_string(),
			request: request.iter().map(|s| s.to_string()).collect(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stores_and_returns_decisions() {
		let cache = DecisionCache::new(4);
		assert_eq!(cache.get("m", &["alice", "data1", "read"]), None);
		cache.insert("m", &["alice", "data1", "read"], true);
		assert_eq!(cache.get("m", &["alice", "data1", "read"]), Some(true));
		assert_eq!(cache.get("m2", &["alice", "data1", "read"]), None);
	}

	#[test]
	fn evicts_oldest_entry() {
		let cache = DecisionCache::new(2);
		cache.insert("m", &["a"], true);
		cache.insert("m", &["b"], false);
		cache.insert("m", &["a"], true);
		cache.insert("m", &["c"], true);
		assert_eq!(cache.len(), 2);
		assert_eq!(cache.get("m", &["a"]), None);
		assert_eq!(cache.get("m", &["b"]), Some(false));
		assert_eq!(cache.get("m", &["c"]), Some(true));
	}

	#[test]
	fn clear_empties_cache() {
		let cache = DecisionCache::new(8);
		cache.insert("m", &["a"], true);
		cache.clear();
		assert!(cache.is_empty());
	}

	#[test]
	fn request_fields_are_not_concatenated() {
		let cache = DecisionCache::new(8);
		cache.insert("m", &["ab", "c"], true);
		assert_eq!(cache.get("m", &["a", "bc"]), None);
	}
}
