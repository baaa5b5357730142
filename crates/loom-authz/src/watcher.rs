// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy change notification.
//!
//! A [`Watcher`] is told after every successful policy mutation and every
//! [`crate::Enforcer::save_policy`]. Hosts running several enforcers over
//! shared storage use it to broadcast a reload signal; how that signal travels
//! is up to the host. Notifications are delivered after all enforcer locks are
//! released, so a watcher may call back into the enforcer.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

pub trait Watcher: Send + Sync {
	/// Called once per change to the enforcer's policy.
	fn update(&self);
}

impl<F> Watcher for F
where
	F: Fn() + Send + Sync,
{
	fn update(&self) {
		self()
	}
}

/// The enforcer's optional watcher.
#[derive(Default)]
pub(crate) struct WatcherSlot {
	watcher: RwLock<Option<Arc<dyn Watcher>>>,
}

impl WatcherSlot {
	pub(crate) fn set(&self, watcher: Option<Arc<dyn Watcher>>) {
		*self.watcher.write() = watcher;
	}

	pub(crate) fn notify(&self) {
		let watcher = self.watcher.read().clone();
		if let Some(watcher) = watcher {
			debug!("notifying policy watcher");
			watcher.update();
		}
	}
}

impl fmt::Debug for WatcherSlot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let set = self.watcher.read().is_some();
		f.debug_struct("WatcherSlot").field("set", &set).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn notify_reaches_closure_watcher() {
		let calls = Arc::new(AtomicUsize::new(0));
		let slot = WatcherSlot::default();
		slot.notify();

		let counter = calls.clone();
		slot.set(Some(Arc::new(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		})));
		slot.notify();
		slot.notify();
		assert_eq!(calls.load(Ordering::SeqCst), 2);

		slot.set(None);
		slot.notify();
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}
}
