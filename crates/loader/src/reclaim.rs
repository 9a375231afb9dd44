//! Observing reclamation of an isolation context.
//!
//! Reclamation here is deterministic: an [`IsolationContext`] is reference
//! counted, and its destructor fires a shared signal. Waiting for
//! reclamation is therefore a condition-variable wait on that signal, not
//! a poll of some collector.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::context::IsolationContext;

/// Drop-fired signal shared between a context and its observers.
#[derive(Default)]
pub(crate) struct ReclaimSignal {
	reclaimed: Mutex<bool>,
	cond: Condvar,
}

impl ReclaimSignal {
	pub(crate) fn fire(&self) {
		let mut reclaimed = self.reclaimed.lock();
		*reclaimed = true;
		self.cond.notify_all();
	}

	fn wait(&self) {
		let mut reclaimed = self.reclaimed.lock();
		while !*reclaimed {
			self.cond.wait(&mut reclaimed);
		}
	}

	fn wait_until(&self, deadline: Instant) -> bool {
		let mut reclaimed = self.reclaimed.lock();
		while !*reclaimed {
			if self.cond.wait_until(&mut reclaimed, deadline).timed_out() {
				return *reclaimed;
			}
		}
		true
	}
}

/// Weak observation handle for a removed unit's isolation context.
///
/// Created by [`UnitRegistry::unload_watched`]. Holds no strong reference
/// to the context, so observing reclamation can never prevent it.
///
/// [`UnitRegistry::unload_watched`]: crate::UnitRegistry::unload_watched
pub struct ReclaimToken {
	context: Weak<IsolationContext>,
	signal: Arc<ReclaimSignal>,
}

impl ReclaimToken {
	pub(crate) fn new(context: &Arc<IsolationContext>) -> Self {
		Self {
			context: Arc::downgrade(context),
			signal: context.signal(),
		}
	}

	/// Whether the tracked context has been reclaimed.
	pub fn is_reclaimed(&self) -> bool {
		self.context.strong_count() == 0
	}

	/// Block until the tracked context's destructor has run.
	///
	/// Never returns while any strong reference — a [`Unit`] handle, or
	/// anything derived from one — is still alive. Dropping those
	/// references first is the caller's obligation.
	///
	/// [`Unit`]: crate::Unit
	pub fn wait(&self) {
		self.signal.wait();
	}

	/// Like [`wait`](Self::wait), bounded by `timeout`.
	///
	/// Returns whether reclamation was observed before the deadline.
	pub fn wait_for(&self, timeout: Duration) -> bool {
		self.signal.wait_until(Instant::now() + timeout)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Resolve;

	#[test]
	fn token_observes_context_drop() {
		let context = IsolationContext::new(Resolve::Deferred);
		let token = ReclaimToken::new(&context);

		assert!(!token.is_reclaimed());
		assert!(!token.wait_for(Duration::from_millis(5)));

		drop(context);
		token.wait();
		assert!(token.is_reclaimed());
	}
}
