//! The unit registry: load-by-name with caching and explicit unload.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::Result;
use crate::context::{IsolationContext, Resolve, Unit};
use crate::linker::UnitLinker;
use crate::reclaim::ReclaimToken;
use crate::source::UnitSource;


/// Registry of loaded code units.
///
/// Ensures exactly one [`IsolationContext`] per unit name: a load is a
/// cache hit when the name is present, and otherwise creates a fresh
/// context, delegates the load to it, and publishes the result. Unloading
/// removes the entry; the unit stays physically resident until every
/// [`Unit`] handle is dropped, at which point the context's destructor
/// runs and [`unload_blocking`](Self::unload_blocking) observes it.
///
/// # Concurrency
///
/// - `entries`: `RwLock` for read-heavy cache hits and lookups.
/// - `gates`: one mutex per name, created atomically under a short map
///   lock and held for the whole of that name's load or unload. This is
///   what makes check-then-act on the entry table race-free: two
///   concurrent loads of an unseen name are totally ordered, and the
///   loser observes the winner's published entry. Unrelated names never
///   contend beyond the brief map lock. Gates are never evicted —
///   removing one while another caller waits on it would let a third
///   caller run the same name concurrently.
pub struct UnitRegistry {
	source: Arc<dyn UnitSource>,
	linker: Arc<dyn UnitLinker>,
	entries: RwLock<HashMap<String, Arc<IsolationContext>>>,
	gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UnitRegistry {
	/// Create a registry over the given collaborators.
	pub fn new(source: Arc<dyn UnitSource>, linker: Arc<dyn UnitLinker>) -> Self {
		Self {
			source,
			linker,
			entries: RwLock::new(HashMap::new()),
			gates: Mutex::new(HashMap::new()),
		}
	}

	/// The per-name serialization gate, created on first use.
	fn gate(&self, name: &str) -> Arc<Mutex<()>> {
		let mut gates = self.gates.lock();
		gates.entry(name.to_string()).or_default().clone()
	}

	/// Load the unit named `name`, or return the cached one.
	///
	/// A cache hit is idempotent: the existing unit is returned and no new
	/// state is created, whatever `resolve` says. On a miss a fresh
	/// [`IsolationContext`] configured with `resolve` performs the load,
	/// and the mapping is recorded under the unit's reported name. A
	/// failed load publishes nothing.
	///
	/// # Errors
	///
	/// [`Error::UnitNotFound`](crate::Error::UnitNotFound) when the byte
	/// source has nothing for `name`,
	/// [`Error::Link`](crate::Error::Link) when the linker rejects the
	/// bytes.
	pub fn load(&self, name: &str, resolve: Resolve) -> Result<Unit> {
		if let Some(unit) = self.find_loaded(name) {
			debug!(unit = name, "cache hit");
			return Ok(unit);
		}

		let gate = self.gate(name);
		let _loading = gate.lock();

		// Re-check: another caller may have published while we queued.
		if let Some(unit) = self.find_loaded(name) {
			debug!(unit = name, "cache hit");
			return Ok(unit);
		}

		let context = IsolationContext::new(resolve);
		let unit = context.load_once(name, self.source.as_ref(), self.linker.as_ref())?;

		self.entries
			.write()
			.insert(unit.name().to_string(), context);
		info!(unit = unit.name(), ?resolve, "unit loaded");
		Ok(unit)
	}

	/// [`load`](Self::load) with [`Resolve::Deferred`].
	pub fn load_default(&self, name: &str) -> Result<Unit> {
		self.load(name, Resolve::Deferred)
	}

	/// The already-loaded unit for `name`, if present.
	///
	/// A pure lookup: never triggers a load.
	pub fn find_loaded(&self, name: &str) -> Option<Unit> {
		let entries = self.entries.read();
		entries.get(name).and_then(|context| context.loaded_unit())
	}

	/// Remove the entry for `name`.
	///
	/// Returns `false` when no entry existed. The unit may remain
	/// physically resident until every outstanding [`Unit`] handle is
	/// dropped.
	pub fn unload(&self, name: &str) -> bool {
		let gate = self.gate(name);
		let _loading = gate.lock();
		self.remove_entry(name).is_some()
	}

	/// Remove the entry for `name` and wait until its context is reclaimed.
	///
	/// Returns `false` when no entry existed. On removal, blocks until the
	/// context's destructor has run — the signal that the unit and its
	/// defining scope are both gone. The name's gate is held throughout,
	/// so a reload of the same name cannot begin until the old context is
	/// observably gone.
	///
	/// Caller obligation: every [`Unit`] handle and anything derived from
	/// one must already be dropped, otherwise this call never returns.
	/// Use [`unload_watched`](Self::unload_watched) to wait with a
	/// deadline instead.
	pub fn unload_blocking(&self, name: &str) -> bool {
		let gate = self.gate(name);
		let _loading = gate.lock();
		let Some(context) = self.remove_entry(name) else {
			return false;
		};

		let token = ReclaimToken::new(&context);
		drop(context);
		token.wait();
		debug!(unit = name, "context reclaimed");
		true
	}

	/// Remove the entry for `name`, returning a [`ReclaimToken`] that
	/// observes the removed context without keeping it alive.
	///
	/// `None` when no entry existed. The token lets the caller apply its
	/// own waiting policy ([`ReclaimToken::wait`],
	/// [`ReclaimToken::wait_for`], [`ReclaimToken::is_reclaimed`]).
	pub fn unload_watched(&self, name: &str) -> Option<ReclaimToken> {
		let gate = self.gate(name);
		let _loading = gate.lock();
		let context = self.remove_entry(name)?;
		Some(ReclaimToken::new(&context))
	}

	fn remove_entry(&self, name: &str) -> Option<Arc<IsolationContext>> {
		let removed = self.entries.write().remove(name);
		if removed.is_some() {
			info!(unit = name, "unit unloaded");
		}
		removed
	}

	/// Drop every entry, returning the names that were loaded.
	pub fn unload_all(&self) -> Vec<String> {
		let mut entries = self.entries.write();
		let names: Vec<String> = entries.keys().cloned().collect();
		entries.clear();
		if !names.is_empty() {
			info!(count = names.len(), "all units unloaded");
		}
		names
	}

	/// The number of loaded units.
	pub fn loaded_count(&self) -> usize {
		self.entries.read().len()
	}

	/// The names of all loaded units.
	pub fn loaded_names(&self) -> Vec<String> {
		self.entries.read().keys().cloned().collect()
	}
}
