//! Isolation contexts: one-shot scopes that each own a single unit's image.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::linker::UnitLinker;
use crate::reclaim::ReclaimSignal;
use crate::source::UnitSource;
use crate::{Error, Result};

/// Whether a load eagerly materializes transitively referenced units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolve {
	/// Load every unit the requested one statically references, up front.
	Eager,
	/// Defer referenced units to their first use.
	Deferred,
}

/// What a [`UnitLinker`] produces: the unit's reported name plus its
/// opaque runtime image.
pub struct LinkedUnit {
	/// Canonical name the unit reports for itself. The registry caches
	/// under this name; for well-behaved sources it equals the requested
	/// one.
	pub name: String,
	/// The runtime representation, opaque to the registry.
	pub image: Box<dyn Any + Send + Sync>,
}

impl LinkedUnit {
	/// Wrap a linked image under its reported name.
	pub fn new(name: impl Into<String>, image: impl Any + Send + Sync) -> Self {
		Self {
			name: name.into(),
			image: Box::new(image),
		}
	}
}

/// A disposable loading scope permitted to load exactly one code unit.
///
/// The context exclusively owns its unit's runtime image, and holds nothing
/// else: the collaborators are borrowed only for the duration of
/// [`load_once`](Self::load_once). Every [`Unit`] handle keeps the defining
/// context alive; once the registry entry and all handles are gone the
/// context drops, its destructor fires the reclamation signal, and the
/// unit's memory is reclaimed with it.
pub struct IsolationContext {
	resolve: Resolve,
	consumed: AtomicBool,
	slot: OnceLock<LinkedUnit>,
	signal: Arc<ReclaimSignal>,
}

impl IsolationContext {
	/// Create a fresh context configured with `resolve`.
	pub fn new(resolve: Resolve) -> Arc<Self> {
		Arc::new(Self {
			resolve,
			consumed: AtomicBool::new(false),
			slot: OnceLock::new(),
			signal: Arc::new(ReclaimSignal::default()),
		})
	}

	/// The resolve mode this context was configured with.
	pub fn resolve(&self) -> Resolve {
		self.resolve
	}

	pub(crate) fn signal(&self) -> Arc<ReclaimSignal> {
		self.signal.clone()
	}

	/// Load `name` through this context. Callable exactly once.
	///
	/// Fetches the unit's bytes from `source`, links them with `linker`
	/// under this context's resolve mode, and takes ownership of the
	/// resulting image.
	///
	/// # Errors
	///
	/// [`Error::UnitNotFound`] when `source` has no bytes for `name`,
	/// [`Error::Link`] when the linker rejects them, and
	/// [`Error::AlreadyLoaded`] on any call after the first — regardless
	/// of whether that first call succeeded.
	pub fn load_once(
		self: &Arc<Self>,
		name: &str,
		source: &dyn UnitSource,
		linker: &dyn UnitLinker,
	) -> Result<Unit> {
		if self.consumed.swap(true, Ordering::AcqRel) {
			let held = self.slot.get().map(|u| u.name.as_str()).unwrap_or(name);
			return Err(Error::AlreadyLoaded(held.to_string()));
		}

		let bytes = source
			.bytes(name)
			.ok_or_else(|| Error::UnitNotFound(name.to_string()))?;
		let linked = linker.link(name, &bytes, self.resolve)?;

		// The consumed flag makes us the sole writer.
		let _ = self.slot.set(linked);
		Ok(Unit {
			context: self.clone(),
		})
	}

	/// The unit this context loaded, if the load happened and succeeded.
	pub fn loaded_unit(self: &Arc<Self>) -> Option<Unit> {
		self.slot.get().map(|_| Unit {
			context: self.clone(),
		})
	}
}

impl Drop for IsolationContext {
	fn drop(&mut self) {
		self.signal.fire();
	}
}

/// Handle to a loaded code unit.
///
/// Cheap to clone. Every clone shares ownership of the unit's defining
/// [`IsolationContext`] — this back-reference is what prevents reclamation
/// while any handle is live, and what makes dropping the last handle (plus
/// the registry entry) sufficient to reclaim the unit.
#[derive(Clone)]
pub struct Unit {
	context: Arc<IsolationContext>,
}

impl Unit {
	fn linked(&self) -> &LinkedUnit {
		// A handle is only minted after the slot is published.
		self.context
			.slot
			.get()
			.expect("unit handle minted before its image was published")
	}

	/// The unit's reported name.
	pub fn name(&self) -> &str {
		&self.linked().name
	}

	/// The unit's runtime image.
	pub fn image(&self) -> &(dyn Any + Send + Sync) {
		&*self.linked().image
	}

	/// The image downcast to a concrete type.
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.linked().image.downcast_ref::<T>()
	}

	/// The context that defines this unit.
	pub fn context(&self) -> &Arc<IsolationContext> {
		&self.context
	}
}

impl fmt::Debug for Unit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Unit").field("name", &self.name()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::MapSource;

	struct PassthroughLinker;

	impl UnitLinker for PassthroughLinker {
		fn link(&self, name: &str, bytes: &[u8], _resolve: Resolve) -> Result<LinkedUnit> {
			Ok(LinkedUnit::new(name, bytes.to_vec()))
		}
	}

	fn source_with(name: &str, bytes: &[u8]) -> MapSource {
		let mut source = MapSource::new();
		source.insert(name, bytes.to_vec());
		source
	}

	#[test]
	fn context_loads_exactly_once() {
		let source = source_with("alpha", b"a1");
		let context = IsolationContext::new(Resolve::Deferred);

		let unit = context.load_once("alpha", &source, &PassthroughLinker).unwrap();
		assert_eq!(unit.name(), "alpha");
		assert_eq!(unit.downcast_ref::<Vec<u8>>(), Some(&b"a1".to_vec()));

		let err = context.load_once("alpha", &source, &PassthroughLinker).unwrap_err();
		assert!(matches!(err, Error::AlreadyLoaded(name) if name == "alpha"));
	}

	#[test]
	fn consumed_context_stays_consumed_after_a_failed_load() {
		let source = MapSource::new();
		let context = IsolationContext::new(Resolve::Deferred);

		let err = context.load_once("ghost", &source, &PassthroughLinker).unwrap_err();
		assert!(matches!(err, Error::UnitNotFound(_)));
		assert!(context.loaded_unit().is_none());

		let err = context.load_once("ghost", &source, &PassthroughLinker).unwrap_err();
		assert!(matches!(err, Error::AlreadyLoaded(_)));
	}

	#[test]
	fn loaded_unit_reflects_the_slot() {
		let source = source_with("alpha", b"a1");
		let context = IsolationContext::new(Resolve::Eager);
		assert!(context.loaded_unit().is_none());

		context.load_once("alpha", &source, &PassthroughLinker).unwrap();
		let unit = context.loaded_unit().unwrap();
		assert_eq!(unit.name(), "alpha");
		assert_eq!(unit.context().resolve(), Resolve::Eager);
	}
}
