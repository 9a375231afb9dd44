//! Dynamic code-unit loading with reclaimable isolation contexts.
//!
//! The central type is [`UnitRegistry`]: it loads named code units on demand
//! through a pair of collaborator traits ([`UnitSource`] for raw bytes,
//! [`UnitLinker`] for turning bytes into an executable image), caches each
//! unit by name, and can later unload a unit so its memory is reclaimed.
//!
//! Unloading works because every unit is defined inside its own
//! [`IsolationContext`], a one-shot loading scope that exclusively owns the
//! unit's runtime image. The registry holds one strong reference per context
//! and every [`Unit`] handle holds another; once the registry entry is removed
//! and all handles are dropped, the context's destructor runs and the unit's
//! memory goes with it. [`UnitRegistry::unload_blocking`] waits for exactly
//! that destructor via a drop-fired signal, so reclamation is observed,
//! never assumed.

mod context;
mod linker;
mod reclaim;
mod registry;
mod source;

pub use context::{IsolationContext, LinkedUnit, Resolve, Unit};
pub use linker::UnitLinker;
pub use reclaim::ReclaimToken;
pub use registry::UnitRegistry;
pub use source::{DirectorySource, MapSource, UnitSource};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The byte source could not supply bytes for the requested unit name.
	#[error("no code unit resolvable for `{0}`")]
	UnitNotFound(String),
	/// An [`IsolationContext`] was asked to load a second unit.
	///
	/// A context is a one-shot scope. This error indicates an internal
	/// invariant violation and is never produced by correct registry code.
	#[error("isolation context already consumed by `{0}`")]
	AlreadyLoaded(String),
	/// The linker rejected the unit's bytes.
	#[error("linking `{name}` failed")]
	Link {
		/// Name of the unit that failed to link.
		name: String,
		/// The linker's own error.
		#[source]
		source: Box<dyn std::error::Error + Send + Sync>,
	},
}
