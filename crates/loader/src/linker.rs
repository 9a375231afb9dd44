//! The single-unit linking seam.

use crate::context::{LinkedUnit, Resolve};

/// Turns a unit's raw bytes into its runtime image.
///
/// Parsing, verification, and linking all live behind this trait; the
/// registry treats the produced image as opaque. With [`Resolve::Eager`]
/// the linker is expected to also materialize every unit the linked one
/// statically references, with [`Resolve::Deferred`] referenced units are
/// left to their first use. The registry forwards the mode untouched and
/// never lets it influence caching or locking.
pub trait UnitLinker: Send + Sync {
	/// Link `bytes` into the runtime image for `name`.
	fn link(&self, name: &str, bytes: &[u8], resolve: Resolve) -> crate::Result<LinkedUnit>;
}
