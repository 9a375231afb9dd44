//! Byte sources: where a named unit's raw bytes come from.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

/// Supplies the raw bytes of a named code unit.
///
/// Consumed by an [`IsolationContext`](crate::IsolationContext) during a
/// load; the registry itself never touches bytes. Returning `None` means
/// the name is unresolvable and surfaces to the caller as
/// [`Error::UnitNotFound`](crate::Error::UnitNotFound).
pub trait UnitSource: Send + Sync {
	/// The raw bytes for `name`, or `None` when the source has nothing.
	fn bytes(&self, name: &str) -> Option<Vec<u8>>;
}

/// Reads unit bytes from files under a root directory.
///
/// A unit named `n` maps to `<root>/<n>.<extension>`. Names containing a
/// path separator are rejected outright, so a lookup resolves to a single
/// file name and can never escape the root. I/O failures other than the
/// file being absent are logged and treated as unresolvable.
pub struct DirectorySource {
	root: PathBuf,
	extension: String,
}

impl DirectorySource {
	/// Create a source rooted at `root`, matching files with `extension`.
	pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
		Self {
			root: root.into(),
			extension: extension.into(),
		}
	}
}

impl UnitSource for DirectorySource {
	fn bytes(&self, name: &str) -> Option<Vec<u8>> {
		if name.is_empty() || name.contains(['/', '\\']) {
			return None;
		}
		let path = self.root.join(format!("{}.{}", name, self.extension));
		match std::fs::read(&path) {
			Ok(bytes) => Some(bytes),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
			Err(e) => {
				warn!(unit = name, path = %path.display(), error = %e, "unit byte read failed");
				None
			}
		}
	}
}

/// In-memory byte source, for embedded units and tests.
#[derive(Default)]
pub struct MapSource {
	units: HashMap<String, Vec<u8>>,
}

impl MapSource {
	/// Create an empty source.
	pub fn new() -> Self {
		Self::default()
	}

	/// Register the bytes for `name`, replacing any previous entry.
	pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
		self.units.insert(name.into(), bytes.into());
		self
	}
}

impl UnitSource for MapSource {
	fn bytes(&self, name: &str) -> Option<Vec<u8>> {
		self.units.get(name).cloned()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn map_source_resolves_registered_names() {
		let mut source = MapSource::new();
		source.insert("alpha", b"a1".to_vec());

		assert_eq!(source.bytes("alpha"), Some(b"a1".to_vec()));
		assert_eq!(source.bytes("beta"), None);
	}

	#[test]
	fn directory_source_reads_files_by_extension() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("greeter.unit"), b"payload").unwrap();

		let source = DirectorySource::new(dir.path(), "unit");
		assert_eq!(source.bytes("greeter"), Some(b"payload".to_vec()));
		assert_eq!(source.bytes("absent"), None);
	}

	#[test]
	fn directory_source_rejects_path_separators() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("inner.unit"), b"payload").unwrap();

		let source = DirectorySource::new(dir.path().join("sub"), "unit");
		assert_eq!(source.bytes("../inner"), None);
		assert_eq!(source.bytes(""), None);
	}
}
