//! The entries of a jar, as seen by the transformers.
//!
//! Entries are never changed in place, a transformer consumes an entry and gives back a new one (or the same one).

use std::sync::OnceLock;
use anyhow::{anyhow, bail, Context, Result};
use zip::DateTime;
use zip::write::SimpleFileOptions;
use crate::manifest::Manifest;
use crate::transform::Transformer;

pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";
pub const JAVADOCTOR_NAME: &str = "javadoctor.json";
const VERSIONS_PREFIX: &str = "META-INF/versions/";

/// The file times attribute.
///
/// Use the [`Default`] implementation for having [`None`] everywhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicFileAttributes {
	pub last_modified: Option<DateTime>,
}

impl BasicFileAttributes {
	/// The time used for stable output, and for entries created while transforming: 2000-01-01 00:00:00.
	pub fn stable() -> Result<BasicFileAttributes> {
		let last_modified = DateTime::from_date_and_time(2000, 1, 1, 0, 0, 0)
			.map_err(|e| anyhow!("failed to create stable timestamp: {e:?}"))?;
		Ok(BasicFileAttributes { last_modified: Some(last_modified) })
	}

	pub(crate) fn to_file_options(self) -> SimpleFileOptions {
		let file_options = SimpleFileOptions::default();

		match self.last_modified {
			Some(last_modified) => file_options.last_modified_time(last_modified),
			None => file_options,
		}
	}
}

#[derive(Debug, Clone)]
pub enum Entry {
	Class(ClassEntry),
	Resource(ResourceEntry),
	Manifest(ManifestEntry),
	Javadoctor(JavadoctorEntry),
}

impl Entry {
	/// Creates the entry for a file of a jar, deciding on the kind of entry by the name.
	pub fn from_file(name: &str, attrs: BasicFileAttributes, data: Vec<u8>) -> Result<Entry> {
		Ok(if name == MANIFEST_NAME {
			Entry::Manifest(ManifestEntry::parse(attrs, data)?)
		} else if name == JAVADOCTOR_NAME {
			Entry::Javadoctor(JavadoctorEntry::new(attrs, data))
		} else if name.ends_with(".class") {
			Entry::Class(ClassEntry::parse(name, attrs, data)?)
		} else {
			Entry::Resource(ResourceEntry::new(name, attrs, data))
		})
	}

	/// The path of the entry inside the jar.
	pub fn name(&self) -> &str {
		match self {
			Entry::Class(entry) => &entry.name,
			Entry::Resource(entry) => &entry.name,
			Entry::Manifest(_) => MANIFEST_NAME,
			Entry::Javadoctor(_) => JAVADOCTOR_NAME,
		}
	}

	pub fn attrs(&self) -> BasicFileAttributes {
		match self {
			Entry::Class(entry) => entry.attrs,
			Entry::Resource(entry) => entry.attrs,
			Entry::Manifest(entry) => entry.attrs,
			Entry::Javadoctor(entry) => entry.attrs,
		}
	}

	pub fn data(&self) -> &[u8] {
		match self {
			Entry::Class(entry) => &entry.data,
			Entry::Resource(entry) => &entry.data,
			Entry::Manifest(entry) => entry.data(),
			Entry::Javadoctor(entry) => &entry.data,
		}
	}

	/// Gives the entry to the transformer. `None` means the transformer dropped the entry.
	pub fn process(self, transformer: &dyn Transformer) -> Result<Option<Entry>> {
		Ok(match self {
			Entry::Class(entry) => transformer.process_class(entry)?.map(Entry::Class),
			Entry::Resource(entry) => transformer.process_resource(entry)?.map(Entry::Resource),
			Entry::Manifest(entry) => transformer.process_manifest(entry)?.map(Entry::Manifest),
			Entry::Javadoctor(entry) => transformer.process_javadoctor(entry)?.map(Entry::Javadoctor),
		})
	}
}

/// A class file, possibly of a multi release jar.
#[derive(Debug, Clone)]
pub struct ClassEntry {
	name: String,
	attrs: BasicFileAttributes,
	/// Either empty, or `META-INF/versions/<release>/`, exactly as found in the name.
	prefix: String,
	release: Option<u32>,
	class_name: String,
	data: Vec<u8>,
}

impl ClassEntry {
	/// Parses the entry name `[META-INF/versions/<release>/]<class name>.class`.
	pub fn parse(name: &str, attrs: BasicFileAttributes, data: Vec<u8>) -> Result<ClassEntry> {
		let without_suffix = name.strip_suffix(".class")
			.with_context(|| anyhow!("class entry {name:?} doesn't end in `.class`"))?;

		let (prefix, release, class_name) = match without_suffix.strip_prefix(VERSIONS_PREFIX) {
			Some(rest) => {
				let Some((release, class_name)) = rest.split_once('/') else {
					bail!("invalid versioned class entry {name:?}");
				};
				let prefix = &name[..VERSIONS_PREFIX.len() + release.len() + 1];
				let release = release.parse()
					.with_context(|| anyhow!("invalid release {release:?} of versioned class entry {name:?}"))?;
				(prefix, Some(release), class_name)
			},
			None => ("", None, without_suffix),
		};

		if class_name.is_empty() {
			bail!("class entry {name:?} has no class name");
		}

		Ok(ClassEntry {
			name: name.to_owned(),
			attrs,
			prefix: prefix.to_owned(),
			release,
			class_name: class_name.to_owned(),
			data,
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn attrs(&self) -> BasicFileAttributes {
		self.attrs
	}

	pub fn class_name(&self) -> &str {
		&self.class_name
	}

	/// The release of a class in a multi release jar.
	pub fn release(&self) -> Option<u32> {
		self.release
	}

	pub fn data(&self) -> &[u8] {
		&self.data
	}

	/// Creates a new class entry at the same release, with the given class name and content.
	pub fn with_class(self, class_name: &str, data: Vec<u8>) -> ClassEntry {
		ClassEntry {
			name: format!("{}{class_name}.class", self.prefix),
			class_name: class_name.to_owned(),
			data,
			..self
		}
	}

	/// Creates a new class entry with the same name, but different content.
	pub fn with_data(self, data: Vec<u8>) -> ClassEntry {
		ClassEntry { data, ..self }
	}
}

#[derive(Debug, Clone)]
pub struct ResourceEntry {
	name: String,
	attrs: BasicFileAttributes,
	data: Vec<u8>,
}

impl ResourceEntry {
	pub fn new(name: impl Into<String>, attrs: BasicFileAttributes, data: Vec<u8>) -> ResourceEntry {
		ResourceEntry { name: name.into(), attrs, data }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn attrs(&self) -> BasicFileAttributes {
		self.attrs
	}

	pub fn data(&self) -> &[u8] {
		&self.data
	}
}

/// The `META-INF/MANIFEST.MF` file.
///
/// A manifest read from a jar keeps its bytes. A manifest created while transforming only gets written when the bytes
/// are first asked for.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
	attrs: BasicFileAttributes,
	manifest: Manifest,
	data: OnceLock<Vec<u8>>,
}

impl ManifestEntry {
	pub fn parse(attrs: BasicFileAttributes, data: Vec<u8>) -> Result<ManifestEntry> {
		let manifest = Manifest::parse(&data)
			.with_context(|| anyhow!("failed to parse {MANIFEST_NAME}"))?;
		Ok(ManifestEntry { attrs, manifest, data: OnceLock::from(data) })
	}

	pub fn new(attrs: BasicFileAttributes, manifest: Manifest) -> ManifestEntry {
		ManifestEntry { attrs, manifest, data: OnceLock::new() }
	}

	pub fn attrs(&self) -> BasicFileAttributes {
		self.attrs
	}

	pub fn manifest(&self) -> &Manifest {
		&self.manifest
	}

	pub fn data(&self) -> &[u8] {
		self.data.get_or_init(|| self.manifest.write())
	}
}

/// The `javadoctor.json` file, holding documentation for the classes of the jar.
#[derive(Debug, Clone)]
pub struct JavadoctorEntry {
	attrs: BasicFileAttributes,
	data: Vec<u8>,
}

impl JavadoctorEntry {
	pub fn new(attrs: BasicFileAttributes, data: Vec<u8>) -> JavadoctorEntry {
		JavadoctorEntry { attrs, data }
	}

	pub fn attrs(&self) -> BasicFileAttributes {
		self.attrs
	}

	pub fn data(&self) -> &[u8] {
		&self.data
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::entry::{BasicFileAttributes, ClassEntry, Entry};
	use crate::manifest::Manifest;

	#[test]
	fn class_entry_names() -> Result<()> {
		let attrs = BasicFileAttributes::default();

		let entry = ClassEntry::parse("net/Foo.class", attrs, vec![])?;
		assert_eq!(entry.class_name(), "net/Foo");
		assert_eq!(entry.release(), None);
		assert_eq!(entry.with_class("a", vec![]).name(), "a.class");

		let entry = ClassEntry::parse("META-INF/versions/9/net/Foo.class", attrs, vec![])?;
		assert_eq!(entry.class_name(), "net/Foo");
		assert_eq!(entry.release(), Some(9));
		assert_eq!(entry.with_class("a", vec![]).name(), "META-INF/versions/9/a.class");

		// the release is kept as written
		let entry = ClassEntry::parse("META-INF/versions/011/net/Foo.class", attrs, vec![])?;
		assert_eq!(entry.release(), Some(11));
		assert_eq!(entry.with_class("a", vec![]).name(), "META-INF/versions/011/a.class");
		Ok(())
	}

	#[test]
	fn bad_versioned_class_entries() {
		let attrs = BasicFileAttributes::default();
		assert!(ClassEntry::parse("META-INF/versions/9.class", attrs, vec![]).is_err());
		assert!(ClassEntry::parse("META-INF/versions/nine/net/Foo.class", attrs, vec![]).is_err());
		assert!(ClassEntry::parse("META-INF/versions/9/.class", attrs, vec![]).is_err());
	}

	#[test]
	fn kinds() -> Result<()> {
		let attrs = BasicFileAttributes::default();
		assert!(matches!(Entry::from_file("a.class", attrs, vec![])?, Entry::Class(_)));
		assert!(matches!(Entry::from_file("a.txt", attrs, vec![])?, Entry::Resource(_)));
		assert!(matches!(Entry::from_file("javadoctor.json", attrs, vec![])?, Entry::Javadoctor(_)));
		assert!(matches!(Entry::from_file("META-INF/MANIFEST.MF", attrs, b"Manifest-Version: 1.0\r\n".to_vec())?, Entry::Manifest(_)));
		Ok(())
	}

	#[test]
	fn manifest_bytes_are_kept() -> Result<()> {
		// not how it would be written again
		let data = b"Manifest-Version: 1.0\nCreated-By: hand\n\n".to_vec();
		let entry = Entry::from_file("META-INF/MANIFEST.MF", BasicFileAttributes::default(), data.clone())?;
		assert_eq!(entry.data(), &data[..]);

		let Entry::Manifest(entry) = entry else { unreachable!() };
		let created = super::ManifestEntry::new(entry.attrs(), Manifest::parse(&data)?);
		assert_eq!(created.data(), b"Manifest-Version: 1.0\r\nCreated-By: hand\r\n\r\n");
		Ok(())
	}
}
