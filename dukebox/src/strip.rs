//! Transformers that only look at a single entry: removing the signatures of a signed jar, and removing the `final`
//! flag of method parameters.

use std::str::FromStr;
use anyhow::{anyhow, bail, Context, Result};
use duke::parameters::remove_final_flags;
use crate::entry::{ClassEntry, ManifestEntry, ResourceEntry};
use crate::manifest::Manifest;
use crate::transform::Transformer;

const DIGEST_SUFFIX: &str = "-digest";
const SIGNATURE_FILE_SUFFIXES: [&str; 4] = [".SF", ".RSA", ".DSA", ".EC"];

/// What signatures to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripMode {
	/// Remove all signatures.
	All,
}

impl FromStr for StripMode {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<StripMode> {
		if s.eq_ignore_ascii_case("all") {
			Ok(StripMode::All)
		} else {
			bail!("unsupported signature stripping mode {s:?}, only `all` is supported")
		}
	}
}

/// Removes the signature files, and the digests of the entries from the manifest.
#[derive(Debug, Clone, Copy)]
pub struct SignatureStripper {
	mode: StripMode,
}

impl SignatureStripper {
	pub fn new(mode: StripMode) -> SignatureStripper {
		SignatureStripper { mode }
	}

	pub fn mode(&self) -> StripMode {
		self.mode
	}
}

/// Attributes like `SHA-256-Digest`. There must be something before the suffix.
fn is_digest_attribute(name: &str) -> bool {
	name.len() > DIGEST_SUFFIX.len() && name.get(name.len() - DIGEST_SUFFIX.len()..)
		.is_some_and(|suffix| suffix.eq_ignore_ascii_case(DIGEST_SUFFIX))
}

impl Transformer for SignatureStripper {
	fn process_resource(&self, entry: ResourceEntry) -> Result<Option<ResourceEntry>> {
		let is_signature = entry.name().starts_with("META-INF/") &&
			SIGNATURE_FILE_SUFFIXES.iter().any(|suffix| entry.name().ends_with(suffix));
		Ok(Some(entry).filter(|_| !is_signature))
	}

	fn process_manifest(&self, entry: ManifestEntry) -> Result<Option<ManifestEntry>> {
		let mut sections = entry.manifest().sections.clone();
		let mut changed = false;
		sections.retain(|_, attributes| {
			let before = attributes.len();
			attributes.retain(|name, _| !is_digest_attribute(name));
			if attributes.len() == before {
				return true;
			}
			changed = true;
			!attributes.is_empty()
		});

		if !changed {
			return Ok(Some(entry));
		}
		let manifest = Manifest { main: entry.manifest().main.clone(), sections };
		Ok(Some(ManifestEntry::new(entry.attrs(), manifest)))
	}
}

/// Clears the `final` flag of method parameters, as given in the `MethodParameters` attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterFinalFlagRemover;

impl Transformer for ParameterFinalFlagRemover {
	fn process_class(&self, entry: ClassEntry) -> Result<Option<ClassEntry>> {
		let changed = remove_final_flags(entry.data())
			.with_context(|| anyhow!("failed to remove final flags of parameters of {:?}", entry.class_name()))?;
		Ok(Some(match changed {
			Some(data) => entry.with_data(data),
			None => entry,
		}))
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::entry::{BasicFileAttributes, Entry};
	use crate::strip::{is_digest_attribute, SignatureStripper, StripMode};
	use crate::transform::Transformer;

	#[test]
	fn modes() -> Result<()> {
		assert_eq!("all".parse::<StripMode>()?, StripMode::All);
		assert_eq!("ALL".parse::<StripMode>()?, StripMode::All);
		assert!("manifest".parse::<StripMode>().is_err());
		Ok(())
	}

	#[test]
	fn digest_attributes() {
		assert!(is_digest_attribute("SHA-256-Digest"));
		assert!(is_digest_attribute("md5-DIGEST"));
		assert!(!is_digest_attribute("-Digest"));
		assert!(!is_digest_attribute("Digest-Manifest"));
	}

	#[test]
	fn signature_files() -> Result<()> {
		let stripper = SignatureStripper::new(StripMode::All);
		let attrs = BasicFileAttributes::default();
		for (name, kept) in [
			("META-INF/FOO.SF", false),
			("META-INF/FOO.RSA", false),
			("META-INF/FOO.DSA", false),
			("META-INF/FOO.EC", false),
			("META-INF/services/a.b.C", true),
			("FOO.SF", true),
		] {
			let entry = Entry::from_file(name, attrs, vec![])?;
			assert_eq!(entry.process(&stripper)?.is_some(), kept, "{name}");
		}
		Ok(())
	}

	#[test]
	fn manifest_digests() -> Result<()> {
		let stripper = SignatureStripper::new(StripMode::All);
		let data = b"Manifest-Version: 1.0\r\nMain-Digest: x\r\n\r\nName: a.class\r\nSHA-256-Digest: abc\r\n\r\nName: b.class\r\nSHA-256-Digest: abc\r\nX: y\r\n\r\n";
		let entry = Entry::from_file("META-INF/MANIFEST.MF", BasicFileAttributes::default(), data.to_vec())?;

		let Some(Entry::Manifest(entry)) = entry.process(&stripper)? else {
			panic!("manifest must be kept");
		};
		let manifest = entry.manifest();
		// only the sections of the entries are looked at
		assert_eq!(manifest.main.get("Main-Digest").map(String::as_str), Some("x"));
		assert_eq!(manifest.sections.keys().collect::<Vec<_>>(), ["b.class"]);
		assert_eq!(manifest.sections["b.class"].keys().collect::<Vec<_>>(), ["X"]);

		// nothing more to remove, so the very same bytes come out
		let again = Entry::Manifest(entry.clone()).process(&stripper)?;
		assert_eq!(again.as_ref().map(Entry::data), Some(entry.data()));
		Ok(())
	}
}
