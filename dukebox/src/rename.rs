//! Renaming everything in a jar according to mappings.

use std::sync::Arc;
use anyhow::{anyhow, Context, Result};
use dashmap::DashSet;
use indexmap::IndexMap;
use duke::remap::{remap_class, AbstractMethod, RemapPolicy};
use quill::hierarchy::HierarchyResolver;
use quill::mappings::Mappings;
use quill::remapper::{ARemapper, BRemapper, HierarchyRemapper};
use crate::entry::{BasicFileAttributes, ClassEntry, Entry, JavadoctorEntry, ManifestEntry, ResourceEntry};
use crate::javadoctor::JavadoctorInformation;
use crate::manifest::{Attributes, Manifest};
use crate::transform::{Transformer, TransformerFactory};

/// The resource listing the parameter names of abstract and native methods, which have no local variables to carry
/// them.
pub const ABSTRACT_PARAMETER_NAMES: &str = "fernflower_abstract_parameter_names.txt";

/// Collects the lines of [`ABSTRACT_PARAMETER_NAMES`] from many threads.
///
/// Each line is `<class> <method> <descriptor> <parameter names...>`, all of them mapped.
#[derive(Debug, Default)]
pub struct AbstractParameterNames {
	lines: DashSet<String>,
}

impl AbstractParameterNames {
	pub fn insert(&self, class: &str, method: &str, desc: &str, parameters: &[String]) {
		self.lines.insert(format!("{class} {method} {desc} {}", parameters.join(" ")));
	}

	pub fn len(&self) -> usize {
		self.lines.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lines.is_empty()
	}

	/// The content of the resource, with the lines sorted.
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut lines: Vec<String> = self.lines.iter().map(|line| line.key().clone()).collect();
		lines.sort();
		lines.join("\n").into_bytes()
	}
}

/// Renames classes, members and parameters in class files, and the references to classes in the manifest and
/// javadoctor documentation.
pub struct RenamingTransformer {
	remapper: HierarchyRemapper,
	abstract_parameter_names: Option<AbstractParameterNames>,
}

impl RenamingTransformer {
	/// Creates the transformer. Without `collect_abstract_parameter_names`, no [`ABSTRACT_PARAMETER_NAMES`] resource
	/// gets written (an existing one is still removed).
	pub fn new(remapper: HierarchyRemapper, collect_abstract_parameter_names: bool) -> RenamingTransformer {
		RenamingTransformer {
			remapper,
			abstract_parameter_names: collect_abstract_parameter_names.then(AbstractParameterNames::default),
		}
	}

	/// Creates the transformer for the class hierarchy of the jar being renamed.
	pub fn factory(mappings: Arc<Mappings>, collect_abstract_parameter_names: bool) -> TransformerFactory {
		Box::new(move |hierarchy: &Arc<HierarchyResolver>| -> Result<Box<dyn Transformer>> {
			let remapper = HierarchyRemapper::new(mappings, hierarchy.clone());
			Ok(Box::new(RenamingTransformer::new(remapper, collect_abstract_parameter_names)))
		})
	}

	pub fn remapper(&self) -> &HierarchyRemapper {
		&self.remapper
	}

	pub fn abstract_parameter_names(&self) -> Option<&AbstractParameterNames> {
		self.abstract_parameter_names.as_ref()
	}

	/// Maps a manifest section name, if it names a class (possibly of another release).
	fn map_manifest_section(&self, name: &str) -> Result<String> {
		let Ok(class) = ClassEntry::parse(name, BasicFileAttributes::default(), Vec::new()) else {
			return Ok(name.to_owned());
		};
		let class_name = self.remapper.map_class(class.class_name())?;
		Ok(class.with_class(&class_name, Vec::new()).name().to_owned())
	}
}

impl Transformer for RenamingTransformer {
	fn process_class(&self, entry: ClassEntry) -> Result<Option<ClassEntry>> {
		let policy = ClassPolicy {
			remapper: &self.remapper,
			abstract_parameter_names: self.abstract_parameter_names.as_ref(),
		};
		let data = remap_class(entry.data(), &policy)
			.with_context(|| anyhow!("failed to remap class {:?}", entry.class_name()))?;
		let class_name = self.remapper.map_class(entry.class_name())?;
		Ok(Some(entry.with_class(&class_name, data)))
	}

	fn process_resource(&self, entry: ResourceEntry) -> Result<Option<ResourceEntry>> {
		// always written again from the classes
		if entry.name() == ABSTRACT_PARAMETER_NAMES {
			return Ok(None);
		}
		Ok(Some(entry))
	}

	fn process_manifest(&self, entry: ManifestEntry) -> Result<Option<ManifestEntry>> {
		let mut changed = false;
		let mut sections = IndexMap::with_capacity(entry.manifest().sections.len());
		for (name, attributes) in &entry.manifest().sections {
			let mapped = self.map_manifest_section(name)?;
			changed |= mapped != *name;
			sections.entry(mapped)
				.or_insert_with(Attributes::new)
				.extend(attributes.clone());
		}

		if !changed {
			return Ok(Some(entry));
		}
		let manifest = Manifest { main: entry.manifest().main.clone(), sections };
		Ok(Some(ManifestEntry::new(entry.attrs(), manifest)))
	}

	fn process_javadoctor(&self, entry: JavadoctorEntry) -> Result<Option<JavadoctorEntry>> {
		let information: JavadoctorInformation = serde_json::from_slice(entry.data())
			.context("failed to parse javadoctor documentation")?;
		let information = information.remap(&self.remapper)?;
		let data = serde_json::to_vec(&information)
			.context("failed to write javadoctor documentation")?;
		Ok(Some(JavadoctorEntry::new(entry.attrs(), data)))
	}

	fn extras(&self) -> Result<Vec<Entry>> {
		let Some(names) = &self.abstract_parameter_names else {
			return Ok(Vec::new());
		};
		if names.is_empty() {
			return Ok(Vec::new());
		}
		let entry = ResourceEntry::new(ABSTRACT_PARAMETER_NAMES, BasicFileAttributes::stable()?, names.to_bytes());
		Ok(vec![Entry::Resource(entry)])
	}
}

/// What renaming a single class file needs.
struct ClassPolicy<'a> {
	remapper: &'a HierarchyRemapper,
	abstract_parameter_names: Option<&'a AbstractParameterNames>,
}

impl RemapPolicy for ClassPolicy<'_> {
	fn map_class(&self, name: &str) -> Result<String> {
		self.remapper.map_class(name)
	}

	fn map_desc(&self, desc: &str) -> Result<String> {
		self.remapper.map_desc(desc)
	}

	fn map_signature(&self, signature: &str) -> Result<String> {
		self.remapper.map_signature(signature)
	}

	fn map_field(&self, owner: &str, name: &str, desc: &str) -> Result<String> {
		self.remapper.map_field(owner, name, desc)
	}

	fn map_method(&self, owner: &str, name: &str, desc: &str) -> Result<String> {
		self.remapper.map_method(owner, name, desc)
	}

	fn map_parameter(&self, owner: &str, method: &str, desc: &str, lv_index: u16, name: &str) -> Result<String> {
		self.remapper.map_parameter(owner, method, desc, lv_index, name)
	}

	fn map_annotation_attribute(&self, annotation_desc: &str, name: &str) -> Result<String> {
		self.remapper.map_annotation_attribute(annotation_desc, name)
	}

	fn visit_abstract_method(&self, method: &AbstractMethod) -> Result<()> {
		let Some(names) = self.abstract_parameter_names else {
			return Ok(());
		};

		let mut any_known = false;
		let mut parameters = Vec::with_capacity(method.parameters.len());
		for (lv_index, name) in &method.parameters {
			let mapped = self.remapper.map_parameter_fail(method.owner, method.name, method.descriptor, *lv_index)?;
			let parameter = match (mapped, name) {
				(Some(mapped), _) => mapped,
				(None, Some(name)) => name.clone(),
				(None, None) => {
					parameters.push(format!("var{lv_index}"));
					continue;
				},
			};
			any_known = true;
			parameters.push(parameter);
		}

		if any_known {
			names.insert(
				&self.remapper.map_class(method.owner)?,
				&self.remapper.map_method(method.owner, method.name, method.descriptor)?,
				&self.remapper.map_desc(method.descriptor)?,
				&parameters,
			);
		}
		Ok(())
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::rename::AbstractParameterNames;

	#[test]
	fn abstract_parameter_names_are_sorted() {
		let names = AbstractParameterNames::default();
		names.insert("b", "run", "(I)V", &["count".to_owned()]);
		names.insert("a", "call", "(IJ)V", &["x".to_owned(), "var2".to_owned()]);
		names.insert("b", "run", "(I)V", &["count".to_owned()]);

		assert_eq!(names.len(), 2);
		assert_eq!(String::from_utf8_lossy(&names.to_bytes()), "a call (IJ)V x var2\nb run (I)V count");
	}
}
