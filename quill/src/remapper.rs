//! The remapper traits, and the remapper taking the class hierarchy into account.
//!
//! An [`ARemapper`] only knows about classes, so it can map descriptors and signatures. A [`BRemapper`] knows about
//! fields, methods and parameters as well.

use std::sync::Arc;
use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexSet;
use duke::descriptor;
use crate::hierarchy::HierarchyResolver;
use crate::mappings::{distinct_descs, MethodMapping, Mappings};

pub trait ARemapper {
	/// Gives the new name of a class, or `None` if it has none.
	fn map_class_fail(&self, class: &str) -> Result<Option<String>>;

	/// Gives the new name of a class, or the class name itself if it has none.
	///
	/// Inner classes are looked up on their own: `a$b` keeps its name unless the mappings name it, even if `a` is
	/// renamed.
	fn map_class(&self, class: &str) -> Result<String> {
		Ok(self.map_class_fail(class)?.unwrap_or_else(|| class.to_owned()))
	}

	/// Maps either a class name or an array descriptor, as can be found in `CONSTANT_Class` entries.
	fn map_class_any(&self, class: &str) -> Result<String> {
		if class.starts_with('[') {
			self.map_desc(class)
		} else {
			self.map_class(class)
		}
	}

	/// Maps all class names in a field or method descriptor.
	fn map_desc(&self, desc: &str) -> Result<String> {
		let mut s = String::with_capacity(desc.len());
		let mut chars = desc.chars();

		while let Some(c) = chars.next() {
			s.push(c);

			if c == 'L' {
				let mut class_name = String::new();
				loop {
					match chars.next() {
						Some(';') => break,
						Some(c) => class_name.push(c),
						None => bail!("class name in descriptor {desc:?} must end with a `;`"),
					}
				}

				s.push_str(&self.map_class(&class_name)?);
				s.push(';');
			}
		}

		Ok(s)
	}

	/// Maps all class names in a generic signature.
	fn map_signature(&self, signature: &str) -> Result<String> {
		crate::signature::map_signature(self, signature)
	}
}

pub trait BRemapper: ARemapper {
	fn map_field_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>>;

	fn map_field(&self, owner: &str, name: &str, desc: &str) -> Result<String> {
		Ok(self.map_field_fail(owner, name, desc)?.unwrap_or_else(|| name.to_owned()))
	}

	fn map_method_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>>;

	fn map_method(&self, owner: &str, name: &str, desc: &str) -> Result<String> {
		Ok(self.map_method_fail(owner, name, desc)?.unwrap_or_else(|| name.to_owned()))
	}

	/// Gives the new name of a parameter, by its local variable index.
	fn map_parameter_fail(&self, owner: &str, method: &str, desc: &str, lv_index: u16) -> Result<Option<String>>;

	fn map_parameter(&self, owner: &str, method: &str, desc: &str, lv_index: u16, name: &str) -> Result<String> {
		Ok(self.map_parameter_fail(owner, method, desc, lv_index)?.unwrap_or_else(|| name.to_owned()))
	}
}

/// Remaps using [`Mappings`], looking up inherited methods in the class hierarchy.
///
/// Method references often name a subclass of the class declaring the method. A method with no mapping on its owner
/// takes the mapping of the first ancestor declaring it: first the super classes up the chain, then the interfaces,
/// breadth first. Private methods and constructors are never inherited.
///
/// Fields are only looked up on their owner.
#[derive(Clone)]
pub struct HierarchyRemapper {
	mappings: Arc<Mappings>,
	hierarchy: Arc<HierarchyResolver>,
}

impl HierarchyRemapper {
	pub fn new(mappings: Arc<Mappings>, hierarchy: Arc<HierarchyResolver>) -> HierarchyRemapper {
		HierarchyRemapper { mappings, hierarchy }
	}

	pub fn mappings(&self) -> &Mappings {
		&self.mappings
	}

	pub fn hierarchy(&self) -> &HierarchyResolver {
		&self.hierarchy
	}

	/// Finds the mapping of the method, on the owner or the ancestor it's inherited from.
	fn find_method(&self, owner: &str, name: &str, desc: &str) -> Result<Option<&MethodMapping>> {
		if name == "<init>" || name == "<clinit>" {
			return Ok(None);
		}

		if let Some(method) = self.mappings.get_class(owner).and_then(|class| class.get_method(name, desc)) {
			return Ok(Some(method));
		}

		if let Some(info) = self.hierarchy.lookup(owner)? {
			if info.get_method(name, desc).is_some_and(|method| method.is_private()) {
				return Ok(None);
			}
		}

		for ancestor in self.hierarchy.ancestors(owner)?.iter() {
			let Some(method) = self.mappings.get_class(ancestor).and_then(|class| class.get_method(name, desc)) else {
				continue;
			};
			// without knowing the class, trust the mappings
			let inherited = match self.hierarchy.lookup(ancestor)? {
				Some(info) => info.get_method(name, desc).is_some_and(|method| !method.is_private()),
				None => true,
			};
			if inherited {
				return Ok(Some(method));
			}
		}

		Ok(None)
	}

	/// Maps a field known only by its name, as in documentation links.
	///
	/// Gives `None` if no field of that name has a mapping, or if fields with different descriptors are mapped
	/// differently.
	pub fn map_field_by_name(&self, owner: &str, name: &str) -> Result<Option<String>> {
		let Some(class) = self.mappings.get_class(owner) else {
			return Ok(None);
		};
		let names: IndexSet<&str> = class.fields_named(name).map(|(_, dst)| dst.as_str()).collect();
		Ok(match names.len() {
			1 => names.first().map(|&name| name.to_owned()),
			_ => None,
		})
	}

	/// Maps a method known only by its name and number of arguments, as in documentation links.
	///
	/// All methods of the owner and its ancestors with that name and number of arguments are collected. If they all
	/// have the same descriptor, that method is mapped. Otherwise, or if there's no such method, gives `None`.
	pub fn map_doc_reference_member(&self, owner: &str, member: &str, argument_count: usize) -> Result<Option<String>> {
		let matches_count = |desc: &str| -> Result<bool> {
			Ok(descriptor::parameter_types(desc)
				.with_context(|| anyhow!("in method {owner:?} {member:?} {desc:?}"))?
				.len() == argument_count)
		};

		let mut descs: IndexSet<String> = IndexSet::new();
		let ancestors = self.hierarchy.ancestors(owner)?;
		for class in std::iter::once(owner).chain(ancestors.iter().map(String::as_str)) {
			if let Some(info) = self.hierarchy.lookup(class)? {
				for method in &info.methods {
					// private methods are only visible from their own class
					if method.name == member && (class == owner || !method.is_private()) && matches_count(&method.descriptor)? {
						descs.insert(method.descriptor.clone());
					}
				}
			}
			if let Some(mapping) = self.mappings.get_class(class) {
				for desc in distinct_descs(mapping.methods_named(member).map(|(key, _)| key)) {
					if matches_count(desc)? {
						descs.insert(desc.to_owned());
					}
				}
			}
		}

		match descs.len() {
			1 => descs.first()
				.map(|desc| self.map_method(owner, member, desc))
				.transpose(),
			_ => Ok(None),
		}
	}

	/// Maps the name of an element of an annotation, which is a method without arguments of the annotation class.
	pub fn map_annotation_attribute(&self, annotation_desc: &str, name: &str) -> Result<String> {
		let Some(class) = descriptor::object_type_name(annotation_desc) else {
			return Ok(name.to_owned());
		};
		let Some(mapping) = self.mappings.get_class(class) else {
			return Ok(name.to_owned());
		};
		let names: IndexSet<&str> = mapping.methods_named(name)
			.filter(|(key, _)| key.desc.starts_with("()"))
			.map(|(_, method)| method.dst.as_str())
			.collect();
		Ok(match names.first() {
			Some(&dst) if names.len() == 1 => dst.to_owned(),
			_ => name.to_owned(),
		})
	}
}

impl ARemapper for HierarchyRemapper {
	fn map_class_fail(&self, class: &str) -> Result<Option<String>> {
		self.mappings.map_class_fail(class)
	}
}

impl BRemapper for HierarchyRemapper {
	fn map_field_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>> {
		Ok(self.mappings.get_class(owner)
			.and_then(|class| class.get_field(name, desc))
			.map(str::to_owned))
	}

	fn map_method_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>> {
		Ok(self.find_method(owner, name, desc)?.map(|method| method.dst.clone()))
	}

	fn map_parameter_fail(&self, owner: &str, method: &str, desc: &str, lv_index: u16) -> Result<Option<String>> {
		Ok(self.find_method(owner, method, desc)?
			.and_then(|method| method.parameters.get(&lv_index))
			.cloned())
	}
}
