//! Renaming the classes, fields, methods and parameters a class file declares or references.
//!
//! The new names come from a [`RemapPolicy`]. Existing constant pool entries are never renumbered: entries referencing
//! renamed things get pointed at newly appended entries instead. This means remapping with a policy that doesn't
//! rename anything produces the exact same bytes again.

mod attribute;

use anyhow::{anyhow, bail, Context, Result};
use crate::class_file::{Attribute, ClassFile, Member};
use crate::{descriptor, flags, ClassRead};
use crate::pool::{Pool, PoolEntry};

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

/// Answers what the new name of a class or member is.
///
/// All names given in are the names found in the class file that gets remapped. Class names are internal names,
/// like `java/lang/Object`.
pub trait RemapPolicy {
	/// Maps a class name. Array class names are never passed in here, they go through [`RemapPolicy::map_desc`].
	fn map_class(&self, name: &str) -> Result<String>;

	/// Maps a field, method or return descriptor.
	fn map_desc(&self, desc: &str) -> Result<String>;

	/// Maps a generic signature of a class, field, method or local variable.
	fn map_signature(&self, signature: &str) -> Result<String>;

	/// Gives the new name of a field. The owner is the class that is referenced, not necessarily the declaring one.
	fn map_field(&self, owner: &str, name: &str, desc: &str) -> Result<String>;

	/// Gives the new name of a method. The owner is the class that is referenced, not necessarily the declaring one.
	fn map_method(&self, owner: &str, name: &str, desc: &str) -> Result<String>;

	/// Gives the new name of a method parameter, identified by its local variable index.
	fn map_parameter(&self, owner: &str, method: &str, desc: &str, lv_index: u16, name: &str) -> Result<String> {
		let _ = (owner, method, desc, lv_index);
		Ok(name.to_owned())
	}

	/// Gives the new name of an element of an annotation, `annotation_desc` being the descriptor of the annotation type.
	fn map_annotation_attribute(&self, annotation_desc: &str, name: &str) -> Result<String> {
		let _ = annotation_desc;
		Ok(name.to_owned())
	}

	/// Called for every abstract or native method, before it's renamed.
	fn visit_abstract_method(&self, method: &AbstractMethod) -> Result<()> {
		let _ = method;
		Ok(())
	}
}

/// An abstract or native method, as found in the class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractMethod<'a> {
	pub owner: &'a str,
	pub name: &'a str,
	pub descriptor: &'a str,
	pub access: u16,
	/// The local variable index of each parameter, together with the name the `MethodParameters` attribute gives it.
	pub parameters: Vec<(u16, Option<String>)>,
}

/// Renames everything in the class file according to the policy, giving back the new class file.
pub fn remap_class(data: &[u8], policy: &(impl RemapPolicy + ?Sized)) -> Result<Vec<u8>> {
	let mut class = ClassFile::read(data).context("failed to read class file")?;
	let owner = class.name()?;

	let ClassFile { pool, fields, methods, attributes, .. } = &mut class;
	let mut remapper = Remapper {
		pool,
		policy,
		owner: &owner,
		pool_updates: Vec::new(),
	};

	let bootstrap_methods = remapper.read_bootstrap_methods(attributes)?;
	remapper.remap_pool(&bootstrap_methods)?;

	for field in fields.iter_mut() {
		remapper.remap_field(field)
			.with_context(|| anyhow!("failed to remap field of class {owner:?}"))?;
	}
	for method in methods.iter_mut() {
		remapper.remap_method(method)
			.with_context(|| anyhow!("failed to remap method of class {owner:?}"))?;
	}
	remapper.remap_attributes(attributes, None)
		.with_context(|| anyhow!("failed to remap attributes of class {owner:?}"))?;

	remapper.apply_pool_updates()?;

	class.write()
}

struct BootstrapMethod {
	method_ref: u16,
	arguments: Vec<u16>,
}

/// The name and descriptor of the method currently being remapped, before remapping.
struct MethodContext {
	name: String,
	desc: String,
	lv_indices: Vec<u16>,
}

struct Remapper<'a, P: ?Sized> {
	pool: &'a mut Pool,
	policy: &'a P,
	owner: &'a str,
	/// Replacements for existing entries. These are applied at the very end, so that all lookups see the old names.
	pool_updates: Vec<(u16, PoolEntry)>,
}

impl<P: RemapPolicy + ?Sized> Remapper<'_, P> {
	fn utf8(&self, index: u16) -> Result<String> {
		self.pool.get_utf8(index)
	}

	/// Gives the index of an `Utf8` entry containing `new`, which is `index` itself if that one already contains it.
	fn replace_utf8(&mut self, index: u16, new: &str) -> Result<u16> {
		if self.pool.get_utf8(index)? == new {
			Ok(index)
		} else {
			self.pool.put_utf8(new)
		}
	}

	fn replace_name_and_type(&mut self, index: u16, old: (&str, &str), new: (&str, &str)) -> Result<u16> {
		if old == new {
			Ok(index)
		} else {
			self.pool.put_name_and_type(new.0, new.1)
		}
	}

	/// Maps any class name, including array class names.
	fn map_class(&self, name: &str) -> Result<String> {
		if name.starts_with('[') {
			self.policy.map_desc(name)
		} else {
			self.policy.map_class(name)
		}
	}

	fn read_bootstrap_methods(&self, attributes: &[Attribute]) -> Result<Vec<BootstrapMethod>> {
		for attribute in attributes {
			if self.utf8(attribute.name_index)? == "BootstrapMethods" {
				let reader = &mut attribute.info.as_slice();
				return reader.read_vec(
					|r| r.read_u16_as_usize(),
					|r| Ok(BootstrapMethod {
						method_ref: r.read_u16()?,
						arguments: r.read_vec(|r| r.read_u16_as_usize(), |r| r.read_u16())?,
					}),
				).context("failed to read `BootstrapMethods` attribute");
			}
		}
		Ok(Vec::new())
	}

	fn remap_pool(&mut self, bootstrap_methods: &[BootstrapMethod]) -> Result<()> {
		let indices: Vec<u16> = self.pool.indices().collect();
		for index in indices {
			let update = self.remap_pool_entry(index, bootstrap_methods)
				.with_context(|| anyhow!("failed to remap constant pool entry {index}"))?;
			if let Some(entry) = update {
				self.pool_updates.push((index, entry));
			}
		}
		Ok(())
	}

	fn remap_pool_entry(&mut self, index: u16, bootstrap_methods: &[BootstrapMethod]) -> Result<Option<PoolEntry>> {
		Ok(match self.pool.get(index)?.clone() {
			PoolEntry::Class { name_index } => {
				let name = self.utf8(name_index)?;
				let new_name = self.map_class(&name)?;
				let new_index = self.replace_utf8(name_index, &new_name)?;
				(new_index != name_index).then_some(PoolEntry::Class { name_index: new_index })
			},
			PoolEntry::FieldRef { class_index, name_and_type_index } => {
				let (owner, name, desc) = self.pool.get_member_ref(index)?;
				let new_name = self.policy.map_field(&owner, &name, &desc)?;
				let new_desc = self.policy.map_desc(&desc)?;
				let new_index = self.replace_name_and_type(name_and_type_index, (&name, &desc), (&new_name, &new_desc))?;
				(new_index != name_and_type_index).then_some(PoolEntry::FieldRef { class_index, name_and_type_index: new_index })
			},
			PoolEntry::MethodRef { class_index, name_and_type_index } => {
				let new_index = self.remap_method_ref(index, name_and_type_index)?;
				(new_index != name_and_type_index).then_some(PoolEntry::MethodRef { class_index, name_and_type_index: new_index })
			},
			PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } => {
				let new_index = self.remap_method_ref(index, name_and_type_index)?;
				(new_index != name_and_type_index).then_some(PoolEntry::InterfaceMethodRef { class_index, name_and_type_index: new_index })
			},
			PoolEntry::MethodType { descriptor_index } => {
				let desc = self.utf8(descriptor_index)?;
				let new_desc = self.policy.map_desc(&desc)?;
				let new_index = self.replace_utf8(descriptor_index, &new_desc)?;
				(new_index != descriptor_index).then_some(PoolEntry::MethodType { descriptor_index: new_index })
			},
			PoolEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => {
				let (name, desc) = self.pool.get_name_and_type(name_and_type_index)?;
				let bootstrap_method = bootstrap_methods.get(bootstrap_method_attr_index as usize)
					.with_context(|| anyhow!("invalid bootstrap method index {bootstrap_method_attr_index}"))?;

				let new_name = self.map_lambda_name(bootstrap_method, &name, &desc)?.unwrap_or_else(|| name.clone());
				let new_desc = self.policy.map_desc(&desc)?;
				let new_index = self.replace_name_and_type(name_and_type_index, (&name, &desc), (&new_name, &new_desc))?;
				(new_index != name_and_type_index).then_some(PoolEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index: new_index })
			},
			PoolEntry::Dynamic { bootstrap_method_attr_index, name_and_type_index } => {
				let (name, desc) = self.pool.get_name_and_type(name_and_type_index)?;
				let new_desc = self.policy.map_desc(&desc)?;
				let new_index = self.replace_name_and_type(name_and_type_index, (&name, &desc), (&name, &new_desc))?;
				(new_index != name_and_type_index).then_some(PoolEntry::Dynamic { bootstrap_method_attr_index, name_and_type_index: new_index })
			},
			_ => None,
		})
	}

	fn remap_method_ref(&mut self, index: u16, name_and_type_index: u16) -> Result<u16> {
		let (owner, name, desc) = self.pool.get_member_ref(index)?;
		// methods on arrays are the ones of `java/lang/Object`
		let new_name = if owner.starts_with('[') {
			name.clone()
		} else {
			self.policy.map_method(&owner, &name, &desc)?
		};
		let new_desc = self.policy.map_desc(&desc)?;
		self.replace_name_and_type(name_and_type_index, (&name, &desc), (&new_name, &new_desc))
	}

	/// For an `invokedynamic` creating a lambda, gives the name of the implemented interface method.
	fn map_lambda_name(&self, bootstrap_method: &BootstrapMethod, name: &str, desc: &str) -> Result<Option<String>> {
		let &PoolEntry::MethodHandle { reference_index, .. } = self.pool.get(bootstrap_method.method_ref)? else {
			bail!("bootstrap method {} isn't a `MethodHandle`", bootstrap_method.method_ref);
		};
		let (bootstrap_owner, bootstrap_name, _) = self.pool.get_member_ref(reference_index)?;
		if bootstrap_owner != LAMBDA_METAFACTORY || !(bootstrap_name == "metafactory" || bootstrap_name == "altMetafactory") {
			return Ok(None);
		}

		let Some(interface) = descriptor::object_type_name(descriptor::return_type(desc)?) else {
			return Ok(None);
		};
		let Some(&first_argument) = bootstrap_method.arguments.first() else {
			return Ok(None);
		};
		let &PoolEntry::MethodType { descriptor_index } = self.pool.get(first_argument)? else {
			return Ok(None);
		};
		let interface_method_desc = self.utf8(descriptor_index)?;

		self.policy.map_method(interface, name, &interface_method_desc).map(Some)
	}

	fn remap_field(&mut self, field: &mut Member) -> Result<()> {
		let name = self.utf8(field.name_index)?;
		let desc = self.utf8(field.descriptor_index)?;

		let new_name = self.policy.map_field(self.owner, &name, &desc)?;
		let new_desc = self.policy.map_desc(&desc)?;
		field.name_index = self.replace_utf8(field.name_index, &new_name)?;
		field.descriptor_index = self.replace_utf8(field.descriptor_index, &new_desc)?;

		self.remap_attributes(&mut field.attributes, None)
			.with_context(|| anyhow!("in field {name:?} {desc:?}"))
	}

	fn remap_method(&mut self, method: &mut Member) -> Result<()> {
		let name = self.utf8(method.name_index)?;
		let desc = self.utf8(method.descriptor_index)?;
		let is_static = method.access_flags & flags::ACC_STATIC != 0;
		let lv_indices = descriptor::parameter_lv_indices(&desc, is_static)?;
		let context = MethodContext { name, desc, lv_indices };

		if method.access_flags & (flags::ACC_ABSTRACT | flags::ACC_NATIVE) != 0 {
			let mut names = self.method_parameter_names(&method.attributes, &context)?.into_iter();
			let parameters = context.lv_indices.iter()
				.map(|&lv_index| (lv_index, names.next().flatten()))
				.collect();
			self.policy.visit_abstract_method(&AbstractMethod {
				owner: self.owner,
				name: &context.name,
				descriptor: &context.desc,
				access: method.access_flags,
				parameters,
			})?;
		}

		let new_name = self.policy.map_method(self.owner, &context.name, &context.desc)?;
		let new_desc = self.policy.map_desc(&context.desc)?;
		method.name_index = self.replace_utf8(method.name_index, &new_name)?;
		method.descriptor_index = self.replace_utf8(method.descriptor_index, &new_desc)?;

		self.remap_attributes(&mut method.attributes, Some(&context))
			.with_context(|| anyhow!("in method {:?} {:?}", context.name, context.desc))
	}

	/// Computes the new simple name of an inner class, given its full name and old simple name.
	fn map_inner_name(&self, inner: &str, inner_name: &str) -> Result<String> {
		let new_inner = self.map_class(inner)?;
		if new_inner == inner {
			return Ok(inner_name.to_owned());
		}
		if let (Some((_, old_simple)), Some((_, new_simple))) = (inner.rsplit_once('/'), new_inner.rsplit_once('/')) {
			if old_simple == new_simple {
				return Ok(inner_name.to_owned());
			}
		}
		Ok(match new_inner.rsplit_once('$') {
			Some((_, simple)) => simple.trim_start_matches(|c: char| c.is_ascii_digit()).to_owned(),
			None => inner_name.to_owned(),
		})
	}

	fn apply_pool_updates(self) -> Result<()> {
		for (index, entry) in self.pool_updates {
			self.pool.set(index, entry)?;
		}
		Ok(())
	}
}
