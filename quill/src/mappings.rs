//! The mapping table: which class, field, method and parameter gets which new name.
//!
//! A [`Mappings`] can only be created through a [`MappingsBuilder`], which rejects tables where two things would end
//! up with the same name.

use std::hash::Hash;
use anyhow::{anyhow, bail, Context, Result};
use indexmap::{IndexMap, IndexSet};
use crate::remapper::ARemapper;

/// A field or method key, a name together with a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
	pub name: String,
	pub desc: String,
}

/// Borrowed version of [`MemberKey`], for lookups without allocating.
///
/// The derived [`Hash`] matches the one of [`MemberKey`], since `&str` and `String` hash the same.
#[derive(Debug, Hash)]
struct MemberKeyRef<'a> {
	name: &'a str,
	desc: &'a str,
}

impl indexmap::Equivalent<MemberKey> for MemberKeyRef<'_> {
	fn equivalent(&self, key: &MemberKey) -> bool {
		self.name == key.name && self.desc == key.desc
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMapping {
	pub dst: String,
	/// Parameter names, keyed by local variable index.
	pub parameters: IndexMap<u16, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
	pub src: String,
	pub dst: String,
	pub fields: IndexMap<MemberKey, String>,
	pub methods: IndexMap<MemberKey, MethodMapping>,
}

impl ClassMapping {
	fn new(src: &str, dst: &str) -> ClassMapping {
		ClassMapping {
			src: src.to_owned(),
			dst: dst.to_owned(),
			fields: IndexMap::new(),
			methods: IndexMap::new(),
		}
	}

	pub fn get_field(&self, name: &str, desc: &str) -> Option<&str> {
		self.fields.get(&MemberKeyRef { name, desc }).map(String::as_str)
	}

	pub fn get_method(&self, name: &str, desc: &str) -> Option<&MethodMapping> {
		self.methods.get(&MemberKeyRef { name, desc })
	}

	/// All fields with the given name, with any descriptor.
	pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item=(&'a MemberKey, &'a String)> + 'a {
		self.fields.iter().filter(move |(key, _)| key.name == name)
	}

	/// All methods with the given name, with any descriptor.
	pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item=(&'a MemberKey, &'a MethodMapping)> + 'a {
		self.methods.iter().filter(move |(key, _)| key.name == name)
	}
}

/// The mapping table, keyed by the old class names. Member descriptors use the old class names as well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mappings {
	classes: IndexMap<String, ClassMapping>,
}

impl Mappings {
	pub fn get_class(&self, src: &str) -> Option<&ClassMapping> {
		self.classes.get(src)
	}

	pub fn classes(&self) -> impl Iterator<Item=&ClassMapping> {
		self.classes.values()
	}

	pub fn len(&self) -> usize {
		self.classes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.classes.is_empty()
	}

	/// Swaps old and new names, giving the mappings for going back.
	pub fn reverse(&self) -> Result<Mappings> {
		let mut builder = MappingsBuilder::new();
		for class in self.classes.values() {
			builder.add_class(&class.dst, &class.src)?;

			for (key, dst) in &class.fields {
				let desc = self.map_desc(&key.desc)?;
				builder.add_field(&class.dst, dst, &desc, &key.name)?;
			}

			for (key, method) in &class.methods {
				let desc = self.map_desc(&key.desc)?;
				// parameters only store the new name, so they're dropped
				builder.add_method(&class.dst, &method.dst, &desc, &key.name)?;
			}
		}
		builder.build().context("failed to reverse mappings")
	}
}

impl ARemapper for Mappings {
	fn map_class_fail(&self, class: &str) -> Result<Option<String>> {
		Ok(self.classes.get(class).map(|class| class.dst.clone()))
	}
}

#[derive(Debug, Default)]
pub struct MappingsBuilder {
	classes: IndexMap<String, ClassMapping>,
}

impl MappingsBuilder {
	pub fn new() -> MappingsBuilder {
		MappingsBuilder::default()
	}

	fn class_entry(&mut self, src: &str) -> &mut ClassMapping {
		self.classes.entry(src.to_owned())
			.or_insert_with(|| ClassMapping::new(src, src))
	}

	/// Adds a class mapping. Adding the same mapping twice is fine, but adding another target for a class isn't.
	pub fn add_class(&mut self, src: &str, dst: &str) -> Result<()> {
		match self.classes.get_mut(src) {
			// created through a member, without a target yet
			Some(class) if class.dst == class.src => class.dst = dst.to_owned(),
			Some(class) if class.dst == dst => {},
			Some(class) => bail!("conflicting mappings for class {src:?}: {:?} and {dst:?}", class.dst),
			None => {
				self.classes.insert(src.to_owned(), ClassMapping::new(src, dst));
			},
		}
		Ok(())
	}

	pub fn add_field(&mut self, owner: &str, name: &str, desc: &str, dst: &str) -> Result<()> {
		let class = self.class_entry(owner);
		let key = MemberKey { name: name.to_owned(), desc: desc.to_owned() };
		match class.fields.get(&key) {
			Some(existing) if existing != dst => bail!("conflicting mappings for field {owner:?} {name:?} {desc:?}: {existing:?} and {dst:?}"),
			Some(_) => {},
			None => {
				class.fields.insert(key, dst.to_owned());
			},
		}
		Ok(())
	}

	pub fn add_method(&mut self, owner: &str, name: &str, desc: &str, dst: &str) -> Result<()> {
		let class = self.class_entry(owner);
		let key = MemberKey { name: name.to_owned(), desc: desc.to_owned() };
		match class.methods.get_mut(&key) {
			Some(existing) if existing.dst == name && dst != name => existing.dst = dst.to_owned(),
			Some(existing) if existing.dst != dst && dst != name => {
				bail!("conflicting mappings for method {owner:?} {name:?} {desc:?}: {:?} and {dst:?}", existing.dst)
			},
			Some(_) => {},
			None => {
				class.methods.insert(key, MethodMapping { dst: dst.to_owned(), parameters: IndexMap::new() });
			},
		}
		Ok(())
	}

	/// Adds a parameter name. If the method has no mapping yet, it's added with its own name.
	pub fn add_parameter(&mut self, owner: &str, method: &str, desc: &str, lv_index: u16, dst: &str) -> Result<()> {
		let class = self.class_entry(owner);
		let key = MemberKey { name: method.to_owned(), desc: desc.to_owned() };
		let method_mapping = class.methods.entry(key)
			.or_insert_with(|| MethodMapping { dst: method.to_owned(), parameters: IndexMap::new() });
		match method_mapping.parameters.get(&lv_index) {
			Some(existing) if existing != dst => {
				bail!("conflicting mappings for parameter {lv_index} of method {owner:?} {method:?} {desc:?}: {existing:?} and {dst:?}")
			},
			Some(_) => {},
			None => {
				method_mapping.parameters.insert(lv_index, dst.to_owned());
			},
		}
		Ok(())
	}

	/// Checks that no two things get the same new name, and creates the mappings.
	pub fn build(self) -> Result<Mappings> {
		let mappings = Mappings { classes: self.classes };

		check_unique(mappings.classes.values().map(|class| (&class.dst, &class.src)))
			.context("two classes are mapped to the same name")?;

		for class in mappings.classes.values() {
			let fields = class.fields.iter()
				.map(|(key, dst)| Ok(((dst.clone(), mappings.map_desc(&key.desc)?), key)))
				.collect::<Result<Vec<_>>>()?;
			check_unique(fields.iter().map(|(target, key)| (target, *key)))
				.with_context(|| anyhow!("two fields of class {:?} are mapped to the same name", class.src))?;

			let methods = class.methods.iter()
				.map(|(key, method)| Ok(((method.dst.clone(), mappings.map_desc(&key.desc)?), key)))
				.collect::<Result<Vec<_>>>()?;
			check_unique(methods.iter().map(|(target, key)| (target, *key)))
				.with_context(|| anyhow!("two methods of class {:?} are mapped to the same name", class.src))?;

			for (key, method) in &class.methods {
				check_unique(method.parameters.iter().map(|(lv_index, name)| (name, lv_index)))
					.with_context(|| anyhow!("two parameters of method {:?} {:?} {:?} are mapped to the same name", class.src, key.name, key.desc))?;
			}
		}

		Ok(mappings)
	}
}

/// Fails if any target appears twice, naming the two sources.
fn check_unique<'a, T, S>(pairs: impl Iterator<Item=(&'a T, &'a S)>) -> Result<()>
where
	T: Hash + Eq + std::fmt::Debug + 'a,
	S: std::fmt::Debug + 'a,
{
	let mut seen: IndexMap<&T, &S> = IndexMap::new();
	for (target, source) in pairs {
		if let Some(other) = seen.insert(target, source) {
			bail!("{other:?} and {source:?} both map to {target:?}");
		}
	}
	Ok(())
}

/// All distinct descriptors among the given members.
pub(crate) fn distinct_descs<'a>(keys: impl Iterator<Item=&'a MemberKey>) -> IndexSet<&'a str> {
	keys.map(|key| key.desc.as_str()).collect()
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::mappings::MappingsBuilder;

	#[test]
	fn lookups() -> Result<()> {
		let mut builder = MappingsBuilder::new();
		builder.add_class("a", "net/Foo")?;
		builder.add_field("a", "b", "I", "count")?;
		builder.add_method("a", "c", "(La;)V", "accept")?;
		builder.add_parameter("a", "c", "(La;)V", 1, "other")?;
		let mappings = builder.build()?;

		let class = mappings.get_class("a").expect("class a");
		assert_eq!(class.dst, "net/Foo");
		assert_eq!(class.get_field("b", "I"), Some("count"));
		assert_eq!(class.get_field("b", "J"), None);
		let method = class.get_method("c", "(La;)V").expect("method c");
		assert_eq!(method.dst, "accept");
		assert_eq!(method.parameters.get(&1).map(String::as_str), Some("other"));
		assert!(mappings.get_class("b").is_none());
		Ok(())
	}

	#[test]
	fn members_without_class_mapping_keep_the_class_name() -> Result<()> {
		let mut builder = MappingsBuilder::new();
		builder.add_method("a", "b", "()V", "run")?;
		builder.add_class("a", "net/Foo")?;
		let mappings = builder.build()?;

		assert_eq!(mappings.get_class("a").map(|class| class.dst.as_str()), Some("net/Foo"));
		Ok(())
	}

	#[test]
	fn conflicts_are_rejected() -> Result<()> {
		let mut builder = MappingsBuilder::new();
		builder.add_class("a", "net/Foo")?;
		builder.add_class("a", "net/Foo")?;
		assert!(builder.add_class("a", "net/Bar").is_err());

		builder.add_field("a", "b", "I", "count")?;
		assert!(builder.add_field("a", "b", "I", "amount").is_err());
		Ok(())
	}

	#[test]
	fn destination_collisions_are_rejected() -> Result<()> {
		let mut builder = MappingsBuilder::new();
		builder.add_class("a", "net/Foo")?;
		builder.add_class("b", "net/Foo")?;
		assert!(builder.build().is_err());

		let mut builder = MappingsBuilder::new();
		builder.add_class("a", "net/Foo")?;
		builder.add_method("a", "b", "()V", "run")?;
		builder.add_method("a", "c", "()V", "run")?;
		// different descriptors may share a name
		builder.add_method("a", "d", "(I)V", "run")?;
		assert!(builder.build().is_err());

		let mut builder = MappingsBuilder::new();
		builder.add_class("a", "net/Foo")?;
		builder.add_class("b", "net/Bar")?;
		// these only collide once the descriptors are mapped
		builder.add_field("a", "c", "La;", "value")?;
		builder.add_field("a", "d", "Lnet/Foo;", "value")?;
		assert!(builder.build().is_err());
		Ok(())
	}

	#[test]
	fn reverse() -> Result<()> {
		let mut builder = MappingsBuilder::new();
		builder.add_class("a", "net/Foo")?;
		builder.add_field("a", "b", "La;", "self_")?;
		builder.add_method("a", "c", "(La;)La;", "copy")?;
		let reversed = builder.build()?.reverse()?;

		let class = reversed.get_class("net/Foo").expect("class net/Foo");
		assert_eq!(class.dst, "a");
		assert_eq!(class.get_field("self_", "Lnet/Foo;"), Some("b"));
		assert_eq!(class.get_method("copy", "(Lnet/Foo;)Lnet/Foo;").map(|method| method.dst.as_str()), Some("c"));
		Ok(())
	}
}
