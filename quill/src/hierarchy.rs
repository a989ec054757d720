//! Looking up classes to walk the class hierarchy.
//!
//! A [`HierarchyResolver`] asks its [`ClassProvider`]s in order, and caches the answers. Classes that can't be found
//! are cached as well, so they are only looked for once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use anyhow::{anyhow, Context, Result};
use dashmap::DashMap;
use indexmap::IndexSet;
use log::debug;
pub use duke::info::{ClassInfo, MemberInfo};

/// A source of classes, for example a jar.
pub trait ClassProvider: Send + Sync {
	fn get_class(&self, name: &str) -> Result<Option<Arc<ClassInfo>>>;

	/// Releases whatever the provider holds on to.
	fn close(&self) -> Result<()> {
		Ok(())
	}
}

/// Gives classes out of a map.
#[derive(Debug, Default)]
pub struct MapClassProvider {
	classes: HashMap<String, Arc<ClassInfo>>,
}

impl MapClassProvider {
	pub fn new() -> MapClassProvider {
		MapClassProvider::default()
	}

	pub fn add(&mut self, class: ClassInfo) {
		self.classes.insert(class.name.clone(), Arc::new(class));
	}

	pub fn len(&self) -> usize {
		self.classes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.classes.is_empty()
	}
}

impl FromIterator<ClassInfo> for MapClassProvider {
	fn from_iter<T: IntoIterator<Item=ClassInfo>>(iter: T) -> Self {
		let mut provider = MapClassProvider::new();
		for class in iter {
			provider.add(class);
		}
		provider
	}
}

impl ClassProvider for MapClassProvider {
	fn get_class(&self, name: &str) -> Result<Option<Arc<ClassInfo>>> {
		Ok(self.classes.get(name).cloned())
	}
}

pub struct HierarchyResolver {
	providers: Vec<Box<dyn ClassProvider>>,
	classes: DashMap<String, Option<Arc<ClassInfo>>>,
	ancestors: DashMap<String, Arc<[String]>>,
}

impl Debug for HierarchyResolver {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HierarchyResolver")
			.field("providers", &self.providers.len())
			.field("cached", &self.classes.len())
			.finish()
	}
}

impl HierarchyResolver {
	/// Creates a resolver asking the providers in the given order.
	pub fn new(providers: Vec<Box<dyn ClassProvider>>) -> HierarchyResolver {
		HierarchyResolver {
			providers,
			classes: DashMap::new(),
			ancestors: DashMap::new(),
		}
	}

	/// Gets a class from the first provider that has it.
	pub fn lookup(&self, name: &str) -> Result<Option<Arc<ClassInfo>>> {
		let cached = self.classes.get(name).map(|entry| entry.value().clone());
		if let Some(class) = cached {
			return Ok(class);
		}

		let class = self.query(name)?;
		if class.is_none() {
			debug!("can't find class {name}");
		}
		self.classes.insert(name.to_owned(), class.clone());
		Ok(class)
	}

	fn query(&self, name: &str) -> Result<Option<Arc<ClassInfo>>> {
		for provider in &self.providers {
			let class = provider.get_class(name)
				.with_context(|| anyhow!("failed to get class {name:?}"))?;
			if class.is_some() {
				return Ok(class);
			}
		}
		Ok(None)
	}

	/// Gives the names of all classes the class inherits from: first the super classes up the chain, then all
	/// interfaces, breadth first.
	///
	/// Classes that can't be found still appear, but nothing above them does.
	pub fn ancestors(&self, name: &str) -> Result<Arc<[String]>> {
		let cached = self.ancestors.get(name).map(|entry| entry.value().clone());
		if let Some(ancestors) = cached {
			return Ok(ancestors);
		}

		let mut super_classes = Vec::new();
		let mut interfaces = VecDeque::new();
		let mut seen = HashSet::from([name.to_owned()]);

		let mut current = self.lookup(name)?;
		while let Some(class) = current {
			interfaces.extend(class.interfaces.iter().cloned());
			current = match &class.super_class {
				Some(super_class) if seen.insert(super_class.clone()) => {
					super_classes.push(super_class.clone());
					self.lookup(super_class)?
				},
				_ => None,
			};
		}

		let mut all_interfaces = IndexSet::new();
		while let Some(interface) = interfaces.pop_front() {
			if seen.contains(&interface) || !all_interfaces.insert(interface.clone()) {
				continue;
			}
			if let Some(class) = self.lookup(&interface)? {
				interfaces.extend(class.interfaces.iter().cloned());
			}
		}

		super_classes.extend(all_interfaces);
		let ancestors: Arc<[String]> = super_classes.into();
		self.ancestors.insert(name.to_owned(), ancestors.clone());
		Ok(ancestors)
	}

	/// Number of classes looked up so far, including the ones not found.
	pub fn cached(&self) -> usize {
		self.classes.len()
	}

	/// Forgets everything looked up so far.
	pub fn clear_cache(&mut self) {
		self.classes.clear();
		self.ancestors.clear();
	}

	/// Closes all providers, failing with the first error.
	pub fn close(self) -> Result<()> {
		let mut result = Ok(());
		for provider in self.providers {
			if let Err(e) = provider.close() {
				if result.is_ok() {
					result = Err(e);
				}
			}
		}
		result
	}
}

#[cfg(test)]
mod testing {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use duke::flags::{ACC_INTERFACE, ACC_PUBLIC};
	use crate::hierarchy::{ClassInfo, ClassProvider, HierarchyResolver, MapClassProvider};

	fn class(name: &str, super_class: Option<&str>, interfaces: &[&str]) -> ClassInfo {
		ClassInfo {
			name: name.to_owned(),
			access: ACC_PUBLIC,
			super_class: super_class.map(str::to_owned),
			interfaces: interfaces.iter().map(|&x| x.to_owned()).collect(),
			fields: Vec::new(),
			methods: Vec::new(),
		}
	}

	struct Counting(MapClassProvider, Arc<AtomicUsize>);

	impl ClassProvider for Counting {
		fn get_class(&self, name: &str) -> Result<Option<Arc<ClassInfo>>> {
			self.1.fetch_add(1, Ordering::Relaxed);
			self.0.get_class(name)
		}
	}

	#[test]
	fn providers_in_order_and_cached() -> Result<()> {
		let first = MapClassProvider::from_iter([class("a", Some("first"), &[])]);
		let second = MapClassProvider::from_iter([class("a", Some("second"), &[]), class("b", None, &[])]);
		let queries = Arc::new(AtomicUsize::new(0));
		let mut resolver = HierarchyResolver::new(vec![Box::new(first), Box::new(Counting(second, queries.clone()))]);

		assert_eq!(resolver.lookup("a")?.and_then(|a| a.super_class.clone()).as_deref(), Some("first"));
		assert!(resolver.lookup("b")?.is_some());
		assert!(resolver.lookup("c")?.is_none());
		assert!(resolver.lookup("c")?.is_none());
		assert_eq!(queries.load(Ordering::Relaxed), 2);
		assert_eq!(resolver.cached(), 3);

		resolver.clear_cache();
		assert_eq!(resolver.cached(), 0);
		assert!(resolver.lookup("c")?.is_none());
		assert_eq!(queries.load(Ordering::Relaxed), 3);

		resolver.close()
	}

	#[test]
	fn ancestors() -> Result<()> {
		let mut i = class("i", None, &["j"]);
		i.access |= ACC_INTERFACE;
		let provider = MapClassProvider::from_iter([
			class("a", Some("b"), &["i"]),
			class("b", Some("java/lang/Object"), &["k", "i"]),
			i,
			class("j", None, &[]),
			class("k", None, &["j"]),
		]);
		let resolver = HierarchyResolver::new(vec![Box::new(provider)]);

		let ancestors = resolver.ancestors("a")?;
		assert_eq!(&ancestors[..], &["b", "java/lang/Object", "i", "k", "j"].map(str::to_owned)[..]);
		assert_eq!(&resolver.ancestors("unknown")?[..], &[] as &[String]);
		Ok(())
	}

	#[test]
	fn cyclic_hierarchy_terminates() -> Result<()> {
		let provider = MapClassProvider::from_iter([
			class("a", Some("b"), &["a"]),
			class("b", Some("a"), &[]),
		]);
		let resolver = HierarchyResolver::new(vec![Box::new(provider)]);

		assert_eq!(&resolver.ancestors("a")?[..], &["b".to_owned()][..]);
		Ok(())
	}
}
