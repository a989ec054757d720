//! Renaming the classes and members documentation is about, and the ones it links to.
//!
//! Links look like `{@link net.Foo#run(int, String)}`. The owner may be empty for the documented class itself, and
//! may be a shorthand given in the [`DocReferences`](super::DocReferences). Only the owner and member get replaced,
//! the rest of the text is kept as is. A method link is resolved by the number of its arguments only. If that's
//! ambiguous, the link is kept.

use std::borrow::Cow;
use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use duke::descriptor;
use quill::remapper::{ARemapper, BRemapper, HierarchyRemapper};
use crate::javadoctor::{ClassJavadoc, DocReferences, JavadocEntry, JavadoctorInformation};

/// A link tag anywhere in the text: `@link`, `@linkplain`, `@see` or `@value`, followed by the reference.
#[allow(clippy::expect_used)]
static LINKS: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"@(?<tag>link|linkplain|see|value)(?<space>\s+)(?<owner>[\w$.]*)(?:#(?<member>[\w%]+)?(?<args_full>\((?<args>[\w$., \[\]]+)?\))?)?")
		.expect("link pattern must compile")
});

/// A reference at the start of the text, as in the value of a `@see` tag.
#[allow(clippy::expect_used)]
static BARE_LINK: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^(?<owner>[\w$.]*)(?:#(?<member>[\w%]+)?(?<args_full>\((?<args>[\w$., \[\]]+)?\))?)?")
		.expect("bare link pattern must compile")
});

impl JavadoctorInformation {
	/// Renames everything, including the keys of the documented classes and members.
	pub fn remap(&self, remapper: &HierarchyRemapper) -> Result<JavadoctorInformation> {
		let docs = DocRemapper { remapper, references: &self.references.classes };

		let mut class_docs = IndexMap::with_capacity(self.class_docs.len());
		for (name, doc) in &self.class_docs {
			let class = name.replace('.', "/");
			let doc = docs.remap_class(&class, doc)
				.with_context(|| anyhow!("failed to remap documentation of class {name:?}"))?;
			class_docs.insert(remapper.map_class(&class)?.replace('/', "."), doc);
		}

		let mut classes = IndexMap::with_capacity(self.references.classes.len());
		for class in self.references.classes.values() {
			let mapped = remapper.map_class(class)?;
			classes.insert(mapped.replace(['/', '$'], "."), mapped);
		}

		Ok(JavadoctorInformation { references: DocReferences { classes }, class_docs })
	}
}

struct DocRemapper<'a> {
	remapper: &'a HierarchyRemapper,
	references: &'a IndexMap<String, String>,
}

impl DocRemapper<'_> {
	fn remap_class(&self, class: &str, doc: &ClassJavadoc) -> Result<ClassJavadoc> {
		let clazz = doc.clazz.as_ref()
			.map(|entry| self.remap_entry(class, entry))
			.transpose()?;

		let methods = doc.methods.as_ref()
			.map(|methods| methods.iter()
				.map(|(key, entry)| Ok((self.map_method_key(class, key)?, self.remap_entry(class, entry)?)))
				.collect::<Result<IndexMap<_, _>>>())
			.transpose()?;

		let fields = doc.fields.as_ref()
			.map(|fields| fields.iter()
				.map(|(key, entry)| Ok((self.map_field_key(class, key)?, self.remap_entry(class, entry)?)))
				.collect::<Result<IndexMap<_, _>>>())
			.transpose()?;

		let mapped_class = self.remapper.map_class(class)?;
		let mut inner_classes = IndexMap::with_capacity(doc.inner_classes.len());
		for (name, inner) in &doc.inner_classes {
			let inner_class = format!("{class}${name}");
			let mapped = self.remapper.map_class(&inner_class)?;
			let doc = self.remap_class(&inner_class, inner)
				.with_context(|| anyhow!("in inner class {name:?}"))?;
			inner_classes.insert(simple_name(&mapped_class, &mapped).to_owned(), doc);
		}

		Ok(ClassJavadoc { clazz, methods, fields, inner_classes })
	}

	fn remap_entry(&self, class: &str, entry: &JavadocEntry) -> Result<JavadocEntry> {
		let doc = entry.doc.as_deref()
			.map(|doc| self.replace_links(class, doc, &LINKS))
			.transpose()?;

		let tags = entry.tags.as_ref()
			.map(|tags| tags.iter()
				.map(|(tag, values)| {
					let pattern = if tag == "see" { &BARE_LINK } else { &LINKS };
					let values = values.iter()
						.map(|value| self.replace_links(class, value, pattern))
						.collect::<Result<Vec<_>>>()?;
					Ok((tag.clone(), values))
				})
				.collect::<Result<IndexMap<_, _>>>())
			.transpose()?;

		Ok(JavadocEntry {
			doc,
			tags,
			parameters: self.remap_names(class, entry.parameters.as_deref())?,
			type_parameters: self.remap_names(class, entry.type_parameters.as_deref())?,
		})
	}

	fn remap_names(&self, class: &str, names: Option<&[Option<String>]>) -> Result<Option<Vec<Option<String>>>> {
		names.map(|names| names.iter()
			.map(|name| name.as_deref().map(|name| self.replace_links(class, name, &LINKS)).transpose())
			.collect::<Result<Vec<_>>>())
			.transpose()
	}

	/// Maps a method key `name(desc)ret`. The parameter types may be separated by commas, and the return type may be
	/// missing.
	fn map_method_key(&self, class: &str, key: &str) -> Result<String> {
		let Some(start) = key.find('(') else {
			bail!("method key {key:?} has no descriptor");
		};
		let (name, desc) = key.split_at(start);
		let with_commas = desc.contains(',');
		let desc: Cow<str> = if with_commas { desc.replace(',', "").into() } else { desc.into() };

		let full_desc = if desc.ends_with(')') {
			match self.find_return_type(class, name, &desc)? {
				Some(full_desc) => full_desc,
				None => return Ok(key.to_owned()),
			}
		} else {
			desc.to_string()
		};

		let mapped_name = self.remapper.map_method(class, name, &full_desc)?;
		let mapped_desc = self.remapper.map_desc(&desc)?;
		if !with_commas {
			return Ok(format!("{mapped_name}{mapped_desc}"));
		}

		let parameters = descriptor::parameter_types(&mapped_desc)
			.with_context(|| anyhow!("invalid method key {key:?}"))?;
		let return_type = mapped_desc.rsplit_once(')').map_or("", |(_, ret)| ret);
		Ok(format!("{mapped_name}({}){return_type}", parameters.join(",")))
	}

	/// Completes a descriptor without return type, if exactly one method of the class fits.
	fn find_return_type(&self, class: &str, name: &str, parameters: &str) -> Result<Option<String>> {
		let mut descs: Vec<String> = Vec::new();
		let mut add = |desc: &str| {
			if desc.starts_with(parameters) && !descs.iter().any(|known| known == desc) {
				descs.push(desc.to_owned());
			}
		};

		if let Some(info) = self.remapper.hierarchy().lookup(class)? {
			info.methods.iter()
				.filter(|method| method.name == name)
				.for_each(|method| add(&method.descriptor));
		}
		if let Some(mapping) = self.remapper.mappings().get_class(class) {
			mapping.methods_named(name).for_each(|(key, _)| add(&key.desc));
		}

		Ok(match descs.len() {
			1 => descs.pop(),
			_ => None,
		})
	}

	/// Maps a field key `name:desc`.
	fn map_field_key(&self, class: &str, key: &str) -> Result<String> {
		let Some((name, desc)) = key.split_once(':') else {
			bail!("field key {key:?} has no descriptor");
		};
		let mapped_name = self.remapper.map_field(class, name, desc)?;
		let mapped_desc = self.remapper.map_desc(desc)?;
		Ok(format!("{mapped_name}:{mapped_desc}"))
	}

	fn replace_links(&self, class: &str, text: &str, pattern: &Regex) -> Result<String> {
		let mut out = String::with_capacity(text.len());
		let mut last = 0;
		for captures in pattern.captures_iter(text) {
			let (Some(whole), Some(owner)) = (captures.get(0), captures.name("owner")) else {
				continue;
			};
			out.push_str(&text[last..whole.start()]);
			// the tag and the space after it
			out.push_str(&text[whole.start()..owner.start()]);
			out.push_str(&self.replace_link(class, text, &captures, owner.as_str(), whole.end())?);
			last = whole.end();
		}
		out.push_str(&text[last..]);
		Ok(out)
	}

	/// Gives the replacement of the reference, starting from the owner.
	fn replace_link(&self, class: &str, text: &str, captures: &Captures, owner: &str, end: usize) -> Result<String> {
		let mut out = String::new();

		let owner_class = if owner.is_empty() {
			class.to_owned()
		} else {
			let owner_class = self.resolve_class(owner);
			out.push_str(&self.map_class_token(owner, &owner_class)?);
			owner_class
		};

		let Some(member) = captures.name("member") else {
			// a lonely `#` or `#(...)` is kept
			let owner_end = captures.name("owner").map_or(end, |owner| owner.end());
			out.push_str(&text[owner_end..end]);
			return Ok(out);
		};
		let member = member.as_str();
		out.push('#');

		match captures.name("args_full") {
			None => {
				let mapped = self.remapper.map_field_by_name(&owner_class, member)?;
				out.push_str(mapped.as_deref().unwrap_or(member));
			},
			Some(args_full) => {
				let args = captures.name("args").map_or("", |args| args.as_str());
				let argument_count = if args.trim().is_empty() { 0 } else { args.split(',').count() };

				match self.remapper.map_doc_reference_member(&owner_class, member, argument_count)? {
					Some(mapped) => {
						out.push_str(&mapped);
						out.push('(');
						out.push_str(&self.map_arguments(args)?);
						out.push(')');
					},
					None => {
						out.push_str(member);
						out.push_str(args_full.as_str());
					},
				}
			},
		}

		Ok(out)
	}

	/// Renames the qualified class names among the comma separated arguments, keeping the spacing.
	fn map_arguments(&self, args: &str) -> Result<String> {
		let args = args.split(',')
			.map(|arg| {
				let class = arg.trim().trim_end_matches("...").trim_end_matches("[]");
				if class.contains('.') || self.references.contains_key(class) {
					let mapped = self.map_class_token(class, &self.resolve_class(class))?;
					Ok(arg.replacen(class, &mapped, 1))
				} else {
					Ok(arg.to_owned())
				}
			})
			.collect::<Result<Vec<_>>>()?;
		Ok(args.join(","))
	}

	/// The internal name of a class as written in documentation.
	fn resolve_class(&self, token: &str) -> String {
		match self.references.get(token) {
			Some(class) => class.clone(),
			None => token.replace('.', "/"),
		}
	}

	/// Gives the dotted new name of a class, or the token unchanged if the class isn't renamed.
	fn map_class_token(&self, token: &str, class: &str) -> Result<String> {
		let mapped = self.remapper.map_class(class)?;
		if mapped == class {
			return Ok(token.to_owned());
		}
		let dotted = mapped.replace('/', ".");
		// inner classes are only written with a `$` if they were before
		Ok(if token.contains('$') { dotted } else { dotted.replace('$', ".") })
	}
}

/// The name of an inner class, relative to its outer class.
fn simple_name<'a>(outer: &str, inner: &'a str) -> &'a str {
	inner.strip_prefix(outer)
		.and_then(|rest| rest.strip_prefix('$'))
		.or_else(|| inner.rsplit_once(['$', '/']).map(|(_, name)| name))
		.unwrap_or(inner)
}

#[cfg(test)]
mod testing {
	use std::sync::Arc;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use serde_json::json;
	use duke::flags::ACC_PUBLIC;
	use quill::hierarchy::{ClassInfo, HierarchyResolver, MapClassProvider, MemberInfo};
	use quill::remapper::HierarchyRemapper;
	use crate::javadoctor::JavadoctorInformation;
	use super::{simple_name, BARE_LINK, LINKS};

	const MAPPINGS: &str = "tiny\t2\t0\tofficial\tnamed
c\ta\tnet/Foo
\tf\tLc;\tb\tsize
\tm\t(I)V\tc\trun
c\ta$b\tnet/Foo$Inner
\tm\t()V\te\tclose
c\tc\tnet/Bar
\tf\tI\tv\tmax
";

	fn class(name: &str, methods: &[(&str, &str)]) -> ClassInfo {
		ClassInfo {
			name: name.to_owned(),
			access: ACC_PUBLIC,
			super_class: Some("java/lang/Object".to_owned()),
			interfaces: Vec::new(),
			fields: Vec::new(),
			methods: methods.iter().map(|&(name, desc)| MemberInfo::new(name, desc, ACC_PUBLIC)).collect(),
		}
	}

	fn remapper() -> Result<HierarchyRemapper> {
		let mappings = quill::tiny_v2::read(MAPPINGS.as_bytes(), "official", "named")?;
		let provider = MapClassProvider::from_iter([
			class("a", &[("c", "(I)V")]),
			class("a$b", &[("e", "()V")]),
			class("c", &[]),
		]);
		let hierarchy = HierarchyResolver::new(vec![Box::new(provider)]);
		Ok(HierarchyRemapper::new(Arc::new(mappings), Arc::new(hierarchy)))
	}

	#[test]
	fn simple_names() {
		assert_eq!(simple_name("net/Foo", "net/Foo$Bar"), "Bar");
		assert_eq!(simple_name("net/Foo", "net/Other$Bar"), "Bar");
		assert_eq!(simple_name("net/Foo", "net/Bar"), "Bar");
		assert_eq!(simple_name("net/Foo", "Bar"), "Bar");
	}

	#[test]
	fn patterns() {
		let captures = LINKS.captures("see {@linkplain  net.Foo#run(int, a.B)}");
		let captures = captures.as_ref();
		assert_eq!(captures.and_then(|c| c.name("tag")).map(|m| m.as_str()), Some("linkplain"));
		assert_eq!(captures.and_then(|c| c.name("space")).map(|m| m.as_str()), Some("  "));
		assert_eq!(captures.and_then(|c| c.name("owner")).map(|m| m.as_str()), Some("net.Foo"));
		assert_eq!(captures.and_then(|c| c.name("member")).map(|m| m.as_str()), Some("run"));
		assert_eq!(captures.and_then(|c| c.name("args")).map(|m| m.as_str()), Some("int, a.B"));

		assert!(BARE_LINK.captures("net.Foo#size").is_some());
		assert_eq!(BARE_LINK.captures_iter("a b c").count(), 1);
	}

	#[test]
	fn remap_documentation() -> Result<()> {
		let information: JavadoctorInformation = serde_json::from_value(json!({
			"references": { "classes": { "Bar": "c" } },
			"classDocs": {
				"a": {
					"clazz": {
						"doc": "Holds a {@link #c(int)}\n  and  {@linkplain  Bar#v  the max}.\nSee {@value a#b}.",
						"tags": { "see": ["Bar#v", "a$b#e()", "Bar#missing(int)"] },
						"typeParameters": ["the {@link Bar} kind"]
					},
					"methods": {
						"c(I)V": { "parameters": ["count"], "tags": { "throws": ["{@link Bar} if full"] } }
					},
					"fields": { "b:Lc;": { "doc": "Size." } },
					"innerClasses": {
						"b": {
							"clazz": { "doc": "Closes with {@link #e()}.\n\tOnce." },
							"methods": { "e()V": {} }
						},
						"1": {}
					}
				}
			}
		}))?;

		let remapped = information.remap(&remapper()?)?;

		assert_eq!(serde_json::to_value(&remapped)?, json!({
			"references": { "classes": { "net.Bar": "net/Bar" } },
			"classDocs": {
				"net.Foo": {
					"clazz": {
						"doc": "Holds a {@link #run(int)}\n  and  {@linkplain  net.Bar#max  the max}.\nSee {@value net.Foo#size}.",
						"tags": { "see": ["net.Bar#max", "net.Foo$Inner#close()", "net.Bar#missing(int)"] },
						"typeParameters": ["the {@link net.Bar} kind"]
					},
					"methods": {
						"run(I)V": { "parameters": ["count"], "tags": { "throws": ["{@link net.Bar} if full"] } }
					},
					"fields": { "size:Lnet/Bar;": { "doc": "Size." } },
					"innerClasses": {
						"Inner": {
							"clazz": { "doc": "Closes with {@link #close()}.\n\tOnce." },
							"methods": { "close()V": {} },
							"innerClasses": {}
						},
						"1": { "innerClasses": {} }
					}
				}
			}
		}));
		Ok(())
	}
}
