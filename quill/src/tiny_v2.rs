//! Reading mappings in the "Tiny v2" format.
//!
//! A tiny v2 file names any number of namespaces in its header, and gives every class, field, method and parameter a
//! name in each of them. Reading picks two of these namespaces, and gives [`Mappings`] going from the one to the other.
//!
//! Comments and unknown sections are skipped.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use anyhow::{anyhow, bail, Context, Result};
use crate::lines::{TinyLine, WithMoreIdentIter};
use crate::mappings::{Mappings, MappingsBuilder};
use crate::remapper::ARemapper;

/// Reads a `.tiny` file (tiny v2), by opening the file given by the path.
pub fn read_file(path: impl AsRef<Path>, from: &str, to: &str) -> Result<Mappings> {
	let file = File::open(&path)
		.with_context(|| anyhow!("failed to open mappings file {:?}", path.as_ref()))?;
	read(file, from, to)
		.with_context(|| anyhow!("failed to read mappings file {:?} as tiny v2 file", path.as_ref()))
}

#[allow(clippy::tabs_in_doc_comments)]
/// Reads the tiny v2 format from the given reader, mapping from the namespace `from` to the namespace `to`.
///
/// ```
/// # use pretty_assertions::assert_eq;
/// let string = "\
/// tiny	2	0	official	named
/// c	a	net/Foo
/// 	f	La;	b	self_
/// 	m	(La;)V	c	accept
/// 		p	1		other
/// ";
///
/// let mappings = quill::tiny_v2::read(string.as_bytes(), "named", "official").unwrap();
///
/// let class = mappings.get_class("net/Foo").unwrap();
/// assert_eq!(class.dst, "a");
/// assert_eq!(class.get_field("self_", "Lnet/Foo;"), Some("b"));
/// ```
pub fn read(reader: impl Read, from: &str, to: &str) -> Result<Mappings> {
	let mut lines = BufReader::new(reader)
		.lines()
		.enumerate()
		.map(|(line_number, line)| -> Result<TinyLine> {
			TinyLine::new(line_number + 1, &line?)
		})
		.peekable();

	let mut header = lines.next().context("no header line")??;

	if header.first_field != "tiny" || header.next()? != "2" || header.next()? != "0" {
		bail!("header version isn't tiny v2.0, in line {header:?}");
	}

	let namespaces = header.rest();
	let namespace = |name: &str| namespaces.iter().position(|namespace| namespace == name)
		.with_context(|| anyhow!("namespace {name:?} not found in the header, available are: {namespaces:?}"));
	let from = namespace(from)?;
	let to = namespace(to)?;
	let count = namespaces.len();

	let mut classes = Vec::new();

	let mut top = WithMoreIdentIter::new(&mut lines);
	top.next_level().on_every_line(|_, line| {
		if line.first_field == "escaped-names" {
			bail!("escaped names are not supported");
		}
		Ok(())
	}).context("reading header properties")?;

	top.on_every_line(|iter, line| {
		if line.first_field == "c" {
			let mut class = RawClass { names: line.names(count)?, fields: Vec::new(), methods: Vec::new() };

			iter.next_level().on_every_line(|iter, mut line| {
				if line.first_field == "f" {
					let desc = line.next()?;
					class.fields.push(RawMember { desc, names: line.names(count)? });
					iter.skip_level()
				} else if line.first_field == "m" {
					let desc = line.next()?;
					let mut method = RawMethod { desc, names: line.names(count)?, parameters: Vec::new() };

					iter.next_level().on_every_line(|iter, mut line| {
						if line.first_field == "p" {
							let lv_index = line.next()?;
							let lv_index = lv_index.parse()
								.with_context(|| anyhow!("illegal parameter index {lv_index:?}"))?;
							method.parameters.push((lv_index, line.names(count)?));
						}
						iter.skip_level()
					}).context("reading method sub-sections")?;

					class.methods.push(method);
					Ok(())
				} else {
					iter.skip_level()
				}
			}).context("reading class sub-sections")?;

			classes.push(class);
			Ok(())
		} else {
			iter.skip_level()
		}
	})?;

	build(&classes, from, to)
}

struct RawMember {
	desc: String,
	names: Vec<String>,
}

struct RawMethod {
	desc: String,
	names: Vec<String>,
	parameters: Vec<(u16, Vec<String>)>,
}

struct RawClass {
	names: Vec<String>,
	fields: Vec<RawMember>,
	methods: Vec<RawMethod>,
}

/// Gets the name in the given namespace. Missing names fall back to the name in the first namespace.
fn name(names: &[String], namespace: usize) -> Result<&str> {
	match names.get(namespace).filter(|name| !name.is_empty()) {
		Some(name) => Ok(name),
		None => names.first()
			.filter(|name| !name.is_empty())
			.map(String::as_str)
			.context("name in first namespace is missing"),
	}
}

/// Class names from the first namespace to some other, for translating the descriptors.
struct DescriptorNamespace(HashMap<String, String>);

impl ARemapper for DescriptorNamespace {
	fn map_class_fail(&self, class: &str) -> Result<Option<String>> {
		Ok(self.0.get(class).cloned())
	}
}

fn build(classes: &[RawClass], from: usize, to: usize) -> Result<Mappings> {
	let descriptors = classes.iter()
		.map(|class| Ok((name(&class.names, 0)?.to_owned(), name(&class.names, from)?.to_owned())))
		.collect::<Result<HashMap<_, _>>>()
		.map(DescriptorNamespace)?;

	let mut builder = MappingsBuilder::new();
	for class in classes {
		let src = name(&class.names, from)?;
		builder.add_class(src, name(&class.names, to)?)?;

		for field in &class.fields {
			let desc = descriptors.map_desc(&field.desc)?;
			builder.add_field(src, name(&field.names, from)?, &desc, name(&field.names, to)?)?;
		}

		for method in &class.methods {
			let desc = descriptors.map_desc(&method.desc)?;
			let method_name = name(&method.names, from)?;
			builder.add_method(src, method_name, &desc, name(&method.names, to)?)?;

			for (lv_index, names) in &method.parameters {
				// parameters often only have a name in some namespaces
				if let Some(dst) = names.get(to).filter(|dst| !dst.is_empty()) {
					builder.add_parameter(src, method_name, &desc, *lv_index, dst)?;
				}
			}
		}
	}
	builder.build()
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;

	const INPUT: &str = "tiny\t2\t0\tofficial\tintermediary\tnamed
c\ta\tclass_1\tnet/Foo
\tc\ta class comment
\tf\tLa;\tb\tfield_1\tself_
\t\tc\ta field comment
\tm\t(La;I)V\tc\tmethod_1\taccept
\t\tp\t1\t\t\tother
\t\tp\t2\t\t\t
c\td\tclass_2\t
";

	#[test]
	fn read_between_namespaces() -> Result<()> {
		let mappings = super::read(INPUT.as_bytes(), "intermediary", "named")?;

		let class = mappings.get_class("class_1").expect("class_1");
		assert_eq!(class.dst, "net/Foo");
		assert_eq!(class.get_field("field_1", "Lclass_1;"), Some("self_"));
		let method = class.get_method("method_1", "(Lclass_1;I)V").expect("method_1");
		assert_eq!(method.dst, "accept");
		assert_eq!(method.parameters.get(&1).map(String::as_str), Some("other"));
		assert_eq!(method.parameters.get(&2), None);

		// a missing name falls back to the first namespace
		assert_eq!(mappings.get_class("class_2").map(|class| class.dst.as_str()), Some("d"));
		Ok(())
	}

	#[test]
	fn unknown_namespace() {
		assert!(super::read(INPUT.as_bytes(), "official", "mojang").is_err());
	}

	#[test]
	fn bad_header() {
		assert!(super::read("tiny\t1\t0\ta\tb\n".as_bytes(), "a", "b").is_err());
		assert!(super::read("".as_bytes(), "a", "b").is_err());
		assert!(super::read("tiny\t2\t0\ta\tb\n\tescaped-names\n".as_bytes(), "a", "b").is_err());
	}
}
