//! The jar manifest: a main section followed by sections for single entries, each a list of `Key: value` attributes.

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;

const MAX_LINE_LENGTH: usize = 72;

/// Attributes, in the order they appear.
pub type Attributes = IndexMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
	pub main: Attributes,
	/// The sections for single entries, keyed by their `Name` attribute (which isn't part of the attributes).
	pub sections: IndexMap<String, Attributes>,
}

impl Manifest {
	pub fn parse(data: &[u8]) -> Result<Manifest> {
		let text = std::str::from_utf8(data).context("manifest is not valid utf-8")?;

		let mut manifest = Manifest::default();
		let mut in_main = true;
		let mut current: Option<(Option<String>, Attributes)> = None;

		for (line_number, line) in logical_lines(text).enumerate() {
			let line = line.with_context(|| anyhow!("in line {}", line_number + 1))?;

			if line.is_empty() {
				if let Some((name, attributes)) = current.take() {
					match name {
						None => manifest.main = attributes,
						Some(name) => manifest.sections.entry(name).or_default().extend(attributes),
					}
					in_main = false;
				}
				continue;
			}

			let (key, value) = line.split_once(": ")
				.or_else(|| line.strip_suffix(':').map(|key| (key, "")))
				.with_context(|| anyhow!("expected `Key: value`, got {line:?}"))?;

			match &mut current {
				Some((_, attributes)) => {
					attributes.insert(key.to_owned(), value.to_owned());
				},
				None if in_main => {
					current = Some((None, Attributes::from([(key.to_owned(), value.to_owned())])));
				},
				None => {
					if !key.eq_ignore_ascii_case("Name") {
						bail!("section doesn't start with a `Name` attribute: {line:?}");
					}
					current = Some((Some(value.to_owned()), Attributes::new()));
				},
			}
		}

		match current {
			Some((None, attributes)) => manifest.main = attributes,
			Some((Some(name), attributes)) => manifest.sections.entry(name).or_default().extend(attributes),
			None => {},
		}

		Ok(manifest)
	}

	/// Writes the manifest, with `\r\n` line endings and lines wrapped at 72 bytes.
	pub fn write(&self) -> Vec<u8> {
		let mut out = Vec::new();

		for (key, value) in &self.main {
			write_attribute(&mut out, key, value);
		}
		out.extend_from_slice(b"\r\n");

		for (name, attributes) in &self.sections {
			write_attribute(&mut out, "Name", name);
			for (key, value) in attributes {
				write_attribute(&mut out, key, value);
			}
			out.extend_from_slice(b"\r\n");
		}

		out
	}
}

/// Splits the text into lines, joining continuation lines (starting with a space) to the line before.
fn logical_lines(text: &str) -> impl Iterator<Item=Result<String>> + '_ {
	// a final line break doesn't start another line
	let text = text.strip_suffix('\n').unwrap_or(text);
	let mut physical = text.split('\n')
		.map(|line| line.strip_suffix('\r').unwrap_or(line))
		.peekable();

	std::iter::from_fn(move || {
		let first = physical.next()?;
		if first.starts_with(' ') {
			return Some(Err(anyhow!("continuation line without a line before: {first:?}")));
		}

		let mut line = first.to_owned();
		while let Some(next) = physical.next_if(|next| next.starts_with(' ')) {
			line.push_str(&next[1..]);
		}
		Some(Ok(line))
	})
}

fn write_attribute(out: &mut Vec<u8>, key: &str, value: &str) {
	let line = format!("{key}: {value}");
	let mut rest = line.as_str();
	let mut width = MAX_LINE_LENGTH;
	loop {
		let mut split = rest.len().min(width);
		while !rest.is_char_boundary(split) {
			split -= 1;
		}
		let (head, tail) = rest.split_at(split);
		out.extend_from_slice(head.as_bytes());
		out.extend_from_slice(b"\r\n");
		if tail.is_empty() {
			break;
		}
		// continuation lines start with a space, which counts towards the length
		out.push(b' ');
		width = MAX_LINE_LENGTH - 1;
		rest = tail;
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::manifest::Manifest;

	#[test]
	fn parse() -> Result<()> {
		let manifest = Manifest::parse(b"Manifest-Version: 1.0\r\nMain-Class: net.Fo\r\n o\r\n\r\nName: a.class\r\nSHA-256-Digest: abc\r\n\r\nName: b.class\nX: y\n")?;

		assert_eq!(manifest.main.get("Main-Class").map(String::as_str), Some("net.Foo"));
		assert_eq!(manifest.sections.len(), 2);
		assert_eq!(manifest.sections["a.class"].get("SHA-256-Digest").map(String::as_str), Some("abc"));
		assert_eq!(manifest.sections["b.class"].get("X").map(String::as_str), Some("y"));
		Ok(())
	}

	#[test]
	fn malformed() {
		assert!(Manifest::parse(b"Manifest-Version 1.0\r\n").is_err());
		assert!(Manifest::parse(b" continued\r\n").is_err());
		assert!(Manifest::parse(b"Manifest-Version: 1.0\r\n\r\nX: y\r\n").is_err());
		assert!(Manifest::parse(&[0xFF, 0xFE]).is_err());
	}

	#[test]
	fn long_lines_are_wrapped() -> Result<()> {
		let mut manifest = Manifest::default();
		let value = "x".repeat(100);
		manifest.main.insert("Long".to_owned(), value.clone());

		let written = manifest.write();
		let text = String::from_utf8(written.clone())?;
		let lines: Vec<&str> = text.split("\r\n").collect();
		assert_eq!(lines[0].len(), 72);
		assert!(lines[1].starts_with(' '));
		assert!(lines.iter().all(|line| line.len() <= 72));

		assert_eq!(Manifest::parse(&written)?.main["Long"], value);
		Ok(())
	}
}
