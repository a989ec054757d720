//! Remapping of generic signatures, as found in the `Signature` attribute.

use anyhow::{anyhow, bail, Context, Result};
use crate::remapper::ARemapper;

/// Maps all class names in a class, method or field signature.
pub(crate) fn map_signature(remapper: &(impl ARemapper + ?Sized), signature: &str) -> Result<String> {
	let mut parser = Parser { remapper, input: signature, pos: 0, out: String::with_capacity(signature.len()) };
	parser.signature()
		.with_context(|| anyhow!("failed to map signature {signature:?}"))?;
	Ok(parser.out)
}

struct Parser<'a, R: ?Sized> {
	remapper: &'a R,
	input: &'a str,
	pos: usize,
	out: String,
}

impl<'a, R: ARemapper + ?Sized> Parser<'a, R> {
	fn peek(&self) -> Option<u8> {
		self.input.as_bytes().get(self.pos).copied()
	}

	fn expect(&mut self, c: u8) -> Result<()> {
		match self.peek() {
			Some(x) if x == c => {
				self.out.push(c as char);
				self.pos += 1;
				Ok(())
			},
			Some(x) => bail!("expected {:?} at {}, got {:?}", c as char, self.pos, x as char),
			None => bail!("expected {:?} at {}, got the end", c as char, self.pos),
		}
	}

	/// Reads up to, but not including, the first of the given delimiters.
	fn identifier(&mut self, delimiters: &[u8]) -> Result<&'a str> {
		let rest = &self.input[self.pos..];
		let length = rest.bytes().position(|c| delimiters.contains(&c))
			.with_context(|| anyhow!("unterminated identifier at {}", self.pos))?;
		self.pos += length;
		Ok(&rest[..length])
	}

	fn signature(&mut self) -> Result<()> {
		if self.peek() == Some(b'<') {
			self.type_parameters()?;
		}

		if self.peek() == Some(b'(') {
			self.expect(b'(')?;
			while self.peek() != Some(b')') {
				self.java_type()?;
			}
			self.expect(b')')?;
			if self.peek() == Some(b'V') {
				self.expect(b'V')?;
			} else {
				self.java_type()?;
			}
			while self.peek() == Some(b'^') {
				self.expect(b'^')?;
				self.reference_type()?;
			}
			if self.pos != self.input.len() {
				bail!("unexpected content after method signature at {}", self.pos);
			}
		} else {
			// a field signature is one type, a class signature is the super class followed by interfaces
			while self.pos < self.input.len() {
				self.reference_type()?;
			}
		}
		Ok(())
	}

	fn type_parameters(&mut self) -> Result<()> {
		self.expect(b'<')?;
		while self.peek() != Some(b'>') {
			let name = self.identifier(b":")?;
			self.out.push_str(name);
			// class bound, which may be empty, and interface bounds
			while self.peek() == Some(b':') {
				self.expect(b':')?;
				if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
					self.reference_type()?;
				}
			}
		}
		self.expect(b'>')
	}

	fn java_type(&mut self) -> Result<()> {
		match self.peek() {
			Some(c @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z')) => self.expect(c),
			_ => self.reference_type(),
		}
	}

	fn reference_type(&mut self) -> Result<()> {
		match self.peek() {
			Some(b'L') => self.class_type(),
			Some(b'T') => {
				self.expect(b'T')?;
				let name = self.identifier(b";")?;
				self.out.push_str(name);
				self.expect(b';')
			},
			Some(b'[') => {
				self.expect(b'[')?;
				self.java_type()
			},
			Some(c) => bail!("unexpected {:?} at {}", c as char, self.pos),
			None => bail!("unexpected end at {}", self.pos),
		}
	}

	fn class_type(&mut self) -> Result<()> {
		self.expect(b'L')?;
		let mut name = self.identifier(b"<.;")?.to_owned();
		let mut mapped = self.remapper.map_class(&name)?;
		self.out.push_str(&mapped);

		loop {
			match self.peek() {
				Some(b'<') => self.type_arguments()?,
				Some(b'.') => {
					self.expect(b'.')?;
					let inner = self.identifier(b"<.;")?;
					name = format!("{name}${inner}");

					let mapped_inner = self.remapper.map_class(&name)?;
					let outer_prefix = format!("{mapped}$");
					let simple = match mapped_inner.strip_prefix(&outer_prefix) {
						Some(simple) => simple,
						None => mapped_inner.rsplit_once('$').map_or(mapped_inner.as_str(), |(_, simple)| simple),
					};
					self.out.push_str(simple);
					mapped = mapped_inner;
				},
				_ => return self.expect(b';'),
			}
		}
	}

	fn type_arguments(&mut self) -> Result<()> {
		self.expect(b'<')?;
		while self.peek() != Some(b'>') {
			match self.peek() {
				Some(b'*') => self.expect(b'*')?,
				Some(c @ (b'+' | b'-')) => {
					self.expect(c)?;
					self.reference_type()?;
				},
				_ => self.reference_type()?,
			}
		}
		self.expect(b'>')
	}
}

#[cfg(test)]
mod testing {
	use std::collections::HashMap;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::remapper::ARemapper;

	struct Classes(HashMap<&'static str, &'static str>);

	impl ARemapper for Classes {
		fn map_class_fail(&self, class: &str) -> Result<Option<String>> {
			Ok(self.0.get(class).map(|&x| x.to_owned()))
		}
	}

	fn classes() -> Classes {
		Classes(HashMap::from([
			("a", "net/Foo"),
			("a$b", "net/Foo$Bar"),
			("c", "net/Baz"),
			("T", "net/NotATypeVariable"),
		]))
	}

	#[test]
	fn field_and_class_signatures() -> Result<()> {
		let remapper = classes();
		assert_eq!(remapper.map_signature("La<TT;>;")?, "Lnet/Foo<TT;>;");
		assert_eq!(remapper.map_signature("[La<*>;")?, "[Lnet/Foo<*>;");
		assert_eq!(
			remapper.map_signature("<T:Ljava/lang/Object;U::Lc;>La<+TT;>;Lc;")?,
			"<T:Ljava/lang/Object;U::Lnet/Baz;>Lnet/Foo<+TT;>;Lnet/Baz;",
		);
		Ok(())
	}

	#[test]
	fn method_signatures() -> Result<()> {
		let remapper = classes();
		assert_eq!(
			remapper.map_signature("<T:La;>(TT;Ljava/util/List<-Lc;>;I)La<TT;>;^Lc;^TT;")?,
			"<T:Lnet/Foo;>(TT;Ljava/util/List<-Lnet/Baz;>;I)Lnet/Foo<TT;>;^Lnet/Baz;^TT;",
		);
		assert_eq!(remapper.map_signature("()V")?, "()V");
		Ok(())
	}

	#[test]
	fn inner_classes() -> Result<()> {
		let remapper = classes();
		assert_eq!(remapper.map_signature("La<TT;>.b<Lc;>;")?, "Lnet/Foo<TT;>.Bar<Lnet/Baz;>;");
		// an inner class without mapping keeps its simple name
		assert_eq!(remapper.map_signature("Lc.d;")?, "Lnet/Baz.d;");
		Ok(())
	}

	#[test]
	fn malformed() {
		let remapper = classes();
		assert!(remapper.map_signature("La").is_err());
		assert!(remapper.map_signature("<T:La;>(").is_err());
		assert!(remapper.map_signature("Q").is_err());
	}
}
