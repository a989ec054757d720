use std::cmp::Ordering;
use std::iter::Peekable;
use anyhow::{anyhow, bail, Context, Result};

/// One line of a tab separated mappings file, split into its fields.
#[derive(Debug)]
pub(crate) struct TinyLine {
	pub(crate) line_number: usize,
	idents: usize,
	pub(crate) first_field: String,
	fields: std::vec::IntoIter<String>,
}

impl TinyLine {
	pub(crate) fn new(line_number: usize, line: &str) -> Result<TinyLine> {
		// tabs are a single byte each, so slicing at the count is fine
		let idents = line.bytes().take_while(|&x| x == b'\t').count();
		let mut fields = line[idents..].split('\t').map(str::to_owned);

		let first_field = fields.next()
			.with_context(|| anyhow!("no first field in line {line_number}"))?;

		Ok(TinyLine {
			line_number,
			idents,
			first_field,
			fields: fields.collect::<Vec<_>>().into_iter(),
		})
	}

	pub(crate) fn next(&mut self) -> Result<String> {
		self.fields.next()
			.with_context(|| anyhow!("expected another field in line {}", self.line_number))
	}

	/// Takes the remaining fields, expecting exactly `count` of them.
	pub(crate) fn names(self, count: usize) -> Result<Vec<String>> {
		let names: Vec<String> = self.fields.collect();
		if names.len() != count {
			bail!("line {} contained {} names, expected {count}: {names:?}", self.line_number, names.len());
		}
		Ok(names)
	}

	pub(crate) fn rest(self) -> Vec<String> {
		self.fields.collect()
	}
}

/// Iterates over the lines with exactly the current indentation, stopping at the first line with less.
pub(crate) struct WithMoreIdentIter<'a, I: Iterator> {
	depth: usize,
	iter: &'a mut Peekable<I>,
}

impl<'a, I> WithMoreIdentIter<'a, I>
where
	I: Iterator<Item=Result<TinyLine>>,
{
	pub(crate) fn new(iter: &'a mut Peekable<I>) -> WithMoreIdentIter<'a, I> {
		WithMoreIdentIter { depth: 0, iter }
	}

	pub(crate) fn next_level(&mut self) -> WithMoreIdentIter<'_, I> {
		WithMoreIdentIter {
			depth: self.depth + 1,
			iter: self.iter,
		}
	}

	/// Skips everything nested deeper than the current level, for sections that aren't read.
	pub(crate) fn skip_level(&mut self) -> Result<()> {
		while let Some(Ok(line)) = self.iter.peek() {
			if line.idents <= self.depth {
				break;
			}
			self.iter.next();
		}
		Ok(())
	}

	pub(crate) fn on_every_line(mut self, mut f: impl FnMut(&mut Self, TinyLine) -> Result<()>) -> Result<()> {
		while let Some(line) = self.next() {
			let line = line?;
			let line_number = line.line_number;

			f(&mut self, line)
				.with_context(|| anyhow!("in line {line_number}"))?;
		}
		Ok(())
	}
}

impl<I> Iterator for WithMoreIdentIter<'_, I>
where
	I: Iterator<Item=Result<TinyLine>>,
{
	type Item = Result<TinyLine>;

	fn next(&mut self) -> Option<Self::Item> {
		match self.iter.peek()? {
			Ok(line) => match line.idents.cmp(&self.depth) {
				Ordering::Less => None,
				Ordering::Equal => self.iter.next(),
				Ordering::Greater => Some(Err(anyhow!("expected an indentation of {} for line {}", self.depth, line.line_number))),
			},
			Err(_) => self.iter.next(),
		}
	}
}
