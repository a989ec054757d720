//! The constant pool of a class file.
//!
//! Entries are kept at their original indices. New entries can only be appended, which keeps every index stored in
//! code and attributes valid.

use std::collections::HashMap;
use anyhow::{anyhow, bail, Context, Result};
use crate::{ClassRead, ClassWrite, jstring};

pub mod tag {
	pub const UTF8: u8                 = 1;
	pub const INTEGER: u8              = 3;
	pub const FLOAT: u8                = 4;
	pub const LONG: u8                 = 5;
	pub const DOUBLE: u8               = 6;
	pub const CLASS: u8                = 7;
	pub const STRING: u8               = 8;
	pub const FIELD_REF: u8            = 9;
	pub const METHOD_REF: u8           = 10;
	pub const INTERFACE_METHOD_REF: u8 = 11;
	pub const NAME_AND_TYPE: u8        = 12;
	pub const METHOD_HANDLE: u8        = 15;
	pub const METHOD_TYPE: u8          = 16;
	pub const DYNAMIC: u8              = 17;
	pub const INVOKE_DYNAMIC: u8       = 18;
	pub const MODULE: u8               = 19;
	pub const PACKAGE: u8              = 20;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolEntry {
	Class { name_index: u16 },
	FieldRef { class_index: u16, name_and_type_index: u16 },
	MethodRef { class_index: u16, name_and_type_index: u16 },
	InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
	String { string_index: u16 },
	Integer { bytes: u32 },
	Float { bytes: u32 },
	Long { bytes: u64 },
	Double { bytes: u64 },
	NameAndType { name_index: u16, descriptor_index: u16 },
	/// The raw modified UTF-8 contents, only decoded on access.
	Utf8 { bytes: Vec<u8> },
	MethodHandle { reference_kind: u8, reference_index: u16 },
	MethodType { descriptor_index: u16 },
	Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
	InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
	Module { name_index: u16 },
	Package { name_index: u16 },
}

impl PoolEntry {
	fn read(reader: &mut impl ClassRead) -> Result<PoolEntry> {
		Ok(match reader.read_u8()? {
			tag::UTF8 => {
				let length = reader.read_u16_as_usize()?;
				PoolEntry::Utf8 { bytes: reader.read_u8_vec(length)? }
			},
			tag::INTEGER => PoolEntry::Integer { bytes: reader.read_u32()? },
			tag::FLOAT => PoolEntry::Float { bytes: reader.read_u32()? },
			tag::LONG => PoolEntry::Long { bytes: read_u64(reader)? },
			tag::DOUBLE => PoolEntry::Double { bytes: read_u64(reader)? },
			tag::CLASS => PoolEntry::Class { name_index: reader.read_u16()? },
			tag::STRING => PoolEntry::String { string_index: reader.read_u16()? },
			tag::FIELD_REF => PoolEntry::FieldRef { class_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
			tag::METHOD_REF => PoolEntry::MethodRef { class_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
			tag::INTERFACE_METHOD_REF => PoolEntry::InterfaceMethodRef { class_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
			tag::NAME_AND_TYPE => PoolEntry::NameAndType { name_index: reader.read_u16()?, descriptor_index: reader.read_u16()? },
			tag::METHOD_HANDLE => PoolEntry::MethodHandle { reference_kind: reader.read_u8()?, reference_index: reader.read_u16()? },
			tag::METHOD_TYPE => PoolEntry::MethodType { descriptor_index: reader.read_u16()? },
			tag::DYNAMIC => PoolEntry::Dynamic { bootstrap_method_attr_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
			tag::INVOKE_DYNAMIC => PoolEntry::InvokeDynamic { bootstrap_method_attr_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
			tag::MODULE => PoolEntry::Module { name_index: reader.read_u16()? },
			tag::PACKAGE => PoolEntry::Package { name_index: reader.read_u16()? },
			tag => bail!("unknown constant pool tag {tag}"),
		})
	}

	fn write(&self, writer: &mut impl ClassWrite) -> Result<()> {
		match self {
			PoolEntry::Utf8 { bytes } => {
				writer.write_u8(tag::UTF8)?;
				writer.write_usize_as_u16(bytes.len())?;
				writer.write_u8_slice(bytes)?;
			},
			&PoolEntry::Integer { bytes } => {
				writer.write_u8(tag::INTEGER)?;
				writer.write_u32(bytes)?;
			},
			&PoolEntry::Float { bytes } => {
				writer.write_u8(tag::FLOAT)?;
				writer.write_u32(bytes)?;
			},
			&PoolEntry::Long { bytes } => {
				writer.write_u8(tag::LONG)?;
				writer.write_u8_slice(&bytes.to_be_bytes())?;
			},
			&PoolEntry::Double { bytes } => {
				writer.write_u8(tag::DOUBLE)?;
				writer.write_u8_slice(&bytes.to_be_bytes())?;
			},
			&PoolEntry::Class { name_index } => {
				writer.write_u8(tag::CLASS)?;
				writer.write_u16(name_index)?;
			},
			&PoolEntry::String { string_index } => {
				writer.write_u8(tag::STRING)?;
				writer.write_u16(string_index)?;
			},
			&PoolEntry::FieldRef { class_index, name_and_type_index } => {
				writer.write_u8(tag::FIELD_REF)?;
				writer.write_u16(class_index)?;
				writer.write_u16(name_and_type_index)?;
			},
			&PoolEntry::MethodRef { class_index, name_and_type_index } => {
				writer.write_u8(tag::METHOD_REF)?;
				writer.write_u16(class_index)?;
				writer.write_u16(name_and_type_index)?;
			},
			&PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } => {
				writer.write_u8(tag::INTERFACE_METHOD_REF)?;
				writer.write_u16(class_index)?;
				writer.write_u16(name_and_type_index)?;
			},
			&PoolEntry::NameAndType { name_index, descriptor_index } => {
				writer.write_u8(tag::NAME_AND_TYPE)?;
				writer.write_u16(name_index)?;
				writer.write_u16(descriptor_index)?;
			},
			&PoolEntry::MethodHandle { reference_kind, reference_index } => {
				writer.write_u8(tag::METHOD_HANDLE)?;
				writer.write_u8(reference_kind)?;
				writer.write_u16(reference_index)?;
			},
			&PoolEntry::MethodType { descriptor_index } => {
				writer.write_u8(tag::METHOD_TYPE)?;
				writer.write_u16(descriptor_index)?;
			},
			&PoolEntry::Dynamic { bootstrap_method_attr_index, name_and_type_index } => {
				writer.write_u8(tag::DYNAMIC)?;
				writer.write_u16(bootstrap_method_attr_index)?;
				writer.write_u16(name_and_type_index)?;
			},
			&PoolEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => {
				writer.write_u8(tag::INVOKE_DYNAMIC)?;
				writer.write_u16(bootstrap_method_attr_index)?;
				writer.write_u16(name_and_type_index)?;
			},
			&PoolEntry::Module { name_index } => {
				writer.write_u8(tag::MODULE)?;
				writer.write_u16(name_index)?;
			},
			&PoolEntry::Package { name_index } => {
				writer.write_u8(tag::PACKAGE)?;
				writer.write_u16(name_index)?;
			},
		}
		Ok(())
	}

	fn is_wide(&self) -> bool {
		matches!(self, PoolEntry::Long { .. } | PoolEntry::Double { .. })
	}
}

fn read_u64(reader: &mut impl ClassRead) -> Result<u64> {
	Ok(u64::from_be_bytes(reader.read_n().context("couldn't read u64, perhaps the data's end is reached?")?))
}

#[derive(Debug, Clone, Default)]
pub struct Pool {
	/// Index `0` and the slot after a `Long` or `Double` entry are `None`.
	entries: Vec<Option<PoolEntry>>,
	utf8s: HashMap<Vec<u8>, u16>,
	name_and_types: HashMap<(u16, u16), u16>,
}

impl Pool {
	pub fn new() -> Pool {
		// slot `0` is never used
		Pool { entries: vec![None], ..Pool::default() }
	}

	pub(crate) fn read(reader: &mut impl ClassRead) -> Result<Pool> {
		let count = reader.read_u16_as_usize()?;

		let mut pool = Pool { entries: Vec::with_capacity(count), ..Pool::default() };
		pool.entries.push(None);

		while pool.entries.len() < count {
			let index = pool.entries.len();
			let entry = PoolEntry::read(reader)
				.with_context(|| anyhow!("failed to read constant pool entry {index}"))?;
			pool.remember(index as u16, &entry);

			let wide = entry.is_wide();
			pool.entries.push(Some(entry));
			if wide {
				pool.entries.push(None);
			}
		}

		if pool.entries.len() != count {
			bail!("wide constant pool entry at index {} overflows the constant pool count {count}", count - 1);
		}

		Ok(pool)
	}

	pub(crate) fn write(&self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_usize_as_u16(self.entries.len())?;
		for entry in self.entries.iter().flatten() {
			entry.write(writer)?;
		}
		Ok(())
	}

	/// Remembers the first index of each `Utf8` and `NameAndType` entry, for reusing them when appending.
	fn remember(&mut self, index: u16, entry: &PoolEntry) {
		match entry {
			PoolEntry::Utf8 { bytes } => {
				self.utf8s.entry(bytes.clone()).or_insert(index);
			},
			&PoolEntry::NameAndType { name_index, descriptor_index } => {
				self.name_and_types.entry((name_index, descriptor_index)).or_insert(index);
			},
			_ => {},
		}
	}

	fn push(&mut self, entry: PoolEntry) -> Result<u16> {
		let index = self.entries.len();
		// the count is stored as an u16, and is one larger than the largest index
		let wide = entry.is_wide();
		let count_after = index + if wide { 2 } else { 1 };
		if count_after > u16::MAX as usize {
			bail!("constant pool overflow: can't add {entry:?}, the pool already has {index} entries");
		}
		let index = index as u16;
		self.remember(index, &entry);
		self.entries.push(Some(entry));
		if wide {
			self.entries.push(None);
		}
		Ok(index)
	}

	/// The number of slots in the pool, including the unused slot `0`. This is the `constant_pool_count`.
	pub fn count(&self) -> usize {
		self.entries.len()
	}

	/// Iterates over all the used indices of the pool, in ascending order.
	pub fn indices(&self) -> impl Iterator<Item=u16> + '_ {
		self.entries.iter()
			.enumerate()
			.filter(|(_, entry)| entry.is_some())
			.map(|(index, _)| index as u16)
	}

	pub fn get(&self, index: u16) -> Result<&PoolEntry> {
		self.entries.get(index as usize)
			.and_then(|entry| entry.as_ref())
			.with_context(|| anyhow!("invalid constant pool index {index}"))
	}

	pub(crate) fn set(&mut self, index: u16, entry: PoolEntry) -> Result<()> {
		let slot = self.entries.get_mut(index as usize)
			.and_then(|entry| entry.as_mut())
			.with_context(|| anyhow!("invalid constant pool index {index}"))?;
		if slot.is_wide() != entry.is_wide() {
			bail!("can't replace {slot:?} at {index} with {entry:?}: differing widths");
		}
		*slot = entry;
		Ok(())
	}

	pub fn get_utf8(&self, index: u16) -> Result<String> {
		let PoolEntry::Utf8 { bytes } = self.get(index)? else {
			bail!("pool entry {index} not `Utf8`: {:?}", self.get(index)?);
		};
		jstring::decode(bytes)
			.with_context(|| anyhow!("failed to decode `Utf8` pool entry {index}"))
	}

	pub fn get_class(&self, index: u16) -> Result<String> {
		let &PoolEntry::Class { name_index } = self.get(index)? else {
			bail!("pool entry {index} not `Class`: {:?}", self.get(index)?);
		};
		self.get_utf8(name_index)
	}

	/// Like [`Pool::get_class`], but treats index `0` as no class.
	pub fn get_optional_class(&self, index: u16) -> Result<Option<String>> {
		if index == 0 {
			Ok(None)
		} else {
			self.get_class(index).map(Some)
		}
	}

	pub fn get_name_and_type(&self, index: u16) -> Result<(String, String)> {
		let &PoolEntry::NameAndType { name_index, descriptor_index } = self.get(index)? else {
			bail!("pool entry {index} not `NameAndType`: {:?}", self.get(index)?);
		};
		Ok((self.get_utf8(name_index)?, self.get_utf8(descriptor_index)?))
	}

	/// Reads a `FieldRef`, `MethodRef` or `InterfaceMethodRef`, giving back owner, name and descriptor.
	pub fn get_member_ref(&self, index: u16) -> Result<(String, String, String)> {
		let (class_index, name_and_type_index) = match *self.get(index)? {
			PoolEntry::FieldRef { class_index, name_and_type_index } |
			PoolEntry::MethodRef { class_index, name_and_type_index } |
			PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } => (class_index, name_and_type_index),
			ref entry => bail!("pool entry {index} not a member reference: {entry:?}"),
		};
		let owner = self.get_class(class_index)?;
		let (name, desc) = self.get_name_and_type(name_and_type_index)?;
		Ok((owner, name, desc))
	}

	/// Returns the index of an `Utf8` entry with the given contents, appending one if none exists.
	pub fn put_utf8(&mut self, string: &str) -> Result<u16> {
		let bytes = jstring::encode(string);
		if let Some(&index) = self.utf8s.get(&bytes) {
			return Ok(index);
		}
		self.push(PoolEntry::Utf8 { bytes })
	}

	/// Returns the index of a `Class` entry with the given name, appending one if none exists.
	pub fn put_class(&mut self, name: &str) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		let existing = self.entries.iter()
			.position(|entry| entry == &Some(PoolEntry::Class { name_index }));
		match existing {
			Some(index) => Ok(index as u16),
			None => self.push(PoolEntry::Class { name_index }),
		}
	}

	/// Appends an entry, without checking if it's already in the pool.
	pub fn put(&mut self, entry: PoolEntry) -> Result<u16> {
		self.push(entry)
	}

	/// Returns the index of a `NameAndType` entry with the given contents, appending one if none exists.
	pub fn put_name_and_type(&mut self, name: &str, desc: &str) -> Result<u16> {
		let key = (self.put_utf8(name)?, self.put_utf8(desc)?);
		if let Some(&index) = self.name_and_types.get(&key) {
			return Ok(index);
		}
		self.push(PoolEntry::NameAndType { name_index: key.0, descriptor_index: key.1 })
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::pool::{Pool, PoolEntry};

	fn pool_bytes() -> Vec<u8> {
		vec![
			0x00, 0x06, // count
			0x01, 0x00, 0x03, b'F', b'o', b'o', // #1 Utf8 "Foo"
			0x07, 0x00, 0x01, // #2 Class #1
			0x05, 0, 0, 0, 0, 0, 0, 0, 42, // #3 Long 42, takes #4 too
			0x01, 0x00, 0x01, b'I', // #5 Utf8 "I"
		]
	}

	#[test]
	fn read_and_write_back() -> Result<()> {
		let bytes = pool_bytes();
		let pool = Pool::read(&mut bytes.as_slice())?;

		assert_eq!(pool.count(), 6);
		assert_eq!(pool.indices().collect::<Vec<_>>(), vec![1, 2, 3, 5]);
		assert_eq!(pool.get_class(2)?, "Foo");
		assert_eq!(pool.get(3)?, &PoolEntry::Long { bytes: 42 });
		assert!(pool.get(4).is_err());

		let mut written = Vec::new();
		pool.write(&mut written)?;
		assert_eq!(written, bytes);
		Ok(())
	}

	#[test]
	fn put_reuses_existing_entries() -> Result<()> {
		let mut pool = Pool::read(&mut pool_bytes().as_slice())?;

		assert_eq!(pool.put_utf8("Foo")?, 1);
		assert_eq!(pool.put_utf8("Bar")?, 6);
		assert_eq!(pool.put_utf8("Bar")?, 6);
		assert_eq!(pool.put_name_and_type("Foo", "I")?, 7);
		assert_eq!(pool.put_name_and_type("Foo", "I")?, 7);
		assert_eq!(pool.get_name_and_type(7)?, ("Foo".to_owned(), "I".to_owned()));
		assert_eq!(pool.count(), 8);
		Ok(())
	}

	#[test]
	fn wide_entry_at_the_end_is_rejected() {
		let bytes = vec![0x00, 0x02, 0x06, 0, 0, 0, 0, 0, 0, 0, 0];
		assert!(Pool::read(&mut bytes.as_slice()).is_err());
	}
}
