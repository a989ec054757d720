//! The structure of a class file, with attributes left as raw bytes.

use anyhow::{anyhow, bail, Context, Result};
use crate::{ClassRead, ClassWrite};
use crate::pool::Pool;

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	pub name_index: u16,
	pub info: Vec<u8>,
}

impl Attribute {
	fn read(reader: &mut impl ClassRead) -> Result<Attribute> {
		let name_index = reader.read_u16()?;
		let length = reader.read_u32_as_usize()?;
		let info = reader.read_u8_vec(length)
			.with_context(|| anyhow!("failed to read attribute with name index {name_index}"))?;
		Ok(Attribute { name_index, info })
	}

	fn write(&self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_u16(self.name_index)?;
		writer.write_usize_as_u32(self.info.len())?;
		writer.write_u8_slice(&self.info)
	}
}

pub(crate) fn read_attributes(reader: &mut impl ClassRead) -> Result<Vec<Attribute>> {
	reader.read_vec(
		|r| r.read_u16_as_usize(),
		Attribute::read,
	)
}

pub(crate) fn write_attributes(writer: &mut impl ClassWrite, attributes: &[Attribute]) -> Result<()> {
	writer.write_slice(attributes, |w, size| w.write_usize_as_u16(size), |w, attribute| attribute.write(w))
}

/// A field or a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
	pub access_flags: u16,
	pub name_index: u16,
	pub descriptor_index: u16,
	pub attributes: Vec<Attribute>,
}

impl Member {
	fn read(reader: &mut impl ClassRead) -> Result<Member> {
		Ok(Member {
			access_flags: reader.read_u16()?,
			name_index: reader.read_u16()?,
			descriptor_index: reader.read_u16()?,
			attributes: read_attributes(reader)?,
		})
	}

	fn write(&self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_u16(self.access_flags)?;
		writer.write_u16(self.name_index)?;
		writer.write_u16(self.descriptor_index)?;
		write_attributes(writer, &self.attributes)
	}
}

#[derive(Debug, Clone)]
pub struct ClassFile {
	pub minor_version: u16,
	pub major_version: u16,
	pub pool: Pool,
	pub access_flags: u16,
	pub this_class: u16,
	/// `0` for `java/lang/Object` and modules.
	pub super_class: u16,
	pub interfaces: Vec<u16>,
	pub fields: Vec<Member>,
	pub methods: Vec<Member>,
	pub attributes: Vec<Attribute>,
}

impl ClassFile {
	pub fn read(data: &[u8]) -> Result<ClassFile> {
		let reader = &mut &data[..];

		let magic = reader.read_u32()?;
		if magic != MAGIC {
			bail!("magic didn't match up: {magic:x}");
		}

		let minor_version = reader.read_u16()?;
		let major_version = reader.read_u16()?;
		let pool = Pool::read(reader).context("failed to read constant pool")?;

		let class = ClassFile {
			minor_version,
			major_version,
			pool,
			access_flags: reader.read_u16()?,
			this_class: reader.read_u16()?,
			super_class: reader.read_u16()?,
			interfaces: reader.read_vec(|r| r.read_u16_as_usize(), |r| r.read_u16())?,
			fields: reader.read_vec(|r| r.read_u16_as_usize(), Member::read).context("failed to read fields")?,
			methods: reader.read_vec(|r| r.read_u16_as_usize(), Member::read).context("failed to read methods")?,
			attributes: read_attributes(reader).context("failed to read class attributes")?,
		};

		if !reader.is_empty() {
			bail!("expected end of class file, got {} more bytes", reader.len());
		}

		Ok(class)
	}

	pub fn write(&self) -> Result<Vec<u8>> {
		let mut writer = Vec::new();

		writer.write_u32(MAGIC)?;
		writer.write_u16(self.minor_version)?;
		writer.write_u16(self.major_version)?;
		self.pool.write(&mut writer)?;
		writer.write_u16(self.access_flags)?;
		writer.write_u16(self.this_class)?;
		writer.write_u16(self.super_class)?;
		writer.write_slice(&self.interfaces, |w, size| w.write_usize_as_u16(size), |w, &interface| w.write_u16(interface))?;
		writer.write_slice(&self.fields, |w, size| w.write_usize_as_u16(size), |w, field| field.write(w))?;
		writer.write_slice(&self.methods, |w, size| w.write_usize_as_u16(size), |w, method| method.write(w))?;
		write_attributes(&mut writer, &self.attributes)?;

		Ok(writer)
	}

	pub fn name(&self) -> Result<String> {
		self.pool.get_class(self.this_class)
	}

	/// Finds the first attribute with the given name.
	pub fn find_attribute<'a>(&self, attributes: &'a [Attribute], name: &str) -> Result<Option<&'a Attribute>> {
		for attribute in attributes {
			if self.pool.get_utf8(attribute.name_index)? == name {
				return Ok(Some(attribute));
			}
		}
		Ok(None)
	}
}

impl ClassFile {
	/// Creates a class file without any members, for java 8.
	pub fn new(access_flags: u16, name: &str, super_class: Option<&str>, interfaces: &[&str]) -> Result<ClassFile> {
		let mut pool = Pool::new();

		let this_class = pool.put_class(name)?;
		let super_class = super_class.map(|super_class| pool.put_class(super_class)).transpose()?.unwrap_or(0);
		let interfaces = interfaces.iter()
			.map(|interface| pool.put_class(interface))
			.collect::<Result<_>>()?;

		Ok(ClassFile {
			minor_version: 0,
			major_version: 52,
			pool,
			access_flags,
			this_class,
			super_class,
			interfaces,
			fields: Vec::new(),
			methods: Vec::new(),
			attributes: Vec::new(),
		})
	}

	pub fn attribute(&mut self, name: &str, info: Vec<u8>) -> Result<Attribute> {
		Ok(Attribute { name_index: self.pool.put_utf8(name)?, info })
	}

	pub fn add_field(&mut self, access_flags: u16, name: &str, desc: &str, attributes: Vec<Attribute>) -> Result<()> {
		let field = Member {
			access_flags,
			name_index: self.pool.put_utf8(name)?,
			descriptor_index: self.pool.put_utf8(desc)?,
			attributes,
		};
		self.fields.push(field);
		Ok(())
	}

	pub fn add_method(&mut self, access_flags: u16, name: &str, desc: &str, attributes: Vec<Attribute>) -> Result<()> {
		let method = Member {
			access_flags,
			name_index: self.pool.put_utf8(name)?,
			descriptor_index: self.pool.put_utf8(desc)?,
			attributes,
		};
		self.methods.push(method);
		Ok(())
	}
}
