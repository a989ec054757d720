//! The inheritance facts of a class.

use anyhow::{anyhow, Context, Result};
use crate::class_file::{ClassFile, Member};
use crate::flags;
use crate::pool::Pool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
	pub name: String,
	pub descriptor: String,
	pub access: u16,
}

impl MemberInfo {
	pub fn new(name: impl Into<String>, descriptor: impl Into<String>, access: u16) -> MemberInfo {
		MemberInfo { name: name.into(), descriptor: descriptor.into(), access }
	}

	fn read(pool: &Pool, member: &Member) -> Result<MemberInfo> {
		Ok(MemberInfo {
			name: pool.get_utf8(member.name_index)?,
			descriptor: pool.get_utf8(member.descriptor_index)?,
			access: member.access_flags,
		})
	}

	pub fn is_private(&self) -> bool {
		self.access & flags::ACC_PRIVATE != 0
	}

	pub fn is_static(&self) -> bool {
		self.access & flags::ACC_STATIC != 0
	}
}

/// What a class declares: its super class, interfaces, fields and methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
	pub name: String,
	pub access: u16,
	pub super_class: Option<String>,
	pub interfaces: Vec<String>,
	pub fields: Vec<MemberInfo>,
	pub methods: Vec<MemberInfo>,
}

impl ClassInfo {
	pub fn get_field(&self, name: &str, desc: &str) -> Option<&MemberInfo> {
		self.fields.iter().find(|field| field.name == name && field.descriptor == desc)
	}

	pub fn get_method(&self, name: &str, desc: &str) -> Option<&MemberInfo> {
		self.methods.iter().find(|method| method.name == name && method.descriptor == desc)
	}

	pub fn is_interface(&self) -> bool {
		self.access & flags::ACC_INTERFACE != 0
	}

	/// The super class followed by the interfaces.
	pub fn parents(&self) -> impl Iterator<Item=&str> {
		self.super_class.iter().chain(self.interfaces.iter()).map(String::as_str)
	}
}

impl ClassFile {
	pub fn info(&self) -> Result<ClassInfo> {
		let pool = &self.pool;
		Ok(ClassInfo {
			name: self.name()?,
			access: self.access_flags,
			super_class: pool.get_optional_class(self.super_class)?,
			interfaces: self.interfaces.iter()
				.map(|&interface| pool.get_class(interface))
				.collect::<Result<_>>()?,
			fields: self.fields.iter()
				.map(|field| MemberInfo::read(pool, field))
				.collect::<Result<_>>()?,
			methods: self.methods.iter()
				.map(|method| MemberInfo::read(pool, method))
				.collect::<Result<_>>()?,
		})
	}
}

/// Reads the inheritance facts out of the bytes of a class file.
pub fn read_class_info(data: &[u8]) -> Result<ClassInfo> {
	ClassFile::read(data)
		.and_then(|class| class.info())
		.with_context(|| anyhow!("failed to read class info"))
}
