use anyhow::{anyhow, bail, Context, Result};
use crate::class_file::{read_attributes, write_attributes, Attribute};
use crate::descriptor;
use crate::remap::{MethodContext, RemapPolicy, Remapper};
use crate::{ClassRead, ClassWrite};

impl<P: RemapPolicy + ?Sized> Remapper<'_, P> {
	pub(super) fn remap_attributes(&mut self, attributes: &mut [Attribute], method: Option<&MethodContext>) -> Result<()> {
		for attribute in attributes {
			let name = self.utf8(attribute.name_index)?;
			let info = self.remap_attribute(&name, &attribute.info, method)
				.with_context(|| anyhow!("failed to remap attribute {name:?}"))?;
			if let Some(info) = info {
				attribute.info = info;
			}
		}
		Ok(())
	}

	/// Gives back the new contents, or `None` for attributes that don't contain anything to rename.
	fn remap_attribute(&mut self, name: &str, info: &[u8], method: Option<&MethodContext>) -> Result<Option<Vec<u8>>> {
		let reader = &mut &info[..];
		let mut writer = Vec::with_capacity(info.len());
		let w = &mut writer;

		match name {
			"Signature" => self.remap_signature(reader, w)?,
			"RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => self.remap_annotations(reader, w)?,
			"RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
				let parameters = reader.read_u8()?;
				w.write_u8(parameters)?;
				for _ in 0..parameters {
					self.remap_annotations(reader, w)?;
				}
			},
			"RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => self.remap_type_annotations(reader, w)?,
			"AnnotationDefault" => self.remap_element_value(reader, w)?,
			"InnerClasses" => self.remap_inner_classes(reader, w)?,
			"EnclosingMethod" => self.remap_enclosing_method(reader, w)?,
			"Record" => self.remap_record(reader, w)?,
			"Code" => {
				let method = method.context("`Code` attribute outside of a method")?;
				self.remap_code(reader, w, method)?;
			},
			"LocalVariableTable" | "LocalVariableTypeTable" => {
				let method = method.with_context(|| anyhow!("{name:?} attribute outside of a method"))?;
				self.remap_local_variables(reader, w, method, name == "LocalVariableTypeTable")?;
			},
			"MethodParameters" => {
				let method = method.context("`MethodParameters` attribute outside of a method")?;
				self.remap_method_parameters(reader, w, method)?;
			},
			_ => return Ok(None),
		}

		if !reader.is_empty() {
			bail!("attribute has {} trailing bytes", reader.len());
		}
		Ok(Some(writer))
	}

	fn remap_signature(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite) -> Result<()> {
		let index = r.read_u16()?;
		let signature = self.utf8(index)?;
		let new_signature = self.policy.map_signature(&signature)?;
		w.write_u16(self.replace_utf8(index, &new_signature)?)
	}

	fn remap_desc_index(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite) -> Result<String> {
		let index = r.read_u16()?;
		let desc = self.utf8(index)?;
		let new_desc = self.policy.map_desc(&desc)?;
		w.write_u16(self.replace_utf8(index, &new_desc)?)?;
		Ok(desc)
	}

	fn remap_annotations(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite) -> Result<()> {
		let count = r.read_u16()?;
		w.write_u16(count)?;
		for _ in 0..count {
			self.remap_annotation(r, w)?;
		}
		Ok(())
	}

	fn remap_annotation(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite) -> Result<()> {
		let desc = self.remap_desc_index(r, w)?;

		let pairs = r.read_u16()?;
		w.write_u16(pairs)?;
		for _ in 0..pairs {
			let name_index = r.read_u16()?;
			let name = self.utf8(name_index)?;
			let new_name = self.policy.map_annotation_attribute(&desc, &name)?;
			w.write_u16(self.replace_utf8(name_index, &new_name)?)?;

			self.remap_element_value(r, w)?;
		}
		Ok(())
	}

	fn remap_element_value(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite) -> Result<()> {
		let tag = r.read_u8()?;
		w.write_u8(tag)?;
		match tag {
			b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => w.write_u16(r.read_u16()?)?,
			b'e' => {
				let desc = self.remap_desc_index(r, w)?;

				let const_name_index = r.read_u16()?;
				let name = self.utf8(const_name_index)?;
				let new_name = match descriptor::object_type_name(&desc) {
					Some(enum_class) => self.policy.map_field(enum_class, &name, &desc)?,
					None => name,
				};
				w.write_u16(self.replace_utf8(const_name_index, &new_name)?)?;
			},
			b'c' => {
				self.remap_desc_index(r, w)?;
			},
			b'@' => self.remap_annotation(r, w)?,
			b'[' => {
				let count = r.read_u16()?;
				w.write_u16(count)?;
				for _ in 0..count {
					self.remap_element_value(r, w)?;
				}
			},
			tag => bail!("unknown element value tag {:?}", tag as char),
		}
		Ok(())
	}

	fn remap_type_annotations(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite) -> Result<()> {
		let count = r.read_u16()?;
		w.write_u16(count)?;
		for _ in 0..count {
			let target_type = r.read_u8()?;
			w.write_u8(target_type)?;

			let target_info_length = match target_type {
				0x13..=0x15 => 0,
				0x00 | 0x01 | 0x16 => 1,
				0x10..=0x12 | 0x17 | 0x42..=0x46 => 2,
				0x47..=0x4B => 3,
				// localvar_target: a table of (start_pc, length, index)
				0x40 | 0x41 => {
					let table_length = r.read_u16_as_usize()?;
					w.write_usize_as_u16(table_length)?;
					table_length * 6
				},
				other => bail!("unknown type annotation target type {other:#04x}"),
			};
			w.write_u8_slice(&r.read_u8_vec(target_info_length)?)?;

			let path_length = r.read_u8()?;
			w.write_u8(path_length)?;
			w.write_u8_slice(&r.read_u8_vec(path_length as usize * 2)?)?;

			self.remap_annotation(r, w)?;
		}
		Ok(())
	}

	fn remap_inner_classes(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite) -> Result<()> {
		let count = r.read_u16()?;
		w.write_u16(count)?;
		for _ in 0..count {
			let inner_class_info_index = r.read_u16()?;
			let outer_class_info_index = r.read_u16()?;
			let inner_name_index = r.read_u16()?;
			let access_flags = r.read_u16()?;

			// anonymous classes have no simple name
			let new_inner_name_index = if inner_name_index == 0 {
				0
			} else {
				let inner = self.pool.get_class(inner_class_info_index)?;
				let inner_name = self.utf8(inner_name_index)?;
				let new_inner_name = self.map_inner_name(&inner, &inner_name)?;
				self.replace_utf8(inner_name_index, &new_inner_name)?
			};

			w.write_u16(inner_class_info_index)?;
			w.write_u16(outer_class_info_index)?;
			w.write_u16(new_inner_name_index)?;
			w.write_u16(access_flags)?;
		}
		Ok(())
	}

	fn remap_enclosing_method(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite) -> Result<()> {
		let class_index = r.read_u16()?;
		let method_index = r.read_u16()?;

		let new_method_index = if method_index == 0 {
			0
		} else {
			let owner = self.pool.get_class(class_index)?;
			let (name, desc) = self.pool.get_name_and_type(method_index)?;
			let new_name = self.policy.map_method(&owner, &name, &desc)?;
			let new_desc = self.policy.map_desc(&desc)?;
			self.replace_name_and_type(method_index, (&name, &desc), (&new_name, &new_desc))?
		};

		w.write_u16(class_index)?;
		w.write_u16(new_method_index)
	}

	fn remap_record(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite) -> Result<()> {
		let count = r.read_u16()?;
		w.write_u16(count)?;
		for _ in 0..count {
			let name_index = r.read_u16()?;
			let descriptor_index = r.read_u16()?;
			let name = self.utf8(name_index)?;
			let desc = self.utf8(descriptor_index)?;

			// a record component is backed by the field of the same name
			let new_name = self.policy.map_field(self.owner, &name, &desc)?;
			let new_desc = self.policy.map_desc(&desc)?;
			w.write_u16(self.replace_utf8(name_index, &new_name)?)?;
			w.write_u16(self.replace_utf8(descriptor_index, &new_desc)?)?;

			let mut attributes = read_attributes(r)?;
			self.remap_attributes(&mut attributes, None)
				.with_context(|| anyhow!("in record component {name:?}"))?;
			write_attributes(w, &attributes)?;
		}
		Ok(())
	}

	fn remap_code(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite, method: &MethodContext) -> Result<()> {
		let max_stack = r.read_u16()?;
		let max_locals = r.read_u16()?;
		w.write_u16(max_stack)?;
		w.write_u16(max_locals)?;

		// instructions only reference the constant pool, and the indices there stay the same
		let code_length = r.read_u32_as_usize()?;
		w.write_usize_as_u32(code_length)?;
		w.write_u8_slice(&r.read_u8_vec(code_length)?)?;

		let exception_table_length = r.read_u16_as_usize()?;
		w.write_usize_as_u16(exception_table_length)?;
		w.write_u8_slice(&r.read_u8_vec(exception_table_length * 8)?)?;

		let mut attributes = read_attributes(r)?;
		self.remap_attributes(&mut attributes, Some(method))?;
		write_attributes(w, &attributes)
	}

	fn remap_local_variables(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite, method: &MethodContext, signatures: bool) -> Result<()> {
		let count = r.read_u16()?;
		w.write_u16(count)?;
		for _ in 0..count {
			let start_pc = r.read_u16()?;
			let length = r.read_u16()?;
			let name_index = r.read_u16()?;
			let type_index = r.read_u16()?;
			let index = r.read_u16()?;

			let name = self.utf8(name_index)?;
			let new_name = if method.lv_indices.contains(&index) {
				self.policy.map_parameter(self.owner, &method.name, &method.desc, index, &name)?
			} else {
				name
			};

			let type_ = self.utf8(type_index)?;
			let new_type = if signatures {
				self.policy.map_signature(&type_)?
			} else {
				self.policy.map_desc(&type_)?
			};

			w.write_u16(start_pc)?;
			w.write_u16(length)?;
			w.write_u16(self.replace_utf8(name_index, &new_name)?)?;
			w.write_u16(self.replace_utf8(type_index, &new_type)?)?;
			w.write_u16(index)?;
		}
		Ok(())
	}

	fn remap_method_parameters(&mut self, r: &mut impl ClassRead, w: &mut impl ClassWrite, method: &MethodContext) -> Result<()> {
		let count = r.read_u8()?;
		w.write_u8(count)?;

		// with synthetic parameters missing from the descriptor, the indices can't be known
		let matches_descriptor = count as usize == method.lv_indices.len();
		for i in 0..count as usize {
			let name_index = r.read_u16()?;
			let access_flags = r.read_u16()?;

			let lv_index = method.lv_indices.get(i).filter(|_| matches_descriptor);
			let new_name_index = match lv_index {
				Some(&lv_index) if name_index != 0 => {
					let name = self.utf8(name_index)?;
					let new_name = self.policy.map_parameter(self.owner, &method.name, &method.desc, lv_index, &name)?;
					self.replace_utf8(name_index, &new_name)?
				},
				_ => name_index,
			};

			w.write_u16(new_name_index)?;
			w.write_u16(access_flags)?;
		}
		Ok(())
	}

	/// Reads the names the `MethodParameters` attribute gives, if it matches up with the descriptor.
	pub(super) fn method_parameter_names(&self, attributes: &[Attribute], method: &MethodContext) -> Result<Vec<Option<String>>> {
		for attribute in attributes {
			if self.utf8(attribute.name_index)? == "MethodParameters" {
				let reader = &mut attribute.info.as_slice();
				let names = reader.read_vec(
					|r| r.read_u8_as_usize(),
					|r| {
						let name_index = r.read_u16()?;
						let _access_flags = r.read_u16()?;
						if name_index == 0 {
							Ok(None)
						} else {
							self.utf8(name_index).map(Some)
						}
					},
				)?;
				if names.len() == method.lv_indices.len() {
					return Ok(names);
				}
			}
		}
		Ok(Vec::new())
	}
}
