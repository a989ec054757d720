use anyhow::{anyhow, Context, Result};
use crate::class_file::ClassFile;
use crate::{flags, ClassRead, ClassWrite};

/// Clears the `final` flag of all method parameters listed in `MethodParameters` attributes.
///
/// Returns `None` if no parameter had the flag set, so that the class file can be kept as it is.
pub fn remove_final_flags(data: &[u8]) -> Result<Option<Vec<u8>>> {
	let mut class = ClassFile::read(data)?;

	let mut changed = false;
	for method in &mut class.methods {
		for attribute in &mut method.attributes {
			if class.pool.get_utf8(attribute.name_index)? != "MethodParameters" {
				continue;
			}

			let reader = &mut attribute.info.as_slice();
			let count = reader.read_u8()?;
			let mut info = vec![count];
			for _ in 0..count {
				let name_index = reader.read_u16()?;
				let access_flags = reader.read_u16()
					.with_context(|| anyhow!("`MethodParameters` attribute is too short for {count} parameters"))?;

				changed |= access_flags & flags::ACC_FINAL != 0;
				info.write_u16(name_index)?;
				info.write_u16(access_flags & !flags::ACC_FINAL)?;
			}
			attribute.info = info;
		}
	}

	if changed {
		class.write().map(Some)
	} else {
		Ok(None)
	}
}
