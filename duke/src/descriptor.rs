//! Helpers for looking into method descriptors.

use anyhow::{anyhow, bail, Context, Result};

/// Splits a method descriptor like `(I[Ljava/lang/String;J)V` into its parameter types `["I", "[Ljava/lang/String;", "J"]`.
pub fn parameter_types(desc: &str) -> Result<Vec<&str>> {
	let inner = desc.strip_prefix('(')
		.and_then(|rest| rest.split_once(')'))
		.map(|(parameters, _)| parameters)
		.with_context(|| anyhow!("method descriptor {desc:?} doesn't start with a parameter list"))?;

	let mut types = Vec::new();
	let mut rest = inner;
	while !rest.is_empty() {
		let arrays = rest.bytes().take_while(|&b| b == b'[').count();
		let length = match rest.as_bytes().get(arrays) {
			Some(b'L') => {
				let end = rest.find(';')
					.with_context(|| anyhow!("descriptor {desc:?} has a missing semicolon somewhere"))?;
				end + 1
			},
			Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => arrays + 1,
			Some(&other) => bail!("invalid type {:?} in method descriptor {desc:?}", other as char),
			None => bail!("method descriptor {desc:?} ends within an array type"),
		};
		let (parameter, tail) = rest.split_at(length);
		types.push(parameter);
		rest = tail;
	}
	Ok(types)
}

/// The return type of a method descriptor.
pub fn return_type(desc: &str) -> Result<&str> {
	desc.rsplit_once(')')
		.map(|(_, ret)| ret)
		.filter(|ret| !ret.is_empty())
		.with_context(|| anyhow!("method descriptor {desc:?} has no return type"))
}

/// Gives the local variable index each parameter is stored at when the method gets invoked.
///
/// Non-static methods start at `1`, as `0` holds `this`. Parameters of type `long` and `double` take up two slots.
pub fn parameter_lv_indices(desc: &str, is_static: bool) -> Result<Vec<u16>> {
	let mut index: u16 = if is_static { 0 } else { 1 };
	let mut indices = Vec::new();
	for parameter in parameter_types(desc)? {
		indices.push(index);
		let size = if parameter == "J" || parameter == "D" { 2 } else { 1 };
		index = index.checked_add(size)
			.with_context(|| anyhow!("method descriptor {desc:?} has too many parameters"))?;
	}
	Ok(indices)
}

/// Gives the internal name of an object type descriptor like `Ljava/lang/Object;`.
pub fn object_type_name(desc: &str) -> Option<&str> {
	desc.strip_prefix('L')?.strip_suffix(';')
}
