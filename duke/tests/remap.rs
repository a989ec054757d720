use std::collections::HashMap;
use std::sync::Mutex;
use anyhow::{Context, Result};
use pretty_assertions::assert_eq;
use duke::class_file::ClassFile;
use duke::flags::{ACC_ABSTRACT, ACC_FINAL, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC};
use duke::info::{read_class_info, MemberInfo};
use duke::pool::PoolEntry;
use duke::remap::{remap_class, AbstractMethod, RemapPolicy};

#[derive(Default)]
struct Table {
	classes: HashMap<&'static str, &'static str>,
	fields: HashMap<(&'static str, &'static str), &'static str>,
	methods: HashMap<(&'static str, &'static str, &'static str), &'static str>,
	parameters: HashMap<u16, &'static str>,
	abstract_methods: Mutex<Vec<(String, Vec<(u16, Option<String>)>)>>,
}

impl RemapPolicy for Table {
	fn map_class(&self, name: &str) -> Result<String> {
		Ok(self.classes.get(name).copied().unwrap_or(name).to_owned())
	}

	fn map_desc(&self, desc: &str) -> Result<String> {
		let mut out = String::new();
		let mut rest = desc;
		while let Some(start) = rest.find('L') {
			let (head, tail) = rest.split_at(start + 1);
			out.push_str(head);
			let end = tail.find(';').context("missing semicolon")?;
			out.push_str(&self.map_class(&tail[..end])?);
			rest = &tail[end..];
		}
		out.push_str(rest);
		Ok(out)
	}

	fn map_signature(&self, signature: &str) -> Result<String> {
		self.map_desc(signature)
	}

	fn map_field(&self, owner: &str, name: &str, _desc: &str) -> Result<String> {
		Ok(self.fields.iter()
			.find(|((o, n), _)| *o == owner && *n == name)
			.map_or(name, |(_, new)| *new)
			.to_owned())
	}

	fn map_method(&self, owner: &str, name: &str, desc: &str) -> Result<String> {
		Ok(self.methods.iter()
			.find(|((o, n, d), _)| *o == owner && *n == name && *d == desc)
			.map_or(name, |(_, new)| *new)
			.to_owned())
	}

	fn map_parameter(&self, _owner: &str, _method: &str, _desc: &str, lv_index: u16, name: &str) -> Result<String> {
		Ok(self.parameters.get(&lv_index).copied().unwrap_or(name).to_owned())
	}

	fn visit_abstract_method(&self, method: &AbstractMethod) -> Result<()> {
		self.abstract_methods.lock()
			.map_err(|_| anyhow::anyhow!("poisoned"))?
			.push((format!("{} {} {}", method.owner, method.name, method.descriptor), method.parameters.clone()));
		Ok(())
	}
}

fn u16s(values: &[u16]) -> Vec<u8> {
	values.iter().flat_map(|value| value.to_be_bytes()).collect()
}

fn attribute_bytes(name_index: u16, info: &[u8]) -> Vec<u8> {
	let mut bytes = name_index.to_be_bytes().to_vec();
	bytes.extend((info.len() as u32).to_be_bytes());
	bytes.extend(info);
	bytes
}

/// A class `a` implementing `b`, with a field `c` and a method `e` calling `b.d`. Gives the index of the `MethodRef` too.
fn example_class() -> Result<(Vec<u8>, u16)> {
	let mut class = ClassFile::new(ACC_PUBLIC, "a", Some("java/lang/Object"), &["b"])?;
	class.add_field(ACC_PRIVATE, "c", "La;", vec![])?;

	let class_index = class.pool.put_class("b")?;
	let name_and_type_index = class.pool.put_name_and_type("d", "(La;)V")?;
	let method_ref = class.pool.put(PoolEntry::MethodRef { class_index, name_and_type_index })?;

	let this = class.pool.put_utf8("this")?;
	let param = class.pool.put_utf8("param")?;
	let desc = class.pool.put_utf8("La;")?;
	let local_variables = class.attribute("LocalVariableTable", u16s(&[2, 0, 6, this, desc, 0, 0, 6, param, desc, 1]))?;

	let [hi, lo] = method_ref.to_be_bytes();
	let mut code = u16s(&[2, 2]);
	code.extend(6u32.to_be_bytes());
	code.extend([0x2a, 0x2b, 0xb6, hi, lo, 0xb1]);
	code.extend(u16s(&[0, 1]));
	code.extend(attribute_bytes(local_variables.name_index, &local_variables.info));
	let code = class.attribute("Code", code)?;

	class.add_method(ACC_PUBLIC, "e", "(La;)V", vec![code])?;

	Ok((class.write()?, method_ref))
}

#[test]
fn identity_is_byte_identical() -> Result<()> {
	let (bytes, _) = example_class()?;

	let remapped = remap_class(&bytes, &Table::default())?;

	assert_eq!(remapped, bytes);
	Ok(())
}

#[test]
fn renames_declarations_and_references() -> Result<()> {
	let (bytes, method_ref) = example_class()?;
	let table = Table {
		classes: HashMap::from([("a", "net/Foo"), ("b", "net/Bar")]),
		fields: HashMap::from([(("a", "c"), "self_")]),
		methods: HashMap::from([(("a", "e", "(La;)V"), "run"), (("b", "d", "(La;)V"), "accept")]),
		parameters: HashMap::from([(1, "value")]),
		..Table::default()
	};

	let remapped = remap_class(&bytes, &table)?;

	let info = read_class_info(&remapped)?;
	assert_eq!(info.name, "net/Foo");
	assert_eq!(info.super_class.as_deref(), Some("java/lang/Object"));
	assert_eq!(info.interfaces, vec!["net/Bar".to_owned()]);
	assert_eq!(info.fields, vec![MemberInfo::new("self_", "Lnet/Foo;", ACC_PRIVATE)]);
	assert_eq!(info.methods, vec![MemberInfo::new("run", "(Lnet/Foo;)V", ACC_PUBLIC)]);

	let class = ClassFile::read(&remapped)?;
	// the reference keeps its index, so the code stays valid
	assert_eq!(class.pool.get_member_ref(method_ref)?, ("net/Bar".to_owned(), "accept".to_owned(), "(Lnet/Foo;)V".to_owned()));

	let code = class.find_attribute(&class.methods[0].attributes, "Code")?.context("no code")?;
	// max_stack, max_locals, code_length, 6 bytes code, exception table length, attribute count, then the table
	let table_start = 2 + 2 + 4 + 6 + 2 + 2 + 6;
	let entries = &code.info[table_start..];
	let name_of = |offset: usize| class.pool.get_utf8(u16::from_be_bytes([entries[offset], entries[offset + 1]]));
	assert_eq!(name_of(2 + 4)?, "this");
	assert_eq!(name_of(2 + 6)?, "Lnet/Foo;");
	assert_eq!(name_of(2 + 10 + 4)?, "value");
	Ok(())
}

#[test]
fn inner_class_simple_name() -> Result<()> {
	let mut class = ClassFile::new(ACC_PUBLIC, "a$b", Some("java/lang/Object"), &[])?;
	let inner = class.this_class;
	let outer = class.pool.put_class("a")?;
	let name = class.pool.put_utf8("b")?;
	let inner_classes = class.attribute("InnerClasses", u16s(&[1, inner, outer, name, ACC_PUBLIC | ACC_STATIC]))?;
	class.attributes.push(inner_classes);
	let bytes = class.write()?;

	let table = Table {
		classes: HashMap::from([("a", "net/Outer"), ("a$b", "net/Outer$Inner")]),
		..Table::default()
	};
	let remapped = ClassFile::read(&remap_class(&bytes, &table)?)?;

	let attribute = remapped.find_attribute(&remapped.attributes, "InnerClasses")?.context("no inner classes")?;
	let name_index = u16::from_be_bytes([attribute.info[6], attribute.info[7]]);
	assert_eq!(remapped.pool.get_utf8(name_index)?, "Inner");
	assert_eq!(remapped.pool.get_class(inner)?, "net/Outer$Inner");
	Ok(())
}

#[test]
fn lambda_takes_interface_method_name() -> Result<()> {
	let mut class = ClassFile::new(ACC_PUBLIC, "a", Some("java/lang/Object"), &[])?;

	let factory_class = class.pool.put_class("java/lang/invoke/LambdaMetafactory")?;
	let factory_name_and_type = class.pool.put_name_and_type("metafactory", "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;")?;
	let factory = class.pool.put(PoolEntry::MethodRef { class_index: factory_class, name_and_type_index: factory_name_and_type })?;
	let handle = class.pool.put(PoolEntry::MethodHandle { reference_kind: 6, reference_index: factory })?;
	let descriptor_index = class.pool.put_utf8("()V")?;
	let method_type = class.pool.put(PoolEntry::MethodType { descriptor_index })?;
	let name_and_type_index = class.pool.put_name_and_type("run", "()Lc;")?;
	let indy = class.pool.put(PoolEntry::InvokeDynamic { bootstrap_method_attr_index: 0, name_and_type_index })?;

	let bootstrap_methods = class.attribute("BootstrapMethods", u16s(&[1, handle, 1, method_type]))?;
	class.attributes.push(bootstrap_methods);
	let bytes = class.write()?;

	let table = Table {
		classes: HashMap::from([("c", "net/Task")]),
		methods: HashMap::from([(("c", "run", "()V"), "execute")]),
		..Table::default()
	};
	let remapped = ClassFile::read(&remap_class(&bytes, &table)?)?;

	let &PoolEntry::InvokeDynamic { name_and_type_index, .. } = remapped.pool.get(indy)? else {
		panic!("not an invokedynamic");
	};
	assert_eq!(remapped.pool.get_name_and_type(name_and_type_index)?, ("execute".to_owned(), "()Lnet/Task;".to_owned()));
	Ok(())
}

fn abstract_class() -> Result<Vec<u8>> {
	let mut class = ClassFile::new(ACC_PUBLIC | ACC_ABSTRACT, "a", Some("java/lang/Object"), &[])?;
	let x = class.pool.put_utf8("x")?;
	let y = class.pool.put_utf8("y")?;
	let parameters = class.attribute("MethodParameters", {
		let mut info = vec![2];
		info.extend(u16s(&[x, ACC_FINAL, y, 0]));
		info
	})?;
	class.add_method(ACC_PUBLIC | ACC_ABSTRACT, "f", "(JI)V", vec![parameters])?;
	class.write()
}

#[test]
fn abstract_methods_get_visited() -> Result<()> {
	let table = Table::default();

	remap_class(&abstract_class()?, &table)?;

	let visited = table.abstract_methods.into_inner().map_err(|_| anyhow::anyhow!("poisoned"))?;
	assert_eq!(visited, vec![
		("a f (JI)V".to_owned(), vec![(1, Some("x".to_owned())), (3, Some("y".to_owned()))]),
	]);
	Ok(())
}

#[test]
fn final_flags_of_parameters() -> Result<()> {
	let bytes = abstract_class()?;

	let removed = duke::parameters::remove_final_flags(&bytes)?.context("expected a change")?;
	assert_eq!(removed.len(), bytes.len());
	assert_eq!(duke::parameters::remove_final_flags(&removed)?, None);
	Ok(())
}

#[test]
fn garbage_is_rejected() {
	assert!(remap_class(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0], &Table::default()).is_err());
	assert!(read_class_info(b"not a class").is_err());
}
