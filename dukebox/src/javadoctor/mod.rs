//! The `javadoctor.json` documentation of a jar.
//!
//! ```json
//! {
//!   "references": { "classes": { "net.Foo": "net/Foo" } },
//!   "classDocs": {
//!     "net.Foo": {
//!       "clazz": { "doc": "See {@link net.Bar#run(int)}." },
//!       "methods": { "run(I)V": { "parameters": ["count"] } },
//!       "fields": { "size:I": { "doc": "The size." } },
//!       "innerClasses": { "Inner": { } }
//!     }
//!   }
//! }
//! ```

mod remap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavadoctorInformation {
	#[serde(default)]
	pub references: DocReferences,
	/// Keyed by the dotted class name, like `net.Foo`.
	#[serde(default)]
	pub class_docs: IndexMap<String, ClassJavadoc>,
}

/// Shorthand names used in documentation, with the internal names of the classes they mean.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocReferences {
	#[serde(default)]
	pub classes: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassJavadoc {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub clazz: Option<JavadocEntry>,
	/// Keyed by name and descriptor, like `run(I)V`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub methods: Option<IndexMap<String, JavadocEntry>>,
	/// Keyed by name and descriptor, like `size:I`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fields: Option<IndexMap<String, JavadocEntry>>,
	/// Keyed by the simple name.
	#[serde(default)]
	pub inner_classes: IndexMap<String, ClassJavadoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavadocEntry {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub doc: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tags: Option<IndexMap<String, Vec<String>>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Vec<Option<String>>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub type_parameters: Option<Vec<Option<String>>>,
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::javadoctor::JavadoctorInformation;

	#[test]
	fn read_and_write() -> Result<()> {
		let json = r#"{"references":{"classes":{"Foo":"net/Foo"}},"classDocs":{"net.Foo":{"clazz":{"doc":"text"},"methods":{"run(I)V":{"parameters":["count",null]}},"innerClasses":{"Inner":{"fields":{"size:I":{"tags":{"since":["1.0"]}}},"innerClasses":{}}}}}}"#;

		let information: JavadoctorInformation = serde_json::from_str(json)?;
		let class = &information.class_docs["net.Foo"];
		assert_eq!(class.clazz.as_ref().and_then(|entry| entry.doc.as_deref()), Some("text"));
		assert_eq!(class.fields, None);
		assert_eq!(
			class.methods.as_ref().map(|methods| methods["run(I)V"].parameters.clone()),
			Some(Some(vec![Some("count".to_owned()), None]))
		);

		assert_eq!(serde_json::to_string(&information)?, json);
		Ok(())
	}

	#[test]
	fn missing_parts() -> Result<()> {
		let information: JavadoctorInformation = serde_json::from_str(r#"{"classDocs":{"a":{}}}"#)?;
		assert!(information.references.classes.is_empty());
		assert_eq!(information.class_docs["a"], Default::default());
		Ok(())
	}
}
