//! Conversion between the "modified UTF-8" of `CONSTANT_Utf8_info` entries and rust strings.
//!
//! See <https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html#jvms-4.4.7>.
//!
//! Only names and descriptors get decoded. String constants stay as raw bytes in the pool, so unpaired surrogates
//! there never cause trouble.

use anyhow::{anyhow, Context, Result};
use java_string::{JavaStr, JavaString};

/// Decodes the contents of a `CONSTANT_Utf8_info` entry.
pub(crate) fn decode(bytes: &[u8]) -> Result<String> {
	JavaString::from_modified_utf8(bytes.to_vec())
		.with_context(|| anyhow!("invalid java utf8 contents"))?
		.into_string()
		.with_context(|| anyhow!("java utf8 contents contain unpaired surrogates"))
}

/// Encodes a string into the contents of a `CONSTANT_Utf8_info` entry.
pub(crate) fn encode(string: &str) -> Vec<u8> {
	JavaStr::from_str(string).to_modified_utf8().into_owned()
}
