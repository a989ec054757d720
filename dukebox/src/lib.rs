//! Crate for transforming jars: renaming classes and members with mappings, and a few simpler transformations.
//!
//! A jar is read into [`entry::Entry`]s, which go through a chain of [`transform::Transformer`]s. The entries are
//! processed concurrently on a [`tasks::TaskRunner`], and are then written to the output jar. Use
//! [`transform::RenamerBuilder`] to set this up:
//! ```no_run
//! # use std::sync::Arc;
//! # use dukebox::rename::RenamingTransformer;
//! # use dukebox::transform::RenamerBuilder;
//! # fn main() -> anyhow::Result<()> {
//! let mappings = quill::tiny_v2::read_file("mappings.tiny", "official", "named")?;
//!
//! RenamerBuilder::new()
//! 	.input("input.jar")
//! 	.output("output.jar")
//! 	.add_transformer_factory(RenamingTransformer::factory(Arc::new(mappings), true))
//! 	.build()?
//! 	.run()?;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod jar;
pub mod javadoctor;
pub mod manifest;
pub mod rename;
pub mod strip;
pub mod tasks;
pub mod transform;
