//! Crate for reading mappings, and for looking up the new names of classes and members.
//!
//! Mappings are read from Tiny v2 (`.tiny`) files with the [`tiny_v2`] module, selecting the namespaces to map between.
//! The [`remapper::HierarchyRemapper`] answers which name something gets, walking the class hierarchy given by a
//! [`hierarchy::HierarchyResolver`] for methods that are inherited.

mod lines;
mod signature;

pub mod hierarchy;
pub mod mappings;
pub mod remapper;
pub mod tiny_v2;
