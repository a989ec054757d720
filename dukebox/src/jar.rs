//! Reading and writing jars, and jars as [`ClassProvider`]s.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use anyhow::{anyhow, Context, Result};
use indexmap::IndexSet;
use log::{debug, info, trace};
use zip::{ZipArchive, ZipWriter};
use duke::info::read_class_info;
use quill::hierarchy::{ClassInfo, ClassProvider};
use crate::entry::{BasicFileAttributes, Entry};

/// Reads all entries of the jar at the path. Directories are skipped.
pub fn read_jar(path: impl AsRef<Path>) -> Result<Vec<Entry>> {
	let path = path.as_ref();
	let file = File::open(path)
		.with_context(|| anyhow!("could not open file {path:?}"))?;
	read_jar_from(file)
		.with_context(|| anyhow!("failed to read jar {path:?}"))
}

pub fn read_jar_from(reader: impl Read + Seek) -> Result<Vec<Entry>> {
	let mut archive = ZipArchive::new(reader)
		.context("failed to read zip archive")?;

	let mut entries = Vec::with_capacity(archive.len());
	for index in 0..archive.len() {
		let mut file = archive.by_index(index)
			.with_context(|| anyhow!("failed to get zip entry {index}"))?;
		if file.is_dir() {
			continue;
		}

		let name = file.name().to_owned();
		let attrs = BasicFileAttributes { last_modified: file.last_modified() };

		let capacity = file.size()
			.try_into()
			.unwrap_or_else(|x| {
				info!("size of zip file {name:?} doesn't fit in usize: {x:?}");
				0
			});
		let mut data = Vec::with_capacity(capacity);
		file.read_to_end(&mut data)
			.with_context(|| anyhow!("failed to read zip entry {name:?}"))?;

		trace!("read {name:?}");
		let entry = Entry::from_file(&name, attrs, data)
			.with_context(|| anyhow!("failed to read entry {name:?}"))?;
		entries.push(entry);
	}

	Ok(entries)
}

/// Writes the entries as jar to the path, in the order given. Parent directories get their own entries.
pub fn write_jar(path: impl AsRef<Path>, entries: &[Entry], stable_timestamps: bool) -> Result<()> {
	let path = path.as_ref();
	let file = File::create(path)
		.with_context(|| anyhow!("could not create file {path:?}"))?;
	write_jar_to(file, entries, stable_timestamps)
		.with_context(|| anyhow!("failed to write jar {path:?}"))?;
	Ok(())
}

pub fn write_jar_to<W: Write + Seek>(writer: W, entries: &[Entry], stable_timestamps: bool) -> Result<W> {
	let stable = BasicFileAttributes::stable()?;
	let mut zip = ZipWriter::new(writer);
	let mut directories = IndexSet::new();

	for entry in entries {
		let name = entry.name();
		let attrs = if stable_timestamps { stable } else { entry.attrs() };

		let mut parents = Vec::new();
		let mut rest = name;
		while let Some((parent, _)) = rest.rsplit_once('/') {
			if !parent.is_empty() {
				parents.push(parent);
			}
			rest = parent;
		}
		for parent in parents.into_iter().rev() {
			if directories.insert(parent.to_owned()) {
				zip.add_directory(parent, attrs.to_file_options())
					.with_context(|| anyhow!("failed to add directory {parent:?}"))?;
			}
		}

		zip.start_file(name, attrs.to_file_options())
			.with_context(|| anyhow!("failed to start zip entry {name:?}"))?;
		zip.write_all(entry.data())
			.with_context(|| anyhow!("failed to write zip entry {name:?}"))?;
	}

	zip.finish().context("failed to finish zip archive")
}

/// Gives the classes of a jar file.
///
/// The class files are read when opening, and only parsed when asked for. Lookups from many threads don't wait on
/// each other.
pub struct JarClassProvider {
	path: PathBuf,
	classes: RwLock<Option<HashMap<String, Box<[u8]>>>>,
}

impl JarClassProvider {
	pub fn open(path: impl Into<PathBuf>) -> Result<JarClassProvider> {
		let path = path.into();
		let file = File::open(&path)
			.with_context(|| anyhow!("could not open file {path:?}"))?;
		let classes = read_class_files(file)
			.with_context(|| anyhow!("failed to read classes of jar {path:?}"))?;
		debug!("read {} classes from {path:?}", classes.len());
		Ok(JarClassProvider { path, classes: RwLock::new(Some(classes)) })
	}
}

/// Reads the bytes of all class files, keyed by class name. Multi release classes are left out.
fn read_class_files(reader: impl Read + Seek) -> Result<HashMap<String, Box<[u8]>>> {
	let mut archive = ZipArchive::new(reader)
		.context("failed to read zip archive")?;

	let mut classes = HashMap::new();
	for index in 0..archive.len() {
		let mut file = archive.by_index(index)
			.with_context(|| anyhow!("failed to get zip entry {index}"))?;
		if file.is_dir() || file.name().starts_with("META-INF/") {
			continue;
		}
		let Some(class_name) = file.name().strip_suffix(".class").map(str::to_owned) else {
			continue;
		};

		let mut data = Vec::new();
		file.read_to_end(&mut data)
			.with_context(|| anyhow!("failed to read class {class_name:?}"))?;
		classes.insert(class_name, data.into_boxed_slice());
	}
	Ok(classes)
}

impl ClassProvider for JarClassProvider {
	fn get_class(&self, name: &str) -> Result<Option<Arc<ClassInfo>>> {
		let classes = self.classes.read().unwrap_or_else(PoisonError::into_inner);
		let classes = classes.as_ref()
			.with_context(|| anyhow!("jar {:?} is already closed", self.path))?;

		let Some(data) = classes.get(name) else {
			return Ok(None);
		};
		let class = read_class_info(data)
			.with_context(|| anyhow!("failed to read class {name:?} from {:?}", self.path))?;
		Ok(Some(Arc::new(class)))
	}

	fn close(&self) -> Result<()> {
		self.classes.write().unwrap_or_else(PoisonError::into_inner).take();
		Ok(())
	}
}

/// Gives the classes of already read jar entries.
///
/// Only classes outside of `META-INF/versions` are given out, since those are what every release sees.
#[derive(Debug, Default)]
pub struct EntriesClassProvider {
	classes: HashMap<String, Arc<[u8]>>,
}

impl EntriesClassProvider {
	pub fn new(entries: &[Entry]) -> EntriesClassProvider {
		let classes = entries.iter()
			.filter_map(|entry| match entry {
				Entry::Class(class) if class.release().is_none() => Some((class.class_name().to_owned(), Arc::from(class.data()))),
				_ => None,
			})
			.collect();
		EntriesClassProvider { classes }
	}
}

impl ClassProvider for EntriesClassProvider {
	fn get_class(&self, name: &str) -> Result<Option<Arc<ClassInfo>>> {
		let Some(data) = self.classes.get(name) else {
			return Ok(None);
		};
		let class = read_class_info(data)
			.with_context(|| anyhow!("failed to read class {name:?}"))?;
		Ok(Some(Arc::new(class)))
	}
}
