//! The transformation pipeline: every entry of the input jar goes through a chain of [`Transformer`]s, on a
//! [`TaskRunner`].

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use anyhow::{bail, Context, Result};
use log::{info, trace, warn};
use quill::hierarchy::{ClassProvider, HierarchyResolver};
use crate::entry::{ClassEntry, Entry, JavadoctorEntry, ManifestEntry, ResourceEntry};
use crate::jar::{read_jar, write_jar, EntriesClassProvider};
use crate::tasks::{Task, TaskRunner};

/// Handles the entries of a jar, one kind of entry at a time.
///
/// Every method consumes the entry and gives back the entry that replaces it, or `None` to drop it. The default
/// implementations give back the entry unchanged.
///
/// Entries are processed concurrently, so any state a transformer collects must be safe to update from many threads.
pub trait Transformer: Send + Sync {
	fn process_class(&self, entry: ClassEntry) -> Result<Option<ClassEntry>> {
		Ok(Some(entry))
	}

	fn process_resource(&self, entry: ResourceEntry) -> Result<Option<ResourceEntry>> {
		Ok(Some(entry))
	}

	fn process_manifest(&self, entry: ManifestEntry) -> Result<Option<ManifestEntry>> {
		Ok(Some(entry))
	}

	fn process_javadoctor(&self, entry: JavadoctorEntry) -> Result<Option<JavadoctorEntry>> {
		Ok(Some(entry))
	}

	/// Entries to add to the output. Only called once all entries were processed.
	fn extras(&self) -> Result<Vec<Entry>> {
		Ok(Vec::new())
	}
}

/// Creates a transformer once the class hierarchy of the input jar is known.
pub type TransformerFactory = Box<dyn FnOnce(&Arc<HierarchyResolver>) -> Result<Box<dyn Transformer>>>;

/// Configures a [`Renamer`].
#[derive(Default)]
pub struct RenamerBuilder {
	input: Option<PathBuf>,
	output: Option<PathBuf>,
	factories: Vec<TransformerFactory>,
	libraries: Vec<Box<dyn ClassProvider>>,
	threads: Option<usize>,
	stable_timestamps: bool,
}

impl RenamerBuilder {
	pub fn new() -> RenamerBuilder {
		RenamerBuilder::default()
	}

	pub fn input(mut self, path: impl Into<PathBuf>) -> RenamerBuilder {
		self.input = Some(path.into());
		self
	}

	pub fn output(mut self, path: impl Into<PathBuf>) -> RenamerBuilder {
		self.output = Some(path.into());
		self
	}

	/// Adds a transformer to the end of the chain.
	pub fn add_transformer(self, transformer: impl Transformer + 'static) -> RenamerBuilder {
		self.add_transformer_factory(move |_| Ok(Box::new(transformer)))
	}

	/// Adds a transformer that needs the class hierarchy to the end of the chain.
	pub fn add_transformer_factory(
		mut self,
		factory: impl FnOnce(&Arc<HierarchyResolver>) -> Result<Box<dyn Transformer>> + 'static,
	) -> RenamerBuilder {
		self.factories.push(Box::new(factory));
		self
	}

	/// Adds a source of classes the input jar depends on. Libraries are asked in the order they were added, after the
	/// input jar.
	pub fn add_library(mut self, library: Box<dyn ClassProvider>) -> RenamerBuilder {
		self.libraries.push(library);
		self
	}

	/// The number of threads to process entries on. Defaults to the available parallelism.
	pub fn threads(mut self, threads: usize) -> RenamerBuilder {
		self.threads = Some(threads);
		self
	}

	/// Writes every entry with the same fixed timestamp, instead of keeping the timestamps of the input.
	pub fn stable_timestamps(mut self, stable_timestamps: bool) -> RenamerBuilder {
		self.stable_timestamps = stable_timestamps;
		self
	}

	pub fn build(self) -> Result<Renamer> {
		let input = self.input.context("no input jar given")?;
		let output = self.output.context("no output jar given")?;
		let threads = match self.threads {
			Some(0) => bail!("need at least one thread to process entries on"),
			Some(threads) => threads,
			None => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
		};

		Ok(Renamer {
			input,
			output,
			factories: self.factories,
			libraries: self.libraries,
			threads,
			stable_timestamps: self.stable_timestamps,
		})
	}
}

/// Runs the transformers over a jar, writing the result to another jar.
pub struct Renamer {
	input: PathBuf,
	output: PathBuf,
	factories: Vec<TransformerFactory>,
	libraries: Vec<Box<dyn ClassProvider>>,
	threads: usize,
	stable_timestamps: bool,
}

impl Renamer {
	pub fn run(self) -> Result<()> {
		let Renamer { input, output, factories, libraries, threads, stable_timestamps } = self;
		let start = Instant::now();

		info!("reading {input:?}");
		let entries = read_jar(&input)?;
		let read_count = entries.len();

		let mut providers: Vec<Box<dyn ClassProvider>> = Vec::with_capacity(libraries.len() + 1);
		providers.push(Box::new(EntriesClassProvider::new(&entries)));
		providers.extend(libraries);
		let hierarchy = Arc::new(HierarchyResolver::new(providers));

		let transformers = factories.into_iter()
			.map(|factory| factory(&hierarchy))
			.collect::<Result<Vec<_>>>()
			.context("failed to create transformers")?;

		let runner = TaskRunner::new(threads)?;
		info!("processing {read_count} entries with {} transformers on {} threads", transformers.len(), runner.threads());
		let entries = Renamer::process_entries(&runner, &transformers, entries)?;

		info!("writing {} entries to {output:?}", entries.len());
		write_jar(&output, &entries, stable_timestamps)?;

		info!("done in {:?}, looked at {} classes", start.elapsed(), hierarchy.cached());

		drop(transformers);
		match Arc::try_unwrap(hierarchy) {
			Ok(hierarchy) => hierarchy.close().context("failed to close class providers")?,
			Err(_) => warn!("class hierarchy is still in use, not closing the class providers"),
		}
		Ok(())
	}

	/// Processes the entries with the transformers, in memory.
	///
	/// Each entry goes through the transformers in order, stopping at the first one dropping it. The entries keep
	/// their order, and are followed by the extras of every transformer. Of entries with the same name only the first
	/// one is kept. The manifest is moved to the front.
	pub fn process_entries(runner: &TaskRunner, transformers: &[Box<dyn Transformer>], entries: Vec<Entry>) -> Result<Vec<Entry>> {
		let tasks = entries.into_iter()
			.map(|entry| Task::new(entry.name().to_owned(), move || -> Result<Option<Entry>> {
				trace!("processing {:?}", entry.name());
				let mut entry = entry;
				for transformer in transformers {
					match entry.process(transformer.as_ref())? {
						Some(processed) => entry = processed,
						None => return Ok(None),
					}
				}
				Ok(Some(entry))
			}))
			.collect();
		let mut entries = runner.invoke_all(tasks)?;

		for transformer in transformers {
			entries.extend(transformer.extras().context("failed to create extra entries")?);
		}

		let mut names = HashSet::with_capacity(entries.len());
		entries.retain(|entry| {
			let first = names.insert(entry.name().to_owned());
			if !first {
				warn!("duplicate entry {:?}, keeping the first one", entry.name());
			}
			first
		});

		if let Some(index) = entries.iter().position(|entry| matches!(entry, Entry::Manifest(_))) {
			let manifest = entries.remove(index);
			entries.insert(0, manifest);
		}

		Ok(entries)
	}
}

impl std::fmt::Debug for Renamer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Renamer")
			.field("input", &self.input)
			.field("output", &self.output)
			.field("transformers", &self.factories.len())
			.field("libraries", &self.libraries.len())
			.field("threads", &self.threads)
			.field("stable_timestamps", &self.stable_timestamps)
			.finish()
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::entry::{BasicFileAttributes, Entry, ResourceEntry};
	use crate::tasks::TaskRunner;
	use crate::transform::{Renamer, RenamerBuilder, Transformer};

	struct DropTxt;

	impl Transformer for DropTxt {
		fn process_resource(&self, entry: ResourceEntry) -> Result<Option<ResourceEntry>> {
			Ok(Some(entry).filter(|entry| !entry.name().ends_with(".txt")))
		}

		fn extras(&self) -> Result<Vec<Entry>> {
			Ok(vec![
				Entry::from_file("extra.bin", BasicFileAttributes::default(), vec![1])?,
				Entry::from_file("b.bin", BasicFileAttributes::default(), vec![2])?,
			])
		}
	}

	#[test]
	fn entries_keep_their_order() -> Result<()> {
		let attrs = BasicFileAttributes::default();
		let entries = vec![
			Entry::from_file("a.txt", attrs, vec![])?,
			Entry::from_file("b.bin", attrs, vec![0])?,
			Entry::from_file("META-INF/MANIFEST.MF", attrs, b"Manifest-Version: 1.0\r\n\r\n".to_vec())?,
			Entry::from_file("c.txt", attrs, vec![])?,
			Entry::from_file("d.bin", attrs, vec![])?,
		];

		let runner = TaskRunner::new(2)?;
		let transformers: Vec<Box<dyn Transformer>> = vec![Box::new(DropTxt)];
		let entries = Renamer::process_entries(&runner, &transformers, entries)?;

		let names: Vec<&str> = entries.iter().map(Entry::name).collect();
		assert_eq!(names, ["META-INF/MANIFEST.MF", "b.bin", "d.bin", "extra.bin"]);
		// the entry from the jar wins over the extra one
		assert_eq!(entries[1].data(), &[0]);
		Ok(())
	}

	#[test]
	fn build_needs_input_and_output() {
		assert!(RenamerBuilder::new().output("out.jar").build().is_err());
		assert!(RenamerBuilder::new().input("in.jar").build().is_err());
		assert!(RenamerBuilder::new().input("in.jar").output("out.jar").threads(0).build().is_err());
		assert!(RenamerBuilder::new().input("in.jar").output("out.jar").build().is_ok());
	}
}
