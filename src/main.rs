use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use log::{debug, info, LevelFilter};
use walkdir::WalkDir;
use dukebox::jar::JarClassProvider;
use dukebox::rename::RenamingTransformer;
use dukebox::strip::{ParameterFinalFlagRemover, SignatureStripper, StripMode};
use dukebox::transform::RenamerBuilder;

/// Renames the classes, fields, methods and parameters of a jar.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
	/// The jar to rename.
	#[arg(short = 'i', long = "input")]
	input: PathBuf,

	/// Where to write the renamed jar to.
	#[arg(short = 'o', long = "output")]
	output: PathBuf,

	/// The mappings, as Tiny v2 file. Without mappings, nothing gets renamed.
	#[arg(short = 'm', long = "map")]
	mappings: Option<PathBuf>,

	/// The namespace of the mappings the input jar uses.
	#[arg(long = "from", default_value = "official")]
	from: String,

	/// The namespace of the mappings to rename to.
	#[arg(long = "to", default_value = "named")]
	to: String,

	/// Rename from the `to` namespace to the `from` namespace instead.
	#[arg(long = "reverse")]
	reverse: bool,

	/// A jar the input jar depends on, for looking up inherited methods.
	#[arg(short = 'l', long = "lib")]
	libraries: Vec<PathBuf>,

	/// A directory to add all jars of (recursively) as libraries.
	#[arg(long = "lib-dir")]
	library_directories: Vec<PathBuf>,

	/// The number of threads to use. Defaults to the number of cpus.
	#[arg(short = 't', long = "threads")]
	threads: Option<usize>,

	/// Remove signatures of a signed jar.
	#[arg(long = "strip-sigs", num_args = 0..=1, default_missing_value = "all")]
	strip_signatures: Option<StripMode>,

	/// Remove the `final` flag from method parameters.
	#[arg(long = "remove-param-final")]
	remove_parameter_final: bool,

	/// Don't write the parameter names of abstract methods to a file in the jar.
	#[arg(long = "no-abstract-params")]
	no_abstract_parameters: bool,

	/// Write every entry with the same timestamp, for reproducible output.
	#[arg(long = "stable-timestamps")]
	stable_timestamps: bool,

	/// Log more. Repeat for even more.
	#[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
	verbose: u8,

	/// Only log warnings and errors.
	#[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
	quiet: bool,
}

impl Cli {
	fn level(&self) -> LevelFilter {
		match (self.quiet, self.verbose) {
			(true, _) => LevelFilter::Warn,
			(false, 0) => LevelFilter::Info,
			(false, 1) => LevelFilter::Debug,
			(false, _) => LevelFilter::Trace,
		}
	}
}

fn setup_logging(level: LevelFilter) -> Result<()> {
	fern::Dispatch::new()
		.format(|out, message, record| {
			out.finish(format_args!("[{} {}] {}", record.level(), record.target(), message))
		})
		.level(level)
		.chain(std::io::stderr())
		.apply()
		.context("failed to set up logging")
}

/// All jars in the directory and its subdirectories, sorted by name.
fn find_jars(directory: &Path) -> Result<Vec<PathBuf>> {
	WalkDir::new(directory)
		.sort_by_file_name()
		.into_iter()
		.filter(|res| res.as_ref().is_ok_and(|entry| {
			entry.file_type().is_file() && entry.path().extension().is_some_and(|extension| extension == "jar")
		}))
		.map(|res| res.map(|entry| entry.into_path()))
		.collect::<Result<_, walkdir::Error>>()
		.with_context(|| anyhow!("failed to get jars (recursively) in library directory {directory:?}"))
}

fn run(cli: Cli) -> Result<()> {
	let mut builder = RenamerBuilder::new()
		.input(&cli.input)
		.output(&cli.output)
		.stable_timestamps(cli.stable_timestamps);

	if let Some(threads) = cli.threads {
		builder = builder.threads(threads);
	}

	let mut libraries = cli.libraries.clone();
	for directory in &cli.library_directories {
		libraries.extend(find_jars(directory)?);
	}
	for library in libraries {
		debug!("adding library {library:?}");
		builder = builder.add_library(Box::new(JarClassProvider::open(library)?));
	}

	if cli.remove_parameter_final {
		builder = builder.add_transformer(ParameterFinalFlagRemover);
	}
	if let Some(mode) = cli.strip_signatures {
		builder = builder.add_transformer(SignatureStripper::new(mode));
	}

	if let Some(path) = &cli.mappings {
		let mappings = quill::tiny_v2::read_file(path, &cli.from, &cli.to)?;
		let mappings = if cli.reverse {
			mappings.reverse().context("failed to reverse mappings")?
		} else {
			mappings
		};
		info!("read mappings for {} classes from {path:?}", mappings.len());
		builder = builder.add_transformer_factory(RenamingTransformer::factory(Arc::new(mappings), !cli.no_abstract_parameters));
	}

	builder.build()?.run()
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	setup_logging(cli.level())?;
	run(cli)
}
