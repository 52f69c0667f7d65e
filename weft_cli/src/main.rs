use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;
use weft_cli::Commands;
use weft_cli::OutputFormat;
use weft_cli::WeftCli;
use weft_core::CommentStrippingReader;
use weft_core::EventRecorder;
use weft_core::MarkupGrammar;
use weft_core::ModelBuilder;
use weft_core::TemplateParser;
use weft_core::TextRepository;
use weft_core::WeftConfig;
use weft_core::WeftError;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = WeftCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	init_tracing(args.verbose, use_color);

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match &args.command {
		Some(Commands::Events {
			file,
			xml,
			no_inline,
			format,
		}) => run_events(&args, file, *xml, *no_inline, *format),
		Some(Commands::Strip { file }) => run_strip(file),
		Some(Commands::Check { files }) => run_check(&args, files),
		None => {
			eprintln!("No subcommand specified. Run `weft --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Render weft errors through miette for codes and help text.
		match e.downcast::<WeftError>() {
			Ok(weft_err) => {
				let report: miette::Report = (*weft_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

fn init_tracing(verbose: bool, use_color: bool) {
	let default_level = if verbose { "debug" } else { "warn" };
	let filter =
		EnvFilter::try_from_env("WEFT_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.init();
}

fn resolve_root(args: &WeftCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn load_config(args: &WeftCli) -> Result<WeftConfig, Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = WeftConfig::load(&root)?;

	if args.verbose {
		match WeftConfig::resolve_path(&root) {
			Some(path) => tracing::debug!(path = %path.display(), "loaded config"),
			None => tracing::debug!(root = %root.display(), "no config found, using defaults"),
		}
	}

	Ok(config.unwrap_or_default())
}

fn run_events(
	args: &WeftCli,
	file: &Path,
	xml: bool,
	no_inline: bool,
	format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
	let mut config = load_config(args)?;
	if xml {
		config.template_mode = MarkupGrammar::Xml;
	}

	let mut parser = TemplateParser::from_config(&config);
	if no_inline {
		parser = parser.without_inlining();
	}

	let document = file.display().to_string();
	let mut recorder = EventRecorder::new();
	parser.parse_reader(&document, File::open(file)?, &mut recorder)?;

	match format {
		OutputFormat::Text => print!("{}", recorder.trace()),
		OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&*recorder)?),
	}

	Ok(())
}

fn run_strip(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
	let mut reader = CommentStrippingReader::new(File::open(file)?);
	let mut stdout = std::io::stdout().lock();
	std::io::copy(&mut reader, &mut stdout)?;
	stdout.flush()?;

	Ok(())
}

fn run_check(args: &WeftCli, files: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
	let config = load_config(args)?;
	let parser = TemplateParser::from_config(&config);
	let repository = TextRepository::new(config.interner.max_size);

	for file in files {
		let document = file.display().to_string();
		let mut builder = ModelBuilder::new(&repository);
		parser.parse_reader(&document, File::open(file)?, &mut builder)?;

		println!(
			"{} {document} ({} nodes)",
			colored!("ok", green),
			builder.nodes().len()
		);
	}

	println!();
	println!(
		"{}",
		colored!(format!("{} template(s) parsed.", files.len()), bold)
	);

	Ok(())
}
