use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Debug, Parser)]
#[command(
	author,
	version,
	about = "Inspect how weft reads, tokenizes and inlines markup templates.",
	long_about = "weft is the parsing core of a natural-template engine for HTML and XML.\n\nThis \
	              tool runs templates through the same pipeline the engine uses so you can see \
	              exactly what it sees.\n\nQuick start:\n  weft events page.html   Print the \
	              structural events\n  weft strip page.html    Print the source without special \
	              comments\n  weft check *.html       Verify that templates parse"
)]
pub struct WeftCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Directory searched for `weft.toml`, `.weft.toml` or
	/// `.config/weft.toml`.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Log parser activity to stderr. `WEFT_LOG` takes precedence.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
	/// Print the structural events of a template, one per line.
	///
	/// Each line shows the line and column where the event starts, the event
	/// kind and its name or content. Inline expressions such as `[[${name}]]`
	/// appear as the synthetic block elements that replace them.
	Events {
		/// The template to parse.
		file: PathBuf,

		/// Parse with the strict XML grammar regardless of the configured
		/// template mode.
		#[arg(long, default_value_t = false)]
		xml: bool,

		/// Leave `[[...]]` and `[(...)]` in text untouched.
		#[arg(long, default_value_t = false)]
		no_inline: bool,

		/// Output format. Use `text` for one event per line or `json` for
		/// an array of tagged event objects.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
	/// Print a template with special comments removed.
	///
	/// Prototype-only comments `<!--/*/ ... /*/-->` keep their content and
	/// lose their markers. Parser-level comments `<!--/* ... */-->` disappear
	/// entirely.
	Strip {
		/// The template to read.
		file: PathBuf,
	},
	/// Parse every template and report the first failure.
	///
	/// Exits with status 2 when a template cannot be parsed under the
	/// configured grammar. Ideal for CI pipelines.
	Check {
		/// The templates to parse.
		#[arg(required = true)]
		files: Vec<PathBuf>,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// One event per line: `line:column kind detail`.
	Text,
	/// A JSON array of events tagged with a `type` field.
	Json,
}
