use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Parse, validate and format documents built from delimited blocks.",
	long_about = "blockgram reads documents made of HTML interleaved with block delimiter \
	              comments such as `<!-- block:paragraph -->`.\n\nEvery block is checked \
	              against what its type would render today. Blocks saved by older versions of \
	              a block type are migrated when a deprecated variant matches.\n\nQuick \
	              start:\n  blockgram parse     Print the block tree as JSON\n  blockgram \
	              validate  Report blocks whose markup no longer matches\n  blockgram format   \
	              Rewrite a document in canonical form\n  blockgram ingest    Convert raw HTML \
	              or markdown into blocks"
)]
pub struct BlockgramCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Directory searched for `blockgram.toml`. Defaults to the current
	/// directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Print the block tree of a document as JSON.
	///
	/// By default every block is resolved against the built-in block types,
	/// validated and migrated. Use `--raw` to print the tree exactly as the
	/// delimiters describe it.
	Parse {
		/// The document to read.
		file: PathBuf,

		/// Print raw nodes without applying any block type.
		#[arg(long, default_value_t = false)]
		raw: bool,
	},
	/// Report blocks whose stored markup does not match their render output.
	///
	/// Exits with a non-zero status code when any block is invalid, which
	/// makes it suitable for CI.
	Validate {
		/// The document to read.
		file: PathBuf,

		/// Show a unified diff between the stored and the expected markup of
		/// each invalid block.
		#[arg(long, default_value_t = false)]
		diff: bool,

		/// Output format. Use `text` for human-readable output or `json` for
		/// programmatic consumption.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
	/// Print the canonical serialization of a document.
	///
	/// Valid blocks are re-rendered from their attributes. Invalid blocks are
	/// kept exactly as written.
	Format {
		/// The document to read.
		file: PathBuf,

		/// Write the result back to the file instead of printing it.
		#[arg(long, default_value_t = false)]
		write: bool,
	},
	/// Convert raw HTML, markdown or shortcode text into blocks.
	///
	/// The `[ingest]` section of `blockgram.toml` controls whether markdown
	/// and shortcodes are converted and whether single-line input is kept
	/// inline.
	Ingest {
		/// The file to convert.
		file: PathBuf,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output. Each invalid block includes its name, stored markup,
	/// expected markup and validation issues.
	Json,
}
