use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use blockgram_cli::BlockgramCli;
use blockgram_cli::Commands;
use blockgram_cli::OutputFormat;
use blockgram_core::AnyEmptyResult;
use blockgram_core::AnyResult;
use blockgram_core::BlockError;
use blockgram_core::BlockTypeRegistry;
use blockgram_core::EngineConfig;
use blockgram_core::IngestOptions;
use blockgram_core::Ingested;
use blockgram_core::ParseDiagnostic;
use blockgram_core::ParseOptions;
use blockgram_core::ParsedBlock;
use blockgram_core::get_save_content;
use blockgram_core::ingest;
use blockgram_core::library::core_registry;
use blockgram_core::parse_and_validate_with;
use blockgram_core::parse_with_diagnostics;
use blockgram_core::serialize_block_with;
use blockgram_core::serialize_with;
use clap::Parser;
use owo_colors::OwoColorize;
use similar::ChangeTag;
use similar::TextDiff;
use tracing_subscriber::EnvFilter;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(Ordering::Relaxed)
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
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
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
	let args = BlockgramCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, Ordering::Relaxed);
	}

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let default_level = if args.verbose { "debug" } else { "warn" };
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_env("BLOCKGRAM_LOG")
				.unwrap_or_else(|_| EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.init();

	let result = match &args.command {
		Some(Commands::Parse { file, raw }) => run_parse(&args, file, *raw),
		Some(Commands::Validate { file, diff, format }) => {
			run_validate(&args, file, *diff, *format)
		}
		Some(Commands::Format { file, write }) => run_format(&args, file, *write),
		Some(Commands::Ingest { file }) => run_ingest(&args, file),
		None => {
			eprintln!("No subcommand specified. Run `blockgram --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		match e.downcast::<BlockError>() {
			Ok(block_err) => {
				let report: miette::Report = (*block_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

fn resolve_root(args: &BlockgramCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn load_config(args: &BlockgramCli) -> AnyResult<Option<EngineConfig>> {
	let root = resolve_root(args);
	if args.verbose {
		match EngineConfig::resolve_path(&root) {
			Some(path) => eprintln!("Using config {}", path.display()),
			None => eprintln!("No config found in {}, using defaults", root.display()),
		}
	}

	Ok(EngineConfig::load(&root)?)
}

fn read_document(file: &Path) -> AnyResult<String> {
	std::fs::read_to_string(file)
		.map_err(|e| format!("failed to read {}: {e}", file.display()).into())
}

fn print_diagnostics(diagnostics: &[ParseDiagnostic], file: &Path) {
	for diagnostic in diagnostics {
		eprintln!(
			"{} {}:{}: {}",
			colored!("warning:", yellow),
			file.display(),
			diagnostic.line(),
			diagnostic.message()
		);
	}
}

fn run_parse(args: &BlockgramCli, file: &Path, raw: bool) -> AnyEmptyResult {
	let config = load_config(args)?;
	let options = ParseOptions::from_config(config.as_ref());
	let document = read_document(file)?;

	let (output, diagnostics) = if raw {
		let (nodes, diagnostics) = parse_with_diagnostics(&document, &options);
		(serde_json::to_string_pretty(&nodes)?, diagnostics)
	} else {
		let registry = core_registry();
		let (blocks, diagnostics) = parse_and_validate_with(&document, &registry, &options);
		(serde_json::to_string_pretty(&blocks)?, diagnostics)
	};

	print_diagnostics(&diagnostics, file);
	println!("{output}");

	Ok(())
}

fn run_validate(
	args: &BlockgramCli,
	file: &Path,
	show_diff: bool,
	format: OutputFormat,
) -> AnyEmptyResult {
	let config = load_config(args)?;
	let options = ParseOptions::from_config(config.as_ref());
	let document = read_document(file)?;
	let registry = core_registry();
	let (blocks, diagnostics) = parse_and_validate_with(&document, &registry, &options);

	print_diagnostics(&diagnostics, file);

	let all: Vec<&ParsedBlock> = blocks.iter().flat_map(ParsedBlock::walk).collect();
	let invalid: Vec<&ParsedBlock> = all.iter().copied().filter(|block| !block.is_valid).collect();

	if args.verbose {
		eprintln!("Checked {} block(s) in {}", all.len(), file.display());
	}

	if invalid.is_empty() {
		match format {
			OutputFormat::Json => println!("{{\"ok\":true,\"invalid\":[]}}"),
			OutputFormat::Text => {
				println!(
					"{} all {} block(s) are valid.",
					colored!("Validation passed:", green),
					all.len()
				);
			}
		}
		return Ok(());
	}

	match format {
		OutputFormat::Json => {
			let entries: Vec<serde_json::Value> = invalid
				.iter()
				.map(|block| {
					serde_json::json!({
						"block": block.name,
						"original": block.original_content,
						"expected": expected_markup(block, &registry, &options),
						"issues": block.validation_issues,
					})
				})
				.collect();
			let output = serde_json::json!({
				"ok": false,
				"invalid": entries,
			});
			println!("{output}");
		}
		OutputFormat::Text => {
			eprintln!("{}", colored!("Validation failed.", bold));
			eprintln!();
			for block in &invalid {
				eprintln!("  block `{}`", block.name);
				for issue in &block.validation_issues {
					eprintln!("    {}: {}", issue.severity, issue.message);
				}

				if show_diff {
					if let Some(expected) = expected_markup(block, &registry, &options) {
						print_diff(&block.original_content, &expected);
					}
				}
			}
			eprintln!();
			eprintln!("{} invalid block(s) in {}.", invalid.len(), file.display());
		}
	}

	process::exit(1);
}

/// What the block's type renders for its resolved attributes.
fn expected_markup(
	block: &ParsedBlock,
	registry: &dyn BlockTypeRegistry,
	options: &ParseOptions,
) -> Option<String> {
	let block_type = registry.lookup(&block.name)?;
	let inner = block
		.inner_blocks
		.iter()
		.map(|inner| serialize_block_with(inner, registry, options))
		.collect::<Vec<_>>()
		.join("\n");

	get_save_content(&block_type, &block.attributes, &inner).ok()
}

fn run_format(args: &BlockgramCli, file: &Path, write: bool) -> AnyEmptyResult {
	let config = load_config(args)?;
	let options = ParseOptions::from_config(config.as_ref());
	let document = read_document(file)?;
	let registry = core_registry();
	let (blocks, diagnostics) = parse_and_validate_with(&document, &registry, &options);

	print_diagnostics(&diagnostics, file);

	let output = serialize_with(&blocks, &registry, &options);
	if !write {
		println!("{output}");
		return Ok(());
	}

	let formatted = format!("{output}\n");
	if formatted == document {
		println!("{} is already formatted.", file.display());
		return Ok(());
	}

	std::fs::write(file, formatted)?;
	println!("Formatted {}", file.display());

	Ok(())
}

fn run_ingest(args: &BlockgramCli, file: &Path) -> AnyEmptyResult {
	let config = load_config(args)?;
	let options = IngestOptions::from_config(config.as_ref());
	let input = read_document(file)?;
	let registry = core_registry();

	match ingest(&input, &registry, &options) {
		Ingested::Blocks(blocks) => {
			if args.verbose {
				eprintln!("Created {} block(s)", blocks.len());
			}
			println!("{}", serialize_with(&blocks, &registry, &options.parse));
		}
		Ingested::Inline(html) => println!("{html}"),
	}

	Ok(())
}

fn print_diff(current: &str, expected: &str) {
	let diff = TextDiff::from_lines(current, expected);
	for change in diff.iter_all_changes() {
		match change.tag() {
			ChangeTag::Delete => {
				eprint!("    {}", colored!(format!("-{change}"), red));
			}
			ChangeTag::Insert => {
				eprint!("    {}", colored!(format!("+{change}"), green));
			}
			ChangeTag::Equal => {
				eprint!("     {change}");
			}
		}
	}
	if !current.ends_with('\n') || !expected.ends_with('\n') {
		eprintln!();
	}
}
