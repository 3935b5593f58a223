use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::BlockError;
use crate::BlockResult;

/// Namespace assumed for delimiters written without one, e.g.
/// `<!-- block:paragraph -->`.
pub const DEFAULT_NAMESPACE: &str = "core";

/// Default ceiling on block nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Default ceiling on the number of delimiter tokens scanned per document.
pub const DEFAULT_MAX_TOKENS: usize = 100_000;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = [
	"blockgram.toml",
	".blockgram.toml",
	".config/blockgram.toml",
];

/// Configuration loaded from `blockgram.toml`.
///
/// ```toml
/// [parser]
/// default_namespace = "core"
/// max_depth = 256
/// max_tokens = 100000
///
/// [ingest]
/// mode = "auto"
/// markdown = true
/// shortcodes = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
	/// Delimiter parsing settings.
	#[serde(default)]
	pub parser: ParserConfig,
	/// Raw HTML ingestion settings.
	#[serde(default)]
	pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
	/// Namespace used when a delimiter omits one.
	#[serde(default = "default_namespace")]
	pub default_namespace: String,
	/// Maximum block nesting depth. Openers beyond this depth are kept as
	/// literal text.
	#[serde(default = "default_max_depth")]
	pub max_depth: usize,
	/// Maximum number of delimiter tokens scanned. Anything after the limit is
	/// treated as literal text.
	#[serde(default = "default_max_tokens")]
	pub max_tokens: usize,
}

impl Default for ParserConfig {
	fn default() -> Self {
		Self {
			default_namespace: default_namespace(),
			max_depth: DEFAULT_MAX_DEPTH,
			max_tokens: DEFAULT_MAX_TOKENS,
		}
	}
}

/// How raw content is converted during ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum IngestMode {
	/// Produce blocks, unless the input is a short inline run.
	#[default]
	Auto,
	/// Always produce blocks.
	Blocks,
	/// Produce phrasing-only HTML suitable for a rich-text field.
	Inline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
	#[serde(default)]
	pub mode: IngestMode,
	/// Convert plain text through markdown before building blocks.
	#[serde(default = "default_true")]
	pub markdown: bool,
	/// Segment the input on registered shortcodes.
	#[serde(default = "default_true")]
	pub shortcodes: bool,
}

impl Default for IngestConfig {
	fn default() -> Self {
		Self {
			mode: IngestMode::Auto,
			markdown: true,
			shortcodes: true,
		}
	}
}

fn default_namespace() -> String {
	DEFAULT_NAMESPACE.to_string()
}

fn default_max_depth() -> usize {
	DEFAULT_MAX_DEPTH
}

fn default_max_tokens() -> usize {
	DEFAULT_MAX_TOKENS
}

fn default_true() -> bool {
	true
}

impl EngineConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if no config file exists.
	pub fn load(root: &Path) -> BlockResult<Option<EngineConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		Self::from_toml(&content).map(Some)
	}

	/// Parse a config from TOML source.
	pub fn from_toml(content: &str) -> BlockResult<EngineConfig> {
		toml::from_str(content).map_err(|e| BlockError::ConfigParse(e.to_string()))
	}
}
