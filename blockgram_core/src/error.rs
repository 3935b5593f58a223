use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum BlockError {
	#[error(transparent)]
	#[diagnostic(code(blockgram::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to convert markdown: {0}")]
	#[diagnostic(code(blockgram::markdown))]
	Markdown(String),

	#[error("render failed for block `{name}`: {reason}")]
	#[diagnostic(
		code(blockgram::render),
		help("the block's render function rejected its attributes; the block is treated as invalid")
	)]
	Render { name: String, reason: String },

	#[error("unknown block type: `{0}`")]
	#[diagnostic(
		code(blockgram::unknown_block_type),
		help("register the block type before creating blocks of this kind")
	)]
	UnknownBlockType(String),

	#[error("invalid selector `{selector}`: {reason}")]
	#[diagnostic(
		code(blockgram::invalid_selector),
		help("supported selectors: tag, *, .class, #id, [attr], [attr=value], `a b`, `a > b`, `a, b`")
	)]
	InvalidSelector { selector: String, reason: String },

	#[error("invalid block name: `{0}`")]
	#[diagnostic(
		code(blockgram::invalid_block_name),
		help("block names look like `namespace/name` using lowercase letters, digits, `-` and `_`")
	)]
	InvalidBlockName(String),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(blockgram::config_parse),
		help("check that blockgram.toml is valid TOML with [parser] and/or [ingest] sections")
	)]
	ConfigParse(String),

	#[error(transparent)]
	#[diagnostic(code(blockgram::json))]
	Json(#[from] serde_json::Error),
}

impl BlockError {
	/// Build a render error for the given block name.
	pub fn render(name: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::Render {
			name: name.into(),
			reason: reason.into(),
		}
	}
}

pub type BlockResult<T> = Result<T, BlockError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
