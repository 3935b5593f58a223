use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::trace;

use crate::Attributes;
use crate::config::DEFAULT_MAX_DEPTH;
use crate::config::DEFAULT_MAX_TOKENS;
use crate::config::DEFAULT_NAMESPACE;
use crate::config::EngineConfig;
use crate::lexer::tokenize;
use crate::tokens::DelimiterKind;
use crate::tokens::DelimiterToken;

/// Options controlling how a document is split into raw blocks.
#[derive(Debug, Clone)]
pub struct ParseOptions {
	/// Namespace assumed when a delimiter omits one.
	pub default_namespace: String,
	/// Maximum nesting depth before openers are treated as literal text.
	pub max_depth: usize,
	/// Maximum number of delimiter tokens scanned per document.
	pub max_tokens: usize,
}

impl Default for ParseOptions {
	fn default() -> Self {
		Self {
			default_namespace: DEFAULT_NAMESPACE.to_string(),
			max_depth: DEFAULT_MAX_DEPTH,
			max_tokens: DEFAULT_MAX_TOKENS,
		}
	}
}

impl ParseOptions {
	/// Construct [`ParseOptions`] from an optional [`EngineConfig`].
	pub fn from_config(config: Option<&EngineConfig>) -> Self {
		let Some(config) = config else {
			return Self::default();
		};

		Self {
			default_namespace: config.parser.default_namespace.clone(),
			max_depth: config.parser.max_depth.max(1),
			max_tokens: config.parser.max_tokens,
		}
	}
}

/// A diagnostic produced while tokenizing or building the block tree. These
/// never stop parsing; they describe how malformed input was degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseDiagnostic {
	/// A block was opened but never closed. It was closed at the end of the
	/// document.
	UnclosedBlock {
		name: String,
		line: usize,
		column: usize,
	},
	/// A closer appeared while no block was open. The remaining text became a
	/// freeform node.
	UnmatchedCloser {
		name: String,
		line: usize,
		column: usize,
	},
	/// A closer named a different block than the one it closed.
	MismatchedCloser {
		expected: String,
		found: String,
		line: usize,
		column: usize,
	},
	/// The JSON attribute blob could not be parsed and was replaced with an
	/// empty map.
	InvalidAttributes {
		name: String,
		reason: String,
		line: usize,
		column: usize,
	},
	/// An opener would exceed the maximum nesting depth and was kept as
	/// literal text.
	DepthLimitExceeded {
		name: String,
		limit: usize,
		line: usize,
		column: usize,
	},
	/// Scanning stopped after the maximum number of delimiter tokens.
	TokenLimitReached {
		limit: usize,
		line: usize,
		column: usize,
	},
}

impl ParseDiagnostic {
	/// The 1-indexed line the diagnostic points at.
	pub fn line(&self) -> usize {
		match self {
			Self::UnclosedBlock { line, .. }
			| Self::UnmatchedCloser { line, .. }
			| Self::MismatchedCloser { line, .. }
			| Self::InvalidAttributes { line, .. }
			| Self::DepthLimitExceeded { line, .. }
			| Self::TokenLimitReached { line, .. } => *line,
		}
	}

	/// A human readable description.
	pub fn message(&self) -> String {
		match self {
			Self::UnclosedBlock { name, .. } => {
				format!("block `{name}` is never closed")
			}
			Self::UnmatchedCloser { name, .. } => {
				format!("closer for `{name}` has no matching opener")
			}
			Self::MismatchedCloser {
				expected, found, ..
			} => format!("expected closer for `{expected}`, found `{found}`"),
			Self::InvalidAttributes { name, reason, .. } => {
				format!("invalid attributes on `{name}`: {reason}")
			}
			Self::DepthLimitExceeded { name, limit, .. } => {
				format!("block `{name}` exceeds the maximum nesting depth of {limit}")
			}
			Self::TokenLimitReached { limit, .. } => {
				format!("stopped scanning after {limit} delimiters")
			}
		}
	}
}

/// A block as it appears in the source document, before any schema is
/// applied.
///
/// `inner_content` interleaves literal fragments with `None` placeholders,
/// one per entry of `inner_blocks`, in document order. Replacing each
/// placeholder with the serialization of the matching inner block rebuilds
/// the block's content. `inner_html` is the concatenation of the literal
/// fragments only.
///
/// Freeform runs of text outside any delimiter are represented with
/// `block_name: None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlockNode {
	/// The fully qualified block name, or `None` for freeform text.
	pub block_name: Option<String>,
	/// Attributes from the delimiter's JSON blob.
	pub attrs: Attributes,
	/// Nested blocks in document order.
	pub inner_blocks: Vec<RawBlockNode>,
	/// Literal markup of this block with nested blocks removed.
	#[serde(rename = "innerHTML")]
	pub inner_html: String,
	/// Literal fragments and inner block placeholders.
	pub inner_content: Vec<Option<String>>,
}

impl RawBlockNode {
	/// Create a freeform node wrapping literal text.
	pub fn freeform(html: impl Into<String>) -> Self {
		let html = html.into();
		Self {
			block_name: None,
			attrs: Attributes::new(),
			inner_blocks: vec![],
			inner_content: vec![Some(html.clone())],
			inner_html: html,
		}
	}

	fn named(name: String, attrs: Attributes) -> Self {
		Self {
			block_name: Some(name),
			attrs,
			..Self::default()
		}
	}

	pub fn is_freeform(&self) -> bool {
		self.block_name.is_none()
	}

	/// Append a literal fragment. Empty fragments are not recorded.
	fn push_html(&mut self, html: &str) {
		if html.is_empty() {
			return;
		}
		self.inner_html.push_str(html);
		self.inner_content.push(Some(html.to_string()));
	}

	/// Append an inner block and its placeholder.
	fn push_block(&mut self, block: RawBlockNode) {
		self.inner_blocks.push(block);
		self.inner_content.push(None);
	}
}

/// An open block waiting for its closer.
struct Frame {
	block: RawBlockNode,
	/// Byte offset of the opener.
	token_start: usize,
	/// Where the next literal fragment of this block starts.
	content_start: usize,
	/// Start of literal text preceding a top-level opener.
	leading_text_start: Option<usize>,
	line: usize,
	column: usize,
}

/// All mutable state of a single parse. Parses of different documents share
/// nothing.
struct TreeBuilder<'a> {
	document: &'a str,
	tokens: Vec<DelimiterToken>,
	/// Index of the next token to consume.
	next_token: usize,
	/// Byte offset of the first character not yet attributed to any node.
	offset: usize,
	stack: Vec<Frame>,
	/// Nesting level inside an opener that was rejected by the depth limit.
	/// Delimiters inside it stay literal text.
	suppressed: usize,
	output: Vec<RawBlockNode>,
	options: &'a ParseOptions,
	diagnostics: Vec<ParseDiagnostic>,
}

impl<'a> TreeBuilder<'a> {
	fn new(document: &'a str, options: &'a ParseOptions) -> Self {
		let (tokens, diagnostics) = tokenize(document, options);

		Self {
			document,
			tokens,
			next_token: 0,
			offset: 0,
			stack: vec![],
			suppressed: 0,
			output: vec![],
			options,
			diagnostics,
		}
	}

	fn build(mut self) -> (Vec<RawBlockNode>, Vec<ParseDiagnostic>) {
		while self.proceed() {}
		(self.output, self.diagnostics)
	}

	/// Consume one token. Returns `false` once the document is exhausted.
	fn proceed(&mut self) -> bool {
		let Some(token) = self.tokens.get(self.next_token).cloned() else {
			self.finish();
			return false;
		};
		self.next_token += 1;

		trace!(kind = %token.kind, name = %token.name, start = token.start, "delimiter");

		if self.suppressed > 0 {
			match token.kind {
				DelimiterKind::Opener => self.suppressed += 1,
				DelimiterKind::Closer => self.suppressed -= 1,
				DelimiterKind::Void => {}
			}
			return true;
		}

		let leading_text_start = (token.start > self.offset).then_some(self.offset);

		match token.kind {
			DelimiterKind::Void => {
				let block = RawBlockNode::named(token.name, token.attrs.unwrap_or_default());

				if self.stack.is_empty() {
					if let Some(leading) = leading_text_start {
						self.output
							.push(RawBlockNode::freeform(&self.document[leading..token.start]));
					}
					self.output.push(block);
				} else {
					self.add_inner_block(block, token.start, token.start + token.length);
				}

				self.offset = token.start + token.length;
				true
			}
			DelimiterKind::Opener => {
				if self.stack.len() >= self.options.max_depth {
					debug!(name = %token.name, limit = self.options.max_depth, "nesting depth exceeded");
					self.diagnostics.push(ParseDiagnostic::DepthLimitExceeded {
						name: token.name,
						limit: self.options.max_depth,
						line: token.position.start.line,
						column: token.position.start.column,
					});
					// The opener and everything up to its closer stay in the text
					// of the enclosing block.
					self.suppressed = 1;
					return true;
				}

				self.stack.push(Frame {
					block: RawBlockNode::named(token.name, token.attrs.unwrap_or_default()),
					token_start: token.start,
					content_start: token.start + token.length,
					leading_text_start,
					line: token.position.start.line,
					column: token.position.start.column,
				});
				self.offset = token.start + token.length;
				true
			}
			DelimiterKind::Closer => {
				let Some(frame) = self.stack.pop() else {
					debug!(name = %token.name, "unmatched closer, degrading to freeform");
					self.diagnostics.push(ParseDiagnostic::UnmatchedCloser {
						name: token.name,
						line: token.position.start.line,
						column: token.position.start.column,
					});
					self.add_freeform(self.document.len());
					self.next_token = self.tokens.len();
					return false;
				};

				if frame.block.block_name.as_deref() != Some(token.name.as_str()) {
					self.diagnostics.push(ParseDiagnostic::MismatchedCloser {
						expected: frame.block.block_name.clone().unwrap_or_default(),
						found: token.name.clone(),
						line: token.position.start.line,
						column: token.position.start.column,
					});
				}

				self.close_frame(frame, token.start, token.start + token.length);
				self.offset = token.start + token.length;
				true
			}
		}
	}

	/// Handle the end of the token stream.
	fn finish(&mut self) {
		if self.stack.is_empty() {
			self.add_freeform(self.document.len());
			return;
		}

		// Force-close open frames innermost first. The innermost frame takes
		// the rest of the document; each enclosing frame then ends where its
		// child ended.
		let end = self.document.len();
		while let Some(frame) = self.stack.pop() {
			self.diagnostics.push(ParseDiagnostic::UnclosedBlock {
				name: frame.block.block_name.clone().unwrap_or_default(),
				line: frame.line,
				column: frame.column,
			});
			self.close_frame(frame, end, end);
		}
		self.offset = end;
	}

	/// Finish a frame whose content ends at `content_end` and whose closing
	/// token ends at `token_end`, then attach it to its parent or the output.
	fn close_frame(&mut self, mut frame: Frame, content_end: usize, token_end: usize) {
		let start = frame.content_start.min(content_end);
		frame.block.push_html(&self.document[start..content_end]);

		if self.stack.is_empty() {
			if let Some(leading) = frame.leading_text_start {
				self.output
					.push(RawBlockNode::freeform(&self.document[leading..frame.token_start]));
			}
			self.output.push(frame.block);
		} else {
			self.add_inner_block(frame.block, frame.token_start, token_end);
		}
	}

	/// Attach a finished block to the innermost open frame. Literal text
	/// between the frame's content cursor and the block becomes a fragment.
	fn add_inner_block(&mut self, block: RawBlockNode, token_start: usize, last_offset: usize) {
		let Some(parent) = self.stack.last_mut() else {
			self.output.push(block);
			return;
		};

		let start = parent.content_start.min(token_start);
		parent.block.push_html(&self.document[start..token_start]);
		parent.block.push_block(block);
		parent.content_start = last_offset;
	}

	/// Emit the text from the cursor up to `end` as a freeform node.
	fn add_freeform(&mut self, end: usize) {
		if end <= self.offset {
			return;
		}
		self.output
			.push(RawBlockNode::freeform(&self.document[self.offset..end]));
		self.offset = end;
	}
}

/// Parse a document into raw block nodes.
///
/// Parsing never fails: malformed delimiters degrade to freeform nodes.
pub fn parse(document: impl AsRef<str>) -> Vec<RawBlockNode> {
	parse_with_diagnostics(document, &ParseOptions::default()).0
}

/// Parse a document and return the diagnostics describing any degradation.
pub fn parse_with_diagnostics(
	document: impl AsRef<str>,
	options: &ParseOptions,
) -> (Vec<RawBlockNode>, Vec<ParseDiagnostic>) {
	TreeBuilder::new(document.as_ref(), options).build()
}
