use logos::Lexer;
use logos::Logos;
use tracing::debug;

use crate::Attributes;
use crate::ParseDiagnostic;
use crate::ParseOptions;
use crate::position::LineTable;
use crate::tokens::DelimiterKind;
use crate::tokens::DelimiterToken;

const HTML_COMMENT_OPEN: &[u8] = b"<!--";
const HTML_COMMENT_CLOSE: &[u8] = b"-->";

/// Raw tokens produced by logos for the inside of a single HTML comment.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum RawToken {
	#[token("<!--")]
	CommentOpen,
	#[token("-->")]
	CommentClose,
	#[token("/-->")]
	VoidClose,
	#[token("/")]
	Slash,
	/// `block:` or the legacy `wp:` sigil.
	#[regex(r"(block|wp):")]
	Sigil,
	#[regex(r"[a-z][a-z0-9_-]*")]
	Name,
	#[regex(r"[ \t\r\n\x0C]+")]
	Whitespace,
	#[token("{")]
	BraceOpen,
}

/// The pieces of a comment that matched the delimiter grammar.
struct Matched<'a> {
	kind: DelimiterKind,
	namespace: Option<&'a str>,
	name: &'a str,
	json: Option<&'a str>,
}

/// Walks a document comment by comment, matching each against the delimiter
/// grammar and collecting [`DelimiterToken`]s.
struct DelimiterWalker<'a> {
	/// The whole document.
	source: &'a str,
	/// Byte offset where the next search for `<!--` starts.
	cursor: usize,
	/// Offset of the most recently found `-->`. Every `<!--` between the
	/// cursor and this offset closes here, so the scan is not repeated.
	close: Option<usize>,
	/// Converts byte offsets into line/column points for diagnostics.
	lines: LineTable,
	options: &'a ParseOptions,
	tokens: Vec<DelimiterToken>,
	diagnostics: Vec<ParseDiagnostic>,
}

impl<'a> DelimiterWalker<'a> {
	fn new(source: &'a str, options: &'a ParseOptions) -> Self {
		Self {
			source,
			cursor: 0,
			close: None,
			lines: LineTable::new(source),
			options,
			tokens: vec![],
			diagnostics: vec![],
		}
	}

	fn process(&mut self) {
		let bytes = self.source.as_bytes();

		while self.cursor < bytes.len() {
			let Some(open_offset) = memstr(&bytes[self.cursor..], HTML_COMMENT_OPEN) else {
				break;
			};
			let start = self.cursor + open_offset;
			let body_start = start + HTML_COMMENT_OPEN.len();

			// Without a later `-->` no further delimiter can match.
			let Some(close) = self.next_close(body_start) else {
				break;
			};
			let end = close + HTML_COMMENT_CLOSE.len();
			let comment = &self.source[start..end];

			let Some(matched) = match_delimiter(comment) else {
				self.cursor = body_start;
				continue;
			};

			if self.tokens.len() >= self.options.max_tokens {
				let point = self.lines.point(start);
				debug!(limit = self.options.max_tokens, "delimiter token limit reached");
				self.diagnostics.push(ParseDiagnostic::TokenLimitReached {
					limit: self.options.max_tokens,
					line: point.line,
					column: point.column,
				});
				break;
			}

			self.push_token(&matched, start, end);
			self.cursor = end;
		}
	}

	/// Offset of the first `-->` at or after `from`.
	fn next_close(&mut self, from: usize) -> Option<usize> {
		if let Some(close) = self.close.filter(|close| *close >= from) {
			return Some(close);
		}

		let close = from + memstr(&self.source.as_bytes()[from..], HTML_COMMENT_CLOSE)?;
		self.close = Some(close);
		Some(close)
	}

	fn push_token(&mut self, matched: &Matched<'_>, start: usize, end: usize) {
		let namespace = matched
			.namespace
			.unwrap_or(self.options.default_namespace.as_str());
		let name = format!("{namespace}/{}", matched.name);
		let position = self.lines.position(start, end);

		let attrs = matched.json.map(|json| {
			match serde_json::from_str::<Attributes>(json) {
				Ok(attrs) => attrs,
				Err(error) => {
					self.diagnostics.push(ParseDiagnostic::InvalidAttributes {
						name: name.clone(),
						reason: error.to_string(),
						line: position.start.line,
						column: position.start.column,
					});
					Attributes::new()
				}
			}
		});

		self.tokens.push(DelimiterToken {
			kind: matched.kind,
			name,
			attrs,
			start,
			length: end - start,
			position,
		});
	}
}

/// Advance past an optional whitespace run and return the next token.
fn next_significant(lexer: &mut Lexer<'_, RawToken>) -> Option<Result<RawToken, ()>> {
	match lexer.next()? {
		Ok(RawToken::Whitespace) => lexer.next(),
		other => Some(other),
	}
}

/// Match a single `<!-- … -->` comment against the delimiter grammar:
///
/// ```text
/// <!-- ws+ /? sigil (namespace /)? name ws+ (json ws*)? /? -->
/// ```
fn match_delimiter(comment: &str) -> Option<Matched<'_>> {
	let mut lexer = RawToken::lexer(comment);

	if lexer.next()? != Ok(RawToken::CommentOpen) {
		return None;
	}
	if lexer.next()? != Ok(RawToken::Whitespace) {
		return None;
	}

	let mut is_closer = false;
	let mut token = lexer.next()?;
	if token == Ok(RawToken::Slash) {
		is_closer = true;
		token = lexer.next()?;
	}
	if token != Ok(RawToken::Sigil) {
		return None;
	}

	if lexer.next()? != Ok(RawToken::Name) {
		return None;
	}
	let mut namespace = None;
	let mut name = lexer.slice();

	let mut token = lexer.next()?;
	if token == Ok(RawToken::Slash) {
		if lexer.next()? != Ok(RawToken::Name) {
			return None;
		}
		namespace = Some(name);
		name = lexer.slice();
		token = lexer.next()?;
	}

	// At least one whitespace character must separate the name from what
	// follows.
	if token != Ok(RawToken::Whitespace) {
		return None;
	}

	let mut json = None;
	let mut token = lexer.next()?;
	if token == Ok(RawToken::BraceOpen) {
		let brace_start = lexer.span().start;
		let json_end = find_json_end(comment, brace_start)?;
		json = Some(&comment[brace_start..json_end]);
		lexer.bump(json_end - lexer.span().end);
		token = next_significant(&mut lexer)?;
	}

	let kind = match token {
		Ok(RawToken::CommentClose) if is_closer => DelimiterKind::Closer,
		Ok(RawToken::VoidClose) if is_closer => DelimiterKind::Closer,
		Ok(RawToken::CommentClose) => DelimiterKind::Opener,
		Ok(RawToken::VoidClose) => DelimiterKind::Void,
		_ => return None,
	};

	// The close marker must be the very end of the comment.
	if lexer.next().is_some() {
		return None;
	}

	Some(Matched {
		kind,
		namespace,
		name,
		json,
	})
}

/// Locate the end (exclusive) of the JSON blob opening at `brace_start`.
///
/// The blob ends at the last `}` that is followed only by optional
/// whitespace, an optional void marker and the final `-->`.
fn find_json_end(comment: &str, brace_start: usize) -> Option<usize> {
	let body = comment.strip_suffix("-->")?;
	let body = body.strip_suffix('/').unwrap_or(body);
	let body = body.trim_end();
	if body.len() <= brace_start || !body.ends_with('}') {
		return None;
	}
	Some(body.len())
}

/// Scan a document for delimiter comments.
///
/// Comments that do not match the grammar are skipped and remain part of
/// the surrounding literal text. Diagnostics are produced for malformed
/// attribute blobs and when the token limit is hit.
pub fn tokenize(
	document: &str,
	options: &ParseOptions,
) -> (Vec<DelimiterToken>, Vec<ParseDiagnostic>) {
	let mut walker = DelimiterWalker::new(document, options);
	walker.process();
	(walker.tokens, walker.diagnostics)
}

pub fn memstr(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack
		.windows(needle.len())
		.position(|window| window == needle)
}
