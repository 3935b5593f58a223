use std::ops::Range;

use crate::entities::EntityResolver;
use crate::entities::HtmlEntities;
use crate::entities::decode_numeric;

/// Elements whose content is not markup. `<` and `>` inside them are text
/// until the matching end tag.
const RAW_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "textarea", "title"];

/// Raw text elements whose content still decodes character references.
const ESCAPABLE_RAW_TEXT_ELEMENTS: [&str; 2] = ["textarea", "title"];

/// The longest named reference scanned before giving up on finding `;`.
const MAX_REFERENCE_LENGTH: usize = 32;

/// A single attribute on a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlAttribute {
	/// Lower-cased attribute name.
	pub name: String,
	/// The value with character references decoded. Empty for attributes
	/// written without a value.
	pub value: String,
	/// Whether the value was written in quotes.
	pub quoted: bool,
}

impl HtmlAttribute {
	fn new(name: String) -> Self {
		Self {
			name,
			value: String::new(),
			quoted: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlToken {
	StartTag {
		name: String,
		attributes: Vec<HtmlAttribute>,
		self_closing: bool,
	},
	EndTag {
		name: String,
	},
	Chars(String),
	Comment(String),
	Doctype {
		name: String,
		public_id: Option<String>,
		system_id: Option<String>,
	},
}

impl HtmlToken {
	/// The tag name of a start or end tag.
	pub fn tag_name(&self) -> Option<&str> {
		match self {
			Self::StartTag { name, .. } | Self::EndTag { name } => Some(name),
			_ => None,
		}
	}

	/// Look up an attribute value on a start tag.
	pub fn attribute(&self, attribute: &str) -> Option<&str> {
		let Self::StartTag { attributes, .. } = self else {
			return None;
		};
		attributes
			.iter()
			.find(|candidate| candidate.name == attribute)
			.map(|candidate| candidate.value.as_str())
	}

	/// Character data consisting only of HTML whitespace.
	pub fn is_whitespace(&self) -> bool {
		matches!(self, Self::Chars(text) if text.chars().all(is_html_whitespace))
	}
}

/// A token together with the byte range it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
	pub token: HtmlToken,
	pub span: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	Data,
	TagOpen,
	EndTagOpen,
	TagName,
	BeforeAttributeName,
	AttributeName,
	AfterAttributeName,
	BeforeAttributeValue,
	AttributeValueDoubleQuoted,
	AttributeValueSingleQuoted,
	AttributeValueUnquoted,
	AfterAttributeValueQuoted,
	SelfClosingStartTag,
	CommentStart,
	Comment,
	CommentEndDash,
	CommentEnd,
	Doctype,
	BogusComment,
}

/// The tag currently being read.
struct PendingTag {
	name: String,
	attributes: Vec<HtmlAttribute>,
	is_end: bool,
	self_closing: bool,
}

/// Character-at-a-time HTML tokenizer.
///
/// This is not a conforming HTML5 tokenizer. It covers tags, attributes,
/// comments, doctypes and character references, which is everything block
/// markup contains. Tokens carry the byte range they were read from so the
/// fragment DOM can slice the source verbatim.
pub struct HtmlTokenizer<'a> {
	input: &'a str,
	/// Byte offset of the next character.
	position: usize,
	state: State,
	entities: &'a dyn EntityResolver,
	tokens: Vec<SpannedToken>,
	/// Pending character data and where it started.
	text: String,
	text_start: Option<usize>,
	/// Start of the tag, comment or doctype being read.
	markup_start: usize,
	tag: Option<PendingTag>,
	attribute: Option<HtmlAttribute>,
	comment: String,
}

impl<'a> HtmlTokenizer<'a> {
	pub fn new(input: &'a str) -> Self {
		Self::with_entities(input, &HtmlEntities)
	}

	pub fn with_entities(input: &'a str, entities: &'a dyn EntityResolver) -> Self {
		Self {
			input,
			position: 0,
			state: State::Data,
			entities,
			tokens: vec![],
			text: String::new(),
			text_start: None,
			markup_start: 0,
			tag: None,
			attribute: None,
			comment: String::new(),
		}
	}

	pub fn tokenize(mut self) -> Vec<SpannedToken> {
		while let Some(ch) = self.next_char() {
			self.step(ch);
		}
		self.finish();
		self.tokens
	}

	fn peek(&self) -> Option<char> {
		self.input[self.position..].chars().next()
	}

	fn rest(&self) -> &'a str {
		&self.input[self.position..]
	}

	fn next_char(&mut self) -> Option<char> {
		let ch = self.peek()?;
		self.position += ch.len_utf8();
		Some(ch)
	}

	/// Step back over a character so it is handled again in a new state.
	fn reconsume(&mut self, ch: char, state: State) {
		self.position -= ch.len_utf8();
		self.state = state;
	}

	fn step(&mut self, ch: char) {
		let start = self.position - ch.len_utf8();

		match self.state {
			State::Data => {
				match ch {
					'<' => {
						self.markup_start = start;
						self.state = State::TagOpen;
					}
					'&' => {
						let decoded = self.consume_reference(None);
						self.push_text(start, &decoded);
					}
					_ => self.push_char(start, ch),
				}
			}
			State::TagOpen => {
				match ch {
					'!' => {
						if self.rest().starts_with("--") {
							self.position += 2;
							self.comment.clear();
							self.state = State::CommentStart;
						} else if self
							.rest()
							.get(..7)
							.is_some_and(|word| word.eq_ignore_ascii_case("doctype"))
						{
							self.position += 7;
							self.comment.clear();
							self.state = State::Doctype;
						} else {
							self.comment.clear();
							self.state = State::BogusComment;
						}
					}
					'/' => self.state = State::EndTagOpen,
					'?' => {
						self.comment.clear();
						self.comment.push(ch);
						self.state = State::BogusComment;
					}
					ch if ch.is_ascii_alphabetic() => {
						self.start_tag(ch, false);
						self.state = State::TagName;
					}
					_ => {
						self.push_char(self.markup_start, '<');
						self.reconsume(ch, State::Data);
					}
				}
			}
			State::EndTagOpen => {
				match ch {
					ch if ch.is_ascii_alphabetic() => {
						self.start_tag(ch, true);
						self.state = State::TagName;
					}
					// `</>` is dropped.
					'>' => self.state = State::Data,
					_ => {
						self.comment.clear();
						self.reconsume(ch, State::BogusComment);
					}
				}
			}
			State::TagName => {
				match ch {
					ch if is_html_whitespace(ch) => self.state = State::BeforeAttributeName,
					'/' => self.state = State::SelfClosingStartTag,
					'>' => self.emit_tag(),
					_ => {
						if let Some(tag) = self.tag.as_mut() {
							tag.name.push(ch.to_ascii_lowercase());
						}
					}
				}
			}
			State::BeforeAttributeName => {
				match ch {
					ch if is_html_whitespace(ch) => {}
					'/' => self.state = State::SelfClosingStartTag,
					'>' => self.emit_tag(),
					_ => {
						self.start_attribute(ch);
						self.state = State::AttributeName;
					}
				}
			}
			State::AttributeName => {
				match ch {
					ch if is_html_whitespace(ch) => self.state = State::AfterAttributeName,
					'/' => {
						self.finish_attribute();
						self.state = State::SelfClosingStartTag;
					}
					'=' => self.state = State::BeforeAttributeValue,
					'>' => self.emit_tag(),
					_ => {
						if let Some(attribute) = self.attribute.as_mut() {
							attribute.name.push(ch.to_ascii_lowercase());
						}
					}
				}
			}
			State::AfterAttributeName => {
				match ch {
					ch if is_html_whitespace(ch) => {}
					'/' => {
						self.finish_attribute();
						self.state = State::SelfClosingStartTag;
					}
					'=' => self.state = State::BeforeAttributeValue,
					'>' => self.emit_tag(),
					_ => {
						self.start_attribute(ch);
						self.state = State::AttributeName;
					}
				}
			}
			State::BeforeAttributeValue => {
				match ch {
					ch if is_html_whitespace(ch) => {}
					'"' => {
						self.mark_quoted();
						self.state = State::AttributeValueDoubleQuoted;
					}
					'\'' => {
						self.mark_quoted();
						self.state = State::AttributeValueSingleQuoted;
					}
					'>' => self.emit_tag(),
					_ => self.reconsume(ch, State::AttributeValueUnquoted),
				}
			}
			State::AttributeValueDoubleQuoted => {
				match ch {
					'"' => self.state = State::AfterAttributeValueQuoted,
					'&' => {
						let decoded = self.consume_reference(Some('"'));
						self.push_attribute_value(&decoded);
					}
					_ => self.push_attribute_value(ch.encode_utf8(&mut [0; 4])),
				}
			}
			State::AttributeValueSingleQuoted => {
				match ch {
					'\'' => self.state = State::AfterAttributeValueQuoted,
					'&' => {
						let decoded = self.consume_reference(Some('\''));
						self.push_attribute_value(&decoded);
					}
					_ => self.push_attribute_value(ch.encode_utf8(&mut [0; 4])),
				}
			}
			State::AttributeValueUnquoted => {
				match ch {
					ch if is_html_whitespace(ch) => {
						self.finish_attribute();
						self.state = State::BeforeAttributeName;
					}
					'&' => {
						let decoded = self.consume_reference(Some('>'));
						self.push_attribute_value(&decoded);
					}
					'>' => self.emit_tag(),
					_ => self.push_attribute_value(ch.encode_utf8(&mut [0; 4])),
				}
			}
			State::AfterAttributeValueQuoted => {
				match ch {
					ch if is_html_whitespace(ch) => {
						self.finish_attribute();
						self.state = State::BeforeAttributeName;
					}
					'/' => {
						self.finish_attribute();
						self.state = State::SelfClosingStartTag;
					}
					'>' => self.emit_tag(),
					_ => {
						self.finish_attribute();
						self.reconsume(ch, State::BeforeAttributeName);
					}
				}
			}
			State::SelfClosingStartTag => {
				if ch == '>' {
					if let Some(tag) = self.tag.as_mut() {
						tag.self_closing = true;
					}
					self.emit_tag();
				} else {
					self.reconsume(ch, State::BeforeAttributeName);
				}
			}
			State::CommentStart => {
				if ch == '>' {
					// `<!-->` is an empty comment.
					self.emit_comment();
				} else {
					self.reconsume(ch, State::Comment);
				}
			}
			State::Comment => {
				if ch == '-' {
					self.state = State::CommentEndDash;
				} else {
					self.comment.push(ch);
				}
			}
			State::CommentEndDash => {
				if ch == '-' {
					self.state = State::CommentEnd;
				} else {
					self.comment.push('-');
					self.comment.push(ch);
					self.state = State::Comment;
				}
			}
			State::CommentEnd => {
				match ch {
					'>' => self.emit_comment(),
					'-' => self.comment.push('-'),
					_ => {
						self.comment.push_str("--");
						self.comment.push(ch);
						self.state = State::Comment;
					}
				}
			}
			State::Doctype => {
				if ch == '>' {
					self.emit_doctype();
				} else {
					self.comment.push(ch);
				}
			}
			State::BogusComment => {
				if ch == '>' {
					self.emit_comment();
				} else {
					self.comment.push(ch);
				}
			}
		}
	}

	/// Read a character reference after `&`. Returns the decoded text, or
	/// `&` alone when nothing valid follows; the characters after it are then
	/// read normally.
	fn consume_reference(&mut self, additional_allowed: Option<char>) -> String {
		let rest = self.rest();
		let Some(first) = rest.chars().next() else {
			return "&".to_string();
		};
		if is_html_whitespace(first)
			|| first == '<'
			|| first == '&'
			|| Some(first) == additional_allowed
		{
			return "&".to_string();
		}

		let Some(end) = rest
			.char_indices()
			.take(MAX_REFERENCE_LENGTH + 2)
			.find(|(_, ch)| *ch == ';')
			.map(|(index, _)| index)
		else {
			return "&".to_string();
		};

		let reference = &rest[..end];
		let decoded = match reference.strip_prefix('#') {
			Some(numeric) => decode_numeric(numeric).map(String::from),
			None => self.entities.resolve(reference),
		};

		match decoded {
			Some(decoded) => {
				self.position += end + 1;
				decoded
			}
			None => "&".to_string(),
		}
	}

	fn push_char(&mut self, start: usize, ch: char) {
		self.text_start.get_or_insert(start);
		self.text.push(ch);
	}

	fn push_text(&mut self, start: usize, text: &str) {
		self.text_start.get_or_insert(start);
		self.text.push_str(text);
	}

	/// Emit pending character data ending at `end`.
	fn flush_text(&mut self, end: usize) {
		let Some(start) = self.text_start.take() else {
			return;
		};
		let text = std::mem::take(&mut self.text);
		self.push_token(HtmlToken::Chars(text), start..end);
	}

	/// Append a token, merging adjacent character runs.
	fn push_token(&mut self, token: HtmlToken, span: Range<usize>) {
		if let HtmlToken::Chars(text) = &token {
			if let Some(SpannedToken {
				token: HtmlToken::Chars(previous),
				span: previous_span,
			}) = self.tokens.last_mut()
			{
				if previous_span.end == span.start {
					previous.push_str(text);
					previous_span.end = span.end;
					return;
				}
			}
		}
		self.tokens.push(SpannedToken { token, span });
	}

	fn start_tag(&mut self, first: char, is_end: bool) {
		self.tag = Some(PendingTag {
			name: first.to_ascii_lowercase().to_string(),
			attributes: vec![],
			is_end,
			self_closing: false,
		});
	}

	fn start_attribute(&mut self, first: char) {
		self.finish_attribute();
		self.attribute = Some(HtmlAttribute::new(first.to_ascii_lowercase().to_string()));
	}

	fn mark_quoted(&mut self) {
		if let Some(attribute) = self.attribute.as_mut() {
			attribute.quoted = true;
		}
	}

	fn push_attribute_value(&mut self, value: &str) {
		if let Some(attribute) = self.attribute.as_mut() {
			attribute.value.push_str(value);
		}
	}

	/// Move the pending attribute onto the pending tag. Duplicate names keep
	/// the first occurrence.
	fn finish_attribute(&mut self) {
		let Some(attribute) = self.attribute.take() else {
			return;
		};
		let Some(tag) = self.tag.as_mut() else {
			return;
		};
		if tag.attributes.iter().all(|existing| existing.name != attribute.name) {
			tag.attributes.push(attribute);
		}
	}

	fn emit_tag(&mut self) {
		self.finish_attribute();
		self.state = State::Data;
		let Some(tag) = self.tag.take() else {
			return;
		};

		let span = self.markup_start..self.position;
		self.flush_text(self.markup_start);

		if tag.is_end {
			self.push_token(HtmlToken::EndTag { name: tag.name }, span);
			return;
		}

		let raw_text = !tag.self_closing && RAW_TEXT_ELEMENTS.contains(&tag.name.as_str());
		let name = tag.name.clone();
		self.push_token(
			HtmlToken::StartTag {
				name: tag.name,
				attributes: tag.attributes,
				self_closing: tag.self_closing,
			},
			span,
		);

		if raw_text {
			self.consume_raw_text(&name);
		}
	}

	/// Read the body of a raw text element up to (not including) its end tag.
	fn consume_raw_text(&mut self, name: &str) {
		let start = self.position;
		let end = find_raw_text_end(self.input, start, name).unwrap_or(self.input.len());
		if end == start {
			return;
		}

		let body = &self.input[start..end];
		let text = if ESCAPABLE_RAW_TEXT_ELEMENTS.contains(&name) {
			let mut decoded = String::with_capacity(body.len());
			let mut nested = HtmlTokenizer::with_entities(body, self.entities);
			while let Some(ch) = nested.next_char() {
				if ch == '&' {
					decoded.push_str(&nested.consume_reference(None));
				} else {
					decoded.push(ch);
				}
			}
			decoded
		} else {
			body.to_string()
		};

		self.push_token(HtmlToken::Chars(text), start..end);
		self.position = end;
	}

	fn emit_comment(&mut self) {
		self.state = State::Data;
		let span = self.markup_start..self.position;
		self.flush_text(self.markup_start);
		let text = std::mem::take(&mut self.comment);
		self.push_token(HtmlToken::Comment(text), span);
	}

	fn emit_doctype(&mut self) {
		self.state = State::Data;
		let span = self.markup_start..self.position;
		self.flush_text(self.markup_start);
		let body = std::mem::take(&mut self.comment);
		self.push_token(parse_doctype(&body), span);
	}

	/// Flush whatever is pending when the input ends.
	fn finish(&mut self) {
		match self.state {
			State::Data => {}
			State::Comment
			| State::CommentStart
			| State::CommentEndDash
			| State::CommentEnd
			| State::BogusComment => self.emit_comment(),
			State::Doctype => self.emit_doctype(),
			// An unterminated tag is kept as text.
			_ => {
				self.tag = None;
				self.attribute = None;
				let start = self.markup_start;
				let literal = self.input[start..].to_string();
				self.push_text(start, &literal);
			}
		}
		self.flush_text(self.input.len());
	}
}

/// Find the byte offset of `</name` closing a raw text element, matched
/// case-insensitively and followed by whitespace, `/` or `>`.
fn find_raw_text_end(input: &str, from: usize, name: &str) -> Option<usize> {
	let bytes = input.as_bytes();
	let mut index = from;

	while index + 2 + name.len() <= bytes.len() {
		if bytes[index] == b'<' && bytes[index + 1] == b'/' {
			let candidate = &bytes[index + 2..index + 2 + name.len()];
			if candidate.eq_ignore_ascii_case(name.as_bytes()) {
				let follow = bytes.get(index + 2 + name.len()).copied();
				if matches!(
					follow,
					None | Some(b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r' | b'\x0C')
				) {
					return Some(index);
				}
			}
		}
		index += 1;
	}

	None
}

fn parse_doctype(body: &str) -> HtmlToken {
	let mut words = body.split_ascii_whitespace();
	let name = words.next().unwrap_or_default().to_ascii_lowercase();
	let rest = body
		.trim_start()
		.get(name.len()..)
		.unwrap_or_default()
		.trim();

	let mut quoted = rest
		.split(['"', '\''])
		.skip(1)
		.step_by(2)
		.map(str::to_string);

	let keyword = rest.get(..6).unwrap_or_default();
	let (public_id, system_id) = if keyword.eq_ignore_ascii_case("public") {
		(quoted.next(), quoted.next())
	} else if keyword.eq_ignore_ascii_case("system") {
		(None, quoted.next())
	} else {
		(None, None)
	};

	HtmlToken::Doctype {
		name,
		public_id,
		system_id,
	}
}

pub(crate) fn is_html_whitespace(ch: char) -> bool {
	matches!(ch, ' ' | '\t' | '\n' | '\r' | '\x0C')
}

/// Tokenize `input` with the standard entity table.
pub fn tokenize_html(input: &str) -> Vec<SpannedToken> {
	HtmlTokenizer::new(input).tokenize()
}

/// Tokenize `input`, discarding spans.
pub fn html_tokens(input: &str) -> Vec<HtmlToken> {
	tokenize_html(input)
		.into_iter()
		.map(|spanned| spanned.token)
		.collect()
}
