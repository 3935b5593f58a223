use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::LazyLock;

use float_cmp::approx_eq;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::Attributes;
use crate::ParsedBlock;
use crate::html_tokenizer::HtmlAttribute;
use crate::html_tokenizer::HtmlToken;
use crate::html_tokenizer::html_tokens;
use crate::schema::BlockType;
use crate::schema::RenderFn;
use crate::serializer::render_with;

/// Attributes whose presence is their value.
const BOOLEAN_ATTRIBUTES: [&str; 28] = [
	"allowfullscreen",
	"allowpaymentrequest",
	"allowusermedia",
	"async",
	"autofocus",
	"autoplay",
	"checked",
	"controls",
	"default",
	"defer",
	"disabled",
	"download",
	"formnovalidate",
	"hidden",
	"ismap",
	"itemscope",
	"loop",
	"multiple",
	"muted",
	"nomodule",
	"novalidate",
	"open",
	"playsinline",
	"readonly",
	"required",
	"reversed",
	"selected",
	"typemustmatch",
];

/// Attributes with a fixed set of keywords where an empty value is still
/// meaningful.
const ENUMERATED_ATTRIBUTES: [&str; 22] = [
	"autocapitalize",
	"autocomplete",
	"charset",
	"contenteditable",
	"crossorigin",
	"decoding",
	"dir",
	"draggable",
	"enctype",
	"formenctype",
	"formmethod",
	"http-equiv",
	"inputmode",
	"kind",
	"method",
	"preload",
	"scope",
	"shape",
	"spellcheck",
	"translate",
	"type",
	"wrap",
];

static STYLE_URL: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"^url\s*\(['"\s]*(.*?)['"\s]*\)$"#).expect("valid regex")
});

static LEADING_NUMBER: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)").expect("valid regex"));

static WHITESPACE_RUN: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"[\t\n\x0B\x0C\r ]+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	Error,
	Warning,
}

impl Display for Severity {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Error => write!(f, "error"),
			Self::Warning => write!(f, "warning"),
		}
	}
}

/// Why a block or a pair of markup strings failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
	pub severity: Severity,
	pub message: String,
	/// The values compared, e.g. expected then actual.
	pub context: Vec<String>,
}

impl ValidationIssue {
	pub fn error(message: impl Into<String>, context: Vec<String>) -> Self {
		Self {
			severity: Severity::Error,
			message: message.into(),
			context,
		}
	}

	pub fn warning(message: impl Into<String>, context: Vec<String>) -> Self {
		Self {
			severity: Severity::Warning,
			message: message.into(),
			context,
		}
	}
}

/// Check that a block's stored content matches what its type renders now.
pub fn validate_block(block: &ParsedBlock, block_type: &BlockType) -> (bool, Vec<ValidationIssue>) {
	validate_with(
		&block_type.render,
		&block.name,
		block_type.supports_custom_class_name,
		&block.attributes,
		&block.original_content,
	)
}

/// Validate `original_content` against an arbitrary render function. Inner
/// blocks are rendered as empty content.
pub(crate) fn validate_with(
	render: &RenderFn,
	name: &str,
	supports_custom_class_name: bool,
	attributes: &Attributes,
	original_content: &str,
) -> (bool, Vec<ValidationIssue>) {
	let generated = match render_with(render, name, supports_custom_class_name, attributes, "") {
		Ok(generated) => generated,
		Err(error) => {
			return (
				false,
				vec![ValidationIssue::error(
					"block validation failed because an error occurred while generating block content",
					vec![error.to_string()],
				)],
			);
		}
	};

	let (is_valid, mut issues) = is_equivalent_html_with_issues(original_content, &generated);
	if !is_valid {
		debug!(name, "block validation failed");
		issues.push(ValidationIssue::error(
			format!("block validation failed for `{name}`"),
			vec![generated, original_content.to_string()],
		));
	}

	(is_valid, issues)
}

/// Whether two markup strings are equivalent.
///
/// Whitespace-only text between tags is ignored, attribute order does not
/// matter, class lists compare as sets and inline styles compare after
/// normalization.
pub fn is_equivalent_html(actual: &str, expected: &str) -> bool {
	is_equivalent_html_with_issues(actual, expected).0
}

/// [`is_equivalent_html`] along with a description of the first difference.
pub fn is_equivalent_html_with_issues(
	actual: &str,
	expected: &str,
) -> (bool, Vec<ValidationIssue>) {
	if actual == expected {
		return (true, vec![]);
	}

	let mut issues = vec![];
	let mut actual_tokens = TokenStream::new(html_tokens(actual));
	let mut expected_tokens = TokenStream::new(html_tokens(expected));

	while let Some(actual_token) = actual_tokens.next_significant() {
		let Some(expected_token) = expected_tokens.next_significant() else {
			issues.push(ValidationIssue::warning(
				"expected end of content",
				vec![describe(&actual_token)],
			));
			return (false, issues);
		};

		if token_kind(&actual_token) != token_kind(&expected_token) {
			issues.push(ValidationIssue::warning(
				format!(
					"expected token of type `{}`, instead saw `{}`",
					token_kind(&expected_token),
					token_kind(&actual_token)
				),
				vec![describe(&expected_token), describe(&actual_token)],
			));
			return (false, issues);
		}

		if let Some(issue) = compare_tokens(&actual_token, &expected_token) {
			issues.push(issue);
			return (false, issues);
		}

		if is_closed_by(&actual_token, expected_tokens.peek()) {
			expected_tokens.next_significant();
		} else if is_closed_by(&expected_token, actual_tokens.peek()) {
			actual_tokens.next_significant();
		}
	}

	if let Some(expected_token) = expected_tokens.next_significant() {
		issues.push(ValidationIssue::warning(
			"expected more content, instead saw end of content",
			vec![describe(&expected_token)],
		));
		return (false, issues);
	}

	(true, issues)
}

struct TokenStream {
	tokens: Vec<HtmlToken>,
	index: usize,
}

impl TokenStream {
	fn new(tokens: Vec<HtmlToken>) -> Self {
		Self { tokens, index: 0 }
	}

	/// The next token which is not whitespace-only text.
	fn next_significant(&mut self) -> Option<HtmlToken> {
		while let Some(token) = self.tokens.get(self.index) {
			self.index += 1;
			if !token.is_whitespace() {
				return Some(token.clone());
			}
		}
		None
	}

	/// The immediately following token, whitespace included.
	fn peek(&self) -> Option<&HtmlToken> {
		self.tokens.get(self.index)
	}
}

fn token_kind(token: &HtmlToken) -> &'static str {
	match token {
		HtmlToken::StartTag { .. } => "StartTag",
		HtmlToken::EndTag { .. } => "EndTag",
		HtmlToken::Chars(_) => "Chars",
		HtmlToken::Comment(_) => "Comment",
		HtmlToken::Doctype { .. } => "Doctype",
	}
}

fn describe(token: &HtmlToken) -> String {
	match token {
		HtmlToken::StartTag { name, .. } => format!("<{name}>"),
		HtmlToken::EndTag { name } => format!("</{name}>"),
		HtmlToken::Chars(text) => text.clone(),
		HtmlToken::Comment(text) => format!("<!--{text}-->"),
		HtmlToken::Doctype { name, .. } => format!("<!DOCTYPE {name}>"),
	}
}

/// A self-closing start tag satisfies an end tag of the same name directly
/// after it.
fn is_closed_by(current: &HtmlToken, next: Option<&HtmlToken>) -> bool {
	let HtmlToken::StartTag {
		name,
		self_closing: true,
		..
	} = current
	else {
		return false;
	};
	matches!(next, Some(HtmlToken::EndTag { name: next_name }) if next_name.eq_ignore_ascii_case(name))
}

/// Compare two tokens of the same kind, returning the difference.
fn compare_tokens(actual: &HtmlToken, expected: &HtmlToken) -> Option<ValidationIssue> {
	match (actual, expected) {
		(
			HtmlToken::StartTag {
				name: actual_name,
				attributes: actual_attributes,
				..
			},
			HtmlToken::StartTag {
				name: expected_name,
				attributes: expected_attributes,
				..
			},
		) => {
			if !actual_name.eq_ignore_ascii_case(expected_name) {
				return Some(ValidationIssue::warning(
					format!("expected tag name `{expected_name}`, instead saw `{actual_name}`"),
					vec![expected_name.clone(), actual_name.clone()],
				));
			}
			compare_attributes(
				&meaningful_attributes(actual_attributes),
				&meaningful_attributes(expected_attributes),
			)
		}
		(HtmlToken::EndTag { name: actual_name }, HtmlToken::EndTag {
			name: expected_name,
		}) => {
			(!actual_name.eq_ignore_ascii_case(expected_name)).then(|| {
				ValidationIssue::warning(
					format!("expected closing tag `{expected_name}`, instead saw `{actual_name}`"),
					vec![expected_name.clone(), actual_name.clone()],
				)
			})
		}
		(HtmlToken::Chars(actual_text), HtmlToken::Chars(expected_text))
		| (HtmlToken::Comment(actual_text), HtmlToken::Comment(expected_text)) => {
			(!is_equivalent_text(actual_text, expected_text)).then(|| {
				ValidationIssue::warning(
					format!("expected text `{expected_text}`, saw `{actual_text}`"),
					vec![expected_text.clone(), actual_text.clone()],
				)
			})
		}
		_ => {
			(actual != expected).then(|| {
				ValidationIssue::warning(
					"expected matching tokens",
					vec![describe(expected), describe(actual)],
				)
			})
		}
	}
}

fn is_equivalent_text(actual: &str, expected: &str) -> bool {
	actual == expected || collapse_whitespace(actual) == collapse_whitespace(expected)
}

/// Replaces each run of whitespace with a single space. Leading and trailing
/// runs are kept.
fn collapse_whitespace(text: &str) -> Cow<'_, str> {
	WHITESPACE_RUN.replace_all(text, " ")
}

/// Attributes that affect equivalence: those with a value, `data-*`, and
/// boolean or enumerated attributes.
fn meaningful_attributes(attributes: &[HtmlAttribute]) -> Vec<&HtmlAttribute> {
	attributes
		.iter()
		.filter(|attribute| {
			!attribute.value.is_empty()
				|| attribute.name.starts_with("data-")
				|| BOOLEAN_ATTRIBUTES.contains(&attribute.name.as_str())
				|| ENUMERATED_ATTRIBUTES.contains(&attribute.name.as_str())
		})
		.collect()
}

fn compare_attributes(
	actual: &[&HtmlAttribute],
	expected: &[&HtmlAttribute],
) -> Option<ValidationIssue> {
	let list = |attributes: &[&HtmlAttribute]| {
		attributes
			.iter()
			.map(|attribute| format!("{}=\"{}\"", attribute.name, attribute.value))
			.collect::<Vec<_>>()
			.join(" ")
	};

	if actual.len() != expected.len() {
		return Some(ValidationIssue::warning(
			"expected attributes differ from the attributes found",
			vec![list(expected), list(actual)],
		));
	}

	let expected_values: HashMap<String, &str> = expected
		.iter()
		.map(|attribute| (attribute.name.to_ascii_lowercase(), attribute.value.as_str()))
		.collect();

	for attribute in actual {
		let name = attribute.name.to_ascii_lowercase();
		let Some(expected_value) = expected_values.get(&name) else {
			return Some(ValidationIssue::warning(
				format!("encountered unexpected attribute `{name}`"),
				vec![list(expected), list(actual)],
			));
		};

		if !is_equal_attribute(&name, &attribute.value, expected_value) {
			return Some(ValidationIssue::warning(
				format!(
					"expected attribute `{name}` of value `{expected_value}`, saw `{}`",
					attribute.value
				),
				vec![(*expected_value).to_string(), attribute.value.clone()],
			));
		}
	}

	None
}

fn is_equal_attribute(name: &str, actual: &str, expected: &str) -> bool {
	match name {
		"class" => {
			let actual: Vec<&str> = actual.split_ascii_whitespace().collect();
			let expected: Vec<&str> = expected.split_ascii_whitespace().collect();
			actual.iter().all(|class| expected.contains(class))
				&& expected.iter().all(|class| actual.contains(class))
		}
		"style" => style_properties(actual) == style_properties(expected),
		name if BOOLEAN_ATTRIBUTES.contains(&name) => true,
		_ => actual == expected,
	}
}

/// Parse an inline style into a map of property to normalized value.
pub fn style_properties(style: &str) -> HashMap<String, String> {
	let style = style.trim_end();
	let style = style.strip_suffix(';').unwrap_or(style);

	style
		.split(';')
		.map(|declaration| {
			let (property, value) = declaration.split_once(':').unwrap_or((declaration, ""));
			(property.trim().to_string(), normalize_style_value(value.trim()))
		})
		.collect()
}

/// Normalize a style value: zero lengths lose their unit, leading-dot
/// decimals gain a zero and `url()` loses its quotes.
pub fn normalize_style_value(value: &str) -> String {
	let normalized = value
		.split_ascii_whitespace()
		.map(normalize_length)
		.collect::<Vec<_>>()
		.join(" ");

	STYLE_URL
		.replace(&normalized, "url($1)")
		.into_owned()
}

fn normalize_length(value: &str) -> String {
	let is_zero = LEADING_NUMBER
		.find(value)
		.and_then(|number| number.as_str().parse::<f64>().ok())
		.is_some_and(|number| approx_eq!(f64, number, 0.0));

	if is_zero {
		return "0".to_string();
	}
	if value.starts_with('.') {
		return format!("0{value}");
	}
	value.to_string()
}
