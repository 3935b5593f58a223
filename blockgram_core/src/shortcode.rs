use std::fmt::Display;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// Attribute syntax inside a shortcode: `key="value"`, `key='value'`,
/// `key=value`, and positional `"value"`, `'value'` or `value`.
static ATTRIBUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r#"([\w-]+)\s*=\s*"([^"]*)"(?:\s|$)|([\w-]+)\s*=\s*'([^']*)'(?:\s|$)|([\w-]+)\s*=\s*([^\s'"]+)(?:\s|$)|"([^"]*)"(?:\s|$)|'([^']*)'(?:\s|$)|(\S+)(?:\s|$)"#,
	)
	.expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcodeKind {
	/// `[tag attrs]`
	Single,
	/// `[tag attrs /]`
	SelfClosing,
	/// `[tag attrs]content[/tag]`
	Closed,
}

/// A parsed bracket shortcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcode {
	pub tag: String,
	/// `key=value` attributes in source order, keys lower-cased.
	pub named: Vec<(String, String)>,
	/// Positional attributes.
	pub numeric: Vec<String>,
	pub content: Option<String>,
	pub kind: ShortcodeKind,
}

impl Shortcode {
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.named
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.as_str())
	}
}

impl Display for Shortcode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "[{}", self.tag)?;
		for (key, value) in &self.named {
			write!(f, " {key}=\"{value}\"")?;
		}
		for value in &self.numeric {
			if value.contains(char::is_whitespace) {
				write!(f, " \"{value}\"")?;
			} else {
				write!(f, " {value}")?;
			}
		}

		match self.kind {
			ShortcodeKind::Single => write!(f, "]"),
			ShortcodeKind::SelfClosing => write!(f, " /]"),
			ShortcodeKind::Closed => {
				write!(
					f,
					"]{}[/{}]",
					self.content.as_deref().unwrap_or_default(),
					self.tag
				)
			}
		}
	}
}

/// A shortcode found in a larger text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcodeMatch {
	pub shortcode: Shortcode,
	/// Byte range of the whole shortcode in the searched text.
	pub span: Range<usize>,
}

/// Parse the attribute text of a shortcode into named and positional
/// values. Character references are decoded first, since shortcodes taken
/// from HTML often have their quotes encoded.
pub fn parse_shortcode_attributes(text: &str) -> (Vec<(String, String)>, Vec<String>) {
	let text = html_escape::decode_html_entities(text);
	let mut named = vec![];
	let mut numeric = vec![];

	for captures in ATTRIBUTE_PATTERN.captures_iter(&text) {
		let group = |index: usize| captures.get(index).map(|found| found.as_str().to_string());

		if let (Some(key), Some(value)) = (group(1), group(2)) {
			named.push((key.to_ascii_lowercase(), value));
		} else if let (Some(key), Some(value)) = (group(3), group(4)) {
			named.push((key.to_ascii_lowercase(), value));
		} else if let (Some(key), Some(value)) = (group(5), group(6)) {
			named.push((key.to_ascii_lowercase(), value));
		} else if let Some(value) = group(7).or_else(|| group(8)).or_else(|| group(9)) {
			numeric.push(value);
		}
	}

	(named, numeric)
}

/// Whether `text` contains a shortcode named `tag`.
pub fn has_shortcode(tag: &str, text: &str) -> bool {
	next_shortcode(tag, text, 0).is_some()
}

/// Find the next shortcode named `tag` at or after byte offset `from`.
///
/// Escaped shortcodes (`[[tag]]`) are skipped. A shortcode with no matching
/// `[/tag]` is a single shortcode without content.
pub fn next_shortcode(tag: &str, text: &str, from: usize) -> Option<ShortcodeMatch> {
	let opener = format!("[{tag}");
	let closer = format!("[/{tag}]");
	let mut search = from;

	while let Some(offset) = text.get(search..)?.find(&opener) {
		let start = search + offset;
		let after_name = start + opener.len();
		search = after_name;

		// `[tagline]` is not `[tag]`.
		let follows = text[after_name..].chars().next();
		if follows.is_some_and(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-') {
			continue;
		}

		let Some(close_offset) = text[after_name..].find(']') else {
			return None;
		};
		let bracket = after_name + close_offset;
		let inside = &text[after_name..bracket];

		let (attributes, kind) = match inside.trim_end().strip_suffix('/') {
			Some(attributes) => (attributes, ShortcodeKind::SelfClosing),
			None => (inside, ShortcodeKind::Single),
		};

		let mut end = bracket + 1;
		let mut content = None;
		let mut kind = kind;
		if kind == ShortcodeKind::Single {
			if let Some(closer_offset) = text[end..].find(&closer) {
				content = Some(text[end..end + closer_offset].to_string());
				end += closer_offset + closer.len();
				kind = ShortcodeKind::Closed;
			}
		}

		let escaped = start > 0
			&& text.as_bytes()[start - 1] == b'['
			&& text.as_bytes().get(end) == Some(&b']');
		if escaped {
			search = end;
			continue;
		}

		let (named, numeric) = parse_shortcode_attributes(attributes);
		return Some(ShortcodeMatch {
			shortcode: Shortcode {
				tag: tag.to_string(),
				named,
				numeric,
				content,
				kind,
			},
			span: start..end,
		});
	}

	None
}
