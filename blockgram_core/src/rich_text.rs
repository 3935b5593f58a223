use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::Attributes;
use crate::dom::Dom;
use crate::dom::NodeData;
use crate::dom::NodeId;
use crate::dom::is_void_element;

/// Stands in for an inline object, such as an image, in the text.
pub const OBJECT_REPLACEMENT_CHARACTER: char = '\u{FFFC}';

/// Stands in for a `<br>` line break in the text.
pub const LINE_SEPARATOR: char = '\u{2028}';

/// A formatting span over a range of [`RichText::text`], measured in
/// characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatSpan {
	/// The element name, e.g. `strong` or `a`.
	pub tag: String,
	pub start: usize,
	pub end: usize,
	#[serde(default, skip_serializing_if = "Attributes::is_empty")]
	pub attributes: Attributes,
}

/// Text with formatting kept apart from the characters it applies to.
///
/// ```
/// use blockgram_core::RichText;
///
/// let value = RichText::from_html("Hello <strong>world</strong>");
/// assert_eq!(value.text, "Hello world");
/// assert_eq!(value.formats[0].start, 6);
/// assert_eq!(value.to_html(), "Hello <strong>world</strong>");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichText {
	pub text: String,
	#[serde(default)]
	pub formats: Vec<FormatSpan>,
}

impl RichText {
	/// Build from an HTML fragment.
	pub fn from_html(html: &str) -> Self {
		let dom = Dom::parse(html);
		Self::from_dom(&dom, dom.root())
	}

	/// Build from the children of `id`.
	pub fn from_dom(dom: &Dom, id: NodeId) -> Self {
		let mut rich_text = Self::default();
		let mut length = 0;
		for child in dom.children(id) {
			rich_text.collect(dom, *child, &mut length);
		}
		rich_text
	}

	fn collect(&mut self, dom: &Dom, id: NodeId, length: &mut usize) {
		match &dom.node(id).data {
			NodeData::Text(text) => {
				self.text.push_str(text);
				*length += text.chars().count();
			}
			NodeData::Element(element) => {
				if element.name == "br" {
					self.text.push(LINE_SEPARATOR);
					*length += 1;
					return;
				}

				let attributes: Attributes = element
					.attributes
					.iter()
					.map(|attribute| (attribute.name.clone(), Value::String(attribute.value.clone())))
					.collect();

				if is_void_element(&element.name) {
					self.formats.push(FormatSpan {
						tag: element.name.clone(),
						start: *length,
						end: *length + 1,
						attributes,
					});
					self.text.push(OBJECT_REPLACEMENT_CHARACTER);
					*length += 1;
					return;
				}

				let index = self.formats.len();
				self.formats.push(FormatSpan {
					tag: element.name.clone(),
					start: *length,
					end: *length,
					attributes,
				});
				for child in dom.children(id) {
					self.collect(dom, *child, length);
				}
				self.formats[index].end = *length;

				// Empty formatting carries nothing.
				if self.formats[index].start == self.formats[index].end {
					self.formats.remove(index);
				}
			}
			NodeData::Comment(_) | NodeData::Document => {}
		}
	}

	pub fn is_empty(&self) -> bool {
		self.text.is_empty()
	}

	pub fn to_value(&self) -> Value {
		serde_json::to_value(self).unwrap_or(Value::Null)
	}

	pub fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::String(html) => Some(Self::from_html(html)),
			Value::Object(_) => serde_json::from_value(value.clone()).ok(),
			_ => None,
		}
	}

	/// Render back to HTML. Spans that overlap without nesting are split so
	/// the output is well formed.
	pub fn to_html(&self) -> String {
		let chars: Vec<char> = self.text.chars().collect();
		let mut html = String::new();
		let mut open: Vec<usize> = vec![];
		// The smallest end among the open spans.
		let mut next_end = usize::MAX;

		let mut order: Vec<usize> = (0..self.formats.len()).collect();
		order.sort_by(|a, b| {
			let (a, b) = (&self.formats[*a], &self.formats[*b]);
			a.start.cmp(&b.start).then(b.end.cmp(&a.end))
		});
		let mut pending = order.into_iter().peekable();

		let mut position = 0;
		while position <= chars.len() {
			// Close spans ending here, reopening any inner span that continues.
			if next_end <= position {
				if let Some(lowest) = open
					.iter()
					.position(|index| self.formats[*index].end <= position)
				{
					let closing: Vec<usize> = open.drain(lowest..).collect();
					for index in closing.iter().rev() {
						write_close(&mut html, &self.formats[*index]);
					}
					for index in closing {
						if self.formats[index].end > position {
							write_open(&mut html, &self.formats[index]);
							open.push(index);
						}
					}
				}
				next_end = open
					.iter()
					.map(|index| self.formats[*index].end)
					.min()
					.unwrap_or(usize::MAX);
			}

			if position == chars.len() {
				break;
			}

			let mut object = None;
			while let Some(index) = pending.next_if(|index| self.formats[*index].start <= position) {
				let format = &self.formats[index];
				if format.start != position || format.end <= position {
					continue;
				}
				if is_void_element(&format.tag) && chars[position] == OBJECT_REPLACEMENT_CHARACTER {
					object = Some(index);
					continue;
				}
				write_open(&mut html, format);
				open.push(index);
				next_end = next_end.min(format.end);
			}

			match object {
				Some(index) => write_open(&mut html, &self.formats[index]),
				None if chars[position] == LINE_SEPARATOR => html.push_str("<br>"),
				None => {
					let mut buffer = [0; 4];
					html.push_str(&html_escape::encode_text(
						chars[position].encode_utf8(&mut buffer),
					));
				}
			}
			position += 1;
		}

		html
	}
}

fn write_open(html: &mut String, format: &FormatSpan) {
	html.push('<');
	html.push_str(&format.tag);
	for (name, value) in &format.attributes {
		let value = match value {
			Value::String(value) => value.clone(),
			other => other.to_string(),
		};
		html.push(' ');
		html.push_str(name);
		html.push_str("=\"");
		html.push_str(&html_escape::encode_double_quoted_attribute(&value));
		html.push('"');
	}
	html.push('>');
}

fn write_close(html: &mut String, format: &FormatSpan) {
	if is_void_element(&format.tag) {
		return;
	}
	html.push_str("</");
	html.push_str(&format.tag);
	html.push('>');
}
