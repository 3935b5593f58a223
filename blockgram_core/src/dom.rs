use std::ops::Range;

use crate::config::DEFAULT_MAX_DEPTH;
use crate::html_tokenizer::HtmlAttribute;
use crate::html_tokenizer::HtmlToken;
use crate::html_tokenizer::tokenize_html;

/// Index of a node in a [`Dom`] arena.
pub type NodeId = usize;

/// Elements which never have content or an end tag.
pub const VOID_ELEMENTS: [&str; 14] = [
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
	"track", "wbr",
];

/// Elements whose text is written out without escaping.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Opening one of these closes an open `<p>`.
const CLOSES_PARAGRAPH: [&str; 29] = [
	"address",
	"article",
	"aside",
	"blockquote",
	"details",
	"div",
	"dl",
	"fieldset",
	"figcaption",
	"figure",
	"footer",
	"form",
	"h1",
	"h2",
	"h3",
	"h4",
	"h5",
	"h6",
	"header",
	"hr",
	"main",
	"nav",
	"ol",
	"p",
	"pre",
	"section",
	"table",
	"ul",
	"menu",
];

pub fn is_void_element(name: &str) -> bool {
	VOID_ELEMENTS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
	pub name: String,
	pub attributes: Vec<HtmlAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
	Document,
	Element(ElementData),
	Text(String),
	Comment(String),
}

#[derive(Debug, Clone)]
pub struct Node {
	pub data: NodeData,
	pub parent: Option<NodeId>,
	pub children: Vec<NodeId>,
	/// Source range of the whole node. `None` for nodes created after
	/// parsing.
	pub span: Option<Range<usize>>,
	/// Source range between an element's start and end tags.
	pub inner_span: Option<Range<usize>>,
}

impl Node {
	fn new(data: NodeData, span: Option<Range<usize>>) -> Self {
		Self {
			data,
			parent: None,
			children: vec![],
			span,
			inner_span: None,
		}
	}

	pub fn element(&self) -> Option<&ElementData> {
		match &self.data {
			NodeData::Element(element) => Some(element),
			_ => None,
		}
	}

	pub fn is_element(&self) -> bool {
		matches!(self.data, NodeData::Element(_))
	}

	pub fn is_text(&self) -> bool {
		matches!(self.data, NodeData::Text(_))
	}
}

/// A small arena-backed DOM for HTML fragments.
///
/// The tree is built from [`tokenize_html`] output. End tags close the
/// nearest open element with the same name; unmatched end tags are ignored.
/// A handful of elements (`p`, `li`, `dt`, `dd`, `tr`, `td`, `th`, `option`)
/// are closed implicitly the way browsers do. Nesting deeper than the
/// configured limit is flattened into the deepest allowed element.
///
/// Until the tree is mutated, [`Dom::inner_html`] and [`Dom::outer_html`]
/// return verbatim slices of the source.
#[derive(Debug, Clone)]
pub struct Dom {
	source: String,
	nodes: Vec<Node>,
	mutated: bool,
}

/// Open element stack used while building.
struct DomBuilder {
	dom: Dom,
	stack: Vec<NodeId>,
	max_depth: usize,
	/// Names of elements appended past `max_depth` without being opened.
	/// Their end tags are swallowed.
	flattened: Vec<String>,
}

impl DomBuilder {
	fn build(mut self) -> Dom {
		let source = std::mem::take(&mut self.dom.source);
		for spanned in tokenize_html(&source) {
			let span = spanned.span;
			match spanned.token {
				HtmlToken::StartTag {
					name,
					attributes,
					self_closing,
				} => self.start_tag(name, attributes, self_closing, span),
				HtmlToken::EndTag { name } => self.end_tag(&name, span),
				HtmlToken::Chars(text) => {
					self.append(Node::new(NodeData::Text(text), Some(span)));
				}
				HtmlToken::Comment(text) => {
					self.append(Node::new(NodeData::Comment(text), Some(span)));
				}
				HtmlToken::Doctype { .. } => {}
			}
		}

		let end = source.len();
		while self.stack.len() > 1 {
			self.pop(end, end);
		}
		self.dom.nodes[0].span = Some(0..end);
		self.dom.nodes[0].inner_span = Some(0..end);
		self.dom.source = source;
		self.dom
	}

	fn current(&self) -> NodeId {
		self.stack.last().copied().unwrap_or(0)
	}

	fn current_name(&self) -> Option<&str> {
		self.dom.tag_name(self.current())
	}

	fn append(&mut self, node: Node) -> NodeId {
		let parent = self.current();
		let id = self.dom.push_node(node);
		self.dom.nodes[id].parent = Some(parent);
		self.dom.nodes[parent].children.push(id);
		id
	}

	/// Close the innermost open element.
	fn pop(&mut self, inner_end: usize, outer_end: usize) {
		let Some(id) = self.stack.pop() else {
			return;
		};
		self.flattened.clear();
		let node = &mut self.dom.nodes[id];
		if let Some(span) = node.span.as_mut() {
			span.end = outer_end;
		}
		if let Some(inner) = node.inner_span.as_mut() {
			inner.end = inner_end.max(inner.start);
		}
	}

	/// Close open elements down to and including the one at `index` in the
	/// stack.
	fn close_to(&mut self, index: usize, inner_end: usize, outer_end: usize) {
		while self.stack.len() > index + 1 {
			self.pop(inner_end, inner_end);
		}
		self.pop(inner_end, outer_end);
	}

	/// Stack position of the nearest open element named `name`, stopping at
	/// any element in `boundaries`.
	fn find_open(&self, name: &str, boundaries: &[&str]) -> Option<usize> {
		for (index, id) in self.stack.iter().enumerate().skip(1).rev() {
			let Some(open) = self.dom.tag_name(*id) else {
				continue;
			};
			if open == name {
				return Some(index);
			}
			if boundaries.contains(&open) {
				return None;
			}
		}
		None
	}

	fn close_implied(&mut self, name: &str, at: usize) {
		if CLOSES_PARAGRAPH.contains(&name) {
			if let Some(index) = self.find_open("p", &["button", "td", "th", "li", "blockquote", "div"]) {
				self.close_to(index, at, at);
			}
		}

		let implied = match name {
			"li" => Some((&["li"][..], &["ul", "ol", "menu"][..])),
			"dt" | "dd" => Some((&["dt", "dd"][..], &["dl"][..])),
			"tr" => Some((&["tr"][..], &["table", "tbody", "thead", "tfoot"][..])),
			"td" | "th" => Some((&["td", "th"][..], &["tr", "table"][..])),
			"option" => Some((&["option"][..], &["select", "datalist"][..])),
			_ => None,
		};

		if let Some((names, boundaries)) = implied {
			let found = names
				.iter()
				.filter_map(|open| self.find_open(open, boundaries))
				.max();
			if let Some(index) = found {
				self.close_to(index, at, at);
			}
		}
	}

	fn start_tag(
		&mut self,
		name: String,
		attributes: Vec<HtmlAttribute>,
		self_closing: bool,
		span: Range<usize>,
	) {
		self.close_implied(&name, span.start);

		let is_void = self_closing || is_void_element(&name);
		let inner_start = span.end;
		let mut node = Node::new(
			NodeData::Element(ElementData {
				name: name.clone(),
				attributes,
			}),
			Some(span),
		);
		node.inner_span = Some(inner_start..inner_start);
		let id = self.append(node);

		// The root is not counted towards the depth.
		if is_void {
			return;
		}
		if self.stack.len() <= self.max_depth {
			self.stack.push(id);
		} else {
			self.flattened.push(name);
		}
	}

	fn end_tag(&mut self, name: &str, span: Range<usize>) {
		if self.flattened.last().is_some_and(|open| open == name) {
			self.flattened.pop();
			return;
		}
		if self.current_name() == Some(name) {
			self.pop(span.start, span.end);
			return;
		}
		if let Some(index) = self.find_open(name, &[]) {
			self.close_to(index, span.start, span.end);
		}
	}
}

impl Dom {
	/// Parse an HTML fragment.
	pub fn parse(html: &str) -> Self {
		Self::parse_with_depth(html, DEFAULT_MAX_DEPTH)
	}

	/// Parse an HTML fragment, flattening elements nested deeper than
	/// `max_depth`.
	pub fn parse_with_depth(html: &str, max_depth: usize) -> Self {
		let dom = Dom {
			source: html.to_string(),
			nodes: vec![Node::new(NodeData::Document, None)],
			mutated: false,
		};
		DomBuilder {
			dom,
			stack: vec![0],
			max_depth: max_depth.max(1),
			flattened: vec![],
		}
		.build()
	}

	fn push_node(&mut self, node: Node) -> NodeId {
		self.nodes.push(node);
		self.nodes.len() - 1
	}

	/// The document node every parsed node descends from.
	pub fn root(&self) -> NodeId {
		0
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	pub fn node(&self, id: NodeId) -> &Node {
		&self.nodes[id]
	}

	pub fn children(&self, id: NodeId) -> &[NodeId] {
		&self.nodes[id].children
	}

	pub fn parent(&self, id: NodeId) -> Option<NodeId> {
		self.nodes[id].parent
	}

	pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
		self.children(id)
			.iter()
			.copied()
			.filter(|child| self.nodes[*child].is_element())
			.collect()
	}

	pub fn tag_name(&self, id: NodeId) -> Option<&str> {
		self.nodes[id].element().map(|element| element.name.as_str())
	}

	pub fn is_element_named(&self, id: NodeId, name: &str) -> bool {
		self.tag_name(id) == Some(name)
	}

	pub fn attributes(&self, id: NodeId) -> &[HtmlAttribute] {
		self.nodes[id]
			.element()
			.map(|element| element.attributes.as_slice())
			.unwrap_or_default()
	}

	pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
		self.attributes(id)
			.iter()
			.find(|attribute| attribute.name == name)
			.map(|attribute| attribute.value.as_str())
	}

	pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
		self.attribute(id, name).is_some()
	}

	/// The element's class list in source order.
	pub fn classes(&self, id: NodeId) -> Vec<&str> {
		self.attribute(id, "class")
			.map(|value| value.split_ascii_whitespace().collect())
			.unwrap_or_default()
	}

	pub fn has_class(&self, id: NodeId, class: &str) -> bool {
		self.classes(id).contains(&class)
	}

	/// The first element among the root's children.
	pub fn first_element(&self) -> Option<NodeId> {
		self.element_children(self.root()).first().copied()
	}

	/// All descendants of `id` in document order, excluding `id` itself.
	pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
		let mut result = vec![];
		let mut pending: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
		while let Some(next) = pending.pop() {
			result.push(next);
			pending.extend(self.children(next).iter().rev().copied());
		}
		result
	}

	/// Descendants of `id` in post-order (children before parents),
	/// excluding `id` itself.
	pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
		let mut result = vec![];
		let mut pending: Vec<(NodeId, bool)> =
			self.children(id).iter().rev().map(|child| (*child, false)).collect();
		while let Some((next, visited)) = pending.pop() {
			if visited {
				result.push(next);
				continue;
			}
			pending.push((next, true));
			pending.extend(self.children(next).iter().rev().map(|child| (*child, false)));
		}
		result
	}

	/// Decoded text of `id` and all its descendants.
	pub fn text_content(&self, id: NodeId) -> String {
		if let NodeData::Text(text) = &self.nodes[id].data {
			return text.clone();
		}

		let mut text = String::new();
		for node in self.descendants(id) {
			if let NodeData::Text(value) = &self.nodes[node].data {
				text.push_str(value);
			}
		}
		text
	}

	/// The markup between an element's tags.
	pub fn inner_html(&self, id: NodeId) -> String {
		if !self.mutated {
			if let Some(inner) = &self.nodes[id].inner_span {
				return self.source[inner.clone()].to_string();
			}
		}

		let mut html = String::new();
		for child in self.children(id) {
			self.write_node(*child, &mut html);
		}
		html
	}

	/// The markup of a node including its own tags.
	pub fn outer_html(&self, id: NodeId) -> String {
		if !self.mutated {
			if let Some(span) = &self.nodes[id].span {
				return self.source[span.clone()].to_string();
			}
		}

		let mut html = String::new();
		self.write_node(id, &mut html);
		html
	}

	/// Serialize the whole fragment.
	pub fn to_html(&self) -> String {
		self.inner_html(self.root())
	}

	fn write_node(&self, id: NodeId, html: &mut String) {
		let node = &self.nodes[id];
		match &node.data {
			NodeData::Document => {
				for child in &node.children {
					self.write_node(*child, html);
				}
			}
			NodeData::Text(text) => {
				let raw = node
					.parent
					.and_then(|parent| self.tag_name(parent))
					.is_some_and(|parent| RAW_TEXT_ELEMENTS.contains(&parent));
				if raw {
					html.push_str(text);
				} else {
					html.push_str(&html_escape::encode_text(text));
				}
			}
			NodeData::Comment(text) => {
				html.push_str("<!--");
				html.push_str(text);
				html.push_str("-->");
			}
			NodeData::Element(element) => {
				html.push('<');
				html.push_str(&element.name);
				for attribute in &element.attributes {
					html.push(' ');
					html.push_str(&attribute.name);
					if !attribute.value.is_empty() || attribute.quoted {
						html.push_str("=\"");
						html.push_str(&html_escape::encode_double_quoted_attribute(
							&attribute.value,
						));
						html.push('"');
					}
				}
				html.push('>');

				if is_void_element(&element.name) {
					return;
				}

				for child in &node.children {
					self.write_node(*child, html);
				}
				html.push_str("</");
				html.push_str(&element.name);
				html.push('>');
			}
		}
	}

	/// Create a detached element.
	pub fn create_element(&mut self, name: &str) -> NodeId {
		self.mutated = true;
		self.push_node(Node::new(
			NodeData::Element(ElementData {
				name: name.to_ascii_lowercase(),
				attributes: vec![],
			}),
			None,
		))
	}

	/// Create a detached text node.
	pub fn create_text(&mut self, text: &str) -> NodeId {
		self.mutated = true;
		self.push_node(Node::new(NodeData::Text(text.to_string()), None))
	}

	/// Create a detached comment node.
	pub fn create_comment(&mut self, text: &str) -> NodeId {
		self.mutated = true;
		self.push_node(Node::new(NodeData::Comment(text.to_string()), None))
	}

	/// Detach a node from its parent. The node stays in the arena and can be
	/// reinserted.
	pub fn detach(&mut self, id: NodeId) {
		self.mutated = true;
		if let Some(parent) = self.nodes[id].parent.take() {
			self.nodes[parent].children.retain(|child| *child != id);
		}
	}

	/// Remove a node and its descendants from the tree.
	pub fn remove(&mut self, id: NodeId) {
		self.detach(id);
	}

	/// Append `child` as the last child of `parent`.
	pub fn append(&mut self, parent: NodeId, child: NodeId) {
		self.detach(child);
		self.nodes[child].parent = Some(parent);
		self.nodes[parent].children.push(child);
	}

	/// Insert `node` directly before `reference` in its parent.
	pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
		let Some(parent) = self.nodes[reference].parent else {
			return;
		};
		self.detach(node);
		let index = self.nodes[parent]
			.children
			.iter()
			.position(|child| *child == reference)
			.unwrap_or(self.nodes[parent].children.len());
		self.nodes[parent].children.insert(index, node);
		self.nodes[node].parent = Some(parent);
	}

	/// Replace an element by its children.
	pub fn unwrap(&mut self, id: NodeId) {
		let children = self.nodes[id].children.clone();
		for child in children {
			self.insert_before(id, child);
		}
		self.remove(id);
	}

	/// Wrap a node in a new element named `name`, returning the wrapper.
	pub fn wrap(&mut self, id: NodeId, name: &str) -> NodeId {
		let wrapper = self.create_element(name);
		self.insert_before(id, wrapper);
		self.append(wrapper, id);
		wrapper
	}

	/// Change an element's tag name.
	pub fn rename(&mut self, id: NodeId, name: &str) {
		self.mutated = true;
		if let NodeData::Element(element) = &mut self.nodes[id].data {
			element.name = name.to_ascii_lowercase();
		}
	}

	pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
		self.mutated = true;
		let NodeData::Element(element) = &mut self.nodes[id].data else {
			return;
		};
		if let Some(existing) = element
			.attributes
			.iter_mut()
			.find(|attribute| attribute.name == name)
		{
			existing.value = value.to_string();
			existing.quoted = true;
			return;
		}
		element.attributes.push(HtmlAttribute {
			name: name.to_string(),
			value: value.to_string(),
			quoted: true,
		});
	}

	pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
		self.mutated = true;
		if let NodeData::Element(element) = &mut self.nodes[id].data {
			element.attributes.retain(|attribute| attribute.name != name);
		}
	}

	/// Replace the text of a text node.
	pub fn set_text(&mut self, id: NodeId, text: &str) {
		self.mutated = true;
		if let NodeData::Text(value) = &mut self.nodes[id].data {
			*value = text.to_string();
		}
	}

	/// Whether `id` is still reachable from the root.
	pub fn is_attached(&self, id: NodeId) -> bool {
		let mut current = id;
		while let Some(parent) = self.nodes[current].parent {
			current = parent;
		}
		current == self.root()
	}
}
