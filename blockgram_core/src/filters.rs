//! DOM filters applied to pasted or imported markup before it is turned into
//! blocks.
//!
//! Filters are plain functions over a single node. [`deep_filter`] runs a
//! chain of them bottom-up so every node's children are already filtered
//! when the node itself is visited.

use std::sync::LazyLock;

use regex::Regex;

use crate::dom::Dom;
use crate::dom::NodeData;
use crate::dom::NodeId;
use crate::dom::is_void_element;
use crate::html_tokenizer::is_html_whitespace;
use crate::library::BLOCK_MARKER_TAG;
use crate::library::MORE;
use crate::library::NEXTPAGE;
use crate::validation::style_properties;

/// A filter over one node. It may mutate or remove the node.
pub type NodeFilter = fn(&mut Dom, NodeId);

/// Elements dropped together with their content.
const REMOVED_ELEMENTS: [&str; 16] = [
	"head", "meta", "link", "title", "script", "style", "noscript", "template", "iframe", "object",
	"embed", "form", "input", "button", "select", "textarea",
];

/// Inline elements that may appear inside a paragraph.
pub const PHRASING_ELEMENTS: [&str; 25] = [
	"a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "data", "del", "dfn", "em", "i", "img",
	"ins", "kbd", "mark", "q", "s", "samp", "small", "strong", "sub", "sup", "u",
];

/// Block-level elements kept by [`strip_disallowed`]. Anything not listed
/// here or in [`PHRASING_ELEMENTS`] is unwrapped.
const BLOCK_ELEMENTS: [&str; 22] = [
	"p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "blockquote", "figure",
	"figcaption", "hr", "pre", "table", "thead", "tbody", "tfoot", "tr", "td", "th",
];

/// Attributes kept per element. Every other attribute is removed.
const ALLOWED_ATTRIBUTES: [(&str, &[&str]); 13] = [
	("a", &["href", "title", "target", "rel", "id"]),
	("h1", &["style", "id"]),
	("h2", &["style", "id"]),
	("h3", &["style", "id"]),
	("h4", &["style", "id"]),
	("h5", &["style", "id"]),
	("h6", &["style", "id"]),
	("img", &["src", "alt", "title", "width", "height", "class"]),
	("ol", &["start", "reversed", "type"]),
	("td", &["colspan", "rowspan"]),
	("th", &["colspan", "rowspan", "scope"]),
	("figure", &["class"]),
	(BLOCK_MARKER_TAG, &["data-block", "data-custom-text", "data-no-teaser"]),
];

/// Characters office suites and hand-written text use as list bullets.
const BULLETS: [char; 5] = ['•', '◦', '▪', '·', '‣'];

static MSO_LIST_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)mso-list:\s*l\d+\s+level(\d+)").expect("valid regex")
});

/// Conversion filters, in the order they are applied to each node.
pub const CONVERSION_FILTERS: [NodeFilter; 9] = [
	unwrap_google_docs_wrapper,
	convert_ms_list,
	convert_bullet_paragraph,
	reduce_list,
	normalize_phrasing,
	convert_special_comment,
	remove_comment,
	normalize_link,
	wrap_figure_content,
];

/// Apply `filters` to every descendant of the root, children before
/// parents. Nodes removed by an earlier filter are skipped.
pub fn deep_filter(dom: &mut Dom, filters: &[NodeFilter]) {
	for id in dom.post_order(dom.root()) {
		for filter in filters {
			if !dom.is_attached(id) {
				break;
			}
			filter(dom, id);
		}
	}
}

/// Run the conversion filters, then strip disallowed markup.
pub fn filter_html(dom: &mut Dom) {
	deep_filter(dom, &CONVERSION_FILTERS);
	deep_filter(dom, &[strip_disallowed]);
}

/// Run the filters that keep phrasing content only.
pub fn filter_inline_html(dom: &mut Dom) {
	deep_filter(dom, &[unwrap_google_docs_wrapper, normalize_phrasing, remove_comment]);
	deep_filter(dom, &[strip_non_phrasing]);
}

pub fn is_phrasing_element(name: &str) -> bool {
	PHRASING_ELEMENTS.contains(&name)
}

fn is_list(dom: &Dom, id: NodeId) -> bool {
	dom.is_element_named(id, "ul") || dom.is_element_named(id, "ol")
}

fn previous_element_sibling(dom: &Dom, id: NodeId) -> Option<NodeId> {
	let parent = dom.parent(id)?;
	let siblings = dom.children(parent);
	let index = siblings.iter().position(|sibling| *sibling == id)?;
	siblings[..index]
		.iter()
		.rev()
		.copied()
		.find(|sibling| dom.node(*sibling).is_element())
}

fn next_siblings(dom: &Dom, id: NodeId) -> Vec<NodeId> {
	let Some(parent) = dom.parent(id) else {
		return vec![];
	};
	let siblings = dom.children(parent);
	siblings
		.iter()
		.position(|sibling| *sibling == id)
		.map(|index| siblings[index + 1..].to_vec())
		.unwrap_or_default()
}

/// Text held directly by `id`, ignoring descendants.
fn shallow_text(dom: &Dom, id: NodeId) -> String {
	dom.children(id)
		.iter()
		.filter_map(|child| match &dom.node(*child).data {
			NodeData::Text(text) => Some(text.as_str()),
			_ => None,
		})
		.collect()
}

fn is_blank(text: &str) -> bool {
	text.chars().all(|ch| is_html_whitespace(ch) || ch == '\u{a0}')
}

/// Whether a node holds no text and no embedded content.
pub fn is_empty_node(dom: &Dom, id: NodeId) -> bool {
	match &dom.node(id).data {
		NodeData::Text(text) => is_blank(text),
		NodeData::Comment(_) => true,
		NodeData::Document => dom.children(id).iter().all(|child| is_empty_node(dom, *child)),
		NodeData::Element(element) => {
			if element.name == "br" {
				return true;
			}
			if is_void_element(&element.name) {
				return false;
			}
			dom.children(id).iter().all(|child| is_empty_node(dom, *child))
		}
	}
}

/// Google Docs wraps copied content in `<b id="docs-internal-guid-…">`.
pub fn unwrap_google_docs_wrapper(dom: &mut Dom, id: NodeId) {
	let is_wrapper = dom
		.attribute(id, "id")
		.is_some_and(|value| value.starts_with("docs-internal-guid-"));
	if is_wrapper {
		dom.unwrap(id);
	}
}

fn mso_list_level(dom: &Dom, id: NodeId) -> Option<usize> {
	if !dom.is_element_named(id, "p") {
		return None;
	}
	let style = dom.attribute(id, "style")?;
	if !style.contains("mso-list") {
		return None;
	}
	Some(
		MSO_LIST_LEVEL
			.captures(style)
			.and_then(|captures| captures.get(1))
			.and_then(|level| level.as_str().parse().ok())
			.unwrap_or(1),
	)
}

/// Turn MS Office list paragraphs (`<p style="mso-list:l0 level1 lfo1">`)
/// into real lists, nesting by their level.
pub fn convert_ms_list(dom: &mut Dom, id: NodeId) {
	let Some(level) = mso_list_level(dom, id) else {
		return;
	};

	// The leading span holds the rendered bullet or number.
	let marker = dom.children(id).iter().copied().find(|child| {
		dom.node(*child).is_element()
			|| matches!(&dom.node(*child).data, NodeData::Text(text) if !is_blank(text))
	});
	let marker_text = marker.map(|marker| dom.text_content(marker)).unwrap_or_default();
	let is_numbered = marker_text
		.trim()
		.chars()
		.next()
		.is_some_and(|first| first.is_ascii_alphanumeric());

	let list = match previous_element_sibling(dom, id).filter(|previous| is_list(dom, *previous)) {
		Some(list) => list,
		None => {
			let list = dom.create_element(if is_numbered { "ol" } else { "ul" });
			dom.insert_before(id, list);
			list
		}
	};
	let list_tag = dom.tag_name(list).unwrap_or("ul").to_string();

	if let Some(marker) = marker.filter(|marker| dom.node(*marker).is_element()) {
		dom.remove(marker);
	}
	let item = dom.create_element("li");
	for child in dom.children(id).to_vec() {
		if !matches!(dom.node(child).data, NodeData::Comment(_)) {
			dom.append(item, child);
		}
	}

	// Walk down to the list for this level.
	let mut receiving = list;
	for _ in 1..level {
		let Some(last_item) = dom.element_children(receiving).last().copied() else {
			break;
		};
		receiving = match dom.element_children(last_item).last().copied() {
			Some(nested) if is_list(dom, nested) => nested,
			_ => {
				let nested = dom.create_element(&list_tag);
				dom.append(last_item, nested);
				nested
			}
		};
	}

	dom.append(receiving, item);
	dom.remove(id);
}

/// Turn paragraphs starting with a bullet character into list items.
pub fn convert_bullet_paragraph(dom: &mut Dom, id: NodeId) {
	if !dom.is_element_named(id, "p") {
		return;
	}
	let Some(first) = dom.children(id).first().copied() else {
		return;
	};
	let NodeData::Text(text) = &dom.node(first).data else {
		return;
	};
	let trimmed = text.trim_start();
	let Some(rest) = trimmed.strip_prefix(BULLETS) else {
		return;
	};
	if !rest.starts_with(char::is_whitespace) {
		return;
	}
	let rest = rest.trim_start().to_string();

	let list = match previous_element_sibling(dom, id).filter(|previous| dom.is_element_named(*previous, "ul")) {
		Some(list) => list,
		None => {
			let list = dom.create_element("ul");
			dom.insert_before(id, list);
			list
		}
	};

	dom.set_text(first, &rest);
	dom.rename(id, "li");
	dom.append(list, id);
}

/// Repair list structure: merge a single-item list into a preceding list of
/// the same kind, hoist lists out of otherwise empty items and move lists
/// nested directly in a list into the previous item.
pub fn reduce_list(dom: &mut Dom, id: NodeId) {
	if !is_list(dom, id) {
		return;
	}

	if let Some(previous) = previous_element_sibling(dom, id) {
		let same_kind = dom.tag_name(previous) == dom.tag_name(id);
		if same_kind && dom.element_children(id).len() == 1 {
			for child in dom.children(id).to_vec() {
				dom.append(previous, child);
			}
			dom.remove(id);
			return;
		}
	}

	let Some(parent) = dom.parent(id) else {
		return;
	};

	// A nested list whose item holds nothing else.
	if dom.is_element_named(parent, "li")
		&& dom.element_children(parent).len() == 1
		&& is_blank(&shallow_text(dom, parent))
	{
		match previous_element_sibling(dom, parent) {
			Some(previous_item) => {
				dom.append(previous_item, id);
				dom.remove(parent);
			}
			None => {
				if let Some(parent_list) = dom.parent(parent) {
					dom.insert_before(parent_list, id);
					dom.remove(parent_list);
				}
			}
		}
		return;
	}

	// A list directly inside a list.
	if is_list(dom, parent) {
		match previous_element_sibling(dom, id) {
			Some(previous_item) => dom.append(previous_item, id),
			None => {
				dom.wrap(id, "li");
			}
		}
	}
}

/// `b` becomes `strong`, `i` becomes `em` and styled spans are wrapped in
/// the matching semantic elements.
pub fn normalize_phrasing(dom: &mut Dom, id: NodeId) {
	let name = dom.tag_name(id).map(str::to_string);
	match name.as_deref() {
		Some("b") => dom.rename(id, "strong"),
		Some("i") => dom.rename(id, "em"),
		Some("span") => {
			let Some(style) = dom.attribute(id, "style") else {
				return;
			};
			let properties = style_properties(style);
			let property = |name: &str| properties.get(name).map(String::as_str).unwrap_or_default();

			let mut wrappers = vec![];
			if matches!(property("font-weight"), "bold" | "700") {
				wrappers.push("strong");
			}
			if property("font-style") == "italic" {
				wrappers.push("em");
			}
			if property("text-decoration-line") == "line-through"
				|| property("text-decoration").contains("line-through")
			{
				wrappers.push("s");
			}
			match property("vertical-align") {
				"super" => wrappers.push("sup"),
				"sub" => wrappers.push("sub"),
				_ => {}
			}

			for wrapper in wrappers {
				dom.wrap(id, wrapper);
			}
		}
		_ => {}
	}
}

/// Links opening a new window get `rel="noreferrer noopener"`; other links
/// lose `target` and `rel`.
pub fn normalize_link(dom: &mut Dom, id: NodeId) {
	if !dom.is_element_named(id, "a") {
		return;
	}
	let opens_window = dom
		.attribute(id, "target")
		.is_some_and(|target| target.eq_ignore_ascii_case("_blank"));
	if opens_window {
		dom.set_attribute(id, "rel", "noreferrer noopener");
	} else {
		dom.remove_attribute(id, "target");
		dom.remove_attribute(id, "rel");
	}
	if dom.attribute(id, "id").is_none() {
		if let Some(name) = dom.attribute(id, "name").map(str::to_string) {
			dom.set_attribute(id, "id", &name);
		}
	}
}

fn block_marker(dom: &mut Dom, block: &str) -> NodeId {
	let marker = dom.create_element(BLOCK_MARKER_TAG);
	dom.set_attribute(marker, "data-block", block);
	marker
}

/// Replace `<!--more-->` and `<!--nextpage-->` with block markers. A marker
/// inside a paragraph splits the paragraph around it.
pub fn convert_special_comment(dom: &mut Dom, id: NodeId) {
	let NodeData::Comment(text) = &dom.node(id).data else {
		return;
	};
	let text = text.trim().to_string();

	let marker = if text == "nextpage" {
		block_marker(dom, NEXTPAGE)
	} else if let Some(custom_text) = text.strip_prefix("more") {
		let marker = block_marker(dom, MORE);
		let custom_text = custom_text.trim();
		if !custom_text.is_empty() {
			dom.set_attribute(marker, "data-custom-text", custom_text);
		}
		let no_teaser = next_siblings(dom, id).into_iter().find(|sibling| {
			matches!(&dom.node(*sibling).data, NodeData::Comment(comment) if comment.trim() == "noteaser")
		});
		if let Some(no_teaser) = no_teaser {
			dom.set_attribute(marker, "data-no-teaser", "");
			dom.remove(no_teaser);
		}
		marker
	} else {
		return;
	};

	let Some(parent) = dom.parent(id).filter(|parent| dom.is_element_named(*parent, "p")) else {
		dom.insert_before(id, marker);
		dom.remove(id);
		return;
	};

	let siblings = dom.children(parent).to_vec();
	let index = siblings.iter().position(|sibling| *sibling == id).unwrap_or_default();
	paragraph_before(dom, parent, &siblings[..index]);
	dom.insert_before(parent, marker);
	paragraph_before(dom, parent, &siblings[index + 1..]);
	dom.remove(parent);
}

/// Move `run` into a new paragraph placed before `reference`.
fn paragraph_before(dom: &mut Dom, reference: NodeId, run: &[NodeId]) {
	if run.is_empty() {
		return;
	}
	let paragraph = dom.create_element("p");
	dom.insert_before(reference, paragraph);
	for child in run {
		dom.append(paragraph, *child);
	}
}

pub fn remove_comment(dom: &mut Dom, id: NodeId) {
	if matches!(dom.node(id).data, NodeData::Comment(_)) {
		dom.remove(id);
	}
}

/// Wrap a lone image, or a link holding only an image, in a `figure`.
/// Images inside text are left alone unless they are aligned.
pub fn wrap_figure_content(dom: &mut Dom, id: NodeId) {
	if !dom.is_element_named(id, "img") {
		return;
	}
	let mut target = id;
	if let Some(link) = dom
		.parent(id)
		.filter(|parent| dom.is_element_named(*parent, "a") && dom.children(*parent).len() == 1)
	{
		target = link;
	}

	let Some(parent) = dom.parent(target) else {
		return;
	};
	if dom.is_element_named(parent, "figure") {
		return;
	}

	let mut wrapper = Some(parent);
	while let Some(ancestor) = wrapper {
		if dom.is_element_named(ancestor, "p") || dom.is_element_named(ancestor, "div") {
			break;
		}
		wrapper = dom.parent(ancestor);
	}

	match wrapper {
		Some(wrapper) => {
			let aligned = dom
				.classes(id)
				.iter()
				.any(|class| matches!(*class, "alignleft" | "alignright" | "aligncenter"));
			if aligned || is_blank(&dom.text_content(wrapper)) {
				dom.wrap(target, "figure");
			}
		}
		None if parent == dom.root() => {
			dom.wrap(target, "figure");
		}
		None => {}
	}
}

fn strip_attributes(dom: &mut Dom, id: NodeId) {
	let Some(name) = dom.tag_name(id) else {
		return;
	};
	let allowed: &[&str] = ALLOWED_ATTRIBUTES
		.iter()
		.find(|(element, _)| *element == name)
		.map(|(_, attributes)| *attributes)
		.unwrap_or_default();
	let removed: Vec<String> = dom
		.attributes(id)
		.iter()
		.filter(|attribute| !allowed.contains(&attribute.name.as_str()))
		.map(|attribute| attribute.name.clone())
		.collect();
	for attribute in removed {
		dom.remove_attribute(id, &attribute);
	}
}

/// Drop scripts, styles and similar elements, unwrap elements outside the
/// allowed set and remove attributes outside the per-element allowlist.
pub fn strip_disallowed(dom: &mut Dom, id: NodeId) {
	strip_elements(dom, id, |name| {
		is_phrasing_element(name) || BLOCK_ELEMENTS.contains(&name) || name == BLOCK_MARKER_TAG
	});
}

/// [`strip_disallowed`] keeping only phrasing elements.
pub fn strip_non_phrasing(dom: &mut Dom, id: NodeId) {
	strip_elements(dom, id, is_phrasing_element);
}

fn strip_elements(dom: &mut Dom, id: NodeId, is_allowed: impl Fn(&str) -> bool) {
	let name = match &dom.node(id).data {
		NodeData::Comment(_) => {
			dom.remove(id);
			return;
		}
		NodeData::Element(element) => element.name.clone(),
		NodeData::Text(_) | NodeData::Document => return,
	};

	if REMOVED_ELEMENTS.contains(&name.as_str()) {
		dom.remove(id);
	} else if is_allowed(&name) {
		strip_attributes(dom, id);
	} else {
		dom.unwrap(id);
	}
}

fn open_paragraph(dom: &mut Dom, parent: NodeId, last: &mut Option<NodeId>) -> NodeId {
	if let Some(paragraph) = last.filter(|last| dom.is_element_named(*last, "p")) {
		return paragraph;
	}
	let paragraph = dom.create_element("p");
	dom.append(parent, paragraph);
	*last = Some(paragraph);
	paragraph
}

/// Re-flow the children of `parent` into block-level content.
///
/// Loose text and phrasing elements are gathered into paragraphs, joining
/// the preceding paragraph when there is one. Two consecutive `<br>`
/// elements start a new paragraph. Empty paragraphs and comments are
/// dropped.
pub fn normalize_blocks(dom: &mut Dom, parent: NodeId) {
	let children = dom.children(parent).to_vec();
	for child in &children {
		dom.detach(*child);
	}

	let mut last: Option<NodeId> = None;
	let mut pending = children.into_iter().peekable();
	while let Some(child) = pending.next() {
		match &dom.node(child).data {
			NodeData::Text(text) => {
				if is_blank(text) {
					continue;
				}
				let paragraph = open_paragraph(dom, parent, &mut last);
				dom.append(paragraph, child);
			}
			NodeData::Element(element) => {
				let name = element.name.clone();
				if name == "br" {
					if pending.peek().is_some_and(|next| dom.is_element_named(*next, "br")) {
						pending.next();
						let paragraph = dom.create_element("p");
						dom.append(parent, paragraph);
						last = Some(paragraph);
						continue;
					}
					if let Some(paragraph) = last.filter(|last| {
						dom.is_element_named(*last, "p") && !dom.children(*last).is_empty()
					}) {
						dom.append(paragraph, child);
					}
				} else if name == "p" {
					if !is_empty_node(dom, child) {
						dom.append(parent, child);
						last = Some(child);
					}
				} else if is_phrasing_element(&name) {
					let paragraph = open_paragraph(dom, parent, &mut last);
					dom.append(paragraph, child);
				} else {
					dom.append(parent, child);
					last = Some(child);
				}
			}
			NodeData::Comment(_) | NodeData::Document => {}
		}
	}

	for child in dom.children(parent).to_vec() {
		if dom.is_element_named(child, "p") && is_empty_node(dom, child) {
			dom.remove(child);
		}
	}
}
