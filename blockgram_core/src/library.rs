//! The built-in `core/*` block types.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use serde_json::json;

use crate::Attributes;
use crate::BlockError;
use crate::BlockResult;
use crate::RichText;
use crate::dom::Dom;
use crate::dom::NodeId;
use crate::schema::AttributeSchema;
use crate::schema::AttributeSchemaEntry;
use crate::schema::AttributeSource;
use crate::schema::AttributeType;
use crate::schema::BlockRegistry;
use crate::schema::BlockType;
use crate::schema::CLASS_NAME_ATTRIBUTE;
use crate::schema::DeprecatedVariant;
use crate::schema::RawTransform;
use crate::schema::RenderContext;
use crate::schema::ShortcodeTransform;
use crate::shortcode::Shortcode;
use crate::validation::style_properties;

pub const PARAGRAPH: &str = "core/paragraph";
pub const HEADING: &str = "core/heading";
pub const LIST: &str = "core/list";
pub const QUOTE: &str = "core/quote";
pub const IMAGE: &str = "core/image";
pub const SPACER: &str = "core/spacer";
pub const SEPARATOR: &str = "core/separator";
pub const GROUP: &str = "core/group";
pub const HTML: &str = "core/html";
pub const FREEFORM: &str = "core/freeform";
pub const MISSING: &str = "core/missing";
pub const SHORTCODE: &str = "core/shortcode";
pub const MORE: &str = "core/more";
pub const NEXTPAGE: &str = "core/nextpage";

/// Element the ingestion filters put in place of `<!--more-->` and
/// `<!--nextpage-->` comments. Its `data-block` attribute names the block.
pub const BLOCK_MARKER_TAG: &str = "block-marker";

/// Tag names a group block may render as.
const GROUP_TAGS: [&str; 7] = ["div", "section", "main", "article", "aside", "header", "footer"];

/// Text consisting only of bracket shortcodes.
static SHORTCODE_ONLY: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\s*(\[[^\]]+\]\s*)+$").expect("valid regex"));

static ATTACHMENT_ID: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"attachment_(\d+)").expect("valid regex"));

/// A registry holding every core block type, with `core/freeform`,
/// `core/missing` and `core/html` as its fallbacks.
pub fn core_registry() -> BlockRegistry {
	let mut registry = BlockRegistry::new();
	for block_type in core_block_types() {
		registry.register(block_type);
	}
	registry.set_freeform_name(FREEFORM);
	registry.set_unregistered_name(MISSING);
	registry.set_html_fallback_name(HTML);
	registry
}

pub fn core_block_types() -> Vec<BlockType> {
	vec![
		paragraph(),
		heading(),
		list(),
		quote(),
		image(),
		spacer(),
		separator(),
		group(),
		html(),
		freeform(),
		missing(),
		shortcode(),
		more(),
		nextpage(),
	]
}

fn escape_attribute(value: &str) -> String {
	html_escape::encode_double_quoted_attribute(value).into_owned()
}

/// ` class="…"` for the non-empty classes, or nothing.
fn class_attribute<'a>(classes: impl IntoIterator<Item = &'a str>) -> String {
	let classes: Vec<&str> = classes.into_iter().filter(|class| !class.is_empty()).collect();
	if classes.is_empty() {
		return String::new();
	}
	format!(" class=\"{}\"", escape_attribute(&classes.join(" ")))
}

fn string_attributes(pairs: &[(&str, Value)]) -> Attributes {
	pairs
		.iter()
		.map(|(key, value)| ((*key).to_string(), value.clone()))
		.collect()
}

fn paragraph_schema() -> AttributeSchema {
	AttributeSchema::new()
		.with("align", AttributeSchemaEntry::implicit(AttributeType::String))
		.with("content", AttributeSchemaEntry::rich_text("p"))
		.with(
			"dropCap",
			AttributeSchemaEntry::implicit(AttributeType::Boolean).default_value(false),
		)
}

fn paragraph() -> BlockType {
	BlockType::new(PARAGRAPH, |context| {
		let align = context.str("align").map(|align| format!("has-text-align-{align}"));
		let drop_cap = context.bool("dropCap").then_some("has-drop-cap");
		let class = class_attribute(align.as_deref().into_iter().chain(drop_cap));
		Ok(format!("<p{class}>{}</p>", context.html("content")))
	})
	.with_attributes(paragraph_schema())
	.deprecated(
		// Alignment used to be an inline style.
		DeprecatedVariant::new(paragraph_schema(), |context| {
			let style = context
				.str("align")
				.map(|align| format!(" style=\"text-align:{}\"", escape_attribute(align)))
				.unwrap_or_default();
			let class = class_attribute(context.bool("dropCap").then_some("has-drop-cap"));
			Ok(format!("<p{class}{style}>{}</p>", context.html("content")))
		})
		.eligible_when(|attributes, _| attributes.contains_key("align")),
	)
	.raw_transform(RawTransform::tags(&["p"]).priority(20))
}

fn heading() -> BlockType {
	BlockType::new(HEADING, |context| {
		let level = context.i64("level").unwrap_or(2);
		if !(1..=6).contains(&level) {
			return Err(BlockError::render(
				context.name,
				format!("heading level {level} is outside 1 to 6"),
			));
		}
		let class = class_attribute(
			context
				.str("textAlign")
				.map(|align| format!("has-text-align-{align}"))
				.as_deref(),
		);
		Ok(format!("<h{level}{class}>{}</h{level}>", context.html("content")))
	})
	.attribute("textAlign", AttributeSchemaEntry::implicit(AttributeType::String))
	.attribute("content", AttributeSchemaEntry::rich_text("h1,h2,h3,h4,h5,h6"))
	.attribute(
		"level",
		AttributeSchemaEntry::implicit(AttributeType::Integer).default_value(2),
	)
	.raw_transform(
		RawTransform::tags(&["h1", "h2", "h3", "h4", "h5", "h6"]).transform_with(|dom, id| {
			let level = dom
				.tag_name(id)
				.and_then(|name| name.strip_prefix('h'))
				.and_then(|level| level.parse::<i64>().ok())
				.unwrap_or(2);
			let mut attributes = string_attributes(&[
				("content", RichText::from_dom(dom, id).to_value()),
				("level", json!(level)),
			]);
			if let Some(align) = text_align(dom, id) {
				attributes.insert("textAlign".to_string(), Value::String(align));
			}
			attributes
		}),
	)
}

/// The `text-align` of an element's inline style.
fn text_align(dom: &Dom, id: NodeId) -> Option<String> {
	let style = dom.attribute(id, "style")?;
	style_properties(style)
		.remove("text-align")
		.filter(|align| ["left", "center", "right"].contains(&align.as_str()))
}

fn list() -> BlockType {
	BlockType::new(LIST, |context| {
		let values = context.str("values").unwrap_or_default();
		if !context.bool("ordered") {
			return Ok(format!("<ul>{values}</ul>"));
		}

		let start = context
			.i64("start")
			.map(|start| format!(" start=\"{start}\""))
			.unwrap_or_default();
		let reversed = if context.bool("reversed") { " reversed" } else { "" };
		Ok(format!("<ol{start}{reversed}>{values}</ol>"))
	})
	.attribute(
		"ordered",
		AttributeSchemaEntry::implicit(AttributeType::Boolean).default_value(false),
	)
	.attribute(
		"values",
		AttributeSchemaEntry::new(AttributeSource::InnerHtml {
			multiline: Some("li".to_string()),
		})
		.selector("ol,ul")
		.typed(AttributeType::String)
		.default_value(""),
	)
	.attribute("start", AttributeSchemaEntry::implicit(AttributeType::Integer))
	.attribute("reversed", AttributeSchemaEntry::implicit(AttributeType::Boolean))
	.raw_transform(RawTransform::tags(&["ul", "ol"]).transform_with(|dom, id| {
		let values: String = dom
			.element_children(id)
			.into_iter()
			.filter(|child| dom.is_element_named(*child, "li"))
			.map(|child| dom.outer_html(child))
			.collect();

		let mut attributes = string_attributes(&[("values", Value::String(values))]);
		if dom.is_element_named(id, "ol") {
			attributes.insert("ordered".to_string(), Value::Bool(true));
			if let Some(start) = dom.attribute(id, "start").and_then(|start| start.parse::<i64>().ok()) {
				attributes.insert("start".to_string(), json!(start));
			}
			if dom.has_attribute(id, "reversed") {
				attributes.insert("reversed".to_string(), Value::Bool(true));
			}
		}
		attributes
	}))
}

fn quote_schema() -> AttributeSchema {
	AttributeSchema::new()
		.with(
			"value",
			AttributeSchemaEntry::new(AttributeSource::InnerHtml {
				multiline: Some("p".to_string()),
			})
			.selector("blockquote")
			.typed(AttributeType::String)
			.default_value(""),
		)
		.with("citation", AttributeSchemaEntry::rich_text("cite"))
}

fn citation_html(context: &RenderContext<'_>) -> String {
	let citation = context.html("citation");
	if citation.is_empty() {
		String::new()
	} else {
		format!("<cite>{citation}</cite>")
	}
}

fn quote() -> BlockType {
	BlockType::new(QUOTE, |context| {
		Ok(format!(
			"<blockquote class=\"wp-block-quote\">{}{}</blockquote>",
			context.str("value").unwrap_or_default(),
			citation_html(context)
		))
	})
	.with_attributes(quote_schema())
	.deprecated(
		// Quotes once carried a numbered style class.
		DeprecatedVariant::new(
			quote_schema().with(
				"style",
				AttributeSchemaEntry::implicit(AttributeType::Integer).default_value(1),
			),
			|context| {
				Ok(format!(
					"<blockquote class=\"blocks-quote-style-{}\">{}{}</blockquote>",
					context.i64("style").unwrap_or(1),
					context.str("value").unwrap_or_default(),
					citation_html(context)
				))
			},
		)
		.migrate_with(|mut attributes, inner_blocks| {
			let style = attributes.remove("style").and_then(|style| style.as_i64());
			if style == Some(2) {
				let class_name = match attributes.get(CLASS_NAME_ATTRIBUTE).and_then(Value::as_str) {
					Some(existing) if !existing.is_empty() => format!("{existing} is-style-large"),
					_ => "is-style-large".to_string(),
				};
				attributes.insert(CLASS_NAME_ATTRIBUTE.to_string(), Value::String(class_name));
			}
			(attributes, inner_blocks)
		}),
	)
	.raw_transform(RawTransform::tags(&["blockquote"]).transform_with(|dom, id| {
		let value: String = dom
			.element_children(id)
			.into_iter()
			.filter(|child| dom.is_element_named(*child, "p"))
			.map(|child| dom.outer_html(child))
			.collect();
		let citation = dom
			.element_children(id)
			.into_iter()
			.find(|child| dom.is_element_named(*child, "cite"))
			.map(|cite| RichText::from_dom(dom, cite))
			.unwrap_or_default();

		string_attributes(&[
			("value", Value::String(value)),
			("citation", citation.to_value()),
		])
	}))
}

fn image_schema() -> AttributeSchema {
	AttributeSchema::new()
		.with("url", AttributeSchemaEntry::html_attribute("img", "src"))
		.with(
			"alt",
			AttributeSchemaEntry::html_attribute("img", "alt").default_value(""),
		)
		.with("caption", AttributeSchemaEntry::rich_text("figcaption"))
		.with("href", AttributeSchemaEntry::html_attribute("figure > a", "href"))
		.with("id", AttributeSchemaEntry::implicit(AttributeType::Integer))
		.with("align", AttributeSchemaEntry::implicit(AttributeType::String))
		.with("width", AttributeSchemaEntry::implicit(AttributeType::Integer))
		.with("height", AttributeSchemaEntry::implicit(AttributeType::Integer))
}

/// The `<img>` of an image block, wrapped in its link when it has one.
fn image_element(context: &RenderContext<'_>) -> String {
	let mut image = format!(
		"<img src=\"{}\" alt=\"{}\"",
		escape_attribute(context.str("url").unwrap_or_default()),
		escape_attribute(context.str("alt").unwrap_or_default()),
	);
	if let Some(id) = context.i64("id") {
		image.push_str(&format!(" class=\"wp-image-{id}\""));
	}
	for dimension in ["width", "height"] {
		if let Some(value) = context.i64(dimension) {
			image.push_str(&format!(" {dimension}=\"{value}\""));
		}
	}
	image.push_str("/>");

	match context.str("href") {
		Some(href) => format!("<a href=\"{}\">{image}</a>", escape_attribute(href)),
		None => image,
	}
}

fn image_figure(context: &RenderContext<'_>, caption_class: &str) -> String {
	let align = context.str("align").map(|align| format!("align{align}"));
	let class = class_attribute(["wp-block-image", align.as_deref().unwrap_or_default()]);

	let caption = context.html("caption");
	let caption = if caption.is_empty() {
		String::new()
	} else {
		format!("<figcaption{}>{caption}</figcaption>", class_attribute([caption_class]))
	};

	format!("<figure{class}>{}{caption}</figure>", image_element(context))
}

fn image() -> BlockType {
	BlockType::new(IMAGE, |context| {
		Ok(image_figure(context, "wp-element-caption"))
	})
	.with_attributes(image_schema())
	.deprecated(DeprecatedVariant::new(image_schema(), |context| {
		Ok(image_figure(context, ""))
	}))
	.raw_transform(
		RawTransform::new(|dom, id| {
			dom.is_element_named(id, "img")
				|| (dom.is_element_named(id, "figure") && find_image(dom, id).is_some())
		})
		.transform_with(image_from_dom),
	)
	.shortcode_transform(ShortcodeTransform::new(&["caption"], image_from_caption))
}

fn find_image(dom: &Dom, id: NodeId) -> Option<NodeId> {
	if dom.is_element_named(id, "img") {
		return Some(id);
	}
	dom.descendants(id)
		.into_iter()
		.find(|node| dom.is_element_named(*node, "img"))
}

fn image_from_dom(dom: &Dom, id: NodeId) -> Attributes {
	let mut attributes = Attributes::new();
	let Some(image) = find_image(dom, id) else {
		return attributes;
	};

	if let Some(src) = dom.attribute(image, "src") {
		attributes.insert("url".to_string(), Value::String(src.to_string()));
	}
	attributes.insert(
		"alt".to_string(),
		Value::String(dom.attribute(image, "alt").unwrap_or_default().to_string()),
	);
	for dimension in ["width", "height"] {
		if let Some(value) = dom.attribute(image, dimension).and_then(|value| value.parse::<i64>().ok()) {
			attributes.insert(dimension.to_string(), json!(value));
		}
	}
	if let Some(href) = dom
		.parent(image)
		.filter(|parent| dom.is_element_named(*parent, "a"))
		.and_then(|link| dom.attribute(link, "href"))
	{
		attributes.insert("href".to_string(), Value::String(href.to_string()));
	}
	if let Some(caption) = dom
		.descendants(id)
		.into_iter()
		.find(|node| dom.is_element_named(*node, "figcaption"))
	{
		attributes.insert("caption".to_string(), RichText::from_dom(dom, caption).to_value());
	}

	attributes
}

/// `[caption id="attachment_5" align="alignleft"]<img …/> Text[/caption]`
fn image_from_caption(shortcode: &Shortcode) -> Attributes {
	let content = shortcode.content.as_deref().unwrap_or_default();
	let dom = Dom::parse(content);
	let mut attributes = image_from_dom(&dom, dom.root());

	// The caption is the markup after the image or its link.
	let caption_start = dom
		.children(dom.root())
		.iter()
		.position(|child| dom.is_element_named(*child, "img") || dom.is_element_named(*child, "a"))
		.map_or(0, |index| index + 1);
	let caption: String = dom.children(dom.root())[caption_start..]
		.iter()
		.map(|child| dom.outer_html(*child))
		.collect();
	let caption = shortcode
		.attribute("caption")
		.map_or_else(|| caption.trim().to_string(), ToString::to_string);
	attributes.insert("caption".to_string(), RichText::from_html(&caption).to_value());

	if let Some(id) = shortcode
		.attribute("id")
		.and_then(|id| ATTACHMENT_ID.captures(id))
		.and_then(|captures| captures.get(1))
		.and_then(|id| id.as_str().parse::<i64>().ok())
	{
		attributes.insert("id".to_string(), json!(id));
	}
	if let Some(align) = shortcode
		.attribute("align")
		.map(|align| align.trim_start_matches("align"))
		.filter(|align| !align.is_empty() && *align != "none")
	{
		attributes.insert("align".to_string(), Value::String(align.to_string()));
	}

	attributes
}

/// Renders nothing; the height lives in the delimiter.
fn spacer() -> BlockType {
	BlockType::new(SPACER, |_| Ok(String::new()))
		.attribute(
			"height",
			AttributeSchemaEntry::implicit(AttributeType::Integer).default_value(100),
		)
		.without_custom_class_name()
}

fn separator() -> BlockType {
	BlockType::new(SEPARATOR, |_| {
		Ok("<hr class=\"wp-block-separator\"/>".to_string())
	})
	.raw_transform(RawTransform::tags(&["hr"]))
}

fn group() -> BlockType {
	BlockType::new(GROUP, |context| {
		let tag = context.str("tagName").unwrap_or("div");
		if !GROUP_TAGS.contains(&tag) {
			return Err(BlockError::render(
				context.name,
				format!("`{tag}` is not an allowed group element"),
			));
		}
		Ok(format!(
			"<{tag} class=\"wp-block-group\">{}</{tag}>",
			context.inner_content
		))
	})
	.attribute(
		"tagName",
		AttributeSchemaEntry::implicit(AttributeType::String).default_value("div"),
	)
}

fn raw_content() -> AttributeSchemaEntry {
	AttributeSchemaEntry::new(AttributeSource::RawHtml { multiline: None })
		.typed(AttributeType::String)
		.default_value("")
}

fn verbatim(key: &'static str) -> impl Fn(&RenderContext<'_>) -> BlockResult<String> {
	move |context| Ok(context.str(key).unwrap_or_default().to_string())
}

fn html() -> BlockType {
	BlockType::new(HTML, verbatim("content"))
		.attribute("content", raw_content())
		.without_custom_class_name()
}

fn freeform() -> BlockType {
	BlockType::new(FREEFORM, verbatim("content"))
		.attribute("content", raw_content())
		.without_custom_class_name()
}

/// Stands in for a block whose type is not registered.
fn missing() -> BlockType {
	BlockType::new(MISSING, verbatim("originalContent"))
		.attribute("originalName", AttributeSchemaEntry::implicit(AttributeType::String))
		.attribute(
			"originalUndelimitedContent",
			AttributeSchemaEntry::implicit(AttributeType::String),
		)
		.attribute("originalContent", raw_content())
		.without_custom_class_name()
}

fn shortcode() -> BlockType {
	BlockType::new(SHORTCODE, verbatim("text"))
		.attribute("text", raw_content())
		.without_custom_class_name()
		.raw_transform(RawTransform::new(|dom, id| {
			dom.is_element_named(id, "p") && SHORTCODE_ONLY.is_match(&dom.text_content(id))
		})
		.transform_with(|dom, id| {
			string_attributes(&[("text", Value::String(dom.text_content(id).trim().to_string()))])
		}))
}

fn is_block_marker(dom: &Dom, id: NodeId, name: &str) -> bool {
	dom.is_element_named(id, BLOCK_MARKER_TAG) && dom.attribute(id, "data-block") == Some(name)
}

fn more() -> BlockType {
	BlockType::new(MORE, |context| {
		let text = context
			.str("customText")
			.map(|text| format!(" {text}"))
			.unwrap_or_default();
		let no_teaser = if context.bool("noTeaser") {
			"\n<!--noteaser-->"
		} else {
			""
		};
		Ok(format!("<!--more{text}-->{no_teaser}"))
	})
	.attribute("customText", AttributeSchemaEntry::implicit(AttributeType::String))
	.attribute(
		"noTeaser",
		AttributeSchemaEntry::implicit(AttributeType::Boolean).default_value(false),
	)
	.without_custom_class_name()
	.raw_transform(
		RawTransform::new(|dom, id| is_block_marker(dom, id, MORE)).transform_with(|dom, id| {
			let mut attributes = Attributes::new();
			if let Some(text) = dom.attribute(id, "data-custom-text").filter(|text| !text.is_empty()) {
				attributes.insert("customText".to_string(), Value::String(text.to_string()));
			}
			if dom.has_attribute(id, "data-no-teaser") {
				attributes.insert("noTeaser".to_string(), Value::Bool(true));
			}
			attributes
		}),
	)
}

fn nextpage() -> BlockType {
	BlockType::new(NEXTPAGE, |_| Ok("<!--nextpage-->".to_string()))
		.without_custom_class_name()
		.raw_transform(
			RawTransform::new(|dom, id| is_block_marker(dom, id, NEXTPAGE))
				.transform_with(|_, _| Attributes::new()),
		)
}
