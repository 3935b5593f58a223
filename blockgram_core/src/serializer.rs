use float_cmp::approx_eq;
use serde_json::Value;
use tracing::debug;

use crate::Attributes;
use crate::BlockResult;
use crate::ParseOptions;
use crate::ParsedBlock;
use crate::RawBlockNode;
use crate::config::DEFAULT_NAMESPACE;
use crate::html_tokenizer::HtmlToken;
use crate::html_tokenizer::tokenize_html;
use crate::schema::AttributeRole;
use crate::schema::AttributeSchema;
use crate::schema::BlockType;
use crate::schema::BlockTypeRegistry;
use crate::schema::CLASS_NAME_ATTRIBUTE;
use crate::schema::RenderContext;
use crate::schema::RenderFn;

/// Serialize top-level blocks, separated by a blank line.
pub fn serialize(blocks: &[ParsedBlock], registry: &dyn BlockTypeRegistry) -> String {
	serialize_with(blocks, registry, &ParseOptions::default())
}

/// [`serialize`] for documents parsed with `options`. Names in
/// `options.default_namespace` are written without their namespace so the
/// output parses back to the same names.
pub fn serialize_with(
	blocks: &[ParsedBlock],
	registry: &dyn BlockTypeRegistry,
	options: &ParseOptions,
) -> String {
	blocks
		.iter()
		.map(|block| serialize_block_inner(block, registry, &options.default_namespace, false))
		.collect::<Vec<_>>()
		.join("\n\n")
}

/// Serialize one top-level block.
pub fn serialize_block(block: &ParsedBlock, registry: &dyn BlockTypeRegistry) -> String {
	serialize_block_with(block, registry, &ParseOptions::default())
}

/// [`serialize_block`] for documents parsed with `options`.
pub fn serialize_block_with(
	block: &ParsedBlock,
	registry: &dyn BlockTypeRegistry,
	options: &ParseOptions,
) -> String {
	serialize_block_inner(block, registry, &options.default_namespace, false)
}

fn serialize_block_inner(
	block: &ParsedBlock,
	registry: &dyn BlockTypeRegistry,
	default_namespace: &str,
	is_inner: bool,
) -> String {
	if !block.is_valid {
		if let Some(raw) = &block.raw_source {
			return serialize_raw_block_with(raw, default_namespace);
		}
	}

	let content = block_inner_html(block, registry, default_namespace);

	let is_freeform = registry.freeform_name() == Some(block.name.as_str());
	let is_unregistered = registry.unregistered_name() == Some(block.name.as_str());
	if is_unregistered || (is_freeform && !is_inner) {
		return content;
	}

	let Some(block_type) = registry.lookup(&block.name) else {
		return content;
	};

	let comment_attributes = get_comment_attributes(&block_type.schema(), &block.attributes);
	get_comment_delimited_content_with(
		&block.name,
		&comment_attributes,
		&content,
		default_namespace,
	)
}

/// The saved markup of a block: its render output when valid, its original
/// content otherwise.
fn block_inner_html(
	block: &ParsedBlock,
	registry: &dyn BlockTypeRegistry,
	default_namespace: &str,
) -> String {
	if !block.is_valid {
		return block.original_content.clone();
	}
	let Some(block_type) = registry.lookup(&block.name) else {
		return block.original_content.clone();
	};

	let inner = block
		.inner_blocks
		.iter()
		.map(|inner| serialize_block_inner(inner, registry, default_namespace, true))
		.collect::<Vec<_>>()
		.join("\n");

	match get_save_content(&block_type, &block.attributes, &inner) {
		Ok(content) => content,
		Err(error) => {
			debug!(name = %block.name, %error, "render failed, keeping original content");
			block.original_content.clone()
		}
	}
}

/// Render a block type's markup for the given attributes and serialized
/// inner blocks.
pub fn get_save_content(
	block_type: &BlockType,
	attributes: &Attributes,
	inner_content: &str,
) -> BlockResult<String> {
	render_with(
		&block_type.render,
		&block_type.name,
		block_type.supports_custom_class_name,
		attributes,
		inner_content,
	)
}

/// Render through an arbitrary render function, injecting `className` into
/// the root element when supported.
pub(crate) fn render_with(
	render: &RenderFn,
	name: &str,
	supports_custom_class_name: bool,
	attributes: &Attributes,
	inner_content: &str,
) -> BlockResult<String> {
	let html = render(&RenderContext::new(name, attributes, inner_content))?;

	if !supports_custom_class_name {
		return Ok(html);
	}

	match attributes.get(CLASS_NAME_ATTRIBUTE).and_then(Value::as_str) {
		Some(class_name) if !class_name.trim().is_empty() => {
			Ok(inject_class_name(&html, class_name))
		}
		_ => Ok(html),
	}
}

/// Add classes to the first element of `html`, skipping any already present.
pub fn inject_class_name(html: &str, class_name: &str) -> String {
	let tokens = tokenize_html(html);
	let Some(root) = tokens
		.iter()
		.find(|spanned| matches!(spanned.token, HtmlToken::StartTag { .. }))
	else {
		return html.to_string();
	};
	let HtmlToken::StartTag {
		name,
		attributes,
		self_closing,
	} = &root.token
	else {
		return html.to_string();
	};

	let mut classes: Vec<&str> = root
		.token
		.attribute("class")
		.map(|value| value.split_ascii_whitespace().collect())
		.unwrap_or_default();
	for class in class_name.split_ascii_whitespace() {
		if !classes.contains(&class) {
			classes.push(class);
		}
	}
	let class_value = classes.join(" ");

	let mut tag = format!("<{name}");
	let mut has_class = false;
	for attribute in attributes {
		let value = if attribute.name == "class" {
			has_class = true;
			class_value.as_str()
		} else {
			attribute.value.as_str()
		};
		push_attribute(&mut tag, &attribute.name, value, attribute.quoted);
	}
	if !has_class {
		push_attribute(&mut tag, "class", &class_value, true);
	}
	tag.push_str(if *self_closing { "/>" } else { ">" });

	format!("{}{tag}{}", &html[..root.span.start], &html[root.span.end..])
}

fn push_attribute(tag: &mut String, name: &str, value: &str, quoted: bool) {
	tag.push(' ');
	tag.push_str(name);
	if value.is_empty() && !quoted {
		return;
	}
	tag.push_str("=\"");
	tag.push_str(&html_escape::encode_double_quoted_attribute(value));
	tag.push('"');
}

/// The attributes written into the comment delimiter: implicit, non-local
/// attributes whose value differs from the default.
pub fn get_comment_attributes(schema: &AttributeSchema, attributes: &Attributes) -> Attributes {
	let mut comment_attributes = Attributes::new();

	for (name, entry) in schema.iter() {
		if !entry.is_implicit() || entry.role == AttributeRole::Local {
			continue;
		}
		let Some(value) = attributes.get(name) else {
			continue;
		};
		if entry
			.default
			.as_ref()
			.is_some_and(|default| is_default_value(default, value))
		{
			continue;
		}
		comment_attributes.insert(name.clone(), value.clone());
	}

	comment_attributes
}

/// Numbers match by value so `20` and `20.0` are the same default.
fn is_default_value(default: &Value, value: &Value) -> bool {
	match (default, value) {
		(Value::Number(default), Value::Number(value)) => {
			match (default.as_f64(), value.as_f64()) {
				(Some(default), Some(value)) => approx_eq!(f64, default, value),
				_ => default == value,
			}
		}
		_ => default == value,
	}
}

/// JSON for a comment delimiter. Characters which could end the comment or
/// be read as markup are written as unicode escapes.
pub fn serialize_attributes(attributes: &Attributes) -> String {
	let json = serde_json::to_string(attributes).unwrap_or_else(|_| String::from("{}"));
	let mut escaped = String::with_capacity(json.len());
	let mut chars = json.chars().peekable();

	while let Some(ch) = chars.next() {
		match ch {
			'\\' => {
				match chars.next() {
					Some('"') => escaped.push_str("\\u0022"),
					Some(next) => {
						escaped.push('\\');
						escaped.push(next);
					}
					None => escaped.push('\\'),
				}
			}
			'-' if chars.peek() == Some(&'-') => {
				chars.next();
				escaped.push_str("\\u002d\\u002d");
			}
			'<' => escaped.push_str("\\u003c"),
			'>' => escaped.push_str("\\u003e"),
			'&' => escaped.push_str("\\u0026"),
			_ => escaped.push(ch),
		}
	}

	escaped
}

/// Wrap content in comment delimiters. The default namespace is omitted
/// from the name and empty content produces a void delimiter.
pub fn get_comment_delimited_content(name: &str, attributes: &Attributes, content: &str) -> String {
	get_comment_delimited_content_with(name, attributes, content, DEFAULT_NAMESPACE)
}

/// [`get_comment_delimited_content`] omitting `default_namespace` instead of
/// the built-in one. Names in any other namespace are written in full.
pub fn get_comment_delimited_content_with(
	name: &str,
	attributes: &Attributes,
	content: &str,
	default_namespace: &str,
) -> String {
	let name = name
		.strip_prefix(default_namespace)
		.and_then(|rest| rest.strip_prefix('/'))
		.unwrap_or(name);

	let attributes = if attributes.is_empty() {
		String::new()
	} else {
		format!("{} ", serialize_attributes(attributes))
	};

	if content.is_empty() {
		return format!("<!-- block:{name} {attributes}/-->");
	}

	format!("<!-- block:{name} {attributes}-->\n{content}\n<!-- /block:{name} -->")
}

/// Reproduce a raw node as parsed, with its inner blocks in place.
pub fn serialize_raw_block(raw: &RawBlockNode) -> String {
	serialize_raw_block_with(raw, DEFAULT_NAMESPACE)
}

/// [`serialize_raw_block`] omitting `default_namespace` from block names.
pub fn serialize_raw_block_with(raw: &RawBlockNode, default_namespace: &str) -> String {
	let mut content = String::new();
	let mut inner_blocks = raw.inner_blocks.iter();

	for item in &raw.inner_content {
		match item {
			Some(html) => content.push_str(html),
			None => {
				if let Some(inner) = inner_blocks.next() {
					content.push_str(&serialize_raw_block_with(inner, default_namespace));
				}
			}
		}
	}

	match &raw.block_name {
		Some(name) => {
			get_comment_delimited_content_with(name, &raw.attrs, content.trim(), default_namespace)
		}
		None => content,
	}
}
