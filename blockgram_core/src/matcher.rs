use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use crate::Attributes;
use crate::RichText;
use crate::dom::Dom;
use crate::dom::NodeData;
use crate::dom::NodeId;
use crate::schema::AttributeSchema;
use crate::schema::AttributeSchemaEntry;
use crate::schema::AttributeSource;
use crate::schema::AttributeType;
use crate::schema::BlockType;
use crate::selector::Selector;

/// Resolve every attribute of `block_type` from a block's inner markup and
/// the attributes of its comment delimiter.
///
/// Values failing their declared type or enum are dropped and replaced with
/// the schema default. Rich-text attributes default to an empty value rather
/// than being left out.
pub fn get_block_attributes(
	block_type: &BlockType,
	inner_html: &str,
	comment_attrs: &Attributes,
) -> Attributes {
	get_attributes_for_schema(&block_type.schema(), inner_html, comment_attrs)
}

/// [`get_block_attributes`] for an explicit schema, such as the schema of a
/// deprecated variant.
pub fn get_attributes_for_schema(
	schema: &AttributeSchema,
	inner_html: &str,
	comment_attrs: &Attributes,
) -> Attributes {
	let needs_dom = schema.iter().any(|(_, entry)| !entry.is_implicit());
	let dom = needs_dom.then(|| Dom::parse(inner_html));

	let mut attributes = Attributes::new();
	for (name, entry) in schema.iter() {
		let value = match &dom {
			_ if entry.is_implicit() => comment_attrs.get(name).cloned(),
			Some(dom) => source_value(dom, dom.root(), entry),
			None => None,
		};

		if let Some(value) = normalize_value(entry, value) {
			attributes.insert(name.clone(), value);
		}
	}

	attributes
}

/// Extract a single attribute value from `html`.
pub fn parse_with_attribute_schema(html: &str, entry: &AttributeSchemaEntry) -> Option<Value> {
	let dom = Dom::parse(html);
	source_value(&dom, dom.root(), entry)
}

/// Apply type and enum checks, then defaults.
fn normalize_value(entry: &AttributeSchemaEntry, value: Option<Value>) -> Option<Value> {
	let value = value.filter(|value| entry.accepts(value));

	value.or_else(|| entry.default.clone()).or_else(|| {
		(entry.r#type == Some(AttributeType::RichText)).then(|| RichText::default().to_value())
	})
}

/// The element an entry reads from when it has no selector: the first
/// element of a fragment, or the scope itself inside a sub-query.
fn default_element(dom: &Dom, scope: NodeId) -> Option<NodeId> {
	if scope == dom.root() {
		dom.first_element()
	} else {
		Some(scope)
	}
}

fn select(dom: &Dom, scope: NodeId, selector: &str) -> Option<NodeId> {
	match Selector::parse(selector) {
		Ok(selector) => selector.select_first(dom, scope),
		Err(error) => {
			debug!(%error, "ignoring attribute with an invalid selector");
			None
		}
	}
}

fn source_value(dom: &Dom, scope: NodeId, entry: &AttributeSchemaEntry) -> Option<Value> {
	let selected = entry
		.selector
		.as_deref()
		.map(|selector| select(dom, scope, selector));

	// Element sources fall back to the first element; markup sources fall
	// back to the whole scope.
	let element = || match selected {
		Some(found) => found,
		None => default_element(dom, scope),
	};
	let container = || selected.unwrap_or(Some(scope));

	match &entry.source {
		AttributeSource::Implicit => None,
		AttributeSource::Attribute { name } => {
			let element = element()?;
			if entry.r#type == Some(AttributeType::Boolean) {
				return dom.has_attribute(element, name).then_some(Value::Bool(true));
			}
			dom.attribute(element, name)
				.map(|value| Value::String(value.to_string()))
		}
		AttributeSource::Property { name } => {
			let element = element()?;
			property(dom, element, name, entry.r#type)
		}
		AttributeSource::RawHtml { multiline } => {
			let target = container()?;
			if let Some(tag) = multiline {
				return Some(Value::String(multiline_html(dom, target, tag)));
			}
			if entry.selector.is_none() && target == dom.root() {
				return Some(Value::String(dom.source().to_string()));
			}
			Some(Value::String(dom.inner_html(target)))
		}
		AttributeSource::InnerHtml { multiline } => {
			let target = container()?;
			let html = match multiline {
				Some(tag) => multiline_html(dom, target, tag),
				None => dom.inner_html(target),
			};
			Some(Value::String(html))
		}
		AttributeSource::TextContent => {
			let target = container()?;
			Some(Value::String(dom.text_content(target)))
		}
		AttributeSource::RichText => {
			let target = container()?;
			Some(RichText::from_dom(dom, target).to_value())
		}
		AttributeSource::Children => {
			let target = container()?;
			Some(Value::Array(
				dom.children(target)
					.iter()
					.filter_map(|child| node_value(dom, *child))
					.collect(),
			))
		}
		AttributeSource::Node => {
			let target = element()?;
			node_value(dom, target)
		}
		AttributeSource::SubQuery { schema } => {
			let selector = entry.selector.as_deref()?;
			let selector = match Selector::parse(selector) {
				Ok(selector) => selector,
				Err(error) => {
					debug!(%error, "ignoring sub-query with an invalid selector");
					return None;
				}
			};

			let items = selector
				.select_all(dom, scope)
				.into_iter()
				.map(|matched| {
					let mut item = Map::new();
					for (name, sub_entry) in schema.iter() {
						if let Some(value) =
							normalize_value(sub_entry, source_value(dom, matched, sub_entry))
						{
							item.insert(name.clone(), value);
						}
					}
					Value::Object(item)
				})
				.collect();

			Some(Value::Array(items))
		}
		AttributeSource::TagName => {
			let element = element()?;
			dom.tag_name(element)
				.map(|name| Value::String(name.to_ascii_lowercase()))
		}
	}
}

fn property(
	dom: &Dom,
	element: NodeId,
	name: &str,
	attribute_type: Option<AttributeType>,
) -> Option<Value> {
	let value = match name {
		"innerHTML" => dom.inner_html(element),
		"outerHTML" => dom.outer_html(element),
		"textContent" | "innerText" => dom.text_content(element),
		"nodeName" | "tagName" => dom.tag_name(element)?.to_ascii_uppercase(),
		"className" => dom.attribute(element, "class").unwrap_or_default().to_string(),
		"id" => dom.attribute(element, "id").unwrap_or_default().to_string(),
		other => {
			if attribute_type == Some(AttributeType::Boolean) {
				return dom.has_attribute(element, other).then_some(Value::Bool(true));
			}
			dom.attribute(element, other)?.to_string()
		}
	};

	Some(Value::String(value))
}

/// The outer markup of the direct children of `id` named `tag`.
fn multiline_html(dom: &Dom, id: NodeId, tag: &str) -> String {
	dom.element_children(id)
		.into_iter()
		.filter(|child| dom.is_element_named(*child, tag))
		.map(|child| dom.outer_html(child))
		.collect()
}

/// Mirror a DOM node as `{"type": tag, "props": {…, "children": […]}}`.
/// Text nodes become plain strings and comments are dropped.
pub fn node_value(dom: &Dom, id: NodeId) -> Option<Value> {
	match &dom.node(id).data {
		NodeData::Text(text) => Some(Value::String(text.clone())),
		NodeData::Element(element) => {
			let mut props = Map::new();
			for attribute in &element.attributes {
				props.insert(attribute.name.clone(), Value::String(attribute.value.clone()));
			}
			let children: Vec<Value> = dom
				.children(id)
				.iter()
				.filter_map(|child| node_value(dom, *child))
				.collect();
			props.insert("children".to_string(), Value::Array(children));

			let mut node = Map::new();
			node.insert("type".to_string(), Value::String(element.name.clone()));
			node.insert("props".to_string(), Value::Object(props));
			Some(Value::Object(node))
		}
		NodeData::Comment(_) | NodeData::Document => None,
	}
}
