use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use derive_more::Deref;
use derive_more::DerefMut;
use serde_json::Value;

use crate::BlockError;
use crate::BlockResult;
use crate::ParsedBlock;
use crate::dom::Dom;
use crate::dom::NodeId;
use crate::shortcode::Shortcode;

/// An ordered JSON object of block attributes.
pub type Attributes = serde_json::Map<String, Value>;

/// Renders a block's canonical markup.
pub type RenderFn = Arc<dyn Fn(&RenderContext<'_>) -> BlockResult<String> + Send + Sync>;

/// Transforms the attributes and inner blocks of an outdated block into the
/// current shape.
pub type MigrateFn =
	Arc<dyn Fn(Attributes, Vec<ParsedBlock>) -> (Attributes, Vec<ParsedBlock>) + Send + Sync>;

/// Decides whether a deprecated variant applies, given the attributes from
/// the comment delimiter and the parsed inner blocks.
pub type EligibilityFn = Arc<dyn Fn(&Attributes, &[ParsedBlock]) -> bool + Send + Sync>;

pub type RawMatchFn = Arc<dyn Fn(&Dom, NodeId) -> bool + Send + Sync>;
pub type RawTransformFn = Arc<dyn Fn(&Dom, NodeId) -> Attributes + Send + Sync>;
pub type ShortcodeTransformFn = Arc<dyn Fn(&Shortcode) -> Attributes + Send + Sync>;

/// The attribute name added to every block type supporting custom class
/// names.
pub const CLASS_NAME_ATTRIBUTE: &str = "className";

/// Priority given to transforms which don't declare one. Lower runs first.
pub const DEFAULT_TRANSFORM_PRIORITY: i32 = 10;

/// Where an attribute's value is read from.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeSource {
	/// The JSON blob in the comment delimiter.
	Implicit,
	/// Markup verbatim. Without a selector this is the whole fragment.
	RawHtml { multiline: Option<String> },
	/// An HTML attribute of the matched element.
	Attribute { name: String },
	/// A DOM property of the matched element such as `innerHTML` or
	/// `nodeName`.
	Property { name: String },
	/// The matched element's inner markup. With `multiline` only the direct
	/// children with that tag name are kept, as outer markup.
	InnerHtml { multiline: Option<String> },
	TextContent,
	RichText,
	/// The matched element's children as a structured node tree.
	Children,
	/// The matched element as a structured node tree.
	Node,
	/// Applies a nested schema to every matched element.
	SubQuery { schema: AttributeSchema },
	TagName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
	String,
	Boolean,
	Number,
	Integer,
	Object,
	Array,
	Null,
	RichText,
}

impl AttributeType {
	/// Whether `value` satisfies this type.
	pub fn accepts(self, value: &Value) -> bool {
		match self {
			Self::String => value.is_string(),
			Self::Boolean => value.is_boolean(),
			Self::Number => value.is_number(),
			Self::Integer => value.is_i64() || value.is_u64(),
			Self::Object => value.is_object(),
			Self::Array => value.is_array(),
			Self::Null => value.is_null(),
			Self::RichText => value.is_object() || value.is_string(),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttributeRole {
	/// Part of the block's persisted content.
	#[default]
	Content,
	/// Editor state that is never serialized.
	Local,
}

/// Declares how one attribute is extracted, typed and defaulted.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSchemaEntry {
	pub source: AttributeSource,
	pub selector: Option<String>,
	pub r#type: Option<AttributeType>,
	pub default: Option<Value>,
	pub enum_values: Option<Vec<Value>>,
	pub role: AttributeRole,
}

impl AttributeSchemaEntry {
	pub fn new(source: AttributeSource) -> Self {
		Self {
			source,
			selector: None,
			r#type: None,
			default: None,
			enum_values: None,
			role: AttributeRole::Content,
		}
	}

	/// An attribute stored in the comment delimiter.
	pub fn implicit(attribute_type: AttributeType) -> Self {
		Self::new(AttributeSource::Implicit).typed(attribute_type)
	}

	/// An HTML attribute read from the element matching `selector`.
	pub fn html_attribute(selector: &str, name: &str) -> Self {
		Self::new(AttributeSource::Attribute {
			name: name.to_string(),
		})
		.selector(selector)
		.typed(AttributeType::String)
	}

	/// Rich text read from the element matching `selector`.
	pub fn rich_text(selector: &str) -> Self {
		Self::new(AttributeSource::RichText)
			.selector(selector)
			.typed(AttributeType::RichText)
	}

	#[must_use]
	pub fn selector(mut self, selector: &str) -> Self {
		self.selector = Some(selector.to_string());
		self
	}

	#[must_use]
	pub fn typed(mut self, attribute_type: AttributeType) -> Self {
		self.r#type = Some(attribute_type);
		self
	}

	#[must_use]
	pub fn default_value(mut self, value: impl Into<Value>) -> Self {
		self.default = Some(value.into());
		self
	}

	#[must_use]
	pub fn enum_values(mut self, values: Vec<Value>) -> Self {
		self.enum_values = Some(values);
		self
	}

	#[must_use]
	pub fn local(mut self) -> Self {
		self.role = AttributeRole::Local;
		self
	}

	pub fn is_implicit(&self) -> bool {
		self.source == AttributeSource::Implicit
	}

	/// Whether `value` passes the declared type and enum checks.
	pub fn accepts(&self, value: &Value) -> bool {
		if let Some(attribute_type) = self.r#type {
			if !attribute_type.accepts(value) {
				return false;
			}
		}
		self.enum_values
			.as_ref()
			.is_none_or(|values| values.contains(value))
	}
}

/// The attributes of a block type in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Deref, DerefMut)]
pub struct AttributeSchema(
	#[deref]
	#[deref_mut]
	Vec<(String, AttributeSchemaEntry)>,
);

impl AttributeSchema {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, name: &str, entry: AttributeSchemaEntry) -> Self {
		self.insert(name, entry);
		self
	}

	/// Add or replace an entry, keeping its original position when replaced.
	pub fn insert(&mut self, name: &str, entry: AttributeSchemaEntry) {
		if let Some(existing) = self.0.iter_mut().find(|(key, _)| key == name) {
			existing.1 = entry;
			return;
		}
		self.0.push((name.to_string(), entry));
	}

	pub fn get(&self, name: &str) -> Option<&AttributeSchemaEntry> {
		self.0
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, entry)| entry)
	}

	/// This schema plus the implicit `className` attribute.
	#[must_use]
	pub fn with_class_name(&self) -> Self {
		let mut schema = self.clone();
		if schema.get(CLASS_NAME_ATTRIBUTE).is_none() {
			schema.insert(
				CLASS_NAME_ATTRIBUTE,
				AttributeSchemaEntry::implicit(AttributeType::String),
			);
		}
		schema
	}
}

/// What a render function is given.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
	/// Name of the block being rendered.
	pub name: &'a str,
	/// Resolved attributes.
	pub attributes: &'a Attributes,
	/// Serialized inner blocks, joined by newlines.
	pub inner_content: &'a str,
}

impl<'a> RenderContext<'a> {
	pub fn new(name: &'a str, attributes: &'a Attributes, inner_content: &'a str) -> Self {
		Self {
			name,
			attributes,
			inner_content,
		}
	}

	pub fn get(&self, key: &str) -> Option<&'a Value> {
		self.attributes.get(key)
	}

	pub fn str(&self, key: &str) -> Option<&'a str> {
		self.get(key).and_then(Value::as_str).filter(|value| !value.is_empty())
	}

	pub fn bool(&self, key: &str) -> bool {
		self.get(key).and_then(Value::as_bool).unwrap_or(false)
	}

	pub fn i64(&self, key: &str) -> Option<i64> {
		self.get(key).and_then(Value::as_i64)
	}

	/// A rich-text or string attribute as HTML.
	pub fn html(&self, key: &str) -> String {
		match self.get(key) {
			Some(Value::String(html)) => html.clone(),
			Some(value @ Value::Object(_)) => {
				crate::RichText::from_value(value)
					.map(|rich_text| rich_text.to_html())
					.unwrap_or_default()
			}
			_ => String::new(),
		}
	}
}

/// An older schema/render pair kept so stored content written by it can be
/// recognized and upgraded.
#[derive(Clone)]
pub struct DeprecatedVariant {
	pub attributes: AttributeSchema,
	pub render: RenderFn,
	pub is_eligible: Option<EligibilityFn>,
	pub migrate: Option<MigrateFn>,
	pub supports_custom_class_name: bool,
}

impl DeprecatedVariant {
	pub fn new(
		attributes: AttributeSchema,
		render: impl Fn(&RenderContext<'_>) -> BlockResult<String> + Send + Sync + 'static,
	) -> Self {
		Self {
			attributes,
			render: Arc::new(render),
			is_eligible: None,
			migrate: None,
			supports_custom_class_name: true,
		}
	}

	#[must_use]
	pub fn eligible_when(
		mut self,
		predicate: impl Fn(&Attributes, &[ParsedBlock]) -> bool + Send + Sync + 'static,
	) -> Self {
		self.is_eligible = Some(Arc::new(predicate));
		self
	}

	#[must_use]
	pub fn migrate_with(
		mut self,
		migrate: impl Fn(Attributes, Vec<ParsedBlock>) -> (Attributes, Vec<ParsedBlock>)
		+ Send
		+ Sync
		+ 'static,
	) -> Self {
		self.migrate = Some(Arc::new(migrate));
		self
	}

	#[must_use]
	pub fn without_custom_class_name(mut self) -> Self {
		self.supports_custom_class_name = false;
		self
	}

	/// The variant's schema including `className` when supported.
	pub fn schema(&self) -> AttributeSchema {
		if self.supports_custom_class_name {
			self.attributes.with_class_name()
		} else {
			self.attributes.clone()
		}
	}
}

impl fmt::Debug for DeprecatedVariant {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeprecatedVariant")
			.field("attributes", &self.attributes)
			.field("is_eligible", &self.is_eligible.is_some())
			.field("migrate", &self.migrate.is_some())
			.field("supports_custom_class_name", &self.supports_custom_class_name)
			.finish_non_exhaustive()
	}
}

/// Maps a matched DOM element to a block during ingestion.
#[derive(Clone)]
pub struct RawTransform {
	pub priority: i32,
	pub is_match: RawMatchFn,
	/// Builds the block attributes. When absent the attributes are sourced
	/// from the element's outer markup through the block's schema.
	pub transform: Option<RawTransformFn>,
}

impl RawTransform {
	pub fn new(is_match: impl Fn(&Dom, NodeId) -> bool + Send + Sync + 'static) -> Self {
		Self {
			priority: DEFAULT_TRANSFORM_PRIORITY,
			is_match: Arc::new(is_match),
			transform: None,
		}
	}

	/// Match elements with one of the given tag names.
	pub fn tags(tags: &'static [&'static str]) -> Self {
		Self::new(move |dom, id| {
			dom.tag_name(id)
				.is_some_and(|name| tags.iter().any(|tag| *tag == name))
		})
	}

	#[must_use]
	pub fn priority(mut self, priority: i32) -> Self {
		self.priority = priority;
		self
	}

	#[must_use]
	pub fn transform_with(
		mut self,
		transform: impl Fn(&Dom, NodeId) -> Attributes + Send + Sync + 'static,
	) -> Self {
		self.transform = Some(Arc::new(transform));
		self
	}
}

impl fmt::Debug for RawTransform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RawTransform")
			.field("priority", &self.priority)
			.finish_non_exhaustive()
	}
}

/// Converts a bracket shortcode into block attributes during ingestion.
#[derive(Clone)]
pub struct ShortcodeTransform {
	pub tags: Vec<String>,
	pub priority: i32,
	pub transform: ShortcodeTransformFn,
}

impl ShortcodeTransform {
	pub fn new(
		tags: &[&str],
		transform: impl Fn(&Shortcode) -> Attributes + Send + Sync + 'static,
	) -> Self {
		Self {
			tags: tags.iter().map(ToString::to_string).collect(),
			priority: DEFAULT_TRANSFORM_PRIORITY,
			transform: Arc::new(transform),
		}
	}
}

impl fmt::Debug for ShortcodeTransform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ShortcodeTransform")
			.field("tags", &self.tags)
			.field("priority", &self.priority)
			.finish_non_exhaustive()
	}
}

/// A registered kind of block.
#[derive(Clone)]
pub struct BlockType {
	/// Fully qualified name, e.g. `core/paragraph`.
	pub name: String,
	pub attributes: AttributeSchema,
	pub render: RenderFn,
	/// Older variants, tried in declaration order.
	pub deprecated: Vec<DeprecatedVariant>,
	pub migrate: Option<MigrateFn>,
	pub supports_custom_class_name: bool,
	pub raw_transforms: Vec<RawTransform>,
	pub shortcode_transforms: Vec<ShortcodeTransform>,
}

impl BlockType {
	pub fn new(
		name: &str,
		render: impl Fn(&RenderContext<'_>) -> BlockResult<String> + Send + Sync + 'static,
	) -> Self {
		Self {
			name: name.to_string(),
			attributes: AttributeSchema::new(),
			render: Arc::new(render),
			deprecated: vec![],
			migrate: None,
			supports_custom_class_name: true,
			raw_transforms: vec![],
			shortcode_transforms: vec![],
		}
	}

	#[must_use]
	pub fn attribute(mut self, name: &str, entry: AttributeSchemaEntry) -> Self {
		self.attributes.insert(name, entry);
		self
	}

	/// Replace the whole attribute schema.
	#[must_use]
	pub fn with_attributes(mut self, attributes: AttributeSchema) -> Self {
		self.attributes = attributes;
		self
	}

	#[must_use]
	pub fn deprecated(mut self, variant: DeprecatedVariant) -> Self {
		self.deprecated.push(variant);
		self
	}

	#[must_use]
	pub fn migrate_with(
		mut self,
		migrate: impl Fn(Attributes, Vec<ParsedBlock>) -> (Attributes, Vec<ParsedBlock>)
		+ Send
		+ Sync
		+ 'static,
	) -> Self {
		self.migrate = Some(Arc::new(migrate));
		self
	}

	#[must_use]
	pub fn without_custom_class_name(mut self) -> Self {
		self.supports_custom_class_name = false;
		self
	}

	#[must_use]
	pub fn raw_transform(mut self, transform: RawTransform) -> Self {
		self.raw_transforms.push(transform);
		self
	}

	#[must_use]
	pub fn shortcode_transform(mut self, transform: ShortcodeTransform) -> Self {
		self.shortcode_transforms.push(transform);
		self
	}

	/// The schema used for parsing, including `className` when supported.
	pub fn schema(&self) -> AttributeSchema {
		if self.supports_custom_class_name {
			self.attributes.with_class_name()
		} else {
			self.attributes.clone()
		}
	}

	/// The namespace part of the name.
	pub fn namespace(&self) -> &str {
		self.name.split_once('/').map_or("", |(namespace, _)| namespace)
	}

	/// Check that a name has the `namespace/name` shape.
	pub fn validate_name(name: &str) -> BlockResult<()> {
		let is_valid = name
			.split_once('/')
			.is_some_and(|(namespace, local)| is_name_part(namespace) && is_name_part(local));

		if is_valid {
			Ok(())
		} else {
			Err(BlockError::InvalidBlockName(name.to_string()))
		}
	}
}

/// `[a-z][a-z0-9_-]*`
fn is_name_part(part: &str) -> bool {
	let mut chars = part.chars();
	chars.next().is_some_and(|first| first.is_ascii_lowercase())
		&& chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
}

impl fmt::Debug for BlockType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BlockType")
			.field("name", &self.name)
			.field("attributes", &self.attributes)
			.field("deprecated", &self.deprecated)
			.field("supports_custom_class_name", &self.supports_custom_class_name)
			.field("raw_transforms", &self.raw_transforms)
			.field("shortcode_transforms", &self.shortcode_transforms)
			.finish_non_exhaustive()
	}
}

/// Read-only access to registered block types.
pub trait BlockTypeRegistry: Send + Sync {
	fn lookup(&self, name: &str) -> Option<Arc<BlockType>>;
	/// Every registered type in registration order.
	fn block_types(&self) -> Vec<Arc<BlockType>>;
	/// The block wrapping literal markup outside any delimiter.
	fn freeform_name(&self) -> Option<&str>;
	/// The block wrapping blocks whose type is not registered.
	fn unregistered_name(&self) -> Option<&str>;
	/// The block used for ingested markup no raw transform matched.
	fn html_fallback_name(&self) -> Option<&str>;
}

/// An in-memory [`BlockTypeRegistry`].
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
	types: Vec<Arc<BlockType>>,
	index: HashMap<String, usize>,
	freeform_name: Option<String>,
	unregistered_name: Option<String>,
	html_fallback_name: Option<String>,
}

impl BlockRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a block type, replacing any type with the same name.
	pub fn register(&mut self, block_type: BlockType) {
		let name = block_type.name.clone();
		let block_type = Arc::new(block_type);

		if let Some(index) = self.index.get(&name) {
			self.types[*index] = block_type;
		} else {
			self.index.insert(name, self.types.len());
			self.types.push(block_type);
		}
	}

	/// Register a block type after checking its name.
	pub fn try_register(&mut self, block_type: BlockType) -> BlockResult<()> {
		BlockType::validate_name(&block_type.name)?;
		self.register(block_type);
		Ok(())
	}

	pub fn set_freeform_name(&mut self, name: &str) {
		self.freeform_name = Some(name.to_string());
	}

	pub fn set_unregistered_name(&mut self, name: &str) {
		self.unregistered_name = Some(name.to_string());
	}

	pub fn set_html_fallback_name(&mut self, name: &str) {
		self.html_fallback_name = Some(name.to_string());
	}

	pub fn len(&self) -> usize {
		self.types.len()
	}

	pub fn is_empty(&self) -> bool {
		self.types.is_empty()
	}
}

impl BlockTypeRegistry for BlockRegistry {
	fn lookup(&self, name: &str) -> Option<Arc<BlockType>> {
		self.index
			.get(name)
			.and_then(|index| self.types.get(*index))
			.cloned()
	}

	fn block_types(&self) -> Vec<Arc<BlockType>> {
		self.types.clone()
	}

	fn freeform_name(&self) -> Option<&str> {
		self.freeform_name.as_deref()
	}

	fn unregistered_name(&self) -> Option<&str> {
		self.unregistered_name.as_deref()
	}

	fn html_fallback_name(&self) -> Option<&str> {
		self.html_fallback_name.as_deref()
	}
}
