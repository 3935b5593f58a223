use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::Attributes;
use crate::BlockError;
use crate::BlockResult;
use crate::ParseDiagnostic;
use crate::ParseOptions;
use crate::RawBlockNode;
use crate::RichText;
use crate::matcher::get_attributes_for_schema;
use crate::migration::SchemaVersion;
use crate::migration::apply_block_deprecated_versions;
use crate::parser::parse_with_diagnostics;
use crate::schema::AttributeType;
use crate::schema::BlockTypeRegistry;
use crate::serializer::serialize_raw_block_with;
use crate::validation::ValidationIssue;

/// A block with its attributes resolved against its type's schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedBlock {
	/// Fully qualified block name.
	pub name: String,
	/// Every schema attribute with defaults applied.
	pub attributes: Attributes,
	pub inner_blocks: Vec<ParsedBlock>,
	pub is_valid: bool,
	pub validation_issues: Vec<ValidationIssue>,
	/// The block's stored markup, excluding inner blocks.
	pub original_content: String,
	/// The node as parsed. Present only when the block stayed invalid, so
	/// serialization can reproduce it unchanged.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub raw_source: Option<RawBlockNode>,
}

impl ParsedBlock {
	/// A valid block with no stored content.
	pub fn new(
		name: impl Into<String>,
		attributes: Attributes,
		inner_blocks: Vec<ParsedBlock>,
	) -> Self {
		Self {
			name: name.into(),
			attributes,
			inner_blocks,
			is_valid: true,
			validation_issues: vec![],
			original_content: String::new(),
			raw_source: None,
		}
	}

	/// Visit this block and all descendants, parents first.
	pub fn walk(&self) -> Vec<&ParsedBlock> {
		let mut blocks = vec![];
		let mut pending = vec![self];
		while let Some(block) = pending.pop() {
			blocks.push(block);
			pending.extend(block.inner_blocks.iter().rev());
		}
		blocks
	}
}

/// Create a block of a registered type.
///
/// Attributes outside the schema are dropped, values failing their declared
/// type are replaced with defaults and rich-text attributes given as HTML
/// strings are converted.
pub fn create_block(
	registry: &dyn BlockTypeRegistry,
	name: &str,
	attributes: Attributes,
	inner_blocks: Vec<ParsedBlock>,
) -> BlockResult<ParsedBlock> {
	let block_type = registry
		.lookup(name)
		.ok_or_else(|| BlockError::UnknownBlockType(name.to_string()))?;

	let mut sanitized = Attributes::new();
	for (key, entry) in block_type.schema().iter() {
		let value = attributes.get(key).cloned().map(|value| {
			match (entry.r#type, value) {
				(Some(AttributeType::RichText), Value::String(html)) => {
					RichText::from_html(&html).to_value()
				}
				(_, value) => value,
			}
		});
		let value = value
			.filter(|value| entry.accepts(value))
			.or_else(|| entry.default.clone())
			.or_else(|| {
				(entry.r#type == Some(AttributeType::RichText))
					.then(|| RichText::default().to_value())
			});

		if let Some(value) = value {
			sanitized.insert(key.clone(), value);
		}
	}

	Ok(ParsedBlock::new(name, sanitized, inner_blocks))
}

/// Parse a document and resolve, validate and migrate every block.
pub fn parse_and_validate(
	document: impl AsRef<str>,
	registry: &dyn BlockTypeRegistry,
) -> Vec<ParsedBlock> {
	parse_and_validate_with(document, registry, &ParseOptions::default()).0
}

/// [`parse_and_validate`] with explicit options, also returning parse
/// diagnostics.
pub fn parse_and_validate_with(
	document: impl AsRef<str>,
	registry: &dyn BlockTypeRegistry,
	options: &ParseOptions,
) -> (Vec<ParsedBlock>, Vec<ParseDiagnostic>) {
	let (raw_blocks, diagnostics) = parse_with_diagnostics(document, options);
	let blocks = raw_blocks
		.iter()
		.filter_map(|raw| parse_raw_block_with(raw, registry, options))
		.collect();

	(blocks, diagnostics)
}

/// Turn a raw node into a parsed block.
///
/// Freeform text maps to the registry's freeform block and is dropped when
/// it is only whitespace. Blocks of unknown type are wrapped in the
/// registry's unregistered block, keeping their source verbatim. Returns
/// `None` when no type can represent the node.
pub fn parse_raw_block(
	raw: &RawBlockNode,
	registry: &dyn BlockTypeRegistry,
) -> Option<ParsedBlock> {
	parse_raw_block_with(raw, registry, &ParseOptions::default())
}

/// [`parse_raw_block`] for a node parsed with `options`. The verbatim source
/// kept for unregistered blocks omits `options.default_namespace`.
pub fn parse_raw_block_with(
	raw: &RawBlockNode,
	registry: &dyn BlockTypeRegistry,
	options: &ParseOptions,
) -> Option<ParsedBlock> {
	let inner_html = raw.inner_html.trim();
	let Some(name) = raw.block_name.as_deref() else {
		if inner_html.is_empty() {
			return None;
		}
		let Some(freeform) = registry.freeform_name() else {
			debug!("no freeform block registered, dropping literal text");
			return None;
		};
		return build_block(freeform, &Attributes::new(), inner_html, vec![], raw, registry);
	};

	if registry.lookup(name).is_some() {
		let inner_blocks = raw
			.inner_blocks
			.iter()
			.filter_map(|inner| parse_raw_block_with(inner, registry, options))
			.collect();
		return build_block(name, &raw.attrs, inner_html, inner_blocks, raw, registry);
	}

	let Some(fallback) = registry.unregistered_name().or(registry.freeform_name()) else {
		debug!(name, "no fallback for unregistered block, dropping it");
		return None;
	};
	debug!(name, fallback, "wrapping unregistered block");

	let original_content = serialize_raw_block_with(raw, &options.default_namespace);
	let mut attrs = Attributes::new();
	attrs.insert("originalName".to_string(), Value::String(name.to_string()));
	attrs.insert("originalContent".to_string(), Value::String(original_content.clone()));
	attrs.insert(
		"originalUndelimitedContent".to_string(),
		Value::String(raw.inner_html.clone()),
	);

	build_block(fallback, &attrs, &original_content, vec![], raw, registry)
}

fn build_block(
	name: &str,
	comment_attrs: &Attributes,
	inner_html: &str,
	inner_blocks: Vec<ParsedBlock>,
	raw: &RawBlockNode,
	registry: &dyn BlockTypeRegistry,
) -> Option<ParsedBlock> {
	let block_type = registry.lookup(name)?;
	let current = SchemaVersion::current(&block_type);

	let attributes = get_attributes_for_schema(&current.schema, inner_html, comment_attrs);
	let (attributes, is_valid, validation_issues) =
		current.validate_with_fixes(attributes, inner_html);

	let block = ParsedBlock {
		name: name.to_string(),
		attributes,
		inner_blocks,
		is_valid,
		validation_issues,
		original_content: inner_html.to_string(),
		raw_source: None,
	};

	let was_valid = block.is_valid;
	let mut block = apply_block_deprecated_versions(block, raw, &block_type);

	if !block.is_valid {
		debug!(name, issues = block.validation_issues.len(), "block is invalid");
		block.raw_source = Some(raw.clone());
	} else if !was_valid {
		debug!(name, "block updated from a deprecated version");
	}

	Some(block)
}
