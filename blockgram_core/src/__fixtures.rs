use serde_json::Value;

use crate::Attributes;
use crate::BlockResult;
use crate::ParsedBlock;
use crate::library::core_registry;
use crate::schema::AttributeSchema;
use crate::schema::AttributeSchemaEntry;
use crate::schema::AttributeSource;
use crate::schema::AttributeType;
use crate::schema::BlockRegistry;
use crate::schema::BlockType;
use crate::schema::DeprecatedVariant;
use crate::schema::RenderContext;

pub(crate) const NOTE: &str = "test/note";

pub(crate) const PARAGRAPH_DOCUMENT: &str =
	"<!-- block:paragraph -->\n<p>Hello</p>\n<!-- /block:paragraph -->";

pub(crate) const GROUP_DOCUMENT: &str = "<!-- block:group -->\n<div class=\"wp-block-group\"><!-- block:paragraph -->\n<p>One</p>\n<!-- /block:paragraph --></div>\n<!-- /block:group -->";

pub(crate) const MIXED_DOCUMENT: &str = r#"<!-- block:heading {"level":3} -->
<h3>Title</h3>
<!-- /block:heading -->

<!-- block:paragraph {"align":"center","dropCap":true} -->
<p class="has-text-align-center has-drop-cap">Some <strong>bold</strong> text.</p>
<!-- /block:paragraph -->

<!-- block:spacer {"height":40} /-->

<!-- block:list {"ordered":true,"start":3} -->
<ol start="3"><li>Three</li><li>Four</li></ol>
<!-- /block:list -->

<!-- block:separator -->
<hr class="wp-block-separator"/>
<!-- /block:separator -->"#;

pub(crate) fn registry() -> BlockRegistry {
	core_registry()
}

/// The core registry plus [`note_block_type`].
pub(crate) fn note_registry() -> BlockRegistry {
	let mut registry = core_registry();
	registry.register(note_block_type());
	registry
}

/// A paragraph block document holding `content`.
pub(crate) fn paragraph_document(content: &str) -> String {
	format!("<!-- block:paragraph -->\n<p>{content}</p>\n<!-- /block:paragraph -->")
}

/// Groups nested `depth` levels deep around a single paragraph.
pub(crate) fn nested_groups(depth: usize) -> String {
	let mut document = paragraph_document("Deep");
	for _ in 0..depth {
		document = format!(
			"<!-- block:group -->\n<div class=\"wp-block-group\">{document}</div>\n<!-- /block:group -->"
		);
	}
	document
}

pub(crate) fn note_document(class: &str, text: &str) -> String {
	format!("<!-- block:test/note -->\n<div class=\"{class}\">{text}</div>\n<!-- /block:test/note -->")
}

fn note_schema() -> AttributeSchema {
	AttributeSchema::new().with(
		"text",
		AttributeSchemaEntry::new(AttributeSource::TextContent)
			.selector("div")
			.typed(AttributeType::String)
			.default_value(""),
	)
}

fn note_render(class: &'static str) -> impl Fn(&RenderContext<'_>) -> BlockResult<String> {
	move |context| {
		Ok(format!(
			"<div class=\"{class}\">{}</div>",
			context.str("text").unwrap_or_default()
		))
	}
}

fn migrated_from(
	version: &'static str,
) -> impl Fn(Attributes, Vec<ParsedBlock>) -> (Attributes, Vec<ParsedBlock>) {
	move |mut attributes, inner_blocks| {
		attributes.insert("migratedFrom".to_string(), Value::String(version.to_string()));
		(attributes, inner_blocks)
	}
}

/// A block with several deprecated variants. Each variant's `migrate`
/// records which variant ran in `migratedFrom`.
pub(crate) fn note_block_type() -> BlockType {
	BlockType::new(NOTE, note_render("note"))
		.with_attributes(note_schema())
		.deprecated(
			DeprecatedVariant::new(note_schema(), note_render("note-v2"))
				.migrate_with(migrated_from("v2")),
		)
		.deprecated(
			DeprecatedVariant::new(note_schema(), note_render("note-v1"))
				.migrate_with(migrated_from("v1")),
		)
		.deprecated(
			DeprecatedVariant::new(note_schema(), note_render("note-v1"))
				.migrate_with(migrated_from("v1-again")),
		)
		.deprecated(
			DeprecatedVariant::new(note_schema(), note_render("note"))
				.eligible_when(|attributes, _| attributes.get("legacy") == Some(&Value::Bool(true)))
				.migrate_with(migrated_from("legacy")),
		)
}

/// Attributes from a JSON object literal.
pub(crate) fn attributes(value: Value) -> Attributes {
	value.as_object().cloned().unwrap_or_default()
}
