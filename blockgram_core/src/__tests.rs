use std::time::Duration;
use std::time::Instant;

use rstest::rstest;
use serde_json::Value;
use serde_json::json;
use similar_asserts::assert_eq;

use super::__fixtures::*;
use super::*;
use crate::dom::Dom;
use crate::entities::XmlEntities;
use crate::filters::filter_html;
use crate::filters::normalize_blocks;
use crate::html_tokenizer::HtmlAttribute;
use crate::html_tokenizer::HtmlToken;
use crate::html_tokenizer::HtmlTokenizer;
use crate::html_tokenizer::html_tokens;
use crate::lexer::tokenize;
use crate::library::IMAGE;
use crate::library::MISSING;
use crate::library::PARAGRAPH;
use crate::matcher::get_block_attributes;
use crate::matcher::parse_with_attribute_schema;
use crate::selector::Selector;
use crate::shortcode::ShortcodeKind;
use crate::shortcode::next_shortcode;
use crate::shortcode::parse_shortcode_attributes;
use crate::tokens::DelimiterKind;

fn names(blocks: &[ParsedBlock]) -> Vec<&str> {
	blocks.iter().map(|block| block.name.as_str()).collect()
}

/// Every placeholder in `inner_content` lines up with an inner block and
/// the literal fragments add up to `inner_html`.
fn assert_placeholders(node: &RawBlockNode) {
	let placeholders = node.inner_content.iter().filter(|item| item.is_none()).count();
	assert_eq!(placeholders, node.inner_blocks.len());

	let literal: String = node.inner_content.iter().flatten().map(String::as_str).collect();
	assert_eq!(literal, node.inner_html);

	for inner in &node.inner_blocks {
		assert_placeholders(inner);
	}
}

#[rstest]
#[case::opener("<!-- block:paragraph -->", DelimiterKind::Opener, "core/paragraph")]
#[case::closer("<!-- /block:paragraph -->", DelimiterKind::Closer, "core/paragraph")]
#[case::void(r#"<!-- block:spacer {"height":10} /-->"#, DelimiterKind::Void, "core/spacer")]
#[case::namespaced("<!-- block:acme/card -->", DelimiterKind::Opener, "acme/card")]
#[case::legacy_sigil("<!-- wp:acme/card /-->", DelimiterKind::Void, "acme/card")]
#[case::multiline_whitespace("<!--\n\tblock:quote\n-->", DelimiterKind::Opener, "core/quote")]
fn tokenize_delimiters(#[case] input: &str, #[case] kind: DelimiterKind, #[case] name: &str) {
	let (tokens, diagnostics) = tokenize(input, &ParseOptions::default());

	assert_eq!(tokens.len(), 1);
	assert_eq!(tokens[0].kind, kind);
	assert_eq!(tokens[0].name, name);
	assert_eq!(tokens[0].span(), 0..input.len());
	assert!(diagnostics.is_empty());
}

#[rstest]
#[case::uppercase_name("<!-- block:Paragraph -->")]
#[case::missing_leading_whitespace("<!--block:paragraph -->")]
#[case::missing_trailing_whitespace("<!-- block:paragraph-->")]
#[case::space_after_sigil("<!-- block: paragraph -->")]
#[case::json_without_separator("<!-- block:paragraph{} -->")]
#[case::plain_comment("<!-- just a comment -->")]
#[case::unterminated("<!-- block:paragraph ")]
fn ignore_non_delimiter_comments(#[case] input: &str) {
	let (tokens, _) = tokenize(input, &ParseOptions::default());
	assert!(tokens.is_empty());

	let blocks = parse(input);
	assert_eq!(blocks, vec![RawBlockNode::freeform(input)]);
}

#[test]
fn tokenize_attributes_and_position() {
	let input = "Intro\n  <!-- block:image {\"id\":5,\"url\":\"a.png\"} /-->";
	let (tokens, _) = tokenize(input, &ParseOptions::default());

	assert_eq!(tokens.len(), 1);
	assert_eq!(
		tokens[0].attrs,
		Some(attributes(json!({ "id": 5, "url": "a.png" })))
	);
	assert_eq!(tokens[0].position.start.line, 2);
	assert_eq!(tokens[0].position.start.column, 3);
	assert_eq!(tokens[0].start, 8);
}

#[test]
fn parse_simple_block() {
	let blocks = parse(PARAGRAPH_DOCUMENT);

	assert_eq!(blocks.len(), 1);
	assert_eq!(blocks[0].block_name.as_deref(), Some(PARAGRAPH));
	assert_eq!(blocks[0].inner_html, "\n<p>Hello</p>\n");
	assert_eq!(blocks[0].inner_content, vec![Some("\n<p>Hello</p>\n".to_string())]);
	assert!(blocks[0].attrs.is_empty());
}

#[test]
fn parse_nested_blocks_with_placeholders() {
	let blocks = parse(GROUP_DOCUMENT);

	assert_eq!(blocks.len(), 1);
	let group = &blocks[0];
	assert_eq!(group.block_name.as_deref(), Some("core/group"));
	assert_eq!(group.inner_content, vec![
		Some("\n<div class=\"wp-block-group\">".to_string()),
		None,
		Some("</div>\n".to_string()),
	]);
	assert_eq!(group.inner_html, "\n<div class=\"wp-block-group\"></div>\n");
	assert_eq!(group.inner_blocks[0].inner_html, "\n<p>One</p>\n");
	assert_placeholders(group);
}

#[rstest]
#[case::group(GROUP_DOCUMENT.to_string())]
#[case::deep(nested_groups(5))]
#[case::mixed(MIXED_DOCUMENT.to_string())]
fn placeholders_match_inner_blocks(#[case] document: String) {
	for node in parse(&document) {
		assert_placeholders(&node);
	}
}

#[test]
fn parse_void_block() {
	let blocks = parse(r#"<!-- block:spacer {"height":50} /-->"#);

	assert_eq!(blocks.len(), 1);
	assert_eq!(blocks[0].block_name.as_deref(), Some("core/spacer"));
	assert_eq!(blocks[0].attrs, attributes(json!({ "height": 50 })));
	assert_eq!(blocks[0].inner_html, "");
	assert!(blocks[0].inner_content.is_empty());
}

#[test]
fn parse_freeform_around_blocks() {
	let blocks = parse("Hello <!-- block:separator /--> world");

	assert_eq!(blocks, vec![
		RawBlockNode::freeform("Hello "),
		RawBlockNode {
			block_name: Some("core/separator".to_string()),
			..RawBlockNode::default()
		},
		RawBlockNode::freeform(" world"),
	]);
}

#[test]
fn unmatched_closer_degrades_to_freeform() {
	let input = "<!-- /block:core/unknown -->";
	let (blocks, diagnostics) = parse_with_diagnostics(input, &ParseOptions::default());

	assert_eq!(blocks, vec![RawBlockNode::freeform(input)]);
	assert_eq!(diagnostics, vec![ParseDiagnostic::UnmatchedCloser {
		name: "core/unknown".to_string(),
		line: 1,
		column: 1,
	}]);
}

#[test]
fn unmatched_closer_keeps_earlier_blocks() {
	let input = format!("{PARAGRAPH_DOCUMENT}\n<!-- /block:quote -->\n<p>Tail</p>");
	let blocks = parse(&input);

	assert_eq!(blocks.len(), 2);
	assert_eq!(blocks[0].block_name.as_deref(), Some(PARAGRAPH));
	assert_eq!(
		blocks[1],
		RawBlockNode::freeform("\n<!-- /block:quote -->\n<p>Tail</p>")
	);
}

#[test]
fn unclosed_block_runs_to_end_of_document() {
	let (blocks, diagnostics) = parse_with_diagnostics(
		"<!-- block:paragraph -->\n<p>Open</p>",
		&ParseOptions::default(),
	);

	assert_eq!(blocks.len(), 1);
	assert_eq!(blocks[0].inner_html, "\n<p>Open</p>");
	assert!(matches!(
		diagnostics.as_slice(),
		[ParseDiagnostic::UnclosedBlock { name, line: 1, .. }] if name == PARAGRAPH
	));
}

#[test]
fn mismatched_closer_closes_innermost_block() {
	let input = "<!-- block:quote -->\n<blockquote></blockquote>\n<!-- /block:paragraph -->";
	let (blocks, diagnostics) = parse_with_diagnostics(input, &ParseOptions::default());

	assert_eq!(blocks.len(), 1);
	assert_eq!(blocks[0].block_name.as_deref(), Some("core/quote"));
	assert!(matches!(
		&diagnostics[0],
		ParseDiagnostic::MismatchedCloser { expected, found, .. }
			if expected == "core/quote" && found == PARAGRAPH
	));
}

#[test]
fn invalid_attributes_become_empty() {
	let input = "<!-- block:paragraph {not json} -->\n<p>x</p>\n<!-- /block:paragraph -->";
	let (blocks, diagnostics) = parse_with_diagnostics(input, &ParseOptions::default());

	assert_eq!(blocks.len(), 1);
	assert!(blocks[0].attrs.is_empty());
	assert_eq!(diagnostics.len(), 1);
	assert!(matches!(&diagnostics[0], ParseDiagnostic::InvalidAttributes { name, .. } if name == PARAGRAPH));
	assert!(diagnostics[0].message().starts_with("invalid attributes on `core/paragraph`"));
}

#[test]
fn depth_limit_keeps_opener_as_text() {
	let options = ParseOptions {
		max_depth: 2,
		..ParseOptions::default()
	};
	let (blocks, diagnostics) = parse_with_diagnostics(nested_groups(3), &options);

	assert_eq!(blocks.len(), 1);
	let second = &blocks[0].inner_blocks[0];
	assert!(second.inner_blocks.is_empty());
	assert!(second.inner_html.contains("<!-- block:group -->"));
	assert!(second.inner_html.contains("<!-- /block:paragraph -->"));
	assert_eq!(diagnostics.len(), 1);
	assert_eq!(diagnostics[0].line(), 3);
	assert!(matches!(
		&diagnostics[0],
		ParseDiagnostic::DepthLimitExceeded { limit: 2, .. }
	));
}

#[test]
fn deep_nesting_is_bounded_by_default() {
	let (blocks, diagnostics) = parse_with_diagnostics(nested_groups(300), &ParseOptions::default());

	assert_eq!(blocks.len(), 1);
	assert!(
		diagnostics
			.iter()
			.any(|diagnostic| matches!(diagnostic, ParseDiagnostic::DepthLimitExceeded { .. }))
	);
}

#[test]
fn token_limit_leaves_rest_as_text() {
	let options = ParseOptions {
		max_tokens: 2,
		..ParseOptions::default()
	};
	let input = format!("{PARAGRAPH_DOCUMENT}\n\n{PARAGRAPH_DOCUMENT}");
	let (blocks, diagnostics) = parse_with_diagnostics(&input, &options);

	assert_eq!(blocks.len(), 2);
	assert_eq!(blocks[0].block_name.as_deref(), Some(PARAGRAPH));
	assert_eq!(blocks[1], RawBlockNode::freeform(format!("\n\n{PARAGRAPH_DOCUMENT}")));
	assert!(matches!(
		diagnostics.as_slice(),
		[ParseDiagnostic::TokenLimitReached { limit: 2, line: 5, .. }]
	));
}

#[test]
fn custom_default_namespace() {
	let options = ParseOptions {
		default_namespace: "acme".to_string(),
		..ParseOptions::default()
	};
	let (blocks, _) = parse_with_diagnostics("<!-- block:widget /-->", &options);

	assert_eq!(blocks[0].block_name.as_deref(), Some("acme/widget"));
}

#[rstest]
#[case::core_paragraph("<!-- block:core/paragraph -->\n<p>x</p>\n<!-- /block:core/paragraph -->", PARAGRAPH)]
#[case::unregistered_default("<!-- block:gizmo /-->", MISSING)]
#[case::unregistered_core("<!-- block:core/gizmo /-->", MISSING)]
#[case::core_group(
	"<!-- block:core/group -->\n<div class=\"wp-block-group\"><!-- block:core/paragraph -->\n<p>One</p>\n<!-- /block:core/paragraph --></div>\n<!-- /block:core/group -->",
	"core/group"
)]
fn custom_namespace_round_trips(#[case] document: &str, #[case] name: &str) {
	let registry = registry();
	let options = ParseOptions {
		default_namespace: "acme".to_string(),
		..ParseOptions::default()
	};
	let (blocks, _) = parse_and_validate_with(document, &registry, &options);
	let serialized = serialize_with(&blocks, &registry, &options);
	let (reparsed, _) = parse_and_validate_with(&serialized, &registry, &options);

	assert_eq!(names(&blocks), vec![name]);
	assert_eq!(serialized, document);
	assert_eq!(reparsed, blocks);
}

#[test]
fn delimiter_keeps_namespace_outside_the_default() {
	let delimited =
		get_comment_delimited_content_with(PARAGRAPH, &Attributes::new(), "<p>x</p>", "acme");

	assert_eq!(delimited, "<!-- block:core/paragraph -->\n<p>x</p>\n<!-- /block:core/paragraph -->");
	assert_eq!(
		get_comment_delimited_content_with("acme/widget", &Attributes::new(), "", "acme"),
		"<!-- block:widget /-->"
	);
}

#[test]
fn unterminated_comments_scan_in_linear_time() {
	let document = "<!-- ".repeat(20_000);
	let started = Instant::now();
	let blocks = parse(&document);

	assert!(started.elapsed() < Duration::from_secs(2));
	assert_eq!(blocks, vec![RawBlockNode::freeform(document.clone())]);
}

#[test]
fn comment_flood_before_a_delimiter() {
	let prefix = "<!-- ".repeat(20_000);
	let document = format!("{prefix}<!-- block:spacer /-->");
	let started = Instant::now();
	let blocks = parse(&document);

	assert!(started.elapsed() < Duration::from_secs(2));
	assert_eq!(blocks.len(), 2);
	assert_eq!(blocks[0], RawBlockNode::freeform(prefix));
	assert_eq!(blocks[1].block_name.as_deref(), Some("core/spacer"));
}

#[test]
fn nested_unclosed_comments_share_one_close() {
	let document = format!("{}-->", "<!--x".repeat(20_000));
	let started = Instant::now();
	let blocks = parse(&document);

	assert!(started.elapsed() < Duration::from_secs(2));
	assert_eq!(blocks, vec![RawBlockNode::freeform(document.clone())]);
}

#[test]
fn raw_block_serializes_as_json() -> AnyEmptyResult {
	let blocks = parse(r#"<!-- block:spacer {"height":50} /-->"#);
	let value = serde_json::to_value(&blocks[0])?;

	assert_eq!(
		value,
		json!({
			"blockName": "core/spacer",
			"attrs": { "height": 50 },
			"innerBlocks": [],
			"innerHTML": "",
			"innerContent": [],
		})
	);

	Ok(())
}

#[rstest]
#[case::paragraph(PARAGRAPH_DOCUMENT.to_string())]
#[case::group(GROUP_DOCUMENT.to_string())]
#[case::deep_groups(nested_groups(4))]
#[case::mixed(MIXED_DOCUMENT.to_string())]
#[case::custom_class(r#"<!-- block:paragraph {"className":"lead"} -->
<p class="lead">Hi</p>
<!-- /block:paragraph -->"#.to_string())]
#[case::default_spacer("<!-- block:spacer /-->".to_string())]
#[case::quote(r#"<!-- block:quote -->
<blockquote class="wp-block-quote"><p>Quoted</p><cite>Someone</cite></blockquote>
<!-- /block:quote -->"#.to_string())]
#[case::image(r#"<!-- block:image {"id":12,"align":"left"} -->
<figure class="wp-block-image alignleft"><a href="/large.png"><img src="/a.png" alt="An image" class="wp-image-12"/></a><figcaption class="wp-element-caption">A <em>caption</em></figcaption></figure>
<!-- /block:image -->"#.to_string())]
#[case::more(r#"<!-- block:more {"customText":"Keep reading"} -->
<!--more Keep reading-->
<!-- /block:more -->"#.to_string())]
#[case::freeform("Just some <em>text</em>.".to_string())]
fn round_trip_valid_documents(#[case] document: String) {
	let registry = registry();
	let blocks = parse_and_validate(&document, &registry);

	assert!(blocks.iter().all(|block| block.is_valid), "{blocks:#?}");
	assert_eq!(serialize(&blocks, &registry), document);
}

#[rstest]
#[case::mixed(MIXED_DOCUMENT)]
#[case::missing("<!-- block:acme/gizmo {\"size\":2} -->\n<p>Kept</p>\n<!-- /block:acme/gizmo -->")]
#[case::invalid("<!-- block:heading -->\n<h3>Wrong level</h3>\n<!-- /block:heading -->")]
fn serialization_is_idempotent(#[case] document: &str) {
	let registry = registry();
	let once = serialize(&parse_and_validate(document, &registry), &registry);
	let twice = serialize(&parse_and_validate(&once, &registry), &registry);

	assert_eq!(once, twice);
}

#[test]
fn defaults_are_left_out_of_the_delimiter() -> BlockResult<()> {
	let registry = registry();
	let block = create_block(
		&registry,
		"core/heading",
		attributes(json!({ "content": "Title", "level": 2 })),
		vec![],
	)?;

	assert_eq!(block.attributes.get("level"), Some(&json!(2)));
	assert_eq!(
		serialize_block(&block, &registry),
		"<!-- block:heading -->\n<h2>Title</h2>\n<!-- /block:heading -->"
	);

	Ok(())
}

#[rstest]
#[case::same_integer(json!(20), true)]
#[case::float_of_default(json!(20.0), true)]
#[case::different_number(json!(20.5), false)]
#[case::string_of_default(json!("20"), false)]
fn numeric_defaults_match_by_value(#[case] value: Value, #[case] omitted: bool) {
	let schema = AttributeSchema::new().with(
		"height",
		AttributeSchemaEntry::implicit(AttributeType::Number).default_value(20),
	);
	let comment_attributes =
		get_comment_attributes(&schema, &attributes(json!({ "height": value })));

	assert_eq!(comment_attributes.is_empty(), omitted);
}

#[test]
fn create_block_sanitizes_attributes() -> BlockResult<()> {
	let registry = registry();
	let block = create_block(
		&registry,
		PARAGRAPH,
		attributes(json!({ "content": "Hi <em>there</em>", "dropCap": "yes", "unknown": 1 })),
		vec![],
	)?;

	assert_eq!(block.attributes.get("dropCap"), Some(&Value::Bool(false)));
	assert!(!block.attributes.contains_key("unknown"));
	assert_eq!(
		serialize_block(&block, &registry),
		"<!-- block:paragraph -->\n<p>Hi <em>there</em></p>\n<!-- /block:paragraph -->"
	);

	Ok(())
}

#[test]
fn create_block_rejects_unknown_type() {
	let registry = registry();
	let result = create_block(&registry, "acme/nothing", Attributes::new(), vec![]);

	assert!(matches!(result, Err(BlockError::UnknownBlockType(name)) if name == "acme/nothing"));
}

#[test]
fn whitespace_between_blocks_is_dropped() {
	let registry = registry();
	let document = format!("\n\n{PARAGRAPH_DOCUMENT}\n\n   \n{PARAGRAPH_DOCUMENT}\n");
	let blocks = parse_and_validate(&document, &registry);

	assert_eq!(names(&blocks), vec![PARAGRAPH, PARAGRAPH]);
	assert!(parse_and_validate("\n  \n", &registry).is_empty());
}

#[test]
fn freeform_text_becomes_a_freeform_block() {
	let registry = registry();
	let document = "Intro text\n\n<!-- block:separator -->\n<hr class=\"wp-block-separator\"/>\n<!-- /block:separator -->";
	let blocks = parse_and_validate(document, &registry);

	assert_eq!(names(&blocks), vec!["core/freeform", "core/separator"]);
	assert_eq!(blocks[0].attributes.get("content"), Some(&json!("Intro text")));
	assert_eq!(serialize(&blocks, &registry), document);
}

#[test]
fn paragraph_attributes_are_resolved() {
	let registry = registry();
	let blocks = parse_and_validate(MIXED_DOCUMENT, &registry);
	let paragraph = &blocks[1];

	assert_eq!(paragraph.attributes.get("align"), Some(&json!("center")));
	assert_eq!(paragraph.attributes.get("dropCap"), Some(&json!(true)));
	let content = paragraph
		.attributes
		.get("content")
		.and_then(RichText::from_value)
		.unwrap_or_default();
	assert_eq!(content.text, "Some bold text.");
	assert_eq!(content.formats[0].tag, "strong");
	assert_eq!((content.formats[0].start, content.formats[0].end), (5, 9));
}

#[test]
fn walk_visits_parents_first() {
	let registry = registry();
	let blocks = parse_and_validate(nested_groups(2), &registry);
	let visited: Vec<&str> = blocks[0].walk().iter().map(|block| block.name.as_str()).collect();

	assert_eq!(visited, vec!["core/group", "core/group", PARAGRAPH]);
}

#[test]
fn invalid_block_is_preserved_verbatim() {
	let registry = registry();
	let document = "<!-- block:heading -->\n<h3>Wrong level</h3>\n<!-- /block:heading -->";
	let blocks = parse_and_validate(document, &registry);

	assert!(!blocks[0].is_valid);
	assert!(blocks[0].raw_source.is_some());
	let last = blocks[0].validation_issues.last().cloned();
	assert!(matches!(
		last,
		Some(ValidationIssue { severity: Severity::Error, message, .. })
			if message == "block validation failed for `core/heading`"
	));
	assert_eq!(serialize(&blocks, &registry), document);
}

#[test]
fn render_errors_make_blocks_invalid() {
	let registry = registry();
	let document =
		"<!-- block:heading {\"level\":9} -->\n<h9>Nine</h9>\n<!-- /block:heading -->";
	let blocks = parse_and_validate(document, &registry);

	assert!(!blocks[0].is_valid);
	assert!(matches!(
		blocks[0].validation_issues.first(),
		Some(ValidationIssue { severity: Severity::Error, .. })
	));
	assert_eq!(serialize(&blocks, &registry), document);
}

#[test]
fn unregistered_block_is_wrapped_in_missing() {
	let registry = registry();
	let document = "<!-- block:acme/gizmo {\"size\":2} -->\n<p>Kept</p>\n<!-- /block:acme/gizmo -->";
	let blocks = parse_and_validate(document, &registry);

	assert_eq!(names(&blocks), vec![MISSING]);
	assert!(blocks[0].is_valid);
	assert_eq!(blocks[0].attributes.get("originalName"), Some(&json!("acme/gizmo")));
	assert_eq!(
		blocks[0].attributes.get("originalUndelimitedContent"),
		Some(&json!("\n<p>Kept</p>\n"))
	);
	assert_eq!(blocks[0].attributes.get("originalContent"), Some(&json!(document)));
	assert_eq!(serialize(&blocks, &registry), document);
}

#[test]
fn custom_class_is_recovered() {
	let registry = registry();
	let blocks = parse_and_validate(
		"<!-- block:paragraph -->\n<p class=\"lead\">Hi</p>\n<!-- /block:paragraph -->",
		&registry,
	);

	assert!(blocks[0].is_valid);
	assert_eq!(blocks[0].attributes.get("className"), Some(&json!("lead")));
	assert_eq!(
		serialize(&blocks, &registry),
		"<!-- block:paragraph {\"className\":\"lead\"} -->\n<p class=\"lead\">Hi</p>\n<!-- /block:paragraph -->"
	);
}

#[test]
fn paragraph_inline_alignment_is_migrated() {
	let registry = registry();
	let blocks = parse_and_validate(
		"<!-- block:paragraph {\"align\":\"center\"} -->\n<p style=\"text-align:center\">Hi</p>\n<!-- /block:paragraph -->",
		&registry,
	);

	assert!(blocks[0].is_valid);
	assert!(blocks[0].raw_source.is_none());
	assert_eq!(
		serialize(&blocks, &registry),
		"<!-- block:paragraph {\"align\":\"center\"} -->\n<p class=\"has-text-align-center\">Hi</p>\n<!-- /block:paragraph -->"
	);
}

#[test]
fn quote_style_is_migrated_to_class_name() {
	let registry = registry();
	let blocks = parse_and_validate(
		"<!-- block:quote {\"style\":2} -->\n<blockquote class=\"blocks-quote-style-2\"><p>Quoted</p><cite>Someone</cite></blockquote>\n<!-- /block:quote -->",
		&registry,
	);

	assert!(blocks[0].is_valid);
	assert!(!blocks[0].attributes.contains_key("style"));
	assert_eq!(blocks[0].attributes.get("className"), Some(&json!("is-style-large")));
	assert_eq!(
		serialize(&blocks, &registry),
		"<!-- block:quote {\"className\":\"is-style-large\"} -->\n<blockquote class=\"wp-block-quote is-style-large\"><p>Quoted</p><cite>Someone</cite></blockquote>\n<!-- /block:quote -->"
	);
}

#[test]
fn image_caption_class_is_migrated() {
	let registry = registry();
	let blocks = parse_and_validate(
		"<!-- block:image -->\n<figure class=\"wp-block-image\"><img src=\"/a.png\" alt=\"\"/><figcaption>Old</figcaption></figure>\n<!-- /block:image -->",
		&registry,
	);

	assert!(blocks[0].is_valid);
	assert_eq!(
		serialize(&blocks, &registry),
		"<!-- block:image -->\n<figure class=\"wp-block-image\"><img src=\"/a.png\" alt=\"\"/><figcaption class=\"wp-element-caption\">Old</figcaption></figure>\n<!-- /block:image -->"
	);
}

#[rstest]
#[case::current("note", None)]
#[case::newest_deprecation("note-v2", Some("v2"))]
#[case::first_matching_variant_wins("note-v1", Some("v1"))]
fn deprecated_variants_are_tried_in_order(#[case] class: &str, #[case] expected: Option<&str>) {
	let registry = note_registry();
	let blocks = parse_and_validate(note_document(class, "Hi"), &registry);

	assert!(blocks[0].is_valid);
	assert_eq!(
		blocks[0].attributes.get("migratedFrom").and_then(Value::as_str),
		expected
	);
	assert_eq!(blocks[0].attributes.get("text"), Some(&json!("Hi")));
	assert_eq!(serialize(&blocks, &registry), note_document("note", "Hi"));
}

#[test]
fn eligible_variant_migrates_valid_block() {
	let registry = note_registry();
	let blocks = parse_and_validate(
		"<!-- block:test/note {\"legacy\":true} -->\n<div class=\"note\">Hi</div>\n<!-- /block:test/note -->",
		&registry,
	);

	assert!(blocks[0].is_valid);
	assert_eq!(blocks[0].attributes.get("migratedFrom"), Some(&json!("legacy")));
}

#[test]
fn block_stays_invalid_when_no_variant_matches() {
	let registry = note_registry();
	let document = note_document("note-v0", "Hi");
	let blocks = parse_and_validate(&document, &registry);

	assert!(!blocks[0].is_valid);
	assert!(!blocks[0].attributes.contains_key("migratedFrom"));
	assert_eq!(serialize(&blocks, &registry), document);
}

#[rstest]
#[case::identical("<p>x</p>", "<p>x</p>", true)]
#[case::class_order(r#"<p class="a b">x</p>"#, r#"<p class="b a">x</p>"#, true)]
#[case::whitespace_between_tags("<div>\n\t<p>x</p>\n</div>", "<div><p>x</p></div>", true)]
#[case::zero_length_units(r#"<div style="margin:0px"></div>"#, r#"<div style="margin:0"></div>"#, true)]
#[case::style_spacing(r#"<p style="color: red;">x</p>"#, r#"<p style="color:red">x</p>"#, true)]
#[case::self_closing_void(r#"<img src="a.png">"#, r#"<img src="a.png"/>"#, true)]
#[case::attribute_order(r#"<a href="x" title="y">l</a>"#, r#"<a title="y" href="x">l</a>"#, true)]
#[case::empty_attribute(r#"<p id="">x</p>"#, "<p>x</p>", true)]
#[case::boolean_attribute("<ol reversed></ol>", r#"<ol reversed="reversed"></ol>"#, true)]
#[case::collapsed_text("<p>a  b</p>", "<p>a b</p>", true)]
#[case::collapsed_edges("<p>a\n\t b </p>", "<p>a b </p>", true)]
#[case::leading_space_in_text("<p> a</p>", "<p>a</p>", false)]
#[case::trailing_space_in_text("<p>a</p>", "<p>a </p>", false)]
#[case::character_references("<p>&amp;</p>", "<p>&#38;</p>", true)]
#[case::different_text("<p>x</p>", "<p>y</p>", false)]
#[case::different_tag("<p>x</p>", "<div>x</div>", false)]
#[case::extra_class(r#"<p class="a b">x</p>"#, r#"<p class="a">x</p>"#, false)]
#[case::different_style(r#"<p style="color:red">x</p>"#, r#"<p style="color:blue">x</p>"#, false)]
#[case::missing_content("<p>x</p>", "<p>x</p><p>y</p>", false)]
#[case::extra_content("<p>x</p><p>y</p>", "<p>x</p>", false)]
fn html_equivalence(#[case] actual: &str, #[case] expected: &str, #[case] equivalent: bool) {
	assert_eq!(is_equivalent_html(actual, expected), equivalent);
}

#[test]
fn equivalence_describes_first_difference() {
	let (is_valid, issues) = is_equivalent_html_with_issues("<p>x</p>", "<p>y</p>");

	assert!(!is_valid);
	assert_eq!(issues, vec![ValidationIssue::warning(
		"expected text `y`, saw `x`",
		vec!["y".to_string(), "x".to_string()],
	)]);
}

#[rstest]
#[case::zero_pixels("0px", "0")]
#[case::zero_decimal("0.0em", "0")]
#[case::leading_dot(".5em", "0.5em")]
#[case::quoted_url("url('a.png')", "url(a.png)")]
#[case::untouched("10px solid", "10px solid")]
fn style_values_are_normalized(#[case] value: &str, #[case] expected: &str) {
	assert_eq!(normalize_style_value(value), expected);
}

#[test]
fn tokenize_html_fragment() {
	let tokens = html_tokens(r#"<p class="a">Hi &amp; bye<br/></p><!-- c -->"#);

	assert_eq!(tokens, vec![
		HtmlToken::StartTag {
			name: "p".to_string(),
			attributes: vec![HtmlAttribute {
				name: "class".to_string(),
				value: "a".to_string(),
				quoted: true,
			}],
			self_closing: false,
		},
		HtmlToken::Chars("Hi & bye".to_string()),
		HtmlToken::StartTag {
			name: "br".to_string(),
			attributes: vec![],
			self_closing: true,
		},
		HtmlToken::EndTag {
			name: "p".to_string(),
		},
		HtmlToken::Comment(" c ".to_string()),
	]);
}

#[test]
fn xml_entities_keep_unknown_references() {
	let tokens = HtmlTokenizer::with_entities("&nbsp;&amp;", &XmlEntities).tokenize();

	assert_eq!(tokens.len(), 1);
	assert_eq!(tokens[0].token, HtmlToken::Chars("&nbsp;&".to_string()));
}

#[test]
fn dom_closes_implied_elements() {
	let dom = Dom::parse("<p>a<p>b<ul><li>one<li>two</ul>");
	let root = dom.root();
	let children = dom.element_children(root);

	assert_eq!(children.len(), 3);
	assert!(dom.is_element_named(children[2], "ul"));
	assert_eq!(dom.element_children(children[2]).len(), 2);
	assert_eq!(dom.text_content(children[1]), "b");
}

#[test]
fn dom_depth_limit_swallows_flattened_end_tags() {
	let dom = Dom::parse_with_depth("<div><div><div>x</div>y</div>z</div>", 2);
	let root = dom.root();

	assert_eq!(dom.children(root).len(), 1);
	let outer = dom.children(root)[0];
	let children = dom.children(outer);
	assert_eq!(children.len(), 2);
	assert!(dom.is_element_named(children[0], "div"));
	assert!(dom.node(children[1]).is_text());
	assert_eq!(dom.text_content(children[0]), "xy");
	assert_eq!(dom.text_content(children[1]), "z");
}

#[test]
fn dom_slices_unchanged_source() {
	let dom = Dom::parse("<p class='x'>Hi <b>there</b></p>");
	let Some(paragraph) = dom.first_element() else {
		panic!("expected an element");
	};

	assert_eq!(dom.outer_html(paragraph), "<p class='x'>Hi <b>there</b></p>");
	assert_eq!(dom.inner_html(paragraph), "Hi <b>there</b>");
	assert_eq!(dom.classes(paragraph), vec!["x"]);
}

#[test]
fn dom_mutations_serialize() {
	let mut dom = Dom::parse("<div><span>text</span></div>");
	let root = dom.root();
	let Some(div) = dom.first_element() else {
		panic!("expected an element");
	};
	let span = dom.element_children(div)[0];

	dom.rename(span, "em");
	dom.wrap(span, "strong");
	dom.unwrap(div);
	let paragraph = dom.create_element("p");
	dom.append(root, paragraph);
	dom.set_attribute(paragraph, "class", "last");

	assert_eq!(dom.to_html(), "<strong><em>text</em></strong><p class=\"last\"></p>");
}

#[rstest]
#[case::tag("img", "<img src=\"a\">")]
#[case::child("figure > a", "<a href=\"/\"><img src=\"a\"></a>")]
#[case::descendant("figure img", "<img src=\"a\">")]
#[case::class(".caption", "<figcaption class=\"caption\">c</figcaption>")]
#[case::attribute_value("[href=\"/\"]", "<a href=\"/\"><img src=\"a\"></a>")]
#[case::list("h1, figcaption", "<figcaption class=\"caption\">c</figcaption>")]
fn selector_finds_first_match(#[case] selector: &str, #[case] expected: &str) -> BlockResult<()> {
	let dom = Dom::parse(
		"<figure><a href=\"/\"><img src=\"a\"></a><figcaption class=\"caption\">c</figcaption></figure>",
	);
	let selector = Selector::parse(selector)?;
	let found = selector.select_first(&dom, dom.root()).map(|id| dom.outer_html(id));

	assert_eq!(found.as_deref(), Some(expected));

	Ok(())
}

#[test]
fn child_selector_requires_direct_parent() -> BlockResult<()> {
	let dom = Dom::parse("<figure><div><a href=\"/\">x</a></div></figure>");
	let selector = Selector::parse("figure > a")?;

	assert_eq!(selector.select_first(&dom, dom.root()), None);

	Ok(())
}

#[rstest]
#[case::empty("")]
#[case::dangling_child("figure >")]
#[case::leading_child("> a")]
#[case::unterminated_attribute("[href")]
#[case::unsupported_pseudo("a:hover")]
fn invalid_selectors(#[case] selector: &str) {
	assert!(matches!(
		Selector::parse(selector),
		Err(BlockError::InvalidSelector { .. })
	));
}

#[rstest]
#[case::attribute(
	AttributeSchemaEntry::html_attribute("img", "src"),
	"<figure><img src=\"a.png\"></figure>",
	json!("a.png")
)]
#[case::boolean_attribute(
	AttributeSchemaEntry::new(AttributeSource::Attribute { name: "reversed".to_string() })
		.selector("ol")
		.typed(AttributeType::Boolean),
	"<ol reversed><li>a</li></ol>",
	json!(true)
)]
#[case::node_name(
	AttributeSchemaEntry::new(AttributeSource::Property { name: "nodeName".to_string() }),
	"<h2>x</h2>",
	json!("H2")
)]
#[case::tag_name(
	AttributeSchemaEntry::new(AttributeSource::TagName),
	"<section>x</section>",
	json!("section")
)]
#[case::text(
	AttributeSchemaEntry::new(AttributeSource::TextContent).selector("cite"),
	"<blockquote><p>q</p><cite>A <b>B</b></cite></blockquote>",
	json!("A B")
)]
#[case::inner_html(
	AttributeSchemaEntry::new(AttributeSource::InnerHtml { multiline: None }).selector("p"),
	"<p>a <em>b</em></p>",
	json!("a <em>b</em>")
)]
#[case::multiline(
	AttributeSchemaEntry::new(AttributeSource::InnerHtml { multiline: Some("li".to_string()) })
		.selector("ul"),
	"<ul><li>a</li>\n<li>b</li></ul>",
	json!("<li>a</li><li>b</li>")
)]
#[case::children(
	AttributeSchemaEntry::new(AttributeSource::Children).selector("p"),
	"<p>a<em class=\"x\">b</em><!-- c --></p>",
	json!(["a", { "type": "em", "props": { "class": "x", "children": ["b"] } }])
)]
#[case::sub_query(
	AttributeSchemaEntry::new(AttributeSource::SubQuery {
		schema: AttributeSchema::new().with(
			"url",
			AttributeSchemaEntry::new(AttributeSource::Attribute { name: "src".to_string() }),
		),
	})
	.selector("img"),
	"<div><img src=\"a\"><img src=\"b\"></div>",
	json!([{ "url": "a" }, { "url": "b" }])
)]
fn attribute_sources(
	#[case] entry: AttributeSchemaEntry,
	#[case] html: &str,
	#[case] expected: Value,
) {
	assert_eq!(parse_with_attribute_schema(html, &entry), Some(expected));
}

#[test]
fn block_attributes_apply_types_and_defaults() {
	let registry = registry();
	let Some(paragraph) = registry.lookup(PARAGRAPH) else {
		panic!("paragraph is registered");
	};
	let resolved = get_block_attributes(
		&paragraph,
		"<p>Hi</p>",
		&attributes(json!({ "align": "left", "dropCap": "yes", "bogus": 1 })),
	);

	assert_eq!(resolved.get("align"), Some(&json!("left")));
	assert_eq!(resolved.get("dropCap"), Some(&json!(false)));
	assert!(!resolved.contains_key("bogus"));
	assert_eq!(
		resolved.get("content"),
		Some(&json!({ "text": "Hi", "formats": [] }))
	);
}

#[test]
fn enum_values_reject_unknown_values() {
	let entry = AttributeSchemaEntry::implicit(AttributeType::String)
		.enum_values(vec![json!("small"), json!("large")])
		.default_value("small");
	let block_type = BlockType::new("acme/sized", |_| Ok(String::new()))
		.with_attributes(AttributeSchema::new().with("size", entry));

	let resolved = get_block_attributes(&block_type, "", &attributes(json!({ "size": "huge" })));

	assert_eq!(resolved.get("size"), Some(&json!("small")));
}

#[test]
fn rich_text_keeps_formats_apart() {
	let value = RichText::from_html("Hello <strong>world</strong><br>again");

	assert_eq!(value.text, format!("Hello world{LINE_SEPARATOR}again"));
	assert_eq!(value.formats, vec![FormatSpan {
		tag: "strong".to_string(),
		start: 6,
		end: 11,
		attributes: Attributes::new(),
	}]);
	assert_eq!(value.to_html(), "Hello <strong>world</strong><br>again");
}

#[test]
fn rich_text_objects_and_links() {
	let value = RichText::from_html("A<img src=\"x.png\">B <a href=\"/y\">link</a> &amp; more");

	assert_eq!(value.text, format!("A{OBJECT_REPLACEMENT_CHARACTER}B link & more"));
	assert_eq!(value.formats[0].tag, "img");
	assert_eq!(value.formats[1].attributes.get("href"), Some(&json!("/y")));
	assert_eq!(
		value.to_html(),
		"A<img src=\"x.png\">B <a href=\"/y\">link</a> &amp; more"
	);
}

#[test]
fn rich_text_splits_overlapping_formats() {
	let span = |tag: &str, start, end| {
		FormatSpan {
			tag: tag.to_string(),
			start,
			end,
			attributes: Attributes::new(),
		}
	};
	let value = RichText {
		text: "abcd".to_string(),
		formats: vec![span("strong", 0, 3), span("em", 1, 4)],
	};

	assert_eq!(value.to_html(), "<strong>a<em>bc</em></strong><em>d</em>");
}

#[test]
fn rich_text_renders_many_formats_in_one_pass() {
	let length = 20_000;
	let value = RichText {
		text: "x".repeat(length),
		formats: (0..length)
			.map(|start| {
				FormatSpan {
					tag: "em".to_string(),
					start,
					end: start + 1,
					attributes: Attributes::new(),
				}
			})
			.collect(),
	};
	let started = Instant::now();
	let html = value.to_html();

	assert!(started.elapsed() < Duration::from_secs(2));
	assert_eq!(html, "<em>x</em>".repeat(length));
}

#[test]
fn rich_text_drops_empty_formats() {
	let value = RichText::from_html("a<em></em>b");

	assert_eq!(value.text, "ab");
	assert!(value.formats.is_empty());
}

#[test]
fn delimiter_attributes_are_escaped() {
	insta::assert_snapshot!(
		serialize_attributes(&attributes(json!({ "a": "<b>&</b>" }))),
		@r#"{"a":"\u003cb\u003e\u0026\u003c/b\u003e"}"#
	);
	insta::assert_snapshot!(
		serialize_attributes(&attributes(json!({ "a": "x--y", "b": "say \"hi\"" }))),
		@r#"{"a":"x\u002d\u002dy","b":"say \u0022hi\u0022"}"#
	);
}

#[test]
fn escaped_attributes_parse_back() {
	let original = attributes(json!({ "text": "<!-- a --> & \"b\"" }));
	let document = get_comment_delimited_content("acme/widget", &original, "");
	let blocks = parse(&document);

	assert_eq!(blocks.len(), 1);
	assert_eq!(blocks[0].attrs, original);
}

#[rstest]
#[case::void("acme/widget", "", "<!-- block:acme/widget /-->")]
#[case::core_namespace("core/paragraph", "<p>x</p>", "<!-- block:paragraph -->\n<p>x</p>\n<!-- /block:paragraph -->")]
fn comment_delimited_content(#[case] name: &str, #[case] content: &str, #[case] expected: &str) {
	assert_eq!(
		get_comment_delimited_content(name, &Attributes::new(), content),
		expected
	);
}

#[rstest]
#[case::merged(r#"<p class="a">x</p>"#, "b a", r#"<p class="a b">x</p>"#)]
#[case::added("<hr/>", "c", r#"<hr class="c"/>"#)]
#[case::first_element_only("<p>x</p><p>y</p>", "z", r#"<p class="z">x</p><p>y</p>"#)]
fn class_names_are_injected(#[case] html: &str, #[case] class_name: &str, #[case] expected: &str) {
	assert_eq!(inject_class_name(html, class_name), expected);
}

#[rstest]
#[case::core("core/paragraph", true)]
#[case::plugin("my-plugin/block_2", true)]
#[case::no_namespace("paragraph", false)]
#[case::uppercase("Core/Paragraph", false)]
#[case::leading_digit("core/2col", false)]
#[case::extra_segment("a/b/c", false)]
fn block_name_validation(#[case] name: &str, #[case] valid: bool) {
	assert_eq!(BlockType::validate_name(name).is_ok(), valid);
}

#[test]
fn registry_replaces_types_by_name() -> BlockResult<()> {
	let mut registry = registry();
	let count = registry.len();

	registry.try_register(BlockType::new(PARAGRAPH, |_| Ok("<p></p>".to_string())))?;
	assert_eq!(registry.len(), count);

	registry.try_register(note_block_type())?;
	assert_eq!(registry.len(), count + 1);

	let result = registry.try_register(BlockType::new("Not Valid", |_| Ok(String::new())));
	assert!(matches!(result, Err(BlockError::InvalidBlockName(_))));

	Ok(())
}

#[test]
fn parse_shortcode_attribute_forms() {
	let (named, numeric) = parse_shortcode_attributes(r#"id="a" Width=300 title='T x' 'pos' bare"#);

	assert_eq!(named, vec![
		("id".to_string(), "a".to_string()),
		("width".to_string(), "300".to_string()),
		("title".to_string(), "T x".to_string()),
	]);
	assert_eq!(numeric, vec!["pos".to_string(), "bare".to_string()]);
}

#[rstest]
#[case::single("See [gallery ids=\"1,2\"] here", ShortcodeKind::Single, None)]
#[case::self_closing("[gallery src=\"a\" /]", ShortcodeKind::SelfClosing, None)]
#[case::closed("[gallery]Inner[/gallery] after", ShortcodeKind::Closed, Some("Inner"))]
fn find_shortcodes(#[case] text: &str, #[case] kind: ShortcodeKind, #[case] content: Option<&str>) {
	let Some(found) = next_shortcode("gallery", text, 0) else {
		panic!("expected a shortcode in {text}");
	};

	assert_eq!(found.shortcode.kind, kind);
	assert_eq!(found.shortcode.content.as_deref(), content);
	assert!(text[found.span.clone()].starts_with("[gallery"));
	assert!(text[found.span].ends_with(']'));
}

#[rstest]
#[case::escaped("[[gallery]]")]
#[case::longer_tag("[gallery-grid]")]
#[case::other_tag("[caption]x[/caption]")]
fn skip_non_matching_shortcodes(#[case] text: &str) {
	assert_eq!(next_shortcode("gallery", text, 0), None);
}

#[test]
fn shortcode_display_round_trips() {
	let Some(found) = next_shortcode("gallery", "[gallery ids=\"1,2\" large]", 0) else {
		panic!("expected a shortcode");
	};

	assert_eq!(found.shortcode.attribute("ids"), Some("1,2"));
	assert_eq!(found.shortcode.to_string(), "[gallery ids=\"1,2\" large]");
}

fn filtered(html: &str) -> String {
	let mut dom = Dom::parse(html);
	filter_html(&mut dom);
	dom.to_html()
}

#[rstest]
#[case::scripts_removed("<p>Hi</p><script>alert(1)</script>", "<p>Hi</p>")]
#[case::attributes_stripped(r#"<p class="x" style="color:red">Hi</p>"#, "<p>Hi</p>")]
#[case::unknown_unwrapped("<div><section><p>Hi</p></section></div>", "<p>Hi</p>")]
#[case::bold_and_italic("<p><b>a</b><i>b</i></p>", "<p><strong>a</strong><em>b</em></p>")]
#[case::google_docs(
	r#"<b id="docs-internal-guid-123"><p>Doc <span style="font-weight:700">bold</span></p></b>"#,
	"<p>Doc <strong>bold</strong></p>"
)]
#[case::bullets("<p>• One</p><p>• Two</p>", "<ul><li>One</li><li>Two</li></ul>")]
#[case::office_list(
	r#"<p style="mso-list:l0 level1 lfo1"><span>1.</span>First</p><p style="mso-list:l0 level1 lfo1"><span>2.</span>Second</p>"#,
	"<ol><li>First</li><li>Second</li></ol>"
)]
#[case::single_item_lists_merge("<ul><li>a</li></ul><ul><li>b</li></ul>", "<ul><li>a</li><li>b</li></ul>")]
#[case::blank_target(
	r#"<p><a href="/x" target="_blank">x</a></p>"#,
	r#"<p><a href="/x" target="_blank" rel="noreferrer noopener">x</a></p>"#
)]
#[case::same_window(r#"<p><a href="/x" target="_self" rel="me">x</a></p>"#, r#"<p><a href="/x">x</a></p>"#)]
#[case::lone_image(r#"<p><img src="a.png"></p>"#, r#"<p><figure><img src="a.png"></figure></p>"#)]
#[case::comments_removed("<p>a<!-- note -->b</p>", "<p>ab</p>")]
fn html_filters(#[case] html: &str, #[case] expected: &str) {
	assert_eq!(filtered(html), expected);
}

#[test]
fn more_comment_splits_paragraph() {
	assert_eq!(
		filtered("<p>Before<!--more Read on-->After</p>"),
		"<p>Before</p><block-marker data-block=\"core/more\" data-custom-text=\"Read on\"></block-marker><p>After</p>"
	);
}

#[test]
fn loose_content_is_gathered_into_paragraphs() {
	let mut dom = Dom::parse("Loose <em>text</em><br><br>Next<h2>Head</h2>tail<p></p>");
	let root = dom.root();
	normalize_blocks(&mut dom, root);

	assert_eq!(
		dom.to_html(),
		"<p>Loose <em>text</em></p><p>Next</p><h2>Head</h2><p>tail</p>"
	);
}

#[test]
fn ingest_paragraphs() {
	let registry = registry();
	let blocks = ingest_raw_html("<p>One</p><p>Two</p>", &registry, &IngestOptions::default());

	assert_eq!(
		serialize(&blocks, &registry),
		"<!-- block:paragraph -->\n<p>One</p>\n<!-- /block:paragraph -->\n\n<!-- block:paragraph -->\n<p>Two</p>\n<!-- /block:paragraph -->"
	);
}

#[rstest]
#[case::heading("<h3>Title</h3>", "<!-- block:heading {\"level\":3} -->\n<h3>Title</h3>\n<!-- /block:heading -->")]
#[case::aligned_heading(
	"<h2 style=\"text-align:center\">Title</h2>",
	"<!-- block:heading {\"textAlign\":\"center\"} -->\n<h2 class=\"has-text-align-center\">Title</h2>\n<!-- /block:heading -->"
)]
#[case::list("<ul><li>A</li><li>B</li></ul>", "<!-- block:list -->\n<ul><li>A</li><li>B</li></ul>\n<!-- /block:list -->")]
#[case::ordered_list(
	"<ol start=\"2\"><li>A</li></ol>",
	"<!-- block:list {\"ordered\":true,\"start\":2} -->\n<ol start=\"2\"><li>A</li></ol>\n<!-- /block:list -->"
)]
#[case::separator("<hr>", "<!-- block:separator -->\n<hr class=\"wp-block-separator\"/>\n<!-- /block:separator -->")]
#[case::table_fallback(
	"<table><tr><td>x</td></tr></table>",
	"<!-- block:html -->\n<table><tr><td>x</td></tr></table>\n<!-- /block:html -->"
)]
#[case::shortcode(
	"<p>[gallery ids=\"1,2\"]</p>",
	"<!-- block:shortcode -->\n[gallery ids=\"1,2\"]\n<!-- /block:shortcode -->"
)]
#[case::image(
	"<img src=\"/a.png\" alt=\"A\">",
	"<!-- block:image -->\n<figure class=\"wp-block-image\"><img src=\"/a.png\" alt=\"A\"/></figure>\n<!-- /block:image -->"
)]
#[case::nextpage("<p>One</p><!--nextpage--><p>Two</p>", "<!-- block:paragraph -->\n<p>One</p>\n<!-- /block:paragraph -->\n\n<!-- block:nextpage -->\n<!--nextpage-->\n<!-- /block:nextpage -->\n\n<!-- block:paragraph -->\n<p>Two</p>\n<!-- /block:paragraph -->")]
fn ingest_elements(#[case] html: &str, #[case] expected: &str) {
	let registry = registry();
	let blocks = ingest_raw_html(html, &registry, &IngestOptions::default());

	assert_eq!(serialize(&blocks, &registry), expected);
}

#[test]
fn ingest_more_comment() {
	let registry = registry();
	let blocks = ingest_raw_html(
		"<p>Intro</p><!--more Read on--><!--noteaser--><p>Rest</p>",
		&registry,
		&IngestOptions::default(),
	);

	assert_eq!(names(&blocks), vec![PARAGRAPH, "core/more", PARAGRAPH]);
	assert_eq!(blocks[1].attributes.get("customText"), Some(&json!("Read on")));
	assert_eq!(blocks[1].attributes.get("noTeaser"), Some(&json!(true)));
	assert_eq!(
		serialize_block(&blocks[1], &registry),
		"<!-- block:more {\"customText\":\"Read on\",\"noTeaser\":true} -->\n<!--more Read on-->\n<!--noteaser-->\n<!-- /block:more -->"
	);
}

#[test]
fn ingest_caption_shortcode() {
	let registry = registry();
	let blocks = ingest_raw_html(
		"[caption id=\"attachment_7\" align=\"alignleft\"]<img src=\"a.jpg\" alt=\"A\" /> A caption[/caption]",
		&registry,
		&IngestOptions::default(),
	);

	assert_eq!(names(&blocks), vec![IMAGE]);
	assert_eq!(blocks[0].attributes.get("id"), Some(&json!(7)));
	assert_eq!(blocks[0].attributes.get("align"), Some(&json!("left")));
	assert_eq!(blocks[0].attributes.get("url"), Some(&json!("a.jpg")));
	assert_eq!(
		serialize(&blocks, &registry),
		"<!-- block:image {\"id\":7,\"align\":\"left\"} -->\n<figure class=\"wp-block-image alignleft\"><img src=\"a.jpg\" alt=\"A\" class=\"wp-image-7\"/><figcaption class=\"wp-element-caption\">A caption</figcaption></figure>\n<!-- /block:image -->"
	);
}

#[test]
fn ingest_keeps_inline_shortcodes_in_text() {
	let registry = registry();
	let blocks = ingest_raw_html(
		"<p>Text [caption]plain[/caption] more</p>",
		&registry,
		&IngestOptions::default(),
	);

	assert_eq!(names(&blocks), vec![PARAGRAPH]);
}

#[test]
fn ingest_markdown() {
	let registry = registry();
	let Ingested::Blocks(blocks) = ingest(
		"# Title\n\nSome *text*.\n\n- one\n- two",
		&registry,
		&IngestOptions::default(),
	) else {
		panic!("expected blocks");
	};

	assert_eq!(names(&blocks), vec!["core/heading", PARAGRAPH, "core/list"]);
	assert_eq!(blocks[0].attributes.get("level"), Some(&json!(1)));
	assert_eq!(
		serialize_block(&blocks[1], &registry),
		"<!-- block:paragraph -->\n<p>Some <em>text</em>.</p>\n<!-- /block:paragraph -->"
	);
}

#[test]
fn ingest_without_markdown_keeps_text() {
	let registry = registry();
	let options = IngestOptions {
		markdown: false,
		..IngestOptions::default()
	};
	let blocks = ingest_raw_html("# Not a heading", &registry, &options);

	assert_eq!(names(&blocks), vec![PARAGRAPH]);
}

#[test]
fn ingest_parses_existing_delimiters() {
	let registry = registry();
	let blocks = ingest_raw_html(MIXED_DOCUMENT, &registry, &IngestOptions::default());

	assert_eq!(serialize(&blocks, &registry), MIXED_DOCUMENT);
}

#[test]
fn ingest_strips_clipboard_boilerplate() {
	assert_eq!(
		strip_boilerplate(
			"<html><head><meta charset=\"utf-8\"><title>x</title></head><body><!--StartFragment--><p>Hi</p><!--EndFragment--></body></html>"
		),
		"<p>Hi</p>"
	);
}

#[rstest]
#[case::auto_inline(IngestMode::Auto, "Some <b>bold</b> text", Ingested::Inline("Some <strong>bold</strong> text".to_string()))]
#[case::forced_inline(IngestMode::Inline, "<p>One <i>two</i></p>", Ingested::Inline("One <em>two</em>".to_string()))]
fn ingest_inline(#[case] mode: IngestMode, #[case] input: &str, #[case] expected: Ingested) {
	let registry = registry();
	let options = IngestOptions {
		mode,
		..IngestOptions::default()
	};

	assert_eq!(ingest(input, &registry, &options), expected);
}

#[test]
fn forced_blocks_mode_builds_paragraph() {
	let registry = registry();
	let options = IngestOptions {
		mode: IngestMode::Blocks,
		..IngestOptions::default()
	};
	let Ingested::Blocks(blocks) = ingest("Some <b>bold</b> text", &registry, &options) else {
		panic!("expected blocks");
	};

	assert_eq!(
		serialize(&blocks, &registry),
		"<!-- block:paragraph -->\n<p>Some <strong>bold</strong> text</p>\n<!-- /block:paragraph -->"
	);
}

#[test]
fn config_from_toml() -> BlockResult<()> {
	let config = EngineConfig::from_toml(
		"[parser]\nmax_depth = 8\n\n[ingest]\nmode = \"inline\"\nmarkdown = false\n",
	)?;

	assert_eq!(config.parser.max_depth, 8);
	assert_eq!(config.parser.default_namespace, "core");
	assert_eq!(config.parser.max_tokens, DEFAULT_MAX_TOKENS);
	assert_eq!(config.ingest.mode, IngestMode::Inline);
	assert!(!config.ingest.markdown);
	assert!(config.ingest.shortcodes);

	let parse_options = ParseOptions::from_config(Some(&config));
	assert_eq!(parse_options.max_depth, 8);
	let ingest_options = IngestOptions::from_config(Some(&config));
	assert_eq!(ingest_options.mode, IngestMode::Inline);
	assert_eq!(ingest_options.parse.max_depth, 8);

	Ok(())
}

#[test]
fn config_depth_is_at_least_one() -> BlockResult<()> {
	let config = EngineConfig::from_toml("[parser]\nmax_depth = 0\n")?;

	assert_eq!(ParseOptions::from_config(Some(&config)).max_depth, 1);

	Ok(())
}

#[test]
fn invalid_config_is_an_error() {
	let result = EngineConfig::from_toml("[parser]\nmax_depth = \"deep\"\n");

	assert!(matches!(result, Err(BlockError::ConfigParse(_))));
}

#[test]
fn config_is_discovered() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	assert!(EngineConfig::load(tmp.path())?.is_none());

	std::fs::write(
		tmp.path().join(".blockgram.toml"),
		"[parser]\ndefault_namespace = \"acme\"\n",
	)?;
	let Some(config) = EngineConfig::load(tmp.path())? else {
		panic!("expected a config");
	};

	assert_eq!(config.parser.default_namespace, "acme");
	assert_eq!(
		EngineConfig::resolve_path(tmp.path()),
		Some(tmp.path().join(".blockgram.toml"))
	);

	Ok(())
}

#[test]
#[tracing_test::traced_test]
fn logs_unregistered_block_wrapping() {
	let registry = registry();
	let blocks = parse_and_validate("<!-- block:acme/gizmo /-->", &registry);

	assert_eq!(names(&blocks), vec![MISSING]);
	assert!(logs_contain("wrapping unregistered block"));
}

#[test]
#[tracing_test::traced_test]
fn logs_migrations() {
	let registry = note_registry();
	let _ = parse_and_validate(note_document("note-v2", "Hi"), &registry);

	assert!(logs_contain("migrated block from deprecated variant"));
}
