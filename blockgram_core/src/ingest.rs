use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::Attributes;
use crate::BlockError;
use crate::BlockResult;
use crate::ParseOptions;
use crate::ParsedBlock;
use crate::config::EngineConfig;
use crate::config::IngestMode;
use crate::dom::Dom;
use crate::dom::NodeId;
use crate::engine::create_block;
use crate::engine::parse_and_validate_with;
use crate::filters::filter_html;
use crate::filters::filter_inline_html;
use crate::filters::is_phrasing_element;
use crate::filters::normalize_blocks;
use crate::html_tokenizer::HtmlToken;
use crate::html_tokenizer::html_tokens;
use crate::matcher::get_block_attributes;
use crate::schema::BlockType;
use crate::schema::BlockTypeRegistry;
use crate::schema::RawTransform;
use crate::schema::ShortcodeTransform;
use crate::shortcode::ShortcodeMatch;
use crate::shortcode::next_shortcode;

static DOCUMENT_START: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r"(?is)^\s*(?:<!doctype[^>]*>\s*)?(?:<html[^>]*>\s*)?(?:<head[^>]*>.*?</head>\s*)?(?:<body[^>]*>\s*)?(?:<!--\s*StartFragment\s*-->)?",
	)
	.expect("valid regex")
});

static DOCUMENT_END: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)(?:<!--\s*EndFragment\s*-->\s*)?(?:</body>\s*)?(?:</html>\s*)?$")
		.expect("valid regex")
});

static META_TAG: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?i)<meta[^>]*>").expect("valid regex"));

/// A shortcode on its own line, or alone in a paragraph.
static LINE_BEFORE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?:^|\n|<p>)\s*$").expect("valid regex"));
static LINE_AFTER: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\s*(?:$|\n|</p>)").expect("valid regex"));

/// Options for [`ingest`] and [`ingest_raw_html`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
	pub mode: IngestMode,
	/// Convert plain text through markdown.
	pub markdown: bool,
	/// Replace registered shortcodes with blocks.
	pub shortcodes: bool,
	/// Used when the input already contains block delimiters.
	pub parse: ParseOptions,
}

impl Default for IngestOptions {
	fn default() -> Self {
		Self {
			mode: IngestMode::Auto,
			markdown: true,
			shortcodes: true,
			parse: ParseOptions::default(),
		}
	}
}

impl IngestOptions {
	/// Construct [`IngestOptions`] from an optional [`EngineConfig`].
	pub fn from_config(config: Option<&EngineConfig>) -> Self {
		let Some(config) = config else {
			return Self::default();
		};

		Self {
			mode: config.ingest.mode,
			markdown: config.ingest.markdown,
			shortcodes: config.ingest.shortcodes,
			parse: ParseOptions::from_config(Some(config)),
		}
	}
}

/// The result of [`ingest`].
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
	Blocks(Vec<ParsedBlock>),
	/// Phrasing-only markup for a rich-text field.
	Inline(String),
}

/// Convert pasted or imported content according to `options.mode`.
///
/// In [`IngestMode::Auto`] a single line of text and inline markup is
/// returned as inline HTML; anything else becomes blocks.
pub fn ingest(
	input: &str,
	registry: &dyn BlockTypeRegistry,
	options: &IngestOptions,
) -> Ingested {
	match options.mode {
		IngestMode::Inline => Ingested::Inline(ingest_inline_html(input, options)),
		IngestMode::Auto if is_inline_content(&strip_boilerplate(input)) => {
			Ingested::Inline(ingest_inline_html(input, options))
		}
		_ => Ingested::Blocks(ingest_raw_html(input, registry, options)),
	}
}

/// Convert raw HTML, markdown or shortcode text into blocks.
///
/// Input that already contains block delimiters is parsed as a document.
/// Otherwise plain text goes through markdown, registered shortcodes become
/// blocks, the markup is cleaned up by the DOM filters and every top-level
/// element is mapped to a block through the registered raw transforms.
/// Elements no transform claims are kept verbatim in the registry's HTML
/// fallback block.
pub fn ingest_raw_html(
	input: &str,
	registry: &dyn BlockTypeRegistry,
	options: &IngestOptions,
) -> Vec<ParsedBlock> {
	let html = strip_boilerplate(input);

	if html.contains("<!-- block:") || html.contains("<!-- wp:") {
		debug!("input contains block delimiters, parsing as a document");
		return parse_and_validate_with(&html, registry, &options.parse).0;
	}

	let html = if options.markdown && is_plain_text(&html) {
		markdown_to_html(&html).unwrap_or_else(|error| {
			debug!(%error, "markdown conversion failed, keeping the text as is");
			html
		})
	} else {
		html
	};

	let segments = if options.shortcodes {
		segment_shortcodes(&html, registry)
	} else {
		vec![Segment::Html(html)]
	};

	let mut blocks = vec![];
	for segment in segments {
		match segment {
			Segment::Block(block) => blocks.push(block),
			Segment::Html(html) => blocks.extend(html_to_blocks(&html, registry, options)),
		}
	}
	blocks
}

/// Convert content into phrasing-only HTML. Block-level elements are
/// unwrapped and scripts, styles and comments dropped.
pub fn ingest_inline_html(input: &str, options: &IngestOptions) -> String {
	let html = strip_boilerplate(input);
	let html = if options.markdown && is_plain_text(&html) {
		markdown_to_html(&html).unwrap_or(html)
	} else {
		html
	};

	let mut dom = Dom::parse_with_depth(&html, options.parse.max_depth);
	filter_inline_html(&mut dom);
	dom.to_html().trim().to_string()
}

/// Remove the document wrapper, `<meta>` tags and fragment markers that
/// clipboards add around copied markup.
pub fn strip_boilerplate(html: &str) -> String {
	let html = DOCUMENT_START.replace(html, "");
	let html = DOCUMENT_END.replace(&html, "");
	META_TAG.replace_all(&html, "").into_owned()
}

/// Whether `html` contains no markup other than `<br>`.
pub fn is_plain_text(html: &str) -> bool {
	html_tokens(html).iter().all(|token| match token {
		HtmlToken::Chars(_) => true,
		HtmlToken::StartTag { name, .. } | HtmlToken::EndTag { name } => name == "br",
		HtmlToken::Comment(_) | HtmlToken::Doctype { .. } => false,
	})
}

/// A single line of text and phrasing elements.
fn is_inline_content(html: &str) -> bool {
	let html = html.trim();
	!html.is_empty()
		&& !html.contains('\n')
		&& html_tokens(html).iter().all(|token| match token {
			HtmlToken::Chars(_) => true,
			HtmlToken::StartTag { name, .. } | HtmlToken::EndTag { name } => {
				is_phrasing_element(name)
			}
			HtmlToken::Comment(_) | HtmlToken::Doctype { .. } => false,
		})
}

/// Convert GitHub flavored markdown to HTML. Inline HTML in the source is
/// passed through.
pub fn markdown_to_html(text: &str) -> BlockResult<String> {
	let mut options = markdown::Options::gfm();
	options.compile.allow_dangerous_html = true;
	markdown::to_html_with_options(text, &options)
		.map_err(|message| BlockError::Markdown(message.to_string()))
}

enum Segment {
	Html(String),
	Block(ParsedBlock),
}

/// Shortcode transforms of every registered block type, lowest priority
/// first.
fn shortcode_transforms(registry: &dyn BlockTypeRegistry) -> Vec<(Arc<BlockType>, ShortcodeTransform)> {
	let mut transforms: Vec<_> = registry
		.block_types()
		.into_iter()
		.flat_map(|block_type| {
			block_type
				.shortcode_transforms
				.clone()
				.into_iter()
				.map(move |transform| (block_type.clone(), transform))
		})
		.collect();
	transforms.sort_by_key(|(_, transform)| transform.priority);
	transforms
}

fn raw_transforms(registry: &dyn BlockTypeRegistry) -> Vec<(Arc<BlockType>, RawTransform)> {
	let mut transforms: Vec<_> = registry
		.block_types()
		.into_iter()
		.flat_map(|block_type| {
			block_type
				.raw_transforms
				.clone()
				.into_iter()
				.map(move |transform| (block_type.clone(), transform))
		})
		.collect();
	transforms.sort_by_key(|(_, transform)| transform.priority);
	transforms
}

/// Split `html` on registered shortcodes, turning each into a block.
fn segment_shortcodes(html: &str, registry: &dyn BlockTypeRegistry) -> Vec<Segment> {
	let transforms = shortcode_transforms(registry);
	let mut segments = vec![];
	segment_into(html, &transforms, registry, &mut segments);
	segments
}

fn segment_into(
	html: &str,
	transforms: &[(Arc<BlockType>, ShortcodeTransform)],
	registry: &dyn BlockTypeRegistry,
	segments: &mut Vec<Segment>,
) {
	let mut rest = html;

	'search: loop {
		for (block_type, transform) in transforms {
			for tag in &transform.tags {
				let mut from = 0;
				while let Some(found) = next_shortcode(tag, rest, from) {
					from = found.span.end;
					let before = &rest[..found.span.start];
					let after = &rest[found.span.end..];
					if is_inline_shortcode(&found, before, after) {
						continue;
					}

					let attributes = (transform.transform)(&found.shortcode);
					let block = match create_block(registry, &block_type.name, attributes, vec![]) {
						Ok(block) => block,
						Err(error) => {
							debug!(%error, tag, "shortcode transform produced no block");
							continue;
						}
					};

					debug!(tag, name = %block_type.name, "converted shortcode to block");
					segment_into(before, transforms, registry, segments);
					segments.push(Segment::Block(block));
					rest = after;
					continue 'search;
				}
			}
		}
		break;
	}

	if !rest.trim().is_empty() {
		segments.push(Segment::Html(rest.to_string()));
	}
}

/// A shortcode without markup in its content which shares its line with
/// other text stays in the text.
fn is_inline_shortcode(found: &ShortcodeMatch, before: &str, after: &str) -> bool {
	let has_markup = found
		.shortcode
		.content
		.as_deref()
		.is_some_and(|content| content.contains('<'));
	!has_markup && !(LINE_BEFORE.is_match(before) && LINE_AFTER.is_match(after))
}

fn html_to_blocks(
	html: &str,
	registry: &dyn BlockTypeRegistry,
	options: &IngestOptions,
) -> Vec<ParsedBlock> {
	let mut dom = Dom::parse_with_depth(html, options.parse.max_depth);
	filter_html(&mut dom);

	// Parsing the filtered markup again lets misplaced block elements, such
	// as a figure inside a paragraph, close their parents.
	let mut dom = Dom::parse_with_depth(&dom.to_html(), options.parse.max_depth);
	let blockquotes: Vec<NodeId> = dom
		.descendants(dom.root())
		.into_iter()
		.filter(|id| dom.is_element_named(*id, "blockquote"))
		.collect();
	for blockquote in blockquotes {
		normalize_blocks(&mut dom, blockquote);
	}
	let root = dom.root();
	normalize_blocks(&mut dom, root);

	let transforms = raw_transforms(registry);
	dom.element_children(dom.root())
		.into_iter()
		.filter_map(|id| element_to_block(&dom, id, &transforms, registry))
		.collect()
}

fn element_to_block(
	dom: &Dom,
	id: NodeId,
	transforms: &[(Arc<BlockType>, RawTransform)],
	registry: &dyn BlockTypeRegistry,
) -> Option<ParsedBlock> {
	let matched = transforms
		.iter()
		.find(|(_, transform)| (transform.is_match)(dom, id));

	let (block_type, attributes) = match matched {
		Some((block_type, transform)) => {
			let attributes = match &transform.transform {
				Some(transform) => transform(dom, id),
				None => get_block_attributes(block_type, &dom.outer_html(id), &Attributes::new()),
			};
			(block_type.clone(), attributes)
		}
		None => {
			let Some(block_type) = registry.html_fallback_name().and_then(|name| registry.lookup(name))
			else {
				debug!(element = ?dom.tag_name(id), "no transform or fallback for element, dropping it");
				return None;
			};
			let attributes = get_block_attributes(&block_type, &dom.outer_html(id), &Attributes::new());
			(block_type, attributes)
		}
	};

	match create_block(registry, &block_type.name, attributes, vec![]) {
		Ok(block) => Some(block),
		Err(error) => {
			debug!(%error, "failed to create ingested block");
			None
		}
	}
}
