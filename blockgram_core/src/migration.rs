use tracing::debug;

use crate::Attributes;
use crate::ParsedBlock;
use crate::RawBlockNode;
use crate::dom::Dom;
use crate::matcher::get_attributes_for_schema;
use crate::schema::AttributeSchema;
use crate::schema::BlockType;
use crate::schema::CLASS_NAME_ATTRIBUTE;
use crate::schema::DeprecatedVariant;
use crate::schema::MigrateFn;
use crate::schema::RenderFn;
use crate::serializer::render_with;
use crate::validation::ValidationIssue;
use crate::validation::validate_with;

/// The parts of a block type, or of one of its deprecated variants, that
/// take part in parsing and validation.
pub(crate) struct SchemaVersion<'a> {
	pub(crate) name: &'a str,
	pub(crate) schema: AttributeSchema,
	pub(crate) render: &'a RenderFn,
	pub(crate) supports_custom_class_name: bool,
	pub(crate) migrate: Option<&'a MigrateFn>,
}

impl<'a> SchemaVersion<'a> {
	pub(crate) fn current(block_type: &'a BlockType) -> Self {
		Self {
			name: &block_type.name,
			schema: block_type.schema(),
			render: &block_type.render,
			supports_custom_class_name: block_type.supports_custom_class_name,
			migrate: block_type.migrate.as_ref(),
		}
	}

	/// A deprecated variant without its own `migrate` falls back to the
	/// block type's.
	fn deprecated(block_type: &'a BlockType, variant: &'a DeprecatedVariant) -> Self {
		Self {
			name: &block_type.name,
			schema: variant.schema(),
			render: &variant.render,
			supports_custom_class_name: variant.supports_custom_class_name,
			migrate: variant.migrate.as_ref().or(block_type.migrate.as_ref()),
		}
	}

	pub(crate) fn validate(
		&self,
		attributes: &Attributes,
		original_content: &str,
	) -> (bool, Vec<ValidationIssue>) {
		validate_with(
			self.render,
			self.name,
			self.supports_custom_class_name,
			attributes,
			original_content,
		)
	}

	/// Validate, and when that fails retry once with built-in fixes applied.
	/// Returns the attributes that were last validated.
	pub(crate) fn validate_with_fixes(
		&self,
		attributes: Attributes,
		original_content: &str,
	) -> (Attributes, bool, Vec<ValidationIssue>) {
		let (is_valid, issues) = self.validate(&attributes, original_content);
		if is_valid {
			return (attributes, true, issues);
		}

		let fixed = self.fix_custom_class_name(attributes, original_content);
		let (is_valid, issues) = self.validate(&fixed, original_content);
		(fixed, is_valid, issues)
	}

	fn fix_custom_class_name(&self, mut attributes: Attributes, inner_html: &str) -> Attributes {
		if !self.supports_custom_class_name {
			return attributes;
		}

		let mut without_class_name = attributes.clone();
		without_class_name.remove(CLASS_NAME_ATTRIBUTE);
		let Ok(serialized) = render_with(
			self.render,
			self.name,
			self.supports_custom_class_name,
			&without_class_name,
			"",
		) else {
			return attributes;
		};

		let default_classes = root_element_classes(&serialized);
		let custom_classes: Vec<String> = root_element_classes(inner_html)
			.into_iter()
			.filter(|class| !default_classes.contains(class))
			.collect();

		if !custom_classes.is_empty() {
			attributes.insert(
				CLASS_NAME_ATTRIBUTE.to_string(),
				custom_classes.join(" ").into(),
			);
		} else if !serialized.is_empty() {
			attributes.remove(CLASS_NAME_ATTRIBUTE);
		}

		attributes
	}
}

/// The class list of the first element in `html`.
pub fn root_element_classes(html: &str) -> Vec<String> {
	let dom = Dom::parse(html);
	dom.first_element()
		.map(|root| dom.classes(root).into_iter().map(String::from).collect())
		.unwrap_or_default()
}

/// Recover custom classes on a block's root element.
///
/// The block is rendered without `className`; classes present on the stored
/// root element but absent from that render become the new `className`.
pub fn fix_custom_class_name(
	block_type: &BlockType,
	attributes: Attributes,
	inner_html: &str,
) -> Attributes {
	SchemaVersion::current(block_type).fix_custom_class_name(attributes, inner_html)
}

/// Try a block against each deprecated variant of its type.
///
/// Variants are tried in declaration order. An invalid block tries every
/// variant unless its eligibility predicate says no; a valid block only
/// tries variants whose predicate says yes. The first variant that
/// validates replaces the attributes and inner blocks with the output of its
/// `migrate` function and marks the block valid.
pub fn apply_block_deprecated_versions(
	block: ParsedBlock,
	raw: &RawBlockNode,
	block_type: &BlockType,
) -> ParsedBlock {
	for (index, variant) in block_type.deprecated.iter().enumerate() {
		let is_eligible = variant
			.is_eligible
			.as_ref()
			.is_some_and(|predicate| predicate(&raw.attrs, &block.inner_blocks));

		if block.is_valid && !is_eligible {
			continue;
		}
		if !block.is_valid && variant.is_eligible.is_some() && !is_eligible {
			continue;
		}

		let version = SchemaVersion::deprecated(block_type, variant);
		let attributes =
			get_attributes_for_schema(&version.schema, &block.original_content, &raw.attrs);
		let (attributes, is_valid, _) =
			version.validate_with_fixes(attributes, &block.original_content);
		if !is_valid {
			continue;
		}

		debug!(name = %block.name, variant = index, "migrated block from deprecated variant");

		let (attributes, inner_blocks) = match version.migrate {
			Some(migrate) => migrate(attributes, block.inner_blocks.clone()),
			None => (attributes, block.inner_blocks.clone()),
		};

		return ParsedBlock {
			attributes,
			inner_blocks,
			is_valid: true,
			validation_issues: vec![],
			raw_source: None,
			..block
		};
	}

	block
}
