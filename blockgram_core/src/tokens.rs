use std::fmt::Display;
use std::ops::Range;

use crate::Attributes;
use crate::Position;

/// The role a delimiter comment plays in the block grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterKind {
	/// `<!-- block:name {…} -->`
	Opener,
	/// `<!-- /block:name -->`
	Closer,
	/// `<!-- block:name {…} /-->`
	Void,
}

impl Display for DelimiterKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Opener => write!(f, "opener"),
			Self::Closer => write!(f, "closer"),
			Self::Void => write!(f, "void"),
		}
	}
}

/// A single delimiter comment recognized in a document.
///
/// The tokenizer only emits tokens for comments that fully match the
/// delimiter grammar. Every other comment, and all text between delimiters,
/// is left for the tree builder to pick up as literal content.
#[derive(Debug, Clone, PartialEq)]
pub struct DelimiterToken {
	pub kind: DelimiterKind,
	/// Fully qualified block name, e.g. `core/paragraph`.
	pub name: String,
	/// The parsed JSON attribute blob. `None` when the comment carried no
	/// blob; an empty map when the blob was present but malformed.
	pub attrs: Option<Attributes>,
	/// Byte offset of `<!--`.
	pub start: usize,
	/// Byte length of the whole comment including `-->`.
	pub length: usize,
	/// Line/column span of the comment.
	pub position: Position,
}

impl DelimiterToken {
	/// Byte offset just after the closing `-->`.
	pub fn end(&self) -> usize {
		self.start + self.length
	}

	pub fn span(&self) -> Range<usize> {
		self.start..self.end()
	}

	/// The attribute map, empty when no blob was present.
	pub fn attributes(&self) -> Attributes {
		self.attrs.clone().unwrap_or_default()
	}
}
