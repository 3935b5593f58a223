use crate::BlockError;
use crate::BlockResult;
use crate::dom::Dom;
use crate::dom::NodeId;

/// A parsed selector list such as `figure > img, .wp-caption img`.
///
/// Supported syntax: type selectors, `*`, `.class`, `#id`, `[attr]`,
/// `[attr=value]` (value optionally quoted), descendant (whitespace) and
/// child (`>`) combinators, and comma separated lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
	alternatives: Vec<ComplexSelector>,
}

/// Compound selectors joined by combinators, stored left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
	/// The first compound.
	head: Compound,
	/// Each subsequent compound with the combinator placed before it.
	tail: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
	Descendant,
	Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
	tag: Option<String>,
	ids: Vec<String>,
	classes: Vec<String>,
	attributes: Vec<AttributeMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeMatch {
	name: String,
	value: Option<String>,
}

impl Compound {
	fn matches(&self, dom: &Dom, id: NodeId) -> bool {
		let Some(name) = dom.tag_name(id) else {
			return false;
		};
		if self.tag.as_deref().is_some_and(|tag| tag != name) {
			return false;
		}
		if !self
			.ids
			.iter()
			.all(|expected| dom.attribute(id, "id") == Some(expected.as_str()))
		{
			return false;
		}
		if !self.classes.iter().all(|class| dom.has_class(id, class)) {
			return false;
		}
		self.attributes.iter().all(|attribute| {
			match (&attribute.value, dom.attribute(id, &attribute.name)) {
				(_, None) => false,
				(None, Some(_)) => true,
				(Some(expected), Some(actual)) => expected == actual,
			}
		})
	}
}

impl ComplexSelector {
	/// Match right to left, walking up from `id` but never past `scope`.
	fn matches(&self, dom: &Dom, id: NodeId, scope: NodeId) -> bool {
		let mut compounds: Vec<(&Compound, Option<Combinator>)> = vec![(&self.head, None)];
		compounds.extend(
			self.tail
				.iter()
				.map(|(combinator, compound)| (compound, Some(*combinator))),
		);

		let Some((last, rest)) = compounds.split_last() else {
			return false;
		};
		let (subject, mut combinator) = *last;
		if !subject.matches(dom, id) {
			return false;
		}

		let mut current = id;
		for (compound, previous) in rest.iter().rev() {
			let Some(found) = find_ancestor_match(dom, current, scope, compound, combinator) else {
				return false;
			};
			current = found;
			combinator = *previous;
		}
		true
	}
}

fn find_ancestor_match(
	dom: &Dom,
	from: NodeId,
	scope: NodeId,
	compound: &Compound,
	combinator: Option<Combinator>,
) -> Option<NodeId> {
	let mut parent = dom.parent(from);
	while let Some(candidate) = parent {
		if candidate == scope {
			return None;
		}
		if compound.matches(dom, candidate) {
			return Some(candidate);
		}
		if combinator == Some(Combinator::Child) {
			return None;
		}
		parent = dom.parent(candidate);
	}
	None
}

impl Selector {
	pub fn parse(selector: &str) -> BlockResult<Self> {
		let alternatives = selector
			.split(',')
			.map(|part| parse_complex(selector, part.trim()))
			.collect::<BlockResult<Vec<_>>>()?;

		Ok(Self { alternatives })
	}

	pub fn matches(&self, dom: &Dom, id: NodeId, scope: NodeId) -> bool {
		self.alternatives
			.iter()
			.any(|alternative| alternative.matches(dom, id, scope))
	}

	/// Every element under `scope` matching the selector, in document order.
	pub fn select_all(&self, dom: &Dom, scope: NodeId) -> Vec<NodeId> {
		dom.descendants(scope)
			.into_iter()
			.filter(|id| self.matches(dom, *id, scope))
			.collect()
	}

	/// The first element under `scope` matching the selector.
	pub fn select_first(&self, dom: &Dom, scope: NodeId) -> Option<NodeId> {
		dom.descendants(scope)
			.into_iter()
			.find(|id| self.matches(dom, *id, scope))
	}
}

fn invalid(selector: &str, reason: impl Into<String>) -> BlockError {
	BlockError::InvalidSelector {
		selector: selector.to_string(),
		reason: reason.into(),
	}
}

fn parse_complex(selector: &str, part: &str) -> BlockResult<ComplexSelector> {
	if part.is_empty() {
		return Err(invalid(selector, "empty selector"));
	}

	let mut compounds: Vec<Compound> = vec![];
	let mut combinators: Vec<Combinator> = vec![];
	let mut pending = Combinator::Descendant;
	let mut chars = part.chars().peekable();

	while let Some(&ch) = chars.peek() {
		match ch {
			' ' | '\t' | '\n' => {
				chars.next();
			}
			'>' => {
				chars.next();
				if compounds.is_empty() {
					return Err(invalid(selector, "`>` must follow a selector"));
				}
				pending = Combinator::Child;
			}
			_ => {
				let compound = parse_compound(selector, &mut chars)?;
				if !compounds.is_empty() {
					combinators.push(pending);
				}
				compounds.push(compound);
				pending = Combinator::Descendant;
			}
		}
	}

	if pending == Combinator::Child {
		return Err(invalid(selector, "`>` must be followed by a selector"));
	}

	let mut compounds = compounds.into_iter();
	let Some(head) = compounds.next() else {
		return Err(invalid(selector, "empty selector"));
	};

	Ok(ComplexSelector {
		head,
		tail: combinators.into_iter().zip(compounds).collect(),
	})
}

fn parse_compound(
	selector: &str,
	chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> BlockResult<Compound> {
	let mut compound = Compound::default();

	while let Some(&ch) = chars.peek() {
		match ch {
			'*' => {
				chars.next();
			}
			'.' => {
				chars.next();
				compound.classes.push(read_identifier(selector, chars)?);
			}
			'#' => {
				chars.next();
				compound.ids.push(read_identifier(selector, chars)?);
			}
			'[' => {
				chars.next();
				compound.attributes.push(read_attribute(selector, chars)?);
			}
			ch if is_identifier_char(ch) => {
				compound.tag = Some(read_identifier(selector, chars)?.to_ascii_lowercase());
			}
			' ' | '\t' | '\n' | '>' => break,
			other => return Err(invalid(selector, format!("unexpected `{other}`"))),
		}
	}

	// A lone `*` leaves the compound empty, which matches any element.
	Ok(compound)
}

fn is_identifier_char(ch: char) -> bool {
	ch.is_alphanumeric() || ch == '-' || ch == '_'
}

fn read_identifier(
	selector: &str,
	chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> BlockResult<String> {
	let mut identifier = String::new();
	while let Some(&ch) = chars.peek() {
		if !is_identifier_char(ch) {
			break;
		}
		identifier.push(ch);
		chars.next();
	}

	if identifier.is_empty() {
		return Err(invalid(selector, "expected an identifier"));
	}
	Ok(identifier)
}

fn read_attribute(
	selector: &str,
	chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> BlockResult<AttributeMatch> {
	let name = read_identifier(selector, chars)?.to_ascii_lowercase();

	match chars.next() {
		Some(']') => Ok(AttributeMatch { name, value: None }),
		Some('=') => {
			let mut value = String::new();
			let quote = chars.peek().copied().filter(|ch| *ch == '"' || *ch == '\'');
			if quote.is_some() {
				chars.next();
			}

			loop {
				match chars.next() {
					Some(ch) if Some(ch) == quote => {
						if chars.next() != Some(']') {
							return Err(invalid(selector, "expected `]`"));
						}
						break;
					}
					Some(']') if quote.is_none() => break,
					Some(ch) => value.push(ch),
					None => return Err(invalid(selector, "unterminated attribute selector")),
				}
			}

			Ok(AttributeMatch {
				name,
				value: Some(value),
			})
		}
		_ => Err(invalid(selector, "expected `]` or `=`")),
	}
}
