/// Resolves named character references such as `&amp;` or `&nbsp;`.
///
/// The tokenizer asks the resolver for the name between `&` and `;`. Names
/// the resolver does not know are kept literally, including the `&`.
pub trait EntityResolver {
	fn resolve(&self, name: &str) -> Option<String>;
}

/// The full HTML5 named entity table.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlEntities;

impl EntityResolver for HtmlEntities {
	fn resolve(&self, name: &str) -> Option<String> {
		if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric()) {
			return None;
		}

		let reference = format!("&{name};");
		let decoded = html_escape::decode_html_entities(&reference);
		(decoded != reference).then(|| decoded.into_owned())
	}
}

/// Only the five entities required to escape markup. Useful when content
/// must round-trip everything else verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlEntities;

impl EntityResolver for XmlEntities {
	fn resolve(&self, name: &str) -> Option<String> {
		let value = match name {
			"amp" => "&",
			"lt" => "<",
			"gt" => ">",
			"quot" => "\"",
			"apos" => "'",
			_ => return None,
		};
		Some(value.to_string())
	}
}

/// Decode a numeric character reference body (`38`, `x26`, `X26`).
pub(crate) fn decode_numeric(reference: &str) -> Option<char> {
	let code = if let Some(hex) = reference
		.strip_prefix('x')
		.or_else(|| reference.strip_prefix('X'))
	{
		if hex.is_empty() || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
			return None;
		}
		u32::from_str_radix(hex, 16).ok()?
	} else {
		if reference.is_empty() || !reference.chars().all(|ch| ch.is_ascii_digit()) {
			return None;
		}
		reference.parse::<u32>().ok()?
	};

	if code == 0 {
		return Some(char::REPLACEMENT_CHARACTER);
	}
	Some(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
}
