use serde::Deserialize;
use serde::Serialize;

/// A 1-indexed line/column location together with its byte offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
	pub line: usize,
	pub column: usize,
	pub offset: usize,
}

impl Point {
	pub fn new(line: usize, column: usize, offset: usize) -> Self {
		Self {
			line,
			column,
			offset,
		}
	}
}

/// The start and end points of a span of source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
	pub start: Point,
	pub end: Point,
}

impl Position {
	pub fn new(
		start_line: usize,
		start_column: usize,
		start_offset: usize,
		end_line: usize,
		end_column: usize,
		end_offset: usize,
	) -> Self {
		Self {
			start: Point::new(start_line, start_column, start_offset),
			end: Point::new(end_line, end_column, end_offset),
		}
	}
}

/// Pre-computed table of line-start byte offsets for efficient offset-to-point
/// conversion. The table is built once (O(n)) and each lookup is a binary
/// search (O(log n)).
pub(crate) struct LineTable {
	/// Byte offsets of the start of each line. `line_starts[0]` is always 0.
	line_starts: Vec<usize>,
}

impl LineTable {
	pub(crate) fn new(content: &str) -> Self {
		let mut line_starts = vec![0];
		for (index, byte) in content.bytes().enumerate() {
			if byte == b'\n' {
				line_starts.push(index + 1);
			}
		}
		Self { line_starts }
	}

	pub(crate) fn point(&self, offset: usize) -> Point {
		let line_index = match self.line_starts.binary_search(&offset) {
			Ok(exact) => exact,
			Err(insert) => insert.saturating_sub(1),
		};

		Point {
			line: line_index + 1,
			column: offset - self.line_starts[line_index] + 1,
			offset,
		}
	}

	pub(crate) fn position(&self, start: usize, end: usize) -> Position {
		Position {
			start: self.point(start),
			end: self.point(end),
		}
	}
}
