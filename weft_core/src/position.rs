use std::fmt;

use serde::Serialize;

/// A 1-based line and column in a template.
///
/// Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
	pub line: usize,
	pub column: usize,
}

impl Position {
	pub const START: Self = Self { line: 1, column: 1 };

	pub const fn new(line: usize, column: usize) -> Self {
		Self { line, column }
	}

	/// Move past `text`, counting newlines.
	pub fn advance_str(&mut self, text: &str) {
		let bytes = text.as_bytes();
		let Some(last) = memchr::memrchr(b'\n', bytes) else {
			self.column += text.chars().count();
			return;
		};

		self.line += memchr::memchr_iter(b'\n', bytes).count();
		self.column = 1 + text[last + 1..].chars().count();
	}

	/// The position just after `text`.
	#[must_use]
	pub fn after(mut self, text: &str) -> Self {
		self.advance_str(text);
		self
	}
}

impl Default for Position {
	fn default() -> Self {
		Self::START
	}
}

impl fmt::Display for Position {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.line, self.column)
	}
}

/// Remaps positions produced while parsing an embedded region back to the
/// outer document.
///
/// The column offset only applies to the first line of the region: later
/// lines start at the left margin of the outer document as well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionOffset {
	pub line: usize,
	pub column: usize,
}

impl PositionOffset {
	pub const ZERO: Self = Self { line: 0, column: 0 };

	/// The offset that maps the start of a region (`1:1`) onto `start`.
	pub const fn at(start: Position) -> Self {
		Self {
			line: start.line - 1,
			column: start.column - 1,
		}
	}

	pub const fn is_zero(self) -> bool {
		self.line == 0 && self.column == 0
	}

	pub const fn apply(self, local: Position) -> Position {
		if local.line == 1 {
			Position::new(local.line + self.line, local.column + self.column)
		} else {
			Position::new(local.line + self.line, local.column)
		}
	}
}
