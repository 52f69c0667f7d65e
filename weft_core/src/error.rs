use miette::Diagnostic;
use thiserror::Error;

use crate::Position;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum WeftError {
	#[error(transparent)]
	#[diagnostic(code(weft::io_error))]
	Io(#[from] std::io::Error),

	#[error(
		"closing tag `</{name}>` does not match the open element `{expected}` (line {line}, col \
		 {column})"
	)]
	#[diagnostic(
		code(weft::unbalanced_element),
		help("close `{expected}` before closing `{name}`, or parse in html mode")
	)]
	UnbalancedElement {
		name: String,
		expected: String,
		line: usize,
		column: usize,
	},

	#[error("closing tag `</{name}>` has no matching open element (line {line}, col {column})")]
	#[diagnostic(code(weft::unmatched_close_element))]
	UnmatchedCloseElement {
		name: String,
		line: usize,
		column: usize,
	},

	#[error("element `{name}` is never closed (opened at line {line}, col {column})")]
	#[diagnostic(
		code(weft::unclosed_element),
		help("add `</{name}>` before the end of the document")
	)]
	UnclosedElement {
		name: String,
		line: usize,
		column: usize,
	},

	#[error("attribute `{name}` is declared more than once (line {line}, col {column})")]
	#[diagnostic(
		code(weft::duplicate_attribute),
		help("attribute names must be unique within an element")
	)]
	DuplicateAttribute {
		name: String,
		line: usize,
		column: usize,
	},

	#[error("value of attribute `{name}` must be quoted (line {line}, col {column})")]
	#[diagnostic(code(weft::unquoted_attribute_value))]
	UnquotedAttributeValue {
		name: String,
		line: usize,
		column: usize,
	},

	#[error("attribute `{name}` is malformed: {reason} (line {line}, col {column})")]
	#[diagnostic(code(weft::malformed_attribute))]
	MalformedAttribute {
		name: String,
		reason: String,
		line: usize,
		column: usize,
	},

	#[error("unterminated {structure} (line {line}, col {column})")]
	#[diagnostic(code(weft::unterminated_structure))]
	UnterminatedStructure {
		structure: &'static str,
		line: usize,
		column: usize,
	},

	#[error("malformed {structure}: {reason} (line {line}, col {column})")]
	#[diagnostic(code(weft::malformed_prolog))]
	MalformedProlog {
		structure: &'static str,
		reason: String,
		line: usize,
		column: usize,
	},

	#[error("{structure} is not allowed in this template (line {line}, col {column})")]
	#[diagnostic(
		code(weft::prolog_forbidden),
		help("remove it or allow it in the parser configuration")
	)]
	PrologForbidden {
		structure: &'static str,
		line: usize,
		column: usize,
	},

	#[error("{structure} is required but the document has none (line {line}, col {column})")]
	#[diagnostic(code(weft::prolog_required))]
	PrologRequired {
		structure: &'static str,
		line: usize,
		column: usize,
	},

	#[error("{structure} must appear before any element (line {line}, col {column})")]
	#[diagnostic(code(weft::misplaced_prolog))]
	MisplacedProlog {
		structure: &'static str,
		line: usize,
		column: usize,
	},

	#[error("embedded markup nests deeper than {limit} levels (line {line}, col {column})")]
	#[diagnostic(
		code(weft::embedding_too_deep),
		help("raise `max_embedding_depth` in the parser configuration")
	)]
	EmbeddingTooDeep {
		limit: usize,
		line: usize,
		column: usize,
	},

	#[error("failed to parse template `{document}` (line {line}, col {column})")]
	#[diagnostic(code(weft::template))]
	Template {
		document: String,
		line: usize,
		column: usize,
		#[source]
		source: Box<WeftError>,
	},

	#[error("processor `{processor}` failed in `{document}` (line {line}, col {column})")]
	#[diagnostic(code(weft::processor))]
	Processor {
		processor: String,
		document: String,
		line: usize,
		column: usize,
		#[source]
		source: Box<WeftError>,
	},

	#[error("processing failed: {0}")]
	#[diagnostic(code(weft::processing))]
	Processing(String),

	#[error("invalid dialect prefix: `{0}`")]
	#[diagnostic(
		code(weft::invalid_dialect_prefix),
		help("prefixes are non-empty and contain only letters, digits, `_` and `-`")
	)]
	InvalidDialectPrefix(String),

	#[error("invalid processor matcher: {0}")]
	#[diagnostic(code(weft::invalid_matcher))]
	InvalidMatcher(String),

	#[error("dialect `{name}` is already registered with prefix `{prefix}`")]
	#[diagnostic(code(weft::duplicate_dialect))]
	DuplicateDialect { name: String, prefix: String },

	#[error("no id has been generated yet for `{0}`")]
	#[diagnostic(
		code(weft::missing_id_sequence),
		help("call `next_id` for this id before asking for the previous one")
	)]
	MissingIdSequence(String),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(weft::config_parse),
		help("check that weft.toml is valid TOML with [parser], [inline] and [interner] sections")
	)]
	ConfigParse(String),
}

impl WeftError {
	/// The location in the template that caused this failure, when known.
	pub fn position(&self) -> Option<Position> {
		match self {
			Self::UnbalancedElement { line, column, .. }
			| Self::UnmatchedCloseElement { line, column, .. }
			| Self::UnclosedElement { line, column, .. }
			| Self::DuplicateAttribute { line, column, .. }
			| Self::UnquotedAttributeValue { line, column, .. }
			| Self::MalformedAttribute { line, column, .. }
			| Self::UnterminatedStructure { line, column, .. }
			| Self::MalformedProlog { line, column, .. }
			| Self::PrologForbidden { line, column, .. }
			| Self::PrologRequired { line, column, .. }
			| Self::MisplacedProlog { line, column, .. }
			| Self::EmbeddingTooDeep { line, column, .. }
			| Self::Template { line, column, .. }
			| Self::Processor { line, column, .. } => Some(Position::new(*line, *column)),
			_ => None,
		}
	}

	/// Wrap a parse failure with the document it came from. Errors without a
	/// location, such as I/O failures, pass through unchanged.
	pub fn in_template(self, document: &str) -> Self {
		if matches!(self, Self::Template { .. }) {
			return self;
		}

		let Some(position) = self.position() else {
			return self;
		};

		Self::Template {
			document: document.to_string(),
			line: position.line,
			column: position.column,
			source: Box::new(self),
		}
	}
}

pub type WeftResult<T> = Result<T, WeftError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
