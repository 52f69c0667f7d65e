use std::borrow::Cow;

use logos::Logos;

use crate::DocType;
use crate::Position;
use crate::WeftError;
use crate::WeftResult;
use crate::XmlDeclaration;

pub(crate) const XML_DECLARATION: &str = "XML declaration";
pub(crate) const DOCTYPE_CLAUSE: &str = "DOCTYPE clause";

/// Tokens inside an XML declaration or a DOCTYPE clause.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum PrologToken {
	#[regex(r"[ \t\r\n]+")]
	Whitespace,
	#[token("=")]
	Equals,
	#[regex(r#""[^"]*""#)]
	DoubleQuoted,
	#[regex(r"'[^']*'")]
	SingleQuoted,
	#[regex(r"\[[^\]]*\]")]
	InternalSubset,
	#[regex(r#"[^ \t\r\n="'\[\]]+"#)]
	Word,
}

impl PrologToken {
	fn is_quoted(self) -> bool {
		matches!(self, Self::DoubleQuoted | Self::SingleQuoted)
	}
}

/// Significant tokens of `source` with their text.
fn tokenize<'a>(
	source: &'a str,
	structure: &'static str,
	position: Position,
) -> WeftResult<Vec<(PrologToken, &'a str)>> {
	let mut tokens = vec![];

	for (token, span) in PrologToken::lexer(source).spanned() {
		match token {
			Ok(PrologToken::Whitespace) => {}
			Ok(token) => tokens.push((token, &source[span])),
			Err(()) => {
				return Err(malformed(
					structure,
					format!("unexpected `{}`", &source[span]),
					position,
				));
			}
		}
	}

	Ok(tokens)
}

fn malformed(structure: &'static str, reason: String, position: Position) -> WeftError {
	WeftError::MalformedProlog {
		structure,
		reason,
		line: position.line,
		column: position.column,
	}
}

/// The text between a pair of quotes or brackets.
fn unwrap(text: &str) -> &str {
	&text[1..text.len() - 1]
}

/// Parse the inside of `<?xml ... ?>`. `inner` starts with the `xml`
/// keyword.
pub(crate) fn parse_xml_declaration<'a>(
	outer: &'a str,
	inner: &'a str,
	position: Position,
) -> WeftResult<XmlDeclaration<'a>> {
	let tokens = tokenize(inner, XML_DECLARATION, position)?;
	let mut tokens = tokens.into_iter();

	let Some((PrologToken::Word, keyword)) = tokens.next() else {
		return Err(malformed(
			XML_DECLARATION,
			"missing `xml` keyword".into(),
			position,
		));
	};

	let mut version = None;
	let mut encoding = None;
	let mut standalone = None;

	while let Some((token, name)) = tokens.next() {
		let value = match (token, tokens.next(), tokens.next()) {
			(PrologToken::Word, Some((PrologToken::Equals, _)), Some((quoted, value)))
				if quoted.is_quoted() =>
			{
				Cow::Borrowed(unwrap(value))
			}
			_ => {
				return Err(malformed(
					XML_DECLARATION,
					format!("expected `name=\"value\"` at `{name}`"),
					position,
				));
			}
		};

		let slot = match name {
			"version" => &mut version,
			"encoding" => &mut encoding,
			"standalone" => &mut standalone,
			other => {
				return Err(malformed(
					XML_DECLARATION,
					format!("unknown attribute `{other}`"),
					position,
				));
			}
		};
		if slot.replace(value).is_some() {
			return Err(malformed(
				XML_DECLARATION,
				format!("`{name}` is declared more than once"),
				position,
			));
		}
	}

	if version.is_none() {
		return Err(malformed(
			XML_DECLARATION,
			"missing `version`".into(),
			position,
		));
	}

	Ok(XmlDeclaration {
		keyword: Cow::Borrowed(keyword),
		version,
		encoding,
		standalone,
		outer: Cow::Borrowed(outer),
		position,
	})
}

/// Parse the inside of `<!DOCTYPE ... >`. `inner` starts with the `DOCTYPE`
/// keyword.
pub(crate) fn parse_doctype<'a>(
	outer: &'a str,
	inner: &'a str,
	position: Position,
) -> WeftResult<DocType<'a>> {
	let tokens = tokenize(inner, DOCTYPE_CLAUSE, position)?;
	let mut tokens = tokens.into_iter().peekable();

	let Some((PrologToken::Word, keyword)) = tokens.next() else {
		return Err(malformed(
			DOCTYPE_CLAUSE,
			"missing `DOCTYPE` keyword".into(),
			position,
		));
	};
	let Some((PrologToken::Word, element_name)) = tokens.next() else {
		return Err(malformed(
			DOCTYPE_CLAUSE,
			"missing root element name".into(),
			position,
		));
	};

	let mut kind = None;
	let mut public_id = None;
	let mut system_id = None;

	if let Some((_, word)) = tokens.next_if(|(token, _)| *token == PrologToken::Word) {
		kind = Some(Cow::Borrowed(word));

		if word.eq_ignore_ascii_case("public") {
			let Some((_, id)) = tokens.next().filter(|(token, _)| token.is_quoted()) else {
				return Err(malformed(
					DOCTYPE_CLAUSE,
					"`PUBLIC` must be followed by a quoted public id".into(),
					position,
				));
			};
			public_id = Some(Cow::Borrowed(unwrap(id)));

			if let Some((_, id)) = tokens.next_if(|(token, _)| token.is_quoted()) {
				system_id = Some(Cow::Borrowed(unwrap(id)));
			}
		} else if word.eq_ignore_ascii_case("system") {
			let Some((_, id)) = tokens.next().filter(|(token, _)| token.is_quoted()) else {
				return Err(malformed(
					DOCTYPE_CLAUSE,
					"`SYSTEM` must be followed by a quoted system id".into(),
					position,
				));
			};
			system_id = Some(Cow::Borrowed(unwrap(id)));
		} else {
			return Err(malformed(
				DOCTYPE_CLAUSE,
				format!("expected `PUBLIC` or `SYSTEM`, found `{word}`"),
				position,
			));
		}
	}

	let internal_subset = match tokens.next() {
		None => None,
		Some((PrologToken::InternalSubset, subset)) => Some(Cow::Borrowed(unwrap(subset))),
		Some((_, text)) => {
			return Err(malformed(
				DOCTYPE_CLAUSE,
				format!("unexpected `{text}`"),
				position,
			));
		}
	};

	if let Some((_, text)) = tokens.next() {
		return Err(malformed(
			DOCTYPE_CLAUSE,
			format!("unexpected `{text}` after internal subset"),
			position,
		));
	}

	Ok(DocType {
		keyword: Cow::Borrowed(keyword),
		element_name: Cow::Borrowed(element_name),
		kind,
		public_id,
		system_id,
		internal_subset,
		outer: Cow::Borrowed(outer),
		position,
	})
}
