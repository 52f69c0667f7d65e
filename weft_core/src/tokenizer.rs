use std::borrow::Cow;
use std::ops::Range;

use memchr::memmem;

use crate::ElementBalancing;
use crate::MarkupEvent;
use crate::MarkupGrammar;
use crate::MarkupHandler;
use crate::ParseConfiguration;
use crate::Position;
use crate::PositionOffset;
use crate::PrologPresence;
use crate::WeftError;
use crate::WeftResult;
use crate::event::AttributeEvent;
use crate::prolog;
use crate::prolog::DOCTYPE_CLAUSE;
use crate::prolog::XML_DECLARATION;

/// HTML elements that never have content or a close tag.
const VOID_ELEMENTS: [&str; 14] = [
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
	"track", "wbr",
];

/// HTML elements whose content is text up to their close tag.
const RAW_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "textarea", "title"];

/// Elements whose start closes an open `p`.
const CLOSES_PARAGRAPH: [&str; 24] = [
	"address",
	"article",
	"aside",
	"blockquote",
	"div",
	"dl",
	"fieldset",
	"footer",
	"form",
	"h1",
	"h2",
	"h3",
	"h4",
	"h5",
	"h6",
	"header",
	"hr",
	"main",
	"nav",
	"ol",
	"p",
	"pre",
	"section",
	"ul",
];

/// HTML elements implicitly closed when `opening` starts while they are the
/// innermost open element.
fn implied_end_tags(opening: &str) -> &'static [&'static str] {
	let opening = opening.to_ascii_lowercase();
	match opening.as_str() {
		"li" => &["li"],
		"dt" | "dd" => &["dt", "dd"],
		"option" => &["option"],
		"optgroup" => &["option", "optgroup"],
		"tr" => &["td", "th", "tr"],
		"td" | "th" => &["td", "th"],
		"thead" | "tbody" | "tfoot" => &["td", "th", "tr", "thead", "tbody"],
		name if CLOSES_PARAGRAPH.contains(&name) || name == "table" => &["p"],
		_ => &[],
	}
}

fn is_one_of(name: &str, names: &[&str]) -> bool {
	names.iter().any(|candidate| candidate.eq_ignore_ascii_case(name))
}

fn is_name_start(c: char) -> bool {
	c.is_ascii_alphabetic() || c == '_' || c == ':' || !c.is_ascii()
}

/// End of a name starting at `from`.
fn name_end(source: &str, from: usize) -> usize {
	source[from..]
		.find(|c: char| c.is_ascii_whitespace() || matches!(c, '/' | '>' | '<' | '=' | '"' | '\''))
		.map_or(source.len(), |offset| from + offset)
}

fn whitespace_end(source: &str, from: usize) -> usize {
	source[from..]
		.find(|c: char| !c.is_ascii_whitespace())
		.map_or(source.len(), |offset| from + offset)
}

/// The index just past the closing marker of a parser-level comment whose
/// content starts at `from`. A prototype-only closer `/*/-->` never counts.
fn parser_level_comment_end(source: &str, from: usize) -> Option<usize> {
	let bytes = source.as_bytes();
	memmem::find_iter(&bytes[from..], b"*/-->")
		.map(|offset| from + offset)
		.find(|&index| bytes[index - 1] != b'/')
		.map(|index| index + 5)
}

/// The index just past the `>` ending a DOCTYPE clause, skipping quoted
/// strings and the internal subset.
fn doctype_end(source: &str, from: usize) -> Option<usize> {
	let mut quote = None;
	let mut in_subset = false;

	for (offset, byte) in source.as_bytes()[from..].iter().enumerate() {
		match (quote, byte) {
			(Some(open), _) if open == *byte => quote = None,
			(Some(_), _) => {}
			(None, b'"' | b'\'') => quote = Some(*byte),
			(None, b'[') => in_subset = true,
			(None, b']') => in_subset = false,
			(None, b'>') if !in_subset => return Some(from + offset + 1),
			_ => {}
		}
	}

	None
}

/// A cursor over the source of one parse context.
struct Scanner<'a> {
	source: &'a str,
	index: usize,
	position: Position,
	offset: PositionOffset,
}

impl<'a> Scanner<'a> {
	fn new(source: &'a str, offset: PositionOffset) -> Self {
		Self {
			source,
			index: 0,
			position: Position::START,
			offset,
		}
	}

	/// The absolute position of the cursor.
	fn here(&self) -> Position {
		self.offset.apply(self.position)
	}

	/// The absolute position of `index`, which must not be behind the cursor.
	fn position_at(&self, index: usize) -> Position {
		self.offset
			.apply(self.position.after(&self.source[self.index..index]))
	}

	/// Move the cursor to `index`, returning the text passed over.
	fn advance_to(&mut self, index: usize) -> &'a str {
		let text = &self.source[self.index..index];
		self.position.advance_str(text);
		self.index = index;
		text
	}

	fn slice(&self, range: Range<usize>) -> &'a str {
		&self.source[range]
	}
}

#[derive(Debug)]
enum TagPart {
	Whitespace(Range<usize>),
	Attribute {
		name: Range<usize>,
		operator: Range<usize>,
		value: Range<usize>,
		quoted: Range<usize>,
	},
}

#[derive(Debug)]
struct Tag {
	name: Range<usize>,
	parts: Vec<TagPart>,
	end: Range<usize>,
	minimized: bool,
}

#[derive(Debug)]
struct CloseTag {
	name: Range<usize>,
	whitespace: Range<usize>,
	end: usize,
}

/// A structure recognized at a `<`. Indices are into the context's source.
#[derive(Debug)]
enum Structure {
	Comment { end: usize },
	ParserLevelComment { end: usize },
	PrototypeComment { inner: Range<usize>, end: usize },
	Cdata { end: usize },
	DocType { end: usize },
	XmlDeclaration { end: usize },
	ProcessingInstruction { target_end: usize, end: usize },
	OpenTag(Tag),
	CloseTag(CloseTag),
}

#[derive(Debug, Clone)]
struct OpenElement {
	name: String,
	position: Position,
}

/// Turns markup into [`MarkupEvent`]s.
///
/// A tokenizer owns the scan state of one parse at a time and can be reused
/// for the next document. Events borrow from the source passed to
/// [`MarkupTokenizer::parse`].
#[derive(Debug)]
pub struct MarkupTokenizer<'c> {
	config: &'c ParseConfiguration,
	open_elements: Vec<OpenElement>,
	/// One offset per active parse context. The document itself is the
	/// bottom entry.
	contexts: Vec<PositionOffset>,
	raw_text: Option<String>,
	seen_element: bool,
	seen_xml_declaration: bool,
	seen_doctype: bool,
	emitted: bool,
}

impl<'c> MarkupTokenizer<'c> {
	pub fn new(config: &'c ParseConfiguration) -> Self {
		Self {
			config,
			open_elements: vec![],
			contexts: vec![],
			raw_text: None,
			seen_element: false,
			seen_xml_declaration: false,
			seen_doctype: false,
			emitted: false,
		}
	}

	pub fn config(&self) -> &ParseConfiguration {
		self.config
	}

	/// The offset applied to positions in the current parse context.
	pub fn current_offset(&self) -> PositionOffset {
		self.contexts.last().copied().unwrap_or_default()
	}

	/// Tokenize a whole document.
	pub fn parse<H: MarkupHandler>(&mut self, source: &str, handler: &mut H) -> WeftResult<()> {
		self.reset();

		handler.handle(MarkupEvent::DocumentStart {
			position: Position::START,
		})?;

		let mut scanner = Scanner::new(source, PositionOffset::ZERO);
		self.contexts.push(scanner.offset);
		let scanned = self.scan(&mut scanner, handler);
		self.contexts.pop();
		scanned?;

		let end = scanner.here();
		self.finish(end, handler)?;
		handler.handle(MarkupEvent::DocumentEnd { position: end })?;

		debug_assert!(self.contexts.is_empty());
		self.reset();
		Ok(())
	}

	/// Tokenize `fragment` as markup embedded in the current document at
	/// `start`, so reported positions are absolute. Open elements are shared
	/// with the enclosing context.
	pub fn parse_embedded<H: MarkupHandler>(
		&mut self,
		fragment: &str,
		start: Position,
		handler: &mut H,
	) -> WeftResult<()> {
		if self.contexts.len() > self.config.max_embedding_depth {
			return Err(WeftError::EmbeddingTooDeep {
				limit: self.config.max_embedding_depth,
				line: start.line,
				column: start.column,
			});
		}

		let mut scanner = Scanner::new(fragment, PositionOffset::at(start));
		self.contexts.push(scanner.offset);
		let scanned = self.scan(&mut scanner, handler);
		self.contexts.pop();
		self.raw_text = None;

		scanned
	}

	fn reset(&mut self) {
		self.open_elements.clear();
		self.contexts.clear();
		self.raw_text = None;
		self.seen_element = false;
		self.seen_xml_declaration = false;
		self.seen_doctype = false;
		self.emitted = false;
	}

	fn is_xml(&self) -> bool {
		self.config.grammar == MarkupGrammar::Xml
	}

	fn is_html(&self) -> bool {
		self.config.grammar == MarkupGrammar::Html
	}

	fn emit<H: MarkupHandler>(&mut self, handler: &mut H, event: MarkupEvent<'_>) -> WeftResult<()> {
		self.emitted = true;
		handler.handle(event)
	}

	fn scan<H: MarkupHandler>(&mut self, scanner: &mut Scanner<'_>, handler: &mut H) -> WeftResult<()> {
		let source = scanner.source;
		let mut probe = scanner.index;

		loop {
			if let Some(element) = self.raw_text.take() {
				match self.raw_text_end(source, probe, &element) {
					Some(close) => probe = close,
					None => break,
				}
			}

			let Some(found) = memchr::memchr(b'<', &source.as_bytes()[probe..]) else {
				break;
			};
			let at = probe + found;

			match self.recognize(scanner, at)? {
				Some(structure) => {
					self.flush_text(scanner, at, handler)?;
					self.emit_structure(scanner, structure, handler)?;
					probe = scanner.index;
				}
				None => probe = at + 1,
			}
		}

		self.flush_text(scanner, source.len(), handler)
	}

	/// Where the close tag of the raw text element `element` starts.
	fn raw_text_end(&self, source: &str, from: usize, element: &str) -> Option<usize> {
		memmem::find_iter(&source.as_bytes()[from..], b"</")
			.map(|offset| from + offset)
			.find(|&index| {
				let name_start = index + 2;
				source
					.get(name_start..name_start + element.len())
					.is_some_and(|name| name.eq_ignore_ascii_case(element))
					&& source[name_start + element.len()..]
						.chars()
						.next()
						.is_none_or(|c| c.is_ascii_whitespace() || c == '>' || c == '/')
			})
	}

	fn flush_text<H: MarkupHandler>(
		&mut self,
		scanner: &mut Scanner<'_>,
		until: usize,
		handler: &mut H,
	) -> WeftResult<()> {
		if until <= scanner.index {
			return Ok(());
		}

		let position = scanner.here();
		let text = scanner.advance_to(until);
		self.emit(handler, MarkupEvent::Text {
			text: Cow::Borrowed(text),
			position,
		})
	}

	/// Fail in XML, treat the `<` as text in HTML.
	fn unterminated(
		&self,
		scanner: &Scanner<'_>,
		at: usize,
		structure: &'static str,
	) -> WeftResult<Option<Structure>> {
		if self.is_xml() {
			let position = scanner.position_at(at);
			return Err(WeftError::UnterminatedStructure {
				structure,
				line: position.line,
				column: position.column,
			});
		}

		Ok(None)
	}

	fn recognize(&self, scanner: &Scanner<'_>, at: usize) -> WeftResult<Option<Structure>> {
		let source = scanner.source;
		let bytes = source.as_bytes();
		let rest = &source[at..];

		if rest.starts_with("<!--") {
			if self.config.special_comments {
				if rest.starts_with("<!--/*/") {
					let from = at + 7;
					if let Some(close) = memmem::find(&bytes[from..], b"/*/-->") {
						return Ok(Some(Structure::PrototypeComment {
							inner: from..from + close,
							end: from + close + 6,
						}));
					}
				} else if rest.starts_with("<!--/*") {
					return match parser_level_comment_end(source, at + 6) {
						Some(end) => Ok(Some(Structure::ParserLevelComment { end })),
						None if self.is_xml() => self.unterminated(scanner, at, "parser-level comment"),
						None => {
							Ok(Some(Structure::ParserLevelComment {
								end: source.len(),
							}))
						}
					};
				}
			}

			return match memmem::find(&bytes[at + 4..], b"-->") {
				Some(close) => {
					Ok(Some(Structure::Comment {
						end: at + 4 + close + 3,
					}))
				}
				None => self.unterminated(scanner, at, "comment"),
			};
		}

		if rest.starts_with("<![CDATA[") {
			return match memmem::find(&bytes[at + 9..], b"]]>") {
				Some(close) => {
					Ok(Some(Structure::Cdata {
						end: at + 9 + close + 3,
					}))
				}
				None => self.unterminated(scanner, at, "CDATA section"),
			};
		}

		if rest
			.get(2..9)
			.is_some_and(|keyword| keyword.eq_ignore_ascii_case("doctype"))
			&& rest.starts_with("<!")
		{
			return match doctype_end(source, at + 2) {
				Some(end)
					if self.is_html()
						&& prolog::parse_doctype(&source[at..end], &source[at + 2..end - 1], Position::START)
							.is_err() =>
				{
					Ok(None)
				}
				Some(end) => Ok(Some(Structure::DocType { end })),
				None => self.unterminated(scanner, at, DOCTYPE_CLAUSE),
			};
		}

		if rest.starts_with("<?") {
			let target_end = source[at + 2..]
				.find(|c: char| c.is_ascii_whitespace() || c == '?')
				.map_or(source.len(), |offset| at + 2 + offset);
			if target_end == at + 2 {
				return Ok(None);
			}

			let Some(close) = memmem::find(&bytes[target_end..], b"?>") else {
				return self.unterminated(scanner, at, "processing instruction");
			};
			let end = target_end + close + 2;

			if source[at + 2..target_end].eq_ignore_ascii_case("xml") {
				// HTML reads a declaration it cannot parse as text.
				if self.is_html()
					&& prolog::parse_xml_declaration(&source[at..end], &source[at + 2..end - 2], Position::START)
						.is_err()
				{
					return Ok(None);
				}
				return Ok(Some(Structure::XmlDeclaration { end }));
			}
			return Ok(Some(Structure::ProcessingInstruction { target_end, end }));
		}

		if rest.starts_with("</") {
			return self.recognize_close_tag(scanner, at);
		}

		match rest[1..].chars().next() {
			Some(c) if is_name_start(c) => self.recognize_open_tag(scanner, at),
			_ => Ok(None),
		}
	}

	fn recognize_close_tag(&self, scanner: &Scanner<'_>, at: usize) -> WeftResult<Option<Structure>> {
		let source = scanner.source;
		let name_start = at + 2;

		if !source[name_start..].chars().next().is_some_and(is_name_start) {
			return Ok(None);
		}

		let name_end = name_end(source, name_start);
		let whitespace_end = whitespace_end(source, name_end);

		if source[whitespace_end..].starts_with('>') {
			return Ok(Some(Structure::CloseTag(CloseTag {
				name: name_start..name_end,
				whitespace: name_end..whitespace_end,
				end: whitespace_end + 1,
			})));
		}

		self.unterminated(scanner, at, "close tag")
	}

	fn recognize_open_tag(&self, scanner: &Scanner<'_>, at: usize) -> WeftResult<Option<Structure>> {
		let source = scanner.source;
		let name = at + 1..name_end(source, at + 1);
		let mut parts = vec![];
		let mut index = name.end;

		loop {
			let rest = &source[index..];
			let Some(c) = rest.chars().next() else {
				return self.unterminated(scanner, at, "element tag");
			};

			if c.is_ascii_whitespace() {
				let end = whitespace_end(source, index);
				parts.push(TagPart::Whitespace(index..end));
				index = end;
				continue;
			}

			if rest.starts_with("/>") || c == '>' {
				let minimized = c == '/';
				let end = index + if minimized { 2 } else { 1 };
				return Ok(Some(Structure::OpenTag(Tag {
					name,
					parts,
					end: index..end,
					minimized,
				})));
			}

			if c == '<' {
				return self.unterminated(scanner, at, "element tag");
			}

			if c == '/' {
				if self.is_xml() {
					return Err(self.malformed_attribute(scanner, index, "/", "unexpected `/`"));
				}
				parts.push(TagPart::Whitespace(index..index + 1));
				index += 1;
				continue;
			}

			let Some((part, next)) = self.recognize_attribute(scanner, index)? else {
				return Ok(None);
			};

			if self.config.unique_attributes {
				self.check_unique(scanner, &parts, &part)?;
			}
			parts.push(part);
			index = next;
		}
	}

	fn recognize_attribute(
		&self,
		scanner: &Scanner<'_>,
		index: usize,
	) -> WeftResult<Option<(TagPart, usize)>> {
		let source = scanner.source;
		let bytes = source.as_bytes();
		let first = bytes[index];

		if self.is_xml() && matches!(first, b'=' | b'"' | b'\'') {
			return Err(self.malformed_attribute(
				scanner,
				index,
				&source[index..=index],
				"missing attribute name",
			));
		}

		let first_len = source[index..].chars().next().map_or(1, char::len_utf8);
		let name = index..name_end(source, index + first_len);
		let name_text = &source[name.clone()];
		let after_name = whitespace_end(source, name.end);

		if !source[after_name..].starts_with('=') {
			if self.is_xml() {
				return Err(self.malformed_attribute(
					scanner,
					index,
					name_text,
					"attribute has no value",
				));
			}

			let empty = name.end..name.end;
			return Ok(Some((
				TagPart::Attribute {
					name: name.clone(),
					operator: empty.clone(),
					value: empty.clone(),
					quoted: empty,
				},
				name.end,
			)));
		}

		let value_start = whitespace_end(source, after_name + 1);
		let operator = name.end..value_start;

		match bytes.get(value_start) {
			Some(&quote @ (b'"' | b'\'')) => {
				let Some(close) = memchr::memchr(quote, &bytes[value_start + 1..]) else {
					if self.is_xml() {
						return Err(self.malformed_attribute(
							scanner,
							index,
							name_text,
							"unterminated quoted value",
						));
					}
					return Ok(None);
				};
				let close = value_start + 1 + close;

				Ok(Some((
					TagPart::Attribute {
						name,
						operator,
						value: value_start + 1..close,
						quoted: value_start..close + 1,
					},
					close + 1,
				)))
			}
			_ if self.is_xml() => {
				let position = scanner.position_at(index);
				Err(WeftError::UnquotedAttributeValue {
					name: name_text.to_string(),
					line: position.line,
					column: position.column,
				})
			}
			_ => {
				let end = source[value_start..]
					.find(|c: char| c.is_ascii_whitespace() || c == '>')
					.map_or(source.len(), |offset| value_start + offset);

				Ok(Some((
					TagPart::Attribute {
						name,
						operator,
						value: value_start..end,
						quoted: value_start..end,
					},
					end,
				)))
			}
		}
	}

	fn check_unique(
		&self,
		scanner: &Scanner<'_>,
		parts: &[TagPart],
		part: &TagPart,
	) -> WeftResult<()> {
		let TagPart::Attribute { name, .. } = part else {
			return Ok(());
		};
		let name_text = scanner.slice(name.clone());

		let duplicate = parts.iter().any(|existing| {
			matches!(existing, TagPart::Attribute { name: existing, .. }
				if self.config.names_equal(scanner.slice(existing.clone()), name_text))
		});

		if duplicate {
			let position = scanner.position_at(name.start);
			return Err(WeftError::DuplicateAttribute {
				name: name_text.to_string(),
				line: position.line,
				column: position.column,
			});
		}

		Ok(())
	}

	fn malformed_attribute(
		&self,
		scanner: &Scanner<'_>,
		index: usize,
		name: &str,
		reason: &str,
	) -> WeftError {
		let position = scanner.position_at(index);
		WeftError::MalformedAttribute {
			name: name.to_string(),
			reason: reason.to_string(),
			line: position.line,
			column: position.column,
		}
	}

	fn emit_structure<H: MarkupHandler>(
		&mut self,
		scanner: &mut Scanner<'_>,
		structure: Structure,
		handler: &mut H,
	) -> WeftResult<()> {
		let at = scanner.index;
		let position = scanner.here();

		match structure {
			Structure::Comment { end } => {
				scanner.advance_to(end);
				let content = scanner.slice(at + 4..end - 3);
				self.emit(handler, MarkupEvent::Comment {
					content: Cow::Borrowed(content),
					position,
				})
			}
			Structure::ParserLevelComment { end } => {
				scanner.advance_to(end);
				Ok(())
			}
			Structure::PrototypeComment { inner, end } => {
				scanner.advance_to(inner.start);
				let start = scanner.here();
				self.parse_embedded(scanner.slice(inner.clone()), start, handler)?;
				scanner.advance_to(end);
				Ok(())
			}
			Structure::Cdata { end } => {
				scanner.advance_to(end);
				let content = scanner.slice(at + 9..end - 3);
				self.emit(handler, MarkupEvent::CdataSection {
					content: Cow::Borrowed(content),
					position,
				})
			}
			Structure::DocType { end } => {
				self.check_doctype(position)?;
				let outer = scanner.slice(at..end);
				let inner = scanner.slice(at + 2..end - 1);
				let doctype = prolog::parse_doctype(outer, inner, position)?;
				scanner.advance_to(end);
				self.seen_doctype = true;
				self.emit(handler, MarkupEvent::DocType(doctype))
			}
			Structure::XmlDeclaration { end } => {
				self.check_xml_declaration(position)?;
				let outer = scanner.slice(at..end);
				let inner = scanner.slice(at + 2..end - 2);
				let declaration = prolog::parse_xml_declaration(outer, inner, position)?;
				scanner.advance_to(end);
				self.seen_xml_declaration = true;
				self.emit(handler, MarkupEvent::XmlDeclaration(declaration))
			}
			Structure::ProcessingInstruction { target_end, end } => {
				scanner.advance_to(end);
				let target = scanner.slice(at + 2..target_end);
				let content = scanner.slice(target_end..end - 2).trim_start();
				self.emit(handler, MarkupEvent::ProcessingInstruction {
					target: Cow::Borrowed(target),
					content: (!content.is_empty()).then_some(Cow::Borrowed(content)),
					outer: Cow::Borrowed(scanner.slice(at..end)),
					position,
				})
			}
			Structure::OpenTag(tag) => self.emit_open_tag(scanner, tag, position, handler),
			Structure::CloseTag(tag) => self.emit_close_tag(scanner, tag, position, handler),
		}
	}

	fn check_xml_declaration(&self, position: Position) -> WeftResult<()> {
		if self.config.xml_declaration == PrologPresence::Forbidden {
			return Err(WeftError::PrologForbidden {
				structure: XML_DECLARATION,
				line: position.line,
				column: position.column,
			});
		}

		let misplaced = self.seen_xml_declaration
			|| self.seen_element
			|| (self.is_xml() && (self.emitted || self.contexts.len() > 1));
		if misplaced {
			return Err(WeftError::MisplacedProlog {
				structure: XML_DECLARATION,
				line: position.line,
				column: position.column,
			});
		}

		Ok(())
	}

	fn check_doctype(&self, position: Position) -> WeftResult<()> {
		if self.config.doctype == PrologPresence::Forbidden {
			return Err(WeftError::PrologForbidden {
				structure: DOCTYPE_CLAUSE,
				line: position.line,
				column: position.column,
			});
		}

		if self.seen_doctype || self.seen_element {
			return Err(WeftError::MisplacedProlog {
				structure: DOCTYPE_CLAUSE,
				line: position.line,
				column: position.column,
			});
		}

		Ok(())
	}

	/// Fail when a required prolog item has not appeared by `position`.
	fn check_required_prolog(&self, position: Position) -> WeftResult<()> {
		let missing = if self.config.xml_declaration == PrologPresence::Required
			&& !self.seen_xml_declaration
		{
			Some(XML_DECLARATION)
		} else if self.config.doctype == PrologPresence::Required && !self.seen_doctype {
			Some(DOCTYPE_CLAUSE)
		} else {
			None
		};

		match missing {
			Some(structure) => {
				Err(WeftError::PrologRequired {
					structure,
					line: position.line,
					column: position.column,
				})
			}
			None => Ok(()),
		}
	}

	fn emit_open_tag<H: MarkupHandler>(
		&mut self,
		scanner: &mut Scanner<'_>,
		tag: Tag,
		position: Position,
		handler: &mut H,
	) -> WeftResult<()> {
		let name = scanner.slice(tag.name.clone());

		if !self.seen_element {
			self.check_required_prolog(position)?;
			self.seen_element = true;
		}

		let void = !tag.minimized && self.is_html() && is_one_of(name, &VOID_ELEMENTS);
		let standalone = tag.minimized || void;

		if self.config.element_balancing == ElementBalancing::AutoClose && self.is_html() {
			self.close_implied(name, position, handler)?;
		}

		scanner.advance_to(tag.name.end);
		self.emit(handler, if standalone {
			MarkupEvent::StandaloneElementStart {
				name: Cow::Borrowed(name),
				minimized: tag.minimized,
				position,
			}
		} else {
			MarkupEvent::OpenElementStart {
				name: Cow::Borrowed(name),
				position,
			}
		})?;

		for part in tag.parts {
			match part {
				TagPart::Whitespace(range) => {
					let position = scanner.here();
					let whitespace = scanner.advance_to(range.end);
					self.emit(handler, MarkupEvent::InnerWhitespace {
						whitespace: Cow::Borrowed(whitespace),
						position,
					})?;
				}
				TagPart::Attribute {
					name,
					operator,
					value,
					quoted,
				} => {
					let position = scanner.here();
					let name = scanner.advance_to(name.end);
					let operator = scanner.advance_to(operator.end);
					let mut value_position = scanner.here();
					if quoted.start < value.start {
						value_position.column += 1;
					}
					let quoted_value = scanner.advance_to(quoted.end);

					self.emit(handler, MarkupEvent::Attribute(AttributeEvent {
						name: Cow::Borrowed(name),
						operator: Cow::Borrowed(operator),
						value: Cow::Borrowed(scanner.slice(value)),
						quoted_value: Cow::Borrowed(quoted_value),
						position,
						value_position,
					}))?;
				}
			}
		}

		let end_position = scanner.here();
		scanner.advance_to(tag.end.end);

		if standalone {
			return self.emit(handler, MarkupEvent::StandaloneElementEnd {
				name: Cow::Borrowed(name),
				minimized: tag.minimized,
				position: end_position,
			});
		}

		self.emit(handler, MarkupEvent::OpenElementEnd {
			name: Cow::Borrowed(name),
			position: end_position,
		})?;

		if self.config.element_balancing != ElementBalancing::NoBalancing {
			self.open_elements.push(OpenElement {
				name: name.to_string(),
				position,
			});
		}

		if self.is_html() && is_one_of(name, &RAW_TEXT_ELEMENTS) {
			self.raw_text = Some(name.to_string());
		}

		Ok(())
	}

	/// Auto-close the innermost elements that cannot contain `opening`.
	fn close_implied<H: MarkupHandler>(
		&mut self,
		opening: &str,
		position: Position,
		handler: &mut H,
	) -> WeftResult<()> {
		let closes = implied_end_tags(opening);

		while self
			.open_elements
			.last()
			.is_some_and(|open| is_one_of(&open.name, closes))
		{
			self.auto_close_last(position, handler)?;
		}

		Ok(())
	}

	fn auto_close_last<H: MarkupHandler>(
		&mut self,
		position: Position,
		handler: &mut H,
	) -> WeftResult<()> {
		let Some(open) = self.open_elements.pop() else {
			return Ok(());
		};

		tracing::trace!(element = %open.name, %position, "auto-closing element");
		self.emit(handler, MarkupEvent::AutoCloseElementStart {
			name: Cow::Borrowed(&open.name),
			position,
		})?;
		self.emit(handler, MarkupEvent::AutoCloseElementEnd {
			name: Cow::Borrowed(&open.name),
			position,
		})
	}

	fn emit_close_tag<H: MarkupHandler>(
		&mut self,
		scanner: &mut Scanner<'_>,
		tag: CloseTag,
		position: Position,
		handler: &mut H,
	) -> WeftResult<()> {
		let name = scanner.slice(tag.name.clone());
		let matched = self
			.open_elements
			.iter()
			.rposition(|open| self.config.names_equal(&open.name, name));

		let unmatched = match self.config.element_balancing {
			ElementBalancing::NoBalancing => false,
			ElementBalancing::AutoClose => {
				match matched {
					Some(index) => {
						while self.open_elements.len() > index + 1 {
							self.auto_close_last(position, handler)?;
						}
						self.open_elements.pop();
						false
					}
					None => true,
				}
			}
			ElementBalancing::RequireBalanced => {
				let depth = self.open_elements.len();
				match matched {
					Some(index) if index + 1 == depth => {
						self.open_elements.pop();
						false
					}
					Some(_) => {
						let expected = self
							.open_elements
							.last()
							.map(|open| open.name.clone())
							.unwrap_or_default();
						return Err(WeftError::UnbalancedElement {
							name: name.to_string(),
							expected,
							line: position.line,
							column: position.column,
						});
					}
					None => {
						return Err(WeftError::UnmatchedCloseElement {
							name: name.to_string(),
							line: position.line,
							column: position.column,
						});
					}
				}
			}
		};

		scanner.advance_to(tag.name.end);
		self.emit(handler, if unmatched {
			MarkupEvent::UnmatchedCloseElementStart {
				name: Cow::Borrowed(name),
				position,
			}
		} else {
			MarkupEvent::CloseElementStart {
				name: Cow::Borrowed(name),
				position,
			}
		})?;

		if !tag.whitespace.is_empty() {
			let whitespace_position = scanner.here();
			let whitespace = scanner.advance_to(tag.whitespace.end);
			self.emit(handler, MarkupEvent::InnerWhitespace {
				whitespace: Cow::Borrowed(whitespace),
				position: whitespace_position,
			})?;
		}

		let end_position = scanner.here();
		scanner.advance_to(tag.end);
		self.emit(handler, if unmatched {
			MarkupEvent::UnmatchedCloseElementEnd {
				name: Cow::Borrowed(name),
				position: end_position,
			}
		} else {
			MarkupEvent::CloseElementEnd {
				name: Cow::Borrowed(name),
				position: end_position,
			}
		})
	}

	/// Apply the balancing policy to elements still open at `end`.
	fn finish<H: MarkupHandler>(&mut self, end: Position, handler: &mut H) -> WeftResult<()> {
		if !self.seen_element {
			self.check_required_prolog(end)?;
		}

		match self.config.element_balancing {
			ElementBalancing::NoBalancing => Ok(()),
			ElementBalancing::AutoClose => {
				while !self.open_elements.is_empty() {
					self.auto_close_last(end, handler)?;
				}
				Ok(())
			}
			ElementBalancing::RequireBalanced => {
				match self.open_elements.last() {
					Some(open) => {
						Err(WeftError::UnclosedElement {
							name: open.name.clone(),
							line: open.position.line,
							column: open.position.column,
						})
					}
					None => Ok(()),
				}
			}
		}
	}
}
