//! Rewrites inline output expressions in text into synthetic block
//! elements.
//!
//! With the `th` prefix, `Hi [[${name}]]!` reaches the next handler as
//!
//! ```text
//! Hi <th:block th:text="${name}"></th:block>!
//! ```
//!
//! and `[(${html})]` uses `th:utext` instead. Downstream processing then only
//! ever sees elements and attributes, and the rewritten events can be cached
//! like any other.

use std::borrow::Cow;

use quick_xml::escape::unescape;

use crate::AttributeEvent;
use crate::MarkupEvent;
use crate::MarkupHandler;
use crate::Position;
use crate::TemplateMode;
use crate::WeftResult;

/// The inline mode active from `exec_level` downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineScope {
	/// `None` is the explicit `none` mode.
	pub mode: Option<TemplateMode>,
	pub exec_level: usize,
}

/// Whether `text` contains a `[[` or `[(` opener.
pub fn might_need_inlining(text: &str) -> bool {
	let bytes = text.as_bytes();
	memchr::memchr_iter(b'[', bytes)
		.any(|index| matches!(bytes.get(index + 1), Some(b'[' | b'(')))
}

/// The next `[[` or `[(` at or after `from`.
fn find_expression_start(bytes: &[u8], from: usize) -> Option<usize> {
	memchr::memchr_iter(b'[', &bytes[from..])
		.map(|offset| from + offset)
		.find(|&index| matches!(bytes.get(index + 1), Some(b'[' | b'(')))
}

/// The index of the closer `]]` or `)]` at or after `from`, skipping quoted
/// regions.
fn find_expression_end(bytes: &[u8], from: usize, closing: u8) -> Option<usize> {
	let mut in_quotes = false;
	let mut in_apostrophes = false;

	for (index, &byte) in bytes.iter().enumerate().skip(from) {
		match byte {
			b'"' if !in_apostrophes => in_quotes = !in_quotes,
			b'\'' if !in_quotes => in_apostrophes = !in_apostrophes,
			_ if byte == closing
				&& !in_quotes
				&& !in_apostrophes
				&& bytes.get(index + 1) == Some(&b']') =>
			{
				return Some(index);
			}
			_ => {}
		}
	}

	None
}

/// A [`MarkupHandler`] that rewrites `[[...]]` and `[(...)]` in text events
/// and forwards everything to `H`.
///
/// Rewriting only happens while the inline mode of the current nesting level
/// is the host template's own mode. An element carrying `th:inline` or
/// `data-th-inline` changes the mode for its subtree.
#[derive(Debug)]
pub struct InlinePreprocessor<H> {
	next: H,
	host_mode: TemplateMode,
	inline_attribute_names: Vec<String>,
	block_element_name: String,
	escaped_attribute_name: String,
	unescaped_attribute_name: String,
	exec_level: usize,
	/// Never empty. The bottom entry is the host mode.
	scopes: Vec<InlineScope>,
	attribute_buffer: String,
}

impl<H: MarkupHandler> InlinePreprocessor<H> {
	pub fn new(next: H, host_mode: TemplateMode, prefix: &str) -> Self {
		let mut inline_attribute_names = vec![format!("{prefix}:inline")];
		if host_mode == TemplateMode::Html {
			inline_attribute_names.push(format!("data-{prefix}-inline"));
		}

		Self {
			next,
			host_mode,
			inline_attribute_names,
			block_element_name: format!("{prefix}:block"),
			escaped_attribute_name: format!("{prefix}:text"),
			unescaped_attribute_name: format!("{prefix}:utext"),
			exec_level: 0,
			scopes: vec![InlineScope {
				mode: Some(host_mode),
				exec_level: 0,
			}],
			attribute_buffer: String::new(),
		}
	}

	pub fn host_mode(&self) -> TemplateMode {
		self.host_mode
	}

	/// The inline mode for text at the current nesting level.
	pub fn current_mode(&self) -> Option<TemplateMode> {
		self.scopes.last().and_then(|scope| scope.mode)
	}

	pub fn scopes(&self) -> &[InlineScope] {
		&self.scopes
	}

	pub fn exec_level(&self) -> usize {
		self.exec_level
	}

	pub fn get_ref(&self) -> &H {
		&self.next
	}

	pub fn into_inner(self) -> H {
		self.next
	}

	fn is_inline_attribute(&self, name: &str) -> bool {
		let case_sensitive = self.host_mode == TemplateMode::Xml;
		self.inline_attribute_names.iter().any(|candidate| {
			if case_sensitive {
				candidate == name
			} else {
				candidate.eq_ignore_ascii_case(name)
			}
		})
	}

	fn set_inline_mode(&mut self, value: &str) {
		// Character references are resolved first, so `&#116;ext` is `text`.
		let value = unescape(value).unwrap_or(Cow::Borrowed(value));
		let mode = TemplateMode::parse_inline(&value).unwrap_or_else(|error| {
			tracing::warn!(%error, "disabling inlining for unrecognized inline mode");
			None
		});

		// A second inline attribute on the same element stacks another frame;
		// both are removed when the element closes.
		self.scopes.push(InlineScope {
			mode,
			exec_level: self.exec_level,
		});
	}

	fn decrease_exec_level(&mut self) {
		while self.scopes.len() > 1
			&& self
				.scopes
				.last()
				.is_some_and(|scope| scope.exec_level == self.exec_level)
		{
			self.scopes.pop();
		}
		self.exec_level = self.exec_level.saturating_sub(1);
	}

	fn handle_text(&mut self, text: &str, position: Position) -> WeftResult<()> {
		let bytes = text.as_bytes();
		let mut current = 0;
		let mut current_position = position;

		while let Some(start) = find_expression_start(bytes, current) {
			let closing = if bytes[start + 1] == b'[' { b']' } else { b')' };
			let Some(end) = find_expression_end(bytes, start + 2, closing) else {
				break;
			};

			if start > current {
				let before = &text[current..start];
				self.next.handle(MarkupEvent::Text {
					text: Cow::Borrowed(before),
					position: current_position,
				})?;
				current_position.advance_str(before);
			}

			self.emit_block(closing == b']', &text[start + 2..end], current_position)?;
			current_position.advance_str(&text[start..end + 2]);
			current = end + 2;
		}

		if current < text.len() {
			self.next.handle(MarkupEvent::Text {
				text: Cow::Borrowed(&text[current..]),
				position: current_position,
			})?;
		}

		Ok(())
	}

	/// Emit `<block attribute="expression"></block>` at `position`.
	fn emit_block(&mut self, escaped: bool, expression: &str, position: Position) -> WeftResult<()> {
		let Self {
			next,
			block_element_name,
			escaped_attribute_name,
			unescaped_attribute_name,
			attribute_buffer,
			..
		} = self;

		let attribute_name = if escaped {
			escaped_attribute_name
		} else {
			unescaped_attribute_name
		};
		let name_len = attribute_name.len();

		attribute_buffer.clear();
		attribute_buffer.push_str(attribute_name);
		attribute_buffer.push_str("=\"");
		attribute_buffer.push_str(expression);
		attribute_buffer.push('"');

		let block = block_element_name.as_str();
		let attribute_position = Position::new(position.line, position.column + 2);

		next.handle(MarkupEvent::OpenElementStart {
			name: Cow::Borrowed(block),
			position,
		})?;
		next.handle(MarkupEvent::Attribute(AttributeEvent {
			name: Cow::Borrowed(&attribute_buffer[..name_len]),
			operator: Cow::Borrowed(&attribute_buffer[name_len..=name_len]),
			value: Cow::Borrowed(&attribute_buffer[name_len + 2..attribute_buffer.len() - 1]),
			quoted_value: Cow::Borrowed(&attribute_buffer[name_len + 1..]),
			position: attribute_position,
			value_position: attribute_position,
		}))?;
		next.handle(MarkupEvent::OpenElementEnd {
			name: Cow::Borrowed(block),
			position,
		})?;
		next.handle(MarkupEvent::CloseElementStart {
			name: Cow::Borrowed(block),
			position,
		})?;
		next.handle(MarkupEvent::CloseElementEnd {
			name: Cow::Borrowed(block),
			position,
		})
	}
}

impl<H: MarkupHandler> MarkupHandler for InlinePreprocessor<H> {
	fn handle(&mut self, event: MarkupEvent<'_>) -> WeftResult<()> {
		match &event {
			MarkupEvent::Text { text, position } => {
				if self.current_mode() == Some(self.host_mode) && might_need_inlining(text) {
					return self.handle_text(text, *position);
				}
			}
			MarkupEvent::OpenElementStart { .. } | MarkupEvent::StandaloneElementStart { .. } => {
				self.exec_level += 1;
			}
			MarkupEvent::CloseElementEnd { .. }
			| MarkupEvent::StandaloneElementEnd { .. }
			| MarkupEvent::AutoCloseElementEnd { .. } => self.decrease_exec_level(),
			MarkupEvent::Attribute(attribute) if self.is_inline_attribute(&attribute.name) => {
				self.set_inline_mode(&attribute.value);
			}
			_ => {}
		}

		self.next.handle(event)
	}
}
