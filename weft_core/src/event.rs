use std::borrow::Cow;
use std::fmt;

use derive_more::Deref;
use serde::Serialize;

use crate::Position;
use crate::WeftResult;

/// An `<?xml ...?>` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XmlDeclaration<'a> {
	pub keyword: Cow<'a, str>,
	pub version: Option<Cow<'a, str>>,
	pub encoding: Option<Cow<'a, str>>,
	pub standalone: Option<Cow<'a, str>>,
	/// The full declaration as written, including `<?` and `?>`.
	pub outer: Cow<'a, str>,
	pub position: Position,
}

/// A `<!DOCTYPE ...>` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocType<'a> {
	pub keyword: Cow<'a, str>,
	pub element_name: Cow<'a, str>,
	/// `PUBLIC` or `SYSTEM`, as written.
	pub kind: Option<Cow<'a, str>>,
	pub public_id: Option<Cow<'a, str>>,
	pub system_id: Option<Cow<'a, str>>,
	pub internal_subset: Option<Cow<'a, str>>,
	pub outer: Cow<'a, str>,
	pub position: Position,
}

/// An attribute inside an open or standalone tag.
///
/// `name`, `operator` and `quoted_value` concatenate to the attribute as
/// written. An attribute without a value has an empty operator and value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeEvent<'a> {
	pub name: Cow<'a, str>,
	/// `=` with any whitespace around it.
	pub operator: Cow<'a, str>,
	pub value: Cow<'a, str>,
	pub quoted_value: Cow<'a, str>,
	pub position: Position,
	pub value_position: Position,
}

impl AttributeEvent<'_> {
	pub fn has_value(&self) -> bool {
		!self.operator.is_empty()
	}

	pub fn into_owned(self) -> AttributeEvent<'static> {
		AttributeEvent {
			name: owned(self.name),
			operator: owned(self.operator),
			value: owned(self.value),
			quoted_value: owned(self.quoted_value),
			position: self.position,
			value_position: self.value_position,
		}
	}
}

/// One structural unit of a markup template.
///
/// Text spans borrow from the source being parsed and are only valid for the
/// duration of a single handler call. Use [`MarkupEvent::into_owned`] to
/// keep an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarkupEvent<'a> {
	DocumentStart {
		position: Position,
	},
	DocumentEnd {
		position: Position,
	},
	XmlDeclaration(XmlDeclaration<'a>),
	DocType(DocType<'a>),
	CdataSection {
		content: Cow<'a, str>,
		position: Position,
	},
	Text {
		text: Cow<'a, str>,
		position: Position,
	},
	Comment {
		content: Cow<'a, str>,
		position: Position,
	},
	Attribute(AttributeEvent<'a>),
	OpenElementStart {
		name: Cow<'a, str>,
		position: Position,
	},
	OpenElementEnd {
		name: Cow<'a, str>,
		position: Position,
	},
	StandaloneElementStart {
		name: Cow<'a, str>,
		/// Written as `<name/>` rather than a void `<name>`.
		minimized: bool,
		position: Position,
	},
	StandaloneElementEnd {
		name: Cow<'a, str>,
		minimized: bool,
		position: Position,
	},
	CloseElementStart {
		name: Cow<'a, str>,
		position: Position,
	},
	CloseElementEnd {
		name: Cow<'a, str>,
		position: Position,
	},
	/// An element closed implicitly. Nothing was written for it.
	AutoCloseElementStart {
		name: Cow<'a, str>,
		position: Position,
	},
	AutoCloseElementEnd {
		name: Cow<'a, str>,
		position: Position,
	},
	/// A close tag with no matching open element.
	UnmatchedCloseElementStart {
		name: Cow<'a, str>,
		position: Position,
	},
	UnmatchedCloseElementEnd {
		name: Cow<'a, str>,
		position: Position,
	},
	/// Whitespace between attributes, or before the end of a tag.
	InnerWhitespace {
		whitespace: Cow<'a, str>,
		position: Position,
	},
	ProcessingInstruction {
		target: Cow<'a, str>,
		content: Option<Cow<'a, str>>,
		outer: Cow<'a, str>,
		position: Position,
	},
}

impl MarkupEvent<'_> {
	pub fn position(&self) -> Position {
		match self {
			Self::DocumentStart { position }
			| Self::DocumentEnd { position }
			| Self::CdataSection { position, .. }
			| Self::Text { position, .. }
			| Self::Comment { position, .. }
			| Self::OpenElementStart { position, .. }
			| Self::OpenElementEnd { position, .. }
			| Self::StandaloneElementStart { position, .. }
			| Self::StandaloneElementEnd { position, .. }
			| Self::CloseElementStart { position, .. }
			| Self::CloseElementEnd { position, .. }
			| Self::AutoCloseElementStart { position, .. }
			| Self::AutoCloseElementEnd { position, .. }
			| Self::UnmatchedCloseElementStart { position, .. }
			| Self::UnmatchedCloseElementEnd { position, .. }
			| Self::InnerWhitespace { position, .. }
			| Self::ProcessingInstruction { position, .. } => *position,
			Self::XmlDeclaration(declaration) => declaration.position,
			Self::DocType(doctype) => doctype.position,
			Self::Attribute(attribute) => attribute.position,
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::DocumentStart { .. } => "document-start",
			Self::DocumentEnd { .. } => "document-end",
			Self::XmlDeclaration(_) => "xml-declaration",
			Self::DocType(_) => "doctype",
			Self::CdataSection { .. } => "cdata",
			Self::Text { .. } => "text",
			Self::Comment { .. } => "comment",
			Self::Attribute(_) => "attribute",
			Self::OpenElementStart { .. } => "open-start",
			Self::OpenElementEnd { .. } => "open-end",
			Self::StandaloneElementStart { .. } => "standalone-start",
			Self::StandaloneElementEnd { .. } => "standalone-end",
			Self::CloseElementStart { .. } => "close-start",
			Self::CloseElementEnd { .. } => "close-end",
			Self::AutoCloseElementStart { .. } => "auto-close-start",
			Self::AutoCloseElementEnd { .. } => "auto-close-end",
			Self::UnmatchedCloseElementStart { .. } => "unmatched-close-start",
			Self::UnmatchedCloseElementEnd { .. } => "unmatched-close-end",
			Self::InnerWhitespace { .. } => "whitespace",
			Self::ProcessingInstruction { .. } => "processing-instruction",
		}
	}

	/// Copy every borrowed span so the event outlives the source.
	pub fn into_owned(self) -> MarkupEvent<'static> {
		match self {
			Self::DocumentStart { position } => MarkupEvent::DocumentStart { position },
			Self::DocumentEnd { position } => MarkupEvent::DocumentEnd { position },
			Self::XmlDeclaration(declaration) => {
				MarkupEvent::XmlDeclaration(XmlDeclaration {
					keyword: owned(declaration.keyword),
					version: declaration.version.map(owned),
					encoding: declaration.encoding.map(owned),
					standalone: declaration.standalone.map(owned),
					outer: owned(declaration.outer),
					position: declaration.position,
				})
			}
			Self::DocType(doctype) => {
				MarkupEvent::DocType(DocType {
					keyword: owned(doctype.keyword),
					element_name: owned(doctype.element_name),
					kind: doctype.kind.map(owned),
					public_id: doctype.public_id.map(owned),
					system_id: doctype.system_id.map(owned),
					internal_subset: doctype.internal_subset.map(owned),
					outer: owned(doctype.outer),
					position: doctype.position,
				})
			}
			Self::CdataSection { content, position } => {
				MarkupEvent::CdataSection {
					content: owned(content),
					position,
				}
			}
			Self::Text { text, position } => {
				MarkupEvent::Text {
					text: owned(text),
					position,
				}
			}
			Self::Comment { content, position } => {
				MarkupEvent::Comment {
					content: owned(content),
					position,
				}
			}
			Self::Attribute(attribute) => MarkupEvent::Attribute(attribute.into_owned()),
			Self::OpenElementStart { name, position } => {
				MarkupEvent::OpenElementStart {
					name: owned(name),
					position,
				}
			}
			Self::OpenElementEnd { name, position } => {
				MarkupEvent::OpenElementEnd {
					name: owned(name),
					position,
				}
			}
			Self::StandaloneElementStart {
				name,
				minimized,
				position,
			} => {
				MarkupEvent::StandaloneElementStart {
					name: owned(name),
					minimized,
					position,
				}
			}
			Self::StandaloneElementEnd {
				name,
				minimized,
				position,
			} => {
				MarkupEvent::StandaloneElementEnd {
					name: owned(name),
					minimized,
					position,
				}
			}
			Self::CloseElementStart { name, position } => {
				MarkupEvent::CloseElementStart {
					name: owned(name),
					position,
				}
			}
			Self::CloseElementEnd { name, position } => {
				MarkupEvent::CloseElementEnd {
					name: owned(name),
					position,
				}
			}
			Self::AutoCloseElementStart { name, position } => {
				MarkupEvent::AutoCloseElementStart {
					name: owned(name),
					position,
				}
			}
			Self::AutoCloseElementEnd { name, position } => {
				MarkupEvent::AutoCloseElementEnd {
					name: owned(name),
					position,
				}
			}
			Self::UnmatchedCloseElementStart { name, position } => {
				MarkupEvent::UnmatchedCloseElementStart {
					name: owned(name),
					position,
				}
			}
			Self::UnmatchedCloseElementEnd { name, position } => {
				MarkupEvent::UnmatchedCloseElementEnd {
					name: owned(name),
					position,
				}
			}
			Self::InnerWhitespace {
				whitespace,
				position,
			} => {
				MarkupEvent::InnerWhitespace {
					whitespace: owned(whitespace),
					position,
				}
			}
			Self::ProcessingInstruction {
				target,
				content,
				outer,
				position,
			} => {
				MarkupEvent::ProcessingInstruction {
					target: owned(target),
					content: content.map(owned),
					outer: owned(outer),
					position,
				}
			}
		}
	}
}

fn owned(text: Cow<'_, str>) -> Cow<'static, str> {
	Cow::Owned(text.into_owned())
}

/// One line of an event trace: `line:column kind details`.
impl fmt::Display for MarkupEvent<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}", self.position(), self.kind())?;

		match self {
			Self::DocumentStart { .. } | Self::DocumentEnd { .. } => Ok(()),
			Self::XmlDeclaration(declaration) => write!(f, " {:?}", declaration.outer),
			Self::DocType(doctype) => write!(f, " {:?}", doctype.outer),
			Self::CdataSection { content, .. } | Self::Comment { content, .. } => {
				write!(f, " {content:?}")
			}
			Self::Text { text, .. } => write!(f, " {text:?}"),
			Self::Attribute(attribute) => {
				write!(f, " {:?}", attribute.name)?;
				if attribute.has_value() {
					write!(f, " = {:?}", attribute.value)?;
				}
				Ok(())
			}
			Self::OpenElementStart { name, .. }
			| Self::OpenElementEnd { name, .. }
			| Self::StandaloneElementStart { name, .. }
			| Self::StandaloneElementEnd { name, .. }
			| Self::CloseElementStart { name, .. }
			| Self::CloseElementEnd { name, .. }
			| Self::AutoCloseElementStart { name, .. }
			| Self::AutoCloseElementEnd { name, .. }
			| Self::UnmatchedCloseElementStart { name, .. }
			| Self::UnmatchedCloseElementEnd { name, .. } => write!(f, " {name}"),
			Self::InnerWhitespace { whitespace, .. } => write!(f, " {whitespace:?}"),
			Self::ProcessingInstruction { target, .. } => write!(f, " {target}"),
		}
	}
}

/// Receives structural events in document order.
///
/// Handlers form a chain: a handler that rewrites events forwards them to the
/// next one.
pub trait MarkupHandler {
	fn handle(&mut self, event: MarkupEvent<'_>) -> WeftResult<()>;
}

impl<H: MarkupHandler + ?Sized> MarkupHandler for &mut H {
	fn handle(&mut self, event: MarkupEvent<'_>) -> WeftResult<()> {
		(**self).handle(event)
	}
}

impl<H: MarkupHandler + ?Sized> MarkupHandler for Box<H> {
	fn handle(&mut self, event: MarkupEvent<'_>) -> WeftResult<()> {
		(**self).handle(event)
	}
}

/// Keeps an owned copy of every event it receives.
#[derive(Debug, Default, Clone, Deref)]
pub struct EventRecorder {
	#[deref]
	events: Vec<MarkupEvent<'static>>,
}

impl EventRecorder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn into_events(self) -> Vec<MarkupEvent<'static>> {
		self.events
	}

	/// Send every recorded event, in order, to `handler`.
	pub fn replay<H: MarkupHandler>(&self, handler: &mut H) -> WeftResult<()> {
		for event in &self.events {
			handler.handle(event.clone())?;
		}

		Ok(())
	}

	/// The recorded events, one [`Display`](fmt::Display) line each.
	pub fn trace(&self) -> String {
		let mut trace = String::new();
		for event in &self.events {
			trace.push_str(&event.to_string());
			trace.push('\n');
		}

		trace
	}
}

impl MarkupHandler for EventRecorder {
	fn handle(&mut self, event: MarkupEvent<'_>) -> WeftResult<()> {
		self.events.push(event.into_owned());
		Ok(())
	}
}
