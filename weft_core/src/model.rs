use std::sync::Arc;

use crate::MarkupEvent;
use crate::MarkupHandler;
use crate::Position;
use crate::TextRepository;
use crate::WeftResult;

/// The runtime variant of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
	Document,
	Element,
	CloseElement,
	Text,
	Comment,
	CdataSection,
	DocType,
	XmlDeclaration,
	ProcessingInstruction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	pub name: Arc<str>,
	/// `None` for an attribute written without `=`.
	pub value: Option<String>,
	pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
	Open,
	Standalone,
}

/// An open or standalone tag with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementTag {
	pub name: Arc<str>,
	pub kind: ElementKind,
	pub attributes: Vec<Attribute>,
	pub position: Position,
}

impl ElementTag {
	pub fn new(name: &str, kind: ElementKind, position: Position) -> Self {
		Self {
			name: Arc::from(name),
			kind,
			attributes: vec![],
			position,
		}
	}

	#[must_use]
	pub fn with_attribute(mut self, name: &str, value: Option<&str>) -> Self {
		self.attributes.push(Attribute {
			name: Arc::from(name),
			value: value.map(str::to_string),
			position: self.position,
		});
		self
	}

	/// The first attribute called `name`.
	pub fn attribute(&self, name: &str, case_sensitive: bool) -> Option<&Attribute> {
		self.attributes.iter().find(|attribute| {
			if case_sensitive {
				*attribute.name == *name
			} else {
				attribute.name.eq_ignore_ascii_case(name)
			}
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
	Explicit,
	/// Closed implicitly by the tokenizer.
	Auto,
	/// A close tag without an open element.
	Unmatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseElementTag {
	pub name: Arc<str>,
	pub kind: CloseKind,
	pub position: Position,
}

/// A structural node materialized from events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
	DocumentStart {
		position: Position,
	},
	DocumentEnd {
		position: Position,
	},
	Element(ElementTag),
	CloseElement(CloseElementTag),
	Text {
		text: Arc<str>,
		position: Position,
	},
	Comment {
		content: String,
		position: Position,
	},
	CdataSection {
		content: String,
		position: Position,
	},
	DocType {
		element_name: String,
		public_id: Option<String>,
		system_id: Option<String>,
		position: Position,
	},
	XmlDeclaration {
		version: Option<String>,
		encoding: Option<String>,
		position: Position,
	},
	ProcessingInstruction {
		target: String,
		content: Option<String>,
		position: Position,
	},
}

impl Node {
	pub fn kind(&self) -> NodeKind {
		match self {
			Self::DocumentStart { .. } | Self::DocumentEnd { .. } => NodeKind::Document,
			Self::Element(_) => NodeKind::Element,
			Self::CloseElement(_) => NodeKind::CloseElement,
			Self::Text { .. } => NodeKind::Text,
			Self::Comment { .. } => NodeKind::Comment,
			Self::CdataSection { .. } => NodeKind::CdataSection,
			Self::DocType { .. } => NodeKind::DocType,
			Self::XmlDeclaration { .. } => NodeKind::XmlDeclaration,
			Self::ProcessingInstruction { .. } => NodeKind::ProcessingInstruction,
		}
	}

	pub fn position(&self) -> Position {
		match self {
			Self::DocumentStart { position }
			| Self::DocumentEnd { position }
			| Self::Text { position, .. }
			| Self::Comment { position, .. }
			| Self::CdataSection { position, .. }
			| Self::DocType { position, .. }
			| Self::XmlDeclaration { position, .. }
			| Self::ProcessingInstruction { position, .. } => *position,
			Self::Element(element) => element.position,
			Self::CloseElement(close) => close.position,
		}
	}

	pub fn as_element(&self) -> Option<&ElementTag> {
		match self {
			Self::Element(element) => Some(element),
			_ => None,
		}
	}

	/// The element or close tag name, if this node has one.
	pub fn tag_name(&self) -> Option<&str> {
		match self {
			Self::Element(element) => Some(&element.name),
			Self::CloseElement(close) => Some(&close.name),
			_ => None,
		}
	}
}

/// Builds a flat list of [`Node`]s from events, sharing names and
/// whitespace-only text through a [`TextRepository`].
#[derive(Debug)]
pub struct ModelBuilder<'r> {
	repository: &'r TextRepository,
	nodes: Vec<Node>,
	pending: Option<ElementTag>,
}

impl<'r> ModelBuilder<'r> {
	pub fn new(repository: &'r TextRepository) -> Self {
		Self {
			repository,
			nodes: vec![],
			pending: None,
		}
	}

	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	pub fn into_nodes(self) -> Vec<Node> {
		self.nodes
	}

	fn close(&mut self, name: &str, kind: CloseKind, position: Position) {
		self.nodes.push(Node::CloseElement(CloseElementTag {
			name: self.repository.intern(name),
			kind,
			position,
		}));
	}
}

impl MarkupHandler for ModelBuilder<'_> {
	fn handle(&mut self, event: MarkupEvent<'_>) -> WeftResult<()> {
		match event {
			MarkupEvent::DocumentStart { position } => {
				self.nodes.push(Node::DocumentStart { position });
			}
			MarkupEvent::DocumentEnd { position } => self.nodes.push(Node::DocumentEnd { position }),
			MarkupEvent::XmlDeclaration(declaration) => {
				self.nodes.push(Node::XmlDeclaration {
					version: declaration.version.map(|version| version.into_owned()),
					encoding: declaration.encoding.map(|encoding| encoding.into_owned()),
					position: declaration.position,
				});
			}
			MarkupEvent::DocType(doctype) => {
				self.nodes.push(Node::DocType {
					element_name: doctype.element_name.into_owned(),
					public_id: doctype.public_id.map(|id| id.into_owned()),
					system_id: doctype.system_id.map(|id| id.into_owned()),
					position: doctype.position,
				});
			}
			MarkupEvent::CdataSection { content, position } => {
				self.nodes.push(Node::CdataSection {
					content: content.into_owned(),
					position,
				});
			}
			MarkupEvent::Comment { content, position } => {
				self.nodes.push(Node::Comment {
					content: content.into_owned(),
					position,
				});
			}
			MarkupEvent::Text { text, position } => {
				let text = if text.trim().is_empty() {
					self.repository.intern(&text)
				} else {
					Arc::from(text.as_ref())
				};
				self.nodes.push(Node::Text { text, position });
			}
			MarkupEvent::ProcessingInstruction {
				target,
				content,
				position,
				..
			} => {
				self.nodes.push(Node::ProcessingInstruction {
					target: target.into_owned(),
					content: content.map(|content| content.into_owned()),
					position,
				});
			}
			MarkupEvent::OpenElementStart { name, position } => {
				self.pending = Some(ElementTag {
					name: self.repository.intern(&name),
					kind: ElementKind::Open,
					attributes: vec![],
					position,
				});
			}
			MarkupEvent::StandaloneElementStart { name, position, .. } => {
				self.pending = Some(ElementTag {
					name: self.repository.intern(&name),
					kind: ElementKind::Standalone,
					attributes: vec![],
					position,
				});
			}
			MarkupEvent::Attribute(attribute) => {
				if let Some(element) = self.pending.as_mut() {
					element.attributes.push(Attribute {
						name: self.repository.intern(&attribute.name),
						value: attribute
							.has_value()
							.then(|| attribute.value.into_owned()),
						position: attribute.position,
					});
				}
			}
			MarkupEvent::OpenElementEnd { .. } | MarkupEvent::StandaloneElementEnd { .. } => {
				if let Some(element) = self.pending.take() {
					self.nodes.push(Node::Element(element));
				}
			}
			MarkupEvent::CloseElementStart { name, position } => {
				self.close(&name, CloseKind::Explicit, position);
			}
			MarkupEvent::AutoCloseElementStart { name, position } => {
				self.close(&name, CloseKind::Auto, position);
			}
			MarkupEvent::UnmatchedCloseElementStart { name, position } => {
				self.close(&name, CloseKind::Unmatched, position);
			}
			MarkupEvent::CloseElementEnd { .. }
			| MarkupEvent::AutoCloseElementEnd { .. }
			| MarkupEvent::UnmatchedCloseElementEnd { .. }
			| MarkupEvent::InnerWhitespace { .. } => {}
		}

		Ok(())
	}
}
