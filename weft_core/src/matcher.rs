//! Decides which processors apply to a node.
//!
//! A [`ProcessorMatcher`] checks three things in order: the node kind, the
//! name (element, attribute, tag or processing instruction target) after
//! applying the dialect prefix from the [`MatchingContext`], and any required
//! attribute values. Each check is also exposed on its own.

use std::sync::Arc;

use crate::ElementTag;
use crate::Node;
use crate::TemplateMode;
use crate::WeftError;
use crate::WeftResult;

/// The node shape a matcher accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchingNodeKind {
	/// Open or standalone elements, by element name.
	Element,
	/// Open or standalone elements carrying an attribute, by attribute name.
	Attribute,
	/// Open, standalone and close tags, by tag name.
	Tag,
	Text,
	Comment,
	CdataSection,
	DocType,
	XmlDeclaration,
	ProcessingInstruction,
	/// The document start.
	Document,
}

/// The dialect a processor was registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchingContext {
	dialect: Arc<str>,
	prefix: Option<Arc<str>>,
	template_mode: TemplateMode,
}

impl MatchingContext {
	pub fn new(dialect: &str, prefix: Option<&str>, template_mode: TemplateMode) -> Self {
		Self {
			dialect: Arc::from(dialect),
			prefix: prefix.map(Arc::from),
			template_mode,
		}
	}

	pub fn dialect(&self) -> &str {
		&self.dialect
	}

	pub fn prefix(&self) -> Option<&str> {
		self.prefix.as_deref()
	}

	pub fn template_mode(&self) -> TemplateMode {
		self.template_mode
	}

	/// Names compare exactly in XML and ignoring ASCII case otherwise.
	pub fn is_case_sensitive(&self) -> bool {
		self.template_mode == TemplateMode::Xml
	}

	fn names_equal(&self, left: &str, right: &str) -> bool {
		if self.is_case_sensitive() {
			left == right
		} else {
			left.eq_ignore_ascii_case(right)
		}
	}

	/// `text` without a leading `head`, compared under this context's case
	/// rule.
	fn strip<'t>(&self, text: &'t str, head: &str) -> Option<&'t str> {
		let candidate = text.get(..head.len())?;
		self.names_equal(candidate, head).then(|| &text[head.len()..])
	}

	/// Whether `candidate` is the element `name` under this context's prefix.
	///
	/// With prefix `th`, `th:block` matches `block` and in HTML so does
	/// `th-block`.
	pub fn matches_element_name(&self, candidate: &str, name: &str) -> bool {
		let Some(prefix) = self.prefix() else {
			return self.names_equal(candidate, name);
		};
		let Some(rest) = self.strip(candidate, prefix) else {
			return false;
		};

		let local = match self.strip(rest, ":") {
			Some(local) => Some(local),
			None if self.template_mode == TemplateMode::Html => self.strip(rest, "-"),
			None => None,
		};
		local.is_some_and(|local| self.names_equal(local, name))
	}

	/// Whether `candidate` is the attribute `name` under this context's
	/// prefix.
	///
	/// With prefix `th`, `th:text` matches `text` and in HTML so does
	/// `data-th-text`.
	pub fn matches_attribute_name(&self, candidate: &str, name: &str) -> bool {
		let Some(prefix) = self.prefix() else {
			return self.names_equal(candidate, name);
		};

		let colon = self
			.strip(candidate, prefix)
			.and_then(|rest| self.strip(rest, ":"))
			.is_some_and(|local| self.names_equal(local, name));
		if colon || self.template_mode != TemplateMode::Html {
			return colon;
		}

		self.strip(candidate, "data-")
			.and_then(|rest| self.strip(rest, prefix))
			.and_then(|rest| self.strip(rest, "-"))
			.is_some_and(|local| self.names_equal(local, name))
	}
}

/// A name a matcher compares against, optionally subject to the dialect
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchingName {
	pub name: String,
	pub prefixed: bool,
}

/// Describes which nodes one processor applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorMatcher {
	kind: MatchingNodeKind,
	name: Option<MatchingName>,
	/// Restricts attribute matchers to one unprefixed element name.
	element: Option<String>,
	/// `None` requires presence only.
	attribute_values: Vec<(String, Option<String>)>,
}

impl ProcessorMatcher {
	fn of(kind: MatchingNodeKind, name: Option<MatchingName>) -> Self {
		Self {
			kind,
			name,
			element: None,
			attribute_values: vec![],
		}
	}

	/// Elements called `name` under the dialect prefix.
	pub fn element(name: impl Into<String>) -> Self {
		Self::of(
			MatchingNodeKind::Element,
			Some(MatchingName {
				name: name.into(),
				prefixed: true,
			}),
		)
	}

	/// Elements called exactly `name`, ignoring the dialect prefix.
	pub fn unprefixed_element(name: impl Into<String>) -> Self {
		Self::of(
			MatchingNodeKind::Element,
			Some(MatchingName {
				name: name.into(),
				prefixed: false,
			}),
		)
	}

	pub fn any_element() -> Self {
		Self::of(MatchingNodeKind::Element, None)
	}

	/// Elements carrying the attribute `name` under the dialect prefix.
	pub fn attribute(name: impl Into<String>) -> Self {
		Self::of(
			MatchingNodeKind::Attribute,
			Some(MatchingName {
				name: name.into(),
				prefixed: true,
			}),
		)
	}

	/// Open, standalone and close tags called exactly `name`.
	pub fn tag(name: impl Into<String>) -> Self {
		Self::of(
			MatchingNodeKind::Tag,
			Some(MatchingName {
				name: name.into(),
				prefixed: false,
			}),
		)
	}

	/// Open, standalone and close tags called `name` under the dialect
	/// prefix, such as both tags of `th:block`.
	pub fn prefixed_tag(name: impl Into<String>) -> Self {
		Self::of(
			MatchingNodeKind::Tag,
			Some(MatchingName {
				name: name.into(),
				prefixed: true,
			}),
		)
	}

	pub fn text() -> Self {
		Self::of(MatchingNodeKind::Text, None)
	}

	pub fn comment() -> Self {
		Self::of(MatchingNodeKind::Comment, None)
	}

	pub fn cdata_section() -> Self {
		Self::of(MatchingNodeKind::CdataSection, None)
	}

	pub fn doctype() -> Self {
		Self::of(MatchingNodeKind::DocType, None)
	}

	pub fn xml_declaration() -> Self {
		Self::of(MatchingNodeKind::XmlDeclaration, None)
	}

	/// Processing instructions, optionally only those with `target`.
	pub fn processing_instruction(target: Option<&str>) -> Self {
		Self::of(
			MatchingNodeKind::ProcessingInstruction,
			target.map(|target| {
				MatchingName {
					name: target.to_string(),
					prefixed: false,
				}
			}),
		)
	}

	pub fn document() -> Self {
		Self::of(MatchingNodeKind::Document, None)
	}

	/// Only match attributes on elements called exactly `element`.
	#[must_use]
	pub fn on_element(mut self, element: impl Into<String>) -> Self {
		self.element = Some(element.into());
		self
	}

	/// Require the attribute `name`, and if `value` is given, that exact
	/// value.
	#[must_use]
	pub fn with_attribute_value(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
		self.attribute_values
			.push((name.into(), value.map(str::to_string)));
		self
	}

	pub fn kind(&self) -> MatchingNodeKind {
		self.kind
	}

	pub fn name(&self) -> Option<&MatchingName> {
		self.name.as_ref()
	}

	pub fn attribute_values(&self) -> &[(String, Option<String>)] {
		&self.attribute_values
	}

	/// Reject matchers that can never match anything sensible.
	pub fn validate(&self) -> WeftResult<()> {
		let invalid = |reason: &str| Err(WeftError::InvalidMatcher(reason.to_string()));

		if self.name.as_ref().is_some_and(|name| name.name.is_empty()) {
			return invalid("matcher names cannot be empty");
		}
		if self.kind == MatchingNodeKind::Attribute && self.name.is_none() {
			return invalid("attribute matchers need an attribute name");
		}
		if self.element.is_some() && self.kind != MatchingNodeKind::Attribute {
			return invalid("only attribute matchers can be restricted to an element");
		}
		if self.element.as_deref().is_some_and(str::is_empty) {
			return invalid("the element restriction cannot be empty");
		}
		let filters_elements = matches!(
			self.kind,
			MatchingNodeKind::Element | MatchingNodeKind::Attribute | MatchingNodeKind::Tag
		);
		if !self.attribute_values.is_empty() && !filters_elements {
			return invalid("attribute value filters only apply to element matchers");
		}
		if self.attribute_values.iter().any(|(name, _)| name.is_empty()) {
			return invalid("attribute value filters need an attribute name");
		}

		Ok(())
	}

	/// Whether this matcher applies to `node` under `context`.
	pub fn matches(&self, node: &Node, context: &MatchingContext) -> bool {
		self.matches_kind(node)
			&& self.matches_name(node, context)
			&& self.matches_attribute_values(node, context)
	}

	pub fn matches_kind(&self, node: &Node) -> bool {
		match self.kind {
			MatchingNodeKind::Element | MatchingNodeKind::Attribute => {
				matches!(node, Node::Element(_))
			}
			MatchingNodeKind::Tag => matches!(node, Node::Element(_) | Node::CloseElement(_)),
			MatchingNodeKind::Text => matches!(node, Node::Text { .. }),
			MatchingNodeKind::Comment => matches!(node, Node::Comment { .. }),
			MatchingNodeKind::CdataSection => matches!(node, Node::CdataSection { .. }),
			MatchingNodeKind::DocType => matches!(node, Node::DocType { .. }),
			MatchingNodeKind::XmlDeclaration => matches!(node, Node::XmlDeclaration { .. }),
			MatchingNodeKind::ProcessingInstruction => {
				matches!(node, Node::ProcessingInstruction { .. })
			}
			MatchingNodeKind::Document => matches!(node, Node::DocumentStart { .. }),
		}
	}

	pub fn matches_name(&self, node: &Node, context: &MatchingContext) -> bool {
		match self.kind {
			MatchingNodeKind::Element | MatchingNodeKind::Tag => {
				let Some(candidate) = node.tag_name() else {
					return false;
				};
				self.name
					.as_ref()
					.is_none_or(|name| name_matches(name, candidate, context, false))
			}
			MatchingNodeKind::Attribute => {
				let Some(element) = node.as_element() else {
					return false;
				};
				if self
					.element
					.as_deref()
					.is_some_and(|restriction| !context.names_equal(&element.name, restriction))
				{
					return false;
				}
				self.name.as_ref().is_none_or(|name| {
					element
						.attributes
						.iter()
						.any(|attribute| name_matches(name, &attribute.name, context, true))
				})
			}
			MatchingNodeKind::ProcessingInstruction => {
				let Node::ProcessingInstruction { target, .. } = node else {
					return false;
				};
				self.name
					.as_ref()
					.is_none_or(|name| context.names_equal(target, &name.name))
			}
			MatchingNodeKind::Text
			| MatchingNodeKind::Comment
			| MatchingNodeKind::CdataSection
			| MatchingNodeKind::DocType
			| MatchingNodeKind::XmlDeclaration
			| MatchingNodeKind::Document => true,
		}
	}

	/// Close tags carry no attributes, so any filter rejects them.
	pub fn matches_attribute_values(&self, node: &Node, context: &MatchingContext) -> bool {
		if self.attribute_values.is_empty() {
			return true;
		}
		let Some(element) = node.as_element() else {
			return false;
		};

		self.attribute_values
			.iter()
			.all(|(name, value)| has_attribute_value(element, name, value.as_deref(), context))
	}
}

fn name_matches(
	name: &MatchingName,
	candidate: &str,
	context: &MatchingContext,
	attribute: bool,
) -> bool {
	match (name.prefixed, attribute) {
		(false, _) => context.names_equal(candidate, &name.name),
		(true, false) => context.matches_element_name(candidate, &name.name),
		(true, true) => context.matches_attribute_name(candidate, &name.name),
	}
}

fn has_attribute_value(
	element: &ElementTag,
	name: &str,
	required: Option<&str>,
	context: &MatchingContext,
) -> bool {
	let Some(attribute) = element.attribute(name, context.is_case_sensitive()) else {
		return false;
	};

	required.is_none_or(|required| attribute.value.as_deref() == Some(required))
}
