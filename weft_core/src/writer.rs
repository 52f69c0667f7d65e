use crate::MarkupEvent;
use crate::MarkupHandler;
use crate::WeftResult;

/// Serializes events back into markup.
///
/// Writing the events of an untouched parse reproduces its input exactly.
/// Auto-closed elements write nothing, since nothing was written for them.
#[derive(Debug, Default, Clone)]
pub struct MarkupWriter {
	output: String,
}

impl MarkupWriter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn as_str(&self) -> &str {
		&self.output
	}

	pub fn into_string(self) -> String {
		self.output
	}
}

impl MarkupHandler for MarkupWriter {
	fn handle(&mut self, event: MarkupEvent<'_>) -> WeftResult<()> {
		let output = &mut self.output;

		match event {
			MarkupEvent::DocumentStart { .. }
			| MarkupEvent::DocumentEnd { .. }
			| MarkupEvent::AutoCloseElementStart { .. }
			| MarkupEvent::AutoCloseElementEnd { .. } => {}
			MarkupEvent::XmlDeclaration(declaration) => output.push_str(&declaration.outer),
			MarkupEvent::DocType(doctype) => output.push_str(&doctype.outer),
			MarkupEvent::ProcessingInstruction { outer, .. } => output.push_str(&outer),
			MarkupEvent::CdataSection { content, .. } => {
				output.push_str("<![CDATA[");
				output.push_str(&content);
				output.push_str("]]>");
			}
			MarkupEvent::Comment { content, .. } => {
				output.push_str("<!--");
				output.push_str(&content);
				output.push_str("-->");
			}
			MarkupEvent::Text { text, .. } => output.push_str(&text),
			MarkupEvent::InnerWhitespace { whitespace, .. } => output.push_str(&whitespace),
			MarkupEvent::Attribute(attribute) => {
				output.push_str(&attribute.name);
				output.push_str(&attribute.operator);
				output.push_str(&attribute.quoted_value);
			}
			MarkupEvent::OpenElementStart { name, .. }
			| MarkupEvent::StandaloneElementStart { name, .. } => {
				output.push('<');
				output.push_str(&name);
			}
			MarkupEvent::CloseElementStart { name, .. }
			| MarkupEvent::UnmatchedCloseElementStart { name, .. } => {
				output.push_str("</");
				output.push_str(&name);
			}
			MarkupEvent::OpenElementEnd { .. }
			| MarkupEvent::CloseElementEnd { .. }
			| MarkupEvent::UnmatchedCloseElementEnd { .. } => output.push('>'),
			MarkupEvent::StandaloneElementEnd { minimized, .. } => {
				output.push_str(if minimized { "/>" } else { ">" });
			}
		}

		Ok(())
	}
}
