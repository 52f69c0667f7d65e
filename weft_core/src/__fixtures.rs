use std::io;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use serde_json::Value;

use super::*;

/// Tokenize `source` with `config` and record every event.
pub fn record(config: &ParseConfiguration, source: &str) -> WeftResult<EventRecorder> {
	let mut recorder = EventRecorder::new();
	MarkupTokenizer::new(config).parse(source, &mut recorder)?;
	Ok(recorder)
}

pub fn html_trace(source: &str) -> WeftResult<String> {
	record(&ParseConfiguration::html(), source).map(|recorder| recorder.trace())
}

/// Tokenize HTML `source` through the inline preprocessor with prefix `th`.
pub fn inline_trace(source: &str) -> WeftResult<String> {
	let mut recorder = EventRecorder::new();
	TemplateParser::new(ParseConfiguration::html())
		.with_inlining("th")
		.parse_str("inline.html", source, &mut recorder)?;
	Ok(recorder.trace())
}

/// The number of synthetic blocks opened in a trace.
pub fn block_count(trace: &str) -> usize {
	trace.matches("open-start th:block").count()
}

/// Run `source` through the comment-stripping reader, fed `chunk` bytes at
/// a time.
pub fn strip(source: &str, chunk: usize) -> io::Result<String> {
	let mut output = String::new();
	CommentStrippingReader::with_capacity(16, TrickleReader::new(source.as_bytes(), chunk))
		.read_to_string(&mut output)?;
	Ok(output)
}

/// Hands out at most `chunk` bytes per read.
pub struct TrickleReader<'a> {
	data: &'a [u8],
	chunk: usize,
}

impl<'a> TrickleReader<'a> {
	pub fn new(data: &'a [u8], chunk: usize) -> Self {
		Self { data, chunk }
	}
}

impl Read for TrickleReader<'_> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let count = self.chunk.min(buf.len()).min(self.data.len());
		buf[..count].copy_from_slice(&self.data[..count]);
		self.data = &self.data[count..];
		Ok(count)
	}
}

/// Returns its data, then fails.
pub struct FailingReader<'a> {
	pub data: &'a [u8],
}

impl Read for FailingReader<'_> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if self.data.is_empty() {
			return Err(io::Error::new(io::ErrorKind::ConnectionReset, "source went away"));
		}

		let count = buf.len().min(self.data.len());
		buf[..count].copy_from_slice(&self.data[..count]);
		self.data = &self.data[count..];
		Ok(count)
	}
}

pub fn element(name: &str, attributes: &[(&str, Option<&str>)]) -> Node {
	let tag = attributes.iter().fold(
		ElementTag::new(name, ElementKind::Open, Position::START),
		|tag, (name, value)| tag.with_attribute(name, *value),
	);
	Node::Element(tag)
}

pub fn close_element(name: &str) -> Node {
	Node::CloseElement(CloseElementTag {
		name: Arc::from(name),
		kind: CloseKind::Explicit,
		position: Position::START,
	})
}

pub fn text(content: &str) -> Node {
	Node::Text {
		text: Arc::from(content),
		position: Position::START,
	}
}

pub fn html_context() -> MatchingContext {
	MatchingContext::new("standard", Some("th"), TemplateMode::Html)
}

pub fn xml_context() -> MatchingContext {
	MatchingContext::new("standard", Some("th"), TemplateMode::Xml)
}

/// Appends its name to the `order` variable.
#[derive(Debug)]
pub struct OrderProcessor(pub &'static str);

impl Processor for OrderProcessor {
	fn name(&self) -> &str {
		self.0
	}

	fn process(&self, _node: &Node, context: &mut ProcessorContext<'_>) -> WeftResult<ProcessorResult> {
		let mut order = match context.arguments.variable("order") {
			Some(Value::Array(order)) => order.clone(),
			_ => vec![],
		};
		order.push(Value::from(self.0));
		Ok(ProcessorResult::ok().with_local_variable("order", order))
	}
}

#[derive(Debug)]
pub struct FailingProcessor;

impl Processor for FailingProcessor {
	fn name(&self) -> &str {
		"failing"
	}

	fn process(&self, _node: &Node, _context: &mut ProcessorContext<'_>) -> WeftResult<ProcessorResult> {
		Err(WeftError::Processing("boom".into()))
	}
}

/// Counts its executions.
#[derive(Debug, Clone, Default)]
pub struct CountingProcessor(pub Arc<AtomicUsize>);

impl CountingProcessor {
	pub fn calls(&self) -> usize {
		self.0.load(Ordering::SeqCst)
	}
}

impl Processor for CountingProcessor {
	fn name(&self) -> &str {
		"counting"
	}

	fn process(&self, _node: &Node, _context: &mut ProcessorContext<'_>) -> WeftResult<ProcessorResult> {
		self.0.fetch_add(1, Ordering::SeqCst);
		Ok(ProcessorResult::ok())
	}
}

/// Gives every element a generated `id` variable.
#[derive(Debug)]
pub struct IdProcessor;

impl Processor for IdProcessor {
	fn name(&self) -> &str {
		"id"
	}

	fn process(&self, _node: &Node, context: &mut ProcessorContext<'_>) -> WeftResult<ProcessorResult> {
		let id = context.id_sequences.next_id("field");
		Ok(ProcessorResult::ok().with_local_variable("id", format!("field{id}")))
	}
}

pub struct TestDialect {
	pub name: &'static str,
	pub prefix: Option<&'static str>,
	pub registrations: Vec<ProcessorRegistration>,
}

impl TestDialect {
	pub fn new(name: &'static str, registrations: Vec<ProcessorRegistration>) -> Self {
		Self {
			name,
			prefix: Some("th"),
			registrations,
		}
	}
}

impl Dialect for TestDialect {
	fn name(&self) -> &str {
		self.name
	}

	fn default_prefix(&self) -> Option<&str> {
		self.prefix
	}

	fn processors(&self) -> Vec<ProcessorRegistration> {
		self.registrations.clone()
	}
}

pub fn ordered(name: &'static str, precedence: i32) -> ProcessorRegistration {
	ProcessorRegistration::new(ProcessorMatcher::any_element(), precedence, OrderProcessor(name))
}
