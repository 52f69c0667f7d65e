use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::ExecutionArguments;
use crate::IdSequences;
use crate::MatchingContext;
use crate::Node;
use crate::ProcessorMatcher;
use crate::ProcessorResult;
use crate::TemplateMode;
use crate::WeftError;
use crate::WeftResult;

/// What a processor sees while it runs against one node.
#[derive(Debug)]
pub struct ProcessorContext<'e> {
	/// The arguments after every earlier processor for this node.
	pub arguments: &'e ExecutionArguments,
	pub matching_context: &'e MatchingContext,
	pub id_sequences: &'e mut IdSequences,
	/// The nesting level of the node.
	pub level: usize,
	pub document: &'e str,
}

/// A unit of template behavior attached to matching nodes.
pub trait Processor: fmt::Debug + Send + Sync {
	fn name(&self) -> &str;
	fn process(&self, node: &Node, context: &mut ProcessorContext<'_>) -> WeftResult<ProcessorResult>;
}

/// A processor together with when and in which order it runs.
#[derive(Debug, Clone)]
pub struct ProcessorRegistration {
	pub matcher: ProcessorMatcher,
	/// Lower values run first.
	pub precedence: i32,
	pub processor: Arc<dyn Processor>,
}

impl ProcessorRegistration {
	pub fn new(matcher: ProcessorMatcher, precedence: i32, processor: impl Processor + 'static) -> Self {
		Self {
			matcher,
			precedence,
			processor: Arc::new(processor),
		}
	}
}

/// A named bundle of processors sharing one attribute and element prefix.
pub trait Dialect {
	fn name(&self) -> &str;

	/// The prefix used when none is configured. `None` leaves names
	/// unprefixed.
	fn default_prefix(&self) -> Option<&str>;

	fn processors(&self) -> Vec<ProcessorRegistration>;
}

/// A processor registered under a dialect's context.
#[derive(Debug, Clone)]
pub struct RegisteredProcessor {
	pub matcher: ProcessorMatcher,
	pub precedence: i32,
	pub processor: Arc<dyn Processor>,
	pub context: Arc<MatchingContext>,
}

impl RegisteredProcessor {
	pub fn matches(&self, node: &Node) -> bool {
		self.matcher.matches(node, &self.context)
	}
}

/// The dialects configured for one template mode, with their processors in
/// execution order.
#[derive(Debug)]
pub struct DialectSet {
	template_mode: TemplateMode,
	contexts: Vec<Arc<MatchingContext>>,
	processors: Vec<RegisteredProcessor>,
}

impl DialectSet {
	pub fn new(template_mode: TemplateMode) -> Self {
		Self {
			template_mode,
			contexts: vec![],
			processors: vec![],
		}
	}

	pub fn template_mode(&self) -> TemplateMode {
		self.template_mode
	}

	pub fn contexts(&self) -> &[Arc<MatchingContext>] {
		&self.contexts
	}

	/// Every processor in ascending precedence. Equal precedences keep their
	/// registration order.
	pub fn processors(&self) -> &[RegisteredProcessor] {
		&self.processors
	}

	/// Register `dialect` under its default prefix.
	pub fn register<D: Dialect + ?Sized>(&mut self, dialect: &D) -> WeftResult<()> {
		self.register_with_prefix(dialect, dialect.default_prefix())
	}

	/// Register `dialect` under `prefix`.
	pub fn register_with_prefix<D: Dialect + ?Sized>(
		&mut self,
		dialect: &D,
		prefix: Option<&str>,
	) -> WeftResult<()> {
		if let Some(prefix) = prefix {
			validate_prefix(prefix)?;
		}

		let name = dialect.name();
		if self
			.contexts
			.iter()
			.any(|context| context.dialect() == name && context.prefix() == prefix)
		{
			return Err(WeftError::DuplicateDialect {
				name: name.to_string(),
				prefix: prefix.unwrap_or_default().to_string(),
			});
		}

		let registrations = dialect.processors();
		for registration in &registrations {
			registration.matcher.validate()?;
		}

		let context = Arc::new(MatchingContext::new(name, prefix, self.template_mode));
		let count = registrations.len();
		self.processors
			.extend(registrations.into_iter().map(|registration| {
				RegisteredProcessor {
					matcher: registration.matcher,
					precedence: registration.precedence,
					processor: registration.processor,
					context: Arc::clone(&context),
				}
			}));
		// `sort_by_key` is stable.
		self.processors.sort_by_key(|processor| processor.precedence);
		self.contexts.push(context);

		tracing::debug!(dialect = name, prefix, processors = count, "registered dialect");

		Ok(())
	}

	/// The processors that apply to `node`, in execution order.
	pub fn matching<'s>(&'s self, node: &'s Node) -> impl Iterator<Item = &'s RegisteredProcessor> + 's {
		self.processors
			.iter()
			.filter(move |processor| processor.matches(node))
	}

	/// Run every matching processor against `node` in order, merging each
	/// result before the next processor runs.
	///
	/// The first failure stops the remaining processors and is returned with
	/// the node's position.
	pub fn process_node<'a>(
		&self,
		document: &str,
		node: &Node,
		arguments: &'a ExecutionArguments,
		level: usize,
		id_sequences: &mut IdSequences,
	) -> WeftResult<Cow<'a, ExecutionArguments>> {
		let mut current = Cow::Borrowed(arguments);

		for registered in self.matching(node) {
			let mut context = ProcessorContext {
				arguments: &current,
				matching_context: &registered.context,
				id_sequences: &mut *id_sequences,
				level,
				document,
			};
			let result = registered
				.processor
				.process(node, &mut context)
				.map_err(|error| {
					let position = node.position();
					WeftError::Processor {
						processor: registered.processor.name().to_string(),
						document: document.to_string(),
						line: position.line,
						column: position.column,
						source: Box::new(error),
					}
				})?;

			if !result.is_ok() {
				current = Cow::Owned(current.apply(&result, level).into_owned());
			}
		}

		Ok(current)
	}
}

/// Prefixes become part of element and attribute names.
fn validate_prefix(prefix: &str) -> WeftResult<()> {
	let mut chars = prefix.chars();
	let valid_start = chars
		.next()
		.is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
	let valid_rest = chars.all(|char| char.is_ascii_alphanumeric() || matches!(char, '_' | '-'));

	if valid_start && valid_rest {
		Ok(())
	} else {
		Err(WeftError::InvalidDialectPrefix(prefix.to_string()))
	}
}
