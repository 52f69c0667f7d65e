use std::io::Read;
use std::time::Instant;

use crate::CommentStrategy;
use crate::CommentStrippingReader;
use crate::InlinePreprocessor;
use crate::MarkupHandler;
use crate::MarkupTokenizer;
use crate::ParseConfiguration;
use crate::WeftConfig;
use crate::WeftResult;
use crate::scratch::with_scratch_buffer;

/// The assembled parsing chain: reader, tokenizer, optional inline
/// preprocessor and the caller's handler.
#[derive(Debug, Clone)]
pub struct TemplateParser {
	config: ParseConfiguration,
	comment_strategy: CommentStrategy,
	/// The dialect prefix used for inline rewriting. `None` disables it.
	inline_prefix: Option<String>,
}

impl TemplateParser {
	/// A parser that handles special comments in the tokenizer and does not
	/// rewrite inline expressions.
	pub fn new(config: ParseConfiguration) -> Self {
		let comment_strategy = if config.special_comments {
			CommentStrategy::Tokenizer
		} else {
			CommentStrategy::Reader
		};

		Self {
			config,
			comment_strategy,
			inline_prefix: None,
		}
	}

	pub fn from_config(config: &WeftConfig) -> Self {
		let parser = Self::new(config.parse_configuration());
		if config.inline.enabled {
			parser.with_inlining(&config.inline.prefix)
		} else {
			parser
		}
	}

	#[must_use]
	pub fn with_comment_strategy(mut self, strategy: CommentStrategy) -> Self {
		self.comment_strategy = strategy;
		self.config.special_comments = strategy == CommentStrategy::Tokenizer;
		self
	}

	/// Rewrite `[[...]]` and `[(...)]` using elements and attributes with
	/// `prefix`.
	#[must_use]
	pub fn with_inlining(mut self, prefix: &str) -> Self {
		self.inline_prefix = Some(prefix.to_string());
		self
	}

	#[must_use]
	pub fn without_inlining(mut self) -> Self {
		self.inline_prefix = None;
		self
	}

	pub fn config(&self) -> &ParseConfiguration {
		&self.config
	}

	pub fn comment_strategy(&self) -> CommentStrategy {
		self.comment_strategy
	}

	pub fn inline_prefix(&self) -> Option<&str> {
		self.inline_prefix.as_deref()
	}

	/// Parse `source` and send every event to `handler`. Failures carry the
	/// `document` name.
	///
	/// With the reader strategy, special comments are stripped first and
	/// positions refer to the stripped text.
	pub fn parse_str<H: MarkupHandler>(&self, document: &str, source: &str, handler: &mut H) -> WeftResult<()> {
		match self.comment_strategy {
			CommentStrategy::Tokenizer => self.tokenize(document, source, handler),
			CommentStrategy::Reader => self.parse_reader(document, source.as_bytes(), handler),
		}
	}

	/// Read all of `reader` and parse it. I/O failures are returned
	/// unchanged.
	pub fn parse_reader<R: Read, H: MarkupHandler>(
		&self,
		document: &str,
		reader: R,
		handler: &mut H,
	) -> WeftResult<()> {
		with_scratch_buffer(|buffer| -> WeftResult<()> {
			match self.comment_strategy {
				CommentStrategy::Reader => {
					CommentStrippingReader::new(reader).read_to_string(buffer)?;
				}
				CommentStrategy::Tokenizer => {
					let mut reader = reader;
					reader.read_to_string(buffer)?;
				}
			}

			self.tokenize(document, buffer, handler)
		})
	}

	fn tokenize<H: MarkupHandler>(&self, document: &str, source: &str, handler: &mut H) -> WeftResult<()> {
		let started = Instant::now();
		tracing::debug!(
			document,
			grammar = ?self.config.grammar,
			inline = self.inline_prefix.is_some(),
			"parsing template"
		);

		let mut tokenizer = MarkupTokenizer::new(&self.config);
		let parsed = match &self.inline_prefix {
			Some(prefix) => {
				let mut preprocessor =
					InlinePreprocessor::new(&mut *handler, self.config.grammar.template_mode(), prefix);
				tokenizer.parse(source, &mut preprocessor)
			}
			None => tokenizer.parse(source, handler),
		};
		parsed.map_err(|error| error.in_template(document))?;

		tracing::trace!(document, elapsed = ?started.elapsed(), "parsed template");

		Ok(())
	}
}

impl Default for TemplateParser {
	fn default() -> Self {
		Self::new(ParseConfiguration::default())
	}
}
