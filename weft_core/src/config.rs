use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::TemplateMode;
use crate::WeftError;
use crate::WeftResult;

/// Config file names searched for, in order, under a project root.
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["weft.toml", ".weft.toml", ".config/weft.toml"];

/// How deep prototype-only comments may embed markup inside markup.
pub const DEFAULT_MAX_EMBEDDING_DEPTH: usize = 8;

/// The default dialect prefix used by the inline-expression preprocessor.
pub const DEFAULT_DIALECT_PREFIX: &str = "th";

/// The markup grammar the tokenizer follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkupGrammar {
	#[default]
	Html,
	Xml,
}

impl MarkupGrammar {
	pub const fn template_mode(self) -> TemplateMode {
		match self {
			Self::Html => TemplateMode::Html,
			Self::Xml => TemplateMode::Xml,
		}
	}
}

/// What the tokenizer does when close tags do not line up with open ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementBalancing {
	/// Report tags exactly as written.
	#[serde(rename = "none")]
	NoBalancing,
	/// Close elements left open by a later close tag, an implied end tag or
	/// the end of the document.
	AutoClose,
	/// Treat any imbalance as a parse failure.
	RequireBalanced,
}

/// Whether an XML declaration or DOCTYPE clause may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrologPresence {
	Forbidden,
	Allowed,
	Required,
}

/// Where the two special comment syntaxes are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStrategy {
	/// Strip the comments from the character stream before tokenizing.
	/// Positions refer to the filtered text.
	Reader,
	/// Let the tokenizer recognize the comments. Positions refer to the
	/// original text.
	#[default]
	Tokenizer,
}

/// Parse-time toggles for the markup tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParseConfiguration {
	pub grammar: MarkupGrammar,
	/// Compare element names case-sensitively when balancing.
	pub case_sensitive: bool,
	pub element_balancing: ElementBalancing,
	/// Reject elements that declare the same attribute twice.
	pub unique_attributes: bool,
	pub xml_declaration: PrologPresence,
	pub doctype: PrologPresence,
	/// Recognize prototype-only (`<!--/*/ ... /*/-->`) and parser-level
	/// (`<!--/* ... */-->`) comments in the tokenizer.
	pub special_comments: bool,
	pub max_embedding_depth: usize,
}

impl ParseConfiguration {
	pub fn html() -> Self {
		Self {
			grammar: MarkupGrammar::Html,
			case_sensitive: false,
			element_balancing: ElementBalancing::AutoClose,
			unique_attributes: false,
			xml_declaration: PrologPresence::Allowed,
			doctype: PrologPresence::Allowed,
			special_comments: true,
			max_embedding_depth: DEFAULT_MAX_EMBEDDING_DEPTH,
		}
	}

	pub fn xml() -> Self {
		Self {
			grammar: MarkupGrammar::Xml,
			case_sensitive: true,
			element_balancing: ElementBalancing::RequireBalanced,
			unique_attributes: true,
			xml_declaration: PrologPresence::Allowed,
			doctype: PrologPresence::Allowed,
			special_comments: true,
			max_embedding_depth: DEFAULT_MAX_EMBEDDING_DEPTH,
		}
	}

	pub fn for_grammar(grammar: MarkupGrammar) -> Self {
		match grammar {
			MarkupGrammar::Html => Self::html(),
			MarkupGrammar::Xml => Self::xml(),
		}
	}

	/// Compare two element or attribute names under this configuration's
	/// case rule.
	pub fn names_equal(&self, left: &str, right: &str) -> bool {
		if self.case_sensitive {
			left == right
		} else {
			left.eq_ignore_ascii_case(right)
		}
	}
}

impl Default for ParseConfiguration {
	fn default() -> Self {
		Self::html()
	}
}

/// Optional `[parser]` entries applied on top of the grammar's preset.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ParserOverrides {
	#[serde(default)]
	pub case_sensitive: Option<bool>,
	#[serde(default)]
	pub element_balancing: Option<ElementBalancing>,
	#[serde(default)]
	pub unique_attributes: Option<bool>,
	#[serde(default)]
	pub xml_declaration: Option<PrologPresence>,
	#[serde(default)]
	pub doctype: Option<PrologPresence>,
	#[serde(default)]
	pub max_embedding_depth: Option<usize>,
}

/// The `[inline]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InlineConfig {
	/// Rewrite `[[...]]` and `[(...)]` in text.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Dialect prefix used for the synthetic block element and its
	/// attributes.
	#[serde(default = "default_prefix")]
	pub prefix: String,
}

impl Default for InlineConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			prefix: default_prefix(),
		}
	}
}

/// The `[interner]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InternerConfig {
	/// Total bytes of text the interner may hold before it stops caching.
	#[serde(default = "default_interner_size")]
	pub max_size: usize,
}

impl Default for InternerConfig {
	fn default() -> Self {
		Self {
			max_size: default_interner_size(),
		}
	}
}

/// The `[comments]` section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CommentsConfig {
	#[serde(default)]
	pub strategy: CommentStrategy,
}

fn default_true() -> bool {
	true
}

fn default_prefix() -> String {
	DEFAULT_DIALECT_PREFIX.to_string()
}

fn default_interner_size() -> usize {
	crate::DEFAULT_REPOSITORY_MAX_SIZE
}

/// Configuration loaded from a `weft.toml` file.
///
/// ```toml
/// template_mode = "xml"
///
/// [parser]
/// element_balancing = "auto_close"
/// doctype = "forbidden"
///
/// [inline]
/// enabled = true
/// prefix = "th"
///
/// [interner]
/// max_size = 2000000
///
/// [comments]
/// strategy = "reader"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct WeftConfig {
	/// The markup grammar of templates.
	#[serde(default)]
	pub template_mode: MarkupGrammar,
	#[serde(default)]
	pub parser: ParserOverrides,
	#[serde(default)]
	pub inline: InlineConfig,
	#[serde(default)]
	pub interner: InternerConfig,
	#[serde(default)]
	pub comments: CommentsConfig,
}

impl WeftConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if the file does not exist.
	pub fn load(root: &Path) -> WeftResult<Option<WeftConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		Self::from_toml_str(&content).map(Some)
	}

	pub fn from_toml_str(content: &str) -> WeftResult<WeftConfig> {
		toml::from_str(content).map_err(|e| WeftError::ConfigParse(e.to_string()))
	}

	/// The grammar preset with every `[parser]` override applied.
	pub fn parse_configuration(&self) -> ParseConfiguration {
		let mut config = ParseConfiguration::for_grammar(self.template_mode);
		let overrides = &self.parser;

		if let Some(case_sensitive) = overrides.case_sensitive {
			config.case_sensitive = case_sensitive;
		}
		if let Some(balancing) = overrides.element_balancing {
			config.element_balancing = balancing;
		}
		if let Some(unique) = overrides.unique_attributes {
			config.unique_attributes = unique;
		}
		if let Some(presence) = overrides.xml_declaration {
			config.xml_declaration = presence;
		}
		if let Some(presence) = overrides.doctype {
			config.doctype = presence;
		}
		if let Some(depth) = overrides.max_embedding_depth {
			config.max_embedding_depth = depth;
		}
		config.special_comments = self.comments.strategy == CommentStrategy::Tokenizer;

		config
	}
}
