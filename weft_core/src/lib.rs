//! `weft_core` is the parsing and matching core of the weft template engine.
//! It turns HTML or XML templates into structural events, rewrites inline
//! output expressions into ordinary elements, and decides which dialect
//! processors run against each node and in what order.
//!
//! ## Processing Pipeline
//!
//! ```text
//! template source
//!   → CommentStrippingReader (optional: removes `<!--/* */-->`, unwraps `<!--/*/ /*/-->`)
//!   → MarkupTokenizer (events with line/column positions)
//!   → InlinePreprocessor (`[[...]]` / `[(...)]` become `th:block` elements)
//!   → your MarkupHandler (ModelBuilder, EventRecorder, MarkupWriter, ...)
//!   → DialectSet (matches processors to nodes, merges their results)
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Parser toggles and `weft.toml` loading.
//! - [`reader`]: The comment-stripping `Read` adapter.
//! - [`event`]: Structural events and the [`MarkupHandler`] trait.
//! - [`inline`]: The inline expression preprocessor.
//! - [`matcher`]: Processor matchers and matching contexts.
//!
//! ## Quick Start
//!
//! ```rust
//! use weft_core::EventRecorder;
//! use weft_core::ParseConfiguration;
//! use weft_core::TemplateParser;
//!
//! let parser = TemplateParser::new(ParseConfiguration::html()).with_inlining("th");
//! let mut recorder = EventRecorder::new();
//! parser
//! 	.parse_str("greeting.html", "<p>Hi [[${name}]]!</p>", &mut recorder)
//! 	.unwrap();
//!
//! assert!(recorder.trace().contains("open-start th:block"));
//! ```

pub use config::*;
pub use dialect::*;
pub use error::*;
pub use event::*;
pub use inline::*;
pub use interner::*;
pub use matcher::*;
pub use model::*;
pub use pipeline::*;
pub use position::*;
pub use reader::*;
pub use result::*;
pub use scratch::*;
pub use template_mode::*;
pub use tokenizer::*;
pub use writer::*;

pub mod config;
mod dialect;
#[allow(unused_assignments)]
mod error;
pub mod event;
pub mod inline;
mod interner;
pub mod matcher;
mod model;
mod pipeline;
mod position;
mod prolog;
pub mod reader;
mod result;
mod scratch;
mod template_mode;
mod tokenizer;
mod writer;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
