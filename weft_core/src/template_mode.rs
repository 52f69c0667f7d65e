use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// The grammar a template, or a region of one, is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateMode {
	Html,
	Xml,
	Text,
	#[serde(rename = "javascript")]
	JavaScript,
	Css,
	Raw,
}

impl TemplateMode {
	pub const fn is_markup(self) -> bool {
		matches!(self, Self::Html | Self::Xml)
	}

	pub const fn is_text(self) -> bool {
		matches!(self, Self::Text | Self::JavaScript | Self::Css)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Html => "HTML",
			Self::Xml => "XML",
			Self::Text => "TEXT",
			Self::JavaScript => "JAVASCRIPT",
			Self::Css => "CSS",
			Self::Raw => "RAW",
		}
	}

	/// Parse the value of an inline-mode attribute such as `th:inline="text"`.
	///
	/// `Ok(None)` is the explicit `none` mode, which disables inlining for the
	/// element's subtree.
	pub fn parse_inline(value: &str) -> Result<Option<Self>, UnknownTemplateMode> {
		let value = value.trim();
		if value.eq_ignore_ascii_case("none") {
			return Ok(None);
		}

		value.parse().map(Some)
	}
}

impl fmt::Display for TemplateMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for TemplateMode {
	type Err = UnknownTemplateMode;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		const MODES: [TemplateMode; 6] = [
			TemplateMode::Html,
			TemplateMode::Xml,
			TemplateMode::Text,
			TemplateMode::JavaScript,
			TemplateMode::Css,
			TemplateMode::Raw,
		];

		let value = value.trim();
		MODES
			.into_iter()
			.find(|mode| mode.as_str().eq_ignore_ascii_case(value))
			.ok_or_else(|| UnknownTemplateMode(value.to_string()))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown template mode `{0}`")]
pub struct UnknownTemplateMode(pub String);
