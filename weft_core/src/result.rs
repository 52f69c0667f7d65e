use std::borrow::Cow;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::TemplateMode;
use crate::WeftError;
use crate::WeftResult;

/// The strategy used to rewrite text containing inline expressions.
pub trait TextInliner: fmt::Debug + Send + Sync {
	fn name(&self) -> &str;
	fn template_mode(&self) -> TemplateMode;
}

impl PartialEq for dyn TextInliner {
	fn eq(&self, other: &Self) -> bool {
		self.name() == other.name() && self.template_mode() == other.template_mode()
	}
}

/// The inliner used for text in a template mode's own syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardTextInliner {
	mode: TemplateMode,
}

impl StandardTextInliner {
	pub fn new(mode: TemplateMode) -> Self {
		Self { mode }
	}
}

impl TextInliner for StandardTextInliner {
	fn name(&self) -> &str {
		match self.mode {
			TemplateMode::Html => "standard-html",
			TemplateMode::Xml => "standard-xml",
			TemplateMode::Text => "standard-text",
			TemplateMode::JavaScript => "standard-javascript",
			TemplateMode::Css => "standard-css",
			TemplateMode::Raw => "standard-raw",
		}
	}

	fn template_mode(&self) -> TemplateMode {
		self.mode
	}
}

/// Whether a value was set, distinguishing "not set" from "set to nothing".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment<T> {
	Unset,
	Set(T),
}

impl<T> Default for Assignment<T> {
	fn default() -> Self {
		Self::Unset
	}
}

impl<T> Assignment<T> {
	pub const fn is_set(&self) -> bool {
		matches!(self, Self::Set(_))
	}

	pub const fn as_ref(&self) -> Assignment<&T> {
		match self {
			Self::Unset => Assignment::Unset,
			Self::Set(value) => Assignment::Set(value),
		}
	}

	pub fn into_option(self) -> Option<T> {
		match self {
			Self::Unset => None,
			Self::Set(value) => Some(value),
		}
	}
}

/// The side effects a processor declares for the rest of its node's subtree.
///
/// Built once per execution and read-only afterwards. The default value is
/// the OK result, which changes nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorResult {
	local_variables: Option<BTreeMap<String, Value>>,
	selection_target: Assignment<Value>,
	text_inliner: Assignment<Option<Arc<dyn TextInliner>>>,
}

impl ProcessorResult {
	pub const fn ok() -> Self {
		Self {
			local_variables: None,
			selection_target: Assignment::Unset,
			text_inliner: Assignment::Unset,
		}
	}

	/// True only for a result that sets nothing.
	pub fn is_ok(&self) -> bool {
		self.local_variables.is_none()
			&& !self.selection_target.is_set()
			&& !self.text_inliner.is_set()
	}

	#[must_use]
	pub fn with_local_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.local_variables
			.get_or_insert_with(BTreeMap::new)
			.insert(name.into(), value.into());
		self
	}

	/// Add every variable in `variables`. An empty iterator leaves the result
	/// unchanged.
	#[must_use]
	pub fn with_local_variables<K, V>(mut self, variables: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		for (name, value) in variables {
			self = self.with_local_variable(name, value);
		}
		self
	}

	/// `Value::Null` clears the selection target for the subtree.
	#[must_use]
	pub fn with_selection_target(mut self, target: impl Into<Value>) -> Self {
		self.selection_target = Assignment::Set(target.into());
		self
	}

	/// `None` disables inlining for the subtree.
	#[must_use]
	pub fn with_text_inliner(mut self, inliner: Option<Arc<dyn TextInliner>>) -> Self {
		self.text_inliner = Assignment::Set(inliner);
		self
	}

	pub fn local_variables(&self) -> Option<&BTreeMap<String, Value>> {
		self.local_variables.as_ref()
	}

	pub fn selection_target(&self) -> Assignment<&Value> {
		self.selection_target.as_ref()
	}

	pub fn text_inliner(&self) -> Assignment<&Option<Arc<dyn TextInliner>>> {
		self.text_inliner.as_ref()
	}
}

/// Local variables declared at one nesting level.
#[derive(Debug, PartialEq)]
struct VariableScope {
	level: usize,
	variables: BTreeMap<String, Value>,
	parent: Option<Arc<VariableScope>>,
}

/// The state visible to a processor: scoped local variables, the selection
/// target and the text inliner.
///
/// Scopes are shared between clones, so deriving arguments for a child node
/// never copies the parent's variables. Equality compares by value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionArguments {
	scope: Option<Arc<VariableScope>>,
	selection_target: Value,
	text_inliner: Option<Arc<dyn TextInliner>>,
}

impl ExecutionArguments {
	pub fn new() -> Self {
		Self::default()
	}

	/// Arguments with `variables` at the root level.
	pub fn with_variables<K, V>(variables: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		let variables: BTreeMap<String, Value> = variables
			.into_iter()
			.map(|(name, value)| (name.into(), value.into()))
			.collect();

		Self {
			scope: (!variables.is_empty()).then(|| {
				Arc::new(VariableScope {
					level: 0,
					variables,
					parent: None,
				})
			}),
			..Self::default()
		}
	}

	/// The innermost visible value of `name`.
	pub fn variable(&self, name: &str) -> Option<&Value> {
		let mut scope = self.scope.as_deref();
		while let Some(current) = scope {
			if let Some(value) = current.variables.get(name) {
				return Some(value);
			}
			scope = current.parent.as_deref();
		}
		None
	}

	/// Every visible variable, inner scopes shadowing outer ones.
	pub fn variables(&self) -> BTreeMap<&str, &Value> {
		let mut scopes = vec![];
		let mut scope = self.scope.as_deref();
		while let Some(current) = scope {
			scopes.push(current);
			scope = current.parent.as_deref();
		}

		let mut visible = BTreeMap::new();
		for current in scopes.into_iter().rev() {
			for (name, value) in &current.variables {
				visible.insert(name.as_str(), value);
			}
		}
		visible
	}

	/// The nesting level of the innermost scope.
	pub fn scope_level(&self) -> Option<usize> {
		self.scope.as_ref().map(|scope| scope.level)
	}

	pub fn selection_target(&self) -> Option<&Value> {
		(!self.selection_target.is_null()).then_some(&self.selection_target)
	}

	pub fn has_selection_target(&self) -> bool {
		!self.selection_target.is_null()
	}

	pub fn text_inliner(&self) -> Option<&Arc<dyn TextInliner>> {
		self.text_inliner.as_ref()
	}

	/// Merge `result` into these arguments for a node at nesting `level`.
	///
	/// The OK result borrows `self` unchanged. Variables declared at the same
	/// level as the innermost scope extend it, otherwise they open a new
	/// scope over it.
	pub fn apply(&self, result: &ProcessorResult, level: usize) -> Cow<'_, Self> {
		if result.is_ok() {
			return Cow::Borrowed(self);
		}

		let mut merged = self.clone();

		if let Some(variables) = result.local_variables() {
			let scope = match self.scope.as_deref() {
				Some(current) if current.level == level => {
					let mut extended = current.variables.clone();
					extended.extend(
						variables
							.iter()
							.map(|(name, value)| (name.clone(), value.clone())),
					);
					VariableScope {
						level,
						variables: extended,
						parent: current.parent.clone(),
					}
				}
				_ => {
					VariableScope {
						level,
						variables: variables.clone(),
						parent: self.scope.clone(),
					}
				}
			};
			merged.scope = Some(Arc::new(scope));
		}

		if let Assignment::Set(target) = result.selection_target() {
			merged.selection_target = target.clone();
		}

		if let Assignment::Set(inliner) = result.text_inliner() {
			merged.text_inliner = inliner.clone();
		}

		Cow::Owned(merged)
	}
}

/// Named ID counters for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSequences {
	next: HashMap<String, u64>,
}

impl IdSequences {
	pub fn new() -> Self {
		Self::default()
	}

	/// Return the next value for `id` and advance. The first value is 1.
	pub fn next_id(&mut self, id: &str) -> u64 {
		let next = self.next.entry(id.to_string()).or_insert(1);
		let current = *next;
		*next += 1;
		current
	}

	/// The value [`IdSequences::next_id`] would return.
	pub fn peek_next_id(&self, id: &str) -> u64 {
		self.next.get(id).copied().unwrap_or(1)
	}

	/// The last value returned for `id`.
	pub fn previous_id(&self, id: &str) -> WeftResult<u64> {
		self.next
			.get(id)
			.map(|next| next - 1)
			.ok_or_else(|| WeftError::MissingIdSequence(id.to_string()))
	}
}
