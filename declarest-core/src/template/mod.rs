//! Template evaluation.
//!
//! A [`Template`] is either a plain literal or text with embedded
//! `{{ expression }}` segments. Expressions read from the immutable
//! [`Config`] (`config`) and from the per-call [`Bindings`]
//! (`stream_state`, `stream_slice`, `next_page_token`):
//!
//! ```text
//! /v1/accounts/{{ config.account_id }}/items
//! {{ stream_slice['start'] }}
//! {{ next_page_token.cursor or 'first' }}
//! ```
//!
//! An expression ends at the first `}}` outside a quoted string.
//!
//! Templates are compiled once, when the owning requester is constructed, so
//! syntax errors surface immediately as [`TemplateError`]s. Evaluation is pure
//! and cannot fail.
//!
//! ## Missing fields render empty
//!
//! A reference to a field that exists in neither namespace renders as an
//! empty string rather than an error. `/items/{{ config.acount }}` quietly
//! becomes `/items/`. This matches how connectors treat optional values, but
//! a misspelled field name produces a malformed URL instead of a failure.

mod parser;

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::TemplateError;
use crate::models::PaginationContext;
use parser::{Expr, Operand, Path, Segment};

/// Root name for the configuration namespace.
pub const CONFIG: &str = "config";
/// Root name for the stream state binding.
pub const STREAM_STATE: &str = "stream_state";
/// Root name for the current slice binding.
pub const STREAM_SLICE: &str = "stream_slice";
/// Root name for the pagination token binding.
pub const NEXT_PAGE_TOKEN: &str = "next_page_token";

// ============================================================================
// Bindings
// ============================================================================

/// Runtime values visible to an expression next to `config`.
///
/// Bindings are additive: they live under their own root names and never
/// shadow anything in the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bindings<'a> {
    /// Bound as `stream_state`.
    pub stream_state: Option<&'a Value>,
    /// Bound as `stream_slice`.
    pub stream_slice: Option<&'a Value>,
    /// Bound as `next_page_token`.
    pub next_page_token: Option<&'a Value>,
}

impl Bindings<'_> {
    /// No runtime bindings; only `config` is visible.
    pub fn none() -> Self {
        Self::default()
    }
}

impl<'a> From<&'a PaginationContext> for Bindings<'a> {
    fn from(context: &'a PaginationContext) -> Self {
        Self {
            stream_state: Some(&context.stream_state),
            stream_slice: Some(&context.stream_slice),
            next_page_token: context.next_page_token.as_ref(),
        }
    }
}

// ============================================================================
// Template
// ============================================================================

/// A literal string or a compiled interpolated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Template {
    /// Evaluates to itself, whatever the config and bindings.
    Literal(String),
    /// Contains at least one `{{ ... }}` expression.
    Interpolated(Interpolated),
}

/// A template with expressions, compiled from its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolated {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Compiles a template. Sources without `{{` become literals.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        Ok(match parser::parse_segments(source)? {
            None => Self::Literal(source.to_string()),
            Some(segments) => Self::Interpolated(Interpolated {
                source: source.to_string(),
                segments,
            }),
        })
    }

    /// Creates a literal template without looking for expressions.
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Returns the source text.
    pub fn source(&self) -> &str {
        match self {
            Self::Literal(value) => value,
            Self::Interpolated(interpolated) => &interpolated.source,
        }
    }

    /// Returns true if the template has no expressions.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Evaluates the template.
    pub fn eval(&self, config: &Config, bindings: &Bindings<'_>) -> String {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Interpolated(interpolated) => {
                let mut out = String::with_capacity(interpolated.source.len());
                for segment in &interpolated.segments {
                    match segment {
                        Segment::Text(text) => out.push_str(text),
                        Segment::Expr(expr) => {
                            if let Some(value) = evaluate_expr(expr, config, bindings) {
                                render(&value, &mut out);
                            }
                        }
                    }
                }
                out
            }
        }
    }

    /// Evaluates the template, keeping the value's JSON type when the whole
    /// template is a single expression.
    ///
    /// `"{{ config.page_size }}"` yields the number `50` rather than the
    /// string `"50"`. Missing and `null` values yield an empty string.
    /// Anything with surrounding text is rendered as by [`Template::eval`].
    pub fn eval_value(&self, config: &Config, bindings: &Bindings<'_>) -> Value {
        if let Self::Interpolated(interpolated) = self {
            if let [Segment::Expr(expr)] = interpolated.segments.as_slice() {
                return match evaluate_expr(expr, config, bindings) {
                    None => Value::String(String::new()),
                    Some(value) if value.is_null() => Value::String(String::new()),
                    Some(value) => value.into_owned(),
                };
            }
        }
        Value::String(self.eval(config, bindings))
    }

    /// Evaluates the template against the config alone.
    pub fn eval_config(&self, config: &Config) -> String {
        self.eval(config, &Bindings::none())
    }
}

/// Compiles and evaluates `source` in one step.
pub fn evaluate(source: &str, config: &Config, bindings: &Bindings<'_>) -> Result<String, TemplateError> {
    Ok(Template::parse(source)?.eval(config, bindings))
}

impl Default for Template {
    fn default() -> Self {
        Self::Literal(String::new())
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}

impl TryFrom<String> for Template {
    type Error = TemplateError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Self::parse(&source)
    }
}

impl TryFrom<&str> for Template {
    type Error = TemplateError;

    fn try_from(source: &str) -> Result<Self, Self::Error> {
        Self::parse(source)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        match template {
            Template::Literal(value) => value,
            Template::Interpolated(interpolated) => interpolated.source,
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source())
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Returns the first truthy alternative, or the last one if none is.
fn evaluate_expr<'v>(
    expr: &'v Expr,
    config: &'v Config,
    bindings: &Bindings<'v>,
) -> Option<Cow<'v, Value>> {
    let mut last = None;
    for operand in &expr.alternatives {
        let value = match operand {
            Operand::Literal(value) => Some(Cow::Borrowed(value)),
            Operand::Path(path) => resolve(path, config, bindings),
        };
        if is_truthy(value.as_deref()) {
            return value;
        }
        last = value;
    }
    last
}

fn resolve<'v>(path: &Path, config: &'v Config, bindings: &Bindings<'v>) -> Option<Cow<'v, Value>> {
    let binding = match path.root.as_str() {
        CONFIG => {
            let map = config.as_map();
            return match path.keys.split_first() {
                None => Some(Cow::Owned(Value::Object(map.clone()))),
                Some((first, rest)) => map.get(first).and_then(|v| walk(v, rest)).map(Cow::Borrowed),
            };
        }
        STREAM_STATE => bindings.stream_state,
        STREAM_SLICE => bindings.stream_slice,
        NEXT_PAGE_TOKEN => bindings.next_page_token,
        _ => None,
    };
    binding.and_then(|v| walk(v, &path.keys)).map(Cow::Borrowed)
}

fn walk<'v>(mut value: &'v Value, keys: &[String]) -> Option<&'v Value> {
    for key in keys {
        value = match value {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Number(_)) => true,
    }
}

fn render(value: &Value, out: &mut String) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        // Compact JSON
        Value::Array(_) | Value::Object(_) => out.push_str(&value.to_string()),
    }
}
