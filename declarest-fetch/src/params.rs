//! Templated request parameters, headers, and bodies.
//!
//! Keys are literal; values are templates evaluated per page. A value that
//! evaluates to an empty string is dropped, so `cursor: "{{ next_page_token.cursor }}"`
//! simply disappears on the first page instead of being sent as `cursor=`.

use std::collections::BTreeMap;

use declarest_core::{
    Bindings, Config, PaginationContext, ParameterProvider, RequestBody, Template, TemplateError,
};
use serde_json::{Map, Value};

// ============================================================================
// Interpolated Mapping
// ============================================================================

/// A string-to-template mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpolatedMapping {
    entries: Vec<(String, Template)>,
}

impl InterpolatedMapping {
    /// Compiles every value of the mapping.
    pub fn parse<I, K, V>(pairs: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let entries = pairs
            .into_iter()
            .map(|(key, value)| Ok((key.into(), Template::parse(value.as_ref())?)))
            .collect::<Result<_, TemplateError>>()?;
        Ok(Self { entries })
    }

    /// Returns true if the mapping has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluates every value, dropping the empty ones.
    pub fn eval(&self, config: &Config, context: &PaginationContext) -> BTreeMap<String, String> {
        let bindings = Bindings::from(context);
        self.entries
            .iter()
            .filter_map(|(key, template)| {
                let value = template.eval(config, &bindings);
                (!value.is_empty()).then(|| (key.clone(), value))
            })
            .collect()
    }
}

// ============================================================================
// Parameter Provider
// ============================================================================

/// Query parameters from an [`InterpolatedMapping`].
#[derive(Debug, Clone, Default)]
pub struct InterpolatedParameterProvider {
    mapping: InterpolatedMapping,
    config: Config,
}

impl InterpolatedParameterProvider {
    /// Creates a provider that evaluates `mapping` against `config`.
    pub fn new(mapping: InterpolatedMapping, config: Config) -> Self {
        Self { mapping, config }
    }
}

impl ParameterProvider for InterpolatedParameterProvider {
    fn params(&self, context: &PaginationContext) -> BTreeMap<String, String> {
        self.mapping.eval(&self.config, context)
    }
}

// ============================================================================
// JSON Bodies
// ============================================================================

/// A JSON document whose string leaves are templates.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpolatedJson {
    /// A string leaf.
    Template(Template),
    /// An array.
    Array(Vec<InterpolatedJson>),
    /// An object, in source order.
    Object(Vec<(String, InterpolatedJson)>),
    /// A non-string scalar, kept as-is.
    Scalar(Value),
}

impl InterpolatedJson {
    /// Compiles every string leaf of `value`.
    pub fn parse(value: &Value) -> Result<Self, TemplateError> {
        Ok(match value {
            Value::String(source) => Self::Template(Template::parse(source)?),
            Value::Array(items) => Self::Array(
                items
                    .iter()
                    .map(Self::parse)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(fields) => Self::Object(
                fields
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), Self::parse(value)?)))
                    .collect::<Result<_, TemplateError>>()?,
            ),
            scalar => Self::Scalar(scalar.clone()),
        })
    }

    /// Evaluates the document.
    ///
    /// A leaf that is exactly one expression keeps the type of its value, so
    /// `"{{ config.page_size }}"` is sent as a number.
    pub fn eval(&self, config: &Config, bindings: &Bindings<'_>) -> Value {
        match self {
            Self::Template(template) => template.eval_value(config, bindings),
            Self::Array(items) => Value::Array(items.iter().map(|i| i.eval(config, bindings)).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.eval(config, bindings)))
                    .collect(),
            ),
            Self::Scalar(value) => value.clone(),
        }
    }
}

// ============================================================================
// Body
// ============================================================================

/// Uncompiled body definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BodyDefinition {
    /// No body.
    #[default]
    None,
    /// JSON body; string leaves are templates.
    Json(Value),
    /// Form body; values are templates.
    Form(BTreeMap<String, String>),
    /// Raw body template.
    Raw(String),
}

/// A compiled body template.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InterpolatedBody {
    /// No body.
    #[default]
    Empty,
    /// JSON body.
    Json(InterpolatedJson),
    /// Form body.
    Form(InterpolatedMapping),
    /// Raw body.
    Raw(Template),
}

impl InterpolatedBody {
    /// Compiles a body definition.
    pub fn parse(definition: &BodyDefinition) -> Result<Self, TemplateError> {
        Ok(match definition {
            BodyDefinition::None => Self::Empty,
            BodyDefinition::Json(value) => Self::Json(InterpolatedJson::parse(value)?),
            BodyDefinition::Form(fields) => Self::Form(InterpolatedMapping::parse(fields)?),
            BodyDefinition::Raw(source) => Self::Raw(Template::parse(source)?),
        })
    }

    /// Evaluates the body for one page.
    ///
    /// Top-level JSON fields that evaluate to empty strings are dropped, the
    /// same way empty parameters are. Nested values are kept as they are.
    pub fn eval(&self, config: &Config, context: &PaginationContext) -> RequestBody {
        match self {
            Self::Empty => RequestBody::Empty,
            Self::Json(json) => {
                let value = match json.eval(config, &Bindings::from(context)) {
                    Value::Object(fields) => Value::Object(
                        fields
                            .into_iter()
                            .filter(|(_, v)| v.as_str() != Some(""))
                            .collect::<Map<_, _>>(),
                    ),
                    other => other,
                };
                RequestBody::Json(value)
            }
            Self::Form(mapping) => RequestBody::Form(mapping.eval(config, context)),
            Self::Raw(template) => RequestBody::Raw(template.eval(config, &Bindings::from(context))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> Config {
        Config::from_value(json!({"page_size": 50, "tenant": "acme"})).unwrap()
    }

    #[test]
    fn test_mapping_drops_empty_values() {
        let mapping = InterpolatedMapping::parse([
            ("limit", "{{ config.page_size }}"),
            ("cursor", "{{ next_page_token.cursor }}"),
        ])
        .unwrap();

        let first = mapping.eval(&config(), &PaginationContext::new());
        assert_eq!(first.len(), 1);
        assert_eq!(first["limit"], "50");

        let next = PaginationContext::new().with_next_page_token(json!({"cursor": "c2"}));
        let second = mapping.eval(&config(), &next);
        assert_eq!(second["cursor"], "c2");
    }

    #[test]
    fn test_mapping_rejects_bad_template() {
        let err = InterpolatedMapping::parse([("limit", "{{ config.page_size")]).unwrap_err();
        assert!(err.message.contains("unclosed"));
    }

    #[test]
    fn test_provider_passes_context_through() {
        let provider = InterpolatedParameterProvider::new(
            InterpolatedMapping::parse([("since", "{{ stream_slice.start }}")]).unwrap(),
            config(),
        );
        let context = PaginationContext::new().with_slice(json!({"start": "2024-01-01"}));
        assert_eq!(provider.params(&context)["since"], "2024-01-01");
    }

    #[test]
    fn test_json_body() {
        let body = InterpolatedBody::parse(&BodyDefinition::Json(json!({
            "tenant": "{{ config.tenant }}",
            "cursor": "{{ next_page_token.cursor }}",
            "limit": 10,
            "filters": [{"field": "{{ stream_slice.field }}"}]
        })))
        .unwrap();

        let context = PaginationContext::new().with_slice(json!({"field": "status"}));
        assert_eq!(
            body.eval(&config(), &context),
            RequestBody::Json(json!({
                "tenant": "acme",
                "limit": 10,
                "filters": [{"field": "status"}]
            }))
        );
    }

    #[test]
    fn test_json_body_keeps_value_types() {
        let body = InterpolatedBody::parse(&BodyDefinition::Json(json!({
            "limit": "{{ config.page_size }}",
            "label": "size {{ config.page_size }}",
            "ids": "{{ stream_slice.ids }}",
            "active": "{{ stream_slice.active }}"
        })))
        .unwrap();

        let context = PaginationContext::new().with_slice(json!({"ids": [1, 2], "active": false}));
        assert_eq!(
            body.eval(&config(), &context),
            RequestBody::Json(json!({
                "limit": 50,
                "label": "size 50",
                "ids": [1, 2],
                "active": false
            }))
        );
    }

    #[test]
    fn test_form_and_raw_bodies() {
        let mut fields = BTreeMap::new();
        fields.insert("grant".to_string(), "{{ config.tenant }}".to_string());
        let form = InterpolatedBody::parse(&BodyDefinition::Form(fields)).unwrap();
        let RequestBody::Form(evaluated) = form.eval(&config(), &PaginationContext::new()) else {
            panic!("expected a form body");
        };
        assert_eq!(evaluated["grant"], "acme");

        let raw = InterpolatedBody::parse(&BodyDefinition::Raw("q={{ config.tenant }}".into())).unwrap();
        assert_eq!(
            raw.eval(&config(), &PaginationContext::new()),
            RequestBody::Raw("q=acme".to_string())
        );
    }

    #[test]
    fn test_no_body() {
        let body = InterpolatedBody::parse(&BodyDefinition::None).unwrap();
        assert_eq!(body.eval(&config(), &PaginationContext::new()), RequestBody::Empty);
    }
}
