//! Declarative requester definitions.
//!
//! A definition is the YAML (or JSON) form of an [`HttpRequester`]:
//!
//! ```yaml
//! name: items
//! url_base: "https://api.example.com"
//! path: "/v1/items/{{ stream_slice.id }}"
//! http_method: GET
//! request_parameters:
//!   limit: "{{ config.page_size }}"
//! authenticator:
//!   type: Bearer
//!   api_token: "{{ config.token }}"
//! retry:
//!   max_retries: 3
//!   retry_factor: 2
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use declarest_core::{Authenticator, Config, CoreError, Decoder, Template};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{ApiKeyAuthenticator, ApiKeyLocation, BasicAuthenticator, BearerAuthenticator, NoAuth};
use crate::decoder::{JsonDecoder, JsonLinesDecoder, XmlDecoder};
use crate::error::FetchError;
use crate::params::BodyDefinition;
use crate::requester::HttpRequester;
use crate::retry::{DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_FACTOR, DefaultRetryPolicy};

// ============================================================================
// Requester Definition
// ============================================================================

/// The declarative form of a requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequesterDefinition {
    /// Stream name.
    pub name: String,
    /// Base URL template.
    pub url_base: String,
    /// Path template.
    #[serde(default)]
    pub path: String,
    /// Method name, case-insensitive.
    #[serde(default = "default_method")]
    pub http_method: String,
    /// Query parameter templates.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_parameters: BTreeMap<String, String>,
    /// Header templates.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: BTreeMap<String, String>,
    /// JSON body; string leaves are templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body_json: Option<Value>,
    /// Form body templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body_data: Option<BTreeMap<String, String>>,
    /// Raw body template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    /// Credentials.
    #[serde(default)]
    pub authenticator: AuthenticatorDefinition,
    /// Response format.
    #[serde(default)]
    pub decoder: DecoderDefinition,
    /// Retry behavior.
    #[serde(default)]
    pub retry: RetryDefinition,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RequesterDefinition {
    /// Parses a YAML definition.
    pub fn from_yaml_str(source: &str) -> Result<Self, FetchError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Parses a JSON definition.
    pub fn from_json_str(source: &str) -> Result<Self, FetchError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Builds the requester, resolving credentials against `config`.
    pub fn build(&self, config: Config) -> Result<HttpRequester, FetchError> {
        let authenticator = self.authenticator.build(&config)?;
        let retry_policy = self.retry.build()?;

        let mut builder = HttpRequester::builder(&self.name, config)
            .url_base(&self.url_base)
            .path(&self.path)
            .method_name(&self.http_method)
            .body(self.body()?)
            .authenticator(authenticator)
            .decoder(self.decoder.build())
            .retry_policy(Arc::new(retry_policy));
        for (name, template) in &self.request_parameters {
            builder = builder.param(name, template);
        }
        for (name, template) in &self.request_headers {
            builder = builder.header(name, template);
        }
        builder.build()
    }

    fn body(&self) -> Result<BodyDefinition, CoreError> {
        match (&self.request_body_json, &self.request_body_data, &self.request_body) {
            (None, None, None) => Ok(BodyDefinition::None),
            (Some(json), None, None) => Ok(BodyDefinition::Json(json.clone())),
            (None, Some(form), None) => Ok(BodyDefinition::Form(form.clone())),
            (None, None, Some(raw)) => Ok(BodyDefinition::Raw(raw.clone())),
            _ => Err(CoreError::InvalidConfig(
                "at most one of request_body_json, request_body_data, request_body may be set"
                    .to_string(),
            )),
        }
    }
}

// ============================================================================
// Authenticator Definition
// ============================================================================

/// Declarative credentials. Secrets are templates, usually over `config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthenticatorDefinition {
    /// No credentials.
    #[default]
    NoAuth,
    /// Bearer token.
    Bearer {
        /// Token template.
        api_token: String,
    },
    /// API key in a header or query parameter.
    ApiKey {
        /// Header or parameter name.
        header: String,
        /// Key template.
        api_token: String,
        /// Where the key goes.
        #[serde(default)]
        inject_into: ApiKeyLocation,
    },
    /// HTTP basic auth.
    Basic {
        /// Username template.
        username: String,
        /// Password template.
        #[serde(default)]
        password: String,
    },
}

impl AuthenticatorDefinition {
    fn build(&self, config: &Config) -> Result<Arc<dyn Authenticator>, CoreError> {
        Ok(match self {
            Self::NoAuth => Arc::new(NoAuth),
            Self::Bearer { api_token } => Arc::new(BearerAuthenticator::from_template(
                &Template::parse(api_token)?,
                config,
            )?),
            Self::ApiKey {
                header,
                api_token,
                inject_into,
            } => Arc::new(ApiKeyAuthenticator::from_template(
                header,
                &Template::parse(api_token)?,
                *inject_into,
                config,
            )?),
            Self::Basic { username, password } => Arc::new(BasicAuthenticator::from_templates(
                &Template::parse(username)?,
                &Template::parse(password)?,
                config,
            )?),
        })
    }
}

// ============================================================================
// Decoder Definition
// ============================================================================

/// Declarative response format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoderDefinition {
    /// A JSON document.
    #[default]
    Json,
    /// Newline-delimited JSON.
    JsonLines,
    /// An XML document.
    Xml,
}

impl DecoderDefinition {
    fn build(self) -> Arc<dyn Decoder> {
        match self {
            Self::Json => Arc::new(JsonDecoder),
            Self::JsonLines => Arc::new(JsonLinesDecoder),
            Self::Xml => Arc::new(XmlDecoder),
        }
    }
}

// ============================================================================
// Retry Definition
// ============================================================================

/// Declarative retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryDefinition {
    /// Maximum retries after the first attempt. `null` means unlimited.
    pub max_retries: Option<u32>,
    /// Backoff factor in seconds.
    pub retry_factor: f64,
    /// Upper bound for any single delay, in seconds.
    pub max_backoff_secs: u64,
    /// Extra statuses to retry.
    pub retry_statuses: Vec<u16>,
    /// Extra statuses to accept.
    pub success_statuses: Vec<u16>,
    /// Honor `Retry-After` headers.
    pub respect_retry_after: bool,
    /// Fail on non-retryable error statuses instead of decoding them.
    pub raise_on_http_errors: bool,
}

impl Default for RetryDefinition {
    fn default() -> Self {
        Self {
            max_retries: Some(DEFAULT_MAX_RETRIES),
            retry_factor: DEFAULT_RETRY_FACTOR,
            max_backoff_secs: DEFAULT_MAX_BACKOFF.as_secs(),
            retry_statuses: Vec::new(),
            success_statuses: Vec::new(),
            respect_retry_after: true,
            raise_on_http_errors: true,
        }
    }
}

impl RetryDefinition {
    fn build(&self) -> Result<DefaultRetryPolicy, CoreError> {
        if !self.retry_factor.is_finite() || self.retry_factor < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "retry_factor must be a non-negative number, got {}",
                self.retry_factor
            )));
        }

        let mut policy = match self.max_retries {
            Some(max) => DefaultRetryPolicy::new(max),
            None => DefaultRetryPolicy::unlimited(),
        }
        .with_retry_factor(self.retry_factor)
        .with_max_backoff(Duration::from_secs(self.max_backoff_secs))
        .with_retry_after(self.respect_retry_after);
        for status in &self.retry_statuses {
            policy = policy.with_retry_status(*status);
        }
        for status in &self.success_statuses {
            policy = policy.with_success_status(*status);
        }
        if !self.raise_on_http_errors {
            policy = policy.ignore_http_errors();
        }
        Ok(policy)
    }
}
