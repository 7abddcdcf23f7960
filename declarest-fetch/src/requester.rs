//! The requester: builds requests and interprets responses for one stream.
//!
//! A requester is constructed once per stream and reused for every page of
//! every slice. It keeps no per-request state: each `resolve_*` call is a pure
//! function of its arguments and the configuration captured at construction,
//! and retry bookkeeping (the attempt counter, the sleeping) belongs to the
//! caller. See [`crate::client::RequestClient`] for a loop that drives it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use declarest_core::{
    Authenticator, Config, CoreError, DecodeError, Decoder, GiveUpReason, HttpMethod,
    HttpResponse, PaginationContext, ParameterProvider, RequestBody, RequestDescriptor,
    RetryDecision, RetryPolicy, Template,
};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::auth::NoAuth;
use crate::decoder::JsonDecoder;
use crate::error::FetchError;
use crate::params::{
    BodyDefinition, InterpolatedBody, InterpolatedMapping, InterpolatedParameterProvider,
};
use crate::retry::DefaultRetryPolicy;

/// Longest response body kept in a [`FetchError::Terminal`].
const MAX_ERROR_BODY: usize = 512;

// ============================================================================
// Response Action
// ============================================================================

/// What the caller should do with a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseAction {
    /// The response was accepted and decoded.
    Records(Vec<Value>),
    /// Wait, then re-send the same request.
    Retry(Duration),
}

// ============================================================================
// Requester Trait
// ============================================================================

/// The contract between a requester and the sync loop that drives it.
///
/// Used once per page: [`Requester::build_request`], send it, then
/// [`Requester::interpret`] the response.
pub trait Requester: Send + Sync {
    /// Name of the stream this requester serves.
    fn name(&self) -> &str;

    /// Evaluates the base URL against the config.
    fn resolve_base_url(&self) -> String;

    /// Evaluates the path against the config and the pagination context.
    fn resolve_path(&self, context: &PaginationContext) -> String;

    /// The HTTP method.
    fn resolve_method(&self) -> HttpMethod;

    /// Query parameters for a page.
    fn resolve_query_params(&self, context: &PaginationContext) -> BTreeMap<String, String>;

    /// Headers for a page.
    fn resolve_headers(&self, context: &PaginationContext) -> BTreeMap<String, String>;

    /// Body for a page.
    fn resolve_body(&self, context: &PaginationContext) -> RequestBody;

    /// Applies credentials. The returned descriptor is the one to send.
    fn decorate_with_auth(&self, request: RequestDescriptor) -> RequestDescriptor;

    /// Decodes a response body into records.
    fn decode(&self, response: &HttpResponse) -> Result<Vec<Value>, DecodeError>;

    /// The retry policy used to classify responses.
    fn retry_policy(&self) -> &dyn RetryPolicy;

    /// See [`RetryPolicy::should_retry`].
    fn should_retry(&self, response: &HttpResponse) -> bool {
        self.retry_policy().should_retry(response)
    }

    /// See [`RetryPolicy::backoff_time`].
    fn backoff_time(&self, response: &HttpResponse) -> Option<Duration> {
        self.retry_policy().backoff_time(response)
    }

    /// See [`RetryPolicy::max_retries`].
    fn max_retries(&self) -> Option<u32> {
        self.retry_policy().max_retries()
    }

    /// See [`RetryPolicy::retry_factor`].
    fn retry_factor(&self) -> f64 {
        self.retry_policy().retry_factor()
    }

    /// Resolves every part of the request and applies credentials.
    fn build_request(&self, context: &PaginationContext) -> RequestDescriptor {
        let mut request = RequestDescriptor::new(
            self.resolve_method(),
            self.resolve_base_url(),
            self.resolve_path(context),
        )
        .with_body(self.resolve_body(context));
        request.query = self.resolve_query_params(context);
        for (name, value) in self.resolve_headers(context) {
            request = request.with_header(name, value);
        }

        let request = self.decorate_with_auth(request);
        debug!(
            stream = self.name(),
            method = %request.method,
            url_base = %request.url_base,
            path = %request.path,
            "Built request"
        );
        request
    }

    /// Interprets a response, given how many retries were already made.
    ///
    /// Accepted responses are decoded. Transient ones become
    /// [`ResponseAction::Retry`] until the budget runs out.
    fn interpret(
        &self,
        response: &HttpResponse,
        retries_so_far: u32,
    ) -> Result<ResponseAction, FetchError> {
        match self.retry_policy().evaluate(response, retries_so_far) {
            RetryDecision::Accept => Ok(ResponseAction::Records(self.decode(response)?)),
            RetryDecision::RetryAfter(delay) => {
                warn!(
                    stream = self.name(),
                    status = response.status,
                    retry = retries_so_far + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Transient response, retrying"
                );
                Ok(ResponseAction::Retry(delay))
            }
            RetryDecision::GiveUp(GiveUpReason::Exhausted) => {
                warn!(
                    stream = self.name(),
                    status = response.status,
                    attempts = retries_so_far + 1,
                    "Retries exhausted"
                );
                Err(FetchError::RetriesExhausted {
                    status: response.status,
                    attempts: retries_so_far + 1,
                })
            }
            RetryDecision::GiveUp(GiveUpReason::NotRetryable) => Err(FetchError::Terminal {
                status: response.status,
                body: error_body(response),
            }),
        }
    }
}

fn error_body(response: &HttpResponse) -> String {
    let text = String::from_utf8_lossy(&response.body);
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}

// ============================================================================
// HTTP Requester
// ============================================================================

/// A requester assembled from templates and capabilities.
#[derive(Debug, Clone)]
pub struct HttpRequester {
    name: String,
    url_base: Template,
    path: Template,
    method: HttpMethod,
    params: Arc<dyn ParameterProvider>,
    headers: InterpolatedMapping,
    body: InterpolatedBody,
    authenticator: Arc<dyn Authenticator>,
    decoder: Arc<dyn Decoder>,
    retry_policy: Arc<dyn RetryPolicy>,
    config: Config,
}

impl HttpRequester {
    /// Starts building a requester.
    pub fn builder(name: impl Into<String>, config: Config) -> HttpRequesterBuilder {
        HttpRequesterBuilder::new(name, config)
    }

    /// The config every template evaluates against.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Requester for HttpRequester {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_base_url(&self) -> String {
        self.url_base.eval_config(&self.config)
    }

    fn resolve_path(&self, context: &PaginationContext) -> String {
        self.path.eval(&self.config, &context.into())
    }

    fn resolve_method(&self) -> HttpMethod {
        self.method
    }

    fn resolve_query_params(&self, context: &PaginationContext) -> BTreeMap<String, String> {
        self.params.params(context)
    }

    fn resolve_headers(&self, context: &PaginationContext) -> BTreeMap<String, String> {
        self.headers.eval(&self.config, context)
    }

    fn resolve_body(&self, context: &PaginationContext) -> RequestBody {
        self.body.eval(&self.config, context)
    }

    fn decorate_with_auth(&self, request: RequestDescriptor) -> RequestDescriptor {
        self.authenticator.apply(request)
    }

    fn decode(&self, response: &HttpResponse) -> Result<Vec<Value>, DecodeError> {
        self.decoder.decode(response)
    }

    fn retry_policy(&self) -> &dyn RetryPolicy {
        self.retry_policy.as_ref()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`HttpRequester`].
///
/// Templates are compiled and the method name is parsed in
/// [`HttpRequesterBuilder::build`], so every configuration error surfaces
/// there, before the first request.
#[derive(Debug)]
pub struct HttpRequesterBuilder {
    name: String,
    config: Config,
    url_base: String,
    path: String,
    method: Result<HttpMethod, String>,
    params: BTreeMap<String, String>,
    param_provider: Option<Arc<dyn ParameterProvider>>,
    headers: BTreeMap<String, String>,
    body: BodyDefinition,
    authenticator: Arc<dyn Authenticator>,
    decoder: Arc<dyn Decoder>,
    retry_policy: Arc<dyn RetryPolicy>,
}

impl HttpRequesterBuilder {
    fn new(name: impl Into<String>, config: Config) -> Self {
        Self {
            name: name.into(),
            config,
            url_base: String::new(),
            path: String::new(),
            method: Ok(HttpMethod::Get),
            params: BTreeMap::new(),
            param_provider: None,
            headers: BTreeMap::new(),
            body: BodyDefinition::None,
            authenticator: Arc::new(NoAuth),
            decoder: Arc::new(JsonDecoder),
            retry_policy: Arc::new(DefaultRetryPolicy::default()),
        }
    }

    /// Sets the base URL template.
    pub fn url_base(mut self, url_base: impl Into<String>) -> Self {
        self.url_base = url_base.into();
        self
    }

    /// Sets the path template.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the method.
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Ok(method);
        self
    }

    /// Sets the method by name. Unknown names fail in `build`.
    pub fn method_name(mut self, name: &str) -> Self {
        self.method = name.parse().map_err(|_| name.to_string());
        self
    }

    /// Adds a templated query parameter.
    pub fn param(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.params.insert(name.into(), template.into());
        self
    }

    /// Replaces templated parameters with a custom provider.
    pub fn param_provider(mut self, provider: Arc<dyn ParameterProvider>) -> Self {
        self.param_provider = Some(provider);
        self
    }

    /// Adds a templated header.
    pub fn header(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.headers.insert(name.into(), template.into());
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: BodyDefinition) -> Self {
        self.body = body;
        self
    }

    /// Sets the authenticator.
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Sets the decoder.
    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Sets the retry policy.
    pub fn retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Compiles templates and validates the configuration.
    pub fn build(self) -> Result<HttpRequester, FetchError> {
        let method = self.method.map_err(CoreError::InvalidMethod)?;
        let url_base = Template::parse(&self.url_base).map_err(CoreError::from)?;
        let path = Template::parse(&self.path).map_err(CoreError::from)?;

        // A literal base can be checked now; a templated one only once resolved.
        if url_base.is_literal() {
            Url::parse(url_base.source()).map_err(|e| CoreError::InvalidUrl {
                url: url_base.source().to_string(),
                reason: e.to_string(),
            })?;
        }

        let params: Arc<dyn ParameterProvider> = match self.param_provider {
            Some(provider) => provider,
            None => Arc::new(InterpolatedParameterProvider::new(
                InterpolatedMapping::parse(&self.params).map_err(CoreError::from)?,
                self.config.clone(),
            )),
        };
        let headers = InterpolatedMapping::parse(&self.headers).map_err(CoreError::from)?;
        let body = InterpolatedBody::parse(&self.body).map_err(CoreError::from)?;

        debug!(stream = %self.name, %method, url_base = %url_base, path = %path, "Created requester");

        Ok(HttpRequester {
            name: self.name,
            url_base,
            path,
            method,
            params,
            headers,
            body,
            authenticator: self.authenticator,
            decoder: self.decoder,
            retry_policy: self.retry_policy,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::BearerAuthenticator;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn config() -> Config {
        Config::from_value(json!({"token": "t0k", "tenant": "acme", "page_size": 25})).unwrap()
    }

    fn items_requester() -> HttpRequester {
        HttpRequester::builder("items", config())
            .url_base("https://api.example.com")
            .path("/v1/items/{{ stream_slice.id }}")
            .method(HttpMethod::Get)
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_path_from_slice() {
        let requester = items_requester();
        let context = PaginationContext::new()
            .with_state(json!({}))
            .with_slice(json!({"id": "42"}));

        assert_eq!(requester.resolve_base_url(), "https://api.example.com");
        assert_eq!(requester.resolve_path(&context), "/v1/items/42");
        assert_eq!(requester.resolve_method(), HttpMethod::Get);
    }

    #[test]
    fn test_literals_ignore_context() {
        let requester = HttpRequester::builder("plain", config())
            .url_base("https://api.example.com")
            .path("/v1/items")
            .build()
            .unwrap();

        let contexts = [
            PaginationContext::new(),
            PaginationContext::new()
                .with_state(json!({"updated_at": 1}))
                .with_slice(json!({"id": "9"}))
                .with_next_page_token(json!({"page": 2})),
        ];
        for context in &contexts {
            assert_eq!(requester.resolve_base_url(), "https://api.example.com");
            assert_eq!(requester.resolve_path(context), "/v1/items");
        }
    }

    #[test]
    fn test_method_by_name() {
        let requester = HttpRequester::builder("s", config())
            .url_base("https://api.example.com")
            .method_name("POST")
            .build()
            .unwrap();
        assert_eq!(requester.resolve_method(), HttpMethod::Post);

        let err = HttpRequester::builder("s", config())
            .url_base("https://api.example.com")
            .method_name("FOO")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Config(CoreError::InvalidMethod(ref name)) if name == "FOO"
        ));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_malformed_template_fails_at_build() {
        let err = HttpRequester::builder("s", config())
            .url_base("https://api.example.com")
            .path("/v1/{{ stream_slice.id")
            .build()
            .unwrap_err();
        assert!(matches!(err, FetchError::Config(CoreError::Template(_))));

        let err = HttpRequester::builder("s", config())
            .url_base("https://api.example.com")
            .header("X-Tenant", "{{ }}")
            .build()
            .unwrap_err();
        assert!(matches!(err, FetchError::Config(CoreError::Template(_))));
    }

    #[test]
    fn test_invalid_literal_base_fails_at_build() {
        let err = HttpRequester::builder("s", config())
            .url_base("api.example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, FetchError::Config(CoreError::InvalidUrl { .. })));
    }

    #[test]
    fn test_build_request_assembles_everything() {
        let requester = HttpRequester::builder("items", config())
            .url_base("https://api.example.com")
            .path("/v1/items")
            .method(HttpMethod::Post)
            .param("limit", "{{ config.page_size }}")
            .param("cursor", "{{ next_page_token.cursor }}")
            .header("X-Tenant", "{{ config.tenant }}")
            .body(BodyDefinition::Json(json!({"slice": "{{ stream_slice.id }}"})))
            .authenticator(Arc::new(BearerAuthenticator::new("t0k")))
            .build()
            .unwrap();

        let context = PaginationContext::new()
            .with_slice(json!({"id": "s1"}))
            .with_next_page_token(json!({"cursor": "c9"}));
        let request = requester.build_request(&context);

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.query["limit"], "25");
        assert_eq!(request.query["cursor"], "c9");
        assert_eq!(request.header("x-tenant"), Some("acme"));
        assert_eq!(request.header("authorization"), Some("Bearer t0k"));
        assert_eq!(request.body, RequestBody::Json(json!({"slice": "s1"})));
        assert_eq!(
            request.url().unwrap().as_str(),
            "https://api.example.com/v1/items?cursor=c9&limit=25"
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let requester = HttpRequester::builder("items", config())
            .url_base("https://api.example.com")
            .path("/v1/items/{{ stream_slice.id }}")
            .param("limit", "{{ config.page_size }}")
            .header("X-Tenant", "{{ config.tenant }}")
            .build()
            .unwrap();
        let context = PaginationContext::new().with_slice(json!({"id": "7"}));

        assert_eq!(requester.resolve_path(&context), requester.resolve_path(&context));
        assert_eq!(
            requester.resolve_query_params(&context),
            requester.resolve_query_params(&context)
        );
        assert_eq!(requester.build_request(&context), requester.build_request(&context));
    }

    #[derive(Debug)]
    struct PageNumbers;

    impl ParameterProvider for PageNumbers {
        fn params(&self, context: &PaginationContext) -> BTreeMap<String, String> {
            let page = context
                .next_page_token
                .as_ref()
                .and_then(Value::as_u64)
                .unwrap_or(1);
            BTreeMap::from([("page".to_string(), page.to_string())])
        }
    }

    #[test]
    fn test_custom_param_provider() {
        let requester = HttpRequester::builder("pages", config())
            .url_base("https://api.example.com")
            .param("ignored", "x")
            .param_provider(Arc::new(PageNumbers))
            .build()
            .unwrap();

        let first = requester.resolve_query_params(&PaginationContext::new());
        assert_eq!(first, BTreeMap::from([("page".to_string(), "1".to_string())]));
        let third = requester
            .resolve_query_params(&PaginationContext::new().with_next_page_token(json!(3)));
        assert_eq!(third["page"], "3");
    }

    #[test]
    fn test_defaults_are_empty() {
        let requester = items_requester();
        let context = PaginationContext::new();
        assert!(requester.resolve_query_params(&context).is_empty());
        assert!(requester.resolve_headers(&context).is_empty());
        assert_eq!(requester.resolve_body(&context), RequestBody::Empty);
    }

    #[test]
    fn test_interpret_accept_decodes() {
        let requester = items_requester();
        let response = HttpResponse::new(200).with_body(r#"[{"id": 1}]"#);
        assert_eq!(
            requester.interpret(&response, 0).unwrap(),
            ResponseAction::Records(vec![json!({"id": 1})])
        );
    }

    #[test]
    fn test_interpret_retry_then_exhaust() {
        let requester = HttpRequester::builder("items", config())
            .url_base("https://api.example.com")
            .retry_policy(Arc::new(DefaultRetryPolicy::new(1).with_retry_factor(0.5)))
            .build()
            .unwrap();
        let response = HttpResponse::new(503);

        assert!(requester.should_retry(&response));
        assert_eq!(requester.max_retries(), Some(1));
        assert!((requester.retry_factor() - 0.5).abs() < f64::EPSILON);
        assert_eq!(
            requester.interpret(&response, 0).unwrap(),
            ResponseAction::Retry(Duration::from_millis(500))
        );
        assert!(matches!(
            requester.interpret(&response, 1),
            Err(FetchError::RetriesExhausted {
                status: 503,
                attempts: 2
            })
        ));
    }

    #[test]
    fn test_interpret_terminal_keeps_body() {
        let requester = items_requester();
        let response = HttpResponse::new(404).with_body("no such item");
        let err = requester.interpret(&response, 0).unwrap_err();
        assert!(matches!(
            err,
            FetchError::Terminal { status: 404, ref body } if body == "no such item"
        ));
        assert!(!requester.should_retry(&HttpResponse::new(200)));
    }

    #[test]
    fn test_interpret_decode_error_is_terminal() {
        let requester = items_requester();
        let response = HttpResponse::new(200).with_body("<html>");
        let err = requester.interpret(&response, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_error_body_is_truncated() {
        let response = HttpResponse::new(400).with_body("x".repeat(2000));
        let body = error_body(&response);
        assert_eq!(body.len(), MAX_ERROR_BODY + 3);
        assert!(body.ends_with("..."));
    }

    #[test]
    fn test_requester_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpRequester>();
    }
}
