//! From definition to resolved request, without any I/O.

use declarest_core::{Config, HttpMethod, PaginationContext, RequestBody};
use declarest_fetch::{ErrorKind, FetchError, Requester, RequesterDefinition};
use serde_json::json;

const ORDERS: &str = r#"
name: orders
url_base: "https://{{ config.region }}.shop.example.com/api"
path: "/stores/{{ stream_slice.store_id }}/orders"
http_method: post
request_parameters:
  updated_since: "{{ stream_state.updated_at or config.start_date }}"
  page: "{{ next_page_token.page }}"
request_headers:
  X-Store: "{{ stream_slice['store_id'] }}"
request_body_data:
  status: "{{ config.statuses.0 }}"
authenticator:
  type: ApiKey
  header: X-Api-Key
  api_token: "{{ config.api_key }}"
"#;

fn config() -> Config {
    Config::from_json_str(
        r#"{"region": "eu", "api_key": "k3y", "start_date": "2024-01-01", "statuses": ["open", "closed"]}"#,
    )
    .unwrap()
}

#[test]
fn test_first_page_uses_config_fallback() {
    let requester = RequesterDefinition::from_yaml_str(ORDERS)
        .unwrap()
        .build(config())
        .unwrap();
    let context = PaginationContext::new().with_slice(json!({"store_id": 7}));
    let request = requester.build_request(&context);

    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(request.url_base, "https://eu.shop.example.com/api");
    assert_eq!(request.path, "/stores/7/orders");
    assert_eq!(request.query.get("updated_since").map(String::as_str), Some("2024-01-01"));
    assert!(!request.query.contains_key("page"));
    assert_eq!(request.header("x-store"), Some("7"));
    assert_eq!(request.header("X-Api-Key"), Some("k3y"));
    assert_eq!(
        request.body,
        RequestBody::Form([("status".to_string(), "open".to_string())].into())
    );
    assert_eq!(
        request.url().unwrap().as_str(),
        "https://eu.shop.example.com/api/stores/7/orders?updated_since=2024-01-01"
    );
}

#[test]
fn test_later_page_uses_state_and_token() {
    let requester = RequesterDefinition::from_yaml_str(ORDERS)
        .unwrap()
        .build(config())
        .unwrap();
    let context = PaginationContext::new()
        .with_state(json!({"updated_at": "2024-06-01"}))
        .with_slice(json!({"store_id": 7}))
        .with_next_page_token(json!({"page": 3}));

    let params = requester.resolve_query_params(&context);
    assert_eq!(params["updated_since"], "2024-06-01");
    assert_eq!(params["page"], "3");
}

#[test]
fn test_same_requester_serves_many_slices() {
    let requester = RequesterDefinition::from_yaml_str(ORDERS)
        .unwrap()
        .build(config())
        .unwrap();

    let paths: Vec<_> = [1, 2, 3]
        .into_iter()
        .map(|id| requester.resolve_path(&PaginationContext::new().with_slice(json!({"store_id": id}))))
        .collect();
    assert_eq!(paths, ["/stores/1/orders", "/stores/2/orders", "/stores/3/orders"]);
}

#[test]
fn test_missing_slice_renders_empty_segment() {
    let requester = RequesterDefinition::from_yaml_str(ORDERS)
        .unwrap()
        .build(config())
        .unwrap();
    assert_eq!(requester.resolve_path(&PaginationContext::new()), "/stores//orders");
}

#[test]
fn test_bad_template_in_definition() {
    let source = ORDERS.replace("{{ config.statuses.0 }}", "{{ config.statuses.0");
    let err = RequesterDefinition::from_yaml_str(&source)
        .unwrap()
        .build(config())
        .unwrap_err();
    assert!(matches!(err, FetchError::Config(_)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("statuses"));
}

#[test]
fn test_malformed_yaml() {
    let err = RequesterDefinition::from_yaml_str("name: [unclosed").unwrap_err();
    assert!(matches!(err, FetchError::Definition(_)));
}
