//! End-to-end fetches against a mock server.

use std::net::TcpListener;
use std::sync::Arc;

use declarest_core::{Config, PaginationContext};
use declarest_fetch::{
    BodyDefinition, DefaultRetryPolicy, ErrorKind, FetchError, HttpRequester, RequestClient, RequesterDefinition,
    XmlDecoder,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> Config {
    Config::from_value(json!({
        "base": server.uri(),
        "token": "s3cret",
        "page_size": 2
    }))
    .unwrap()
}

const DEFINITION: &str = r#"
name: items
url_base: "{{ config.base }}"
path: "/v1/items"
request_parameters:
  limit: "{{ config.page_size }}"
  cursor: "{{ next_page_token.cursor }}"
authenticator:
  type: Bearer
  api_token: "{{ config.token }}"
retry:
  max_retries: 2
  retry_factor: 0
"#;

#[tokio::test]
async fn test_fetch_pages_with_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .and(query_param("limit", "2"))
        .and(query_param("cursor", "p2"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 3}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .and(query_param("limit", "2"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
        .expect(1)
        .mount(&server)
        .await;

    let requester = RequesterDefinition::from_yaml_str(DEFINITION)
        .unwrap()
        .build(config(&server))
        .unwrap();
    let client = RequestClient::new().unwrap();

    let first = client
        .fetch(&requester, &PaginationContext::new())
        .await
        .unwrap();
    assert_eq!(first, vec![json!({"id": 1}), json!({"id": 2})]);

    let second = client
        .fetch(
            &requester,
            &PaginationContext::new().with_next_page_token(json!({"cursor": "p2"})),
        )
        .await
        .unwrap();
    assert_eq!(second, vec![json!({"id": 3})]);
}

#[tokio::test]
async fn test_transient_status_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let requester = RequesterDefinition::from_yaml_str(DEFINITION)
        .unwrap()
        .build(config(&server))
        .unwrap();

    let records = RequestClient::new()
        .unwrap()
        .fetch(&requester, &PaginationContext::new())
        .await
        .unwrap();
    assert_eq!(records, vec![json!({"id": 1})]);
}

#[tokio::test]
async fn test_rate_limited_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let requester = RequesterDefinition::from_yaml_str(DEFINITION)
        .unwrap()
        .build(config(&server))
        .unwrap();

    let err = RequestClient::new()
        .unwrap()
        .fetch(&requester, &PaginationContext::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::RetriesExhausted {
            status: 429,
            attempts: 3
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Terminal);
}

#[tokio::test]
async fn test_not_found_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .expect(1)
        .mount(&server)
        .await;

    let requester = RequesterDefinition::from_yaml_str(DEFINITION)
        .unwrap()
        .build(config(&server))
        .unwrap();

    let err = RequestClient::new()
        .unwrap()
        .fetch(&requester, &PaginationContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Terminal { status: 404, ref body } if body == "missing"));
}

#[tokio::test]
async fn test_post_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_json(json!({"query": "rust", "size": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let requester = HttpRequester::builder("search", config(&server))
        .url_base(server.uri())
        .path("/search")
        .method_name("post")
        .body(BodyDefinition::Json(
            json!({"query": "{{ stream_slice.q }}", "size": 2, "after": "{{ next_page_token.after }}"}),
        ))
        .build()
        .unwrap();

    let records = RequestClient::new()
        .unwrap()
        .fetch(
            &requester,
            &PaginationContext::new().with_slice(json!({"q": "rust"})),
        )
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_xml_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<items><item id=\"1\">a</item><item id=\"2\">b</item></items>"),
        )
        .mount(&server)
        .await;

    let requester = HttpRequester::builder("feed", Config::new())
        .url_base(server.uri())
        .decoder(Arc::new(XmlDecoder))
        .build()
        .unwrap();

    let records = RequestClient::new()
        .unwrap()
        .fetch(&requester, &PaginationContext::new())
        .await
        .unwrap();
    assert_eq!(
        records,
        vec![
            json!({"@id": "1", "#text": "a"}),
            json!({"@id": "2", "#text": "b"}),
        ]
    );
}

#[tokio::test]
async fn test_connection_refused_exhausts_retries() {
    // Bind then drop to get a port nobody listens on.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let requester = HttpRequester::builder("down", Config::new())
        .url_base(format!("http://127.0.0.1:{port}"))
        .retry_policy(Arc::new(DefaultRetryPolicy::new(1).with_retry_factor(0.0)))
        .build()
        .unwrap();

    let err = RequestClient::new()
        .unwrap()
        .fetch(&requester, &PaginationContext::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::TransportRetriesExhausted { attempts: 2, .. }
    ));
}
