//! Turn a tool call into an HTTP request and normalize the response.

use std::collections::BTreeMap;

use openapi_mcp_core::{BODY_ARGUMENT, DEFAULT_BASE_URL, Operation, ParameterLocation};
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;

use crate::error::ToolError;
use crate::util::{client, parse_response_body, value_to_string};

/// Substitute `{key}` tokens in `path_template` and resolve the result against
/// `base_url`. Placeholders without a value are left in place.
pub fn build_url(
    base_url: &str,
    path_template: &str,
    path_params: &Map<String, Value>,
) -> Result<String, ToolError> {
    let mut path = path_template.to_string();
    for (key, value) in path_params {
        let placeholder = format!("{{{key}}}");
        let encoded = urlencoding::encode(&value_to_string(value)).into_owned();
        path = path.replace(&placeholder, &encoded);
    }

    let base = parse_base_url(base_url)?;
    base.join(&path).map(String::from).map_err(|e| {
        ToolError::new(
            "invalid_url",
            format!("Cannot resolve '{path}' against '{base_url}': {e}"),
        )
    })
}

/// Server URLs may be relative (`/api/v3`); those resolve against the default host.
fn parse_base_url(base_url: &str) -> Result<Url, ToolError> {
    let invalid = |e: url::ParseError| {
        ToolError::new("invalid_url", format!("Invalid server URL '{base_url}': {e}"))
            .with_docs_hint("Check the first entry of 'servers' in the OpenAPI spec.")
    };
    match Url::parse(base_url) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(DEFAULT_BASE_URL)
            .and_then(|default| default.join(base_url))
            .map_err(invalid),
        Err(e) => Err(invalid(e)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiCallResult {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl ApiCallResult {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "status": self.status,
            "headers": self.headers,
            "body": self.body
        })
    }
}

/// Issues operation requests. Holds no per-call state.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl Dispatcher {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: client(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    /// HTTP error statuses come back as results; only transport failures are errors.
    pub async fn dispatch(
        &self,
        operation: &Operation,
        args: &Map<String, Value>,
        base_url: &str,
    ) -> Result<ApiCallResult, ToolError> {
        let path_params: Map<String, Value> = args
            .iter()
            .filter(|(key, _)| key.as_str() != BODY_ARGUMENT)
            .filter(|(key, _)| operation.path.contains(&format!("{{{key}}}")))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let url = build_url(base_url, &operation.path, &path_params)?;
        let method = Method::from_bytes(operation.method.to_uppercase().as_bytes()).map_err(|_| {
            ToolError::new(
                "invalid_method",
                format!("Unsupported HTTP method '{}'", operation.method),
            )
        })?;

        let query: Vec<(String, String)> = operation
            .parameters_in(ParameterLocation::Query)
            .filter_map(|param| {
                args.get(&param.name)
                    .filter(|value| !value.is_null())
                    .map(|value| (param.name.clone(), value_to_string(value)))
            })
            .collect();

        debug!(
            operation_id = %operation.operation_id,
            method = %method,
            url = %url,
            "dispatching operation"
        );

        let mut request = self
            .http
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            request = request.query(&query);
        }
        for param in operation.parameters_in(ParameterLocation::Header) {
            if let Some(value) = args.get(&param.name).filter(|value| !value.is_null()) {
                request = request.header(param.name.as_str(), value_to_string(value));
            }
        }
        if let Some(api_key) = &self.api_key {
            request = request.header("X-Api-Key", api_key);
        }
        if matches!(operation.method.as_str(), "post" | "put" | "patch") {
            if let Some(body) = args.get(BODY_ARGUMENT).filter(|body| !body.is_null()) {
                request = request.json(body);
            }
        }

        let response = request.send().await.map_err(|e| {
            ToolError::new("connection_error", format!("Request to {url} failed: {e}"))
                .with_docs_hint("Ensure the API is reachable at the server URL declared in the OpenAPI document.")
        })?;

        let status = response.status().as_u16();
        // Repeated headers are joined with ", " as fetch does.
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = value.to_str().unwrap_or("<binary>");
            headers
                .entry(name.to_string())
                .and_modify(|joined| {
                    joined.push_str(", ");
                    joined.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        let text = response.text().await.map_err(|e| {
            ToolError::new(
                "response_error",
                format!("Failed to read API response body: {e}"),
            )
        })?;

        Ok(ApiCallResult {
            status,
            headers,
            body: parse_response_body(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use openapi_mcp_core::{Document, extract_operations};
    use serde_json::json;

    use super::*;
    use crate::test_support::spawn_fixture_api;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn operation(spec: &str, operation_id: &str) -> Operation {
        extract_operations(&Document::parse(spec).unwrap())
            .into_iter()
            .find(|op| op.operation_id == operation_id)
            .expect("operation should be extracted")
    }

    const FIXTURE_SPEC: &str = "\
paths:
  /users/{id}:
    get:
      operationId: getUser
      parameters:
        - name: id
          in: path
          required: true
  /health:
    get:
      operationId: health
  /missing:
    get:
      operationId: missing
  /echo:
    post:
      operationId: echo
      requestBody:
        content:
          application/json:
            schema:
              properties:
                name: { type: string }
    get:
      operationId: echoGet
  /search:
    get:
      operationId: search
      parameters:
        - name: q
          in: query
        - name: X-Tenant
          in: header
  /cookies:
    get:
      operationId: cookies
";

    #[test]
    fn build_url_percent_encodes_path_values() {
        let url = build_url(
            "https://api.example.com",
            "/users/{id}",
            &params(json!({ "id": "test@example.com" })),
        )
        .unwrap();
        assert_eq!(url, "https://api.example.com/users/test%40example.com");
    }

    #[test]
    fn build_url_substitutes_each_token_independently() {
        let url = build_url(
            "https://api.example.com",
            "/users/{userId}/posts/{postId}",
            &params(json!({ "postId": "456", "userId": "123" })),
        )
        .unwrap();
        assert_eq!(url, "https://api.example.com/users/123/posts/456");

        let url = build_url(
            "https://api.example.com",
            "/pairs/{a}/{a}",
            &params(json!({ "a": 7 })),
        )
        .unwrap();
        assert_eq!(url, "https://api.example.com/pairs/7/7");
    }

    #[test]
    fn build_url_encodes_reserved_characters() {
        let url = build_url(
            "https://api.example.com",
            "/files/{name}",
            &params(json!({ "name": "a/b?c#d e" })),
        )
        .unwrap();
        assert_eq!(url, "https://api.example.com/files/a%2Fb%3Fc%23d%20e");
    }

    #[test]
    fn build_url_leaves_unsubstituted_placeholders() {
        let url = build_url("https://api.example.com", "/users/{id}", &Map::new()).unwrap();
        assert_eq!(url, "https://api.example.com/users/%7Bid%7D");
    }

    #[test]
    fn build_url_follows_url_resolution_rules() {
        let absolute = build_url("https://api.example.com/v1/", "/users", &Map::new()).unwrap();
        assert_eq!(absolute, "https://api.example.com/users");

        let relative = build_url("https://api.example.com/v1/", "users", &Map::new()).unwrap();
        assert_eq!(relative, "https://api.example.com/v1/users");

        let relative_server = build_url("/api/v3/", "pets", &Map::new()).unwrap();
        assert_eq!(relative_server, "http://localhost:8080/api/v3/pets");
    }

    #[tokio::test]
    async fn json_and_text_responses_share_one_envelope() {
        let base_url = spawn_fixture_api().await;
        let dispatcher = Dispatcher::new(None);

        let json_result = dispatcher
            .dispatch(
                &operation(FIXTURE_SPEC, "getUser"),
                &params(json!({ "id": "test@example.com" })),
                &base_url,
            )
            .await
            .unwrap();
        assert_eq!(json_result.status, 200);
        assert_eq!(json_result.body, json!({ "id": "test@example.com" }));
        assert!(json_result.headers.contains_key("content-type"));

        let text_result = dispatcher
            .dispatch(&operation(FIXTURE_SPEC, "health"), &Map::new(), &base_url)
            .await
            .unwrap();
        assert_eq!(text_result.status, 200);
        assert_eq!(text_result.body, json!("ok"));
    }

    #[tokio::test]
    async fn repeated_response_headers_are_joined() {
        let base_url = spawn_fixture_api().await;
        let result = Dispatcher::new(None)
            .dispatch(&operation(FIXTURE_SPEC, "cookies"), &Map::new(), &base_url)
            .await
            .unwrap();
        assert_eq!(result.headers["set-cookie"], "a=1, b=2");
    }

    #[tokio::test]
    async fn http_error_statuses_are_returned_not_raised() {
        let base_url = spawn_fixture_api().await;
        let result = Dispatcher::new(None)
            .dispatch(&operation(FIXTURE_SPEC, "missing"), &Map::new(), &base_url)
            .await
            .unwrap();
        assert_eq!(result.status, 404);
        assert!(!result.is_success());
        assert_eq!(result.body["error"], "not_found");
    }

    #[tokio::test]
    async fn body_and_api_key_are_sent() {
        let base_url = spawn_fixture_api().await;
        let result = Dispatcher::new(Some("secret-key".to_string()))
            .dispatch(
                &operation(FIXTURE_SPEC, "echo"),
                &params(json!({ "body": { "name": "Ada" } })),
                &base_url,
            )
            .await
            .unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.body["method"], "POST");
        assert_eq!(result.body["body"], json!({ "name": "Ada" }));
        assert_eq!(result.body["api_key"], "secret-key");
        assert_eq!(result.body["content_type"], "application/json");
    }

    #[tokio::test]
    async fn body_is_not_sent_for_get() {
        let base_url = spawn_fixture_api().await;
        let result = Dispatcher::new(None)
            .dispatch(
                &operation(FIXTURE_SPEC, "echoGet"),
                &params(json!({ "body": { "ignored": true } })),
                &base_url,
            )
            .await
            .unwrap();
        assert_eq!(result.body["method"], "GET");
        assert_eq!(result.body["raw_body"], "");
        assert!(result.body["api_key"].is_null());
    }

    #[tokio::test]
    async fn query_and_header_parameters_are_forwarded() {
        let base_url = spawn_fixture_api().await;
        let result = Dispatcher::new(None)
            .dispatch(
                &operation(FIXTURE_SPEC, "search"),
                &params(json!({ "q": "rust lang", "X-Tenant": "acme", "unused": 1 })),
                &base_url,
            )
            .await
            .unwrap();
        assert_eq!(result.body["query"], json!({ "q": "rust lang" }));
        assert_eq!(result.body["tenant"], "acme");
    }

    #[tokio::test]
    async fn network_failures_are_request_errors() {
        let err = Dispatcher::new(None)
            .dispatch(
                &operation(FIXTURE_SPEC, "health"),
                &Map::new(),
                "http://127.0.0.1:9",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, "connection_error");
    }
}
