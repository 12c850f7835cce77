use std::collections::HashMap;

use axum::extract::{Path, Query};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::AppendHeaders;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

fn header(headers: &HeaderMap, name: &str) -> Value {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| Value::String(value.to_string()))
        .unwrap_or(Value::Null)
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<Value> {
    Json(json!({
        "method": method.as_str(),
        "body": serde_json::from_str::<Value>(&body).unwrap_or(Value::Null),
        "raw_body": body,
        "api_key": header(&headers, "x-api-key"),
        "content_type": header(&headers, "content-type"),
    }))
}

/// Local HTTP API on an ephemeral port. Returns its base URL.
pub async fn spawn_fixture_api() -> String {
    let app = Router::new()
        .route(
            "/users/{id}",
            get(|Path(id): Path<String>| async move { Json(json!({ "id": id })) }),
        )
        .route("/health", get(|| async { "ok" }))
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({ "error": "not_found" }))) }),
        )
        .route(
            "/cookies",
            get(|| async { (AppendHeaders([(SET_COOKIE, "a=1"), (SET_COOKIE, "b=2")]), "ok") }),
        )
        .route("/echo", get(echo).post(echo))
        .route(
            "/search",
            get(
                |headers: HeaderMap, Query(query): Query<HashMap<String, String>>| async move {
                    Json(json!({ "query": query, "tenant": header(&headers, "x-tenant") }))
                },
            ),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture listener");
    let addr = listener.local_addr().expect("fixture address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fixture server");
    });
    format!("http://{addr}")
}
