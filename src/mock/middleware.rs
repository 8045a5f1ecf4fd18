//! Mock dispatch middleware.
//!
//! Installed ahead of the pass-through handler. Matches on exact path and
//! case-insensitive method; anything else is forwarded unchanged with the
//! buffered body restored, so downstream handlers can read it again.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{info, warn};

use super::registry::{MockContext, MockOutcome, MockRegistry};
use crate::api::Envelope;
use crate::config::MockSettings;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct MockDispatchState {
    pub registry: Arc<MockRegistry>,
    pub settings: MockSettings,
}

impl std::fmt::Debug for MockDispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDispatchState")
            .field("registry", &self.registry)
            .finish()
    }
}

pub async fn mock_dispatch(
    State(state): State<MockDispatchState>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "Failed to buffer request body.");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let path = parts.uri.path().to_string();
    let method = parts.method.as_str().to_string();
    let matched = state
        .registry
        .lookup(&path)
        .await
        .filter(|entry| entry.method.eq_ignore_ascii_case(&method));

    let Some(entry) = matched else {
        // No mock for this (path, method): restore the body and defer to
        // the next handler unchanged.
        let req = Request::from_parts(parts, Body::from(body_bytes));
        return next.run(req).await;
    };

    info!("mock {} {}", method, path);

    let ctx = MockContext {
        url: path,
        query: parse_query(parts.uri.query().unwrap_or("")),
        body: parse_body(&parts.headers, &body_bytes),
        headers: header_pairs(&parts.headers),
    };

    let envelope = match entry.invoke(ctx).await {
        MockOutcome::Raw(response) => return response,
        MockOutcome::Data(data) => Envelope {
            code: state.settings.code_ok.clone(),
            data,
            msg: state.settings.msg_ok.clone(),
        },
        MockOutcome::Fail { code, msg } => Envelope {
            code: code.unwrap_or_else(|| state.settings.code_fail.clone()),
            data: Value::Null,
            msg,
        },
    };

    envelope_response(&envelope)
}

pub(crate) fn envelope_response(envelope: &Envelope) -> Response {
    let body = serde_json::to_vec(envelope).unwrap_or_default();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json;charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Parse a request body as JSON or urlencoded by content type. A body
/// that fails to parse yields `Null`, never an error.
fn parse_body(headers: &HeaderMap, bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let map: serde_json::Map<String, Value> = url::form_urlencoded::parse(bytes)
            .into_owned()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        return Value::Object(map);
    }
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

fn header_pairs(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::registry::MockHandler;
    use axum::http::Request as HttpRequest;
    use axum::routing::any;
    use axum::Router;
    use futures_util::FutureExt;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn app_with(dir: &TempDir) -> (Arc<MockRegistry>, Router) {
        let registry = Arc::new(MockRegistry::new(dir.path()));
        registry.reload().await;
        let state = MockDispatchState {
            registry: Arc::clone(&registry),
            settings: MockSettings::default(),
        };
        let app = Router::new()
            .fallback(any(|req: Request| async move {
                // Echo the body back so tests can verify pass-through.
                let bytes = to_bytes(req.into_body(), MAX_BODY_BYTES).await.unwrap();
                (StatusCode::NOT_FOUND, format!("next:{}", String::from_utf8_lossy(&bytes)))
            }))
            .layer(axum::middleware::from_fn_with_state(state, mock_dispatch));
        (registry, app)
    }

    fn write_mock(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).unwrap();
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_matched_mock_returns_success_envelope() {
        let dir = TempDir::new().unwrap();
        write_mock(
            &dir,
            "user.mock.json",
            r#"{"/foo": {"method": "GET", "data": {"id": 1}}}"#,
        );
        let (_registry, app) = app_with(&dir).await;

        let response = app
            .oneshot(HttpRequest::get("/foo").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json;charset=utf-8"
        );
        assert_eq!(
            body_json(response).await,
            json!({"code": "0", "data": {"id": 1}, "msg": "请求成功"})
        );
    }

    #[tokio::test]
    async fn test_method_mismatch_falls_through() {
        let dir = TempDir::new().unwrap();
        write_mock(
            &dir,
            "user.mock.json",
            r#"{"/foo": {"method": "GET", "data": 1}}"#,
        );
        let (_registry, app) = app_with(&dir).await;

        let response = app
            .oneshot(
                HttpRequest::post("/foo")
                    .body(Body::from("payload"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        // The buffered body is restored for the downstream handler.
        assert_eq!(&bytes[..], b"next:payload");
    }

    #[tokio::test]
    async fn test_unknown_path_falls_through() {
        let dir = TempDir::new().unwrap();
        let (_registry, app) = app_with(&dir).await;
        let response = app
            .oneshot(HttpRequest::get("/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_entry_yields_failure_envelope() {
        let dir = TempDir::new().unwrap();
        write_mock(
            &dir,
            "err.mock.json",
            r#"{"/bad": {"method": "GET", "error": {"code": "E1", "msg": "bad"}}}"#,
        );
        let (_registry, app) = app_with(&dir).await;
        let response = app
            .oneshot(HttpRequest::get("/bad").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!({"code": "E1", "data": null, "msg": "bad"})
        );
    }

    #[tokio::test]
    async fn test_failure_without_code_uses_configured_sentinel() {
        let dir = TempDir::new().unwrap();
        write_mock(
            &dir,
            "err.mock.json",
            r#"{"/bad": {"method": "GET", "error": {"msg": "oops"}}}"#,
        );
        let (_registry, app) = app_with(&dir).await;
        let response = app
            .oneshot(HttpRequest::get("/bad").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!({"code": "-1", "data": null, "msg": "oops"})
        );
    }

    #[tokio::test]
    async fn test_raw_entry_bypasses_envelope() {
        let dir = TempDir::new().unwrap();
        write_mock(
            &dir,
            "raw.mock.json",
            r#"{"/csv": {"method": "GET", "raw": {"content_type": "text/csv", "body": "a,b\n1,2"}}}"#,
        );
        let (_registry, app) = app_with(&dir).await;
        let response = app
            .oneshot(HttpRequest::get("/csv").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"a,b\n1,2");
    }

    #[tokio::test]
    async fn test_handler_receives_query_and_json_body() {
        let dir = TempDir::new().unwrap();
        let (registry, app) = app_with(&dir).await;

        let handler: MockHandler = Arc::new(|ctx: MockContext| {
            async move {
                MockOutcome::Data(json!({
                    "query_id": ctx.query.get("id"),
                    "body": ctx.body,
                }))
            }
            .boxed()
        });
        registry.register_handler("/echo", "POST", handler).await;

        let response = app
            .oneshot(
                HttpRequest::post("/echo?id=9")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"k": "v"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!({
                "code": "0",
                "data": {"query_id": "9", "body": {"k": "v"}},
                "msg": "请求成功",
            })
        );
    }

    #[tokio::test]
    async fn test_urlencoded_body_is_parsed() {
        let dir = TempDir::new().unwrap();
        let (registry, app) = app_with(&dir).await;

        let handler: MockHandler = Arc::new(|ctx: MockContext| {
            async move { MockOutcome::Data(ctx.body) }.boxed()
        });
        registry.register_handler("/form", "POST", handler).await;

        let response = app
            .oneshot(
                HttpRequest::post("/form")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("name=vack&count=2"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!({
                "code": "0",
                "data": {"name": "vack", "count": "2"},
                "msg": "请求成功",
            })
        );
    }
}
