//! Pass-through proxy for requests without a mock.

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use std::time::Instant;
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const HOP_HEADERS: [&str; 8] = [
    "connection",
    "upgrade",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "host",
];

fn is_hop_header(name: &str) -> bool {
    HOP_HEADERS
        .iter()
        .any(|header| header.eq_ignore_ascii_case(name))
}

#[derive(Clone)]
struct ProxyState {
    client: reqwest::Client,
    upstream: String,
}

/// Build the fallback router that forwards unmatched requests to the
/// configured upstream.
pub fn router(upstream: &str) -> Result<Router, String> {
    let client = reqwest::Client::builder()
        .no_gzip()
        .no_brotli()
        .no_deflate()
        .build()
        .map_err(|err| format!("Failed to build proxy HTTP client: {err}"))?;
    let state = ProxyState {
        client,
        upstream: upstream.trim_end_matches('/').to_string(),
    };
    Ok(Router::new()
        .route("/", any(proxy_http))
        .route("/{*path}", any(proxy_http))
        .with_state(state))
}

async fn proxy_http(State(state): State<ProxyState>, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();
    let start = Instant::now();

    info!("~> {} {}", method, path_and_query);

    let url = format!("{}{}", state.upstream, path_and_query);
    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "Failed to read proxy request body.");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };
    let mut builder = state.client.request(parts.method, url);
    for (name, value) in parts.headers.iter() {
        if is_hop_header(name.as_str()) {
            continue;
        }
        builder = builder.header(name, value);
    }
    let response = match builder.body(body_bytes).send().await {
        Ok(response) => response,
        Err(err) => {
            let elapsed = start.elapsed().as_millis();
            info!(
                "<~ {} {} 502 [{}ms] (connection failed: {})",
                method, path_and_query, elapsed, err
            );
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };
    let status = response.status();
    let headers = response.headers().clone();
    let body = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "Failed to read proxy response body.");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let elapsed = start.elapsed().as_millis();
    info!(
        "<~ {} {} {} [{}ms]",
        method,
        path_and_query,
        status.as_u16(),
        elapsed
    );

    let mut builder = Response::builder().status(status);
    for (name, value) in headers.iter() {
        if is_hop_header(name.as_str()) {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}
