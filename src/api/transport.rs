//! Transport capability and the bundled reqwest implementation.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::debug;

use super::request::{CallOpts, Headers, RawResponse};
use super::{ApiError, Envelope};
use crate::config::ApiSettings;

/// What a transport call yields: the envelope-unwrapped data plus the raw
/// response recorded into the request context.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub data: Value,
    pub raw: RawResponse,
}

/// The transport capability the pipeline depends on. Implementations must
/// normalize envelope failures into [`ApiError::Envelope`].
pub trait Transport: Send + Sync {
    fn get(
        &self,
        url: String,
        params: Value,
        headers: Headers,
        opts: CallOpts,
    ) -> BoxFuture<'static, Result<TransportReply, ApiError>>;

    fn post(
        &self,
        url: String,
        data: Value,
        headers: Headers,
        opts: CallOpts,
    ) -> BoxFuture<'static, Result<TransportReply, ApiError>>;
}

/// HTTP transport over reqwest.
///
/// Responses are expected to carry the `{code, data, msg}` envelope; a
/// `code` equal to the configured success sentinel unwraps `data`, anything
/// else becomes an [`ApiError::Envelope`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    code_ok: String,
    inject_headers: Headers,
}

impl HttpTransport {
    pub fn new(settings: &ApiSettings) -> Result<Self, String> {
        let mut builder = reqwest::Client::builder();
        if settings.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(settings.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|err| format!("Failed to build HTTP client: {err}"))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            code_ok: settings.code_ok.clone(),
            inject_headers: settings.headers.clone(),
        })
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        format!("{}{}", self.base_url, url)
    }

    fn prepare(
        &self,
        mut builder: reqwest::RequestBuilder,
        headers: &Headers,
        opts: &CallOpts,
    ) -> reqwest::RequestBuilder {
        for (key, value) in &self.inject_headers {
            builder = builder.header(key, value);
        }
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<TransportReply, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;

        let raw = RawResponse {
            status: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect(),
        };

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|err| ApiError::Transport(format!("invalid envelope: {err}")))?;

        if envelope.code == self.code_ok {
            debug!(status = raw.status, "API request succeeded.");
            return Ok(TransportReply {
                data: envelope.data,
                raw,
            });
        }

        Err(ApiError::Envelope {
            code: envelope.code,
            msg: envelope.msg,
            raw: Some(raw),
        })
    }
}

impl Transport for HttpTransport {
    fn get(
        &self,
        url: String,
        params: Value,
        headers: Headers,
        opts: CallOpts,
    ) -> BoxFuture<'static, Result<TransportReply, ApiError>> {
        let this = self.clone();
        async move {
            let mut builder = this.client.get(this.absolute_url(&url));
            let pairs = query_pairs(&params);
            if !pairs.is_empty() {
                builder = builder.query(&pairs);
            }
            let builder = this.prepare(builder, &headers, &opts);
            this.send(builder).await
        }
        .boxed()
    }

    fn post(
        &self,
        url: String,
        data: Value,
        headers: Headers,
        opts: CallOpts,
    ) -> BoxFuture<'static, Result<TransportReply, ApiError>> {
        let this = self.clone();
        async move {
            let builder = this.client.post(this.absolute_url(&url)).json(&data);
            let builder = this.prepare(builder, &headers, &opts);
            this.send(builder).await
        }
        .boxed()
    }
}

/// Serialize query parameters, skipping null and empty-string values.
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = params else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::Null => return None,
                Value::String(s) if s.is_empty() => return None,
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            Some((key.clone(), rendered))
        })
        .collect()
}
