//! Request pipeline execution.
//!
//! A call runs strictly sequentially: before hooks fold context patches,
//! the transport call happens with the (possibly mutated) context, after
//! hooks fold the result, and error hooks fold any rejection. No retries
//! happen at this layer; retry policy belongs to individual hooks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::define::ApiConfig;
use super::transport::Transport;
use super::ApiError;

/// Request/response headers as plain string pairs.
pub type Headers = HashMap<String, String>;

/// Per-call options forwarded to the transport.
#[derive(Debug, Clone, Default)]
pub struct CallOpts {
    /// Per-call timeout. `None` uses the transport default.
    pub timeout: Option<Duration>,
}

/// The raw transport response, recorded into the context before the
/// after-hooks stage runs.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Headers,
}

/// Per-invocation record. Created fresh on every call to a generated API
/// handle and discarded after the call settles.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub url: String,
    pub data: Value,
    pub headers: Headers,
    pub response: Option<RawResponse>,
    pub opts: CallOpts,
}

/// A partial context returned by a before hook. Scalar fields replace the
/// current value (later wins); header entries are merged per key.
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    pub url: Option<String>,
    pub data: Option<Value>,
    pub headers: Headers,
}

impl RequestContext {
    fn apply(&mut self, patch: ContextPatch) {
        if let Some(url) = patch.url {
            self.url = url;
        }
        if let Some(data) = patch.data {
            self.data = data;
        }
        for (key, value) in patch.headers {
            self.headers.insert(key, value);
        }
    }
}

/// Before hook: receives the current context, returns a patch to merge in.
pub type BeforeHook = Arc<
    dyn for<'a> Fn(&'a RequestContext) -> BoxFuture<'a, Result<ContextPatch, ApiError>>
        + Send
        + Sync,
>;

/// After hook: receives the previous stage's result and the context,
/// produces the next result.
pub type AfterHook = Arc<
    dyn for<'a> Fn(Value, &'a RequestContext) -> BoxFuture<'a, Result<Value, ApiError>>
        + Send
        + Sync,
>;

/// Error hook: receives the rejection and the context. Returning `Ok`
/// recovers the call; returning `Err` passes the error on to the next
/// error hook, or to the caller if none remain.
pub type ErrorHook = Arc<
    dyn for<'a> Fn(ApiError, &'a RequestContext) -> BoxFuture<'a, Result<Value, ApiError>>
        + Send
        + Sync,
>;

pub(crate) async fn execute(
    config: &ApiConfig,
    transport: &dyn Transport,
    url: &str,
    data: Value,
    headers: Headers,
    opts: CallOpts,
) -> Result<Value, ApiError> {
    let mut ctx = RequestContext {
        url: url.to_string(),
        data,
        headers,
        response: None,
        opts,
    };

    let mut outcome = run_stages(config, transport, &mut ctx).await;

    // Any rejection in the stages above folds through the error hooks.
    for hook in &config.error_hooks {
        outcome = match outcome {
            Ok(value) => Ok(value),
            Err(err) => hook(err, &ctx).await,
        };
    }

    outcome
}

async fn run_stages(
    config: &ApiConfig,
    transport: &dyn Transport,
    ctx: &mut RequestContext,
) -> Result<Value, ApiError> {
    for hook in &config.before_hooks {
        let patch = hook(ctx).await?;
        ctx.apply(patch);
    }

    debug!(method = %config.method, url = %ctx.url, "Dispatching API request.");
    let dispatched = match config.method.to_ascii_lowercase().as_str() {
        "get" => {
            transport
                .get(
                    ctx.url.clone(),
                    ctx.data.clone(),
                    ctx.headers.clone(),
                    ctx.opts.clone(),
                )
                .await
        }
        "post" => {
            transport
                .post(
                    ctx.url.clone(),
                    ctx.data.clone(),
                    ctx.headers.clone(),
                    ctx.opts.clone(),
                )
                .await
        }
        other => {
            return Err(ApiError::Transport(format!(
                "unsupported method `{other}`; the transport exposes get/post only"
            )))
        }
    };

    let reply = match dispatched {
        Ok(reply) => reply,
        Err(err) => {
            // An envelope failure still carries the raw response; record
            // it so error hooks can inspect status and headers.
            if let ApiError::Envelope { raw: Some(raw), .. } = &err {
                ctx.response = Some(raw.clone());
            }
            return Err(err);
        }
    };

    ctx.response = Some(reply.raw);

    let mut result = reply.data;
    for hook in &config.after_hooks {
        result = hook(result, ctx).await?;
    }
    Ok(result)
}
