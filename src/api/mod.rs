//! API definition pipeline.
//!
//! An API is defined from a URL template carrying inline hook directives.
//! Hooks contribute behavior to three pipeline stages (before/after/error);
//! the generated [`define::ApiHandle`] executes the stages in registration
//! order around a transport call.

pub mod define;
pub mod hooks;
pub mod request;
pub mod transport;
pub mod url;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use define::{ApiConfig, ApiHandle, ApiHandleTree, ApiTree, ConfigPatch, Definer};
pub use hooks::{hook_id, HookParams, HookRegistry};
pub use request::{CallOpts, ContextPatch, Headers, RawResponse, RequestContext};
pub use transport::{HttpTransport, Transport, TransportReply};
pub use url::{parse_api_url, HookInvocation, ParsedUrl};

/// The three-field wire response wrapper used to signal logical
/// success/failure independent of transport-level status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub msg: String,
}

/// Errors surfaced by the API pipeline.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// A URL directive referenced a hook the registry does not know.
    /// Raised at definition time, never at call time.
    #[error("unknown hook `{0}`")]
    UnknownHook(String),
    /// A hook factory or pipeline hook failed.
    #[error("hook `{id}` failed: {reason}")]
    Hook { id: String, reason: String },
    /// The envelope carried a non-success code. The raw response rides
    /// along so error hooks can still inspect status and headers.
    #[error("{msg}")]
    Envelope {
        code: String,
        msg: String,
        raw: Option<RawResponse>,
    },
    /// The transport call itself failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// The envelope failure code, if this error carries one.
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Envelope { code, .. } => Some(code),
            _ => None,
        }
    }
}
