//! Mock definition registry.
//!
//! The registry owns the URL → entry map for the mock server. `reload`
//! re-reads every `*.mock.json` file under the root, builds a brand-new
//! map and swaps it in atomically, so a dispatch never observes a map with
//! only part of a reload batch applied, and entries from deleted files are
//! pruned by construction.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const MOCK_FILE_SUFFIX: &str = ".mock.json";

/// A declarative mock entry as authored in a `*.mock.json` file.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticMock {
    #[serde(default = "default_method")]
    pub method: String,
    /// Successful response data.
    #[serde(default)]
    pub data: Value,
    /// Failure envelope; takes precedence over `data`.
    #[serde(default)]
    pub error: Option<MockFailure>,
    /// Raw response written verbatim, bypassing the envelope entirely.
    #[serde(default)]
    pub raw: Option<RawMock>,
    /// Artificial latency before responding.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockFailure {
    #[serde(default)]
    pub code: Option<String>,
    pub msg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMock {
    #[serde(default = "default_raw_content_type")]
    pub content_type: String,
    pub body: String,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_raw_content_type() -> String {
    "text/plain;charset=utf-8".to_string()
}

/// Normalized request context handed to a mock entry.
#[derive(Debug, Clone)]
pub struct MockContext {
    pub url: String,
    pub query: HashMap<String, String>,
    pub body: Value,
    pub headers: HashMap<String, String>,
}

/// What evaluating a mock entry produced.
pub enum MockOutcome {
    /// Wrap as a success envelope.
    Data(Value),
    /// Wrap as a failure envelope; `code` falls back to the configured
    /// failure sentinel.
    Fail { code: Option<String>, msg: String },
    /// The entry produced the full response itself; dispatch writes
    /// nothing further.
    Raw(Response),
}

impl fmt::Debug for MockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockOutcome::Data(data) => f.debug_tuple("Data").field(data).finish(),
            MockOutcome::Fail { code, msg } => f
                .debug_struct("Fail")
                .field("code", code)
                .field("msg", msg)
                .finish(),
            MockOutcome::Raw(_) => f.debug_tuple("Raw").finish(),
        }
    }
}

/// Programmatic async mock handler, for embedding and tests.
pub type MockHandler = Arc<dyn Fn(MockContext) -> BoxFuture<'static, MockOutcome> + Send + Sync>;

#[derive(Clone)]
pub enum MockContent {
    Static(StaticMock),
    Handler(MockHandler),
}

/// One registered mock endpoint, keyed by URL path.
#[derive(Clone)]
pub struct MockEntry {
    pub method: String,
    pub content: MockContent,
}

impl MockEntry {
    pub async fn invoke(&self, ctx: MockContext) -> MockOutcome {
        match &self.content {
            MockContent::Handler(handler) => handler(ctx).await,
            MockContent::Static(def) => {
                if let Some(delay) = def.delay_ms {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                if let Some(raw) = &def.raw {
                    let response = Response::builder()
                        .status(StatusCode::OK)
                        .header(header::CONTENT_TYPE, raw.content_type.as_str())
                        .body(Body::from(raw.body.clone()))
                        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
                    return MockOutcome::Raw(response);
                }
                if let Some(failure) = &def.error {
                    return MockOutcome::Fail {
                        code: failure.code.clone(),
                        msg: failure.msg.clone(),
                    };
                }
                MockOutcome::Data(def.data.clone())
            }
        }
    }
}

impl fmt::Debug for MockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.content {
            MockContent::Static(_) => "static",
            MockContent::Handler(_) => "handler",
        };
        f.debug_struct("MockEntry")
            .field("method", &self.method)
            .field("content", &kind)
            .finish()
    }
}

/// Outcome counters for one reload pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub files: usize,
    pub entries: usize,
    pub failed: usize,
}

/// Explicitly owned mock registry, constructed once per server process.
pub struct MockRegistry {
    root: PathBuf,
    /// File-backed entries, replaced wholesale on every reload.
    entries: RwLock<Arc<HashMap<String, MockEntry>>>,
    /// Programmatic handlers; consulted before file entries, untouched by
    /// reload.
    handlers: RwLock<HashMap<String, MockEntry>>,
}

impl MockRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: RwLock::new(Arc::new(HashMap::new())),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register a programmatic handler for a URL path.
    pub async fn register_handler(
        &self,
        url: impl Into<String>,
        method: impl Into<String>,
        handler: MockHandler,
    ) {
        let entry = MockEntry {
            method: method.into(),
            content: MockContent::Handler(handler),
        };
        self.handlers.write().await.insert(url.into(), entry);
    }

    /// Re-read every mock file under the root and swap in the fresh map.
    ///
    /// Files are visited in sorted order; on key collision the last writer
    /// wins. A file that fails to parse is logged and skipped without
    /// aborting the rest of the reload.
    pub async fn reload(&self) -> ReloadSummary {
        let mut fresh: HashMap<String, MockEntry> = HashMap::new();
        let mut summary = ReloadSummary::default();

        for entry in WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() || !is_mock_file(entry.path()) {
                continue;
            }
            summary.files += 1;
            match load_mock_file(entry.path()) {
                Ok(defs) => {
                    for (url, mock) in defs {
                        fresh.insert(url, mock);
                    }
                }
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        path = %entry.path().display(),
                        error = %err,
                        "Skipping unreadable mock file."
                    );
                }
            }
        }

        summary.entries = fresh.len();
        debug!(
            files = summary.files,
            entries = summary.entries,
            failed = summary.failed,
            "Rebuilt mock map."
        );

        // Single assignment keeps the swap atomic for concurrent readers.
        let mut guard = self.entries.write().await;
        *guard = Arc::new(fresh);
        summary
    }

    /// Look up an entry by exact URL path (no query string, no method).
    pub async fn lookup(&self, path: &str) -> Option<MockEntry> {
        if let Some(entry) = self.handlers.read().await.get(path) {
            return Some(entry.clone());
        }
        self.entries.read().await.get(path).cloned()
    }

    /// Registered URL paths, sorted, for startup/reload logging.
    pub async fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.entries.read().await.keys().cloned().collect();
        urls.extend(self.handlers.read().await.keys().cloned());
        urls.sort_unstable();
        urls.dedup();
        urls
    }
}

impl fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRegistry").field("root", &self.root).finish()
    }
}

pub(crate) fn is_mock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(MOCK_FILE_SUFFIX))
}

fn load_mock_file(path: &Path) -> Result<HashMap<String, MockEntry>, String> {
    let contents =
        fs::read_to_string(path).map_err(|err| format!("Failed to read mock file: {err}"))?;
    let defs: HashMap<String, StaticMock> =
        serde_json::from_str(&contents).map_err(|err| format!("Invalid mock JSON: {err}"))?;
    Ok(defs
        .into_iter()
        .map(|(url, def)| {
            let entry = MockEntry {
                method: def.method.clone(),
                content: MockContent::Static(def),
            };
            (url, entry)
        })
        .collect())
}
