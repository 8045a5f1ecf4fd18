//! Project configuration (`vack.toml`).
//!
//! Every field has a default so a missing file yields a usable config.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILENAME: &str = "vack.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VackConfig {
    pub api: ApiSettings,
    pub mock: MockSettings,
}

/// Settings for the API pipeline and its HTTP transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL prefixed to relative API paths.
    pub base_url: String,
    /// Envelope success sentinel.
    pub code_ok: String,
    /// Request timeout in seconds; 0 disables the timeout.
    pub timeout_secs: u64,
    /// Hook ids implicitly prepended to every API definition.
    pub global_hooks: Vec<String>,
    /// Headers injected into every outgoing request.
    pub headers: HashMap<String, String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            code_ok: "0".to_string(),
            timeout_secs: 0,
            global_hooks: Vec::new(),
            headers: HashMap::new(),
        }
    }
}

/// Settings for the mock dev server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MockSettings {
    /// Directory holding `*.mock.json` definition files.
    pub dir: PathBuf,
    /// Quiet period before a file change triggers a reload.
    pub debounce_ms: u64,
    pub code_ok: String,
    pub code_fail: String,
    pub msg_ok: String,
    /// Upstream to proxy unmatched requests to. `None` returns 404.
    pub proxy: Option<String>,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("mock"),
            debounce_ms: 300,
            code_ok: "0".to_string(),
            code_fail: "-1".to_string(),
            msg_ok: "请求成功".to_string(),
            proxy: None,
        }
    }
}

impl VackConfig {
    /// Load `vack.toml` from the given directory, falling back to pure
    /// defaults when the file is absent.
    pub fn load(dir: &Path) -> Result<VackConfig, String> {
        let path = dir.join(CONFIG_FILENAME);
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults.");
            return Ok(VackConfig::default());
        }
        let contents = fs::read_to_string(&path)
            .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
        toml::from_str(&contents).map_err(|err| format!("Invalid {CONFIG_FILENAME}: {err}"))
    }
}
