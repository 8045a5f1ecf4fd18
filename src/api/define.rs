//! API definition builder.
//!
//! [`Definer::define`] turns a URL template into a callable [`ApiHandle`]:
//! the URL is parsed, every hook invocation is folded through its registered
//! factory against an accumulating [`ApiConfig`], and the result is frozen.
//! Unknown hook names fail here, at definition time, never at call time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::hooks::HookRegistry;
use super::request::{self, AfterHook, BeforeHook, CallOpts, ErrorHook, Headers};
use super::transport::Transport;
use super::url::{parse_api_url, HookInvocation};
use super::ApiError;

/// Pipeline configuration for one API definition. Stage vectors are
/// mutated only during construction, never during dispatch.
pub struct ApiConfig {
    pub method: String,
    pub before_hooks: Vec<BeforeHook>,
    pub after_hooks: Vec<AfterHook>,
    pub error_hooks: Vec<ErrorHook>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            before_hooks: Vec::new(),
            after_hooks: Vec::new(),
            error_hooks: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Merge a patch into this config. Stage vectors concatenate so that
    /// multiple hooks can each contribute without clobbering prior
    /// contributions; scalar fields replace.
    fn apply(&mut self, patch: ConfigPatch) {
        if let Some(method) = patch.method {
            self.method = method;
        }
        self.before_hooks.extend(patch.before_hooks);
        self.after_hooks.extend(patch.after_hooks);
        self.error_hooks.extend(patch.error_hooks);
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("method", &self.method)
            .field("before_hooks", &self.before_hooks.len())
            .field("after_hooks", &self.after_hooks.len())
            .field("error_hooks", &self.error_hooks.len())
            .finish()
    }
}

/// A hook factory's contribution to the accumulating config.
#[derive(Default)]
pub struct ConfigPatch {
    pub method: Option<String>,
    pub before_hooks: Vec<BeforeHook>,
    pub after_hooks: Vec<AfterHook>,
    pub error_hooks: Vec<ErrorHook>,
}

impl ConfigPatch {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn before(mut self, hook: BeforeHook) -> Self {
        self.before_hooks.push(hook);
        self
    }

    pub fn after(mut self, hook: AfterHook) -> Self {
        self.after_hooks.push(hook);
        self
    }

    pub fn on_error(mut self, hook: ErrorHook) -> Self {
        self.error_hooks.push(hook);
        self
    }
}

impl fmt::Debug for ConfigPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigPatch")
            .field("method", &self.method)
            .field("before_hooks", &self.before_hooks.len())
            .field("after_hooks", &self.after_hooks.len())
            .field("error_hooks", &self.error_hooks.len())
            .finish()
    }
}

/// Builds API handles from URL templates.
#[derive(Clone)]
pub struct Definer {
    registry: HookRegistry,
    transport: Arc<dyn Transport>,
    global_hooks: Vec<String>,
}

impl Definer {
    pub fn new(registry: HookRegistry, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
            global_hooks: Vec::new(),
        }
    }

    /// Hooks implicitly prepended to every definition, without parameters.
    pub fn with_global_hooks(mut self, hooks: Vec<String>) -> Self {
        self.global_hooks = hooks;
        self
    }

    /// Define a single API from a URL template.
    pub fn define(&self, api_url: &str) -> Result<ApiHandle, ApiError> {
        let parsed = parse_api_url(api_url, &self.global_hooks);

        let mut config = ApiConfig::default();
        for invocation in &parsed.hook_args {
            let factory = self
                .registry
                .get(&invocation.hook_name)
                .ok_or_else(|| ApiError::UnknownHook(invocation.hook_name.clone()))?;
            let patch = factory(&invocation.hook_params, &config).map_err(|reason| {
                ApiError::Hook {
                    id: invocation.hook_name.clone(),
                    reason,
                }
            })?;
            config.apply(patch);
        }

        Ok(ApiHandle {
            url: parsed.url,
            config: Arc::new(config),
            hook_args: Arc::new(parsed.hook_args),
            transport: Arc::clone(&self.transport),
        })
    }

    /// Define every value of a named mapping, preserving keys. Values may
    /// themselves be mappings; those are defined recursively.
    pub fn define_map(
        &self,
        api_urls: &HashMap<String, ApiTree>,
    ) -> Result<HashMap<String, ApiHandleTree>, ApiError> {
        let mut handles = HashMap::with_capacity(api_urls.len());
        for (name, node) in api_urls {
            handles.insert(name.clone(), self.define_tree(node)?);
        }
        Ok(handles)
    }

    fn define_tree(&self, node: &ApiTree) -> Result<ApiHandleTree, ApiError> {
        match node {
            ApiTree::Url(api_url) => Ok(ApiHandleTree::Handle(self.define(api_url)?)),
            ApiTree::Map(map) => {
                let mut handles = HashMap::with_capacity(map.len());
                for (name, child) in map {
                    handles.insert(name.clone(), self.define_tree(child)?);
                }
                Ok(ApiHandleTree::Map(handles))
            }
        }
    }
}

/// A named API layout: a URL template leaf, or a nested mapping of further
/// layouts.
#[derive(Debug, Clone)]
pub enum ApiTree {
    Url(String),
    Map(HashMap<String, ApiTree>),
}

impl From<&str> for ApiTree {
    fn from(api_url: &str) -> Self {
        ApiTree::Url(api_url.to_string())
    }
}

impl From<String> for ApiTree {
    fn from(api_url: String) -> Self {
        ApiTree::Url(api_url)
    }
}

/// The handle structure produced from an [`ApiTree`], mirroring its shape.
#[derive(Debug, Clone)]
pub enum ApiHandleTree {
    Handle(ApiHandle),
    Map(HashMap<String, ApiHandleTree>),
}

impl ApiHandleTree {
    /// The handle at a leaf, if this node is one.
    pub fn handle(&self) -> Option<&ApiHandle> {
        match self {
            ApiHandleTree::Handle(handle) => Some(handle),
            ApiHandleTree::Map(_) => None,
        }
    }

    /// The child under `key`, if this node is a mapping.
    pub fn get(&self, key: &str) -> Option<&ApiHandleTree> {
        match self {
            ApiHandleTree::Handle(_) => None,
            ApiHandleTree::Map(map) => map.get(key),
        }
    }
}

impl fmt::Debug for Definer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definer")
            .field("registry", &self.registry)
            .field("global_hooks", &self.global_hooks)
            .finish()
    }
}

/// A callable API definition with introspectable metadata.
#[derive(Clone)]
pub struct ApiHandle {
    url: String,
    config: Arc<ApiConfig>,
    hook_args: Arc<Vec<HookInvocation>>,
    transport: Arc<dyn Transport>,
}

impl ApiHandle {
    /// Execute the pipeline with a fresh per-call context.
    pub async fn call(
        &self,
        data: Value,
        headers: Headers,
        opts: CallOpts,
    ) -> Result<Value, ApiError> {
        request::execute(&self.config, &*self.transport, &self.url, data, headers, opts).await
    }

    /// The bare URL with all directives removed.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// The parsed hook invocations, globals first.
    pub fn hook_args(&self) -> &[HookInvocation] {
        &self.hook_args
    }
}

impl fmt::Debug for ApiHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiHandle")
            .field("url", &self.url)
            .field("config", &self.config)
            .field("hook_args", &self.hook_args)
            .finish()
    }
}
