//! Hook registry.
//!
//! Hooks are registered explicitly under an identifier. Identifiers are
//! normalized through [`hook_id`] on both registration and lookup, so a
//! hook registered as `authToken` resolves from a `<auth-token>` directive
//! just as well.

use std::collections::HashMap;
use std::sync::Arc;

use super::define::{ApiConfig, ConfigPatch};

/// Raw string parameters parsed from a URL directive. No type coercion.
pub type HookParams = HashMap<String, String>;

/// A hook factory inspects its parameters and the config accumulated so
/// far, and returns a patch to merge into the definition.
pub type HookFactory =
    Arc<dyn Fn(&HookParams, &ApiConfig) -> Result<ConfigPatch, String> + Send + Sync>;

/// Mapping from hook identifier to factory.
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: HashMap<String, HookFactory>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under the given identifier, normalized via
    /// [`hook_id`]. A later registration under the same identifier replaces
    /// the earlier one.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&HookParams, &ApiConfig) -> Result<ConfigPatch, String> + Send + Sync + 'static,
    {
        self.hooks.insert(hook_id(&id.into()), Arc::new(factory));
        self
    }

    pub fn get(&self, id: &str) -> Option<&HookFactory> {
        self.hooks.get(&hook_id(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.hooks.contains_key(&hook_id(id))
    }

    /// Registered identifiers, sorted for stable output.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry").field("ids", &self.ids()).finish()
    }
}

/// Derive a hook identifier from a camel/kebab/snake-case name by
/// converting to upper-snake-case: `"authToken"` becomes `"AUTH_TOKEN"`.
pub fn hook_id(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower_or_digit = false;
    for ch in name.chars() {
        if !ch.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower_or_digit = false;
            continue;
        }
        if ch.is_ascii_uppercase() && prev_lower_or_digit && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower_or_digit = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        current.push(ch.to_ascii_uppercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words.join("_")
}
