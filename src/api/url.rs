//! API URL template parsing.
//!
//! An API definition string can embed hook directives inline:
//! `"/api/user/<auth><cache:ttl=30,key=u>"`. Parsing strips the directives
//! from the URL and collects them, in left-to-right order, as hook
//! invocations. Globally configured hooks are prepended with empty params.

use std::collections::HashMap;

/// A single `<name:k=v,...>` directive extracted from an API URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInvocation {
    pub hook_name: String,
    pub hook_params: HashMap<String, String>,
}

impl HookInvocation {
    pub fn bare(hook_name: impl Into<String>) -> Self {
        Self {
            hook_name: hook_name.into(),
            hook_params: HashMap::new(),
        }
    }
}

/// Result of parsing an API URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// The URL with all directives removed.
    pub url: String,
    /// Global hooks first, then inline directives in scan order.
    pub hook_args: Vec<HookInvocation>,
}

/// Parse an API URL template into a bare URL and an ordered hook list.
///
/// Malformed directives never error: a directive without `:` yields an
/// empty parameter set, and an unterminated `<` is left in the URL as-is.
pub fn parse_api_url(api_url: &str, global_hooks: &[String]) -> ParsedUrl {
    let mut hook_args: Vec<HookInvocation> = global_hooks
        .iter()
        .map(|name| HookInvocation::bare(name.clone()))
        .collect();

    let mut url = String::with_capacity(api_url.len());
    let mut rest = api_url;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        url.push_str(&rest[..start]);
        hook_args.push(parse_directive(&rest[start + 1..start + len]));
        rest = &rest[start + len + 1..];
    }
    url.push_str(rest);

    ParsedUrl { url, hook_args }
}

fn parse_directive(directive: &str) -> HookInvocation {
    // Split on the first `:` only; params may contain further colons.
    let (name, params_str) = directive.split_once(':').unwrap_or((directive, ""));

    let mut hook_params = HashMap::new();
    for pair in params_str.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        // Values may themselves contain `=`, so split on the first one only.
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        hook_params.insert(key.trim().to_string(), value.trim().to_string());
    }

    HookInvocation {
        hook_name: name.to_string(),
        hook_params,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn globals(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_plain_url_yields_only_global_hooks() {
        let parsed = parse_api_url("/api/user/info", &globals(&["AUTH"]));
        assert_eq!(parsed.url, "/api/user/info");
        assert_eq!(parsed.hook_args, vec![HookInvocation::bare("AUTH")]);
    }

    #[test]
    fn test_plain_url_without_globals() {
        let parsed = parse_api_url("/api/user/info", &[]);
        assert_eq!(parsed.url, "/api/user/info");
        assert!(parsed.hook_args.is_empty());
    }

    #[test]
    fn test_directives_are_stripped_and_ordered() {
        let parsed = parse_api_url("/api/user/<auth><cache:ttl=30,key=u>", &globals(&["LOG"]));
        assert_eq!(parsed.url, "/api/user/");
        assert_eq!(parsed.hook_args.len(), 3);
        assert_eq!(parsed.hook_args[0], HookInvocation::bare("LOG"));
        assert_eq!(parsed.hook_args[1], HookInvocation::bare("auth"));
        assert_eq!(parsed.hook_args[2].hook_name, "cache");
        assert_eq!(parsed.hook_args[2].hook_params["ttl"], "30");
        assert_eq!(parsed.hook_args[2].hook_params["key"], "u");
    }

    #[test]
    fn test_directive_in_the_middle_of_the_url() {
        let parsed = parse_api_url("/api/<auth>user/info", &[]);
        assert_eq!(parsed.url, "/api/user/info");
        assert_eq!(parsed.hook_args, vec![HookInvocation::bare("auth")]);
    }

    #[test]
    fn test_directive_without_colon_has_empty_params() {
        let parsed = parse_api_url("/api/list<cache>", &[]);
        assert_eq!(parsed.hook_args[0].hook_name, "cache");
        assert!(parsed.hook_args[0].hook_params.is_empty());
    }

    #[test]
    fn test_param_value_may_contain_equals() {
        let parsed = parse_api_url("/api/<sign:key=a=b=c,alg=hmac>", &[]);
        let params = &parsed.hook_args[0].hook_params;
        assert_eq!(params["key"], "a=b=c");
        assert_eq!(params["alg"], "hmac");
    }

    #[test]
    fn test_params_tolerate_whitespace_after_comma() {
        let parsed = parse_api_url("/api/<cache:ttl=30, key=u>", &[]);
        let params = &parsed.hook_args[0].hook_params;
        assert_eq!(params["ttl"], "30");
        assert_eq!(params["key"], "u");
    }

    #[test]
    fn test_unterminated_directive_is_left_in_url() {
        let parsed = parse_api_url("/api/<auth", &[]);
        assert_eq!(parsed.url, "/api/<auth");
        assert!(parsed.hook_args.is_empty());
    }

    #[test]
    fn test_param_without_value() {
        let parsed = parse_api_url("/api/<cache:force>", &[]);
        assert_eq!(parsed.hook_args[0].hook_params["force"], "");
    }
}
