//! `{token}` substitution for paths and header values.
//!
//! Lookups never fail: a token with no value resolves to the empty string.
//! Values substituted into a path are percent-encoded as one path segment;
//! header values are substituted raw.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::Value;
use std::collections::HashSet;

use crate::context::Params;

/// Characters escaped in a substituted path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-encode `value` so it stays inside one path segment.
pub fn encode_path_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// Render a parameter value the way it appears in a URL or header.
///
/// Strings are used verbatim, `null` is empty, scalars use their JSON text
/// and arrays/objects are embedded as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Replace every `{name}` in `template` using `lookup`.
///
/// `{}` and an unclosed `{` are left untouched. Returns the rendered string
/// and the names of the tokens that were substituted.
pub fn substitute<F>(template: &str, mut lookup: F) -> (String, Vec<String>)
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(template.len());
    let mut tokens = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(0) => {
                out.push_str("{}");
                rest = &after[1..];
            }
            Some(end) => {
                let name = &after[..end];
                out.push_str(&lookup(name));
                tokens.push(name.to_string());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    (out, tokens)
}

/// Result of resolving a path, its headers and its query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Path with tokens substituted and query string appended.
    pub path: String,
    /// Header values with tokens substituted.
    pub headers: Vec<(String, String)>,
    /// Query parameters appended to the path, in order.
    pub query: Vec<(String, String)>,
}

/// Per-call placeholder resolver.
///
/// `placeholders` maps a placeholder name to its source: either the name of
/// a parameter (`{"id": "userId"}`) or a template (`{"access_token":
/// "{access_token}"}`). Sources are resolved against `merged`, which is the
/// config bag overlaid by the call body and extra params. The configured
/// map is only read; resolved values live in a working copy owned by the
/// resolver.
#[derive(Debug, Clone)]
pub struct PlaceholderResolver<'a> {
    merged: &'a Params,
    holders: Vec<(String, String)>,
    sources: Vec<Vec<String>>,
}

impl<'a> PlaceholderResolver<'a> {
    /// Resolve every configured placeholder against `merged`; empty results
    /// are dropped.
    pub fn new(placeholders: &[(String, String)], merged: &'a Params) -> Self {
        let mut holders = Vec::new();
        let mut sources = Vec::new();
        for (name, source) in placeholders {
            let (value, read) = if source.contains('{') {
                substitute(source, |token| lookup_merged(merged, token))
            } else {
                (lookup_merged(merged, source), vec![source.clone()])
            };
            if !value.is_empty() {
                holders.push((name.clone(), value));
                sources.push(read);
            }
        }

        Self {
            merged,
            holders,
            sources,
        }
    }

    /// Non-empty resolved placeholders, in configuration order.
    pub fn holders(&self) -> &[(String, String)] {
        &self.holders
    }

    /// Value of one token: a resolved placeholder first, then the merged
    /// parameters, then the empty string.
    pub fn lookup(&self, token: &str) -> String {
        self.holders
            .iter()
            .find(|(name, _)| name == token)
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| lookup_merged(self.merged, token))
    }

    /// Substitute tokens in a header value.
    pub fn resolve_value(&self, template: &str) -> String {
        substitute(template, |token| self.lookup(token)).0
    }

    /// Resolve a path template and its query string.
    ///
    /// The query is built from the resolved placeholders overlaid by
    /// `query_source`; keys consumed by path tokens are left out. A path that
    /// already has a `?` is extended with `&`.
    pub fn resolve(
        &self,
        path_template: &str,
        headers: &[(String, String)],
        query_source: &Params,
    ) -> Resolution {
        let (mut path, consumed) =
            substitute(path_template, |token| encode_path_segment(&self.lookup(token)));
        // A placeholder used in the path also hides the parameters it was read from.
        let mut skipped: HashSet<&str> = consumed.iter().map(String::as_str).collect();
        for ((name, _), read) in self.holders.iter().zip(&self.sources) {
            if consumed.iter().any(|token| token == name) {
                skipped.extend(read.iter().map(String::as_str));
            }
        }
        let skip = |key: &str| skipped.contains(key);

        let mut mix = Params::new();
        for (name, value) in &self.holders {
            if !skip(name) {
                mix.insert(name.clone(), Value::String(value.clone()));
            }
        }
        for (key, value) in query_source {
            if !skip(key) {
                mix.insert(key.clone(), value.clone());
            }
        }

        let query: Vec<(String, String)> = mix
            .iter()
            .map(|(key, value)| (key.clone(), value_to_string(value)))
            .collect();

        if !query.is_empty() {
            let encoded = serde_urlencoded::to_string(&query).unwrap_or_default();
            if !encoded.is_empty() {
                path.push(if path.contains('?') { '&' } else { '?' });
                path.push_str(&encoded);
            }
        }

        let headers = headers
            .iter()
            .map(|(name, value)| (name.clone(), self.resolve_value(value)))
            .collect();

        Resolution {
            path,
            headers,
            query,
        }
    }
}

fn lookup_merged(merged: &Params, key: &str) -> String {
    merged.get(key).map(value_to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::params;
    use serde_json::json;

    fn holders(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_reports_tokens() {
        let (out, tokens) = substitute("/a/{x}/b/{y}", |t| t.to_uppercase());
        assert_eq!(out, "/a/X/b/Y");
        assert_eq!(tokens, vec!["x", "y"]);
    }

    #[test]
    fn test_substitute_leaves_malformed_braces() {
        assert_eq!(substitute("/a/{}/b", |_| "v".into()).0, "/a/{}/b");
        assert_eq!(substitute("/a/{open", |_| "v".into()).0, "/a/{open");
    }

    #[test]
    fn test_missing_value_is_empty_string() {
        let merged = Params::new();
        let resolver = PlaceholderResolver::new(&[], &merged);
        let resolution = resolver.resolve("/users/{id}/posts", &[], &Params::new());
        assert_eq!(resolution.path, "/users//posts");
    }

    #[test]
    fn test_placeholder_maps_to_source_param() {
        let merged = params(json!({"userId": "42"}));
        let map = holders(&[("id", "userId")]);
        let resolver = PlaceholderResolver::new(&map, &merged);

        let source = params(json!({"userId": "42"}));
        let resolution = resolver.resolve("/users/{id}", &[], &source);
        assert_eq!(resolution.path, "/users/42");
        assert!(resolution.query.is_empty());
    }

    #[test]
    fn test_template_placeholder_goes_to_query() {
        let merged = params(json!({"access_token": "tok", "openid": "o-1"}));
        let map = holders(&[("access_token", "{access_token}")]);
        let resolver = PlaceholderResolver::new(&map, &merged);

        let source = params(json!({"openid": "o-1", "lang": "zh_CN"}));
        let resolution = resolver.resolve("/cgi-bin/user/info", &[], &source);
        assert_eq!(
            resolution.path,
            "/cgi-bin/user/info?access_token=tok&openid=o-1&lang=zh_CN"
        );
    }

    #[test]
    fn test_empty_placeholders_are_dropped() {
        let merged = Params::new();
        let map = holders(&[("access_token", "{access_token}")]);
        let resolver = PlaceholderResolver::new(&map, &merged);

        assert!(resolver.holders().is_empty());
        let resolution = resolver.resolve("/menu/get", &[], &Params::new());
        assert_eq!(resolution.path, "/menu/get");
    }

    #[test]
    fn test_existing_query_is_extended() {
        let merged = Params::new();
        let resolver = PlaceholderResolver::new(&[], &merged);
        let source = params(json!({"page": 2}));
        let resolution = resolver.resolve("/items?sort=asc", &[], &source);
        assert_eq!(resolution.path, "/items?sort=asc&page=2");
    }

    #[test]
    fn test_path_tokens_are_not_repeated_in_query() {
        let merged = params(json!({"id": "7", "q": "rust"}));
        let resolver = PlaceholderResolver::new(&[], &merged);
        let source = params(json!({"id": "7", "q": "rust"}));
        let resolution = resolver.resolve("/users/{id}", &[], &source);
        assert_eq!(resolution.path, "/users/7?q=rust");
    }

    #[test]
    fn test_header_values_resolve() {
        let merged = params(json!({"token": "abc"}));
        let resolver = PlaceholderResolver::new(&[], &merged);
        let headers = holders(&[("Authorization", "Bearer {token}"), ("X-Trace", "{trace}")]);
        let resolution = resolver.resolve("/", &headers, &Params::new());
        assert_eq!(
            resolution.headers,
            holders(&[("Authorization", "Bearer abc"), ("X-Trace", "")])
        );
    }

    #[test]
    fn test_query_values_are_encoded() {
        let merged = Params::new();
        let resolver = PlaceholderResolver::new(&[], &merged);
        let source = params(json!({"q": "a b&c", "n": 3, "flag": true}));
        let resolution = resolver.resolve("/search", &[], &source);
        assert_eq!(resolution.path, "/search?q=a+b%26c&n=3&flag=true");
    }

    #[test]
    fn test_path_values_are_encoded_as_one_segment() {
        let merged = params(json!({"userId": "a#b?c/d e", "expand": "posts"}));
        let map = holders(&[("id", "userId")]);
        let resolver = PlaceholderResolver::new(&map, &merged);

        let source = params(json!({"userId": "a#b?c/d e", "expand": "posts"}));
        let resolution = resolver.resolve("/users/{id}", &[], &source);
        assert_eq!(resolution.path, "/users/a%23b%3Fc%2Fd%20e?expand=posts");

        let traversal = params(json!({"userId": "x/../../admin"}));
        let resolver = PlaceholderResolver::new(&map, &traversal);
        let resolution = resolver.resolve("/users/{id}", &[], &Params::new());
        assert_eq!(resolution.path, "/users/x%2F..%2F..%2Fadmin");
    }

    #[test]
    fn test_header_values_stay_raw() {
        let merged = params(json!({"token": "a b#c/d"}));
        let resolver = PlaceholderResolver::new(&[], &merged);
        assert_eq!(resolver.resolve_value("Bearer {token}"), "Bearer a b#c/d");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let merged = params(json!({"userId": "42", "expand": "posts"}));
        let map = holders(&[("id", "userId")]);
        let source = params(json!({"expand": "posts"}));

        let first = PlaceholderResolver::new(&map, &merged).resolve("/users/{id}", &[], &source);
        let second = PlaceholderResolver::new(&map, &merged).resolve("/users/{id}", &[], &source);
        assert_eq!(first, second);
        assert_eq!(map, holders(&[("id", "userId")]));
    }
}
