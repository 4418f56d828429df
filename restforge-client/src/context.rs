//! Shared configuration bag and per-call fetch context.

use http::{HeaderMap, Method};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

use crate::request::Payload;

/// Parameter object used for call bodies, extra params and the config bag.
///
/// Key order is preserved, so query strings follow insertion order.
pub type Params = serde_json::Map<String, Value>;

/// Turn a JSON value into a parameter object.
///
/// Objects are taken as-is, `null` becomes an empty object and any other
/// value is rejected with `None`.
pub fn try_params(value: Value) -> Option<Params> {
    match value {
        Value::Object(map) => Some(map),
        Value::Null => Some(Params::new()),
        _ => None,
    }
}

/// Like [`try_params`], treating non-object values as empty.
pub fn params(value: Value) -> Params {
    try_params(value).unwrap_or_default()
}

/// Versioned snapshot of the mutable configuration bag.
///
/// Every merge produces a new value with a higher version; existing
/// snapshots held by in-flight calls are never modified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigBag {
    version: u64,
    values: Params,
}

impl ConfigBag {
    /// Create version 0 of a bag.
    pub fn new(values: Params) -> Self {
        Self { version: 0, values }
    }

    /// Monotonic version, bumped by every merge.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All values.
    pub fn values(&self) -> &Params {
        &self.values
    }

    /// Look up one value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Produce the next version with `delta` merged over the current values.
    pub fn merged(&self, delta: Params) -> Self {
        let mut values = self.values.clone();
        values.extend(delta);
        Self {
            version: self.version + 1,
            values,
        }
    }
}

/// The one piece of cross-call mutable state of a client.
#[derive(Debug, Default)]
pub(crate) struct SharedConfig {
    current: RwLock<Arc<ConfigBag>>,
}

impl SharedConfig {
    pub(crate) fn new(values: Params) -> Self {
        Self {
            current: RwLock::new(Arc::new(ConfigBag::new(values))),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<ConfigBag> {
        self.current.read().clone()
    }

    pub(crate) fn update(&self, delta: Params) -> Arc<ConfigBag> {
        let mut current = self.current.write();
        let next = Arc::new(current.merged(delta));
        *current = next.clone();
        next
    }
}

/// Request state of one logical call, shared by all of its attempts.
///
/// Handed to status predicates and to the response transformer.
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Registered endpoint name, or `custom` for ad-hoc calls.
    pub endpoint_name: String,
    /// HTTP method.
    pub method: Method,
    /// Path template before placeholder substitution.
    pub path: String,
    /// Final URL, query string included.
    pub url: String,
    /// Call body (used only as query source for GET-style calls).
    pub body: Payload,
    /// Resolved request headers.
    pub headers: HeaderMap,
    /// Extra params supplied alongside the body.
    pub extra_params: Params,
    /// Config bag snapshot the call was resolved against.
    pub config: Arc<ConfigBag>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_bumps_version_and_keeps_snapshot() {
        let shared = SharedConfig::new(params(json!({"appId": "wx1"})));
        let before = shared.snapshot();

        let after = shared.update(params(json!({"access_token": "t-2"})));

        assert_eq!(before.version(), 0);
        assert!(before.get("access_token").is_none());
        assert_eq!(after.version(), 1);
        assert_eq!(after.get_str("access_token"), Some("t-2"));
        assert_eq!(after.get_str("appId"), Some("wx1"));
        assert_eq!(shared.snapshot().version(), 1);
    }

    #[test]
    fn test_merge_overwrites_existing_keys() {
        let bag = ConfigBag::new(params(json!({"access_token": "old"})));
        let next = bag.merged(params(json!({"access_token": "new"})));
        assert_eq!(next.get_str("access_token"), Some("new"));
        assert_eq!(bag.get_str("access_token"), Some("old"));
    }

    #[test]
    fn test_params_from_values() {
        assert_eq!(params(json!({"a": 1})).len(), 1);
        assert!(params(Value::Null).is_empty());
        assert!(try_params(json!([1, 2])).is_none());
    }
}
