//! Extension metadata and configuration
//!
//! Transformations and validations share the same metadata: a name, a
//! priority (lower runs earlier) and an applicability filter on the
//! resource kind.

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// Priority of an extension that must run before everything else
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// Metadata shared by all extensions
pub trait Extension: Send + Sync {
    /// Stable name, used in logs, annotations and configuration sections
    fn name(&self) -> &str;

    /// Execution priority; lower values run earlier
    fn priority(&self) -> i32 {
        0
    }

    /// Whether the extension applies to resources of `kind`
    fn accepts(&self, _kind: &str) -> bool {
        true
    }
}

/// Extensions built from an [`ExtensionConfig`]
///
/// A missing required parameter is a configuration error, raised before
/// any reconciliation step runs.
pub trait Configurable: Sized {
    fn from_config(config: &ExtensionConfig) -> Result<Self>;
}

/// Parameters for one extension
///
/// Two keys are reserved and understood by the registry: `enabled`
/// (defaults to true) and `priority` (overrides the extension's own).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionConfig {
    name: String,
    params: Map<String, Value>,
}

impl ExtensionConfig {
    /// Create an empty configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Create a configuration from a JSON object
    ///
    /// Anything other than an object or null is a configuration error.
    pub fn from_value(name: impl Into<String>, value: Value) -> Result<Self> {
        let name = name.into();
        match value {
            Value::Object(params) => Ok(Self { name, params }),
            Value::Null => Ok(Self::new(name)),
            other => Err(Error::configuration(
                name,
                format!("expected a table of parameters, got {other}"),
            )),
        }
    }

    /// Add a parameter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    fn invalid(&self, key: &str, expected: &str) -> Error {
        Error::configuration(
            &self.name,
            format!("parameter '{key}' must be {expected}"),
        )
    }

    fn missing(&self, key: &str) -> Error {
        Error::configuration(&self.name, format!("missing required parameter '{key}'"))
    }

    /// Get an integer parameter
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.invalid(key, "an integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(key, "an integer")),
            Some(_) => Err(self.invalid(key, "an integer")),
        }
    }

    /// Get a string parameter
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(key, "a string")),
        }
    }

    /// Get a boolean parameter
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(key, "a boolean")),
            Some(_) => Err(self.invalid(key, "a boolean")),
        }
    }

    pub fn require_i64(&self, key: &str) -> Result<i64> {
        self.get_i64(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)?.ok_or_else(|| self.missing(key))
    }

    /// Integer parameter that must fit an `i32` and be at least `min`
    pub fn require_i32_at_least(&self, key: &str, min: i32) -> Result<i32> {
        let value = self.require_i64(key)?;
        i32::try_from(value)
            .ok()
            .filter(|v| *v >= min)
            .ok_or_else(|| self.invalid(key, &format!("an integer between {min} and {}", i32::MAX)))
    }

    /// Whether the extension is enabled (default: true)
    pub fn enabled(&self) -> Result<bool> {
        Ok(self.get_bool("enabled")?.unwrap_or(true))
    }

    /// Priority override, if any
    pub fn priority(&self) -> Result<Option<i32>> {
        self.get_i64("priority")?
            .map(|p| i32::try_from(p).map_err(|_| self.invalid("priority", "a 32-bit integer")))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_getters() {
        let config = ExtensionConfig::from_value(
            "max-partitions",
            json!({"max": 5, "as_string": "7", "pattern": "^_", "flag": true}),
        )
        .unwrap();

        assert_eq!(config.get_i64("max").unwrap(), Some(5));
        assert_eq!(config.get_i64("as_string").unwrap(), Some(7));
        assert_eq!(config.get_str("pattern").unwrap(), Some("^_"));
        assert_eq!(config.get_bool("flag").unwrap(), Some(true));
        assert_eq!(config.get_i64("absent").unwrap(), None);
    }

    #[test]
    fn test_missing_required_parameter() {
        let config = ExtensionConfig::new("max-partitions");
        let err = config.require_i64("max").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("missing required parameter 'max'"));
    }

    #[test]
    fn test_wrong_type() {
        let config = ExtensionConfig::new("x").with("max", "many");
        assert!(config.get_i64("max").is_err());
        assert!(config.get_str("max").is_ok());
        assert!(ExtensionConfig::from_value("x", json!([1, 2])).is_err());
    }

    #[test]
    fn test_reserved_keys() {
        let config = ExtensionConfig::new("x");
        assert!(config.enabled().unwrap());
        assert_eq!(config.priority().unwrap(), None);

        let config = config.with("enabled", false).with("priority", -5);
        assert!(!config.enabled().unwrap());
        assert_eq!(config.priority().unwrap(), Some(-5));
    }

    #[test]
    fn test_require_i32_at_least() {
        let config = ExtensionConfig::new("x").with("n", 0).with("big", i64::MAX);
        assert!(config.require_i32_at_least("n", 1).is_err());
        assert_eq!(config.require_i32_at_least("n", 0).unwrap(), 0);
        assert!(config.require_i32_at_least("big", 0).is_err());
    }
}
