//! Encoder options.
//!
//! [`Options`] is an immutable, typed key-value bag backed by a JSON object.
//! Values are converted on access, so a key can be read as any type serde
//! can deserialize it into.

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Default value of the `prefix` option.
pub const DEFAULT_PREFIX: &str = "encoder";

/// Typed key-value configuration bag.
///
/// `null` values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    values: Arc<Map<String, Value>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON object.
    pub fn from_json_str(json: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(values) => Ok(Self {
                values: Arc::new(values),
            }),
            other => Err(Error::Config(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Read options from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Return a copy with `key` set to `value`.
    pub fn with(&self, key: &str, value: impl Serialize) -> Result<Self> {
        let mut values = (*self.values).clone();
        values.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(Self {
            values: Arc::new(values),
        })
    }

    pub fn has(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// Read `key` as `T`. Fails if the key is absent or has the wrong type.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        match self.raw(key) {
            Some(value) => convert(key, value),
            None => Err(Error::Config(format!("required option '{key}' is missing"))),
        }
    }

    /// Read `key` as `T`, falling back to `default` only when the key is absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.raw(key) {
            Some(value) => convert(key, value),
            None => Ok(default),
        }
    }

    fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }
}

fn convert<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| {
        Error::Config(format!(
            "option '{key}' has value {value} of unexpected type: {e}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_with_default() {
        let opts = Options::new();
        assert_eq!(
            opts.get_or("prefix", DEFAULT_PREFIX.to_string()).unwrap(),
            "encoder"
        );
        assert!(!opts.get_or("inference", false).unwrap());
        assert_eq!(opts.get_or::<usize>("index", 0).unwrap(), 0);
    }

    #[test]
    fn test_missing_required_key() {
        let opts = Options::new();
        let err = opts.get::<String>("vmap").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_wrong_type_fails_even_with_default() {
        let opts = Options::from_json_str(r#"{"index": "two", "inference": 1}"#).unwrap();
        assert!(opts.get_or::<usize>("index", 0).is_err());
        assert!(opts.get_or("inference", false).is_err());
        // negative values are not valid indices
        let opts = opts.with("index", -1).unwrap();
        assert!(opts.get::<usize>("index").is_err());
    }

    #[test]
    fn test_with_does_not_mutate_original() {
        let base = Options::new();
        let derived = base.with("dim-emb", 512).unwrap();
        assert!(!base.has("dim-emb"));
        assert_eq!(derived.get::<u32>("dim-emb").unwrap(), 512);
    }

    #[test]
    fn test_null_is_absent() {
        let opts = Options::from_json_str(r#"{"vmap": null}"#).unwrap();
        assert!(!opts.has("vmap"));
        assert_eq!(opts.get_or("vmap", String::new()).unwrap(), "");
    }

    #[test]
    fn test_non_object_json_rejected() {
        assert!(matches!(
            Options::from_json_str("[1, 2]"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"prefix": "encoder_s2", "index": 1}"#).unwrap();
        let opts = Options::from_json_file(&path).unwrap();
        assert_eq!(opts.get::<String>("prefix").unwrap(), "encoder_s2");
        assert_eq!(opts.get::<usize>("index").unwrap(), 1);
    }
}
