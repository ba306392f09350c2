//! Absence tolerant accessors over a decoded json object.
//!
//! Every getter answers `None` when the key is missing, null, or holds a value
//! of another shape. Fallbacks are chosen at the call site, never here.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

use std::convert::TryFrom;

#[derive(Clone, Copy, Debug)]
pub struct Record<'a>(&'a Map<String, Value>);

impl<'a> Record<'a> {
    pub fn new(value: &'a Value) -> Option<Self> {
        value.as_object().map(Record)
    }

    pub fn from_map(map: &'a Map<String, Value>) -> Self {
        Record(map)
    }

    pub fn map(&self) -> &'a Map<String, Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Raw value, `None` for a missing key or an explicit null.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        match self.0.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        }
    }

    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.str(key).map(str::to_owned)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(Value::Number(number)) => lossless_i64(number),
            _ => None,
        }
    }

    pub fn i32(&self, key: &str) -> Option<i32> {
        self.i64(key).and_then(|value| i32::try_from(value).ok())
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.i64(key).and_then(|value| u64::try_from(value).ok())
    }

    pub fn u32(&self, key: &str) -> Option<u32> {
        self.i64(key).and_then(|value| u32::try_from(value).ok())
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn record(&self, key: &str) -> Option<Record<'a>> {
        self.get(key).and_then(Record::new)
    }

    /// A list of objects; non-object elements are dropped.
    pub fn records(&self, key: &str) -> Option<Vec<Record<'a>>> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Record::new).collect())
    }

    pub fn strings(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
    }

    /// Walks nested objects, e.g. `["nodes", "count", "total"]`.
    pub fn at(&self, path: &[&str]) -> Option<&'a Value> {
        let (last, parents) = path.split_last()?;
        let mut record = *self;
        for key in parents {
            record = record.record(key)?;
        }
        record.get(last)
    }

    /// Entries whose value is an object, in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&'a str, Record<'a>)> + 'a {
        self.0
            .iter()
            .filter_map(|(key, value)| Record::new(value).map(|record| (key.as_str(), record)))
    }

    /// Decodes `key` with serde, for fixed-shape sub-objects.
    pub fn deserialize<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| T::deserialize(value).map_err(Error::from))
            .transpose()
    }

    pub fn require_str(&self, key: &str) -> Result<&'a str> {
        required(self.str(key), key)
    }

    pub fn require_i64(&self, key: &str) -> Result<i64> {
        required(self.i64(key), key)
    }

    pub fn require_u64(&self, key: &str) -> Result<u64> {
        let value = self.require_i64(key)?;
        u64::try_from(value).map_err(|_| Error::invalid(key, format!("`{}` is negative", value)))
    }

    pub fn require_u32(&self, key: &str) -> Result<u32> {
        required(self.u32(key), key)
    }

    pub fn require_bool(&self, key: &str) -> Result<bool> {
        required(self.bool(key), key)
    }

    pub fn require_record(&self, key: &str) -> Result<Record<'a>> {
        required(self.record(key), key)
    }
}

/// Decodes a whole body and hands its root object to `build`.
pub fn from_body<T>(body: &[u8], build: impl FnOnce(Record<'_>) -> Result<T>) -> Result<T> {
    let value: Value = serde_json::from_slice(body)?;
    match value.as_object() {
        Some(map) => build(Record(map)),
        None => Err(Error::invalid("<root>", "expected a json object")),
    }
}

pub fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| Error::missing(key))
}

/// Integer view of a json number, refusing anything that would lose precision.
pub fn lossless_i64(number: &Number) -> Option<i64> {
    if let Some(value) = number.as_i64() {
        return Some(value);
    }
    if let Some(value) = number.as_u64() {
        return i64::try_from(value).ok();
    }
    number
        .as_f64()
        .filter(|value| value.fract() == 0.0 && *value >= -9.223_372_036_854_776e18)
        .filter(|value| *value < 9.223_372_036_854_776e18)
        .map(|value| value as i64)
}

/// Renders a scalar the way settings are exposed: strings verbatim, others as json text.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_and_null_are_none() {
        let value = json!({"a": null, "b": 1});
        let record = Record::new(&value).unwrap();
        assert!(record.i64("a").is_none());
        assert!(record.i64("missing").is_none());
        assert_eq!(record.i64("b"), Some(1));
        assert!(record.str("b").is_none());
    }

    #[test]
    fn test_numeric_widths() {
        let value = json!({"whole": 5.0, "frac": 5.5, "big": 3_000_000_000u64, "neg": -1});
        let record = Record::new(&value).unwrap();
        assert_eq!(record.i64("whole"), Some(5));
        assert_eq!(record.i64("frac"), None);
        assert_eq!(record.f64("frac"), Some(5.5));
        assert_eq!(record.i32("big"), None);
        assert_eq!(record.u32("big"), Some(3_000_000_000));
        assert_eq!(record.u64("neg"), None);
        assert_eq!(record.f64("neg"), Some(-1.0));
    }

    #[test]
    fn test_path_and_entries() {
        let value = json!({"nodes": {"count": {"total": 3}}, "x": 1, "y": {"z": true}});
        let record = Record::new(&value).unwrap();
        assert_eq!(record.at(&["nodes", "count", "total"]), Some(&json!(3)));
        assert!(record.at(&["nodes", "missing", "total"]).is_none());

        let names: Vec<&str> = record.entries().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["nodes", "y"]);
    }

    #[test]
    fn test_from_body_rejects_non_objects() {
        assert_eq!(from_body(br#"{"a": 2}"#, |record| Ok(record.i64("a"))).unwrap(), Some(2));
        match from_body(b"[1, 2]", |record| Ok(record.len())) {
            Err(Error::InvalidField { field, .. }) => assert_eq!(field, "<root>"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_require_reports_key() {
        let value = json!({});
        let record = Record::new(&value).unwrap();
        match record.require_str("_id") {
            Err(Error::MissingField(field)) => assert_eq!(field, "_id"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
