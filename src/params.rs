//! Values captured from a request path and parsed from its query string.

use crate::error::Error;

use std::collections::BTreeMap;

/// The value of a single path parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// A parameter matching one segment.
    Single(String),
    /// A repeated (`+` or `*`) parameter, split on its delimiter.
    Repeated(Vec<String>),
}

impl ParamValue {
    /// Returns the value as a string. Repeated values yield their first element.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Single(value) => Some(value),
            ParamValue::Repeated(values) => values.first().map(String::as_str),
        }
    }

    /// Returns every value. A single value is returned as a one element slice.
    pub fn as_slice(&self) -> &[String] {
        match self {
            ParamValue::Single(value) => std::slice::from_ref(value),
            ParamValue::Repeated(values) => values,
        }
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Single(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Single(value.to_owned())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        ParamValue::Repeated(values)
    }
}

/// Parameters captured by a matched pattern, in declaration order.
///
/// Optional parameters that did not take part in the match are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub(crate) fn push(&mut self, name: String, value: ParamValue) {
        self.entries.push((name, value));
    }

    /// Returns the value of the parameter `name`.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Returns the value of the parameter `name` as a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Returns every value of the parameter `name`, or an empty slice if the
    /// parameter did not match.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.get(name).map(ParamValue::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts the parameters into the map accepted by
    /// [`Pattern::build`](crate::Pattern::build).
    pub fn into_map(self) -> BTreeMap<String, ParamValue> {
        self.entries.into_iter().collect()
    }
}

/// A parsed query string. Keys keep their order of appearance and may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Parses a raw (still encoded) query string. `None` yields an empty query.
    pub fn parse(raw: Option<&str>) -> Result<Self, Error> {
        let pairs = match raw {
            Some(raw) if !raw.is_empty() => serde_urlencoded::from_str(raw)?,
            _ => Vec::new(),
        };
        Ok(Query { pairs })
    }

    /// Returns the first value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value of `key`.
    pub fn get_all<'q>(&'q self, key: &'q str) -> impl Iterator<Item = &'q str> + 'q {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the distinct keys in order of first appearance.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::with_capacity(self.pairs.len());
        for (key, _) in &self.pairs {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
