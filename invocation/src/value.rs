//! Typed configuration values
//!
//! Tool configuration arrives as loosely-typed YAML. Before any rewrite rule
//! sees it, every entry is converted into a [`ConfigValue`], so each rule can
//! match on the kinds it accepts and reject the rest.
//!
//! Absence is modelled with `Option`: a YAML `null` never becomes a
//! `ConfigValue`, so "no value" and `Bool(false)` stay distinct.

use crate::error::{ConfigResult, ConfigurationError};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_yaml::Value as YamlValue;

/// A single configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
    /// Sequence of scalars, stringified on conversion
    List(Vec<String>),
    Map(ConfigMap),
}

impl ConfigValue {
    /// Whether this value survives as a flag.
    ///
    /// `false`, `0`, empty strings and empty collections are dropped rather
    /// than passed through as empty flags.
    pub fn is_retained(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
        }
    }

    /// Human-readable kind name for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "a boolean",
            Self::Int(_) => "an integer",
            Self::Str(_) => "a string",
            Self::List(_) => "a list",
            Self::Map(_) => "a mapping",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// String form of a scalar, as it would appear in an environment variable.
    ///
    /// Booleans render lower-case. Collections have no scalar form.
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Str(s) => Some(s.clone()),
            Self::List(_) | Self::Map(_) => None,
        }
    }

    /// Convert a YAML value; `null` yields `None`.
    ///
    /// `key` is only used to label errors.
    pub fn from_yaml(key: &str, value: &YamlValue) -> ConfigResult<Option<Self>> {
        let converted = match value {
            YamlValue::Null => return Ok(None),
            YamlValue::Bool(b) => Self::Bool(*b),
            YamlValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Str(n.to_string()),
            },
            YamlValue::String(s) => Self::Str(s.clone()),
            YamlValue::Sequence(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match Self::from_yaml(key, item)? {
                        None => {}
                        Some(v) => match v.scalar_string() {
                            Some(s) => list.push(s),
                            None => {
                                return Err(ConfigurationError::unexpected(
                                    key,
                                    "a list of scalars",
                                    v.kind(),
                                ))
                            }
                        },
                    }
                }
                Self::List(list)
            }
            YamlValue::Mapping(_) => Self::Map(ConfigMap::from_yaml(key, value)?),
            YamlValue::Tagged(tagged) => return Self::from_yaml(key, &tagged.value),
        };
        Ok(Some(converted))
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<&str>> for ConfigValue {
    fn from(value: Vec<&str>) -> Self {
        Self::List(value.into_iter().map(str::to_string).collect())
    }
}

impl From<ConfigMap> for ConfigValue {
    fn from(value: ConfigMap) -> Self {
        Self::Map(value)
    }
}

/// Insertion-ordered mapping of configuration keys to values.
///
/// Order matters only for rules that append (verbosity tokens), but keeping
/// it makes compiled invocations follow the order of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace in place; returns the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Option<ConfigValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Convert a YAML mapping; `null` converts to an empty map and null
    /// entries are dropped.
    pub fn from_yaml(key: &str, value: &YamlValue) -> ConfigResult<Self> {
        let mapping = match value {
            YamlValue::Null => return Ok(Self::new()),
            YamlValue::Mapping(mapping) => mapping,
            YamlValue::Tagged(tagged) => return Self::from_yaml(key, &tagged.value),
            other => {
                return Err(ConfigurationError::unexpected(
                    key,
                    "a mapping",
                    yaml_kind(other),
                ))
            }
        };

        let mut map = Self::new();
        for (k, v) in mapping {
            let name = match k {
                YamlValue::String(s) => s.clone(),
                YamlValue::Bool(b) => b.to_string(),
                YamlValue::Number(n) => n.to_string(),
                other => {
                    return Err(ConfigurationError::unexpected(
                        key,
                        "scalar mapping keys",
                        yaml_kind(other),
                    ))
                }
            };
            if let Some(converted) = ConfigValue::from_yaml(&name, v)? {
                map.insert(name, converted);
            }
        }
        Ok(map)
    }
}

impl<K: Into<String>, V: Into<ConfigValue>> FromIterator<(K, V)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<'a> IntoIterator for &'a ConfigMap {
    type Item = (&'a str, &'a ConfigValue);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl Serialize for ConfigMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn yaml_kind(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "a boolean",
        YamlValue::Number(_) => "a number",
        YamlValue::String(_) => "a string",
        YamlValue::Sequence(_) => "a list",
        YamlValue::Mapping(_) => "a mapping",
        YamlValue::Tagged(_) => "a tagged value",
    }
}
