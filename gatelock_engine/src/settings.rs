//! Frozen per-world configuration.
//!
//! Settings and world properties are plain name/value maps fixed before any
//! rule is compiled. The compiler inlines them as literals, so a changed
//! setting requires recompiling the world's rules.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single setting or world-property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(i64),
    Text(String),
    List(Vec<String>),
}

/// Name/value map with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(HashMap<String, SettingValue>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: SettingValue) {
        self.0.insert(name.into(), value);
    }

    pub fn set_bool(&mut self, name: impl Into<String>, value: bool) {
        self.set(name, SettingValue::Bool(value));
    }

    pub fn set_number(&mut self, name: impl Into<String>, value: i64) {
        self.set(name, SettingValue::Number(value));
    }

    pub fn set_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set(name, SettingValue::Text(value.into()));
    }

    pub fn set_list<I, S>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(
            name,
            SettingValue::List(values.into_iter().map(Into::into).collect()),
        );
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.0.get(name)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Some(SettingValue::Bool(b)) => *b,
            _ => default,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(SettingValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.get(name) {
            Some(SettingValue::List(v)) => Some(v),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl<K: Into<String>> FromIterator<(K, SettingValue)> for Settings {
    fn from_iter<T: IntoIterator<Item = (K, SettingValue)>>(iter: T) -> Self {
        Settings(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
