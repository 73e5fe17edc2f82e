// src/params.rs

//! Named script arguments.
//!
//! A [`ParameterCollection`] is an ordered list of `(name, value)` pairs that
//! gets bound into a script's environment before it runs. Names compare
//! case-insensitively and duplicates are allowed; lookups return the first
//! match, which lets callers append overrides in front of defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Value kinds a script argument can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl ParamValue {
    /// Parse a command-line style value: `true`/`false` become booleans,
    /// anything that parses as an integer becomes an integer, and the rest
    /// stays a string.
    pub fn parse_loose(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return ParamValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return ParamValue::Bool(false);
        }
        match trimmed.parse::<i64>() {
            Ok(n) => ParamValue::Int(n),
            Err(_) => ParamValue::String(raw.to_string()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::String(_) => "string",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(n) => write!(f, "{n}"),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Case-insensitive name comparison (full Unicode lowercase folding).
pub fn names_match(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterCollection {
    entries: Vec<(String, ParamValue)>,
}

impl ParameterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.add(name, value);
        self
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value whose name matches `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(n, _)| names_match(n, name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get_str(&self, name: &str, fallback: &str) -> String {
        match self.get(name) {
            Some(value) => value.to_string(),
            None => fallback.to_string(),
        }
    }

    pub fn get_int(&self, name: &str, fallback: i64) -> i64 {
        match self.get(name) {
            Some(ParamValue::Int(n)) => *n,
            Some(ParamValue::String(s)) => s.trim().parse().unwrap_or(fallback),
            Some(ParamValue::Bool(_)) | None => fallback,
        }
    }

    pub fn get_bool(&self, name: &str, fallback: bool) -> bool {
        match self.get(name) {
            Some(ParamValue::Bool(b)) => *b,
            Some(ParamValue::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => fallback,
            },
            Some(ParamValue::Int(_)) | None => fallback,
        }
    }

    /// Append every entry of `defaults` whose name is not already present.
    pub fn merge_defaults(&mut self, defaults: &ParameterCollection) {
        for (name, value) in defaults.iter() {
            if !self.contains(name) {
                self.entries.push((name.to_string(), value.clone()));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for ParameterCollection
where
    N: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut params = ParameterCollection::new();
        for (name, value) in iter {
            params.add(name, value);
        }
        params
    }
}

/// A single `NAME=VALUE` pair as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamAssignment {
    pub name: String,
    pub value: ParamValue,
}

impl FromStr for ParamAssignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("invalid parameter '{s}' (expected NAME=VALUE)"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("invalid parameter '{s}': empty name"));
        }
        Ok(ParamAssignment {
            name: name.to_string(),
            value: ParamValue::parse_loose(value),
        })
    }
}

impl FromIterator<ParamAssignment> for ParameterCollection {
    fn from_iter<I: IntoIterator<Item = ParamAssignment>>(iter: I) -> Self {
        let mut params = ParameterCollection::new();
        for a in iter {
            params.add(a.name, a.value);
        }
        params
    }
}
