// Copyright 2025 Impact Circle Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Trace payload values
//!
//! Trace inputs and outputs are arbitrary structured payloads supplied by
//! the hosting application. `TraceValue` closes that surface over a small
//! set of serializable kinds so the wire format stays well-defined without
//! losing flexibility. Maps are `BTreeMap`-backed, so serialization order
//! is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A structured trace payload value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<TraceValue>),
    Map(BTreeMap<String, TraceValue>),
}

impl TraceValue {
    /// Look up a key on a map value. Returns `None` for non-map values.
    pub fn get(&self, key: &str) -> Option<&TraceValue> {
        match self {
            TraceValue::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TraceValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TraceValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TraceValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[TraceValue]> {
        match self {
            TraceValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, TraceValue>> {
        match self {
            TraceValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TraceValue::Null)
    }

    /// Convert from a `serde_json::Value`. Lossless except for numbers
    /// outside the `f64` range.
    pub fn from_json(value: serde_json::Value) -> TraceValue {
        match value {
            serde_json::Value::Null => TraceValue::Null,
            serde_json::Value::Bool(b) => TraceValue::Bool(b),
            serde_json::Value::Number(n) => TraceValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => TraceValue::String(s),
            serde_json::Value::Array(items) => {
                TraceValue::List(items.into_iter().map(TraceValue::from_json).collect())
            }
            serde_json::Value::Object(entries) => TraceValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, TraceValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Flatten all scalar leaves into one whitespace-joined text, in map-key
    /// order. Token-overlap metrics score against this form.
    pub fn to_plain_text(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ")
    }

    fn collect_text(&self, parts: &mut Vec<String>) {
        match self {
            TraceValue::Null => {}
            TraceValue::Bool(b) => parts.push(b.to_string()),
            TraceValue::Number(n) => parts.push(format_number(*n)),
            TraceValue::String(s) => parts.push(s.clone()),
            TraceValue::List(items) => {
                for item in items {
                    item.collect_text(parts);
                }
            }
            TraceValue::Map(map) => {
                for value in map.values() {
                    value.collect_text(parts);
                }
            }
        }
    }

    /// All string leaves of this value, in deterministic order.
    pub fn string_leaves(&self) -> Vec<&str> {
        let mut leaves = Vec::new();
        self.collect_string_leaves(&mut leaves);
        leaves
    }

    fn collect_string_leaves<'a>(&'a self, leaves: &mut Vec<&'a str>) {
        match self {
            TraceValue::String(s) => leaves.push(s),
            TraceValue::List(items) => {
                for item in items {
                    item.collect_string_leaves(leaves);
                }
            }
            TraceValue::Map(map) => {
                for value in map.values() {
                    value.collect_string_leaves(leaves);
                }
            }
            _ => {}
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<&str> for TraceValue {
    fn from(s: &str) -> Self {
        TraceValue::String(s.to_string())
    }
}

impl From<String> for TraceValue {
    fn from(s: String) -> Self {
        TraceValue::String(s)
    }
}

impl From<f64> for TraceValue {
    fn from(n: f64) -> Self {
        TraceValue::Number(n)
    }
}

impl From<i64> for TraceValue {
    fn from(n: i64) -> Self {
        TraceValue::Number(n as f64)
    }
}

impl From<bool> for TraceValue {
    fn from(b: bool) -> Self {
        TraceValue::Bool(b)
    }
}

impl From<Vec<TraceValue>> for TraceValue {
    fn from(items: Vec<TraceValue>) -> Self {
        TraceValue::List(items)
    }
}

impl From<BTreeMap<String, TraceValue>> for TraceValue {
    fn from(map: BTreeMap<String, TraceValue>) -> Self {
        TraceValue::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_serialization() {
        let value = TraceValue::Map(BTreeMap::from([
            ("matches".to_string(), TraceValue::List(vec![1.0.into(), 2.0.into()])),
            ("ok".to_string(), TraceValue::Bool(true)),
        ]));
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"matches":[1.0,2.0],"ok":true}"#);

        let back: TraceValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_from_json() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"name":"Ada","skills":["teaching",null]}"#).unwrap();
        let value = TraceValue::from_json(json);
        assert_eq!(value.get("name").and_then(|v| v.as_str()), Some("Ada"));
        assert!(value.get("skills").unwrap().as_list().unwrap()[1].is_null());
    }

    #[test]
    fn test_plain_text_is_deterministic() {
        let value = TraceValue::Map(BTreeMap::from([
            ("b".to_string(), TraceValue::String("world".to_string())),
            ("a".to_string(), TraceValue::String("hello".to_string())),
            ("n".to_string(), TraceValue::Number(3.0)),
        ]));
        assert_eq!(value.to_plain_text(), "hello world 3");
    }

    #[test]
    fn test_string_leaves() {
        let value = TraceValue::List(vec![
            TraceValue::String("gardening".to_string()),
            TraceValue::Map(BTreeMap::from([(
                "city".to_string(),
                TraceValue::String("Lisbon".to_string()),
            )])),
            TraceValue::Number(7.0),
        ]);
        assert_eq!(value.string_leaves(), vec!["gardening", "Lisbon"]);
    }
}
