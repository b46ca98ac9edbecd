// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Canonical payload encoding.
//!
//! Produces the deterministic byte form hashed by the audit ledger:
//! - map keys sorted lexicographically (byte order)
//! - integers in decimal, floats finite only and without trailing zeros
//! - strings as UTF-8 JSON strings
//! - no insignificant whitespace

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::engine_core::errors::SerializationError;

/// Free-form audit payload.
///
/// Unlike `serde_json::Value` this can carry non-finite floats, so that the
/// canonicalizer can reject them instead of silently turning them into `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<PayloadValue>),
    Map(BTreeMap<String, PayloadValue>),
}

impl PayloadValue {
    /// Build a map payload from key/value pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<PayloadValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        PayloadValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn empty_map() -> Self {
        PayloadValue::Map(BTreeMap::new())
    }
}

impl Default for PayloadValue {
    fn default() -> Self {
        PayloadValue::empty_map()
    }
}

impl From<serde_json::Value> for PayloadValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => PayloadValue::Null,
            Value::Bool(b) => PayloadValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PayloadValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    PayloadValue::UInt(u)
                } else {
                    PayloadValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => PayloadValue::Text(s),
            Value::Array(items) => {
                PayloadValue::List(items.into_iter().map(PayloadValue::from).collect())
            }
            Value::Object(map) => PayloadValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, PayloadValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for PayloadValue {
    fn from(b: bool) -> Self {
        PayloadValue::Bool(b)
    }
}

impl From<i64> for PayloadValue {
    fn from(i: i64) -> Self {
        PayloadValue::Int(i)
    }
}

impl From<u64> for PayloadValue {
    fn from(u: u64) -> Self {
        PayloadValue::UInt(u)
    }
}

impl From<f64> for PayloadValue {
    fn from(f: f64) -> Self {
        PayloadValue::Float(f)
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::Text(s.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        PayloadValue::Text(s)
    }
}

impl<T: Into<PayloadValue>> From<Vec<T>> for PayloadValue {
    fn from(items: Vec<T>) -> Self {
        PayloadValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Canonicalize a payload into its deterministic byte form.
pub fn canonicalize(value: &PayloadValue) -> Result<Vec<u8>, SerializationError> {
    let mut out = String::new();
    write_value(value, "$", &mut out)?;
    Ok(out.into_bytes())
}

/// Convenience wrapper for JSON input.
pub fn canonicalize_json(value: &serde_json::Value) -> Result<Vec<u8>, SerializationError> {
    canonicalize(&PayloadValue::from(value.clone()))
}

fn write_value(value: &PayloadValue, path: &str, out: &mut String) -> Result<(), SerializationError> {
    match value {
        PayloadValue::Null => out.push_str("null"),
        PayloadValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        PayloadValue::Int(i) => write_display(out, i)?,
        PayloadValue::UInt(u) => write_display(out, u)?,
        PayloadValue::Float(f) => out.push_str(&format_float(*f, path)?),
        PayloadValue::Text(s) => write_string(s, out)?,
        PayloadValue::List(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_value(item, &format!("{}[{}]", path, idx), out)?;
            }
            out.push(']');
        }
        PayloadValue::Map(map) => {
            // BTreeMap<String, _> iterates in byte-lexicographic key order.
            out.push('{');
            for (idx, (key, item)) in map.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_string(key, out)?;
                out.push(':');
                write_value(item, &format!("{}.{}", path, key), out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_display<T: std::fmt::Display>(out: &mut String, v: T) -> Result<(), SerializationError> {
    write!(out, "{}", v).map_err(|e| SerializationError::Encoding(e.to_string()))
}

fn write_string(s: &str, out: &mut String) -> Result<(), SerializationError> {
    let quoted =
        serde_json::to_string(s).map_err(|e| SerializationError::Encoding(e.to_string()))?;
    out.push_str(&quoted);
    Ok(())
}

/// Shortest round-trip decimal, never in exponent form. Integral values
/// carry no fraction and negative zero collapses to `0`.
fn format_float(f: f64, path: &str) -> Result<String, SerializationError> {
    if !f.is_finite() {
        return Err(SerializationError::NonFiniteNumber {
            path: path.to_string(),
        });
    }
    if f == 0.0 {
        return Ok("0".to_string());
    }
    Ok(format!("{}", f))
}
