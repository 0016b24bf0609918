//! `${...}` interpolation for step values

use std::collections::BTreeMap;

use serde_json::Value;

use crate::common::{Error, Result, RunConfig};

/// Values visible to one scenario while it runs
pub struct Vars<'a> {
    pub config: &'a RunConfig,
    pub inputs: &'a BTreeMap<String, String>,
    pub captures: &'a BTreeMap<String, String>,
}

impl Vars<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "username" => Some(self.config.username().to_string()),
            "password" => Some(self.config.password().to_string()),
            "base_url" => Some(self.config.base_url().to_string()),
            _ => {
                if let Some(key) = name.strip_prefix("input.") {
                    self.inputs.get(key).cloned()
                } else if let Some(key) = name.strip_prefix("capture.") {
                    self.captures.get(key).cloned()
                } else {
                    None
                }
            }
        }
    }

    /// Replace every `${name}` in `s`
    pub fn interpolate(&self, s: &str) -> Result<String> {
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| Error::Internal(format!("Unterminated '${{' in '{}'", s)))?;
            let name = after[..end].trim();
            let value = self
                .lookup(name)
                .ok_or_else(|| Error::Internal(format!("No value for '${{{}}}'", name)))?;
            out.push_str(&value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Interpolate every string inside a JSON value
    pub fn interpolate_json(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.interpolate(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.interpolate_json(v))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.interpolate_json(v)?)))
                    .collect::<Result<_>>()?,
            ),
            other => other.clone(),
        })
    }
}

/// Names referenced by `${...}` in a string, in order
pub fn references(s: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                names.push(after[..end].trim().to_string());
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated, report the whole tail so validation names it
                names.push(after.to_string());
                break;
            }
        }
    }
    names
}
