//! Output assertions
//!
//! Outputs are compared as strings: string values as-is, everything else by
//! its compact JSON form. A JSON null counts as absent.

use serde_json::Value;

use super::config::OutputAssertion;
use crate::common::{Error, Result};
use crate::terraform::{value_to_string, Outputs};

/// Substring check; an absent value never passes
pub fn contains(value: Option<&str>, needle: &str) -> bool {
    value.is_some_and(|v| v.contains(needle))
}

/// Present and non-empty; empty strings, lists and maps fail
pub fn not_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(entries)) => !entries.is_empty(),
        Some(_) => true,
    }
}

/// Glob match where `*` matches any run of characters, including none
pub fn glob_match(pattern: &str, value: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return value.is_empty(),
    };
    let Some((last, middle)) = rest.split_last() else {
        return pattern == value;
    };

    if value.len() < first.len() + last.len()
        || !value.starts_with(first)
        || !value.ends_with(last)
    {
        return false;
    }

    let mut remaining = &value[first.len()..value.len() - last.len()];
    for part in middle {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    true
}

impl OutputAssertion {
    /// Check this assertion against the outputs read after apply
    pub fn check(&self, outputs: &Outputs) -> Result<()> {
        let raw = outputs.get(&self.output).filter(|v| !v.is_null());
        let value = raw.map(value_to_string);

        if raw.is_none() {
            return Err(Error::Assertion(format!(
                "output '{}' is absent",
                self.output
            )));
        }

        if self.not_empty && !not_empty(raw) {
            return Err(Error::Assertion(format!(
                "output '{}' is empty",
                self.output
            )));
        }

        if let Some(expected) = &self.contains {
            if !contains(value.as_deref(), expected) {
                return Err(Error::Assertion(format!(
                    "output '{}' = '{}' does not contain '{}'",
                    self.output,
                    value.unwrap_or_default(),
                    expected
                )));
            }
        }

        if let Some(expected) = &self.equals {
            if value.as_deref() != Some(expected.as_str()) {
                return Err(Error::Assertion(format!(
                    "output '{}' = '{}', expected '{}'",
                    self.output,
                    value.unwrap_or_default(),
                    expected
                )));
            }
        }

        if let Some(pattern) = &self.matches {
            let actual = value.unwrap_or_default();
            if !glob_match(pattern, &actual) {
                return Err(Error::Assertion(format!(
                    "output '{}' = '{}' does not match '{}'",
                    self.output, actual, pattern
                )));
            }
        }

        Ok(())
    }
}

/// Check every assertion and collect all failure messages
pub fn evaluate(assertions: &[OutputAssertion], outputs: &Outputs) -> Vec<String> {
    assertions
        .iter()
        .filter_map(|a| a.check(outputs).err())
        .map(|e| match e {
            Error::Assertion(msg) => msg,
            other => other.to_string(),
        })
        .collect()
}
