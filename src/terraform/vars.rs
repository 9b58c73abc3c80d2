//! Terraform input variables
//!
//! A variable set is a tree of scalars, lists and maps. It is passed to
//! terraform opaquely; the only checks made here are the ones terraform
//! would otherwise reject at the command line.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::common::{Error, Result};

/// A single variable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<VarValue>),
    Map(BTreeMap<String, VarValue>),
}

impl VarValue {
    /// Build a map value from key/value pairs
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<VarValue>,
    {
        VarValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Render the value for a `-var name=value` argument
    ///
    /// Top-level scalars are passed raw; lists and maps are rendered as HCL.
    pub fn to_arg_value(&self) -> String {
        match self {
            VarValue::Bool(b) => b.to_string(),
            VarValue::Int(i) => i.to_string(),
            VarValue::Float(f) => f.to_string(),
            VarValue::String(s) => s.clone(),
            VarValue::List(_) | VarValue::Map(_) => self.to_hcl(),
        }
    }

    /// Render the value as an HCL expression
    pub fn to_hcl(&self) -> String {
        let mut out = String::new();
        self.write_hcl(&mut out);
        out
    }

    fn write_hcl(&self, out: &mut String) {
        match self {
            VarValue::Bool(b) => {
                let _ = write!(out, "{}", b);
            }
            VarValue::Int(i) => {
                let _ = write!(out, "{}", i);
            }
            VarValue::Float(f) => {
                let _ = write!(out, "{}", f);
            }
            VarValue::String(s) => write_quoted(out, s),
            VarValue::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_hcl(out);
                }
                out.push(']');
            }
            VarValue::Map(entries) => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_quoted(out, key);
                    out.push_str(" = ");
                    value.write_hcl(out);
                }
                out.push('}');
            }
        }
    }

    fn validate(&self, path: &str) -> Result<()> {
        match self {
            VarValue::Float(f) if !f.is_finite() => {
                Err(Error::invalid_variable(path, "float values must be finite"))
            }
            VarValue::List(items) => items
                .iter()
                .enumerate()
                .try_for_each(|(i, item)| item.validate(&format!("{}[{}]", path, i))),
            VarValue::Map(entries) => entries.iter().try_for_each(|(key, value)| {
                if key.is_empty() {
                    return Err(Error::invalid_variable(path, "map keys must not be empty"));
                }
                value.validate(&format!("{}.{}", path, key))
            }),
            _ => Ok(()),
        }
    }
}

/// Quoted HCL string; `${` and `%{` are escaped so values are never templated
fn write_quoted(out: &mut String, s: &str) {
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

impl From<bool> for VarValue {
    fn from(b: bool) -> Self {
        VarValue::Bool(b)
    }
}

impl From<i64> for VarValue {
    fn from(i: i64) -> Self {
        VarValue::Int(i)
    }
}

impl From<i32> for VarValue {
    fn from(i: i32) -> Self {
        VarValue::Int(i64::from(i))
    }
}

impl From<u32> for VarValue {
    fn from(i: u32) -> Self {
        VarValue::Int(i64::from(i))
    }
}

impl From<f64> for VarValue {
    fn from(f: f64) -> Self {
        VarValue::Float(f)
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::String(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        VarValue::String(s)
    }
}

impl<T: Into<VarValue>> From<Vec<T>> for VarValue {
    fn from(items: Vec<T>) -> Self {
        VarValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, VarValue>> for VarValue {
    fn from(entries: BTreeMap<String, VarValue>) -> Self {
        VarValue::Map(entries)
    }
}

/// Named input variables for one terraform working directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarSet(BTreeMap<String, VarValue>);

impl VarSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<VarValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&VarValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VarValue)> {
        self.0.iter()
    }

    /// Check names and values for problems terraform would reject
    pub fn validate(&self) -> Result<()> {
        for (name, value) in &self.0 {
            if !is_identifier(name) {
                return Err(Error::invalid_variable(
                    name,
                    "names must start with a letter or underscore and contain only letters, digits, '_' or '-'",
                ));
            }
            value.validate(name)?;
        }
        Ok(())
    }

    /// Render as `-var name=value` argument pairs
    pub fn to_args(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(name, value)| {
                ["-var".to_string(), format!("{}={}", name, value.to_arg_value())]
            })
            .collect()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn networking_vars() -> VarSet {
        VarSet::new()
            .with("prefix", "test")
            .with("location", "eastus")
            .with("vnet_address_space", vec!["10.0.0.0/16"])
            .with(
                "subnets",
                VarValue::map([("test", VarValue::map([("address_prefix", "10.0.1.0/24")]))]),
            )
    }

    #[test]
    fn test_scalars_are_passed_raw() {
        let vars = VarSet::new()
            .with("prefix", "test")
            .with("node_count", 1)
            .with("enabled", true);
        assert_eq!(
            vars.to_args(),
            vec!["-var", "enabled=true", "-var", "node_count=1", "-var", "prefix=test"]
        );
    }

    #[test]
    fn test_nested_values_render_as_hcl() {
        let vars = networking_vars();
        let args = vars.to_args();
        assert!(args.contains(&r#"vnet_address_space=["10.0.0.0/16"]"#.to_string()));
        assert!(args.contains(&r#"subnets={"test" = {"address_prefix" = "10.0.1.0/24"}}"#.to_string()));
    }

    #[test]
    fn test_hcl_escapes_strings() {
        let value = VarValue::from(vec![r#"say "hi"\now"#]);
        assert_eq!(value.to_hcl(), r#"["say \"hi\"\\now"]"#);
    }

    #[test]
    fn test_hcl_escapes_template_sequences() {
        let value = VarValue::map([("user_data", "echo ${HOME} %{ if x }ok%{ endif } $5 100%")]);
        assert_eq!(
            value.to_hcl(),
            r#"{"user_data" = "echo $${HOME} %%{ if x }ok%%{ endif } $5 100%"}"#
        );

        let args = VarSet::new().with("prefix", "${raw}").to_args();
        assert_eq!(args, vec!["-var", "prefix=${raw}"]);
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let vars: VarSet = serde_yaml::from_str(
            r#"
prefix: test
location: eastus
vnet_address_space: ["10.0.0.0/16"]
subnets:
  test:
    address_prefix: 10.0.1.0/24
"#,
        )
        .unwrap();
        assert_eq!(vars, networking_vars());
    }

    #[test]
    fn test_yaml_numbers_keep_their_type() {
        let vars: VarSet = serde_yaml::from_str(
            "kubernetes_version: \"1.28\"\nnode_count: 1\nratio: 0.5\n",
        )
        .unwrap();
        assert_eq!(vars.get("kubernetes_version"), Some(&VarValue::from("1.28")));
        assert_eq!(vars.get("node_count"), Some(&VarValue::Int(1)));
        assert_eq!(vars.get("ratio"), Some(&VarValue::Float(0.5)));
    }

    #[test]
    fn test_yaml_null_is_rejected() {
        let result: std::result::Result<VarSet, _> = serde_yaml::from_str("prefix: ~\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_names() {
        assert!(networking_vars().validate().is_ok());
        assert!(VarSet::new().with("1bad", "x").validate().is_err());
        assert!(VarSet::new().with("has space", "x").validate().is_err());
        assert!(VarSet::new().with("", "x").validate().is_err());
    }

    #[test]
    fn test_validate_nested_values() {
        let vars = VarSet::new().with("weights", vec![1.0, f64::NAN]);
        match vars.validate() {
            Err(Error::InvalidVariable { name, .. }) => assert_eq!(name, "weights[1]"),
            other => panic!("Expected InvalidVariable, got {:?}", other),
        }

        let mut empty_key = BTreeMap::new();
        empty_key.insert(String::new(), VarValue::from("x"));
        let vars = VarSet::new().with("tags", empty_key);
        assert!(vars.validate().is_err());
    }
}
