use std::collections::BTreeMap;

use anyhow::{Context, Result};

/// String-keyed metadata variables with typed, defaulted reads.
///
/// Inserting a key twice is a precondition violation; values are set once.
#[derive(Debug, Clone, Default)]
pub struct VarMap {
    vars: BTreeMap<String, String>,
}

impl VarMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Precondition: `name` is not already set.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        assert!(!self.has(&name), "duplicate metadata variable {name:?}");
        self.vars.insert(name, value.into());
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>> {
        match self.get(name) {
            None => Ok(None),
            Some(raw) => parse_bool(raw)
                .map(Some)
                .with_context(|| format!("metadata variable {name:?}")),
        }
    }

    pub fn get_bool_or(&self, name: &str, default: bool) -> Result<bool> {
        Ok(self.get_bool(name)?.unwrap_or(default))
    }

    pub fn get_long(&self, name: &str) -> Result<Option<i64>> {
        match self.get(name) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .with_context(|| format!("metadata variable {name:?} is not an integer: {raw:?}")),
        }
    }

    pub fn get_long_or(&self, name: &str, default: i64) -> Result<i64> {
        Ok(self.get_long(name)?.unwrap_or(default))
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => anyhow::bail!("invalid boolean value {raw:?}"),
    }
}
