//! SQL query text plus named parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named query parameter, e.g. `@city`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: Value,
}

impl SqlParameter {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A SQL query against a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    #[serde(rename = "query")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<SqlParameter>,
}

impl SqlQuery {
    /// Creates a parameterless query.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    /// Adds a named parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.push(SqlParameter::new(name, value));
        self
    }

    /// Returns this query with the text replaced, keeping parameters.
    ///
    /// Used when the planner hands back a rewritten query body.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: self.parameters.clone(),
        }
    }
}
