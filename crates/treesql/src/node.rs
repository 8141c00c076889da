//! The tree node every operation consumes and writes back into.
//!
//! A [`Node`] is ordered, named and typed. The same instance plays several
//! roles over its lifetime: it is the request (root value = table or SQL
//! text, children = clause fragments), and after execution it is the
//! response (children = rows, or value = affected row count). Executors
//! clear request content before writing results, so callers must not rely on
//! request children surviving an operation.

use crate::error::{SqlError, SqlResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    /// Create a node with a name and a null value.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Value::Null,
            children: Vec::new(),
        }
    }

    /// Create a node with a name and a value.
    pub fn with_value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            children: Vec::new(),
        }
    }

    /// Append a child and return `self` (for building request trees inline).
    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Append a `name: value` leaf and return `self`.
    pub fn leaf(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.child(Node::with_value(name, value))
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Drop the value and all children.
    pub fn clear(&mut self) {
        self.value = Value::Null;
        self.children.clear();
    }

    /// First direct child with the given name.
    pub fn find(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given name, in order.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// The direct child with the given name, failing if there is more than one.
    pub fn single<'a>(&'a self, name: &str) -> SqlResult<Option<&'a Node>> {
        let mut iter = self.children.iter().filter(|c| c.name == name);
        let first = iter.next();
        if iter.next().is_some() {
            return Err(SqlError::syntax(format!("too many [{name}] nodes")));
        }
        Ok(first)
    }

    /// Detach and return the first direct child with the given name.
    pub fn take(&mut self, name: &str) -> Option<Node> {
        let idx = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(idx))
    }

    /// Read the value as an integer.
    pub fn get_i64(&self) -> SqlResult<i64> {
        self.value.as_i64().ok_or_else(|| self.kind_error("an integer"))
    }

    /// Read the value as a non-negative integer.
    pub fn get_u64(&self) -> SqlResult<u64> {
        let v = self.get_i64()?;
        u64::try_from(v).map_err(|_| {
            SqlError::syntax(format!("[{}] must be non-negative, got {v}", self.name))
        })
    }

    /// Read the value as a boolean. Null reads as `false`.
    pub fn get_bool(&self) -> SqlResult<bool> {
        match &self.value {
            Value::Null => Ok(false),
            v => v.as_bool().ok_or_else(|| self.kind_error("a boolean")),
        }
    }

    /// Read the value as text.
    pub fn get_str(&self) -> SqlResult<&str> {
        self.value.as_str().ok_or_else(|| self.kind_error("text"))
    }

    fn kind_error(&self, expected: &str) -> SqlError {
        SqlError::syntax(format!(
            "[{}] must be {expected}, got {}",
            self.name,
            self.value.kind()
        ))
    }
}
