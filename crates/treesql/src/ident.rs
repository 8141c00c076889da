//! Safe SQL identifier handling.
//!
//! Table and column names are the only request content ever written into SQL
//! text directly. [`Ident`] validates them before that happens:
//!
//! - Dotted notation is supported (`schema.table.column`).
//! - Every part must match `[A-Za-z_][A-Za-z0-9_]*`.
//! - A trailing `*` part is accepted for columns (`t.*`).
//!
//! Rendering quotes every part with the dialect's quote character, so
//! reserved words such as `order` or `user` are safe column names.

use crate::error::{SqlError, SqlResult};

/// A part of a SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentPart {
    /// Validated name, quoted on output.
    Name(String),
    /// `*`, never quoted.
    Wildcard,
}

/// A validated SQL identifier (column, table, or schema name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub parts: Vec<IdentPart>,
}

impl Ident {
    /// Parse an identifier string, validating every dotted part.
    pub fn parse(s: &str) -> SqlResult<Self> {
        if s.is_empty() {
            return Err(SqlError::syntax("identifier cannot be empty"));
        }

        let segments: Vec<&str> = s.split('.').collect();
        let last = segments.len() - 1;
        let mut parts = Vec::with_capacity(segments.len());
        for (i, segment) in segments.into_iter().enumerate() {
            if segment == "*" {
                if i != last {
                    return Err(SqlError::syntax(format!(
                        "'*' must be the last part of identifier '{s}'"
                    )));
                }
                parts.push(IdentPart::Wildcard);
                continue;
            }
            validate_part(s, segment)?;
            parts.push(IdentPart::Name(segment.to_string()));
        }

        Ok(Self { parts })
    }

    /// Render the identifier, quoting each named part with `quote`.
    pub fn to_sql(&self, quote: char) -> String {
        let mut out = String::new();
        self.write_sql(&mut out, quote);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String, quote: char) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                IdentPart::Name(name) => {
                    out.push(quote);
                    out.push_str(name);
                    out.push(quote);
                }
                IdentPart::Wildcard => out.push('*'),
            }
        }
    }
}

fn validate_part(full: &str, part: &str) -> SqlResult<()> {
    let mut chars = part.chars();
    match chars.next() {
        None => {
            return Err(SqlError::syntax(format!(
                "empty identifier segment in '{full}'"
            )));
        }
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        Some(c) => {
            return Err(SqlError::syntax(format!(
                "invalid identifier start character '{c}' in '{full}'"
            )));
        }
    }
    if let Some(c) = chars.find(|c| !(*c == '_' || c.is_ascii_alphanumeric())) {
        return Err(SqlError::syntax(format!(
            "invalid character '{c}' in identifier '{full}'"
        )));
    }
    Ok(())
}
