//! Statement builders: request tree in, parameterized SQL out.
//!
//! All statement kinds share one generic builder core ([`SqlWriter`] plus the
//! fragment writers in this module). Dialect differences are injected through
//! [`Dialect`]: the quote character, the placeholder spelling and the tail
//! function that renders ordering and pagination for reads.
//!
//! Only identifiers are ever written into the statement text; every value
//! from the tree becomes a named parameter.
//!
//! ```ignore
//! use treesql::{Dialect, Node, builder};
//!
//! let request = Node::with_value("pgsql.read", "users")
//!     .child(Node::new("columns").child(Node::new("id")).child(Node::new("name")))
//!     .child(Node::new("where").leaf("status.eq", "active"))
//!     .leaf("limit", 10);
//!
//! let stmt = builder::compile_read(&Dialect::postgres(), &request)?;
//! assert_eq!(
//!     stmt.text,
//!     r#"SELECT "id", "name" FROM "users" WHERE "status" = $1 LIMIT 10"#
//! );
//! ```

mod mutation;
mod predicate;
mod read;


pub use mutation::{compile_create, compile_delete, compile_update};
pub use read::{DEFAULT_LIMIT, compile_read};

use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::ident::Ident;
use crate::node::Node;
use crate::value::Value;

/// Fragment names accepted on every builder operation.
const COMMON_FRAGMENTS: &[&str] = &["generate-only"];

/// The output of compiling a request tree.
///
/// Parameter names are unique within a statement and match the placeholders
/// in `text` one to one, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub text: String,
    pub parameters: Vec<(String, Value)>,
    /// Row cap for the materializer, taken from the compiled `limit` (reads only).
    pub max_rows: Option<u64>,
}

impl CompiledStatement {
    /// Statement node as the executor consumes it: value = SQL text,
    /// children = `placeholder: value` parameter nodes.
    pub fn into_node(self, name: impl Into<String>) -> Node {
        let mut node = Node::with_value(name, self.text);
        node.children = self
            .parameters
            .into_iter()
            .map(|(name, value)| Node::with_value(name, value))
            .collect();
        node
    }

    /// Replace the content of `node` with this statement (the generate-only response).
    pub fn write_into(self, node: &mut Node) {
        let name = std::mem::take(&mut node.name);
        *node = self.into_node(name);
    }
}

/// Whether the request asks for SQL text only, without touching the backend.
pub fn is_generate_only(root: &Node) -> SqlResult<bool> {
    match root.single("generate-only")? {
        Some(node) => node.get_bool(),
        None => Ok(false),
    }
}

/// Accumulates statement text and parameters for one dialect.
pub(crate) struct SqlWriter<'d> {
    dialect: &'d Dialect,
    text: String,
    params: Vec<(String, Value)>,
}

impl<'d> SqlWriter<'d> {
    pub(crate) fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            text: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, sql: &str) -> &mut Self {
        self.text.push_str(sql);
        self
    }

    pub(crate) fn push_ident(&mut self, ident: &Ident) -> &mut Self {
        ident.write_sql(&mut self.text, self.dialect.quote);
        self
    }

    /// Append a placeholder and record its parameter.
    pub(crate) fn push_bind(&mut self, value: Value) -> &mut Self {
        let name = self.dialect.placeholder(self.params.len());
        self.text.push_str(&name);
        self.params.push((name, value));
        self
    }

    pub(crate) fn dialect(&self) -> &'d Dialect {
        self.dialect
    }

    pub(crate) fn text_mut(&mut self) -> &mut String {
        &mut self.text
    }

    pub(crate) fn finish(self, max_rows: Option<u64>) -> CompiledStatement {
        CompiledStatement {
            text: self.text,
            parameters: self.params,
            max_rows,
        }
    }
}

/// Reject any direct child of `root` that is not a known fragment.
pub(crate) fn check_fragments(root: &Node, allowed: &[&str]) -> SqlResult<()> {
    for child in &root.children {
        let name = child.name.as_str();
        if !allowed.contains(&name) && !COMMON_FRAGMENTS.contains(&name) {
            return Err(SqlError::syntax(format!(
                "unknown fragment [{name}] in [{}]",
                root.name
            )));
        }
    }
    Ok(())
}

/// The target table, taken from the root node's value.
pub(crate) fn table(root: &Node) -> SqlResult<Ident> {
    let name = root.value.as_str().ok_or_else(|| {
        SqlError::syntax(format!("[{}] must name a table as its value", root.name))
    })?;
    Ident::parse(name)
}

/// Column list for a read: `"a", "b" AS "alias"`, or `*` when none are given.
pub(crate) fn write_columns(w: &mut SqlWriter<'_>, root: &Node) -> SqlResult<()> {
    let columns = match root.single("columns")? {
        Some(node) if !node.children.is_empty() => node,
        _ => {
            w.push("*");
            return Ok(());
        }
    };
    for (i, col) in columns.children.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push_ident(&Ident::parse(&col.name)?);
        match &col.value {
            Value::Null => {}
            Value::Text(alias) => {
                let alias = Ident::parse(alias)?;
                w.push(" AS ").push_ident(&alias);
            }
            other => {
                return Err(SqlError::syntax(format!(
                    "column alias for [{}] must be text, got {}",
                    col.name,
                    other.kind()
                )));
            }
        }
    }
    Ok(())
}

/// `[INNER|LEFT|RIGHT|FULL OUTER] JOIN "t" ON "a"."x" = "b"."y" AND ...` for every `join` node.
pub(crate) fn write_joins(w: &mut SqlWriter<'_>, root: &Node) -> SqlResult<()> {
    for join in root.find_all("join") {
        let table = join
            .value
            .as_str()
            .ok_or_else(|| SqlError::syntax("[join] must name a table as its value"))
            .and_then(Ident::parse)?;
        check_fragments(join, &["type", "on"])?;

        let kind = match join.single("type")? {
            None => "INNER",
            Some(t) => match t.get_str()?.to_ascii_lowercase().as_str() {
                "inner" => "INNER",
                "left" => "LEFT",
                "right" => "RIGHT",
                "full" => "FULL OUTER",
                other => {
                    return Err(SqlError::syntax(format!("unknown join type '{other}'")));
                }
            },
        };

        let on = match join.single("on")? {
            Some(on) if !on.children.is_empty() => on,
            _ => return Err(SqlError::syntax("[join] requires a non-empty [on] node")),
        };

        w.push(" ").push(kind).push(" JOIN ").push_ident(&table).push(" ON ");
        for (i, cond) in on.children.iter().enumerate() {
            if i > 0 {
                w.push(" AND ");
            }
            let left = Ident::parse(&cond.name)?;
            let right = Ident::parse(cond.get_str()?)?;
            w.push_ident(&left).push(" = ").push_ident(&right);
        }
    }
    Ok(())
}

/// ` WHERE ...` from the `where` fragment, if present and non-empty.
///
/// Returns whether a clause was written.
pub(crate) fn write_where(w: &mut SqlWriter<'_>, root: &Node) -> SqlResult<bool> {
    match root.single("where")? {
        Some(node) if !node.children.is_empty() => {
            w.push(" WHERE ");
            predicate::write_group(w, &node.children, "AND")?;
            Ok(true)
        }
        _ => Ok(false),
    }
}
