//! `where` fragment compiler.
//!
//! ```text
//! where
//!    name.like: "a%"          -> "name" LIKE $1
//!    or                       -> ("age" > $2 OR "vip" = $3)
//!       age.mt: 18
//!       vip: true
//!    id.in                    -> "id" IN ($4, $5)
//!       .: 1
//!       .: 2
//!    deleted_at.null: true    -> "deleted_at" IS NULL
//! ```

use super::SqlWriter;
use crate::error::{SqlError, SqlResult};
use crate::ident::Ident;
use crate::node::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Neq,
    Lt,
    Lte,
    Mt,
    Mteq,
    Like,
    In,
    Null,
}

impl Comparison {
    fn parse(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "mt" => Self::Mt,
            "mteq" => Self::Mteq,
            "like" => Self::Like,
            "in" => Self::In,
            "null" => Self::Null,
            _ => return None,
        })
    }

    fn operator(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Neq => " <> ",
            Self::Lt => " < ",
            Self::Lte => " <= ",
            Self::Mt => " > ",
            Self::Mteq => " >= ",
            Self::Like => " LIKE ",
            Self::In | Self::Null => unreachable!("IN and NULL are rendered separately"),
        }
    }
}

/// Split `column.op` into column and comparison; a name without a known
/// operator suffix is an equality test on the whole name.
fn split_operator(name: &str) -> (&str, Comparison) {
    if let Some((column, suffix)) = name.rsplit_once('.')
        && let Some(cmp) = Comparison::parse(suffix)
    {
        return (column, cmp);
    }
    (name, Comparison::Eq)
}

/// Write `children` joined by `op` (`AND` / `OR`).
pub(super) fn write_group(w: &mut SqlWriter<'_>, children: &[Node], op: &str) -> SqlResult<()> {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            w.push(" ").push(op).push(" ");
        }
        write_condition(w, child)?;
    }
    Ok(())
}

fn write_condition(w: &mut SqlWriter<'_>, node: &Node) -> SqlResult<()> {
    let (prefix, op) = match node.name.as_str() {
        "and" => ("(", "AND"),
        "or" => ("(", "OR"),
        "not" => ("NOT (", "AND"),
        _ => return write_leaf(w, node),
    };
    if node.children.is_empty() {
        return Err(SqlError::syntax(format!("empty [{}] group", node.name)));
    }
    w.push(prefix);
    write_group(w, &node.children, op)?;
    w.push(")");
    Ok(())
}

fn write_leaf(w: &mut SqlWriter<'_>, node: &Node) -> SqlResult<()> {
    let (column, cmp) = split_operator(&node.name);
    let column = Ident::parse(column)?;

    if cmp != Comparison::In && !node.children.is_empty() {
        return Err(SqlError::syntax(format!(
            "condition [{}] cannot have children",
            node.name
        )));
    }

    match cmp {
        Comparison::Null => {
            let is_null = node.value.as_bool().ok_or_else(|| {
                SqlError::syntax(format!("[{}] must be true or false", node.name))
            })?;
            w.push_ident(&column)
                .push(if is_null { " IS NULL" } else { " IS NOT NULL" });
        }
        Comparison::In => {
            if node.children.is_empty() {
                // Empty IN list matches nothing.
                w.push("1=0");
                return Ok(());
            }
            w.push_ident(&column).push(" IN (");
            for (i, item) in node.children.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push_bind(item.value.clone());
            }
            w.push(")");
        }
        _ => {
            w.push_ident(&column)
                .push(cmp.operator())
                .push_bind(node.value.clone());
        }
    }
    Ok(())
}
