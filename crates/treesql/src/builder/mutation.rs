use super::{SqlWriter, check_fragments, table, write_where};
use crate::builder::CompiledStatement;
use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::ident::Ident;
use crate::node::Node;

/// Column assignments from the `values` fragment, validated.
fn assignments<'a>(root: &'a Node) -> SqlResult<Vec<(Ident, &'a Node)>> {
    let values = root.single("values")?;
    let assignments = values
        .map(|v| v.children.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|col| Ok((Ident::parse(&col.name)?, col)))
        .collect::<SqlResult<Vec<_>>>()?;
    if assignments.is_empty() {
        return Err(SqlError::syntax(format!(
            "[{}] requires at least one column in [values]",
            root.name
        )));
    }
    Ok(assignments)
}

/// `INSERT INTO "t" ("a", "b") VALUES ($1, $2)`
pub fn compile_create(dialect: &Dialect, root: &Node) -> SqlResult<CompiledStatement> {
    check_fragments(root, &["values"])?;
    let table = table(root)?;
    let columns = assignments(root)?;

    let mut w = SqlWriter::new(dialect);
    w.push("INSERT INTO ").push_ident(&table).push(" (");
    for (i, (col, _)) in columns.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push_ident(col);
    }
    w.push(") VALUES (");
    for (i, (_, node)) in columns.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push_bind(node.value.clone());
    }
    w.push(")");
    Ok(w.finish(None))
}

/// `UPDATE "t" SET "a" = $1, "b" = $2 [WHERE ...]`
pub fn compile_update(dialect: &Dialect, root: &Node) -> SqlResult<CompiledStatement> {
    check_fragments(root, &["values", "where"])?;
    let table = table(root)?;
    let columns = assignments(root)?;

    let mut w = SqlWriter::new(dialect);
    w.push("UPDATE ").push_ident(&table).push(" SET ");
    for (i, (col, node)) in columns.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push_ident(col).push(" = ").push_bind(node.value.clone());
    }
    write_where(&mut w, root)?;
    Ok(w.finish(None))
}

/// `DELETE FROM "t" WHERE ...`
///
/// A delete without conditions is rejected.
pub fn compile_delete(dialect: &Dialect, root: &Node) -> SqlResult<CompiledStatement> {
    check_fragments(root, &["where"])?;
    let table = table(root)?;

    let mut w = SqlWriter::new(dialect);
    w.push("DELETE FROM ").push_ident(&table);
    if !write_where(&mut w, root)? {
        return Err(SqlError::syntax(format!(
            "[{}] requires a non-empty [where] node",
            root.name
        )));
    }
    Ok(w.finish(None))
}
