use super::{SqlWriter, check_fragments, table, write_columns, write_joins, write_where};
use crate::builder::CompiledStatement;
use crate::dialect::{Dialect, Direction, OrderTerm, Pagination};
use crate::error::{SqlError, SqlResult};
use crate::ident::Ident;
use crate::node::Node;
use crate::value::Value;

/// Rows returned by a read that does not name a `limit`.
pub const DEFAULT_LIMIT: u64 = 25;

const READ_FRAGMENTS: &[&str] = &[
    "columns",
    "where",
    "join",
    "order",
    "offset",
    "limit",
    "multiple-result-sets",
];

/// Compile a read request into `SELECT ... FROM ... [JOIN] [WHERE] <tail>`.
///
/// The tail (ordering and pagination) is rendered by the dialect's tail
/// function. `max_rows` on the result is the effective limit.
pub fn compile_read(dialect: &Dialect, root: &Node) -> SqlResult<CompiledStatement> {
    check_fragments(root, READ_FRAGMENTS)?;
    let table = table(root)?;
    let pagination = pagination(root)?;

    let mut w = SqlWriter::new(dialect);
    w.push("SELECT ");
    write_columns(&mut w, root)?;
    w.push(" FROM ").push_ident(&table);
    write_joins(&mut w, root)?;
    write_where(&mut w, root)?;

    let quote = w.dialect().quote;
    let tail = w.dialect().tail;
    tail(&pagination, quote, w.text_mut());

    Ok(w.finish(Some(pagination.limit)))
}

/// Validate and collect `order`, `offset` and `limit`.
fn pagination(root: &Node) -> SqlResult<Pagination> {
    let offset = root.single("offset")?.map(Node::get_u64).transpose()?;
    let limit = root
        .single("limit")?
        .map(Node::get_u64)
        .transpose()?
        .unwrap_or(DEFAULT_LIMIT);

    let order = match root.single("order")? {
        None => Vec::new(),
        Some(node) => node
            .children
            .iter()
            .map(order_term)
            .collect::<SqlResult<Vec<_>>>()?,
    };

    Ok(Pagination {
        order,
        offset,
        limit,
    })
}

fn order_term(node: &Node) -> SqlResult<OrderTerm> {
    let direction = match &node.value {
        Value::Null => Direction::Asc,
        Value::Text(dir) if dir.eq_ignore_ascii_case("asc") => Direction::Asc,
        Value::Text(dir) if dir.eq_ignore_ascii_case("desc") => Direction::Desc,
        other => {
            return Err(SqlError::syntax(format!(
                "order direction for [{}] must be 'asc' or 'desc', got {other}",
                node.name
            )));
        }
    };
    Ok(OrderTerm {
        column: Ident::parse(&node.name)?,
        direction,
    })
}
