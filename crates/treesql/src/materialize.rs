//! Result materialization: rows from a reader into child nodes.

use crate::connection::{Connection, RowConverter};
use crate::error::SqlResult;
use crate::executor::Reader;
use crate::node::Node;

/// Append the reader's rows to `dest` and return how many were appended.
///
/// Each row becomes an unnamed node with one `column: value` child per
/// column, in column order. With `multiple_result_sets`, every result set
/// gets its own unnamed group node (possibly empty) and rows go there; a
/// batch that returned no result sets adds nothing.
///
/// `max_rows` caps each result set. The cap is checked before fetching, so
/// no row is read only to be discarded; unread rows are skipped when the
/// cursor advances to the next set.
pub async fn materialize<C: Connection>(
    reader: &mut Reader<'_, C>,
    dest: &mut Node,
    multiple_result_sets: bool,
    max_rows: Option<u64>,
    convert: RowConverter<C::Row>,
) -> SqlResult<u64> {
    let mut total = 0;
    if multiple_result_sets && !reader.has_result_set() {
        return Ok(total);
    }

    loop {
        let rows = read_result_set(reader, max_rows, convert).await?;
        total += rows.len() as u64;

        if !multiple_result_sets {
            dest.children.extend(rows);
            return Ok(total);
        }

        let mut group = Node::new("");
        group.children = rows;
        dest.push(group);
        if !reader.next_result().await? {
            return Ok(total);
        }
    }
}

async fn read_result_set<C: Connection>(
    reader: &mut Reader<'_, C>,
    max_rows: Option<u64>,
    convert: RowConverter<C::Row>,
) -> SqlResult<Vec<Node>> {
    let mut rows = Vec::new();
    while max_rows.is_none_or(|max| (rows.len() as u64) < max) {
        let Some(row) = reader.read().await? else {
            break;
        };
        let mut row_node = Node::new("");
        row_node.children = convert(&row)?
            .into_iter()
            .map(|(column, value)| Node::with_value(column, value))
            .collect();
        rows.push(row_node);
    }
    Ok(rows)
}
