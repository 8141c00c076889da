//! PostgreSQL backend: [`Connection`] for [`tokio_postgres::Client`].
//!
//! Transactions are session state on the client (`BEGIN` / `COMMIT` /
//! `ROLLBACK`), nested scopes become savepoints. Statements run with the
//! extended protocol and stream their rows, except commands flagged
//! `multiple_result_sets`, which run through the simple query protocol so
//! that one text may hold several statements. Rows from the simple protocol
//! carry text values only.

use crate::connection::{Command, Connection, Cursor};
use crate::error::{SqlError, SqlResult};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures_util::StreamExt;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Row, RowStream, SimpleQueryMessage, SimpleQueryRow};
use uuid::Uuid;

/// Global counter for savepoint naming.
static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("treesql_sp_{n}")
}

/// An open transaction, or a savepoint when nested.
#[derive(Debug)]
pub struct PgTransaction {
    savepoint: Option<String>,
    finished: bool,
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                target: "treesql.scope",
                savepoint = self.savepoint.as_deref(),
                "transaction dropped without commit or rollback"
            );
        }
    }
}

/// A row from either protocol.
#[derive(Debug)]
pub enum PgRow {
    Typed(Row),
    Text(SimpleQueryRow),
}

/// Cursor over a streamed statement or a buffered multi-statement batch.
pub enum PgCursor {
    Stream(Pin<Box<RowStream>>),
    Buffered(VecDeque<VecDeque<PgRow>>),
}

impl Cursor for PgCursor {
    type Row = PgRow;

    async fn next_row(&mut self) -> SqlResult<Option<PgRow>> {
        match self {
            PgCursor::Stream(stream) => match stream.next().await {
                Some(row) => Ok(Some(PgRow::Typed(row?))),
                None => Ok(None),
            },
            PgCursor::Buffered(sets) => Ok(sets.front_mut().and_then(VecDeque::pop_front)),
        }
    }

    async fn next_result_set(&mut self) -> SqlResult<bool> {
        match self {
            // The extended protocol runs exactly one statement.
            PgCursor::Stream(_) => Ok(false),
            PgCursor::Buffered(sets) => {
                sets.pop_front();
                Ok(!sets.is_empty())
            }
        }
    }

    fn has_result_set(&self) -> bool {
        match self {
            PgCursor::Stream(_) => true,
            PgCursor::Buffered(sets) => !sets.is_empty(),
        }
    }
}

/// Split simple-protocol messages into result sets.
///
/// A set starts at a row description and ends at its command completion;
/// statements that return no rows (no description) produce no set.
fn result_sets(messages: Vec<SimpleQueryMessage>) -> VecDeque<VecDeque<PgRow>> {
    let mut sets = VecDeque::new();
    let mut current: Option<VecDeque<PgRow>> = None;
    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(_) => {
                if let Some(set) = current.replace(VecDeque::new()) {
                    sets.push_back(set);
                }
            }
            SimpleQueryMessage::Row(row) => current
                .get_or_insert_with(VecDeque::new)
                .push_back(PgRow::Text(row)),
            SimpleQueryMessage::CommandComplete(_) => {
                if let Some(set) = current.take() {
                    sets.push_back(set);
                }
            }
            _ => {}
        }
    }
    if let Some(set) = current {
        sets.push_back(set);
    }
    sets
}

fn bind(cmd: &Command) -> Vec<&(dyn ToSql + Sync)> {
    cmd.params
        .iter()
        .map(|(_, value)| value as &(dyn ToSql + Sync))
        .collect()
}

impl Connection for tokio_postgres::Client {
    type Transaction = PgTransaction;
    type Row = PgRow;
    type Cursor = PgCursor;

    async fn begin(&self, parent: Option<&PgTransaction>) -> SqlResult<PgTransaction> {
        let savepoint = match parent {
            None => {
                self.batch_execute("BEGIN").await?;
                None
            }
            Some(_) => {
                let name = next_savepoint_name();
                self.batch_execute(&format!("SAVEPOINT {name}")).await?;
                Some(name)
            }
        };
        Ok(PgTransaction {
            savepoint,
            finished: false,
        })
    }

    async fn commit(&self, mut tx: PgTransaction) -> SqlResult<()> {
        tx.finished = true;
        match &tx.savepoint {
            None => self.batch_execute("COMMIT").await?,
            Some(name) => self.batch_execute(&format!("RELEASE SAVEPOINT {name}")).await?,
        }
        Ok(())
    }

    async fn rollback(&self, mut tx: PgTransaction) -> SqlResult<()> {
        tx.finished = true;
        match &tx.savepoint {
            None => self.batch_execute("ROLLBACK").await?,
            Some(name) => {
                self.batch_execute(&format!("ROLLBACK TO SAVEPOINT {name}"))
                    .await?
            }
        }
        Ok(())
    }

    async fn execute(&self, cmd: &Command, _tx: Option<&PgTransaction>) -> SqlResult<u64> {
        let params = bind(cmd);
        Ok(tokio_postgres::Client::execute(self, cmd.text.as_str(), &params).await?)
    }

    async fn open(&self, cmd: &Command, _tx: Option<&PgTransaction>) -> SqlResult<PgCursor> {
        if cmd.multiple_result_sets {
            check_batch(cmd)?;
            let messages = self.simple_query(&cmd.text).await?;
            return Ok(PgCursor::Buffered(result_sets(messages)));
        }

        let params = bind(cmd);
        let stream =
            tokio_postgres::Client::query_raw(self, cmd.text.as_str(), params.iter().copied())
                .await?;
        Ok(PgCursor::Stream(Box::pin(stream)))
    }

    fn check_command(&self, cmd: &Command) -> SqlResult<()> {
        check_batch(cmd)
    }

    fn convert_row(row: &PgRow) -> SqlResult<Vec<(String, Value)>> {
        match row {
            PgRow::Typed(row) => (0..row.len())
                .map(|idx| Ok((row.columns()[idx].name().to_string(), typed_value(row, idx)?)))
                .collect(),
            PgRow::Text(row) => Ok(row
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, column)| (column.name().to_string(), row.get(idx).into()))
                .collect()),
        }
    }
}

/// Multi-statement texts run through the simple protocol, which has no
/// parameters.
fn check_batch(cmd: &Command) -> SqlResult<()> {
    if cmd.multiple_result_sets && !cmd.params.is_empty() {
        return Err(SqlError::syntax(
            "statements returning multiple result sets cannot take parameters",
        ));
    }
    Ok(())
}

/// Convert one column of an extended-protocol row into a canonical scalar.
pub fn typed_value(row: &Row, idx: usize) -> SqlResult<Value> {
    let column = &row.columns()[idx];
    let ty = column.type_();

    macro_rules! get {
        ($t:ty) => {
            row.try_get::<_, Option<$t>>(idx)
                .map(Value::from)
                .map_err(|e| SqlError::decode(column.name(), e.to_string()))
        };
    }

    if *ty == Type::BOOL {
        get!(bool)
    } else if *ty == Type::INT2 {
        get!(i16)
    } else if *ty == Type::INT4 {
        get!(i32)
    } else if *ty == Type::INT8 {
        get!(i64)
    } else if *ty == Type::OID {
        get!(u32)
    } else if *ty == Type::FLOAT4 {
        get!(f32)
    } else if *ty == Type::FLOAT8 {
        get!(f64)
    } else if *ty == Type::NUMERIC {
        get!(Decimal)
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty) {
        get!(String)
    } else if *ty == Type::BYTEA {
        get!(Vec<u8>)
    } else if *ty == Type::DATE {
        get!(NaiveDate)
    } else if *ty == Type::TIMESTAMP {
        get!(NaiveDateTime)
    } else if *ty == Type::TIMESTAMPTZ {
        get!(DateTime<Utc>)
    } else if *ty == Type::UUID {
        get!(Uuid)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        get!(serde_json::Value)
    } else {
        Err(SqlError::decode(
            column.name(),
            format!("unsupported column type {ty}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savepoint_names_are_unique() {
        let a = next_savepoint_name();
        let b = next_savepoint_name();
        assert_ne!(a, b);
        assert!(a.starts_with("treesql_sp_"));
    }

    #[test]
    fn parameterized_batches_are_rejected() {
        let mut cmd = Command::new("SELECT $1; SELECT 2").bind("$1", 1);
        assert!(check_batch(&cmd).is_ok());

        cmd.multiple_result_sets = true;
        assert!(check_batch(&cmd).unwrap_err().is_syntax());

        cmd.params.clear();
        assert!(check_batch(&cmd).is_ok());
    }

    #[test]
    fn no_messages_no_result_sets() {
        assert!(result_sets(Vec::new()).is_empty());
    }
}
