//! Backend seam: connections, transactions and result cursors.
//!
//! The pipeline never talks to a driver directly. It talks to a
//! [`Connection`], which opens [`Cursor`]s over one or more result sets and
//! hands out transaction handles. [`tokio_postgres::Client`] implements it in
//! [`crate::postgres`]; tests use a scripted implementation.
//!
//! Connections are borrowed (an external pool owns them). Transaction handles
//! are owned by the scope that began them and are only ever passed back to
//! [`Connection::commit`] or [`Connection::rollback`] by that scope.

use crate::builder::CompiledStatement;
use crate::error::SqlResult;
use crate::node::Node;
use crate::value::Value;
use std::future::Future;

/// Converts one backend-native row into `(column label, canonical scalar)` pairs.
pub type RowConverter<R> = fn(&R) -> SqlResult<Vec<(String, Value)>>;

/// A statement bound for execution: text plus parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub text: String,
    pub params: Vec<(String, Value)>,
    /// The text may hold several statements, each producing its own result set.
    pub multiple_result_sets: bool,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
            multiple_result_sets: false,
        }
    }

    /// Read a statement node: value = SQL text, children = `name: value` parameters.
    ///
    /// A null-valued child binds SQL `NULL`; a parameter that is not a child is
    /// simply not bound.
    pub fn from_node(node: &Node) -> SqlResult<Self> {
        let text = node.get_str()?.to_string();
        let params = node
            .children
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        Ok(Self {
            text,
            params,
            multiple_result_sets: false,
        })
    }

    /// Bind one more parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }
}

impl From<CompiledStatement> for Command {
    fn from(stmt: CompiledStatement) -> Self {
        Self {
            text: stmt.text,
            params: stmt.parameters,
            multiple_result_sets: false,
        }
    }
}

/// Forward-only reader over one or more result sets.
///
/// `next_row` and `next_result_set` are suspension points.
pub trait Cursor: Send {
    type Row: Send;

    /// Next row of the current result set, `None` when it is exhausted.
    fn next_row(&mut self) -> impl Future<Output = SqlResult<Option<Self::Row>>> + Send;

    /// Advance to the next result set, skipping any unread rows of the
    /// current one. Returns `false` when no result sets remain.
    fn next_result_set(&mut self) -> impl Future<Output = SqlResult<bool>> + Send;

    /// Whether the cursor is positioned on a result set. `false` for a batch
    /// whose statements returned no rows at all.
    fn has_result_set(&self) -> bool;
}

/// A live backend connection.
pub trait Connection: Send + Sync {
    /// Transaction (or savepoint) handle owned by a transaction scope.
    type Transaction: Send + Sync;
    type Row: Send;
    type Cursor: Cursor<Row = Self::Row>;

    /// Begin a transaction, or a savepoint inside `parent` when one is given.
    fn begin(
        &self,
        parent: Option<&Self::Transaction>,
    ) -> impl Future<Output = SqlResult<Self::Transaction>> + Send;

    fn commit(&self, tx: Self::Transaction) -> impl Future<Output = SqlResult<()>> + Send;

    fn rollback(&self, tx: Self::Transaction) -> impl Future<Output = SqlResult<()>> + Send;

    /// Run a statement and return the number of affected rows.
    fn execute(
        &self,
        cmd: &Command,
        tx: Option<&Self::Transaction>,
    ) -> impl Future<Output = SqlResult<u64>> + Send;

    /// Run a statement and open a cursor over its result sets.
    fn open(
        &self,
        cmd: &Command,
        tx: Option<&Self::Transaction>,
    ) -> impl Future<Output = SqlResult<Self::Cursor>> + Send;

    /// Reject a command this backend cannot run, before the request node is
    /// touched or anything is sent.
    fn check_command(&self, cmd: &Command) -> SqlResult<()> {
        let _ = cmd;
        Ok(())
    }

    /// Default conversion from native rows to canonical scalars.
    fn convert_row(row: &Self::Row) -> SqlResult<Vec<(String, Value)>>;
}
