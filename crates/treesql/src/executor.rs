//! Statement execution: bind, clear, run a strategy.
//!
//! [`execute`] takes an already bound [`Command`], clears the request node
//! (so results replace the request) and hands a [`LiveCommand`] to a
//! [`Strategy`]. Strategies decide what to do with the command: run it as a
//! non-query, read a scalar, or materialize rows.
//!
//! Every backend round trip goes through [`Control::suspend`], which is where
//! cancellation and the statement timeout are honoured.

use crate::config::{EngineConfig, truncate_sql_bytes};
use crate::connection::{Command, Connection, Cursor, RowConverter};
use crate::error::{SqlError, SqlResult};
use crate::materialize::materialize;
use crate::node::Node;
use crate::scope::Target;
use crate::value::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Per-invocation execution settings.
#[derive(Debug, Clone, Copy)]
pub struct Control<'a> {
    /// Operation name, used in log events.
    pub op: &'a str,
    pub cancel: Option<&'a CancellationToken>,
    pub config: &'a EngineConfig,
}

impl<'a> Control<'a> {
    pub fn new(op: &'a str, config: &'a EngineConfig) -> Self {
        Self {
            op,
            cancel: None,
            config,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<&'a CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Await one backend round trip.
    ///
    /// A cancelled token wins over a ready result. `timed` applies the
    /// configured statement timeout.
    pub(crate) async fn suspend<T>(
        &self,
        fut: impl Future<Output = SqlResult<T>>,
        timed: bool,
    ) -> SqlResult<T> {
        let timeout = if timed {
            self.config.statement_timeout
        } else {
            None
        };
        let fut = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(SqlError::Timeout(limit)),
                },
                None => fut.await,
            }
        };

        match self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(SqlError::Cancelled),
                result = fut => result,
            },
            None => fut.await,
        }
    }

    fn log(&self, command: &Command, elapsed: Duration, outcome: &SqlResult<u64>) {
        let sql = match (self.config.log_sql, self.config.max_logged_sql_len) {
            (false, _) => "",
            (true, Some(max)) => truncate_sql_bytes(&command.text, max),
            (true, None) => command.text.as_str(),
        };
        let param_count = command.params.len();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let slow = self
            .config
            .slow_statement_threshold
            .is_some_and(|threshold| elapsed >= threshold);

        match outcome {
            Ok(rows) if slow => tracing::warn!(
                target: "treesql.sql",
                op = self.op,
                param_count,
                rows,
                elapsed_ms,
                sql,
                "slow statement"
            ),
            Ok(rows) => tracing::debug!(
                target: "treesql.sql",
                op = self.op,
                param_count,
                rows,
                elapsed_ms,
                sql,
                "statement executed"
            ),
            Err(SqlError::Cancelled) => tracing::debug!(
                target: "treesql.sql",
                op = self.op,
                elapsed_ms,
                sql,
                "statement cancelled"
            ),
            Err(error) => tracing::debug!(
                target: "treesql.sql",
                op = self.op,
                param_count,
                elapsed_ms,
                sql,
                error = %error,
                "statement failed"
            ),
        }
    }
}

/// A bound command on its connection, handed to a [`Strategy`].
pub struct LiveCommand<'a, C: Connection> {
    target: Target<'a, C>,
    command: Command,
    max_rows: Option<u64>,
    control: &'a Control<'a>,
}

impl<'a, C: Connection> LiveCommand<'a, C> {
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Row cap for materialization, if the statement carries one.
    pub fn max_rows(&self) -> Option<u64> {
        self.max_rows
    }

    /// Run as a non-query and return the affected row count.
    pub async fn execute_non_query(&self) -> SqlResult<u64> {
        let fut = self
            .target
            .connection
            .execute(&self.command, self.target.transaction);
        self.control.suspend(fut, true).await
    }

    /// Run and open a reader over the result sets.
    pub async fn open_reader(&self) -> SqlResult<Reader<'a, C>> {
        let fut = self
            .target
            .connection
            .open(&self.command, self.target.transaction);
        let cursor = self.control.suspend(fut, true).await?;
        Ok(Reader {
            cursor,
            control: self.control,
        })
    }
}

/// A cursor whose every fetch is a cancellable suspension point.
pub struct Reader<'a, C: Connection> {
    cursor: C::Cursor,
    control: &'a Control<'a>,
}

impl<C: Connection> Reader<'_, C> {
    pub async fn read(&mut self) -> SqlResult<Option<C::Row>> {
        self.control.suspend(self.cursor.next_row(), false).await
    }

    pub async fn next_result(&mut self) -> SqlResult<bool> {
        self.control
            .suspend(self.cursor.next_result_set(), false)
            .await
    }

    pub fn has_result_set(&self) -> bool {
        self.cursor.has_result_set()
    }
}

/// What to do with a live command. Returns the affected or returned row count.
pub trait Strategy<C: Connection> {
    fn run(
        self,
        live: &LiveCommand<'_, C>,
        dest: &mut Node,
    ) -> impl Future<Output = SqlResult<u64>> + Send;
}

/// Non-query: the node value becomes the affected row count.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonQuery;

impl<C: Connection> Strategy<C> for NonQuery {
    async fn run(self, live: &LiveCommand<'_, C>, dest: &mut Node) -> SqlResult<u64> {
        let affected = live.execute_non_query().await?;
        dest.value = Value::Int(i64::try_from(affected).unwrap_or(i64::MAX));
        Ok(affected)
    }
}

/// Scalar: the node value becomes the first column of the first row, or null.
pub struct Scalar<R> {
    pub convert: RowConverter<R>,
}

impl<C: Connection> Strategy<C> for Scalar<C::Row> {
    async fn run(self, live: &LiveCommand<'_, C>, dest: &mut Node) -> SqlResult<u64> {
        let mut reader = live.open_reader().await?;
        let Some(row) = reader.read().await? else {
            return Ok(0);
        };
        dest.value = (self.convert)(&row)?
            .into_iter()
            .next()
            .map(|(_, value)| value)
            .unwrap_or_default();
        Ok(1)
    }
}

/// Rows: each row becomes an unnamed child node of `column: value` nodes.
pub struct Rows<R> {
    pub convert: RowConverter<R>,
    /// Wrap each result set in its own unnamed child node.
    pub multiple_result_sets: bool,
}

impl<C: Connection> Strategy<C> for Rows<C::Row> {
    async fn run(self, live: &LiveCommand<'_, C>, dest: &mut Node) -> SqlResult<u64> {
        let mut reader = live.open_reader().await?;
        materialize(
            &mut reader,
            dest,
            self.multiple_result_sets,
            live.max_rows(),
            self.convert,
        )
        .await
    }
}

/// Clear `node`, then run `command` on `target` through `strategy`.
///
/// A command the backend rejects up front fails with the node untouched.
/// Any later failure leaves the node empty; partial rows are never kept. The
/// command and any cursor are released on every path.
pub async fn execute<C, S>(
    node: &mut Node,
    command: Command,
    target: Target<'_, C>,
    max_rows: Option<u64>,
    control: &Control<'_>,
    strategy: S,
) -> SqlResult<()>
where
    C: Connection,
    S: Strategy<C>,
{
    target.connection.check_command(&command)?;
    node.clear();
    let live = LiveCommand {
        target,
        command,
        max_rows,
        control,
    };

    let started = Instant::now();
    let outcome = strategy.run(&live, node).await;
    control.log(&live.command, started.elapsed(), &outcome);

    match outcome {
        Ok(_) => Ok(()),
        Err(err) => {
            node.clear();
            Err(err)
        }
    }
}
