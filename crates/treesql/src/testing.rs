//! Scripted in-memory connection for unit tests.

use crate::connection::{Command, Connection, Cursor};
use crate::error::{SqlError, SqlResult};
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) type ScriptedRow = Vec<(String, Value)>;

/// Everything the connection was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Begin { savepoint: bool },
    Commit { savepoint: bool },
    Rollback { savepoint: bool },
    Execute { text: String, params: Vec<Value>, in_tx: bool },
    Open { text: String, params: Vec<Value>, in_tx: bool },
}

/// Canned answer for the next `execute` or `open`.
pub(crate) enum Reply {
    Affected(u64),
    Rows(Vec<Vec<ScriptedRow>>),
    Fail(&'static str),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
pub(crate) struct ScriptedConnection {
    state: Mutex<State>,
    cancel_after_rows: Option<(usize, CancellationToken)>,
    fail_rollback: bool,
    reject_batch_params: bool,
    delay: Option<Duration>,
}

impl ScriptedConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, reply: Reply) -> Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    /// Single result set.
    pub(crate) fn rows(self, rows: Vec<ScriptedRow>) -> Self {
        self.reply(Reply::Rows(vec![rows]))
    }

    /// Cancel `token` once the cursor has handed out `n` rows.
    pub(crate) fn cancel_after_rows(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after_rows = Some((n, token));
        self
    }

    pub(crate) fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    /// Refuse parameters on commands flagged `multiple_result_sets`.
    pub(crate) fn reject_batch_params(mut self) -> Self {
        self.reject_batch_params = true;
        self
    }

    /// Sleep this long before answering `execute` or `open`.
    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Statement texts sent to the backend, in order.
    pub(crate) fn statements(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute { text, .. } | Call::Open { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Record `call`; statements also take the next scripted reply.
    fn record(&self, call: Call) -> Option<Reply> {
        let mut state = self.state.lock().unwrap();
        let is_statement = matches!(call, Call::Execute { .. } | Call::Open { .. });
        state.calls.push(call);
        if is_statement {
            state.replies.pop_front()
        } else {
            None
        }
    }

    fn statement_call(cmd: &Command, tx: Option<&ScriptedTx>, open: bool) -> Call {
        let text = cmd.text.clone();
        let params = cmd.params.iter().map(|(_, v)| v.clone()).collect();
        let in_tx = tx.is_some();
        if open {
            Call::Open { text, params, in_tx }
        } else {
            Call::Execute { text, params, in_tx }
        }
    }
}

/// Transaction handle; nested handles are savepoints.
#[derive(Debug)]
pub(crate) struct ScriptedTx {
    savepoint: bool,
}

pub(crate) struct ScriptedCursor {
    sets: VecDeque<VecDeque<ScriptedRow>>,
    delivered: usize,
    cancel_after_rows: Option<(usize, CancellationToken)>,
}

impl Cursor for ScriptedCursor {
    type Row = ScriptedRow;

    async fn next_row(&mut self) -> SqlResult<Option<ScriptedRow>> {
        tokio::task::yield_now().await;
        let row = self.sets.front_mut().and_then(VecDeque::pop_front);
        if row.is_some() {
            self.delivered += 1;
            if let Some((n, token)) = &self.cancel_after_rows
                && *n == self.delivered
            {
                token.cancel();
            }
        }
        Ok(row)
    }

    async fn next_result_set(&mut self) -> SqlResult<bool> {
        self.sets.pop_front();
        Ok(!self.sets.is_empty())
    }

    fn has_result_set(&self) -> bool {
        !self.sets.is_empty()
    }
}

impl Connection for ScriptedConnection {
    type Transaction = ScriptedTx;
    type Row = ScriptedRow;
    type Cursor = ScriptedCursor;

    async fn begin(&self, parent: Option<&ScriptedTx>) -> SqlResult<ScriptedTx> {
        let savepoint = parent.is_some();
        self.record(Call::Begin { savepoint });
        Ok(ScriptedTx { savepoint })
    }

    async fn commit(&self, tx: ScriptedTx) -> SqlResult<()> {
        self.record(Call::Commit {
            savepoint: tx.savepoint,
        });
        Ok(())
    }

    async fn rollback(&self, tx: ScriptedTx) -> SqlResult<()> {
        self.record(Call::Rollback {
            savepoint: tx.savepoint,
        });
        if self.fail_rollback {
            return Err(SqlError::execution("connection lost during rollback"));
        }
        Ok(())
    }

    async fn execute(&self, cmd: &Command, tx: Option<&ScriptedTx>) -> SqlResult<u64> {
        let reply = self.record(Self::statement_call(cmd, tx, false));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match reply {
            None => Ok(1),
            Some(Reply::Affected(n)) => Ok(n),
            Some(Reply::Rows(_)) => Ok(0),
            Some(Reply::Fail(message)) => Err(SqlError::execution(message)),
        }
    }

    async fn open(&self, cmd: &Command, tx: Option<&ScriptedTx>) -> SqlResult<ScriptedCursor> {
        let reply = self.record(Self::statement_call(cmd, tx, true));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let sets = match reply {
            Some(Reply::Rows(sets)) => sets.into_iter().map(VecDeque::from).collect(),
            Some(Reply::Fail(message)) => return Err(SqlError::execution(message)),
            None | Some(Reply::Affected(_)) => VecDeque::new(),
        };
        Ok(ScriptedCursor {
            sets,
            delivered: 0,
            cancel_after_rows: self.cancel_after_rows.clone(),
        })
    }

    fn check_command(&self, cmd: &Command) -> SqlResult<()> {
        if self.reject_batch_params && cmd.multiple_result_sets && !cmd.params.is_empty() {
            return Err(SqlError::syntax("batches cannot take parameters"));
        }
        Ok(())
    }

    fn convert_row(row: &ScriptedRow) -> SqlResult<Vec<(String, Value)>> {
        Ok(row.clone())
    }
}

/// `[("id", 1), ("name", "a")]`-style row literal.
pub(crate) fn row<const N: usize>(columns: [(&str, Value); N]) -> ScriptedRow {
    columns
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
