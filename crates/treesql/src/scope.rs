//! Named connection and transaction scopes.
//!
//! A [`Context`] is a stack of named frames. Operations look their
//! connection (and transaction, if any) up by name; the innermost frame with
//! that name wins. Frames are pushed and popped strictly in nesting order by
//! [`Context::with_connection`] and [`Context::transaction`], so a scope can
//! never outlive the work it wraps.
//!
//! # Example
//!
//! ```ignore
//! let mut ctx = Context::new();
//! ctx.with_connection("pgsql.connect", &client, async |ctx| {
//!     ctx.transaction("pgsql.transaction", &client, async |ctx| {
//!         engine.invoke(ctx, &mut debit, None).await?;
//!         engine.invoke(ctx, &mut credit, None).await
//!     })
//!     .await
//! })
//! .await?;
//! ```

use crate::connection::Connection;
use crate::error::SqlResult;

/// Where a statement runs: a connection and the transaction it joins, if any.
pub struct Target<'a, C: Connection> {
    pub connection: &'a C,
    pub transaction: Option<&'a C::Transaction>,
}

impl<C: Connection> Clone for Target<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Connection> Copy for Target<'_, C> {}

impl<'a, C: Connection> Target<'a, C> {
    /// Auto-commit execution on `connection`.
    pub fn autocommit(connection: &'a C) -> Self {
        Self {
            connection,
            transaction: None,
        }
    }
}

struct Frame<'c, C: Connection> {
    name: String,
    connection: &'c C,
    transaction: Option<C::Transaction>,
}

/// Stack of named scopes for one logical execution.
pub struct Context<'c, C: Connection> {
    frames: Vec<Frame<'c, C>>,
}

impl<C: Connection> Default for Context<'_, C> {
    fn default() -> Self {
        Self { frames: Vec::new() }
    }
}

impl<'c, C: Connection> Context<'c, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.frames.iter().any(|f| f.name == name)
    }

    /// Innermost frame registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Target<'_, C>> {
        self.frames.iter().rev().find(|f| f.name == name).map(|f| Target {
            connection: f.connection,
            transaction: f.transaction.as_ref(),
        })
    }

    /// Connection of the innermost frame registered under `name`.
    pub fn connection(&self, name: &str) -> Option<&'c C> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.name == name)
            .map(|f| f.connection)
    }

    /// Run `work` with `connection` registered under `name`, without a transaction.
    pub async fn with_connection<T>(
        &mut self,
        name: &str,
        connection: &'c C,
        work: impl AsyncFnOnce(&mut Self) -> SqlResult<T>,
    ) -> SqlResult<T> {
        self.frames.push(Frame {
            name: name.to_string(),
            connection,
            transaction: None,
        });
        let outcome = work(self).await;
        self.frames.pop();
        outcome
    }

    /// Run `work` inside a transaction registered under `name`.
    ///
    /// Commits when `work` succeeds and rolls back when it fails; the error
    /// from `work` is returned unchanged even if the rollback itself fails.
    /// When a transaction with the same name is already active on the same
    /// connection, the new scope is a savepoint inside it.
    pub async fn transaction<T>(
        &mut self,
        name: &str,
        connection: &'c C,
        work: impl AsyncFnOnce(&mut Self) -> SqlResult<T>,
    ) -> SqlResult<T> {
        let parent = self
            .lookup(name)
            .filter(|t| std::ptr::eq(t.connection, connection))
            .and_then(|t| t.transaction);
        let savepoint = parent.is_some();
        let tx = connection.begin(parent).await?;
        tracing::debug!(target: "treesql.scope", scope = name, savepoint, "begin");

        self.frames.push(Frame {
            name: name.to_string(),
            connection,
            transaction: Some(tx),
        });
        let outcome = work(self).await;
        let Some(tx) = self.frames.pop().and_then(|f| f.transaction) else {
            return outcome;
        };

        match outcome {
            Ok(value) => {
                connection.commit(tx).await?;
                tracing::debug!(target: "treesql.scope", scope = name, savepoint, "commit");
                Ok(value)
            }
            Err(error) => {
                match connection.rollback(tx).await {
                    Ok(()) => tracing::debug!(
                        target: "treesql.scope",
                        scope = name,
                        savepoint,
                        error = %error,
                        "rollback"
                    ),
                    Err(rollback_error) => tracing::warn!(
                        target: "treesql.scope",
                        scope = name,
                        savepoint,
                        error = %error,
                        rollback_error = %rollback_error,
                        "rollback failed"
                    ),
                }
                Err(error)
            }
        }
    }
}
