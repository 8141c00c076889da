//! Named operations over request trees.
//!
//! [`Engine`] serves `<dialect>.<op>` operations: raw `select`, `scalar` and
//! `execute`; builder-compiled `read`, `create`, `update` and `delete`; and
//! `transaction.create`, which evaluates its children inside a transaction
//! scope. Every operation mutates the request node in place: on success the
//! node holds the result, on failure after execution started it is empty.
//!
//! [`BlockingEngine`] runs the same pipeline to completion on an owned
//! runtime.

mod blocking;

#[cfg(test)]
mod tests;

pub use blocking::BlockingEngine;

use crate::builder::{self, CompiledStatement};
use crate::config::EngineConfig;
use crate::connection::{Command, Connection, RowConverter};
use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::executor::{Control, NonQuery, Rows, Scalar, execute};
use crate::node::Node;
use crate::scope::{Context, Target};
use tokio_util::sync::CancellationToken;

type Compile = fn(&Dialect, &Node) -> SqlResult<CompiledStatement>;

/// Operation addressed by a node name, without the dialect prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Scalar,
    Execute,
    Read,
    Create,
    Update,
    Delete,
    Transaction,
}

impl Operation {
    /// Resolve `pgsql.read`-style names for `dialect`.
    pub fn parse(dialect: &Dialect, name: &str) -> SqlResult<Self> {
        let op = name
            .strip_prefix(dialect.name)
            .and_then(|rest| rest.strip_prefix('.'))
            .ok_or_else(|| SqlError::UnknownOperation(name.to_string()))?;
        Ok(match op {
            "select" => Self::Select,
            "scalar" => Self::Scalar,
            "execute" => Self::Execute,
            "read" => Self::Read,
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "transaction.create" => Self::Transaction,
            _ => return Err(SqlError::UnknownOperation(name.to_string())),
        })
    }
}

/// Serves named operations for one dialect over connections of type `C`.
pub struct Engine<C: Connection> {
    config: EngineConfig,
    convert: RowConverter<C::Row>,
}

impl<C: Connection> Engine<C> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            convert: C::convert_row,
        }
    }

    /// Replace the backend's default row conversion.
    pub fn with_converter(mut self, convert: RowConverter<C::Row>) -> Self {
        self.convert = convert;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dialect(&self) -> &Dialect {
        &self.config.dialect
    }

    /// Register `connection` under the dialect's connect scope and run one operation.
    pub async fn run(
        &self,
        connection: &C,
        node: &mut Node,
        cancel: Option<&CancellationToken>,
    ) -> SqlResult<()> {
        let mut ctx = Context::new();
        let scope = self.dialect().connect_scope();
        ctx.with_connection(&scope, connection, async |ctx| {
            self.invoke(ctx, node, cancel).await
        })
        .await
    }

    /// Dispatch `node` by name.
    pub async fn invoke(
        &self,
        ctx: &mut Context<'_, C>,
        node: &mut Node,
        cancel: Option<&CancellationToken>,
    ) -> SqlResult<()> {
        match Operation::parse(self.dialect(), &node.name)? {
            Operation::Select => self.select(ctx, node, cancel).await,
            Operation::Scalar => self.scalar(ctx, node, cancel).await,
            Operation::Execute => self.execute(ctx, node, cancel).await,
            Operation::Read => self.read(ctx, node, cancel).await,
            Operation::Create => {
                self.mutate(ctx, node, cancel, builder::compile_create)
                    .await
            }
            Operation::Update => {
                self.mutate(ctx, node, cancel, builder::compile_update)
                    .await
            }
            Operation::Delete => {
                self.mutate(ctx, node, cancel, builder::compile_delete)
                    .await
            }
            Operation::Transaction => self.transaction(ctx, node, cancel).await,
        }
    }

    /// Raw SQL returning rows; optional `multiple-result-sets` flag.
    pub async fn select(
        &self,
        ctx: &Context<'_, C>,
        node: &mut Node,
        cancel: Option<&CancellationToken>,
    ) -> SqlResult<()> {
        let multiple_result_sets = match node.single("multiple-result-sets")? {
            Some(flag) => flag.get_bool()?,
            None => false,
        };
        let mut command = Command::from_node(node)?;
        command
            .params
            .retain(|(name, _)| name != "multiple-result-sets");
        command.multiple_result_sets = multiple_result_sets;

        let target = self.target(ctx)?;
        let op = node.name.clone();
        let control = Control::new(&op, &self.config).with_cancel(cancel);
        let strategy = Rows {
            convert: self.convert,
            multiple_result_sets,
        };
        execute(node, command, target, None, &control, strategy).await
    }

    /// Raw SQL; the value becomes the first column of the first row.
    pub async fn scalar(
        &self,
        ctx: &Context<'_, C>,
        node: &mut Node,
        cancel: Option<&CancellationToken>,
    ) -> SqlResult<()> {
        let command = Command::from_node(node)?;
        let target = self.target(ctx)?;
        let op = node.name.clone();
        let control = Control::new(&op, &self.config).with_cancel(cancel);
        let strategy = Scalar {
            convert: self.convert,
        };
        execute(node, command, target, None, &control, strategy).await
    }

    /// Raw SQL non-query; the value becomes the affected row count.
    pub async fn execute(
        &self,
        ctx: &Context<'_, C>,
        node: &mut Node,
        cancel: Option<&CancellationToken>,
    ) -> SqlResult<()> {
        let command = Command::from_node(node)?;
        let target = self.target(ctx)?;
        let op = node.name.clone();
        let control = Control::new(&op, &self.config).with_cancel(cancel);
        execute(node, command, target, None, &control, NonQuery).await
    }

    /// Builder-compiled read, capped at the compiled limit.
    pub async fn read(
        &self,
        ctx: &Context<'_, C>,
        node: &mut Node,
        cancel: Option<&CancellationToken>,
    ) -> SqlResult<()> {
        let stmt = builder::compile_read(self.dialect(), node)?;
        if builder::is_generate_only(node)? {
            stmt.write_into(node);
            return Ok(());
        }
        let multiple_result_sets = match node.single("multiple-result-sets")? {
            Some(flag) => flag.get_bool()?,
            None => false,
        };

        let target = self.target(ctx)?;
        let max_rows = stmt.max_rows;
        let op = node.name.clone();
        let control = Control::new(&op, &self.config).with_cancel(cancel);
        let strategy = Rows {
            convert: self.convert,
            multiple_result_sets,
        };
        execute(node, stmt.into(), target, max_rows, &control, strategy).await
    }

    /// Builder-compiled create, update or delete.
    async fn mutate(
        &self,
        ctx: &Context<'_, C>,
        node: &mut Node,
        cancel: Option<&CancellationToken>,
        compile: Compile,
    ) -> SqlResult<()> {
        let stmt = compile(self.dialect(), node)?;
        if builder::is_generate_only(node)? {
            stmt.write_into(node);
            return Ok(());
        }

        let target = self.target(ctx)?;
        let op = node.name.clone();
        let control = Control::new(&op, &self.config).with_cancel(cancel);
        execute(node, stmt.into(), target, None, &control, NonQuery).await
    }

    /// Evaluate every child as an operation inside one transaction scope.
    ///
    /// Commits when all children succeed; the first failure rolls back and
    /// is returned unchanged. Nested inside an active transaction of the
    /// same dialect, the scope is a savepoint.
    pub async fn transaction(
        &self,
        ctx: &mut Context<'_, C>,
        node: &mut Node,
        cancel: Option<&CancellationToken>,
    ) -> SqlResult<()> {
        let scope = self.dialect().transaction_scope();
        let connect = self.dialect().connect_scope();
        let connection = ctx
            .connection(&scope)
            .or_else(|| ctx.connection(&connect))
            .ok_or_else(|| no_connection(&connect))?;

        ctx.transaction(&scope, connection, async |ctx| {
            for child in node.children.iter_mut() {
                Box::pin(self.invoke(ctx, child, cancel)).await?;
            }
            Ok(())
        })
        .await
    }

    /// Where statements run: the innermost transaction of this dialect, or
    /// its connection in auto-commit mode.
    fn target<'a>(&self, ctx: &'a Context<'_, C>) -> SqlResult<Target<'a, C>> {
        if let Some(target) = ctx.lookup(&self.dialect().transaction_scope()) {
            return Ok(target);
        }
        let connect = self.dialect().connect_scope();
        ctx.lookup(&connect)
            .map(|t| Target::autocommit(t.connection))
            .ok_or_else(|| no_connection(&connect))
    }
}

fn no_connection(scope: &str) -> SqlError {
    SqlError::Connection(format!("no connection registered as [{scope}]"))
}
