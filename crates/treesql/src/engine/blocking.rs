use super::Engine;
use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::error::SqlResult;
use crate::node::Node;
use tokio::runtime::{Builder, Runtime};

/// Blocking front end: drives [`Engine`] to completion on an owned
/// current-thread runtime.
///
/// Must not be called from inside another async runtime. Driver background
/// tasks (e.g. a `tokio_postgres::Connection`) should be spawned on
/// [`BlockingEngine::runtime`] so they make progress while calls block.
pub struct BlockingEngine<C: Connection> {
    engine: Engine<C>,
    runtime: Runtime,
}

impl<C: Connection> BlockingEngine<C> {
    pub fn new(config: EngineConfig) -> std::io::Result<Self> {
        Self::from_engine(Engine::new(config))
    }

    pub fn from_engine(engine: Engine<C>) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { engine, runtime })
    }

    pub fn engine(&self) -> &Engine<C> {
        &self.engine
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Blocking [`Engine::run`]: one operation on `connection`.
    ///
    /// Transactions are expressed as a `<dialect>.transaction.create` node
    /// whose children are the operations to run inside it.
    pub fn run(&self, connection: &C, node: &mut Node) -> SqlResult<()> {
        self.runtime
            .block_on(self.engine.run(connection, node, None))
    }
}
