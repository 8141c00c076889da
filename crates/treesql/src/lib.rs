//! # treesql
//!
//! Dialect-aware SQL over request trees.
//!
//! ## Features
//!
//! - **Trees in, trees out**: a [`Node`] describes the request and, after the
//!   operation, holds the result (rows as child nodes, or a row count)
//! - **Parameterized only**: values from the tree are always bound, only
//!   validated identifiers reach the statement text
//! - **Pluggable dialects**: quote character, placeholder style and the
//!   ordering/pagination tail are plain values on [`Dialect`]
//! - **Scoped transactions**: named scopes commit on success and roll back on
//!   error, nested scopes become savepoints
//! - **Cancellable**: suspending operations take a `CancellationToken`; a
//!   blocking front end runs the same pipeline
//!
//! ## Example
//!
//! ```ignore
//! use treesql::{Engine, EngineConfig, Node};
//!
//! let engine = Engine::new(EngineConfig::new());
//!
//! let mut request = Node::with_value("pgsql.read", "users")
//!     .child(Node::new("columns").child(Node::new("id")).child(Node::new("name")))
//!     .child(Node::new("where").leaf("status", "active"))
//!     .child(Node::new("order").leaf("name", "asc"))
//!     .leaf("limit", 10);
//!
//! engine.run(&client, &mut request, None).await?;
//! for row in &request.children {
//!     println!("{:?}", row.children);
//! }
//! ```

pub mod builder;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ident;
pub mod materialize;
pub mod node;
pub mod postgres;
pub mod scope;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{CompiledStatement, DEFAULT_LIMIT};
pub use config::EngineConfig;
pub use connection::{Command, Connection, Cursor, RowConverter};
pub use dialect::{Dialect, PlaceholderStyle};
pub use engine::{BlockingEngine, Engine, Operation};
pub use error::{SqlError, SqlResult};
pub use ident::Ident;
pub use node::Node;
pub use postgres::{PgCursor, PgRow, PgTransaction};
pub use scope::{Context, Target};
pub use value::Value;

// Re-export the cancellation token type used by suspending operations
pub use tokio_util::sync::CancellationToken;
