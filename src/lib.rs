//! # mcp-sql-fuzz
//!
//! A schema-aware fuzzing harness for JSON-RPC tool servers that front a SQL
//! database, speaking the line-delimited protocol over a child's stdio.
//!
//! A session spawns the server, performs the `initialize` handshake, asks
//! the `mysql` tool for the table catalog and then submits randomized
//! statements through the `query` tool, reporting each outcome.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mcp_sql_fuzz::{FuzzConfig, StdoutReporter, run_session};
//! use rand::SeedableRng;
//!
//! # async fn demo() -> Result<(), mcp_sql_fuzz::FuzzError> {
//! let mut config = FuzzConfig::default();
//! config.connection.username = "fuzz".to_string();
//! config.connection.database = "shop".to_string();
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let report = run_session(&config, StdoutReporter, &mut rng, std::future::pending()).await?;
//! assert!(report.is_done());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod process;
pub mod report;
pub mod runner;
pub mod schema;
pub mod synth;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::ProtocolClient;
pub use codec::{Payload, Reply};
pub use config::{Args, ConnectionParams, FuzzConfig};
pub use error::{AbortReason, FuzzError, ProtocolError};
pub use process::{ChildHandle, ServerProcess};
pub use report::{NoopReporter, Reporter, StdoutReporter, TracingReporter};
pub use runner::{FuzzRunner, QueryOutcome, QueryRecord, SessionReport, SessionState, run_session};
pub use schema::{SchemaCache, TableSchema};
pub use synth::{GeneratedQuery, QueryShape, QuerySynthesizer};
