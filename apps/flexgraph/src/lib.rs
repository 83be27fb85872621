//! # flexgraph
//!
//! Application layer of the flexgraph editor: CLI, configuration and the
//! interactive shell. All state lives in `flexgraph-core`.

pub mod cli;
pub mod config;
pub mod shell;
