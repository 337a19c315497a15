//! rag-query: read-only semantic search over a pre-built message index

pub mod commands;
pub mod config;
pub mod deadline;
pub mod embed;
pub mod error;
pub mod lifecycle;
pub mod meta;
pub mod provision;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
