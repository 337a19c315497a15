//! CLI commands implementation

pub mod query;
pub mod status;

pub use query::*;
pub use status::*;
