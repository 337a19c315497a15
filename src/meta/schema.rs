//! SQLite schema of the relational metadata shipped inside the artifact
//!
//! The indexer owns this table; the query service only reads it. The DDL is
//! kept here so fixtures and local development databases match production.

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- One row per archive file ingested by the indexer
CREATE TABLE IF NOT EXISTS indexed_files (
    file_path TEXT PRIMARY KEY,
    channel TEXT NOT NULL,
    message_count INTEGER,
    indexed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_indexed_files_channel ON indexed_files(channel);
"#;
