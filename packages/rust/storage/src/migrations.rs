//! SQL migration definitions for the glossgen database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: resources, runs, steps",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached upstream lookups. One row per (kind, key); the key_hash
-- uniqueness constraint makes concurrent upserts last-writer-wins.
CREATE TABLE IF NOT EXISTS resources (
    id         TEXT PRIMARY KEY,
    kind       TEXT NOT NULL,
    key        TEXT NOT NULL,
    key_hash   TEXT NOT NULL UNIQUE,
    payload    TEXT,
    success    INTEGER NOT NULL,
    error      TEXT,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resources_kind ON resources(kind);

-- Workflow runs (one glossary term each)
CREATE TABLE IF NOT EXISTS runs (
    id         TEXT PRIMARY KEY,
    term       TEXT NOT NULL,
    status     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Per-run step status; resumption keys on (run_id, name)
CREATE TABLE IF NOT EXISTS steps (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id     TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    status     TEXT NOT NULL,
    output     TEXT,
    error      TEXT,
    updated_at TEXT NOT NULL,
    UNIQUE(run_id, name)
);

CREATE INDEX IF NOT EXISTS idx_steps_run ON steps(run_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
