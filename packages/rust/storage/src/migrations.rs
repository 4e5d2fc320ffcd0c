//! SQL migration definitions for the pattern catalog database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

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
        description: "Initial schema: patterns, links, ingest_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per pattern document
CREATE TABLE IF NOT EXISTS patterns (
    id             INTEGER PRIMARY KEY,
    name           TEXT NOT NULL,
    problem        TEXT NOT NULL,
    solution       TEXT NOT NULL,
    page_reference INTEGER NOT NULL,
    confidence     INTEGER NOT NULL CHECK (confidence BETWEEN 1 AND 3),
    tag            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patterns_name ON patterns(name);
CREATE INDEX IF NOT EXISTS idx_patterns_page ON patterns(page_reference);
CREATE INDEX IF NOT EXISTS idx_patterns_confidence ON patterns(confidence);

-- Directed link graph; backlinks are read with the roles swapped
CREATE TABLE IF NOT EXISTS links (
    source_id INTEGER NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    PRIMARY KEY (source_id, target_id)
);

CREATE INDEX IF NOT EXISTS idx_links_target ON links(target_id);

-- Ingestion generation history
CREATE TABLE IF NOT EXISTS ingest_runs (
    id              TEXT PRIMARY KEY,
    started_at      TEXT NOT NULL,
    finished_at     TEXT NOT NULL,
    documents_seen  INTEGER NOT NULL,
    patterns_loaded INTEGER NOT NULL,
    links_loaded    INTEGER NOT NULL,
    failures        INTEGER NOT NULL,
    dangling_links  INTEGER NOT NULL,
    report_json     TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
