//! libSQL storage layer for the pattern catalog.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the pattern
//! records, the directed link graph, and the history of ingestion runs.
//!
//! **Visibility rules:**
//! - Every ingestion replaces the whole catalog inside one transaction on a
//!   dedicated writer connection ([`Storage::replace_catalog`]).
//! - Point and list queries run on the shared reader connection, which never
//!   observes an uncommitted replacement (WAL journal).
//! - Multi-query reads ([`Storage::load_neighborhood`]) run inside one read
//!   transaction so they see a single generation.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use serde::Serialize;

use patternlang_shared::{
    Catalog, Confidence, IngestReport, Pattern, PatternId, PatternLangError, Result,
};

const PATTERN_COLUMNS: &str = "id, name, problem, solution, page_reference, confidence, tag";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PatternLangError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(PatternLangError::storage)?;

        let conn = db.connect().map_err(PatternLangError::storage)?;
        configure(&conn).await?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        tracing::debug!(path = %path.display(), "storage opened");
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(PatternLangError::storage)?;

        let conn = db.connect().map_err(PatternLangError::storage)?;
        configure(&conn).await?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// A fresh connection to the same database, configured like the primary.
    async fn connect(&self) -> Result<Connection> {
        let conn = self.db.connect().map_err(PatternLangError::storage)?;
        configure(&conn).await?;
        Ok(conn)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        PatternLangError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PatternLangError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Catalog replacement
    // -----------------------------------------------------------------------

    /// Atomically replace every pattern and link with `catalog`, and record
    /// the run described by `report`.
    ///
    /// Readers see either the previous generation or the new one, never an
    /// empty or partial catalog.
    #[tracing::instrument(skip_all, fields(run_id = %report.run_id))]
    pub async fn replace_catalog(&self, catalog: &Catalog, report: &IngestReport) -> Result<()> {
        self.check_writable()?;

        let writer = self.connect().await?;
        let tx = writer
            .transaction()
            .await
            .map_err(PatternLangError::storage)?;

        match write_catalog(&tx, catalog, report).await {
            Ok(()) => {
                tx.commit().await.map_err(PatternLangError::storage)?;
                tracing::info!(
                    patterns = catalog.pattern_count(),
                    links = catalog.link_count(),
                    "catalog replaced"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Pattern lookups
    // -----------------------------------------------------------------------

    /// Get a pattern by id.
    pub async fn get_pattern(&self, id: PatternId) -> Result<Option<Pattern>> {
        query_pattern(&self.conn, id).await
    }

    /// Get a pattern by exact name (case-insensitive).
    pub async fn get_pattern_by_name(&self, name: &str) -> Result<Option<Pattern>> {
        let sql = format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE name = ?1 LIMIT 1");
        let mut rows = self
            .conn
            .query(&sql, params![name.trim().to_lowercase()])
            .await
            .map_err(PatternLangError::storage)?;

        match rows.next().await.map_err(PatternLangError::storage)? {
            Some(row) => Ok(Some(row_to_pattern(&row)?)),
            None => Ok(None),
        }
    }

    /// Patterns whose name contains `fragment`, ordered by id.
    pub async fn find_patterns_by_name(&self, fragment: &str) -> Result<Vec<Pattern>> {
        let sql = format!(
            "SELECT {PATTERN_COLUMNS} FROM patterns WHERE name LIKE ?1 ESCAPE '\\' ORDER BY id"
        );
        self.query_patterns(&sql, params![contains_pattern(fragment)])
            .await
    }

    /// The pattern with the highest page reference at or below `page`.
    pub async fn get_pattern_at_page(&self, page: u32) -> Result<Option<Pattern>> {
        let sql = format!(
            "SELECT {PATTERN_COLUMNS} FROM patterns
             WHERE page_reference <= ?1
             ORDER BY page_reference DESC, id ASC
             LIMIT 1"
        );
        let mut rows = self
            .conn
            .query(&sql, params![i64::from(page)])
            .await
            .map_err(PatternLangError::storage)?;

        match rows.next().await.map_err(PatternLangError::storage)? {
            Some(row) => Ok(Some(row_to_pattern(&row)?)),
            None => Ok(None),
        }
    }

    /// Patterns rated exactly `confidence`, ordered by id.
    pub async fn list_patterns_by_confidence(
        &self,
        confidence: Confidence,
    ) -> Result<Vec<Pattern>> {
        let sql =
            format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE confidence = ?1 ORDER BY id");
        self.query_patterns(&sql, params![i64::from(confidence.as_u8())])
            .await
    }

    /// Patterns whose tag contains `fragment`, ordered by id.
    pub async fn list_patterns_by_tag(&self, fragment: &str) -> Result<Vec<Pattern>> {
        let sql = format!(
            "SELECT {PATTERN_COLUMNS} FROM patterns WHERE tag LIKE ?1 ESCAPE '\\' ORDER BY id"
        );
        self.query_patterns(&sql, params![contains_pattern(fragment)])
            .await
    }

    /// Every pattern, ordered by id.
    pub async fn list_patterns(&self) -> Result<Vec<Pattern>> {
        let sql = format!("SELECT {PATTERN_COLUMNS} FROM patterns ORDER BY id");
        self.query_patterns(&sql, params![]).await
    }

    async fn query_patterns(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Pattern>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(PatternLangError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(PatternLangError::storage)? {
            results.push(row_to_pattern(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Link graph
    // -----------------------------------------------------------------------

    /// Ids that `id` links to, ascending.
    pub async fn forward_link_ids(&self, id: PatternId) -> Result<Vec<PatternId>> {
        forward_ids(&self.conn, id).await
    }

    /// Ids that link to `id`, ascending.
    pub async fn backlink_ids(&self, id: PatternId) -> Result<Vec<PatternId>> {
        backlink_ids(&self.conn, id).await
    }

    /// Load every pattern within `depth` hops of `id` (following links in
    /// both directions) plus the edges needed to expand them, from a single
    /// read snapshot.
    ///
    /// Returns an empty catalog when `id` does not exist.
    pub async fn load_neighborhood(&self, id: PatternId, depth: u32) -> Result<Catalog> {
        let reader = self.connect().await?;
        let tx = reader
            .transaction()
            .await
            .map_err(PatternLangError::storage)?;

        let loaded = collect_neighborhood(&tx, id, depth).await;
        // Read-only transaction: ending it just releases the snapshot.
        tx.commit().await.map_err(PatternLangError::storage)?;
        loaded
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub async fn count_patterns(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM patterns").await
    }

    pub async fn count_links(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM links").await
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(PatternLangError::storage)?;
        match rows.next().await.map_err(PatternLangError::storage)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(PatternLangError::storage)? as u64),
            None => Ok(0),
        }
    }

    /// The most recently recorded ingestion run, if any.
    pub async fn latest_ingest_run(&self) -> Result<Option<IngestRunSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, documents_seen, patterns_loaded,
                        links_loaded, failures, dangling_links
                 FROM ingest_runs ORDER BY finished_at DESC, id DESC LIMIT 1",
                params![],
            )
            .await
            .map_err(PatternLangError::storage)?;

        let Some(row) = rows.next().await.map_err(PatternLangError::storage)? else {
            return Ok(None);
        };

        let count = |idx: i32| -> Result<u64> {
            Ok(row.get::<i64>(idx).map_err(PatternLangError::storage)? as u64)
        };

        Ok(Some(IngestRunSummary {
            run_id: row.get::<String>(0).map_err(PatternLangError::storage)?,
            started_at: row.get::<String>(1).map_err(PatternLangError::storage)?,
            finished_at: row.get::<String>(2).map_err(PatternLangError::storage)?,
            documents_seen: count(3)?,
            patterns_loaded: count(4)?,
            links_loaded: count(5)?,
            failures: count(6)?,
            dangling_links: count(7)?,
        }))
    }
}

/// A row of the `ingest_runs` history.
#[derive(Debug, Clone, Serialize)]
pub struct IngestRunSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub documents_seen: u64,
    pub patterns_loaded: u64,
    pub links_loaded: u64,
    pub failures: u64,
    pub dangling_links: u64,
}

// ---------------------------------------------------------------------------
// Connection helpers
// ---------------------------------------------------------------------------

/// Per-connection settings: WAL so readers never block on the writer,
/// enforced foreign keys, and a busy timeout for the writer lock.
async fn configure(conn: &Connection) -> Result<()> {
    for pragma in [
        "PRAGMA journal_mode = WAL",
        "PRAGMA foreign_keys = ON",
        "PRAGMA busy_timeout = 5000",
    ] {
        // Some pragmas report their new value as a row; drain it.
        let mut rows = conn
            .query(pragma, params![])
            .await
            .map_err(|e| PatternLangError::Storage(format!("{pragma} failed: {e}")))?;
        while rows.next().await.map_err(PatternLangError::storage)?.is_some() {}
    }
    Ok(())
}

async fn write_catalog(conn: &Connection, catalog: &Catalog, report: &IngestReport) -> Result<()> {
    conn.execute("DELETE FROM links", params![])
        .await
        .map_err(PatternLangError::storage)?;
    conn.execute("DELETE FROM patterns", params![])
        .await
        .map_err(PatternLangError::storage)?;

    for p in catalog.patterns() {
        conn.execute(
            "INSERT INTO patterns (id, name, problem, solution, page_reference, confidence, tag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                i64::from(p.id),
                p.name.as_str(),
                p.problem.as_str(),
                p.solution.as_str(),
                i64::from(p.page_reference),
                i64::from(p.confidence.as_u8()),
                p.tag.as_str(),
            ],
        )
        .await
        .map_err(|e| PatternLangError::Storage(format!("insert pattern {}: {e}", p.id)))?;
    }

    for (source, target) in catalog.links() {
        conn.execute(
            "INSERT INTO links (source_id, target_id) VALUES (?1, ?2)",
            params![i64::from(source), i64::from(target)],
        )
        .await
        .map_err(|e| PatternLangError::Storage(format!("insert link {source}->{target}: {e}")))?;
    }

    let report_json =
        serde_json::to_string(report).map_err(|e| PatternLangError::Storage(e.to_string()))?;
    conn.execute(
        "INSERT INTO ingest_runs (id, started_at, finished_at, documents_seen, patterns_loaded,
                                  links_loaded, failures, dangling_links, report_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            report.run_id.to_string(),
            report.started_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            report.documents_seen as i64,
            report.patterns_loaded as i64,
            report.links_loaded as i64,
            report.failures.len() as i64,
            report.dangling_links.len() as i64,
            report_json,
        ],
    )
    .await
    .map_err(PatternLangError::storage)?;

    Ok(())
}

async fn query_pattern(conn: &Connection, id: PatternId) -> Result<Option<Pattern>> {
    let sql = format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE id = ?1");
    let mut rows = conn
        .query(&sql, params![i64::from(id)])
        .await
        .map_err(PatternLangError::storage)?;

    match rows.next().await.map_err(PatternLangError::storage)? {
        Some(row) => Ok(Some(row_to_pattern(&row)?)),
        None => Ok(None),
    }
}

async fn forward_ids(conn: &Connection, id: PatternId) -> Result<Vec<PatternId>> {
    query_ids(
        conn,
        "SELECT target_id FROM links WHERE source_id = ?1 ORDER BY target_id",
        id,
    )
    .await
}

async fn backlink_ids(conn: &Connection, id: PatternId) -> Result<Vec<PatternId>> {
    query_ids(
        conn,
        "SELECT source_id FROM links WHERE target_id = ?1 ORDER BY source_id",
        id,
    )
    .await
}

async fn query_ids(conn: &Connection, sql: &str, id: PatternId) -> Result<Vec<PatternId>> {
    let mut rows = conn
        .query(sql, params![i64::from(id)])
        .await
        .map_err(PatternLangError::storage)?;

    let mut ids = Vec::new();
    while let Some(row) = rows.next().await.map_err(PatternLangError::storage)? {
        ids.push(row.get::<u32>(0).map_err(PatternLangError::storage)?);
    }
    Ok(ids)
}

/// Breadth-first walk from `root`. Edges are loaded for every node found
/// less than `depth` hops away; nodes on the outer ring only need their
/// record.
async fn collect_neighborhood(conn: &Connection, root: PatternId, depth: u32) -> Result<Catalog> {
    let mut catalog = Catalog::new();
    let Some(pattern) = query_pattern(conn, root).await? else {
        return Ok(catalog);
    };
    catalog.insert_pattern(pattern);

    let mut frontier = vec![root];
    for _ in 0..depth {
        let mut next = Vec::new();
        for &node in &frontier {
            let forward = forward_ids(conn, node).await?;
            let back = backlink_ids(conn, node).await?;

            let edges = forward
                .iter()
                .map(|&target| ((node, target), target))
                .chain(back.iter().map(|&source| ((source, node), source)));

            for ((source, target), neighbor) in edges {
                catalog.insert_link(source, target);
                if !catalog.contains(neighbor) {
                    if let Some(p) = query_pattern(conn, neighbor).await? {
                        catalog.insert_pattern(p);
                        next.push(neighbor);
                    }
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    Ok(catalog)
}

/// `%fragment%` with LIKE wildcards in `fragment` escaped.
fn contains_pattern(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 2);
    escaped.push('%');
    for c in fragment.trim().to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Convert a database row (in [`PATTERN_COLUMNS`] order) to a [`Pattern`].
fn row_to_pattern(row: &libsql::Row) -> Result<Pattern> {
    let confidence = row.get::<i64>(5).map_err(PatternLangError::storage)?;
    let confidence = u8::try_from(confidence)
        .map_err(|e| PatternLangError::Storage(e.to_string()))
        .and_then(|c| Confidence::try_from(c).map_err(PatternLangError::Storage))?;

    Ok(Pattern {
        id: row.get::<u32>(0).map_err(PatternLangError::storage)?,
        name: row.get::<String>(1).map_err(PatternLangError::storage)?,
        problem: row.get::<String>(2).map_err(PatternLangError::storage)?,
        solution: row.get::<String>(3).map_err(PatternLangError::storage)?,
        page_reference: row.get::<u32>(4).map_err(PatternLangError::storage)?,
        confidence,
        tag: row.get::<String>(6).map_err(PatternLangError::storage)?,
    })
}
