//! Corpus ingestion: directory → parsed documents → catalog → storage.
//!
//! Every run is a full rebuild from the current directory contents. A broken
//! document is recorded in the report and skipped; it never aborts the run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use patternlang_markdown::parse_document;
use patternlang_shared::{
    Catalog, DanglingLink, DocumentError, DocumentFailure, IngestReport, PatternId,
    PatternLangError, RawLink, Result, RunId, SourceConfig,
};
use patternlang_storage::Storage;

/// Progress callback for reporting ingestion status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each document, whether or not it parsed.
    fn document_parsed(&self, filename: &str, current: usize, total: usize);
    /// Called when the run has been committed.
    fn done(&self, report: &IngestReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_parsed(&self, _filename: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &IngestReport) {}
}

/// Per-run bookkeeping that accompanies a built [`Catalog`].
#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub documents_seen: usize,
    pub failures: Vec<DocumentFailure>,
    pub dangling_links: Vec<DanglingLink>,
}

// ---------------------------------------------------------------------------
// Document discovery
// ---------------------------------------------------------------------------

/// Regular, non-hidden files directly inside `dir` with the given extension,
/// sorted by filename.
pub fn collect_documents(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PatternLangError::io(dir, e))?;

    let mut documents = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PatternLangError::io(dir, e))?;
        let path = entry.path();

        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let matches_ext = path.extension().is_some_and(|ext| ext == extension);
        if hidden || !matches_ext || !path.is_file() {
            continue;
        }
        documents.push(path);
    }

    documents.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(documents)
}

// ---------------------------------------------------------------------------
// Catalog assembly
// ---------------------------------------------------------------------------

/// Parse every document in `dir` and resolve links against the parsed set.
#[instrument(skip_all, fields(dir = %dir.display(), %extension))]
pub fn build_catalog(
    dir: &Path,
    extension: &str,
    progress: &dyn ProgressReporter,
) -> Result<(Catalog, BuildOutcome)> {
    let documents = collect_documents(dir, extension)?;
    let total = documents.len();

    let mut catalog = Catalog::new();
    let mut outcome = BuildOutcome {
        documents_seen: total,
        ..BuildOutcome::default()
    };
    let mut claimed: BTreeMap<PatternId, String> = BTreeMap::new();
    let mut raw_links: Vec<(PatternId, RawLink)> = Vec::new();

    progress.phase("Parsing documents");
    for (i, path) in documents.iter().enumerate() {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match read_and_parse(path, &filename) {
            Ok(doc) => {
                let id = doc.pattern.id;
                if let Some(first) = claimed.get(&id) {
                    warn!(%filename, id, %first, "duplicate pattern id");
                    outcome.failures.push(DocumentFailure {
                        filename: filename.clone(),
                        reason: DocumentError::DuplicateId {
                            id,
                            first: first.clone(),
                        },
                    });
                } else {
                    claimed.insert(id, filename.clone());
                    raw_links.extend(doc.links.into_iter().map(|link| (id, link)));
                    catalog.insert_pattern(doc.pattern);
                }
            }
            Err(reason) => {
                warn!(%filename, %reason, "skipping document");
                outcome.failures.push(DocumentFailure {
                    filename: filename.clone(),
                    reason,
                });
            }
        }
        progress.document_parsed(&filename, i + 1, total);
    }

    progress.phase("Resolving links");
    let mut reported = BTreeSet::new();
    for (source_id, link) in raw_links {
        let target = PatternId::try_from(link.id)
            .ok()
            .filter(|id| catalog.contains(*id));
        if let Some(target) = target {
            catalog.insert_link(source_id, target);
        } else if reported.insert((source_id, link.id)) {
            debug!(source_id, target_id = link.id, "dangling link dropped");
            outcome.dangling_links.push(DanglingLink {
                source_id,
                target_id: link.id,
                target_name: link.name,
            });
        }
    }

    Ok((catalog, outcome))
}

fn read_and_parse(
    path: &Path,
    filename: &str,
) -> std::result::Result<patternlang_markdown::ParsedDocument, DocumentError> {
    let bytes = std::fs::read(path).map_err(|e| DocumentError::Unreadable {
        message: e.to_string(),
    })?;
    let raw = String::from_utf8(bytes).map_err(|e| DocumentError::Unreadable {
        message: e.to_string(),
    })?;
    parse_document(filename, &raw)
}

// ---------------------------------------------------------------------------
// Ingestion run
// ---------------------------------------------------------------------------

/// Rebuild the stored catalog from `source.patterns_dir`.
///
/// 1. Parse every candidate document
/// 2. Resolve links, dropping dangling ones
/// 3. Swap the new catalog in with one storage transaction
///
/// When no document parses, nothing is committed and the previous catalog
/// stays visible.
#[instrument(skip_all, fields(dir = %source.patterns_dir.display()))]
pub async fn ingest(
    storage: &Storage,
    source: &SourceConfig,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let start = Instant::now();
    let run_id = RunId::new();
    let started_at = Utc::now();

    info!(%run_id, "starting ingestion");

    let (catalog, outcome) = build_catalog(&source.patterns_dir, &source.extension, progress)?;

    if catalog.is_empty() {
        return Err(PatternLangError::validation(format!(
            "no documents parsed from {} ({} seen, {} failed); keeping the current catalog",
            source.patterns_dir.display(),
            outcome.documents_seen,
            outcome.failures.len()
        )));
    }

    let mut report = IngestReport {
        run_id,
        started_at,
        documents_seen: outcome.documents_seen,
        patterns_loaded: catalog.pattern_count(),
        links_loaded: catalog.link_count(),
        failures: outcome.failures,
        dangling_links: outcome.dangling_links,
        elapsed: start.elapsed(),
    };

    progress.phase("Writing catalog");
    storage.replace_catalog(&catalog, &report).await?;
    report.elapsed = start.elapsed();

    info!(
        run_id = %report.run_id,
        documents = report.documents_seen,
        patterns = report.patterns_loaded,
        links = report.links_loaded,
        failures = report.failures.len(),
        dangling = report.dangling_links.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "ingestion complete"
    );

    progress.done(&report);
    Ok(report)
}
