//! Core domain types for the pattern catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DocumentError;

/// Numeric pattern identifier, decoded from the document filename.
pub type PatternId = u32;

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Ordinal rating of citation certainty. Serialized as `1`, `2` or `3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Confidence {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Confidence {
    /// Map a document marker token (including its `#`) to a level.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "#low-confidence" => Some(Self::Low),
            "#medium-confidence" => Some(Self::Medium),
            "#high-confidence" => Some(Self::High),
            _ => None,
        }
    }

    /// Integer value stored in the database and returned to API callers.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Confidence> for u8 {
    fn from(c: Confidence) -> Self {
        c.as_u8()
    }
}

impl TryFrom<u8> for Confidence {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(format!("confidence must be 1, 2 or 3 (got {other})")),
        }
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// One design pattern record as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    /// Lowercase name, as decoded from the filename.
    pub name: String,
    pub problem: String,
    pub solution: String,
    pub page_reference: u32,
    pub confidence: Confidence,
    /// Lowercase topical path, e.g. `apl/towns/regional-policies`.
    pub tag: String,
}

/// An outgoing reference captured from a `[[Name (id)]]` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub name: String,
    /// Id as written. Wider than `PatternId` so out-of-range ids survive
    /// extraction and can be reported; digit runs beyond `u64` saturate.
    pub id: u64,
}

/// A pattern with its forward links and backlinks expanded to a bounded depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedPattern {
    pub id: PatternId,
    /// Display-cased name.
    pub name: String,
    pub problem: String,
    pub solution: String,
    pub page_reference: u32,
    pub confidence: Confidence,
    pub tag: String,
    #[serde(default)]
    pub forward_links: Vec<ExpandedPattern>,
    #[serde(default)]
    pub backlinks: Vec<ExpandedPattern>,
}

impl ExpandedPattern {
    /// Height of the tree: 0 for a node without expanded links.
    pub fn depth(&self) -> usize {
        self.forward_links
            .iter()
            .chain(self.backlinks.iter())
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A full set of patterns plus the directed link edge set between them.
///
/// Backlinks are never stored: they are read off the same edge set with the
/// roles swapped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    patterns: BTreeMap<PatternId, Pattern>,
    links: BTreeSet<(PatternId, PatternId)>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pattern. Returns the previous record with the same id, if any.
    pub fn insert_pattern(&mut self, pattern: Pattern) -> Option<Pattern> {
        self.patterns.insert(pattern.id, pattern)
    }

    /// Insert a `source -> target` edge. Returns `false` if it already existed.
    pub fn insert_link(&mut self, source: PatternId, target: PatternId) -> bool {
        self.links.insert((source, target))
    }

    pub fn get(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.get(&id)
    }

    pub fn contains(&self, id: PatternId) -> bool {
        self.patterns.contains_key(&id)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.values()
    }

    pub fn links(&self) -> impl Iterator<Item = (PatternId, PatternId)> + '_ {
        self.links.iter().copied()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Targets referenced by `id`, ascending.
    pub fn forward_links(&self, id: PatternId) -> Vec<PatternId> {
        self.links
            .range((id, PatternId::MIN)..=(id, PatternId::MAX))
            .map(|&(_, target)| target)
            .collect()
    }

    /// Sources referencing `id`, ascending.
    pub fn backlinks(&self, id: PatternId) -> Vec<PatternId> {
        self.links
            .iter()
            .filter(|&&(_, target)| target == id)
            .map(|&(source, _)| source)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Ingestion report
// ---------------------------------------------------------------------------

/// Identifier of one ingestion generation (UUID v7, time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document skipped during ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub filename: String,
    pub reason: DocumentError,
}

/// A link whose target id no successfully parsed document produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingLink {
    pub source_id: PatternId,
    pub target_id: u64,
    pub target_name: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    /// Candidate documents found in the source directory.
    pub documents_seen: usize,
    pub patterns_loaded: usize,
    pub links_loaded: usize,
    pub failures: Vec<DocumentFailure>,
    pub dangling_links: Vec<DanglingLink>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl IngestReport {
    /// Whether every document parsed and every link resolved.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.dangling_links.is_empty()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(id: PatternId) -> Pattern {
        Pattern {
            id,
            name: format!("pattern {id}"),
            problem: "problem".into(),
            solution: "solution".into(),
            page_reference: 10 * id,
            confidence: Confidence::Medium,
            tag: "apl/test".into(),
        }
    }

    #[test]
    fn confidence_markers() {
        assert_eq!(Confidence::from_marker("#low-confidence"), Some(Confidence::Low));
        assert_eq!(Confidence::from_marker("#high-confidence"), Some(Confidence::High));
        assert_eq!(Confidence::from_marker("#High-confidence"), None);
        assert_eq!(Confidence::from_marker("#certain"), None);
    }

    #[test]
    fn confidence_serializes_as_integer() {
        let json = serde_json::to_string(&Confidence::High).expect("serialize");
        assert_eq!(json, "3");
        let parsed: Confidence = serde_json::from_str("1").expect("deserialize");
        assert_eq!(parsed, Confidence::Low);
        assert!(serde_json::from_str::<Confidence>("4").is_err());
    }

    #[test]
    fn backlinks_are_transpose_of_links() {
        let mut catalog = Catalog::new();
        for id in 1..=3 {
            catalog.insert_pattern(pattern(id));
        }
        assert!(catalog.insert_link(1, 2));
        assert!(catalog.insert_link(3, 2));
        assert!(catalog.insert_link(2, 1));
        assert!(!catalog.insert_link(1, 2));

        assert_eq!(catalog.link_count(), 3);
        assert_eq!(catalog.forward_links(1), vec![2]);
        assert_eq!(catalog.forward_links(2), vec![1]);
        assert_eq!(catalog.backlinks(2), vec![1, 3]);
        assert_eq!(catalog.backlinks(3), Vec::<PatternId>::new());
    }

    #[test]
    fn expanded_depth() {
        let leaf = ExpandedPattern {
            id: 2,
            name: "Leaf".into(),
            problem: String::new(),
            solution: String::new(),
            page_reference: 1,
            confidence: Confidence::Low,
            tag: String::new(),
            forward_links: vec![],
            backlinks: vec![],
        };
        let root = ExpandedPattern {
            id: 1,
            name: "Root".into(),
            backlinks: vec![leaf.clone()],
            ..leaf.clone()
        };
        assert_eq!(leaf.depth(), 0);
        assert_eq!(root.depth(), 1);
    }

    #[test]
    fn report_serializes_elapsed_as_millis() {
        let report = IngestReport {
            run_id: RunId::new(),
            started_at: Utc::now(),
            documents_seen: 2,
            patterns_loaded: 1,
            links_loaded: 0,
            failures: vec![DocumentFailure {
                filename: "Broken (9).md".into(),
                reason: DocumentError::MissingTag,
            }],
            dangling_links: vec![],
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["elapsed"], 1500);
        assert_eq!(json["failures"][0]["reason"]["kind"], "missing_tag");
        assert!(!report.is_clean());
    }
}
