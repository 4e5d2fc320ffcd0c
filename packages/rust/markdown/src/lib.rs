//! Pattern document parser.
//!
//! Turns one Markdown pattern document into a [`Pattern`] record plus its raw
//! outgoing links. A document looks like:
//!
//! ```text
//! ## Problem
//! > problem statement
//! ## Solution
//! > solution statement
//! ## Related Patterns
//! ... [[City Country Fingers (3)]] ...
//! ---
//! > [!cite]- Alexander, Christopher. _A Pattern Language: ..._. Oxford University Press, 1977, p. 163
//! > #high-confidence
//! > #APL/Town-Patterns/Local-Centers
//! ```
//!
//! and is named `<Name> (<id>).md`. Parsing is a pure function of the
//! filename and the text; nothing here touches the filesystem.

mod citation;
mod sections;

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use patternlang_shared::{DocumentError, Pattern, PatternId, RawLink};

pub use citation::{extract_confidence_and_tag, extract_page_reference};
pub use sections::{
    RELATED_SECTION, Sections, extract_links, extract_sections, split_references,
    strip_quote_markers,
};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of parsing one pattern document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    /// The canonical pattern record.
    pub pattern: Pattern,
    /// Outgoing links from the Related Patterns section, in document order,
    /// duplicates included.
    pub links: Vec<RawLink>,
}

// ---------------------------------------------------------------------------
// Filename decoding
// ---------------------------------------------------------------------------

/// Matches `<Name> (<digits>).<ext>`.
static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?) \((\d{1,9})\)\.([A-Za-z0-9]+)$").expect("filename regex")
});

/// Decode `(lowercase name, id)` from a document filename.
pub fn decode_filename(filename: &str) -> Result<(String, PatternId), DocumentError> {
    let invalid = || DocumentError::InvalidFilename {
        filename: filename.to_string(),
    };

    let caps = FILENAME_RE.captures(filename).ok_or_else(invalid)?;
    let name = caps[1].trim();
    let id: PatternId = caps[2].parse().map_err(|_| invalid())?;

    if name.is_empty() || id == 0 {
        return Err(invalid());
    }

    Ok((name.to_lowercase(), id))
}

// ---------------------------------------------------------------------------
// Document parser
// ---------------------------------------------------------------------------

/// Parse a pattern document.
///
/// 1. Decode name and id from the filename
/// 2. Strip block-quote markers from every line
/// 3. Split body from references on the first `---` line
/// 4. Extract the Problem / Solution / Related Patterns sections from the body
/// 5. Extract links from Related Patterns only
/// 6. Extract page reference, confidence and tag from the references
#[instrument(skip(raw), fields(len = raw.len()))]
pub fn parse_document(filename: &str, raw: &str) -> Result<ParsedDocument, DocumentError> {
    let (name, id) = decode_filename(filename)?;

    let text = strip_quote_markers(raw);

    // Split first so that references can never contribute links.
    let (body, references) = split_references(&text)?;
    let sections = extract_sections(body)?;
    let links = extract_links(&sections.related);

    let page_reference = extract_page_reference(references)?;
    let (confidence, tag) = extract_confidence_and_tag(references)?;

    debug!(id, %name, links = links.len(), "document parsed");

    Ok(ParsedDocument {
        pattern: Pattern {
            id,
            name,
            problem: sections.problem,
            solution: sections.solution,
            page_reference,
            confidence,
            tag,
        },
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use patternlang_shared::Confidence;

    fn fixture_path(name: &str) -> std::path::PathBuf {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/patterns")
            .join(name)
    }

    fn load_fixture(name: &str) -> String {
        std::fs::read_to_string(fixture_path(name))
            .unwrap_or_else(|e| panic!("failed to read fixture {name}: {e}"))
    }

    const DOC: &str = "## Problem
> The land in the valleys is the best farmland.

## Solution
> Preserve all agricultural valleys as farmland.

## Related Patterns
Within the valleys, keep [[City Country Fingers (3)]] and [[Country Towns (6)]].

---

> [!cite]- Alexander, Christopher. _A Pattern Language: Towns, Buildings, Construction_. Oxford University Press, 1977, p. 25
> #medium-confidence
>
> #APL/Towns/Regional-Policies
";

    // --- Filename decoding ---

    #[test]
    fn decode_filename_example() {
        let (name, id) = decode_filename("Agricultural Valleys (4).md").unwrap();
        assert_eq!(name, "agricultural valleys");
        assert_eq!(id, 4);
    }

    #[test]
    fn decode_filename_trims_and_lowercases() {
        let (name, id) = decode_filename("  Pattern Name  (42).md").unwrap();
        assert_eq!(name, "pattern name");
        assert_eq!(id, 42);
    }

    #[test]
    fn decode_filename_rejects_bad_shapes() {
        for bad in [
            "Agricultural Valleys.md",
            "Agricultural Valleys (4)",
            "Agricultural Valleys (four).md",
            " (4).md",
            "Zero (0).md",
            "Agricultural Valleys (4).md.bak~",
        ] {
            let err = decode_filename(bad).unwrap_err();
            assert_eq!(
                err,
                DocumentError::InvalidFilename {
                    filename: bad.to_string()
                },
                "{bad} should be rejected"
            );
        }
    }

    // --- Full document ---

    #[test]
    fn parse_inline_document() {
        let doc = parse_document("Agricultural Valleys (4).md", DOC).unwrap();
        let p = &doc.pattern;
        assert_eq!(p.id, 4);
        assert_eq!(p.name, "agricultural valleys");
        assert_eq!(p.problem, "The land in the valleys is the best farmland.");
        assert_eq!(p.solution, "Preserve all agricultural valleys as farmland.");
        assert_eq!(p.page_reference, 25);
        assert_eq!(p.confidence, Confidence::Medium);
        assert_eq!(p.tag, "apl/towns/regional-policies");
        assert_eq!(
            doc.links,
            vec![
                RawLink {
                    name: "City Country Fingers".into(),
                    id: 3
                },
                RawLink {
                    name: "Country Towns".into(),
                    id: 6
                },
            ]
        );
    }

    #[test]
    fn parse_fixture_document() {
        let raw = load_fixture("Independent Regions (1).md");
        let doc = parse_document("Independent Regions (1).md", &raw).unwrap();
        assert_eq!(doc.pattern.id, 1);
        assert_eq!(doc.pattern.name, "independent regions");
        assert_eq!(doc.pattern.confidence, Confidence::High);
        assert!(!doc.links.is_empty());
    }

    #[test]
    fn links_in_references_are_ignored() {
        let raw = DOC.replace(
            "#APL/Towns/Regional-Policies",
            "#APL/Towns/Regional-Policies\nSee also [[Mosaic Of Subcultures (8)]]",
        );
        let doc = parse_document("Agricultural Valleys (4).md", &raw).unwrap();
        assert!(doc.links.iter().all(|l| l.id != 8));
        assert_eq!(doc.links.len(), 2);
    }

    #[test]
    fn missing_separator_fails() {
        let raw = DOC.replace("\n---\n", "\n");
        let err = parse_document("Agricultural Valleys (4).md", &raw).unwrap_err();
        assert_eq!(err, DocumentError::MissingReferenceSeparator);
    }

    #[test]
    fn missing_section_fails() {
        let raw = DOC.replace("## Solution", "## Answer");
        let err = parse_document("Agricultural Valleys (4).md", &raw).unwrap_err();
        assert_eq!(
            err,
            DocumentError::MissingSection {
                section: "Solution".into()
            }
        );
    }

    #[test]
    fn invalid_filename_checked_before_content() {
        let err = parse_document("README.md", "").unwrap_err();
        assert!(matches!(err, DocumentError::InvalidFilename { .. }));
    }

    #[test]
    fn unknown_confidence_marker_fails() {
        let raw = DOC.replace("#medium-confidence", "#Medium-Confidence");
        let err = parse_document("Agricultural Valleys (4).md", &raw).unwrap_err();
        assert_eq!(
            err,
            DocumentError::UnknownConfidenceMarker {
                marker: "#Medium-Confidence".into()
            }
        );
    }
}
