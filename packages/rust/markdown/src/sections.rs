//! Text passes that take a document apart: quote unwrapping, the
//! body/references split, section extraction, and link extraction.

use std::sync::LazyLock;

use regex::Regex;

use patternlang_shared::{DocumentError, RawLink};

pub const PROBLEM_SECTION: &str = "Problem";
pub const SOLUTION_SECTION: &str = "Solution";
pub const RELATED_SECTION: &str = "Related Patterns";

/// The three body sections of a pattern document, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sections {
    pub problem: String,
    pub solution: String,
    pub related: String,
}

// ---------------------------------------------------------------------------
// Pass 1: Strip block-quote markers
// ---------------------------------------------------------------------------

/// Remove leading `>` markers (and surrounding whitespace) from every line,
/// then trim the whole text.
///
/// Nested markers (`> > text`) are removed in one go, so applying this twice
/// yields the same text as applying it once.
pub fn strip_quote_markers(text: &str) -> String {
    text.lines()
        .map(|line| {
            line.trim_start_matches(|c: char| c == '>' || c.is_whitespace())
                .trim_end()
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Body / references split
// ---------------------------------------------------------------------------

/// Split on the first line consisting solely of `---`.
///
/// Returns `(body, references)`, both trimmed.
pub fn split_references(text: &str) -> Result<(&str, &str), DocumentError> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim() == "---" {
            let body = &text[..offset];
            let references = &text[offset + line.len()..];
            return Ok((body.trim(), references.trim()));
        }
        offset += line.len();
    }
    Err(DocumentError::MissingReferenceSeparator)
}

// ---------------------------------------------------------------------------
// Pass 3: Section extraction
// ---------------------------------------------------------------------------

/// Any Markdown heading line; these terminate a section.
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+(.*?)\s*$").expect("heading regex"));

/// Locate the Problem, Solution and Related Patterns sections in the body.
///
/// A section starts after its `## <Name>` line and runs to the next heading
/// or the end of the body. Problem and Solution must be non-empty; Related
/// Patterns may be empty but its header must be present.
pub fn extract_sections(body: &str) -> Result<Sections, DocumentError> {
    let problem = section(body, PROBLEM_SECTION)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing(PROBLEM_SECTION))?;
    let solution = section(body, SOLUTION_SECTION)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing(SOLUTION_SECTION))?;
    let related = section(body, RELATED_SECTION).ok_or_else(|| missing(RELATED_SECTION))?;

    Ok(Sections {
        problem,
        solution,
        related,
    })
}

fn missing(section: &str) -> DocumentError {
    DocumentError::MissingSection {
        section: section.to_string(),
    }
}

/// Content of the first `## <name>` section, trimmed, or `None` if absent.
fn section(body: &str, name: &str) -> Option<String> {
    let mut lines = body.lines();

    lines.by_ref().find(|line| is_section_header(line, name))?;

    let content: Vec<&str> = lines
        .take_while(|line| !HEADING_RE.is_match(line.trim()))
        .collect();

    Some(content.join("\n").trim().to_string())
}

fn is_section_header(line: &str, name: &str) -> bool {
    line.trim()
        .strip_prefix("##")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .is_some_and(|rest| rest.trim() == name)
}

// ---------------------------------------------------------------------------
// Pass 4: Link extraction
// ---------------------------------------------------------------------------

/// Matches wiki-link style references, e.g. `[[Independent Regions (1)]]`.
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]]+?) \((\d+)\)\]\]").expect("link regex"));

/// Every `[[<Name> (<digits>)]]` occurrence in `text`, in order.
///
/// Duplicates are kept; the graph assembly deduplicates edges. Ids too
/// large for a pattern are kept too, so they surface as dangling links.
pub fn extract_links(text: &str) -> Vec<RawLink> {
    LINK_RE
        .captures_iter(text)
        .map(|caps| RawLink {
            name: caps[1].trim().to_string(),
            id: caps[2].parse().unwrap_or(u64::MAX),
        })
        .collect()
}
