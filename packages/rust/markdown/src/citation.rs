//! Citation parsing for the references block: page number, confidence
//! marker, and topical tag.

use std::sync::LazyLock;

use regex::Regex;

use patternlang_shared::{Confidence, DocumentError};

/// The fixed citation sentence, anchored at the start of the references.
static PAGE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[!cite\][-+]? Alexander, Christopher\. _A Pattern Language: Towns, Buildings, Construction_\. Oxford University Press, 1977, p\. (\d{1,9})",
    )
    .expect("page reference regex")
});

/// Hash-prefixed tokens such as `#high-confidence` or `#APL/Towns/Regional-Policies`.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#[\w/-]+").expect("tag regex"));

/// Page number cited at the start of the references text.
pub fn extract_page_reference(references: &str) -> Result<u32, DocumentError> {
    PAGE_REF_RE
        .captures(references)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|&page| page > 0)
        .ok_or(DocumentError::MissingPageReference)
}

/// Confidence from the first hash token, tag (lowercased, without `#`)
/// from the second. Fewer than two tokens is `MissingTag`.
pub fn extract_confidence_and_tag(references: &str) -> Result<(Confidence, String), DocumentError> {
    let mut tokens = TAG_RE.find_iter(references).map(|m| m.as_str());

    let marker = tokens.next().ok_or(DocumentError::MissingTag)?;
    let confidence =
        Confidence::from_marker(marker).ok_or_else(|| DocumentError::UnknownConfidenceMarker {
            marker: marker.to_string(),
        })?;

    let tag = tokens
        .next()
        .map(|t| t.trim_start_matches('#').to_lowercase())
        .ok_or(DocumentError::MissingTag)?;

    Ok((confidence, tag))
}
