//! Depth-bounded expansion of a pattern's link neighborhood.

use tracing::instrument;

use patternlang_shared::{
    Catalog, ExpandedPattern, MAX_EXPANSION_DEPTH, Pattern, PatternId, PatternLangError, Result,
};
use patternlang_storage::Storage;

/// Deepest expansion any caller may request.
pub const MAX_DEPTH: u32 = MAX_EXPANSION_DEPTH;

/// Title-case a stored name: a letter is upper-cased when it follows
/// whitespace, punctuation or the start of the name, lower-cased otherwise.
/// Apostrophes do not start a new word (`children's`, not `Children'S`).
/// Runs of whitespace collapse to a single space.
pub fn display_name(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut out = String::with_capacity(word.len());
            let mut at_boundary = true;
            for c in word.chars() {
                if c.is_alphanumeric() {
                    if at_boundary {
                        out.extend(c.to_uppercase());
                    } else {
                        out.extend(c.to_lowercase());
                    }
                    at_boundary = false;
                } else {
                    out.push(c);
                    at_boundary = c != '\'';
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Expand `id` over `catalog`: each forward target and each backlink source
/// is expanded at `max_depth - 1`, down to empty link lists at depth 0.
///
/// There is no visited set. A pattern reachable along several paths appears
/// once per path, and cycles stop at the depth bound.
pub fn expand(catalog: &Catalog, id: PatternId, max_depth: u32) -> Result<ExpandedPattern> {
    let pattern = catalog
        .get(id)
        .ok_or_else(|| PatternLangError::not_found(format!("pattern {id}")))?;
    Ok(expand_node(catalog, pattern, max_depth))
}

fn expand_node(catalog: &Catalog, pattern: &Pattern, depth: u32) -> ExpandedPattern {
    let children = |ids: Vec<PatternId>| -> Vec<ExpandedPattern> {
        if depth == 0 {
            return Vec::new();
        }
        ids.into_iter()
            .filter_map(|child| catalog.get(child))
            .map(|child| expand_node(catalog, child, depth - 1))
            .collect()
    };

    ExpandedPattern {
        id: pattern.id,
        name: display_name(&pattern.name),
        problem: pattern.problem.clone(),
        solution: pattern.solution.clone(),
        page_reference: pattern.page_reference,
        confidence: pattern.confidence,
        tag: pattern.tag.clone(),
        forward_links: children(catalog.forward_links(pattern.id)),
        backlinks: children(catalog.backlinks(pattern.id)),
    }
}

/// Expand a stored pattern, reading its neighborhood from one snapshot.
#[instrument(skip(storage))]
pub async fn expand_stored(
    storage: &Storage,
    id: PatternId,
    max_depth: u32,
    limit: u32,
) -> Result<ExpandedPattern> {
    if max_depth > limit {
        return Err(PatternLangError::DepthOutOfRange {
            requested: max_depth,
            max: limit,
        });
    }
    let neighborhood = storage.load_neighborhood(id, max_depth).await?;
    expand(&neighborhood, id, max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use patternlang_shared::Confidence;
    use std::path::Path;

    fn pattern(id: PatternId, name: &str) -> Pattern {
        Pattern {
            id,
            name: name.into(),
            problem: "problem".into(),
            solution: "solution".into(),
            page_reference: id * 10,
            confidence: Confidence::Medium,
            tag: "apl/test".into(),
        }
    }

    /// 1 <-> 2, a two-node cycle.
    fn cycle() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert_pattern(pattern(1, "pattern one"));
        catalog.insert_pattern(pattern(2, "pattern two"));
        catalog.insert_link(1, 2);
        catalog.insert_link(2, 1);
        catalog
    }

    #[test]
    fn display_name_title_cases_words() {
        assert_eq!(display_name("agricultural valleys"), "Agricultural Valleys");
        assert_eq!(display_name("  city  country fingers "), "City Country Fingers");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn display_name_capitalizes_after_punctuation() {
        assert_eq!(display_name("four-story limit"), "Four-Story Limit");
        assert_eq!(display_name("half-hidden garden"), "Half-Hidden Garden");
        assert_eq!(display_name("web of shopping (street)"), "Web Of Shopping (Street)");
        assert_eq!(display_name("children's realm"), "Children's Realm");
        assert_eq!(display_name("CITY country"), "City Country");
    }

    #[test]
    fn depth_zero_has_no_links() {
        let expanded = expand(&cycle(), 1, 0).unwrap();
        assert_eq!(expanded.name, "Pattern One");
        assert!(expanded.forward_links.is_empty());
        assert!(expanded.backlinks.is_empty());
    }

    #[test]
    fn cycle_terminates_at_exact_depth() {
        for depth in 0..=MAX_DEPTH {
            let expanded = expand(&cycle(), 1, depth).unwrap();
            assert_eq!(expanded.depth(), depth as usize);
        }
    }

    #[test]
    fn nested_levels_are_title_cased() {
        let expanded = expand(&cycle(), 1, 2).unwrap();
        let child = &expanded.forward_links[0];
        assert_eq!(child.name, "Pattern Two");
        assert_eq!(child.backlinks[0].name, "Pattern One");
        assert!(child.backlinks[0].forward_links.is_empty());
    }

    #[test]
    fn paths_are_not_deduplicated() {
        // 1 -> 2 and 2 -> 1, so 2 is both a forward link and a backlink of 1.
        let expanded = expand(&cycle(), 1, 1).unwrap();
        assert_eq!(expanded.forward_links.len(), 1);
        assert_eq!(expanded.backlinks.len(), 1);
        assert_eq!(expanded.forward_links[0], expanded.backlinks[0]);
    }

    #[test]
    fn self_link_appears_on_both_sides() {
        let mut catalog = Catalog::new();
        catalog.insert_pattern(pattern(5, "mirror"));
        catalog.insert_link(5, 5);

        let expanded = expand(&catalog, 5, 2).unwrap();
        assert_eq!(expanded.forward_links[0].id, 5);
        assert_eq!(expanded.backlinks[0].id, 5);
        assert_eq!(expanded.depth(), 2);
    }

    #[test]
    fn missing_pattern_is_not_found() {
        let err = expand(&cycle(), 9, 1).unwrap_err();
        assert!(matches!(err, PatternLangError::NotFound { .. }));
    }

    #[tokio::test]
    async fn stored_expansion_matches_in_memory() {
        use crate::ingest::{SilentProgress, build_catalog, ingest};
        use patternlang_shared::SourceConfig;

        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures/patterns");
        let tmp = std::env::temp_dir().join(format!("pl_expand_{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.unwrap();
        let source = SourceConfig {
            patterns_dir: dir.clone(),
            ..SourceConfig::default()
        };
        ingest(&storage, &source, &SilentProgress).await.unwrap();

        let (catalog, _) = build_catalog(&dir, "md", &SilentProgress).unwrap();
        for id in 1..=4 {
            for depth in 0..=MAX_DEPTH {
                let stored = expand_stored(&storage, id, depth, MAX_DEPTH).await.unwrap();
                assert_eq!(stored, expand(&catalog, id, depth).unwrap());
            }
        }

        let base = expand_stored(&storage, 4, 0, MAX_DEPTH).await.unwrap();
        assert_eq!(base.name, "Agricultural Valleys");
        assert!(base.forward_links.is_empty() && base.backlinks.is_empty());
    }

    #[tokio::test]
    async fn stored_expansion_rejects_deep_requests() {
        let tmp = std::env::temp_dir().join(format!("pl_expand_{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.unwrap();

        let err = expand_stored(&storage, 1, 4, MAX_DEPTH).await.unwrap_err();
        assert!(matches!(
            err,
            PatternLangError::DepthOutOfRange {
                requested: 4,
                max: 3
            }
        ));

        let err = expand_stored(&storage, 1, 1, MAX_DEPTH).await.unwrap_err();
        assert!(matches!(err, PatternLangError::NotFound { .. }));
    }
}
