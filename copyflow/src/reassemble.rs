//! Puts rewritten copy back into the segment list and rebuilds the document.

use crate::batch::RewriteMap;
use crate::markup::{concat_segments, rewrite_embedded_block, EmbeddedText, Segment};
use tracing::warn;

/// Substitutes rewritten copy into every text segment whose id is mapped.
///
/// The segment keeps its own leading and trailing whitespace runs; only the
/// trimmed core is replaced. Returns how many segments changed.
pub fn apply_text_nodes(segments: &mut [Segment], rewrites: &RewriteMap) -> usize {
    let mut applied = 0;
    for segment in segments.iter_mut() {
        let Some(rewritten) = segment.text_id().and_then(|id| rewrites.get(&id)) else {
            continue;
        };
        let raw = &segment.raw;
        let core_start = raw.len() - raw.trim_start().len();
        let core_end = raw.trim_end().len().max(core_start);
        let mut replaced = String::with_capacity(raw.len() + rewritten.len());
        replaced.push_str(&raw[..core_start]);
        replaced.push_str(rewritten.trim());
        replaced.push_str(&raw[core_end..]);
        segment.raw = replaced;
        applied += 1;
    }
    applied
}

/// Substitutes rewritten copy into the JSON payload of each mapped block.
///
/// Blocks that no longer parse are left as they were. Returns how many
/// segments changed.
pub fn apply_embedded(
    segments: &mut [Segment],
    embedded: &[EmbeddedText],
    rewrites: &RewriteMap,
) -> usize {
    let mut applied = 0;
    for item in embedded {
        let Some(rewritten) = rewrites.get(&item.id) else {
            continue;
        };
        let Some(segment) = segments.get_mut(item.segment_index) else {
            continue;
        };
        match rewrite_embedded_block(&segment.raw, &item.attribute, rewritten.trim()) {
            Some(raw) => {
                segment.raw = raw;
                applied += 1;
            }
            None => warn!(
                text_id = item.id,
                segment_index = item.segment_index,
                "Embedded block no longer parses, keeping original"
            ),
        }
    }
    applied
}

/// Rebuilds the document with both substitution rules applied.
///
/// With an empty map this returns the original content exactly.
#[must_use]
pub fn reassemble(segments: &[Segment], embedded: &[EmbeddedText], rewrites: &RewriteMap) -> String {
    if rewrites.is_empty() {
        return concat_segments(segments);
    }
    let mut working = segments.to_vec();
    apply_text_nodes(&mut working, rewrites);
    apply_embedded(&mut working, embedded, rewrites);
    concat_segments(&working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::markup::tokenize;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_identity_with_empty_map() {
        let inputs = [
            "",
            "<h2>Old headline</h2><p>Old body text here.</p>",
            "<!-- wp:acme/content {\"text\":\"Hello\"} /-->\n<p> spaced </p>",
            "broken < markup <!-- never closed",
        ];
        for input in inputs {
            assert_eq!(reassemble(&tokenize(input), &[], &RewriteMap::new()), input);
            let extraction = extract(input);
            assert_eq!(
                reassemble(&extraction.segments, &extraction.embedded, &RewriteMap::new()),
                input
            );
        }
    }

    #[test]
    fn test_text_nodes_keep_surrounding_whitespace() {
        let extraction = extract("<p>\n    Old copy goes here  \n</p>");
        let map = RewriteMap::from([(1, "  New copy  ".to_string())]);
        assert_eq!(
            reassemble(&extraction.segments, &extraction.embedded, &map),
            "<p>\n    New copy  \n</p>"
        );
    }

    #[test]
    fn test_unmapped_ids_are_untouched() {
        let extraction = extract("<h2>Old headline</h2><p>Old body text here.</p>");
        let map = RewriteMap::from([(2, "New body text here.".to_string())]);
        assert_eq!(
            reassemble(&extraction.segments, &extraction.embedded, &map),
            "<h2>Old headline</h2><p>New body text here.</p>"
        );
    }

    #[test]
    fn test_embedded_substitution() {
        let content = r#"<!-- wp:ns/content {"text":"Hello","tagName":"h2"} /-->"#;
        let extraction = extract(content);
        assert_eq!(extraction.embedded.len(), 1);
        let map = RewriteMap::from([(extraction.embedded[0].id, "Welcome".to_string())]);
        assert_eq!(
            reassemble(&extraction.segments, &extraction.embedded, &map),
            r#"<!-- wp:ns/content {"text":"Welcome","tagName":"h2"} /-->"#
        );

        let content = r#"<!-- wp:ns/content {"className":"hero","text":"Hello there","tagName":"h2"} /-->"#;
        let extraction = extract(content);
        let map = RewriteMap::from([(1, "Welcome".to_string())]);
        assert_eq!(
            reassemble(&extraction.segments, &extraction.embedded, &map),
            r#"<!-- wp:ns/content {"className":"hero","text":"Welcome","tagName":"h2"} /-->"#
        );
    }

    #[test]
    fn test_apply_counts() {
        let extraction = extract(concat!(
            "<p>Paragraph copy</p>",
            r#"<!-- wp:ns/content {"text":"Embedded copy"} /-->"#,
        ));
        let map = RewriteMap::from([(1, "One".to_string()), (2, "Two".to_string()), (99, "Stray".to_string())]);
        let mut working = extraction.segments.clone();
        assert_eq!(apply_text_nodes(&mut working, &map), 1);
        assert_eq!(apply_embedded(&mut working, &extraction.embedded, &map), 1);
    }

    fn page_fragments() -> impl Strategy<Value = String> {
        let fragment = prop_oneof![
            Just("<".to_string()),
            Just(">".to_string()),
            Just("<!--".to_string()),
            Just("-->".to_string()),
            Just("<h2>".to_string()),
            Just("</h2>".to_string()),
            Just("<script>".to_string()),
            Just("</script>".to_string()),
            Just("<!-- wp:paragraph -->".to_string()),
            Just("<!-- wp:ns/content {\"text\":\"Book a visit today\",\"n\":1.50} /-->".to_string()),
            Just("  \n".to_string()),
            "[A-Za-z ]{1,12}",
            "\\PC{1,4}",
        ];
        prop::collection::vec(fragment, 0..40).prop_map(|parts| parts.concat())
    }

    proptest! {
        #[test]
        fn test_identity_for_any_input(input in page_fragments()) {
            prop_assert_eq!(reassemble(&tokenize(&input), &[], &RewriteMap::new()), input.clone());
            let extraction = extract(&input);
            prop_assert_eq!(
                reassemble(&extraction.segments, &extraction.embedded, &RewriteMap::new()),
                input
            );
        }
    }
}
