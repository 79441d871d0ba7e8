//! Visible copy stored in the JSON attributes of self-closing block comments.
//!
//! A block such as `<!-- wp:acme/content {"text":"Hello","tagName":"h2"} /-->`
//! keeps its copy in the `text` attribute rather than between tags. The
//! payload is parsed as typed JSON. On rewrite only the replaced value is
//! re-encoded; every other value keeps its original JSON text.

use super::classify::{rejection_reason_with_min, RejectReason, MIN_TEXT_LENGTH};
use super::context::ContextLabel;
use super::tokenizer::Segment;
use regex::Regex;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use std::sync::LazyLock;

/// Attribute holding rewritable copy.
pub const TEXT_ATTRIBUTE: &str = "text";

/// Groups: 1 prefix, 2 namespace, 3 block name, 4 JSON payload, 5 suffix.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static SELF_CLOSING_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^(<!--\s*wp:([A-Za-z0-9_-]+)/([A-Za-z0-9_-]+)\s+)(\{.*\})(\s*/-->)$",
    )
    .unwrap()
});

/// Object members in document order, each value kept as its literal JSON text.
struct RawEntries(Vec<(String, String)>);

impl<'de> Deserialize<'de> for RawEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<RawEntries, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, Box<RawValue>>()? {
                    entries.push((key, value.get().to_string()));
                }
                Ok(RawEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// A namespaced self-closing block comment split into its literal parts.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedBlock {
    /// Everything before the JSON payload, e.g. `<!-- wp:acme/content `.
    pub prefix: String,
    /// Block namespace, e.g. `acme`.
    pub namespace: String,
    /// Block name without namespace.
    pub block_name: String,
    /// Parsed attributes, key order and number text preserved.
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// Everything after the payload, e.g. ` /-->`.
    pub suffix: String,
    entries: Vec<(String, String)>,
}

impl EmbeddedBlock {
    /// Parses a raw comment. Returns `None` when it is not a namespaced
    /// self-closing block with a JSON object payload.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = SELF_CLOSING_BLOCK_RE.captures(raw)?;
        let payload = &caps[4];
        let attributes: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(payload).ok()?;
        let RawEntries(entries) = serde_json::from_str(payload).ok()?;
        Some(Self {
            prefix: caps[1].to_string(),
            namespace: caps[2].to_string(),
            block_name: caps[3].to_string(),
            attributes,
            suffix: caps[5].to_string(),
            entries,
        })
    }

    /// String value of an attribute, if present.
    #[must_use]
    pub fn string_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(serde_json::Value::as_str)
    }

    /// Block name refined by its `tagName` attribute.
    ///
    /// `h1`-`h6` become `heading-h{n}` and `p` becomes `paragraph`.
    #[must_use]
    pub fn refined_type(&self) -> String {
        match self.string_attribute("tagName") {
            Some(tag) if is_heading_tag(tag) => format!("heading-{tag}"),
            Some("p") => "paragraph".to_string(),
            _ => self.block_name.clone(),
        }
    }

    /// Replaces an existing attribute with a string value.
    ///
    /// Returns false, leaving the block unchanged, when `key` is absent.
    pub fn set_string_attribute(&mut self, key: &str, value: &str) -> bool {
        let Some(slot) = self.attributes.get_mut(key) else {
            return false;
        };
        let value = serde_json::Value::String(value.to_string());
        let encoded = escape_block_json(&value.to_string());
        *slot = value;
        for (_, raw) in self.entries.iter_mut().filter(|(k, _)| k == key) {
            raw.clone_from(&encoded);
        }
        true
    }

    /// Rebuilds the comment from its literal parts and current attribute values.
    #[must_use]
    pub fn render(&self) -> String {
        let mut json = String::from("{");
        for (index, (key, raw)) in self.entries.iter().enumerate() {
            if index > 0 {
                json.push(',');
            }
            json.push_str(&escape_block_json(
                &serde_json::Value::String(key.clone()).to_string(),
            ));
            json.push(':');
            json.push_str(raw);
        }
        json.push('}');
        format!("{}{}{}", self.prefix, json, self.suffix)
    }
}

fn is_heading_tag(tag: &str) -> bool {
    matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Escapes characters that would let a string break out of a comment,
/// using the same `\uXXXX` forms the block editor writes.
fn escape_block_json(json: &str) -> String {
    json.replace("--", "\\u002d\\u002d")
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

/// Copy found in an embedded attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedText {
    /// Extraction id, continuing after the text-node ids.
    pub id: u32,
    /// Index of the owning block comment segment.
    pub segment_index: usize,
    /// Trimmed attribute value.
    pub original: String,
    /// Refined block type used as the context label.
    pub block_type: String,
    /// Attribute key the copy came from.
    pub attribute: String,
}

impl EmbeddedText {
    /// Context label for batch requests.
    #[must_use]
    pub fn context(&self) -> ContextLabel {
        ContextLabel::Block(self.block_type.clone())
    }
}

/// Pulls rewritable copy out of self-closing block comments.
///
/// Ids are assigned sequentially from `start_id`. Malformed JSON skips the block.
#[must_use]
pub fn extract_embedded_texts(segments: &[Segment], start_id: u32) -> Vec<EmbeddedText> {
    extract_embedded_texts_with(segments, start_id, MIN_TEXT_LENGTH, |_, _, _| {})
}

/// Like [`extract_embedded_texts`], reporting every rejected candidate to `on_reject`.
pub fn extract_embedded_texts_with<F>(
    segments: &[Segment],
    start_id: u32,
    min_length: usize,
    mut on_reject: F,
) -> Vec<EmbeddedText>
where
    F: FnMut(usize, &str, RejectReason),
{
    let mut next_id = start_id;
    let mut texts = Vec::new();

    for (index, segment) in segments.iter().enumerate() {
        if !segment.is_comment() {
            continue;
        }
        let Some(block) = EmbeddedBlock::parse(&segment.raw) else {
            continue;
        };
        let Some(value) = block.string_attribute(TEXT_ATTRIBUTE) else {
            continue;
        };
        let trimmed = value.trim();
        if let Some(reason) = rejection_reason_with_min(trimmed, min_length) {
            on_reject(index, trimmed, reason);
            continue;
        }
        texts.push(EmbeddedText {
            id: next_id,
            segment_index: index,
            original: trimmed.to_string(),
            block_type: block.refined_type(),
            attribute: TEXT_ATTRIBUTE.to_string(),
        });
        next_id += 1;
    }

    texts
}

/// Returns the comment with `attribute` set to `value`, other keys untouched.
///
/// `None` when the comment no longer parses or lacks the attribute.
#[must_use]
pub fn rewrite_embedded_block(raw: &str, attribute: &str, value: &str) -> Option<String> {
    let mut block = EmbeddedBlock::parse(raw)?;
    block
        .set_string_attribute(attribute, value)
        .then(|| block.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::tokenize;

    #[test]
    fn test_parse_block() {
        let block =
            EmbeddedBlock::parse(r#"<!-- wp:acme/content {"text":"Hello world","tagName":"h2"} /-->"#)
                .unwrap();
        assert_eq!(block.prefix, "<!-- wp:acme/content ");
        assert_eq!(block.namespace, "acme");
        assert_eq!(block.block_name, "content");
        assert_eq!(block.suffix, " /-->");
        assert_eq!(block.refined_type(), "heading-h2");
    }

    #[test]
    fn test_parse_rejects_non_self_closing() {
        assert!(EmbeddedBlock::parse(r#"<!-- wp:paragraph {"align":"center"} -->"#).is_none());
        assert!(EmbeddedBlock::parse("<!-- wp:separator /-->").is_none());
        assert!(EmbeddedBlock::parse(r#"<!-- wp:acme/list ["a","b"] /-->"#).is_none());
    }

    #[test]
    fn test_refined_type() {
        let p = EmbeddedBlock::parse(r#"<!-- wp:acme/content {"text":"x","tagName":"p"} /-->"#).unwrap();
        assert_eq!(p.refined_type(), "paragraph");
        let div = EmbeddedBlock::parse(r#"<!-- wp:acme/hero {"text":"x","tagName":"div"} /-->"#).unwrap();
        assert_eq!(div.refined_type(), "hero");
        let cta = EmbeddedBlock::parse(r#"<!-- wp:acme/cta {"text":"x"} /-->"#).unwrap();
        assert_eq!(cta.refined_type(), "cta");
    }

    #[test]
    fn test_extract_assigns_sequential_ids() {
        let segments = tokenize(concat!(
            r#"<!-- wp:acme/content {"text":"  Welcome to our studio  ","tagName":"h1"} /-->"#,
            "<p>Body</p>",
            r#"<!-- wp:acme/content {"text":"We fix leaky pipes fast","tagName":"p"} /-->"#,
        ));
        let texts = extract_embedded_texts(&segments, 5);
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0].id, 5);
        assert_eq!(texts[0].original, "Welcome to our studio");
        assert_eq!(texts[0].block_type, "heading-h1");
        assert_eq!(texts[0].segment_index, 0);
        assert_eq!(texts[1].id, 6);
        assert_eq!(texts[1].block_type, "paragraph");
        assert_eq!(texts[1].attribute, "text");
    }

    #[test]
    fn test_extract_skips_malformed_json_and_rejected_text() {
        let segments = tokenize(concat!(
            r#"<!-- wp:acme/content {"text":"Broken", /-->"#,
            r#"<!-- wp:acme/content {"text":"   "} /-->"#,
            r#"<!-- wp:acme/content {"text":"$19.99"} /-->"#,
            r#"<!-- wp:acme/content {"text":42} /-->"#,
            r#"<!-- wp:acme/content {"title":"No text key here"} /-->"#,
        ));
        let mut rejected = Vec::new();
        let texts = extract_embedded_texts_with(&segments, 1, MIN_TEXT_LENGTH, |i, _, r| {
            rejected.push((i, r));
        });
        assert!(texts.is_empty());
        assert_eq!(rejected, vec![(1, RejectReason::Empty), (2, RejectReason::Currency)]);
    }

    #[test]
    fn test_rewrite_preserves_other_keys_and_order() {
        let raw = r#"<!-- wp:ns/content {"text":"Hello","tagName":"h2","align":"wide"} /-->"#;
        let rewritten = rewrite_embedded_block(raw, "text", "Welcome").unwrap();
        assert_eq!(
            rewritten,
            r#"<!-- wp:ns/content {"text":"Welcome","tagName":"h2","align":"wide"} /-->"#
        );
    }

    #[test]
    fn test_rewrite_keeps_key_position() {
        let raw = r#"<!-- wp:ns/content {"tagName":"h2","text":"Hello","level":2} /-->"#;
        let rewritten = rewrite_embedded_block(raw, "text", "Fresh start").unwrap();
        assert_eq!(
            rewritten,
            r#"<!-- wp:ns/content {"tagName":"h2","text":"Fresh start","level":2} /-->"#
        );
    }

    #[test]
    fn test_rewrite_escapes_comment_breakers() {
        let raw = r#"<!-- wp:ns/content {"text":"Hello"} /-->"#;
        let rewritten = rewrite_embedded_block(raw, "text", "A --> B & <C>").unwrap();
        assert!(!rewritten[4..rewritten.len() - 4].contains("-->"));
        let block = EmbeddedBlock::parse(&rewritten).unwrap();
        assert_eq!(block.string_attribute("text"), Some("A --> B & <C>"));
        assert_eq!(tokenize(&rewritten).len(), 1);
    }

    #[test]
    fn test_rewrite_keeps_sibling_values_verbatim() {
        let raw = concat!(
            r#"<!-- wp:ns/content {"text":"Hello there","url":"/a?b=1&c=2","note":"say \"hi\"","#,
            r#""big":123456789012345678901234,"w":1.50} /-->"#,
        );
        let rewritten = rewrite_embedded_block(raw, "text", "Welcome").unwrap();
        assert_eq!(
            rewritten,
            concat!(
                r#"<!-- wp:ns/content {"text":"Welcome","url":"/a?b=1&c=2","note":"say \"hi\"","#,
                r#""big":123456789012345678901234,"w":1.50} /-->"#,
            )
        );
    }

    #[test]
    fn test_rewrite_keeps_escaped_sibling_text() {
        let raw = r#"<!-- wp:ns/content {"text":"Hello","title":"a \u002d\u002d\u003e b","n":{"x":[1,2.0]}} /-->"#;
        let rewritten = rewrite_embedded_block(raw, "text", "Hi & bye").unwrap();
        assert_eq!(
            rewritten,
            r#"<!-- wp:ns/content {"text":"Hi \u0026 bye","title":"a \u002d\u002d\u003e b","n":{"x":[1,2.0]}} /-->"#
        );
    }

    #[test]
    fn test_unnamespaced_block_is_not_embedded_copy() {
        let raw = r#"<!-- wp:image {"text":"Alt caption for photo"} /-->"#;
        assert!(EmbeddedBlock::parse(raw).is_none());
        assert!(extract_embedded_texts(&tokenize(raw), 1).is_empty());
        assert!(rewrite_embedded_block(raw, "text", "Something else").is_none());
    }

    #[test]
    fn test_set_string_attribute_missing_key() {
        let mut block =
            EmbeddedBlock::parse(r#"<!-- wp:ns/content {"title":"Hello"} /-->"#).unwrap();
        let before = block.clone();
        assert!(!block.set_string_attribute("text", "x"));
        assert_eq!(block, before);
        assert_eq!(block.render(), r#"<!-- wp:ns/content {"title":"Hello"} /-->"#);
    }

    #[test]
    fn test_rewrite_missing_attribute() {
        let raw = r#"<!-- wp:ns/content {"title":"Hello"} /-->"#;
        assert!(rewrite_embedded_block(raw, "text", "x").is_none());
        assert!(rewrite_embedded_block("<!-- plain -->", "text", "x").is_none());
    }
}
