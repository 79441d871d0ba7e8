//! Tag-nesting stack that keeps extraction out of verbatim containers.

use super::tokenizer::Segment;

/// Containers whose text content must never be rewritten.
pub const VERBATIM_TAGS: &[&str] = &["script", "style", "code", "pre", "svg", "math"];

/// Tracks open tags while segments are visited in order.
///
/// Unbalanced markup is tolerated: a closing tag only pops when it matches
/// the top of the stack, otherwise it is ignored.
#[derive(Debug, Clone, Default)]
pub struct ScopeTracker {
    stack: Vec<String>,
    verbatim_depth: usize,
}

impl ScopeTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the stack for one segment. Text and comments are ignored.
    pub fn observe(&mut self, segment: &Segment) {
        let Some(name) = segment.tag_name() else {
            return;
        };
        if segment.is_opening_tag() {
            if is_verbatim(name) {
                self.verbatim_depth += 1;
            }
            self.stack.push(name.to_string());
        } else if segment.is_closing_tag() && self.stack.last().is_some_and(|top| top == name) {
            self.stack.pop();
            if is_verbatim(name) {
                self.verbatim_depth -= 1;
            }
        }
    }

    /// Whether any open tag is a verbatim container.
    #[must_use]
    pub fn in_verbatim(&self) -> bool {
        self.verbatim_depth > 0
    }

    /// Number of currently open tags.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Names of the open tags, outermost first.
    #[must_use]
    pub fn open_tags(&self) -> &[String] {
        &self.stack
    }
}

fn is_verbatim(name: &str) -> bool {
    VERBATIM_TAGS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::tokenize;

    fn verbatim_flags(content: &str) -> Vec<(String, bool)> {
        let mut tracker = ScopeTracker::new();
        let mut out = Vec::new();
        for seg in tokenize(content) {
            tracker.observe(&seg);
            if seg.is_text() {
                out.push((seg.raw.clone(), tracker.in_verbatim()));
            }
        }
        out
    }

    #[test]
    fn test_script_and_style_are_verbatim() {
        let flags = verbatim_flags(
            "<p>Before</p><script>var greeting = 'Hello there';</script><style>.a{}</style><p>After</p>",
        );
        assert_eq!(
            flags,
            vec![
                ("Before".to_string(), false),
                ("var greeting = 'Hello there';".to_string(), true),
                (".a{}".to_string(), true),
                ("After".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_nested_verbatim() {
        let flags = verbatim_flags("<pre><span>let x = 1;</span></pre>Outside");
        assert_eq!(flags[0], ("let x = 1;".to_string(), true));
        assert_eq!(flags[1], ("Outside".to_string(), false));
    }

    #[test]
    fn test_mismatched_close_is_ignored() {
        let mut tracker = ScopeTracker::new();
        for seg in tokenize("<div><p>text</div>") {
            tracker.observe(&seg);
        }
        assert_eq!(tracker.open_tags(), &["div".to_string(), "p".to_string()]);
    }

    #[test]
    fn test_stray_close_on_empty_stack() {
        let mut tracker = ScopeTracker::new();
        for seg in tokenize("</code></script>Free text") {
            tracker.observe(&seg);
        }
        assert_eq!(tracker.depth(), 0);
        assert!(!tracker.in_verbatim());
    }

    #[test]
    fn test_void_element_inside_script_does_not_pin_stack() {
        let flags = verbatim_flags("<code>a<br>b</code>Plain words");
        assert_eq!(flags.last(), Some(&("Plain words".to_string(), false)));
    }
}
