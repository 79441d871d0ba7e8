//! Instruction template sent as the system message of every batch.

use crate::service::ChatMessage;

/// What the copy is being rewritten for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    /// Business niche, e.g. "emergency plumbing in Leeds".
    pub niche: String,
    /// Title of the page being rewritten.
    pub page_title: String,
}

impl PromptContext {
    /// Creates a prompt context.
    #[must_use]
    pub fn new(niche: impl Into<String>, page_title: impl Into<String>) -> Self {
        Self {
            niche: niche.into(),
            page_title: page_title.into(),
        }
    }
}

/// Builds the system prompt for one page.
#[must_use]
pub fn system_prompt(ctx: &PromptContext) -> String {
    let niche = if ctx.niche.trim().is_empty() {
        "the site's business"
    } else {
        ctx.niche.trim()
    };
    format!(
        "You are a website copywriter rewriting the page \"{title}\" for {niche}.\n\
         Each input line has the form `[id] (context) original text`. The context \
         tells you where the text appears (heading, body, button label, ...); keep \
         the rewritten text suitable for that spot and close to the original length.\n\
         Rules:\n\
         - Return exactly one line per input id, in the form `[id] rewritten text`.\n\
         - Do not echo the context label.\n\
         - Plain text only: no HTML, no Markdown, no quotation marks around the text.\n\
         - Do not add commentary, explanations, or any lines other than the rewritten entries.",
        title = ctx.page_title,
    )
}

/// System and user messages for one batch.
#[must_use]
pub fn batch_messages(ctx: &PromptContext, formatted_batch: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(ctx)),
        ChatMessage::user(formatted_batch),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Role;

    #[test]
    fn test_prompt_names_niche_and_page() {
        let prompt = system_prompt(&PromptContext::new("dog grooming", "About Us"));
        assert!(prompt.contains("\"About Us\""));
        assert!(prompt.contains("dog grooming"));
        assert!(prompt.contains("`[id] rewritten text`"));
        assert!(prompt.contains("one line per input id"));
    }

    #[test]
    fn test_prompt_without_niche() {
        let prompt = system_prompt(&PromptContext::new("  ", "Home"));
        assert!(prompt.contains("for the site's business"));
    }

    #[test]
    fn test_batch_messages() {
        let messages = batch_messages(&PromptContext::new("n", "p"), "[1] (body) Text here");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "[1] (body) Text here");
    }
}
