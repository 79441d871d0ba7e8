//! Mock text service for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

use crate::errors::ServiceError;
use crate::service::{ChatMessage, Completion, Role, TextService};

#[allow(clippy::unwrap_used)]
// SAFETY: pattern is a compile-time constant.
static BATCH_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\d+)\] \([^)]*\) (.*)$").unwrap());

type Responder = Box<dyn Fn(&[ChatMessage]) -> Result<String, ServiceError> + Send + Sync>;

/// A text service that answers from a script or a closure and records every
/// request it receives.
pub struct MockTextService {
    responder: Responder,
    scripted: Mutex<VecDeque<Result<String, ServiceError>>>,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl std::fmt::Debug for MockTextService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTextService")
            .field("call_count", &self.call_count())
            .finish_non_exhaustive()
    }
}

impl MockTextService {
    /// Answers calls in order from `responses`. Once the script runs out,
    /// every call fails with a transport error.
    #[must_use]
    pub fn scripted(responses: Vec<Result<String, ServiceError>>) -> Self {
        let mut mock = Self::from_fn(|_| Err(ServiceError::Transport("no scripted response left".into())));
        mock.scripted = Mutex::new(responses.into());
        mock
    }

    /// Answers every call with the same text.
    #[must_use]
    pub fn always(response: impl Into<String>) -> Self {
        let response = response.into();
        Self::from_fn(move |_| Ok(response.clone()))
    }

    /// Fails every call with `error`.
    #[must_use]
    pub fn failing(error: ServiceError) -> Self {
        Self::from_fn(move |_| Err(error.clone()))
    }

    /// Answers each batch line `[id] (context) text` with `[id] f(text)`.
    #[must_use]
    pub fn mapping<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::from_fn(move |messages| {
            let batch = user_content(messages);
            let lines: Vec<String> = batch
                .lines()
                .filter_map(|line| BATCH_LINE.captures(line))
                .map(|caps| format!("[{}] {}", &caps[1], f(&caps[2])))
                .collect();
            Ok(lines.join("\n"))
        })
    }

    /// Answers with a closure over the request messages.
    #[must_use]
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String, ServiceError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(f),
            scripted: Mutex::new(VecDeque::new()),
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// Returns the messages of every call.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }

    /// Returns the user message of every call.
    #[must_use]
    pub fn user_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|messages| user_content(messages).to_string())
            .collect()
    }
}

fn user_content(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map_or("", |m| m.content.as_str())
}

#[async_trait]
impl TextService for MockTextService {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, ServiceError> {
        *self.call_count.lock() += 1;
        self.requests.lock().push(messages.to_vec());

        let scripted = self.scripted.lock().pop_front();
        let content = match scripted {
            Some(response) => response?,
            None => (self.responder)(messages)?,
        };
        Ok(Completion::new(content, "mock-model"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_in_order_then_exhausted() {
        let mock = MockTextService::scripted(vec![
            Ok("[1] First".into()),
            Err(ServiceError::EmptyChoice),
        ]);
        let messages = [ChatMessage::user("[1] (body) Hello there")];

        assert_eq!(mock.complete(&messages).await.unwrap().content, "[1] First");
        assert_eq!(mock.complete(&messages).await.unwrap_err(), ServiceError::EmptyChoice);
        assert!(matches!(
            mock.complete(&messages).await.unwrap_err(),
            ServiceError::Transport(_)
        ));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mapping_rewrites_each_line() {
        let mock = MockTextService::mapping(|text| text.to_uppercase());
        let messages = [
            ChatMessage::system("rules"),
            ChatMessage::user("[1] (heading) Big title\n[2] (body) Some body text"),
        ];
        let completion = mock.complete(&messages).await.unwrap();
        assert_eq!(completion.content, "[1] BIG TITLE\n[2] SOME BODY TEXT");
        assert_eq!(mock.user_prompts(), vec![messages[1].content.clone()]);
        assert_eq!(mock.requests()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_failing_records_request() {
        let mock = MockTextService::failing(ServiceError::Status {
            status: 500,
            body: "boom".into(),
        });
        assert!(mock.complete(&[ChatMessage::user("x")]).await.is_err());
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.requests().len(), 1);
    }
}
