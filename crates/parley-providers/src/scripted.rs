//! A generator that replays a fixed script of responses.
//!
//! Used by tests and offline demos. Every request is recorded so callers can
//! assert on what the model would have seen.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::GenerationError;

use crate::traits::{GenerateRequest, GenerateResponse, Generator};

/// One scripted step.
pub type ScriptedReply = Result<GenerateResponse, GenerationError>;

/// Replays queued replies in order.
pub struct ScriptedGenerator {
    id: String,
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<GenerateRequest>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Create a generator from a list of replies.
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            id: "scripted".to_string(),
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a generator answering each call with the given texts in order.
    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .map(|t| Ok(GenerateResponse::text(t)))
                .collect(),
        )
    }

    /// Override the generator id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Queue another reply.
    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().push_back(reply);
    }

    /// Number of `generate` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                Err(GenerationError::InvalidResponse {
                    provider: self.id.clone(),
                    message: "script exhausted".to_string(),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let generator = ScriptedGenerator::texts(["one", "two"]);
        let first = generator
            .generate(GenerateRequest::new("m", vec![parley_core::Content::user("hi")]))
            .await
            .unwrap();
        let second = generator
            .generate(GenerateRequest::new("m", vec![]))
            .await
            .unwrap();

        assert_eq!(first.content.as_text(), "one");
        assert_eq!(second.content.as_text(), "two");
        assert_eq!(generator.call_count(), 2);
        assert_eq!(
            generator.requests()[0].last_user_text().as_deref(),
            Some("hi")
        );
    }

    #[tokio::test]
    async fn test_exhausted_script_is_an_error() {
        let generator = ScriptedGenerator::new(vec![]);
        let err = generator
            .generate(GenerateRequest::new("m", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse { .. }));
    }
}
