//! Responder capability - the boundary to whatever produces an agent's words
//!
//! The orchestrator never talks to a model directly. Anything that can turn a
//! persona plus a transcript into text implements [`Responder`]: a remote
//! model client, a local function, or a test double.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ResponderError;
use crate::ids::AgentId;
use crate::transcript::TranscriptSnapshot;

/// Output of one responder call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    /// Structured hand-off, for backends that can return one
    pub suggested_next: Option<AgentId>,
}

impl Reply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            suggested_next: None,
        }
    }

    pub fn with_next(mut self, agent: impl Into<AgentId>) -> Self {
        self.suggested_next = Some(agent.into());
        self
    }
}

impl From<String> for Reply {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

impl From<&str> for Reply {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

/// Produces a single message for a persona given the conversation so far
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(
        &self,
        persona: &str,
        transcript: &TranscriptSnapshot,
    ) -> Result<Reply, ResponderError>;
}

/// Responder backed by a synchronous closure
pub struct FnResponder<F> {
    f: F,
}

impl<F> FnResponder<F>
where
    F: Fn(&str, &TranscriptSnapshot) -> Result<Reply, ResponderError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Responder for FnResponder<F>
where
    F: Fn(&str, &TranscriptSnapshot) -> Result<Reply, ResponderError> + Send + Sync,
{
    async fn respond(
        &self,
        persona: &str,
        transcript: &TranscriptSnapshot,
    ) -> Result<Reply, ResponderError> {
        (self.f)(persona, transcript)
    }
}

/// One queued outcome for a [`ScriptedResponder`]
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(Reply),
    Unavailable(String),
    InvalidOutput(String),
}

impl Scripted {
    fn into_result(self) -> Result<Reply, ResponderError> {
        match self {
            Self::Reply(reply) => Ok(reply),
            Self::Unavailable(msg) => Err(ResponderError::unavailable(msg)),
            Self::InvalidOutput(msg) => Err(ResponderError::InvalidOutput(msg)),
        }
    }
}

/// Replays a fixed queue of outcomes, one per call.
///
/// Once the queue is drained the last outcome repeats when `repeat_last` is
/// set, otherwise every further call reports the responder as unavailable.
pub struct ScriptedResponder {
    queue: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    repeat_last: bool,
    calls: Mutex<usize>,
}

impl ScriptedResponder {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            queue: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            repeat_last: false,
            calls: Mutex::new(0),
        }
    }

    /// Script made only of successful replies
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| Scripted::Reply(Reply::new(r))))
    }

    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Number of times `respond` was invoked
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(
        &self,
        _persona: &str,
        _transcript: &TranscriptSnapshot,
    ) -> Result<Reply, ResponderError> {
        *self.calls.lock() += 1;

        let next = self.queue.lock().pop_front();
        match next {
            Some(item) => {
                *self.last.lock() = Some(item.clone());
                item.into_result()
            }
            None if self.repeat_last => match self.last.lock().clone() {
                Some(item) => item.into_result(),
                None => Err(ResponderError::unavailable("script is empty")),
            },
            None => Err(ResponderError::unavailable("script exhausted")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responder_replays_in_order() {
        let responder = ScriptedResponder::replies(["one", "two"]);
        let snapshot = TranscriptSnapshot::default();

        assert_eq!(responder.respond("p", &snapshot).await.unwrap().content, "one");
        assert_eq!(responder.respond("p", &snapshot).await.unwrap().content, "two");
        assert!(matches!(
            responder.respond("p", &snapshot).await,
            Err(ResponderError::Unavailable(_))
        ));
        assert_eq!(responder.calls(), 3);
    }

    #[tokio::test]
    async fn test_scripted_responder_repeats_last() {
        let responder = ScriptedResponder::replies(["again"]).repeat_last();
        let snapshot = TranscriptSnapshot::default();

        for _ in 0..3 {
            assert_eq!(responder.respond("p", &snapshot).await.unwrap().content, "again");
        }
    }

    #[test]
    fn test_fn_responder_sees_persona() {
        let responder = FnResponder::new(|persona: &str, transcript: &TranscriptSnapshot| {
            Ok(Reply::new(format!("{persona}:{}", transcript.len())))
        });
        let reply = tokio_test::block_on(responder.respond("editor", &TranscriptSnapshot::default()))
            .unwrap();
        assert_eq!(reply.content, "editor:0");
    }
}
