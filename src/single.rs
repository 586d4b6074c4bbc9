//! Single-agent sessions on top of the orchestrator

use tracing::info;

use crate::agent::Agent;
use crate::error::{AbortReason, ParleyError};
use crate::orchestrator::{Orchestrator, OrchestratorBuilder, TurnRecord};
use crate::selector::FixedSelector;
use crate::session::{SessionResult, SessionStatus};
use crate::termination::{CloseSignal, MaxRounds};

/// A conversation between the caller and exactly one agent.
///
/// Runs the regular orchestrator with a [`FixedSelector`]; the caller decides
/// when it ends by calling [`close`](Self::close).
pub struct SingleAgentSession {
    orchestrator: Orchestrator,
    signal: CloseSignal,
}

impl SingleAgentSession {
    /// Ask one agent one question and wait for its single reply
    pub async fn one_shot(
        agent: Agent,
        prompt: impl Into<String>,
    ) -> Result<SessionResult, ParleyError> {
        Self::one_shot_with(Orchestrator::builder(), agent, prompt).await
    }

    /// Like [`one_shot`](Self::one_shot) with retry/timeout settings taken from `builder`
    pub async fn one_shot_with(
        builder: OrchestratorBuilder,
        agent: Agent,
        prompt: impl Into<String>,
    ) -> Result<SessionResult, ParleyError> {
        let orchestrator = builder
            .selector(FixedSelector::new(agent.id.clone()))
            .termination(MaxRounds::new(1)?)
            .initial_message(prompt)
            .agent(agent)
            .build()?;

        Ok(orchestrator.collect().await)
    }

    /// Start a multi-turn session that lasts until [`close`](Self::close)
    pub fn open(agent: Agent) -> Result<Self, ParleyError> {
        Self::open_with(Orchestrator::builder(), agent)
    }

    pub fn open_with(builder: OrchestratorBuilder, agent: Agent) -> Result<Self, ParleyError> {
        let signal = CloseSignal::new();
        let orchestrator = builder
            .selector(FixedSelector::new(agent.id.clone()))
            .termination(signal.clone())
            .agent(agent)
            .build()?;

        info!(session_id = %orchestrator.id(), "Opened single-agent session");
        Ok(Self {
            orchestrator,
            signal,
        })
    }

    pub fn status(&self) -> SessionStatus {
        self.orchestrator.status()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Send a caller message and wait for the agent's reply
    pub async fn send(&mut self, message: impl Into<String>) -> Result<TurnRecord, ParleyError> {
        self.orchestrator.push_user_turn(message)?;

        match self.orchestrator.step().await {
            Some(record) => Ok(record),
            None => Err(ParleyError::Aborted(
                self.orchestrator
                    .session()
                    .reason()
                    .cloned()
                    .unwrap_or(AbortReason::CancelledByCaller),
            )),
        }
    }

    /// End the session on the caller's behalf
    pub fn close(self) -> SessionResult {
        self.signal.close();
        self.orchestrator.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::{Scripted, ScriptedResponder};
    use crate::retry::RetryPolicy;
    use std::sync::Arc;

    fn assistant(responder: ScriptedResponder) -> Agent {
        Agent::new(
            "assistant",
            "You are a helpful assistant. Keep answers short.",
            Arc::new(responder),
        )
    }

    #[tokio::test]
    async fn test_one_shot_produces_single_reply() {
        let agent = assistant(ScriptedResponder::replies(["RAG pairs retrieval with generation."]));
        let result = SingleAgentSession::one_shot(agent, "Give me a concise update on RAG.")
            .await
            .unwrap();

        assert!(result.is_completed());
        assert_eq!(result.transcript.len(), 2);
        assert_eq!(result.transcript.turns()[0].speaker_id, "user");
        assert_eq!(
            result.final_message(),
            Some("RAG pairs retrieval with generation.")
        );
    }

    #[tokio::test]
    async fn test_multi_turn_until_close() {
        let agent = assistant(ScriptedResponder::replies(["hi", "sure", "bye"]));
        let mut session = SingleAgentSession::open(agent).unwrap();

        assert_eq!(session.send("hello").await.unwrap().content, "hi");
        assert_eq!(session.send("can you help?").await.unwrap().content, "sure");
        assert_eq!(session.status(), SessionStatus::Running);

        let result = session.close();
        assert!(result.is_completed());
        assert_eq!(result.agent_turn_count(), 2);
        assert_eq!(result.transcript.len(), 4);
    }

    #[tokio::test]
    async fn test_send_after_ceiling_fails() {
        let agent = assistant(ScriptedResponder::replies(["one"]).repeat_last());
        let builder = Orchestrator::builder().max_total_iterations(1);
        let mut session = SingleAgentSession::open_with(builder, agent).unwrap();

        let record = session.send("first").await.unwrap();
        assert!(record.is_final);
        assert!(matches!(
            session.send("second").await,
            Err(ParleyError::SessionClosed(SessionStatus::Aborted))
        ));
    }

    #[tokio::test]
    async fn test_send_surfaces_responder_failure() {
        let agent = assistant(ScriptedResponder::new([Scripted::Unavailable("offline".into())]));
        let builder = Orchestrator::builder().retry(RetryPolicy::none());
        let mut session = SingleAgentSession::open_with(builder, agent).unwrap();

        assert!(matches!(
            session.send("hello").await,
            Err(ParleyError::Aborted(AbortReason::ResponderFailure { .. }))
        ));
        assert_eq!(session.close().status, SessionStatus::Aborted);
    }
}
